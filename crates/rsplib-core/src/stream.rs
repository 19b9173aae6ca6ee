//! Bridge from the callback-based stream handler to async channels.
//!
//! The hardware API delivers sample blocks by invoking a
//! [`StreamHandler`] on its own thread. Applications built on tokio usually
//! want a channel instead. [`sample_channel()`] returns a handler that
//! forwards each block into a bounded [`tokio::sync::mpsc`] channel and the
//! [`SampleReceiver`] that drains it.
//!
//! The channel is bounded: when the consumer falls behind, blocks are dropped
//! on the delivery thread rather than accumulating without limit. The number
//! of dropped blocks is available from
//! [`ChannelStreamHandler::dropped_blocks()`].
//!
//! ```
//! use std::sync::Arc;
//! use rsplib_core::stream::sample_channel;
//! use rsplib_core::{SampleBlock, StreamHandler};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let (handler, mut rx) = sample_channel(8);
//! let handler = Arc::new(handler);
//! handler.handle_stream_data(&SampleBlock::new(vec![1], vec![2], 0));
//! let block = rx.recv().await.unwrap();
//! assert_eq!(block.num_samples(), 1);
//! # }
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::trace;

use crate::handler::StreamHandler;
use crate::types::SampleBlock;

/// Default channel capacity for [`sample_channel()`] callers that have no
/// better figure.
///
/// At 2 MS/s with the usual 1344-sample blocks this absorbs roughly 20 ms.
pub const DEFAULT_SAMPLE_CHANNEL_CAPACITY: usize = 32;

/// A [`StreamHandler`] that forwards blocks into a bounded channel.
#[derive(Debug)]
pub struct ChannelStreamHandler {
    tx: mpsc::Sender<SampleBlock>,
    dropped: AtomicU64,
}

impl ChannelStreamHandler {
    /// Number of blocks dropped because the channel was full.
    pub fn dropped_blocks(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl StreamHandler for ChannelStreamHandler {
    fn handle_stream_data(&self, block: &SampleBlock) {
        match self.tx.try_send(block.clone()) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                let n = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                trace!(dropped = n, "sample channel full, dropping block");
            }
            Err(TrySendError::Closed(_)) => {
                trace!("sample receiver dropped, discarding block");
            }
        }
    }
}

/// Receives sample blocks forwarded by a [`ChannelStreamHandler`].
///
/// [`recv()`](SampleReceiver::recv) returns `None` once the handler has been
/// dropped and every buffered block has been read.
#[derive(Debug)]
pub struct SampleReceiver {
    rx: mpsc::Receiver<SampleBlock>,
}

impl SampleReceiver {
    /// Receive the next block.
    pub async fn recv(&mut self) -> Option<SampleBlock> {
        self.rx.recv().await
    }

    /// Receive a block if one is already buffered.
    pub fn try_recv(&mut self) -> Option<SampleBlock> {
        self.rx.try_recv().ok()
    }
}

/// Create a channel-backed stream handler and its receiver.
///
/// A `capacity` of zero is raised to one.
pub fn sample_channel(capacity: usize) -> (ChannelStreamHandler, SampleReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        ChannelStreamHandler {
            tx,
            dropped: AtomicU64::new(0),
        },
        SampleReceiver { rx },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(n: u32) -> SampleBlock {
        SampleBlock::new(vec![n as i16; 4], vec![0; 4], n * 4)
    }

    #[tokio::test]
    async fn forwards_blocks_in_order() {
        let (handler, mut rx) = sample_channel(4);
        handler.handle_stream_data(&block(0));
        handler.handle_stream_data(&block(1));
        assert_eq!(rx.recv().await.unwrap().first_sample_num, 0);
        assert_eq!(rx.recv().await.unwrap().first_sample_num, 4);
        assert_eq!(handler.dropped_blocks(), 0);
    }

    #[tokio::test]
    async fn drops_when_full() {
        let (handler, mut rx) = sample_channel(2);
        for n in 0..5 {
            handler.handle_stream_data(&block(n));
        }
        assert_eq!(handler.dropped_blocks(), 3);
        assert!(rx.try_recv().is_some());
        assert!(rx.try_recv().is_some());
        assert!(rx.try_recv().is_none());
    }

    #[tokio::test]
    async fn recv_returns_none_after_handler_dropped() {
        let (handler, mut rx) = sample_channel(2);
        handler.handle_stream_data(&block(7));
        drop(handler);
        assert!(rx.recv().await.is_some());
        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn zero_capacity_is_raised() {
        let (handler, mut rx) = sample_channel(0);
        handler.handle_stream_data(&block(1));
        assert!(rx.try_recv().is_some());
    }

    #[test]
    fn closed_receiver_does_not_count_as_drop() {
        let (handler, rx) = sample_channel(2);
        drop(rx);
        handler.handle_stream_data(&block(1));
        assert_eq!(handler.dropped_blocks(), 0);
    }
}
