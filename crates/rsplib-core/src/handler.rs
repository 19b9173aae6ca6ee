//! Observer traits for asynchronous hardware events.
//!
//! Applications implement these traits and register instances with a
//! device-control instance. Registrations are non-owning: the caller keeps
//! the `Arc` alive for as long as it wants events, and dropping it is
//! equivalent to unregistering.
//!
//! Handlers run on the hardware API's delivery thread. They must not call
//! back into handler registration or `stop_streaming` from inside a
//! callback.
//!
//! Closures implement the traits directly:
//!
//! ```
//! use std::sync::Arc;
//! use rsplib_core::{SampleBlock, StreamHandler};
//!
//! let handler: Arc<dyn StreamHandler> = Arc::new(|block: &SampleBlock| {
//!     println!("{} samples", block.num_samples());
//! });
//! handler.handle_stream_data(&SampleBlock::new(vec![1, 2], vec![3, 4], 0));
//! ```

use crate::types::{GainUpdate, PowerOverload, SampleBlock};

/// Receives each delivered block of samples while streaming.
pub trait StreamHandler: Send + Sync {
    /// Called once per sample block.
    fn handle_stream_data(&self, block: &SampleBlock);
}

/// Receives autonomous gain changes (e.g. AGC adjustments).
pub trait GainHandler: Send + Sync {
    /// Called when the effective gain changes.
    fn handle_gain_change(&self, update: GainUpdate);
}

/// Receives front-end overload onset and recovery.
pub trait PowerOverloadHandler: Send + Sync {
    /// Called on overload onset and on recovery.
    fn handle_power_overload(&self, event: PowerOverload);
}

impl<F> StreamHandler for F
where
    F: Fn(&SampleBlock) + Send + Sync,
{
    fn handle_stream_data(&self, block: &SampleBlock) {
        self(block)
    }
}

impl<F> GainHandler for F
where
    F: Fn(GainUpdate) + Send + Sync,
{
    fn handle_gain_change(&self, update: GainUpdate) {
        self(update)
    }
}

impl<F> PowerOverloadHandler for F
where
    F: Fn(PowerOverload) + Send + Sync,
{
    fn handle_power_overload(&self, event: PowerOverload) {
        self(event)
    }
}
