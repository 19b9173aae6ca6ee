//! Callback dispatch from the hardware delivery thread to registered handlers.
//!
//! The [`Dispatcher`] is the [`EventSink`] handed to the hardware API when
//! streaming is initialised. It holds one non-owning registration per event
//! category, each behind its own mutex. The same mutex is held while a
//! handler runs and while a registration is replaced, which gives two
//! guarantees:
//!
//! - once `set_*_handler` returns, the previous handler will not be called
//!   again;
//! - once the stream gate is closed (by `stop_streaming`), no stream
//!   callback is running and none will start.
//!
//! Categories do not share a lock, so a slow stream handler never delays
//! gain or overload delivery.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::broadcast;
use tracing::{debug, trace, warn};

use rsplib_core::api::{EventSink, HardwareApi};
use rsplib_core::events::DeviceEvent;
use rsplib_core::handler::{GainHandler, PowerOverloadHandler, StreamHandler};
use rsplib_core::types::{DeviceHandle, GainUpdate, PowerOverload, SampleBlock};

/// Lock a mutex, recovering the data if a panicking handler poisoned it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Delivery counters for the stream category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StreamStats {
    /// Blocks handed to a registered stream handler.
    pub delivered: u64,
    /// Blocks discarded because the gate was closed or no handler was live.
    pub dropped: u64,
}

struct StreamSlot {
    handler: Option<Weak<dyn StreamHandler>>,
    enabled: bool,
}

/// Where to send overload acknowledgements for the current stream.
struct OverloadAck {
    api: Weak<dyn HardwareApi>,
    handle: DeviceHandle,
}

pub(crate) struct Dispatcher {
    stream: Mutex<StreamSlot>,
    gain: Mutex<Option<Weak<dyn GainHandler>>>,
    overload: Mutex<Option<Weak<dyn PowerOverloadHandler>>>,
    ack: Mutex<Option<OverloadAck>>,
    auto_ack_overload: bool,
    last_gain: Mutex<Option<GainUpdate>>,
    device_lost: AtomicBool,
    delivered: AtomicU64,
    dropped: AtomicU64,
    event_tx: broadcast::Sender<DeviceEvent>,
}

impl Dispatcher {
    pub(crate) fn new(event_tx: broadcast::Sender<DeviceEvent>, auto_ack_overload: bool) -> Self {
        Dispatcher {
            stream: Mutex::new(StreamSlot {
                handler: None,
                enabled: false,
            }),
            gain: Mutex::new(None),
            overload: Mutex::new(None),
            ack: Mutex::new(None),
            auto_ack_overload,
            last_gain: Mutex::new(None),
            device_lost: AtomicBool::new(false),
            delivered: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            event_tx,
        }
    }

    pub(crate) fn set_stream_handler(&self, handler: Option<Arc<dyn StreamHandler>>) {
        lock(&self.stream).handler = handler.as_ref().map(Arc::downgrade);
    }

    pub(crate) fn set_gain_handler(&self, handler: Option<Arc<dyn GainHandler>>) {
        *lock(&self.gain) = handler.as_ref().map(Arc::downgrade);
    }

    pub(crate) fn set_power_overload_handler(
        &self,
        handler: Option<Arc<dyn PowerOverloadHandler>>,
    ) {
        *lock(&self.overload) = handler.as_ref().map(Arc::downgrade);
    }

    /// Open or close the stream gate. Closing waits for any stream callback
    /// that is currently running.
    pub(crate) fn set_stream_enabled(&self, enabled: bool) {
        lock(&self.stream).enabled = enabled;
        trace!(enabled, "stream gate");
    }

    /// Bind overload acknowledgements to the device being streamed.
    pub(crate) fn arm(&self, api: &Arc<dyn HardwareApi>, handle: DeviceHandle) {
        *lock(&self.ack) = Some(OverloadAck {
            api: Arc::downgrade(api),
            handle,
        });
    }

    pub(crate) fn disarm(&self) {
        *lock(&self.ack) = None;
    }

    /// Forget transport loss and gain history from a previous device.
    pub(crate) fn reset_device(&self) {
        self.device_lost.store(false, Ordering::SeqCst);
        *lock(&self.last_gain) = None;
    }

    pub(crate) fn device_lost(&self) -> bool {
        self.device_lost.load(Ordering::SeqCst)
    }

    pub(crate) fn last_gain(&self) -> Option<GainUpdate> {
        *lock(&self.last_gain)
    }

    pub(crate) fn stats(&self) -> StreamStats {
        StreamStats {
            delivered: self.delivered.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }

    fn publish(&self, event: DeviceEvent) {
        // No subscribers is not an error.
        let _ = self.event_tx.send(event);
    }

    fn acknowledge_overload(&self) {
        let ack = lock(&self.ack);
        let Some(ack) = ack.as_ref() else {
            return;
        };
        let Some(api) = ack.api.upgrade() else {
            return;
        };
        if let Err(code) = api.acknowledge_overload(ack.handle) {
            warn!(%code, "failed to acknowledge power overload");
        }
    }
}

impl EventSink for Dispatcher {
    fn stream(&self, block: &SampleBlock) {
        let slot = lock(&self.stream);
        if !slot.enabled {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            trace!("stream gate closed, dropping block");
            return;
        }
        match slot.handler.as_ref().and_then(Weak::upgrade) {
            Some(handler) => {
                handler.handle_stream_data(block);
                self.delivered.fetch_add(1, Ordering::Relaxed);
            }
            None => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn gain(&self, update: GainUpdate) {
        *lock(&self.last_gain) = Some(update);
        {
            let slot = lock(&self.gain);
            if let Some(handler) = slot.as_ref().and_then(Weak::upgrade) {
                handler.handle_gain_change(update);
            }
        }
        trace!(
            gr = update.gain_reduction_db,
            lna_gr = update.lna_gain_reduction_db,
            gain = update.current_gain_db,
            "gain changed"
        );
        self.publish(DeviceEvent::GainChanged(update));
    }

    fn power_overload(&self, event: PowerOverload) {
        {
            let slot = lock(&self.overload);
            if let Some(handler) = slot.as_ref().and_then(Weak::upgrade) {
                handler.handle_power_overload(event);
            }
        }
        debug!(%event, "power overload");
        if self.auto_ack_overload {
            self.acknowledge_overload();
        }
        self.publish(DeviceEvent::PowerOverload(event));
    }

    fn device_removed(&self) {
        warn!("device removed");
        self.device_lost.store(true, Ordering::SeqCst);
        self.publish(DeviceEvent::DeviceRemoved);
    }
}
