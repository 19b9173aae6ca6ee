//! Device-control layer for SDRplay RSP receivers.
//!
//! This crate drives a [`HardwareApi`](rsplib_core::HardwareApi) through the
//! receiver lifecycle and exposes model-specific controls without leaking
//! variant detail into calling code. It provides:
//!
//! - **Device control** ([`control`]) -- the [`DeviceControl`] state machine:
//!   open, enumerate, select, stream, stop, release, close, plus common
//!   tuning (frequency, sample rate) and a last-error slot.
//! - **Variant views** ([`variants`]) -- the [`Receiver`] sum type resolved at
//!   selection time: [`Rsp1a`] (gain reduction, LNA state, AGC), [`RspDxR2`]
//!   (HDR mode, bias-tee, antenna) and [`BasicReceiver`].
//! - **Model definitions** ([`models`]) -- static data for every supported
//!   receiver (LNA gain ladders, ranges, front-end features).
//! - **Builder** ([`builder`]) -- fluent configuration for [`DeviceControl`].
//!
//! Hardware events are dispatched to handlers registered with
//! `set_stream_callback`, `set_gain_callback` and
//! `set_power_overload_callback`. Registrations are weak: the caller keeps
//! the handler alive. Replacing a handler, or stopping the stream, waits for
//! an in-flight callback of that category to finish.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use rsplib_control::DeviceControl;
//! use rsplib_core::{DeviceInfo, Model, SampleBlock, StreamHandler};
//! use rsplib_test_harness::MockApi;
//!
//! # fn example() -> rsplib_core::Result<()> {
//! let api = MockApi::with_devices([DeviceInfo::new("1000", Model::Rsp1A)]);
//! let emitter = api.emitter();
//! let control = DeviceControl::new(Arc::new(api));
//!
//! control.open()?;
//! let devices = control.get_available_devices()?;
//! control.select_device(&devices[0])?;
//! control.set_frequency(14_074_000.0)?;
//!
//! let blocks = Arc::new(AtomicUsize::new(0));
//! let counter = blocks.clone();
//! let handler: Arc<dyn StreamHandler> = Arc::new(move |_: &SampleBlock| {
//!     counter.fetch_add(1, Ordering::Relaxed);
//! });
//! control.set_stream_callback(Some(handler.clone()));
//!
//! control.initialize_streaming()?;
//! control.start_streaming()?;
//! emitter.emit_samples(&SampleBlock::new(vec![0; 8], vec![0; 8], 0));
//! control.stop_streaming()?;
//! control.close();
//!
//! assert_eq!(blocks.load(Ordering::Relaxed), 1);
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```

pub mod builder;
pub mod control;
mod dispatch;
pub mod models;
pub mod variants;

// Re-export the primary types for ergonomic `use rsplib_control::*`.
pub use builder::{DEFAULT_EVENT_CAPACITY, DeviceControlBuilder};
pub use control::DeviceControl;
pub use dispatch::StreamStats;
pub use models::{Family, RspModel};
pub use variants::{BasicReceiver, Receiver, Rsp1a, RspDxR2};
