//! # rsplib -- Device control for SDRplay RSP receivers
//!
//! `rsplib` drives SDRplay RSP receivers through their full lifecycle
//! (open, enumerate, select, stream, stop, release, close) and exposes
//! model-specific front-end controls without leaking variant detail into
//! application code. It is designed for panadapters, recorders and
//! decoders that need a dependable, thread-safe receiver layer.
//!
//! ## Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use rsplib::{DeviceControl, Receiver};
//! use rsplib_test_harness::MockApi;
//!
//! # fn main() -> rsplib::Result<()> {
//! // Any `HardwareApi` implementation works here; `MockApi` simulates one.
//! let api = MockApi::with_devices([rsplib::DeviceInfo::new("1000", rsplib::Model::Rsp1A)]);
//! let control = DeviceControl::builder(Arc::new(api))
//!     .frequency(7_074_000.0)
//!     .build()?;
//!
//! control.open()?;
//! let devices = control.get_available_devices()?;
//! if let Receiver::Rsp1a(rx) = control.select_device(&devices[0])? {
//!     rx.set_gain_reduction(40)?;
//! }
//! println!("tuned to {}", rsplib::format_freq_mhz(control.get_frequency()?));
//! control.close();
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! | Crate                 | Purpose                                              |
//! |-----------------------|------------------------------------------------------|
//! | `rsplib-core`         | `HardwareApi` / `EventSink` seams, types, errors     |
//! | `rsplib-control`      | `DeviceControl` state machine and variant views      |
//! | `rsplib-test-harness` | `MockApi`, a simulated hardware API for tests        |
//! | **`rsplib`**          | This facade crate -- re-exports everything           |
//!
//! ## Lifecycle
//!
//! ```text
//! Closed -> Opened -> DeviceSelected -> StreamingInitialized -> Streaming
//! ```
//!
//! Every operation either performs its transition or fails with an
//! [`Error`] and leaves the state unchanged. [`DeviceControl::close`] tears
//! down whatever is active and always ends in `Closed`.
//!
//! ## Callbacks and events
//!
//! Sample blocks, gain changes and power-overload notifications arrive on
//! the hardware API's own threads and are passed to the handlers registered
//! with `set_stream_callback`, `set_gain_callback` and
//! `set_power_overload_callback`. Closures implement the handler traits.
//! For async consumers, [`sample_channel`] bridges stream delivery into a
//! tokio channel, and [`DeviceControl::subscribe`] yields [`DeviceEvent`]s.
//!
//! ## Supported Receivers
//!
//! RSP1, RSP1A, RSP1B, RSP2, RSPduo, RSPdx, RSPdx-R2.

pub use rsplib_core::*;

pub use rsplib_control::{
    BasicReceiver, DEFAULT_EVENT_CAPACITY, DeviceControl, DeviceControlBuilder, Family, Receiver,
    Rsp1a, RspDxR2, RspModel, StreamStats,
};

/// Static model definitions (LNA gain ladders, tuning ranges, features).
pub mod models {
    pub use rsplib_control::models::*;
}

/// Returns the definitions of all supported receiver models.
///
/// # Example
///
/// ```
/// for model in rsplib::supported_models() {
///     println!("{:<8} {:<16} antennas: {}", model.name, model.family, model.antenna_ports);
/// }
/// ```
pub fn supported_models() -> Vec<RspModel> {
    rsplib_control::models::all_models()
}
