//! rsplib-core: Core traits, types, and error definitions for rsplib.
//!
//! This crate defines the model-agnostic abstractions shared by the
//! device-control layer, the simulated hardware API and applications.
//! Applications depend on these types without pulling in a specific
//! hardware API implementation.
//!
//! # Key types
//!
//! - [`HardwareApi`] -- blocking interface to the vendor hardware library
//! - [`EventSink`] -- how the hardware API reports asynchronous events
//! - [`StreamHandler`], [`GainHandler`], [`PowerOverloadHandler`] -- observers
//! - [`DeviceEvent`] -- broadcast notifications for async subscribers
//! - [`Error`] / [`Result`] -- error handling

pub mod api;
pub mod error;
pub mod events;
pub mod handler;
pub mod helpers;
pub mod stream;
pub mod types;

// Re-export key types at crate root for ergonomic `use rsplib_core::*`.
pub use api::{EventSink, HardwareApi};
pub use error::{ApiErrorCode, ApiResult, Error, ErrorKind, Result};
pub use events::DeviceEvent;
pub use handler::{GainHandler, PowerOverloadHandler, StreamHandler};
pub use helpers::{format_freq_mhz, format_sample_rate, power_to_dbfs};
pub use stream::{ChannelStreamHandler, SampleReceiver, sample_channel};
pub use types::*;
