//! rsplib-test-harness: Test utilities and a simulated hardware API for
//! rsplib.
//!
//! This crate provides [`MockApi`], an in-memory
//! [`HardwareApi`](rsplib_core::HardwareApi) for deterministic testing of
//! the device-control layer without SDRplay hardware or the vendor library,
//! and [`MockEmitter`] for producing hardware events from test threads.

pub mod mock_api;

pub use mock_api::{MOCK_API_VERSION, MockApi, MockCall, MockEmitter};
