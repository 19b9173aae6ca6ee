//! The hardware-API seam.
//!
//! [`HardwareApi`] abstracts over the vendor hardware-access library. The
//! device-control layer in `rsplib-control` operates on a `HardwareApi`
//! rather than on the vendor library directly, which allows deterministic
//! testing with `MockApi` from the `rsplib-test-harness` crate.
//!
//! [`EventSink`] is the other direction: the hardware API calls it from its
//! own threads whenever samples, gain changes, overload notifications or
//! device removal need to be reported.

use std::sync::Arc;

use crate::error::ApiResult;
use crate::types::{
    DeviceHandle, DeviceInfo, DeviceParams, GainUpdate, ParamUpdate, PowerOverload, SampleBlock,
};

/// Receiver of asynchronous hardware events.
///
/// Implementations must be cheap and must not block for long: they run on
/// the hardware API's delivery thread(s). Within one category, events arrive
/// in the order the hardware produced them. No ordering holds across
/// categories.
pub trait EventSink: Send + Sync {
    /// A block of samples arrived.
    fn stream(&self, block: &SampleBlock);

    /// The hardware changed its effective gain.
    fn gain(&self, update: GainUpdate);

    /// The front end entered or left overload.
    fn power_overload(&self, event: PowerOverload);

    /// The device was unplugged or stopped responding.
    fn device_removed(&self);
}

/// Blocking interface to the vendor hardware-access library.
///
/// All calls block the calling thread until the library has completed the
/// underlying transport operation. Failures are reported as discrete
/// [`ApiErrorCode`](crate::error::ApiErrorCode) values.
pub trait HardwareApi: Send + Sync {
    /// Establish a session with the library.
    fn open(&self) -> ApiResult<()>;

    /// Tear the session down.
    fn close(&self) -> ApiResult<()>;

    /// Version of the vendor library (e.g. `3.15`).
    fn api_version(&self) -> ApiResult<f32>;

    /// Take the library-wide device lock that guards enumeration and
    /// selection against other processes.
    fn lock_device_api(&self) -> ApiResult<()>;

    /// Release the lock taken by [`lock_device_api`](HardwareApi::lock_device_api).
    fn unlock_device_api(&self) -> ApiResult<()>;

    /// List the currently attached devices.
    fn get_devices(&self) -> ApiResult<Vec<DeviceInfo>>;

    /// Claim exclusive access to a device.
    fn select_device(&self, info: &DeviceInfo) -> ApiResult<DeviceHandle>;

    /// Give up exclusive access to a device.
    fn release_device(&self, handle: DeviceHandle) -> ApiResult<()>;

    /// Read the parameter block currently held by the library for a device.
    fn device_params(&self, handle: DeviceHandle) -> ApiResult<DeviceParams>;

    /// Apply one field of `params` to the hardware.
    fn update(
        &self,
        handle: DeviceHandle,
        params: &DeviceParams,
        change: ParamUpdate,
    ) -> ApiResult<()>;

    /// Prepare stream buffers and register the event sink.
    fn init_stream(
        &self,
        handle: DeviceHandle,
        params: &DeviceParams,
        sink: Arc<dyn EventSink>,
    ) -> ApiResult<()>;

    /// Begin sample delivery.
    fn start_stream(&self, handle: DeviceHandle) -> ApiResult<()>;

    /// Halt sample delivery. Returns once the hardware has acknowledged.
    fn stop_stream(&self, handle: DeviceHandle) -> ApiResult<()>;

    /// Free stream buffers and drop the event sink.
    fn uninit_stream(&self, handle: DeviceHandle) -> ApiResult<()>;

    /// Acknowledge a power-overload notification so the hardware will
    /// report the next change.
    fn acknowledge_overload(&self, handle: DeviceHandle) -> ApiResult<()>;
}
