//! DeviceControl -- lifecycle state machine over a [`HardwareApi`].
//!
//! A `DeviceControl` owns at most one claimed device at a time and walks it
//! through `Closed -> Opened -> DeviceSelected -> StreamingInitialized ->
//! Streaming` and back. Every operation either performs its documented
//! transition or fails leaving the state unchanged; the one exception is
//! [`close`](DeviceControl::close), which always ends in `Closed`.
//!
//! Failing operations return an [`Error`] and also record its description
//! in a last-error slot readable through
//! [`get_last_error`](DeviceControl::get_last_error). Successful operations
//! leave the slot alone; [`clear_last_error`](DeviceControl::clear_last_error)
//! resets it.
//!
//! # Threading
//!
//! All methods take `&self` and may be called from any thread. Lifecycle
//! operations and setters are serialized against each other and block until
//! the hardware API returns. Read-only queries (`state`, `get_frequency`,
//! `get_last_error`, ...) never wait on the hardware and are safe to call
//! from inside a handler. Handlers must not call the `set_*_callback`
//! methods, setters or lifecycle operations.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::broadcast;
use tracing::{debug, trace, warn};

use rsplib_core::api::{EventSink, HardwareApi};
use rsplib_core::error::{ApiErrorCode, ApiResult, Error, Result};
use rsplib_core::events::DeviceEvent;
use rsplib_core::handler::{GainHandler, PowerOverloadHandler, StreamHandler};
use rsplib_core::helpers::{format_freq_mhz, format_sample_rate};
use rsplib_core::types::{
    DeviceHandle, DeviceInfo, DeviceParams, DeviceState, GainUpdate, Model, ParamUpdate,
};

use crate::builder::{ControlConfig, DeviceControlBuilder};
use crate::dispatch::{Dispatcher, StreamStats, lock};
use crate::models::{Family, RspModel, model_for};
use crate::variants::Receiver;

const AFTER_SELECT: &str = "DeviceSelected or later";

#[derive(Clone)]
struct SelectedDevice {
    info: DeviceInfo,
    handle: DeviceHandle,
    params: DeviceParams,
    model: RspModel,
}

struct Session {
    state: DeviceState,
    device: Option<SelectedDevice>,
}

/// Lifecycle and common tuning for one SDRplay receiver.
///
/// Constructed via [`DeviceControl::new`] or [`DeviceControlBuilder`].
/// Variant-specific controls are reached through the [`Receiver`] returned
/// by [`select_device`](DeviceControl::select_device).
pub struct DeviceControl {
    api: Arc<dyn HardwareApi>,
    config: ControlConfig,
    /// Serializes lifecycle operations and setters.
    ops: Mutex<()>,
    session: Mutex<Session>,
    last_error: Mutex<Option<String>>,
    dispatcher: Arc<Dispatcher>,
    event_tx: broadcast::Sender<DeviceEvent>,
}

impl DeviceControl {
    /// Create a closed `DeviceControl` with default settings.
    pub fn new(api: Arc<dyn HardwareApi>) -> Self {
        DeviceControl::with_config(api, ControlConfig::default())
    }

    /// Start configuring a `DeviceControl`.
    pub fn builder(api: Arc<dyn HardwareApi>) -> DeviceControlBuilder {
        DeviceControlBuilder::new(api)
    }

    pub(crate) fn with_config(api: Arc<dyn HardwareApi>, config: ControlConfig) -> Self {
        let (event_tx, _) = broadcast::channel(config.event_capacity);
        let dispatcher = Arc::new(Dispatcher::new(
            event_tx.clone(),
            config.auto_acknowledge_overload,
        ));
        DeviceControl {
            api,
            config,
            ops: Mutex::new(()),
            session: Mutex::new(Session {
                state: DeviceState::Closed,
                device: None,
            }),
            last_error: Mutex::new(None),
            dispatcher,
            event_tx,
        }
    }

    // -----------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------

    /// Current lifecycle state.
    pub fn state(&self) -> DeviceState {
        self.session().state
    }

    /// Whether a session with the hardware API is open.
    pub fn is_open(&self) -> bool {
        self.state() != DeviceState::Closed
    }

    /// Whether sample delivery is active.
    pub fn is_streaming(&self) -> bool {
        self.state() == DeviceState::Streaming
    }

    /// Handle of the selected device, or `None` when nothing is selected.
    pub fn get_current_device(&self) -> Option<DeviceHandle> {
        self.session().device.as_ref().map(|d| d.handle)
    }

    /// Descriptor of the selected device, or `None` when nothing is selected.
    pub fn selected_device(&self) -> Option<DeviceInfo> {
        self.session().device.as_ref().map(|d| d.info.clone())
    }

    /// Parameter block of the selected device as last applied.
    pub fn get_device_params(&self) -> Option<DeviceParams> {
        self.session().device.as_ref().map(|d| d.params)
    }

    /// Model definition of the selected device.
    pub fn model(&self) -> Option<RspModel> {
        self.session().device.as_ref().map(|d| d.model.clone())
    }

    /// Description of the most recent failure, if any.
    pub fn get_last_error(&self) -> Option<String> {
        lock(&self.last_error).clone()
    }

    /// Forget the recorded failure.
    pub fn clear_last_error(&self) {
        *lock(&self.last_error) = None;
    }

    /// Version of the hardware API library. Valid in any state.
    pub fn get_api_version(&self) -> Result<f32> {
        let result = self
            .api
            .api_version()
            .map_err(|code| Error::api("get_api_version", code));
        self.record(result)
    }

    /// The most recent gain change reported by the hardware.
    pub fn last_gain(&self) -> Option<GainUpdate> {
        self.dispatcher.last_gain()
    }

    /// Stream delivery counters since construction.
    pub fn stream_stats(&self) -> StreamStats {
        self.dispatcher.stats()
    }

    /// Subscribe to state changes and hardware events.
    ///
    /// Delivery is best-effort: a receiver that falls more than the event
    /// capacity behind observes `RecvError::Lagged`.
    pub fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
        self.event_tx.subscribe()
    }

    /// The variant view for the selected device.
    pub fn receiver(&self) -> Option<Receiver<'_>> {
        let model = self.session().device.as_ref().map(|d| d.info.model)?;
        Some(Receiver::new(self, model))
    }

    // -----------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------

    /// Open a session with the hardware API. Does nothing if already open.
    pub fn open(&self) -> Result<()> {
        let _ops = lock(&self.ops);
        let result = self.open_session();
        self.record(result)
    }

    fn open_session(&self) -> Result<()> {
        if self.state() != DeviceState::Closed {
            debug!("session already open");
            return Ok(());
        }
        self.api
            .open()
            .map_err(|code| Error::SessionUnavailable(code.to_string()))?;

        if let Some(min) = self.config.min_api_version {
            let check = match self.api.api_version() {
                Ok(version) if version < min => Err(Error::SessionUnavailable(format!(
                    "API version {version:.2} is older than required {min:.2}"
                ))),
                Ok(version) => {
                    debug!(version, "hardware API version");
                    Ok(())
                }
                Err(code) => Err(Error::SessionUnavailable(code.to_string())),
            };
            if let Err(e) = check {
                if let Err(code) = self.api.close() {
                    warn!(%code, "failed to close rejected session");
                }
                return Err(e);
            }
        }

        self.transition(DeviceState::Opened, |_| {});
        Ok(())
    }

    /// List attached devices. Requires an open session.
    ///
    /// Returns an empty vector when nothing is attached.
    pub fn get_available_devices(&self) -> Result<Vec<DeviceInfo>> {
        let _ops = lock(&self.ops);
        let result = self.enumerate();
        self.record(result)
    }

    fn enumerate(&self) -> Result<Vec<DeviceInfo>> {
        const OP: &str = "get_available_devices";
        self.require(OP, "Opened or later", |s| s != DeviceState::Closed)?;
        let devices = self.with_api_lock(OP, || {
            self.api.get_devices().map_err(|code| Error::api(OP, code))
        })?;
        debug!(count = devices.len(), "enumerated devices");
        Ok(devices)
    }

    /// Claim a device and return the view matching its model.
    ///
    /// The device must be present in the current enumeration. Builder
    /// defaults (frequency, sample rate) are applied after the claim; if
    /// they are rejected the device is released again.
    pub fn select_device(&self, info: &DeviceInfo) -> Result<Receiver<'_>> {
        let _ops = lock(&self.ops);
        let result = self.claim(info);
        self.record(result).map(|model| Receiver::new(self, model))
    }

    fn claim(&self, info: &DeviceInfo) -> Result<Model> {
        const OP: &str = "select_device";
        self.require(OP, "Opened", |s| s == DeviceState::Opened)?;

        let (found, handle) = self.with_api_lock(OP, || {
            let devices = self.api.get_devices().map_err(|code| Error::api(OP, code))?;
            let found = devices
                .into_iter()
                .find(|d| d.serial == info.serial)
                .ok_or_else(|| Error::DeviceNotFound(info.to_string()))?;
            let handle = self.api.select_device(&found).map_err(|code| match code {
                ApiErrorCode::DeviceAlreadyClaimed => Error::DeviceBusy(found.to_string()),
                code => Error::api(OP, code),
            })?;
            Ok((found, handle))
        })?;

        let params = match self.apply_defaults(handle) {
            Ok(params) => params,
            Err(e) => {
                if let Err(code) = self.api.release_device(handle) {
                    warn!(%code, "failed to release device after setup error");
                }
                return Err(e);
            }
        };

        debug!(device = %found, "device selected");
        let model = found.model;
        self.dispatcher.reset_device();
        self.transition(DeviceState::DeviceSelected, |s| {
            s.device = Some(SelectedDevice {
                model: model_for(model),
                info: found,
                handle,
                params,
            });
        });
        Ok(model)
    }

    fn apply_defaults(&self, handle: DeviceHandle) -> Result<DeviceParams> {
        const OP: &str = "select_device";
        let mut params = self
            .api
            .device_params(handle)
            .map_err(|code| Error::api(OP, code))?;
        if let Some(freq) = self.config.frequency_hz {
            params.frequency_hz = freq;
            self.api
                .update(handle, &params, ParamUpdate::Frequency)
                .map_err(|code| Error::api(OP, code))?;
        }
        if let Some(rate) = self.config.sample_rate_hz {
            params.sample_rate_hz = rate;
            self.api
                .update(handle, &params, ParamUpdate::SampleRate)
                .map_err(|code| Error::api(OP, code))?;
        }
        Ok(params)
    }

    /// Release the selected device.
    ///
    /// From `StreamingInitialized` the stream is uninitialized first and
    /// re-initialized if the hardware then refuses the release. Fails while
    /// streaming or when no device is selected.
    pub fn release_device(&self) -> Result<()> {
        let _ops = lock(&self.ops);
        let result = self.release();
        self.record(result)
    }

    fn release(&self) -> Result<()> {
        const OP: &str = "release_device";
        let state = self.require(OP, "DeviceSelected or StreamingInitialized", |s| {
            matches!(
                s,
                DeviceState::DeviceSelected | DeviceState::StreamingInitialized
            )
        })?;
        let was_initialized = state == DeviceState::StreamingInitialized;
        if was_initialized {
            self.uninit()?;
        }
        let device = self.device_snapshot(OP)?;
        match self.api.release_device(device.handle) {
            Ok(()) => {}
            Err(ApiErrorCode::DeviceRemoved) => {
                debug!("released device was already removed");
            }
            Err(code) => {
                if was_initialized {
                    if let Err(e) = self.init() {
                        warn!(error = %e, "failed to restore stream after release error");
                    }
                }
                return Err(Error::api(OP, code));
            }
        }
        debug!(device = %device.info, "device released");
        self.transition(DeviceState::Opened, |s| s.device = None);
        Ok(())
    }

    /// Tear everything down and close the session.
    ///
    /// Stops and uninitializes an active stream, releases the device and
    /// closes the session. Always ends in `Closed`; failures along the way
    /// are logged and recorded as the last error.
    pub fn close(&self) {
        let _ops = lock(&self.ops);
        self.teardown();
    }

    fn teardown(&self) {
        let (state, handle) = {
            let session = self.session();
            (session.state, session.device.as_ref().map(|d| d.handle))
        };
        if state == DeviceState::Closed {
            return;
        }
        debug!(%state, "closing");

        if let Some(handle) = handle {
            if state == DeviceState::Streaming {
                let result = self.api.stop_stream(handle);
                self.dispatcher.set_stream_enabled(false);
                self.note_teardown("stop_streaming", result);
            }
            if state >= DeviceState::StreamingInitialized {
                let result = self.api.uninit_stream(handle);
                self.dispatcher.disarm();
                self.note_teardown("uninitialize_streaming", result);
            }
            let result = self.api.release_device(handle);
            self.note_teardown("release_device", result);
        }
        let result = self.api.close();
        self.note_teardown("close", result);

        self.transition(DeviceState::Closed, |s| s.device = None);
    }

    fn note_teardown(&self, operation: &'static str, result: ApiResult<()>) {
        match result {
            Ok(()) | Err(ApiErrorCode::DeviceRemoved) => {}
            Err(code) => {
                let e = Error::api(operation, code);
                warn!(error = %e, "teardown step failed");
                *lock(&self.last_error) = Some(e.to_string());
            }
        }
    }

    // -----------------------------------------------------------------
    // Common tuning
    // -----------------------------------------------------------------

    /// Tune the selected device. Supported while streaming.
    ///
    /// Moving into a band with fewer LNA states lowers the LNA state to the
    /// highest one the new band has.
    pub fn set_frequency(&self, freq_hz: f64) -> Result<()> {
        self.update_params(
            "set_frequency",
            None,
            ParamUpdate::Frequency,
            |params, model| {
                if !model.frequency_in_range(freq_hz) {
                    return Err(Error::InvalidParameter(format!(
                        "frequency {} is out of range for {}",
                        format_freq_mhz(freq_hz),
                        model.name
                    )));
                }
                params.frequency_hz = freq_hz;
                let count = model.lna_states_at(freq_hz);
                if params.lna_state >= count {
                    let applied = count.saturating_sub(1);
                    warn!(
                        requested = params.lna_state,
                        applied, "LNA state clamped to the new band"
                    );
                    params.lna_state = applied;
                }
                Ok(())
            },
        )
    }

    /// Tuner frequency of the selected device, in hertz.
    pub fn get_frequency(&self) -> Result<f64> {
        self.read_params("get_frequency", None, |params, _| params.frequency_hz)
    }

    /// Change the ADC sample rate. Supported while streaming.
    pub fn set_sample_rate(&self, rate_hz: f64) -> Result<()> {
        self.update_params(
            "set_sample_rate",
            None,
            ParamUpdate::SampleRate,
            |params, model| {
                if !model.sample_rate_in_range(rate_hz) {
                    return Err(Error::InvalidParameter(format!(
                        "sample rate {} is out of range",
                        format_sample_rate(rate_hz)
                    )));
                }
                params.sample_rate_hz = rate_hz;
                Ok(())
            },
        )
    }

    /// Sample rate of the selected device, in hertz.
    pub fn get_sample_rate(&self) -> Result<f64> {
        self.read_params("get_sample_rate", None, |params, _| params.sample_rate_hz)
    }

    // -----------------------------------------------------------------
    // Streaming
    // -----------------------------------------------------------------

    /// Prepare stream buffers and register for hardware events.
    pub fn initialize_streaming(&self) -> Result<()> {
        let _ops = lock(&self.ops);
        let result = self.init();
        self.record(result)
    }

    fn init(&self) -> Result<()> {
        const OP: &str = "initialize_streaming";
        self.require(OP, "DeviceSelected", |s| s == DeviceState::DeviceSelected)?;
        let device = self.active_device(OP)?;
        let sink: Arc<dyn EventSink> = self.dispatcher.clone();
        self.api
            .init_stream(device.handle, &device.params, sink)
            .map_err(|code| Error::api(OP, code))?;
        self.dispatcher.arm(&self.api, device.handle);
        self.transition(DeviceState::StreamingInitialized, |_| {});
        Ok(())
    }

    /// Begin sample delivery to the stream handler.
    pub fn start_streaming(&self) -> Result<()> {
        let _ops = lock(&self.ops);
        let result = self.start();
        self.record(result)
    }

    fn start(&self) -> Result<()> {
        const OP: &str = "start_streaming";
        self.require(OP, "StreamingInitialized", |s| {
            s == DeviceState::StreamingInitialized
        })?;
        let device = self.active_device(OP)?;
        self.dispatcher.set_stream_enabled(true);
        if let Err(code) = self.api.start_stream(device.handle) {
            self.dispatcher.set_stream_enabled(false);
            return Err(Error::api(OP, code));
        }
        self.transition(DeviceState::Streaming, |_| {});
        Ok(())
    }

    /// Halt sample delivery.
    ///
    /// Returns only after the hardware has acknowledged and any stream
    /// callback that was already running has finished. No stream callback
    /// runs after this returns, so the handler may be dropped.
    pub fn stop_streaming(&self) -> Result<()> {
        let _ops = lock(&self.ops);
        let result = self.stop();
        self.record(result)
    }

    fn stop(&self) -> Result<()> {
        const OP: &str = "stop_streaming";
        self.require(OP, "Streaming", |s| s == DeviceState::Streaming)?;
        let device = self.device_snapshot(OP)?;
        match self.api.stop_stream(device.handle) {
            Ok(()) => {}
            Err(ApiErrorCode::DeviceRemoved) => {
                debug!("stopped stream of removed device");
            }
            Err(code) => return Err(Error::api(OP, code)),
        }
        self.dispatcher.set_stream_enabled(false);
        self.transition(DeviceState::StreamingInitialized, |_| {});
        Ok(())
    }

    /// Free stream buffers and unregister from hardware events.
    pub fn uninitialize_streaming(&self) -> Result<()> {
        let _ops = lock(&self.ops);
        let result = self.uninit();
        self.record(result)
    }

    fn uninit(&self) -> Result<()> {
        const OP: &str = "uninitialize_streaming";
        self.require(OP, "StreamingInitialized", |s| {
            s == DeviceState::StreamingInitialized
        })?;
        let device = self.device_snapshot(OP)?;
        match self.api.uninit_stream(device.handle) {
            Ok(()) | Err(ApiErrorCode::DeviceRemoved) => {}
            Err(code) => return Err(Error::api(OP, code)),
        }
        self.dispatcher.disarm();
        self.transition(DeviceState::DeviceSelected, |_| {});
        Ok(())
    }

    // -----------------------------------------------------------------
    // Handler registration
    // -----------------------------------------------------------------

    /// Register the observer for sample blocks; `None` disables delivery.
    ///
    /// Only a weak reference is kept: the caller must hold the `Arc` for as
    /// long as it wants callbacks. Once this returns, the previous handler
    /// is not running and will not be called again.
    pub fn set_stream_callback(&self, handler: Option<Arc<dyn StreamHandler>>) {
        trace!(enabled = handler.is_some(), "stream handler registered");
        self.dispatcher.set_stream_handler(handler);
    }

    /// Register the observer for gain changes; `None` disables delivery.
    pub fn set_gain_callback(&self, handler: Option<Arc<dyn GainHandler>>) {
        trace!(enabled = handler.is_some(), "gain handler registered");
        self.dispatcher.set_gain_handler(handler);
    }

    /// Register the observer for overload onset and recovery; `None`
    /// disables delivery.
    pub fn set_power_overload_callback(&self, handler: Option<Arc<dyn PowerOverloadHandler>>) {
        trace!(enabled = handler.is_some(), "power overload handler registered");
        self.dispatcher.set_power_overload_handler(handler);
    }

    // -----------------------------------------------------------------
    // Parameter plumbing shared with the variant views
    // -----------------------------------------------------------------

    /// Mutate a copy of the live parameters, push it to the hardware, and
    /// keep it only if the hardware accepted it.
    pub(crate) fn update_params(
        &self,
        operation: &'static str,
        family: Option<Family>,
        change: ParamUpdate,
        mutate: impl FnOnce(&mut DeviceParams, &RspModel) -> Result<()>,
    ) -> Result<()> {
        let _ops = lock(&self.ops);
        let result = self.apply_update(operation, family, change, mutate);
        self.record(result)
    }

    fn apply_update(
        &self,
        operation: &'static str,
        family: Option<Family>,
        change: ParamUpdate,
        mutate: impl FnOnce(&mut DeviceParams, &RspModel) -> Result<()>,
    ) -> Result<()> {
        let device = self.active_device(operation)?;
        check_family(operation, family, &device)?;
        let mut params = device.params;
        mutate(&mut params, &device.model)?;
        self.api
            .update(device.handle, &params, change)
            .map_err(|code| Error::api(operation, code))?;
        if let Some(d) = self.session().device.as_mut() {
            d.params = params;
        }
        debug!(?change, "parameters updated");
        Ok(())
    }

    pub(crate) fn read_params<T>(
        &self,
        operation: &'static str,
        family: Option<Family>,
        read: impl FnOnce(&DeviceParams, &RspModel) -> T,
    ) -> Result<T> {
        let result = self.device_snapshot(operation).and_then(|device| {
            check_family(operation, family, &device)?;
            Ok(read(&device.params, &device.model))
        });
        self.record(result)
    }

    // -----------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------

    fn session(&self) -> MutexGuard<'_, Session> {
        lock(&self.session)
    }

    /// Fail with a state error unless `allowed` accepts the current state.
    fn require(
        &self,
        operation: &'static str,
        required: &'static str,
        allowed: impl Fn(DeviceState) -> bool,
    ) -> Result<DeviceState> {
        let actual = self.state();
        if allowed(actual) {
            Ok(actual)
        } else {
            Err(Error::InvalidState {
                operation,
                required,
                actual,
            })
        }
    }

    fn device_snapshot(&self, operation: &'static str) -> Result<SelectedDevice> {
        let session = self.session();
        session.device.clone().ok_or(Error::InvalidState {
            operation,
            required: AFTER_SELECT,
            actual: session.state,
        })
    }

    /// Like [`device_snapshot`](Self::device_snapshot), but fails once the
    /// hardware has reported the device removed.
    fn active_device(&self, operation: &'static str) -> Result<SelectedDevice> {
        let device = self.device_snapshot(operation)?;
        if self.dispatcher.device_lost() {
            return Err(Error::ConnectionLost);
        }
        Ok(device)
    }

    fn with_api_lock<T>(
        &self,
        operation: &'static str,
        f: impl FnOnce() -> Result<T>,
    ) -> Result<T> {
        self.api
            .lock_device_api()
            .map_err(|code| Error::api(operation, code))?;
        let result = f();
        if let Err(code) = self.api.unlock_device_api() {
            warn!(%code, "failed to unlock device API");
        }
        result
    }

    fn transition(&self, to: DeviceState, update: impl FnOnce(&mut Session)) {
        let from = {
            let mut session = self.session();
            update(&mut *session);
            std::mem::replace(&mut session.state, to)
        };
        if from != to {
            debug!(%from, %to, "state change");
            let _ = self.event_tx.send(DeviceEvent::StateChanged { from, to });
        }
    }

    fn record<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            debug!(error = %e, "operation failed");
            *lock(&self.last_error) = Some(e.to_string());
        }
        result
    }
}

fn check_family(
    operation: &'static str,
    family: Option<Family>,
    device: &SelectedDevice,
) -> Result<()> {
    match family {
        Some(family) if device.model.family != family => Err(Error::WrongVariant {
            operation,
            expected: family.as_str(),
            actual: device.info.model,
        }),
        _ => Ok(()),
    }
}

impl Drop for DeviceControl {
    fn drop(&mut self) {
        if self.state() != DeviceState::Closed {
            self.teardown();
        }
    }
}

impl fmt::Debug for DeviceControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let session = self.session();
        f.debug_struct("DeviceControl")
            .field("state", &session.state)
            .field("device", &session.device.as_ref().map(|d| &d.info))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsplib_core::error::ErrorKind;
    use rsplib_core::types::{Model, PowerOverload, SampleBlock};
    use rsplib_test_harness::{MockApi, MockCall, MockEmitter};
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::thread;
    use std::time::Duration;

    fn two_device_mock() -> MockApi {
        MockApi::with_devices([
            DeviceInfo::new("1000", Model::Rsp1A),
            DeviceInfo::new("2000", Model::RspDxR2),
        ])
    }

    fn control_for(mock: &MockApi) -> DeviceControl {
        DeviceControl::new(Arc::new(mock.clone()))
    }

    fn selected(mock: &MockApi, serial: &str) -> DeviceControl {
        let control = control_for(mock);
        control.open().unwrap();
        let info = control
            .get_available_devices()
            .unwrap()
            .into_iter()
            .find(|d| d.serial == serial)
            .unwrap();
        control.select_device(&info).unwrap();
        control
    }

    fn streaming(mock: &MockApi, serial: &str) -> DeviceControl {
        let control = selected(mock, serial);
        control.initialize_streaming().unwrap();
        control.start_streaming().unwrap();
        control
    }

    fn block(n: u32) -> SampleBlock {
        SampleBlock::new(vec![100; 64], vec![-100; 64], n * 64)
    }

    fn counter() -> (Arc<AtomicU32>, Arc<dyn StreamHandler>) {
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();
        let handler: Arc<dyn StreamHandler> = Arc::new(move |_: &SampleBlock| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        (count, handler)
    }

    fn gain(db: u32) -> GainUpdate {
        GainUpdate {
            gain_reduction_db: db,
            lna_gain_reduction_db: 0,
            current_gain_db: 60.0 - db as f64,
        }
    }

    #[test]
    fn full_streaming_scenario() {
        let mock = two_device_mock();
        let emitter = mock.emitter();
        let control = control_for(&mock);

        control.open().unwrap();
        let devices = control.get_available_devices().unwrap();
        assert_eq!(devices.len(), 2);

        control.select_device(&devices[0]).unwrap();
        assert_eq!(control.state(), DeviceState::DeviceSelected);

        let (count, handler) = counter();
        control.set_stream_callback(Some(handler.clone()));

        control.initialize_streaming().unwrap();
        assert_eq!(control.state(), DeviceState::StreamingInitialized);
        control.start_streaming().unwrap();
        assert!(control.is_streaming());

        for n in 0..10 {
            assert!(emitter.emit_samples(&block(n)));
        }

        control.stop_streaming().unwrap();
        assert_eq!(control.state(), DeviceState::StreamingInitialized);
        control.release_device().unwrap();
        assert_eq!(control.state(), DeviceState::Opened);
        control.close();

        assert_eq!(count.load(Ordering::SeqCst), 10);
        assert_eq!(control.state(), DeviceState::Closed);
        assert!(!mock.is_open());
        assert!(!mock.is_claimed("1000"));
        assert!(control.get_last_error().is_none());
    }

    #[test]
    fn open_is_idempotent() {
        let mock = MockApi::new();
        let control = control_for(&mock);
        control.open().unwrap();
        control.open().unwrap();
        assert_eq!(mock.call_count(MockCall::Open), 1);
        assert!(control.is_open());
    }

    #[test]
    fn open_failure_is_session_error() {
        let mock = MockApi::new();
        mock.fail_next(MockCall::Open, ApiErrorCode::ServiceNotResponding);
        let control = control_for(&mock);

        let err = control.open().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Session);
        assert_eq!(control.state(), DeviceState::Closed);
        assert!(
            control
                .get_last_error()
                .unwrap()
                .contains("API service not responding")
        );

        // Recoverable: a retry succeeds.
        control.open().unwrap();
        assert_eq!(control.state(), DeviceState::Opened);
    }

    #[test]
    fn enumeration_requires_session_and_uses_api_lock() {
        let mock = two_device_mock();
        let control = control_for(&mock);

        let err = control.get_available_devices().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::State);

        control.open().unwrap();
        control.get_available_devices().unwrap();
        assert_eq!(mock.call_count(MockCall::LockDeviceApi), 1);
        assert_eq!(mock.call_count(MockCall::UnlockDeviceApi), 1);
        assert!(!mock.is_api_locked());
    }

    #[test]
    fn empty_enumeration_is_not_an_error() {
        let control = control_for(&MockApi::new());
        control.open().unwrap();
        assert!(control.get_available_devices().unwrap().is_empty());
    }

    #[test]
    fn api_lock_is_released_when_enumeration_fails() {
        let mock = two_device_mock();
        let control = control_for(&mock);
        control.open().unwrap();
        mock.fail_next(MockCall::GetDevices, ApiErrorCode::HwError);
        assert!(control.get_available_devices().is_err());
        assert!(!mock.is_api_locked());
    }

    #[test]
    fn api_version_is_valid_in_any_state() {
        let control = control_for(&MockApi::new());
        assert!(control.get_api_version().is_ok());
        control.open().unwrap();
        assert!(control.get_api_version().is_ok());
    }

    #[test]
    fn selecting_unknown_device_fails() {
        let mock = two_device_mock();
        let control = control_for(&mock);
        control.open().unwrap();

        let err = control
            .select_device(&DeviceInfo::new("9999", Model::Rsp1A))
            .unwrap_err();
        assert!(matches!(err, Error::DeviceNotFound(_)));
        assert_eq!(err.kind(), ErrorKind::Selection);
        assert_eq!(control.state(), DeviceState::Opened);
        assert!(control.get_current_device().is_none());
    }

    #[test]
    fn device_claimed_by_another_instance_is_busy() {
        let mock = two_device_mock();
        let first = selected(&mock, "1000");
        let second = control_for(&mock);
        second.open().unwrap();

        let err = second
            .select_device(&DeviceInfo::new("1000", Model::Rsp1A))
            .unwrap_err();
        assert!(matches!(err, Error::DeviceBusy(_)));
        assert_eq!(second.state(), DeviceState::Opened);

        // The other device is still available.
        second
            .select_device(&DeviceInfo::new("2000", Model::RspDxR2))
            .unwrap();
        assert_eq!(first.state(), DeviceState::DeviceSelected);
        assert!(!mock.is_api_locked());
    }

    #[test]
    fn device_claimed_elsewhere_is_busy() {
        let mock = two_device_mock();
        mock.claim_elsewhere("2000");
        let control = control_for(&mock);
        control.open().unwrap();
        let err = control
            .select_device(&DeviceInfo::new("2000", Model::RspDxR2))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Selection);
    }

    #[test]
    fn selecting_twice_requires_release() {
        let mock = two_device_mock();
        let control = selected(&mock, "1000");
        let err = control
            .select_device(&DeviceInfo::new("2000", Model::RspDxR2))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::State);
        assert_eq!(control.selected_device().unwrap().serial, "1000");

        control.release_device().unwrap();
        control
            .select_device(&DeviceInfo::new("2000", Model::RspDxR2))
            .unwrap();
        assert_eq!(control.selected_device().unwrap().model, Model::RspDxR2);
    }

    #[test]
    fn selection_uses_enumerated_descriptor() {
        let mock = two_device_mock();
        let control = control_for(&mock);
        control.open().unwrap();
        // Caller passes a stale model tag; the enumerated one wins.
        let receiver = control
            .select_device(&DeviceInfo::new("2000", Model::Rsp1))
            .unwrap();
        assert_eq!(receiver.model(), Model::RspDxR2);
    }

    #[test]
    fn builder_defaults_are_applied_on_select() {
        let mock = two_device_mock();
        let control = DeviceControl::builder(Arc::new(mock.clone()))
            .frequency(7_074_000.0)
            .sample_rate(6_000_000.0)
            .build()
            .unwrap();
        control.open().unwrap();
        control
            .select_device(&DeviceInfo::new("1000", Model::Rsp1A))
            .unwrap();

        assert_eq!(control.get_frequency().unwrap(), 7_074_000.0);
        assert_eq!(control.get_sample_rate().unwrap(), 6_000_000.0);
        let hw = mock.hardware_params("1000").unwrap();
        assert_eq!(hw.frequency_hz, 7_074_000.0);
        assert_eq!(hw.sample_rate_hz, 6_000_000.0);
    }

    #[test]
    fn rejected_defaults_release_the_device() {
        let mock = two_device_mock();
        mock.fail_next(MockCall::Update, ApiErrorCode::RfUpdateError);
        let control = DeviceControl::builder(Arc::new(mock.clone()))
            .frequency(7_074_000.0)
            .build()
            .unwrap();
        control.open().unwrap();
        assert!(
            control
                .select_device(&DeviceInfo::new("1000", Model::Rsp1A))
                .is_err()
        );
        assert_eq!(control.state(), DeviceState::Opened);
        assert!(!mock.is_claimed("1000"));
    }

    #[test]
    fn accessors_are_none_without_device() {
        let control = control_for(&two_device_mock());
        control.open().unwrap();
        assert!(control.get_current_device().is_none());
        assert!(control.get_device_params().is_none());
        assert!(control.receiver().is_none());
        assert_eq!(
            control.get_frequency().unwrap_err().kind(),
            ErrorKind::State
        );
    }

    #[test]
    fn frequency_round_trip() {
        let mock = two_device_mock();
        let control = selected(&mock, "1000");
        control.set_frequency(14_074_000.0).unwrap();
        assert_eq!(control.get_frequency().unwrap(), 14_074_000.0);
        assert_eq!(
            control.get_device_params().unwrap().frequency_hz,
            14_074_000.0
        );
        assert_eq!(mock.updates(), vec![ParamUpdate::Frequency]);
    }

    #[test]
    fn quantized_frequency_round_trip_is_within_a_hertz() {
        let mock = two_device_mock();
        let control = selected(&mock, "1000");
        control.set_frequency(144_174_000.3).unwrap();
        let hw = mock.hardware_params("1000").unwrap().frequency_hz;
        assert!((control.get_frequency().unwrap() - hw).abs() < 1.0);
    }

    #[test]
    fn failed_frequency_keeps_previous_value() {
        let mock = two_device_mock();
        let control = selected(&mock, "1000");
        control.set_frequency(10_000_000.0).unwrap();

        mock.fail_next(MockCall::Update, ApiErrorCode::RfUpdateError);
        let err = control.set_frequency(20_000_000.0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Parameter);
        assert_eq!(control.get_frequency().unwrap(), 10_000_000.0);
        assert_eq!(
            mock.hardware_params("1000").unwrap().frequency_hz,
            10_000_000.0
        );
        assert!(control.get_last_error().unwrap().contains("set_frequency"));
    }

    #[test]
    fn out_of_range_frequency_is_rejected_before_hardware() {
        let mock = two_device_mock();
        let control = selected(&mock, "1000");
        let before = mock.call_count(MockCall::Update);
        let err = control.set_frequency(3.0e9).unwrap_err();
        assert!(matches!(err, Error::InvalidParameter(_)));
        assert!(control.set_frequency(f64::NAN).is_err());
        assert_eq!(mock.call_count(MockCall::Update), before);
    }

    #[test]
    fn sample_rate_round_trip_and_range() {
        let mock = two_device_mock();
        let control = selected(&mock, "2000");
        control.set_sample_rate(8_000_000.0).unwrap();
        assert_eq!(control.get_sample_rate().unwrap(), 8_000_000.0);

        assert!(control.set_sample_rate(20_000_000.0).is_err());
        mock.fail_next(MockCall::Update, ApiErrorCode::FsUpdateError);
        assert!(control.set_sample_rate(4_000_000.0).is_err());
        assert_eq!(control.get_sample_rate().unwrap(), 8_000_000.0);
    }

    #[test]
    fn tuning_before_selection_is_a_state_error() {
        let mock = two_device_mock();
        let control = control_for(&mock);
        assert_eq!(
            control.set_frequency(1.0e6).unwrap_err().kind(),
            ErrorKind::State
        );
        control.open().unwrap();
        assert_eq!(
            control.set_sample_rate(2.0e6).unwrap_err().kind(),
            ErrorKind::State
        );
        assert_eq!(mock.call_count(MockCall::Update), 0);
    }

    #[test]
    fn live_retune_while_streaming() {
        let mock = two_device_mock();
        let control = streaming(&mock, "1000");
        control.set_frequency(433_920_000.0).unwrap();
        control.set_sample_rate(4_000_000.0).unwrap();
        assert!(control.is_streaming());
        assert!(mock.is_streaming("1000"));
        assert_eq!(
            mock.hardware_params("1000").unwrap().frequency_hz,
            433_920_000.0
        );
    }

    #[test]
    fn start_before_initialize_fails_and_delivers_nothing() {
        let mock = two_device_mock();
        let emitter = mock.emitter();
        let control = selected(&mock, "1000");
        let (count, handler) = counter();
        control.set_stream_callback(Some(handler.clone()));

        let err = control.start_streaming().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::State);
        assert_eq!(control.state(), DeviceState::DeviceSelected);
        assert_eq!(mock.call_count(MockCall::StartStream), 0);

        assert!(!emitter.emit_samples(&block(0)));
        assert!(!emitter.emit_stale_samples(&block(1)));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn failed_start_leaves_state_and_gate_closed() {
        let mock = two_device_mock();
        let emitter = mock.emitter();
        let control = selected(&mock, "1000");
        let (count, handler) = counter();
        control.set_stream_callback(Some(handler.clone()));
        control.initialize_streaming().unwrap();

        mock.fail_next(MockCall::StartStream, ApiErrorCode::OutOfMemory);
        assert!(control.start_streaming().is_err());
        assert_eq!(control.state(), DeviceState::StreamingInitialized);

        emitter.emit_stale_samples(&block(0));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn failed_initialize_leaves_state_unchanged() {
        let mock = two_device_mock();
        let control = selected(&mock, "1000");
        mock.fail_next(MockCall::InitStream, ApiErrorCode::OutOfMemory);
        let err = control.initialize_streaming().unwrap_err();
        assert!(err.to_string().contains("out of memory"));
        assert_eq!(control.state(), DeviceState::DeviceSelected);
        control.initialize_streaming().unwrap();
    }

    #[test]
    fn release_while_streaming_fails_and_stream_continues() {
        let mock = two_device_mock();
        let emitter = mock.emitter();
        let control = streaming(&mock, "1000");
        let (count, handler) = counter();
        control.set_stream_callback(Some(handler.clone()));

        let err = control.release_device().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::State);
        assert!(control.is_streaming());
        assert!(control.get_current_device().is_some());
        assert!(mock.is_streaming("1000"));

        assert!(emitter.emit_samples(&block(0)));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn release_from_initialized_uninitializes_first() {
        let mock = two_device_mock();
        let control = selected(&mock, "1000");
        control.initialize_streaming().unwrap();
        control.release_device().unwrap();
        assert_eq!(control.state(), DeviceState::Opened);
        assert_eq!(mock.call_count(MockCall::UninitStream), 1);
        assert!(!mock.is_claimed("1000"));
    }

    #[test]
    fn refused_release_restores_initialized_stream() {
        let mock = two_device_mock();
        let control = selected(&mock, "1000");
        control.initialize_streaming().unwrap();
        mock.fail_next(MockCall::ReleaseDevice, ApiErrorCode::HwError);

        let err = control.release_device().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert_eq!(control.state(), DeviceState::StreamingInitialized);
        assert_eq!(mock.call_count(MockCall::InitStream), 2);
        assert!(mock.is_claimed("1000"));

        control.start_streaming().unwrap();
        assert!(mock.is_streaming("1000"));
    }

    #[test]
    fn refused_release_from_selected_keeps_device() {
        let mock = two_device_mock();
        let control = selected(&mock, "1000");
        mock.fail_next(MockCall::ReleaseDevice, ApiErrorCode::Fail);

        assert!(control.release_device().is_err());
        assert_eq!(control.state(), DeviceState::DeviceSelected);
        assert_eq!(mock.call_count(MockCall::InitStream), 0);
        control.release_device().unwrap();
        assert_eq!(control.state(), DeviceState::Opened);
    }

    #[test]
    fn release_without_device_fails() {
        let control = control_for(&two_device_mock());
        control.open().unwrap();
        let err = control.release_device().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::State);
        assert_eq!(control.state(), DeviceState::Opened);
    }

    #[test]
    fn stop_drains_in_flight_stream_callback() {
        let mock = two_device_mock();
        let emitter = mock.emitter();
        let control = streaming(&mock, "1000");

        let started = Arc::new(AtomicBool::new(false));
        let finished = Arc::new(AtomicBool::new(false));
        let calls = Arc::new(AtomicU32::new(0));
        let (s, f, c) = (started.clone(), finished.clone(), calls.clone());
        let handler: Arc<dyn StreamHandler> = Arc::new(move |_: &SampleBlock| {
            c.fetch_add(1, Ordering::SeqCst);
            s.store(true, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(50));
            f.store(true, Ordering::SeqCst);
        });
        control.set_stream_callback(Some(handler.clone()));

        let delivery = {
            let emitter = emitter.clone();
            thread::spawn(move || emitter.emit_samples(&block(0)))
        };
        while !started.load(Ordering::SeqCst) {
            thread::yield_now();
        }

        control.stop_streaming().unwrap();
        assert!(finished.load(Ordering::SeqCst));
        assert!(delivery.join().unwrap());

        // A block that was already in the transport when stop returned.
        assert!(emitter.emit_stale_samples(&block(1)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(control.stream_stats().dropped, 1);
    }

    #[test]
    fn gain_handler_replacement_has_no_split_window() {
        let mock = two_device_mock();
        let emitter = mock.emitter();
        let control = streaming(&mock, "1000");

        let old_calls = Arc::new(AtomicU32::new(0));
        let new_calls = Arc::new(AtomicU32::new(0));
        let oc = old_calls.clone();
        let old: Arc<dyn GainHandler> = Arc::new(move |_: GainUpdate| {
            oc.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(1));
        });
        let nc = new_calls.clone();
        let new: Arc<dyn GainHandler> = Arc::new(move |_: GainUpdate| {
            nc.fetch_add(1, Ordering::SeqCst);
        });
        control.set_gain_callback(Some(old.clone()));

        let running = Arc::new(AtomicBool::new(true));
        let producer = {
            let (emitter, running) = (emitter.clone(), running.clone());
            thread::spawn(move || {
                let mut db = 20;
                while running.load(Ordering::SeqCst) {
                    emitter.emit_gain(gain(db));
                    db = if db == 59 { 20 } else { db + 1 };
                }
            })
        };
        while old_calls.load(Ordering::SeqCst) == 0 {
            thread::yield_now();
        }

        control.set_gain_callback(Some(new.clone()));
        let old_after_replace = old_calls.load(Ordering::SeqCst);
        while new_calls.load(Ordering::SeqCst) < 10 {
            thread::yield_now();
        }
        running.store(false, Ordering::SeqCst);
        producer.join().unwrap();

        assert_eq!(old_calls.load(Ordering::SeqCst), old_after_replace);
        assert!(control.last_gain().is_some());
    }

    #[test]
    fn dropped_handler_stops_delivery() {
        let mock = two_device_mock();
        let emitter = mock.emitter();
        let control = streaming(&mock, "1000");
        let (count, handler) = counter();
        control.set_stream_callback(Some(handler));
        // The only strong reference was moved into the call and dropped.
        assert!(emitter.emit_samples(&block(0)));
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(control.stream_stats().dropped, 1);
    }

    #[test]
    fn power_overload_is_acknowledged_after_handler() {
        let mock = two_device_mock();
        let emitter = mock.emitter();
        let control = selected(&mock, "1000");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        let handler: Arc<dyn PowerOverloadHandler> = Arc::new(move |e: PowerOverload| {
            s.lock().unwrap().push(e);
        });
        control.set_power_overload_callback(Some(handler.clone()));
        control.initialize_streaming().unwrap();

        emitter.emit_power_overload(PowerOverload::Detected);
        emitter.emit_power_overload(PowerOverload::Corrected);

        assert_eq!(
            *seen.lock().unwrap(),
            vec![PowerOverload::Detected, PowerOverload::Corrected]
        );
        assert_eq!(mock.overload_acks(), 2);
    }

    #[test]
    fn overload_acknowledgement_can_be_disabled() {
        let mock = two_device_mock();
        let emitter = mock.emitter();
        let control = DeviceControl::builder(Arc::new(mock.clone()))
            .auto_acknowledge_overload(false)
            .build()
            .unwrap();
        control.open().unwrap();
        control
            .select_device(&DeviceInfo::new("1000", Model::Rsp1A))
            .unwrap();
        control.initialize_streaming().unwrap();
        emitter.emit_power_overload(PowerOverload::Detected);
        assert_eq!(mock.overload_acks(), 0);
    }

    #[test]
    fn device_removal_surfaces_as_connection_lost() {
        let mock = two_device_mock();
        let emitter = mock.emitter();
        let control = streaming(&mock, "1000");

        mock.unplug("1000");
        assert!(emitter.emit_device_removed());

        let err = control.set_frequency(7_000_000.0).unwrap_err();
        assert!(matches!(err, Error::ConnectionLost));
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert_eq!(control.get_last_error().unwrap(), "connection lost");

        // Teardown still works.
        control.stop_streaming().unwrap();
        assert_eq!(
            control.initialize_streaming().unwrap_err().kind(),
            ErrorKind::State
        );
        control.release_device().unwrap();
        assert_eq!(control.state(), DeviceState::Opened);

        let err = control
            .select_device(&DeviceInfo::new("1000", Model::Rsp1A))
            .unwrap_err();
        assert!(matches!(err, Error::DeviceNotFound(_)));
    }

    #[test]
    fn reselect_after_removal_clears_connection_lost() {
        let mock = two_device_mock();
        let emitter = mock.emitter();
        let control = streaming(&mock, "1000");
        emitter.emit_device_removed();
        control.stop_streaming().unwrap();
        control.release_device().unwrap();

        control
            .select_device(&DeviceInfo::new("2000", Model::RspDxR2))
            .unwrap();
        control.set_frequency(7_000_000.0).unwrap();
    }

    #[test]
    fn close_while_streaming_tears_down() {
        let mock = two_device_mock();
        let emitter = mock.emitter();
        let control = streaming(&mock, "1000");
        let (count, handler) = counter();
        control.set_stream_callback(Some(handler.clone()));

        control.close();
        assert_eq!(control.state(), DeviceState::Closed);
        assert!(!mock.is_streaming("1000"));
        assert!(!mock.is_claimed("1000"));
        assert!(!mock.is_open());
        assert!(!emitter.emit_stale_samples(&block(0)));
        assert_eq!(count.load(Ordering::SeqCst), 0);

        let calls = mock.calls();
        let tail = &calls[calls.len() - 4..];
        assert_eq!(
            tail,
            &[
                MockCall::StopStream,
                MockCall::UninitStream,
                MockCall::ReleaseDevice,
                MockCall::Close,
            ]
        );
    }

    #[test]
    fn close_records_teardown_failures_and_still_closes() {
        let mock = two_device_mock();
        let control = streaming(&mock, "1000");
        mock.fail_next(MockCall::StopStream, ApiErrorCode::HwError);

        control.close();
        assert_eq!(control.state(), DeviceState::Closed);
        assert!(control.get_current_device().is_none());
        assert!(
            control
                .get_last_error()
                .unwrap()
                .starts_with("stop_streaming failed")
        );
        assert!(!mock.is_open());
    }

    #[test]
    fn close_on_closed_instance_is_a_no_op() {
        let mock = MockApi::new();
        let control = control_for(&mock);
        control.close();
        assert!(mock.calls().is_empty());
    }

    #[test]
    fn drop_closes_the_session() {
        let mock = two_device_mock();
        {
            let _control = streaming(&mock, "2000");
            assert!(mock.is_streaming("2000"));
        }
        assert!(!mock.is_claimed("2000"));
        assert!(!mock.is_open());
    }

    #[test]
    fn last_error_is_kept_until_cleared() {
        let mock = two_device_mock();
        let control = control_for(&mock);
        assert!(control.release_device().is_err());
        let recorded = control.get_last_error().unwrap();
        assert!(recorded.contains("release_device"));

        control.open().unwrap();
        assert_eq!(control.get_last_error().unwrap(), recorded);

        control.clear_last_error();
        assert!(control.get_last_error().is_none());
    }

    #[test]
    fn last_error_is_overwritten_by_later_failure() {
        let control = control_for(&two_device_mock());
        assert!(control.start_streaming().is_err());
        assert!(control.release_device().is_err());
        assert!(control.get_last_error().unwrap().contains("release_device"));
    }

    #[derive(Debug, Clone, Copy)]
    enum Op {
        Open,
        Select,
        Release,
        Init,
        Start,
        Stop,
        Uninit,
        Tune,
    }

    const OPS: [Op; 8] = [
        Op::Open,
        Op::Select,
        Op::Release,
        Op::Init,
        Op::Start,
        Op::Stop,
        Op::Uninit,
        Op::Tune,
    ];

    fn run(control: &DeviceControl, op: Op) -> Result<()> {
        match op {
            Op::Open => control.open(),
            Op::Select => control
                .select_device(&DeviceInfo::new("1000", Model::Rsp1A))
                .map(|_| ()),
            Op::Release => control.release_device(),
            Op::Init => control.initialize_streaming(),
            Op::Start => control.start_streaming(),
            Op::Stop => control.stop_streaming(),
            Op::Uninit => control.uninitialize_streaming(),
            Op::Tune => control.set_frequency(50_000_000.0),
        }
    }

    fn expected(state: DeviceState, op: Op) -> Option<DeviceState> {
        use DeviceState::*;
        match (op, state) {
            (Op::Open, Closed) => Some(Opened),
            (Op::Open, s) => Some(s),
            (Op::Select, Opened) => Some(DeviceSelected),
            (Op::Release, DeviceSelected | StreamingInitialized) => Some(Opened),
            (Op::Init, DeviceSelected) => Some(StreamingInitialized),
            (Op::Start, StreamingInitialized) => Some(Streaming),
            (Op::Stop, Streaming) => Some(StreamingInitialized),
            (Op::Uninit, StreamingInitialized) => Some(DeviceSelected),
            (Op::Tune, s) if s.has_device() => Some(s),
            _ => None,
        }
    }

    fn drive_to(control: &DeviceControl, target: DeviceState) {
        let path = [Op::Open, Op::Select, Op::Init, Op::Start];
        for op in path.iter().take(target as usize) {
            run(control, *op).unwrap();
        }
        assert_eq!(control.state(), target);
    }

    #[test]
    fn every_operation_transitions_or_leaves_state_unchanged() {
        use DeviceState::*;
        for start in [Closed, Opened, DeviceSelected, StreamingInitialized, Streaming] {
            for op in OPS {
                let mock = two_device_mock();
                let control = control_for(&mock);
                drive_to(&control, start);

                let result = run(&control, op);
                match expected(start, op) {
                    Some(next) => {
                        assert!(result.is_ok(), "{op:?} from {start}: {result:?}");
                        assert_eq!(control.state(), next, "{op:?} from {start}");
                    }
                    None => {
                        let err = result.unwrap_err();
                        assert_eq!(err.kind(), ErrorKind::State, "{op:?} from {start}");
                        assert_eq!(control.state(), start, "{op:?} from {start}");
                    }
                }
            }
        }
    }

    #[tokio::test]
    async fn state_changes_are_broadcast() {
        let mock = two_device_mock();
        let control = control_for(&mock);
        let mut rx = control.subscribe();

        control.open().unwrap();
        control
            .select_device(&DeviceInfo::new("1000", Model::Rsp1A))
            .unwrap();

        assert_eq!(
            rx.recv().await.unwrap(),
            DeviceEvent::StateChanged {
                from: DeviceState::Closed,
                to: DeviceState::Opened
            }
        );
        assert_eq!(
            rx.recv().await.unwrap(),
            DeviceEvent::StateChanged {
                from: DeviceState::Opened,
                to: DeviceState::DeviceSelected
            }
        );
    }

    #[tokio::test]
    async fn hardware_events_are_broadcast() {
        let mock = two_device_mock();
        let emitter: MockEmitter = mock.emitter();
        let control = selected(&mock, "1000");
        control.initialize_streaming().unwrap();
        let mut rx = control.subscribe();

        emitter.emit_gain(gain(30));
        emitter.emit_power_overload(PowerOverload::Detected);
        emitter.emit_device_removed();

        assert_eq!(rx.recv().await.unwrap(), DeviceEvent::GainChanged(gain(30)));
        assert_eq!(
            rx.recv().await.unwrap(),
            DeviceEvent::PowerOverload(PowerOverload::Detected)
        );
        assert_eq!(rx.recv().await.unwrap(), DeviceEvent::DeviceRemoved);
        assert_eq!(control.last_gain(), Some(gain(30)));
    }

    #[tokio::test]
    async fn sample_channel_receives_streamed_blocks() {
        let mock = two_device_mock();
        let emitter = mock.emitter();
        let control = streaming(&mock, "2000");
        let (handler, mut samples) = rsplib_core::sample_channel(16);
        let handler = Arc::new(handler);
        control.set_stream_callback(Some(handler.clone()));

        let producer = thread::spawn(move || {
            for n in 0..5 {
                emitter.emit_samples(&block(n));
            }
        });
        for n in 0..5 {
            let received = samples.recv().await.unwrap();
            assert_eq!(received.first_sample_num, n * 64);
        }
        producer.join().unwrap();
        assert_eq!(handler.dropped_blocks(), 0);
    }
}
