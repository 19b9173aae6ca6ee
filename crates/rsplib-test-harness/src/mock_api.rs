//! Simulated hardware API for deterministic testing of the control layer.
//!
//! [`MockApi`] implements [`HardwareApi`] entirely in memory. Tests attach
//! simulated devices, inject one-shot failures for individual calls, claim
//! devices on behalf of "another session", and inspect the call log and the
//! parameter block the simulated hardware holds.
//!
//! Asynchronous events are produced through a [`MockEmitter`], which can be
//! cloned and moved to any thread to play the role of the vendor library's
//! delivery thread.
//!
//! # Example
//!
//! ```
//! use rsplib_core::{DeviceInfo, HardwareApi, Model};
//! use rsplib_test_harness::{MockApi, MockCall};
//! use rsplib_core::ApiErrorCode;
//!
//! let mock = MockApi::new();
//! mock.add_device(DeviceInfo::new("1000", Model::Rsp1A));
//! mock.fail_next(MockCall::Open, ApiErrorCode::ServiceNotResponding);
//!
//! assert!(mock.open().is_err());
//! assert!(mock.open().is_ok());
//! assert_eq!(mock.get_devices().unwrap().len(), 1);
//! ```

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rsplib_core::api::{EventSink, HardwareApi};
use rsplib_core::error::{ApiErrorCode, ApiResult};
use rsplib_core::types::{
    DeviceHandle, DeviceInfo, DeviceParams, GainUpdate, ParamUpdate, PowerOverload, SampleBlock,
};

/// Version reported by [`MockApi::api_version`] unless overridden.
pub const MOCK_API_VERSION: f32 = 3.15;

/// Lowest tunable frequency accepted by the simulated hardware.
const MIN_FREQUENCY_HZ: f64 = 1_000.0;

/// Highest tunable frequency accepted by the simulated hardware.
const MAX_FREQUENCY_HZ: f64 = 2_000_000_000.0;

/// Identifies a [`HardwareApi`] method, for failure injection and the call log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockCall {
    Open,
    Close,
    ApiVersion,
    LockDeviceApi,
    UnlockDeviceApi,
    GetDevices,
    SelectDevice,
    ReleaseDevice,
    DeviceParams,
    Update,
    InitStream,
    StartStream,
    StopStream,
    UninitStream,
    AcknowledgeOverload,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamPhase {
    Idle,
    Initialised,
    Started,
}

struct MockDevice {
    info: DeviceInfo,
    params: DeviceParams,
    phase: StreamPhase,
    sink: Option<Arc<dyn EventSink>>,
}

struct MockState {
    sessions: u32,
    api_version: f32,
    devices: Vec<DeviceInfo>,
    claimed_elsewhere: HashSet<String>,
    next_handle: u64,
    claimed: HashMap<u64, MockDevice>,
    failures: HashMap<MockCall, VecDeque<ApiErrorCode>>,
    calls: Vec<MockCall>,
    api_locked: bool,
    overload_acks: u32,
    updates: Vec<ParamUpdate>,
}

impl MockState {
    fn new() -> Self {
        MockState {
            sessions: 0,
            api_version: MOCK_API_VERSION,
            devices: Vec::new(),
            claimed_elsewhere: HashSet::new(),
            next_handle: 1,
            claimed: HashMap::new(),
            failures: HashMap::new(),
            calls: Vec::new(),
            api_locked: false,
            overload_acks: 0,
            updates: Vec::new(),
        }
    }

    /// Record a call and pop any failure injected for it.
    fn enter(&mut self, call: MockCall) -> ApiResult<()> {
        self.calls.push(call);
        match self.failures.get_mut(&call).and_then(VecDeque::pop_front) {
            Some(code) => Err(code),
            None => Ok(()),
        }
    }

    fn require_session(&self) -> ApiResult<()> {
        if self.sessions == 0 {
            return Err(ApiErrorCode::ServiceNotResponding);
        }
        Ok(())
    }

    fn device_mut(&mut self, handle: DeviceHandle) -> ApiResult<&mut MockDevice> {
        self.claimed
            .get_mut(&handle.raw())
            .ok_or(ApiErrorCode::InvalidParam)
    }

    /// The sink of the device whose stream is initialised, if any.
    fn active_sink(&self) -> Option<(Arc<dyn EventSink>, StreamPhase)> {
        self.claimed
            .values()
            .find_map(|d| d.sink.as_ref().map(|s| (s.clone(), d.phase)))
    }
}

fn lock(state: &Mutex<MockState>) -> MutexGuard<'_, MockState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// An in-memory [`HardwareApi`] for tests.
///
/// Cloning a `MockApi` yields another handle onto the same simulated
/// hardware, so two device-control instances can share it to exercise
/// cross-session claims.
#[derive(Clone)]
pub struct MockApi {
    state: Arc<Mutex<MockState>>,
}

impl MockApi {
    /// Create a simulated API with no devices attached.
    pub fn new() -> Self {
        MockApi {
            state: Arc::new(Mutex::new(MockState::new())),
        }
    }

    /// Create a simulated API with the given devices attached.
    pub fn with_devices(devices: impl IntoIterator<Item = DeviceInfo>) -> Self {
        let mock = MockApi::new();
        for info in devices {
            mock.add_device(info);
        }
        mock
    }

    /// Attach a device.
    pub fn add_device(&self, info: DeviceInfo) {
        lock(&self.state).devices.push(info);
    }

    /// Detach a device. A claimed device stays claimed until released, as
    /// the real library does; use [`MockEmitter::emit_device_removed`] to
    /// notify the stream owner.
    pub fn unplug(&self, serial: &str) {
        lock(&self.state).devices.retain(|d| d.serial != serial);
    }

    /// Mark a device as claimed by a session outside this process.
    pub fn claim_elsewhere(&self, serial: &str) {
        lock(&self.state)
            .claimed_elsewhere
            .insert(serial.to_string());
    }

    /// Undo [`claim_elsewhere`](MockApi::claim_elsewhere).
    pub fn release_elsewhere(&self, serial: &str) {
        lock(&self.state).claimed_elsewhere.remove(serial);
    }

    /// Make the next call of `call` fail with `code`. Multiple injections
    /// for the same call are consumed in order.
    pub fn fail_next(&self, call: MockCall, code: ApiErrorCode) {
        lock(&self.state)
            .failures
            .entry(call)
            .or_default()
            .push_back(code);
    }

    /// Override the version reported by `api_version`.
    pub fn set_api_version(&self, version: f32) {
        lock(&self.state).api_version = version;
    }

    /// Every call made so far, in order.
    pub fn calls(&self) -> Vec<MockCall> {
        lock(&self.state).calls.clone()
    }

    /// How many times `call` has been made.
    pub fn call_count(&self, call: MockCall) -> usize {
        lock(&self.state).calls.iter().filter(|&&c| c == call).count()
    }

    /// Every successful parameter update, in order.
    pub fn updates(&self) -> Vec<ParamUpdate> {
        lock(&self.state).updates.clone()
    }

    /// Whether at least one session is open.
    pub fn is_open(&self) -> bool {
        lock(&self.state).sessions > 0
    }

    /// Whether the device-API lock is currently held.
    pub fn is_api_locked(&self) -> bool {
        lock(&self.state).api_locked
    }

    /// Whether a device is currently claimed through this API.
    pub fn is_claimed(&self, serial: &str) -> bool {
        lock(&self.state)
            .claimed
            .values()
            .any(|d| d.info.serial == serial)
    }

    /// Whether the device's stream has been started and not stopped.
    pub fn is_streaming(&self, serial: &str) -> bool {
        lock(&self.state)
            .claimed
            .values()
            .any(|d| d.info.serial == serial && d.phase == StreamPhase::Started)
    }

    /// The parameter block the simulated hardware holds for a claimed device.
    pub fn hardware_params(&self, serial: &str) -> Option<DeviceParams> {
        lock(&self.state)
            .claimed
            .values()
            .find(|d| d.info.serial == serial)
            .map(|d| d.params)
    }

    /// Number of overload acknowledgements received.
    pub fn overload_acks(&self) -> u32 {
        lock(&self.state).overload_acks
    }

    /// An emitter that plays the role of the library's delivery thread.
    pub fn emitter(&self) -> MockEmitter {
        MockEmitter {
            state: self.state.clone(),
        }
    }
}

impl Default for MockApi {
    fn default() -> Self {
        Self::new()
    }
}

impl HardwareApi for MockApi {
    fn open(&self) -> ApiResult<()> {
        let mut s = lock(&self.state);
        s.enter(MockCall::Open)?;
        s.sessions += 1;
        Ok(())
    }

    fn close(&self) -> ApiResult<()> {
        let mut s = lock(&self.state);
        s.enter(MockCall::Close)?;
        s.require_session()?;
        s.sessions -= 1;
        Ok(())
    }

    fn api_version(&self) -> ApiResult<f32> {
        let mut s = lock(&self.state);
        s.enter(MockCall::ApiVersion)?;
        Ok(s.api_version)
    }

    fn lock_device_api(&self) -> ApiResult<()> {
        let mut s = lock(&self.state);
        s.enter(MockCall::LockDeviceApi)?;
        s.require_session()?;
        if s.api_locked {
            return Err(ApiErrorCode::Fail);
        }
        s.api_locked = true;
        Ok(())
    }

    fn unlock_device_api(&self) -> ApiResult<()> {
        let mut s = lock(&self.state);
        s.enter(MockCall::UnlockDeviceApi)?;
        s.api_locked = false;
        Ok(())
    }

    fn get_devices(&self) -> ApiResult<Vec<DeviceInfo>> {
        let mut s = lock(&self.state);
        s.enter(MockCall::GetDevices)?;
        s.require_session()?;
        Ok(s.devices.clone())
    }

    fn select_device(&self, info: &DeviceInfo) -> ApiResult<DeviceHandle> {
        let mut s = lock(&self.state);
        s.enter(MockCall::SelectDevice)?;
        s.require_session()?;
        let Some(found) = s.devices.iter().find(|d| d.serial == info.serial).cloned() else {
            return Err(ApiErrorCode::InvalidParam);
        };
        let in_use = s.claimed.values().any(|d| d.info.serial == found.serial);
        if in_use || s.claimed_elsewhere.contains(&found.serial) {
            return Err(ApiErrorCode::DeviceAlreadyClaimed);
        }
        let raw = s.next_handle;
        s.next_handle += 1;
        s.claimed.insert(
            raw,
            MockDevice {
                params: DeviceParams::defaults_for(found.model),
                info: found,
                phase: StreamPhase::Idle,
                sink: None,
            },
        );
        Ok(DeviceHandle::from_raw(raw))
    }

    fn release_device(&self, handle: DeviceHandle) -> ApiResult<()> {
        let mut s = lock(&self.state);
        s.enter(MockCall::ReleaseDevice)?;
        match s.claimed.remove(&handle.raw()) {
            Some(_) => Ok(()),
            None => Err(ApiErrorCode::InvalidParam),
        }
    }

    fn device_params(&self, handle: DeviceHandle) -> ApiResult<DeviceParams> {
        let mut s = lock(&self.state);
        s.enter(MockCall::DeviceParams)?;
        Ok(s.device_mut(handle)?.params)
    }

    fn update(
        &self,
        handle: DeviceHandle,
        params: &DeviceParams,
        change: ParamUpdate,
    ) -> ApiResult<()> {
        let mut s = lock(&self.state);
        s.enter(MockCall::Update)?;
        if change == ParamUpdate::Frequency
            && !(MIN_FREQUENCY_HZ..=MAX_FREQUENCY_HZ).contains(&params.frequency_hz)
        {
            return Err(ApiErrorCode::RfUpdateError);
        }
        let device = s.device_mut(handle)?;
        device.params = *params;
        // The tuner synthesiser resolves to whole hertz.
        device.params.frequency_hz = params.frequency_hz.round();
        s.updates.push(change);
        Ok(())
    }

    fn init_stream(
        &self,
        handle: DeviceHandle,
        params: &DeviceParams,
        sink: Arc<dyn EventSink>,
    ) -> ApiResult<()> {
        let mut s = lock(&self.state);
        s.enter(MockCall::InitStream)?;
        let device = s.device_mut(handle)?;
        if device.phase != StreamPhase::Idle {
            return Err(ApiErrorCode::AlreadyInitialised);
        }
        device.params = *params;
        device.phase = StreamPhase::Initialised;
        device.sink = Some(sink);
        Ok(())
    }

    fn start_stream(&self, handle: DeviceHandle) -> ApiResult<()> {
        let mut s = lock(&self.state);
        s.enter(MockCall::StartStream)?;
        let device = s.device_mut(handle)?;
        if device.phase == StreamPhase::Idle {
            return Err(ApiErrorCode::NotInitialised);
        }
        device.phase = StreamPhase::Started;
        Ok(())
    }

    fn stop_stream(&self, handle: DeviceHandle) -> ApiResult<()> {
        let mut s = lock(&self.state);
        s.enter(MockCall::StopStream)?;
        let device = s.device_mut(handle)?;
        if device.phase == StreamPhase::Idle {
            return Err(ApiErrorCode::NotInitialised);
        }
        device.phase = StreamPhase::Initialised;
        Ok(())
    }

    fn uninit_stream(&self, handle: DeviceHandle) -> ApiResult<()> {
        let mut s = lock(&self.state);
        s.enter(MockCall::UninitStream)?;
        let device = s.device_mut(handle)?;
        if device.phase == StreamPhase::Idle {
            return Err(ApiErrorCode::NotInitialised);
        }
        device.phase = StreamPhase::Idle;
        device.sink = None;
        Ok(())
    }

    fn acknowledge_overload(&self, handle: DeviceHandle) -> ApiResult<()> {
        let mut s = lock(&self.state);
        s.enter(MockCall::AcknowledgeOverload)?;
        s.device_mut(handle)?;
        s.overload_acks += 1;
        Ok(())
    }
}

/// Produces hardware events for the device whose stream is initialised.
///
/// Each `emit_*` method returns `true` if an event sink was present and was
/// called. The mock's internal lock is released before the sink runs, so
/// emitters on other threads never block lifecycle calls.
#[derive(Clone)]
pub struct MockEmitter {
    state: Arc<Mutex<MockState>>,
}

impl MockEmitter {
    /// Deliver a sample block, but only while the stream is started.
    pub fn emit_samples(&self, block: &SampleBlock) -> bool {
        let sink = match lock(&self.state).active_sink() {
            Some((sink, StreamPhase::Started)) => sink,
            _ => return false,
        };
        sink.stream(block);
        true
    }

    /// Deliver a sample block regardless of the stream phase.
    ///
    /// Models a block that was already in flight in the transport when the
    /// stream was stopped.
    pub fn emit_stale_samples(&self, block: &SampleBlock) -> bool {
        let Some((sink, _)) = lock(&self.state).active_sink() else {
            return false;
        };
        sink.stream(block);
        true
    }

    /// Deliver a gain change.
    pub fn emit_gain(&self, update: GainUpdate) -> bool {
        let Some((sink, _)) = lock(&self.state).active_sink() else {
            return false;
        };
        sink.gain(update);
        true
    }

    /// Deliver an overload onset or recovery.
    pub fn emit_power_overload(&self, event: PowerOverload) -> bool {
        let Some((sink, _)) = lock(&self.state).active_sink() else {
            return false;
        };
        sink.power_overload(event);
        true
    }

    /// Report that the streaming device disappeared and stop its stream.
    pub fn emit_device_removed(&self) -> bool {
        let sink = {
            let mut s = lock(&self.state);
            let Some((sink, _)) = s.active_sink() else {
                return false;
            };
            for device in s.claimed.values_mut() {
                if device.phase == StreamPhase::Started {
                    device.phase = StreamPhase::Initialised;
                }
            }
            sink
        };
        sink.device_removed();
        true
    }
}
