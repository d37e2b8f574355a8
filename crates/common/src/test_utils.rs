//! Test utilities for usb-barcode
//!
//! Provides mock implementations of the USB traits so the configurator, sessions and monitor
//! can be exercised without hardware.
//!
//! # Example
//!
//! ```
//! use common::test_utils::{MockBus, MockDevice};
//! use common::UsbBus;
//!
//! let bus = MockBus::new();
//! bus.attach(MockDevice::new(1, 5, 0x18d1, 0x2d00));
//! assert!(bus.find(1, 5).unwrap().is_some());
//! ```

use crate::channel::EventStream;
use crate::clock::Clock;
use crate::usb_types::{
    BulkRead, ControlTransport, DeviceIdentity, TransportError, UsbBus, UsbDevice,
};
use async_channel::{Receiver, Sender, unbounded};
use protocol::aoa::{ACCESSORY_GET_PROTOCOL, ACCESSORY_START};
use protocol::{ScannerEvent, encode_frame};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Max packet size of a [`MockDevice`] endpoint unless configured otherwise
pub const MOCK_MAX_PACKET_SIZE: usize = 64;

/// Default test timeout (5 seconds)
pub const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Run a future with a timeout
pub async fn with_timeout<F: Future>(
    duration: Duration,
    future: F,
) -> Result<F::Output, tokio::time::error::Elapsed> {
    tokio::time::timeout(duration, future).await
}

/// Control transfer seen by a [`MockDevice`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlRecord {
    pub request_type: u8,
    pub request: u8,
    pub value: u16,
    pub index: u16,
    /// Payload for OUT transfers, empty for IN transfers
    pub data: Vec<u8>,
}

/// One step delivered by a [`FeedReader`]
#[derive(Debug, Clone)]
pub enum ReadStep {
    Data(Vec<u8>),
    Error(TransportError),
}

type StartHook = Box<dyn FnOnce() + Send>;

struct MockDeviceInner {
    protocol_version: Mutex<u16>,
    controls: Mutex<Vec<ControlRecord>>,
    on_start: Mutex<Option<StartHook>>,
    open_error: Mutex<Option<TransportError>>,
    panic_on_open: AtomicBool,
    max_packet_size: AtomicUsize,
    read_requests: Arc<Mutex<Vec<usize>>>,
    accessory_opens: AtomicUsize,
    feed_tx: Sender<ReadStep>,
    feed_rx: Receiver<ReadStep>,
}

/// Simulated USB device
///
/// Answers GET_PROTOCOL with its configured version, records every control transfer and
/// serves bulk data pushed through [`MockDevice::push_frame`] and friends. Closing the feed
/// behaves like unplugging the device.
#[derive(Clone)]
pub struct MockDevice {
    identity: DeviceIdentity,
    inner: Arc<MockDeviceInner>,
}

impl MockDevice {
    /// Create a device speaking AOA version 2
    pub fn new(bus: u8, address: u8, vendor_id: u16, product_id: u16) -> Self {
        let (feed_tx, feed_rx) = unbounded();
        Self {
            identity: DeviceIdentity {
                bus,
                address,
                kernel_path: Some(format!("/devices/mock/usb{}/{}-{}", bus, bus, address)),
                vendor_id,
                product_id,
            },
            inner: Arc::new(MockDeviceInner {
                protocol_version: Mutex::new(2),
                controls: Mutex::new(Vec::new()),
                on_start: Mutex::new(None),
                open_error: Mutex::new(None),
                panic_on_open: AtomicBool::new(false),
                max_packet_size: AtomicUsize::new(MOCK_MAX_PACKET_SIZE),
                read_requests: Arc::new(Mutex::new(Vec::new())),
                accessory_opens: AtomicUsize::new(0),
                feed_tx,
                feed_rx,
            }),
        }
    }

    /// Set the version answered to GET_PROTOCOL
    pub fn with_protocol_version(self, version: u16) -> Self {
        *lock(&self.inner.protocol_version) = version;
        self
    }

    /// Make `open_accessory` fail
    pub fn with_open_error(self, error: TransportError) -> Self {
        *lock(&self.inner.open_error) = Some(error);
        self
    }

    /// Make opening the device panic, like a misbehaving driver binding
    pub fn with_panic_on_open(self) -> Self {
        self.inner.panic_on_open.store(true, Ordering::SeqCst);
        self
    }

    /// Set the max packet size reported by the accessory endpoint
    pub fn with_max_packet_size(self, size: usize) -> Self {
        self.inner.max_packet_size.store(size, Ordering::SeqCst);
        self
    }

    /// Buffer sizes passed to `read_bulk` so far
    pub fn read_requests(&self) -> Vec<usize> {
        lock(&self.inner.read_requests).clone()
    }

    /// Run `hook` when the device receives START
    pub fn on_accessory_start(&self, hook: impl FnOnce() + Send + 'static) {
        *lock(&self.inner.on_start) = Some(Box::new(hook));
    }

    /// Control transfers received so far
    pub fn control_log(&self) -> Vec<ControlRecord> {
        lock(&self.inner.controls).clone()
    }

    /// Number of times the accessory endpoint was opened
    pub fn accessory_opens(&self) -> usize {
        self.inner.accessory_opens.load(Ordering::SeqCst)
    }

    /// Queue raw bytes for the bulk endpoint
    pub fn push_bytes(&self, bytes: Vec<u8>) {
        let _ = self.inner.feed_tx.try_send(ReadStep::Data(bytes));
    }

    /// Queue one framed JSON payload
    pub fn push_frame(&self, json: &[u8]) {
        self.push_bytes(encode_frame(json).expect("payload fits a frame"));
    }

    /// Queue a transfer error
    pub fn push_error(&self, error: TransportError) {
        let _ = self.inner.feed_tx.try_send(ReadStep::Error(error));
    }

    /// Close the feed; pending data is still delivered, then reads fail with `NoDevice`
    pub fn unplug(&self) {
        self.inner.feed_tx.close();
    }
}

impl UsbDevice for MockDevice {
    type Control = MockControl;
    type Reader = FeedReader;

    fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    fn open_control(&self) -> Result<Self::Control, TransportError> {
        self.check_panic_on_open();
        Ok(MockControl {
            inner: self.inner.clone(),
        })
    }

    fn open_accessory(&self) -> Result<Self::Reader, TransportError> {
        self.inner.accessory_opens.fetch_add(1, Ordering::SeqCst);
        self.check_panic_on_open();
        if let Some(error) = lock(&self.inner.open_error).clone() {
            return Err(error);
        }
        Ok(FeedReader {
            rx: self.inner.feed_rx.clone(),
            pending: Vec::new(),
            max_packet_size: self.inner.max_packet_size.load(Ordering::SeqCst),
            requests: self.inner.read_requests.clone(),
        })
    }
}

impl MockDevice {
    fn check_panic_on_open(&self) {
        if self.inner.panic_on_open.load(Ordering::SeqCst) {
            panic!("mock device {} panicked on open", self.identity);
        }
    }
}

/// Control handle of a [`MockDevice`]
pub struct MockControl {
    inner: Arc<MockDeviceInner>,
}

impl ControlTransport for MockControl {
    fn read_control(
        &mut self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        buf: &mut [u8],
    ) -> Result<usize, TransportError> {
        lock(&self.inner.controls).push(ControlRecord {
            request_type,
            request,
            value,
            index,
            data: Vec::new(),
        });

        if request != ACCESSORY_GET_PROTOCOL {
            return Err(TransportError::Pipe);
        }
        let version = lock(&self.inner.protocol_version).to_le_bytes();
        let len = buf.len().min(version.len());
        buf[..len].copy_from_slice(&version[..len]);
        Ok(len)
    }

    fn write_control(
        &mut self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        data: &[u8],
    ) -> Result<usize, TransportError> {
        lock(&self.inner.controls).push(ControlRecord {
            request_type,
            request,
            value,
            index,
            data: data.to_vec(),
        });

        if request == ACCESSORY_START {
            let hook = lock(&self.inner.on_start).take();
            if let Some(hook) = hook {
                hook();
            }
        }
        Ok(data.len())
    }
}

/// Bulk reader fed from a channel
pub struct FeedReader {
    rx: Receiver<ReadStep>,
    pending: Vec<u8>,
    max_packet_size: usize,
    requests: Arc<Mutex<Vec<usize>>>,
}

impl BulkRead for FeedReader {
    fn max_packet_size(&self) -> usize {
        self.max_packet_size
    }

    fn read_bulk(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        lock(&self.requests).push(buf.len());
        if self.pending.is_empty() {
            match self.rx.recv_blocking() {
                Ok(ReadStep::Data(data)) => self.pending = data,
                Ok(ReadStep::Error(error)) => return Err(error),
                Err(_) => return Err(TransportError::NoDevice),
            }
        }

        let len = buf.len().min(self.pending.len());
        buf[..len].copy_from_slice(&self.pending[..len]);
        self.pending.drain(..len);
        Ok(len)
    }
}

#[derive(Default)]
struct MockBusState {
    devices: Vec<MockDevice>,
    enumerations: usize,
}

/// Simulated USB bus
#[derive(Clone, Default)]
pub struct MockBus {
    state: Arc<Mutex<MockBusState>>,
}

impl MockBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Plug a device in
    pub fn attach(&self, device: MockDevice) {
        lock(&self.state).devices.push(device);
    }

    /// Remove the device at bus/address
    pub fn detach(&self, bus: u8, address: u8) -> Option<MockDevice> {
        let mut state = lock(&self.state);
        let position = state
            .devices
            .iter()
            .position(|d| d.identity().is_at(bus, address))?;
        Some(state.devices.remove(position))
    }

    /// Number of full enumerations performed
    pub fn enumerations(&self) -> usize {
        lock(&self.state).enumerations
    }

    /// On START, detach `device` and attach `replacement` (if any)
    ///
    /// Models the accessory-mode switch: the phone drops off the bus and may come back with a
    /// different product id and address.
    pub fn reenumerate_on_start(&self, device: &MockDevice, replacement: Option<MockDevice>) {
        let bus = self.clone();
        let (bus_num, address) = (device.identity().bus, device.identity().address);
        device.on_accessory_start(move || {
            bus.detach(bus_num, address);
            if let Some(replacement) = replacement {
                bus.attach(replacement);
            }
        });
    }
}

impl UsbBus for MockBus {
    type Device = MockDevice;

    fn devices(&self) -> Result<Vec<Self::Device>, TransportError> {
        let mut state = lock(&self.state);
        state.enumerations += 1;
        Ok(state.devices.clone())
    }

    fn find(&self, bus: u8, address: u8) -> Result<Option<Self::Device>, TransportError> {
        Ok(lock(&self.state)
            .devices
            .iter()
            .find(|d| d.identity().is_at(bus, address))
            .cloned())
    }
}

/// Clock that records sleeps instead of sleeping
#[derive(Clone, Default)]
pub struct RecordingClock {
    sleeps: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleeps requested so far
    pub fn sleeps(&self) -> Vec<Duration> {
        lock(&self.sleeps).clone()
    }
}

impl Clock for RecordingClock {
    fn sleep(&self, duration: Duration) {
        lock(&self.sleeps).push(duration);
    }
}

/// Drain every event currently queued on the bus
pub fn collect_events(stream: &EventStream) -> Vec<ScannerEvent> {
    std::iter::from_fn(|| stream.try_recv()).collect()
}

/// Wait until `count` events were received or `timeout` elapsed
pub fn wait_for_events(stream: &EventStream, count: usize, timeout: Duration) -> Vec<ScannerEvent> {
    let deadline = Instant::now() + timeout;
    let mut events = Vec::new();
    while events.len() < count && Instant::now() < deadline {
        match stream.try_recv() {
            Some(event) => events.push(event),
            None => std::thread::sleep(Duration::from_millis(5)),
        }
    }
    events
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
