//! Per-device read session
//!
//! A session owns one configured device. It announces the device with `Connected`, turns
//! every frame read from the accessory endpoint into a `Barcode` event and ends with a single
//! `Disconnected` once the device stops answering. Sessions run on their own OS thread so a
//! blocked read or a panic only ever affects one device.

use common::{BulkRead, EventSink, Shutdown, TransportError, UsbDevice};
use protocol::{DeviceId, FrameDecoder, ProtocolError, ScannerEvent, decode_scan};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::thread::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use super::registry::SessionGuard;

/// Upper bound for one bulk read
pub const READ_CHUNK_SIZE: usize = 16 * 1024;

/// How a session ended
#[derive(Debug)]
pub enum SessionEnd {
    /// Transfer failed, the device is gone
    Disconnected(TransportError),
    /// A frame could not be decoded; later frame boundaries cannot be trusted
    Malformed(ProtocolError),
    /// Shutdown was requested
    Shutdown,
    /// The event bus was closed under us
    BusClosed,
}

/// Run a session until the device goes away, a frame is corrupt, or shutdown
///
/// `Disconnected` is published exactly once for the first two outcomes and never for the
/// others.
pub fn run_session<D: UsbDevice>(
    device: &D,
    device_id: &DeviceId,
    sink: &EventSink,
    shutdown: &Shutdown,
) -> SessionEnd {
    let connected = ScannerEvent::Connected {
        device_id: device_id.clone(),
    };
    if sink.publish(connected).is_err() {
        return SessionEnd::BusClosed;
    }
    info!("Session started for {} ({})", device_id, device.identity());

    let end = match device.open_accessory() {
        Ok(mut reader) => read_loop(&mut reader, device_id, sink, shutdown),
        Err(e) => {
            error!("Failed to open accessory endpoint on {}: {}", device_id, e);
            SessionEnd::Disconnected(e)
        }
    };

    match &end {
        SessionEnd::Disconnected(_) | SessionEnd::Malformed(_) => {
            publish_disconnected(device_id, sink);
        }
        SessionEnd::Shutdown => debug!("Session for {} stopped for shutdown", device_id),
        SessionEnd::BusClosed => debug!("Event bus closed, dropping session for {}", device_id),
    }
    end
}

fn read_loop<R: BulkRead>(
    reader: &mut R,
    device_id: &DeviceId,
    sink: &EventSink,
    shutdown: &Shutdown,
) -> SessionEnd {
    let mut decoder = FrameDecoder::new();
    let mut buf = vec![0u8; READ_CHUNK_SIZE];
    let max_packet_size = reader.max_packet_size();

    loop {
        if shutdown.is_triggered() {
            return SessionEnd::Shutdown;
        }

        let request = read_request_len(&decoder, max_packet_size);
        let len = match reader.read_bulk(&mut buf[..request]) {
            Ok(len) => len,
            Err(e) if e.is_timeout() => continue,
            Err(e) => {
                if let Err(partial) = decoder.finish() {
                    warn!("{} disconnected mid-frame: {}", device_id, partial);
                }
                info!("{} disconnected: {}", device_id, e);
                return SessionEnd::Disconnected(e);
            }
        };
        trace!("Read {} bytes from {}", len, device_id);
        decoder.extend(&buf[..len]);

        while let Some(frame) = decoder.next_frame() {
            let scan = match decode_scan(&frame) {
                Ok(scan) => scan,
                Err(e) => {
                    error!("Malformed frame from {}: {}", device_id, e);
                    return SessionEnd::Malformed(e);
                }
            };

            let event = ScannerEvent::Barcode {
                device_id: device_id.clone(),
                raw_bytes: scan.raw_bytes,
                text: scan.text,
            };
            if sink.publish(event).is_err() {
                return SessionEnd::BusClosed;
            }
        }
    }
}

/// Bytes to request for the next bulk read
///
/// A transfer only completes when its buffer fills or a short packet arrives. A frame whose
/// wire length is a multiple of the packet size ends without a short packet, so requests never
/// reach past the frame being assembled. Requests stay whole multiples of the packet size,
/// otherwise a full packet would overflow them.
fn read_request_len(decoder: &FrameDecoder, max_packet_size: usize) -> usize {
    let packet = match max_packet_size {
        0 => READ_CHUNK_SIZE,
        size => size.min(READ_CHUNK_SIZE),
    };
    let remaining = match decoder.expected_len() {
        Some(expected) => expected.saturating_sub(decoder.buffered()).max(1),
        None => packet,
    };
    (remaining.div_ceil(packet) * packet).min(READ_CHUNK_SIZE)
}

fn publish_disconnected(device_id: &DeviceId, sink: &EventSink) {
    let event = ScannerEvent::Disconnected {
        device_id: device_id.clone(),
    };
    if sink.publish(event).is_err() {
        debug!("Event bus closed before Disconnected for {}", device_id);
    }
}

/// Run a session on a dedicated thread named `scanner-<device_id>`
///
/// The guard keeps the device registered until the thread finishes. A panic inside the session
/// is caught and reported as a disconnect.
pub fn spawn_session<D: UsbDevice>(
    device: D,
    guard: SessionGuard,
    sink: EventSink,
    shutdown: Shutdown,
) -> std::io::Result<JoinHandle<()>> {
    let name = format!("scanner-{}", guard.device_id());
    std::thread::Builder::new().name(name).spawn(move || {
        let device_id = guard.device_id().clone();
        let result = catch_unwind(AssertUnwindSafe(|| {
            run_session(&device, &device_id, &sink, &shutdown)
        }));

        match result {
            Ok(end) => debug!("Session for {} ended: {:?}", device_id, end),
            Err(panic) => {
                error!("Panic in session for {}: {:?}", device_id, panic);
                publish_disconnected(&device_id, &sink);
            }
        }
        drop(guard);
    })
}
