//! Rendering of scanner events for stdout

use crate::config::OutputFormat;
use protocol::ScannerEvent;

/// Render one event as a single line (without trailing newline)
pub fn format_event(event: &ScannerEvent, format: OutputFormat) -> serde_json::Result<String> {
    match format {
        OutputFormat::Json => serde_json::to_string(event),
        OutputFormat::Pretty => Ok(format_pretty(event)),
    }
}

fn format_pretty(event: &ScannerEvent) -> String {
    match event {
        ScannerEvent::Connected { device_id } => format!("[{}] connected", device_id),
        ScannerEvent::Disconnected { device_id } => format!("[{}] disconnected", device_id),
        ScannerEvent::Barcode {
            device_id,
            raw_bytes,
            text,
        } => {
            let mut line = format!("[{}] barcode", device_id);
            if let Some(text) = text {
                line.push_str(&format!(" text={:?}", text));
            }
            if let Some(raw) = raw_bytes {
                let hex: String = raw.iter().map(|b| format!("{:02x}", b)).collect();
                line.push_str(&format!(" raw={}", hex));
            }
            if text.is_none() && raw_bytes.is_none() {
                line.push_str(" (empty)");
            }
            line
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::DeviceId;

    fn barcode(raw_bytes: Option<Vec<u8>>, text: Option<&str>) -> ScannerEvent {
        ScannerEvent::Barcode {
            device_id: DeviceId::from("1-5"),
            raw_bytes,
            text: text.map(str::to_string),
        }
    }

    #[test]
    fn test_json_lines() {
        let line = format_event(&barcode(None, Some("ABC123")), OutputFormat::Json).unwrap();
        assert_eq!(
            line,
            r#"{"kind":"barcode","device_id":"1-5","text":"ABC123"}"#
        );

        let connected = ScannerEvent::Connected {
            device_id: DeviceId::from("2-9"),
        };
        assert_eq!(
            format_event(&connected, OutputFormat::Json).unwrap(),
            r#"{"kind":"connected","device_id":"2-9"}"#
        );
    }

    #[test]
    fn test_pretty_lines() {
        let line = format_event(
            &barcode(Some(vec![0x41, 0x0a]), Some("A\n")),
            OutputFormat::Pretty,
        )
        .unwrap();
        assert_eq!(line, r#"[1-5] barcode text="A\n" raw=410a"#);

        let empty = format_event(&barcode(None, None), OutputFormat::Pretty).unwrap();
        assert_eq!(empty, "[1-5] barcode (empty)");

        let gone = ScannerEvent::Disconnected {
            device_id: DeviceId::from("1-5"),
        };
        assert_eq!(
            format_event(&gone, OutputFormat::Pretty).unwrap(),
            "[1-5] disconnected"
        );
    }
}
