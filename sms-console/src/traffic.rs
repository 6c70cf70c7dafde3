//! Line traffic printing

use chrono::{DateTime, Local};
use sms_modem::DeviceEvent;
use tokio::sync::mpsc::UnboundedReceiver;

const TIME_FORMAT: &str = "%H:%M:%S%.3f";

/// Format a traffic event as `HH:MM:SS.mmm TX|RX line`
pub fn format_event(event: &DeviceEvent) -> Option<String> {
    match event {
        DeviceEvent::LineSent { line, timestamp } => Some(format_line("TX", line, timestamp)),
        DeviceEvent::LineReceived { line, timestamp } => Some(format_line("RX", line, timestamp)),
        _ => None,
    }
}

fn format_line(direction: &str, line: &str, timestamp: &DateTime<Local>) -> String {
    format!("{} {} {}", timestamp.format(TIME_FORMAT), direction, line)
}

/// Print every traffic event queued so far to stderr
pub fn flush(rx: &mut Option<UnboundedReceiver<DeviceEvent>>) {
    let Some(rx) = rx else { return };
    while let Ok(event) = rx.try_recv() {
        if let Some(line) = format_event(&event) {
            eprintln!("{}", line);
        }
    }
}
