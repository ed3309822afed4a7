//! Text and JSON rendering of settings, snapshots and events.

use anyhow::Result;
use owo_colors::OwoColorize;
use serde::Serialize;
use shotstopper_core::{ConnectionState, DisconnectReason, SessionEvent, Snapshot};
use shotstopper_types::{DeviceSettings, Setting, SettingValue};

/// Width of the setting name column.
const NAME_WIDTH: usize = 18;

/// Human form of one value: flags as on/off, durations with a unit.
pub fn format_value(setting: Setting, value: SettingValue) -> String {
    match (setting, value) {
        (_, SettingValue::Bool(true)) => "on".to_string(),
        (_, SettingValue::Bool(false)) => "off".to_string(),
        (
            Setting::MinShotDuration | Setting::MaxShotDuration | Setting::DripDelay,
            SettingValue::Int(v),
        ) => format!("{}s", v),
        (Setting::FirmwareVersion, SettingValue::Int(0)) => "unknown".to_string(),
        (_, value) => value.to_string(),
    }
}

fn format_line(setting: Setting, value: SettingValue, color: bool) -> String {
    let name = format!("{:<width$}", setting.name(), width = NAME_WIDTH);
    let value = format_value(setting, value);
    match (color, setting.is_writable()) {
        (true, true) => format!("  {} {}", name.cyan(), value.bold()),
        (true, false) => format!("  {} {}", name.dimmed(), value),
        (false, _) => format!("  {} {}", name, value),
    }
}

pub fn format_settings_text(settings: &DeviceSettings, color: bool) -> String {
    Setting::ALL
        .into_iter()
        .map(|setting| format_line(setting, settings.get(setting), color))
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_connection(connection: &ConnectionState) -> String {
    let link = if connection.connected {
        "connected"
    } else if connection.scanning {
        "scanning"
    } else {
        "disconnected"
    };
    let mut line = format!("{} (radio {})", link, connection.radio_state);
    if let Some(kind) = connection.last_error {
        line.push_str(&format!(", last error: {}", kind));
    }
    line
}

pub fn format_snapshot_text(snapshot: &Snapshot, color: bool) -> String {
    let status = format_connection(&snapshot.connection);
    let header = if color {
        format!("Link: {}", status.bold())
    } else {
        format!("Link: {}", status)
    };
    format!(
        "{}\n{}",
        header,
        format_settings_text(&snapshot.settings, color)
    )
}

pub fn format_settings_json(settings: &DeviceSettings) -> Result<String> {
    Ok(serde_json::to_string_pretty(settings)?)
}

pub fn format_snapshot_json(snapshot: &Snapshot) -> Result<String> {
    Ok(serde_json::to_string_pretty(snapshot)?)
}

pub fn format_value_json(setting: Setting, value: SettingValue) -> Result<String> {
    #[derive(Serialize)]
    struct ValueJson {
        setting: &'static str,
        value: SettingValue,
        writable: bool,
    }
    Ok(serde_json::to_string(&ValueJson {
        setting: setting.name(),
        value,
        writable: setting.is_writable(),
    })?)
}

fn format_reason(reason: DisconnectReason) -> &'static str {
    match reason {
        DisconnectReason::UserRequested => "requested",
        DisconnectReason::Backgrounded => "backgrounded",
        DisconnectReason::RadioOff => "radio off",
        DisconnectReason::WriteFailed => "write failed",
        DisconnectReason::LinkLost => "link lost",
        _ => "unknown",
    }
}

/// One line per event for `watch`. Returns `None` for events not worth showing.
pub fn format_event_text(event: &SessionEvent) -> Option<String> {
    let line = match event {
        SessionEvent::ScanStarted => "scanning".to_string(),
        SessionEvent::ScanStopped { matched: false } => "scan finished without a match".to_string(),
        SessionEvent::ScanStopped { matched: true } => return None,
        SessionEvent::PeripheralDiscovered { peripheral } => format!(
            "found {} ({})",
            peripheral.name.as_deref().unwrap_or("unnamed"),
            peripheral.id
        ),
        SessionEvent::Connected { id, name } => {
            format!("connected to {} ({})", name.as_deref().unwrap_or("unnamed"), id)
        }
        SessionEvent::Disconnected { id, reason } => {
            format!("disconnected from {} ({})", id, format_reason(*reason))
        }
        SessionEvent::RadioStateChanged { state } => format!("radio {}", state),
        SessionEvent::AppStateChanged { state } => format!("app {}", state),
        SessionEvent::SettingsRead {
            firmware_version,
            extended,
        } => format!(
            "settings read (firmware {}{})",
            firmware_version,
            if *extended { "" } else { ", weight only" }
        ),
        SessionEvent::SettingWritten { setting, value } => {
            format!("{} = {}", setting, format_value(*setting, *value))
        }
        SessionEvent::WriteRolledBack { setting, restored } => format!(
            "{} write failed, restored {}",
            setting,
            format_value(*setting, *restored)
        ),
        SessionEvent::ScaleStatusChanged { status } => format!("scale {}", status),
        SessionEvent::Error { message, .. } => format!("error: {}", message),
        _ => return None,
    };
    Some(line)
}

pub fn format_event_json(event: &SessionEvent) -> Result<String> {
    Ok(serde_json::to_string(event)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use shotstopper_core::{PeripheralId, RadioState};
    use shotstopper_types::ScaleStatus;

    #[test]
    fn test_format_value_units() {
        assert_eq!(format_value(Setting::AutoTare, SettingValue::Bool(true)), "on");
        assert_eq!(format_value(Setting::DripDelay, SettingValue::Int(3)), "3s");
        assert_eq!(format_value(Setting::WeightValue, SettingValue::Int(36)), "36");
        assert_eq!(format_value(Setting::FirmwareVersion, SettingValue::Int(0)), "unknown");
        assert_eq!(
            format_value(
                Setting::ScaleStatus,
                SettingValue::Status(ScaleStatus::Connected)
            ),
            "connected"
        );
    }

    #[test]
    fn test_settings_text_lists_every_setting() {
        let text = format_settings_text(&DeviceSettings::default(), false);
        assert_eq!(text.lines().count(), Setting::COUNT);
        for setting in Setting::ALL {
            assert!(text.contains(setting.name()), "missing {}", setting);
        }
    }

    #[test]
    fn test_snapshot_text_reports_link() {
        let mut snapshot = Snapshot::default();
        snapshot.connection.connected = true;
        snapshot.connection.radio_state = RadioState::On;
        let text = format_snapshot_text(&snapshot, false);
        assert!(text.starts_with("Link: connected (radio on)"));
    }

    #[test]
    fn test_value_json_shape() {
        let json = format_value_json(Setting::Momentary, SettingValue::Bool(false)).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["setting"], "momentary");
        assert_eq!(parsed["value"], false);
        assert_eq!(parsed["writable"], true);
    }

    #[test]
    fn test_event_lines() {
        let id = PeripheralId::new("AA:BB");
        assert_eq!(
            format_event_text(&SessionEvent::Disconnected {
                id,
                reason: DisconnectReason::RadioOff
            })
            .as_deref(),
            Some("disconnected from AA:BB (radio off)")
        );
        assert_eq!(
            format_event_text(&SessionEvent::ScanStopped { matched: true }),
            None
        );
        assert_eq!(
            format_event_text(&SessionEvent::SettingsRead {
                firmware_version: 0,
                extended: false
            })
            .as_deref(),
            Some("settings read (firmware 0, weight only)")
        );
    }
}
