//! Trace-directory telemetry loading.
//!
//! A collector trace directory holds line-oriented sidecar files next to
//! the capture: user input events, CPU samples, and peripheral state
//! transitions. Malformed lines are logged and skipped; a missing file
//! just leaves its stream empty.

use std::path::Path;

use tracing::warn;

use radiotrace_core::trace::{
    BluetoothSample, BluetoothState, CameraSample, CpuSample, GpsSample, GpsState, ScreenSample,
    Telemetry, UserEvent, UserEventType,
};

const USER_EVENTS_FILE: &str = "processed_events";
const SCREEN_ROTATIONS_FILE: &str = "screen_rotations";
const CPU_FILE: &str = "cpu";
const GPS_FILE: &str = "gps_events";
const CAMERA_FILE: &str = "camera_events";
const BLUETOOTH_FILE: &str = "bluetooth_events";
const SCREEN_FILE: &str = "screen_events";

/// Timestamps above this are absolute unix seconds and get rebased.
const EPOCH_THRESHOLD: f64 = 1.0e9;

/// Load all telemetry sidecar files from a trace directory.
///
/// `base_timestamp` is the capture's wall-clock start; absolute
/// timestamps in the files are rebased against it.
pub fn load_telemetry(dir: &Path, base_timestamp: f64) -> Telemetry {
    let mut telemetry = Telemetry {
        user_events: read_user_events(&dir.join(USER_EVENTS_FILE), base_timestamp),
        cpu_samples: read_cpu(&dir.join(CPU_FILE), base_timestamp),
        gps: read_gps(&dir.join(GPS_FILE), base_timestamp),
        camera: read_camera(&dir.join(CAMERA_FILE), base_timestamp),
        bluetooth: read_bluetooth(&dir.join(BLUETOOTH_FILE), base_timestamp),
        screen: read_screen(&dir.join(SCREEN_FILE), base_timestamp),
    };
    telemetry
        .user_events
        .extend(read_screen_rotations(&dir.join(SCREEN_ROTATIONS_FILE), base_timestamp));
    telemetry.sort();
    telemetry
}

fn read_lines(path: &Path) -> Vec<String> {
    match std::fs::read_to_string(path) {
        Ok(content) => content.lines().map(String::from).collect(),
        Err(_) => Vec::new(),
    }
}

fn parse_timestamp(field: &str, base_timestamp: f64) -> Option<f64> {
    let mut timestamp: f64 = field.parse().ok()?;
    if timestamp > EPOCH_THRESHOLD {
        timestamp -= base_timestamp;
    }
    Some(timestamp)
}

/// `ts screen press|release` or `ts key <kind> press|release`; press and
/// release lines of the same kind pair into one event.
fn read_user_events(path: &Path, base_timestamp: f64) -> Vec<UserEvent> {
    let mut events = Vec::new();
    let mut pending: Vec<(UserEventType, f64)> = Vec::new();
    for line in read_lines(path) {
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split(' ').collect();
        let Some(timestamp) = fields.first().and_then(|f| parse_timestamp(f, base_timestamp))
        else {
            warn!(line = %line, "invalid user event timestamp");
            continue;
        };
        let (event_type, action) = match fields.as_slice() {
            [_, "screen", action] => (UserEventType::Touch, *action),
            [_, "key", kind, action] => {
                let event_type = match *kind {
                    "power" => UserEventType::PowerKey,
                    "volup" | "voldown" => UserEventType::VolumeKey,
                    _ => UserEventType::Key,
                };
                (event_type, *action)
            }
            _ => {
                warn!(line = %line, "invalid user event entry");
                continue;
            }
        };
        match action {
            "press" => pending.push((event_type, timestamp)),
            "release" => {
                if let Some(position) = pending.iter().rposition(|(t, _)| *t == event_type) {
                    let (_, press_time) = pending.remove(position);
                    events.push(UserEvent { event_type, press_time, release_time: timestamp });
                } else {
                    warn!(line = %line, "release event with no associated press");
                }
            }
            _ => warn!(line = %line, "event has no press/release indication"),
        }
    }
    events
}

/// `ts landscape|portrait`; rotations are instantaneous events.
fn read_screen_rotations(path: &Path, base_timestamp: f64) -> Vec<UserEvent> {
    let mut events = Vec::new();
    for line in read_lines(path) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        let Some(timestamp) = fields.first().and_then(|f| parse_timestamp(f, base_timestamp))
        else {
            continue;
        };
        let event_type = match fields.get(1).copied() {
            Some("landscape") => UserEventType::ScreenLandscape,
            Some("portrait") => UserEventType::ScreenPortrait,
            _ => {
                warn!(line = %line, "invalid screen rotation entry");
                continue;
            }
        };
        events.push(UserEvent { event_type, press_time: timestamp, release_time: timestamp });
    }
    events
}

/// `ts total-usage [process=usage ...]`; only the total is used here.
fn read_cpu(path: &Path, base_timestamp: f64) -> Vec<CpuSample> {
    let mut samples = Vec::new();
    for line in read_lines(path) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        let timestamp = fields.first().and_then(|f| parse_timestamp(f, base_timestamp));
        let usage = fields.get(1).and_then(|f| f.parse::<f64>().ok());
        match (timestamp, usage) {
            (Some(timestamp), Some(total_usage)) => {
                samples.push(CpuSample { timestamp, total_usage });
            }
            _ => {
                if !line.trim().is_empty() {
                    warn!(line = %line, "invalid cpu entry");
                }
            }
        }
    }
    samples
}

fn read_gps(path: &Path, base_timestamp: f64) -> Vec<GpsSample> {
    read_states(path, base_timestamp, |state| match state {
        "ACTIVE" => Some(GpsState::Active),
        "STANDBY" => Some(GpsState::Standby),
        "OFF" => Some(GpsState::Off),
        _ => None,
    })
    .into_iter()
    .map(|(timestamp, state)| GpsSample { timestamp, state })
    .collect()
}

fn read_camera(path: &Path, base_timestamp: f64) -> Vec<CameraSample> {
    read_states(path, base_timestamp, |state| match state {
        "ON" => Some(true),
        "OFF" => Some(false),
        _ => None,
    })
    .into_iter()
    .map(|(timestamp, on)| CameraSample { timestamp, on })
    .collect()
}

fn read_bluetooth(path: &Path, base_timestamp: f64) -> Vec<BluetoothSample> {
    read_states(path, base_timestamp, |state| match state {
        "CONNECTED" => Some(BluetoothState::Connected),
        "DISCONNECTED" => Some(BluetoothState::Disconnected),
        "OFF" => Some(BluetoothState::Off),
        _ => None,
    })
    .into_iter()
    .map(|(timestamp, state)| BluetoothSample { timestamp, state })
    .collect()
}

fn read_screen(path: &Path, base_timestamp: f64) -> Vec<ScreenSample> {
    read_states(path, base_timestamp, |state| match state {
        "ON" => Some(true),
        "OFF" => Some(false),
        _ => None,
    })
    .into_iter()
    .map(|(timestamp, on)| ScreenSample { timestamp, on })
    .collect()
}

/// Shared shape of the peripheral files: `ts STATE [extras...]`.
fn read_states<T>(
    path: &Path,
    base_timestamp: f64,
    parse_state: impl Fn(&str) -> Option<T>,
) -> Vec<(f64, T)> {
    let mut samples = Vec::new();
    for line in read_lines(path) {
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        let timestamp = fields.first().and_then(|f| parse_timestamp(f, base_timestamp));
        let state = fields.get(1).and_then(|f| parse_state(f));
        match (timestamp, state) {
            (Some(timestamp), Some(state)) => samples.push((timestamp, state)),
            _ => warn!(line = %line, file = %path.display(), "invalid peripheral entry"),
        }
    }
    samples
}
