//! Device telemetry sampled alongside the capture: user input, CPU load,
//! and peripheral on/off transitions. All timestamps are seconds from the
//! start of the trace, and every list is expected in time order (the
//! loaders sort on ingest).

/// Kind of user interaction recorded by the collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserEventType {
    PowerKey,
    VolumeKey,
    Touch,
    Key,
    ScreenLandscape,
    ScreenPortrait,
    Unknown,
}

impl UserEventType {
    /// Screen-rotation events get their own burst category.
    pub fn is_rotation(self) -> bool {
        matches!(self, UserEventType::ScreenLandscape | UserEventType::ScreenPortrait)
    }
}

/// One user input event with its press/release window.
#[derive(Debug, Clone)]
pub struct UserEvent {
    pub event_type: UserEventType,
    pub press_time: f64,
    pub release_time: f64,
}

/// One CPU utilization sample; `total_usage` is a percentage (0-100).
#[derive(Debug, Clone, Copy)]
pub struct CpuSample {
    pub timestamp: f64,
    pub total_usage: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpsState {
    Active,
    Standby,
    Off,
}

/// GPS state transition sample.
#[derive(Debug, Clone, Copy)]
pub struct GpsSample {
    pub timestamp: f64,
    pub state: GpsState,
}

/// Camera on/off transition sample.
#[derive(Debug, Clone, Copy)]
pub struct CameraSample {
    pub timestamp: f64,
    pub on: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BluetoothState {
    Connected,
    Disconnected,
    Off,
}

/// Bluetooth state transition sample.
#[derive(Debug, Clone, Copy)]
pub struct BluetoothSample {
    pub timestamp: f64,
    pub state: BluetoothState,
}

/// Screen on/off transition sample.
#[derive(Debug, Clone, Copy)]
pub struct ScreenSample {
    pub timestamp: f64,
    pub on: bool,
}

/// All telemetry handed to the analysis; every list may be empty.
#[derive(Debug, Clone, Default)]
pub struct Telemetry {
    pub user_events: Vec<UserEvent>,
    pub cpu_samples: Vec<CpuSample>,
    pub gps: Vec<GpsSample>,
    pub camera: Vec<CameraSample>,
    pub bluetooth: Vec<BluetoothSample>,
    pub screen: Vec<ScreenSample>,
}

impl Telemetry {
    /// Sort every stream by timestamp; loaders call this once after ingest.
    pub fn sort(&mut self) {
        self.user_events
            .sort_by(|a, b| a.press_time.total_cmp(&b.press_time));
        self.cpu_samples.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
        self.gps.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
        self.camera.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
        self.bluetooth.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
        self.screen.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotation_detection() {
        assert!(UserEventType::ScreenLandscape.is_rotation());
        assert!(UserEventType::ScreenPortrait.is_rotation());
        assert!(!UserEventType::Touch.is_rotation());
    }

    #[test]
    fn sort_orders_all_streams() {
        let mut telemetry = Telemetry::default();
        telemetry.user_events.push(UserEvent {
            event_type: UserEventType::Touch,
            press_time: 5.0,
            release_time: 5.1,
        });
        telemetry.user_events.push(UserEvent {
            event_type: UserEventType::Key,
            press_time: 1.0,
            release_time: 1.2,
        });
        telemetry.cpu_samples.push(CpuSample { timestamp: 9.0, total_usage: 10.0 });
        telemetry.cpu_samples.push(CpuSample { timestamp: 2.0, total_usage: 80.0 });
        telemetry.sort();
        assert_eq!(telemetry.user_events[0].press_time, 1.0);
        assert_eq!(telemetry.cpu_samples[0].timestamp, 2.0);
    }
}
