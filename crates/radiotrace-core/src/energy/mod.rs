//! Peripheral energy accounting: integrates the profile's power draws
//! over the GPS/camera/bluetooth/screen state transitions, alongside the
//! radio total computed by the RRC state machine.

use serde::Serialize;

use crate::profile::Profile;
use crate::trace::{BluetoothState, GpsState, Telemetry};

/// Energy usage of the device peripherals plus the radio, in joules.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EnergyModel {
    pub gps_active_energy: f64,
    pub gps_standby_energy: f64,
    pub total_gps_energy: f64,
    pub total_camera_energy: f64,
    pub bluetooth_active_energy: f64,
    pub bluetooth_standby_energy: f64,
    pub total_bluetooth_energy: f64,
    pub total_screen_energy: f64,
    pub total_rrc_energy: f64,
}

impl EnergyModel {
    pub fn total_energy(&self) -> f64 {
        self.total_gps_energy
            + self.total_camera_energy
            + self.total_bluetooth_energy
            + self.total_screen_energy
            + self.total_rrc_energy
    }
}

/// Integrate each peripheral's transition list against the profile's
/// power constants. Each state is charged from its transition timestamp
/// until the next transition (or the end of the trace).
pub fn build_energy_model(
    profile: &Profile,
    total_rrc_energy: f64,
    telemetry: &Telemetry,
    trace_duration: f64,
) -> EnergyModel {
    let common = profile.common();
    let mut model = EnergyModel { total_rrc_energy, ..EnergyModel::default() };

    let mut gps = telemetry.gps.iter().peekable();
    while let Some(sample) = gps.next() {
        let end = gps.peek().map(|next| next.timestamp).unwrap_or(trace_duration);
        let duration = (end - sample.timestamp).max(0.0);
        match sample.state {
            GpsState::Active => model.gps_active_energy += common.power_gps_active * duration,
            GpsState::Standby => model.gps_standby_energy += common.power_gps_standby * duration,
            GpsState::Off => {}
        }
    }
    model.total_gps_energy = model.gps_active_energy + model.gps_standby_energy;

    let mut camera = telemetry.camera.iter().peekable();
    while let Some(sample) = camera.next() {
        let end = camera.peek().map(|next| next.timestamp).unwrap_or(trace_duration);
        if sample.on {
            model.total_camera_energy += common.power_camera_on * (end - sample.timestamp).max(0.0);
        }
    }

    let mut bluetooth = telemetry.bluetooth.iter().peekable();
    while let Some(sample) = bluetooth.next() {
        let end = bluetooth.peek().map(|next| next.timestamp).unwrap_or(trace_duration);
        let duration = (end - sample.timestamp).max(0.0);
        match sample.state {
            BluetoothState::Connected => {
                model.bluetooth_active_energy += common.power_bluetooth_active * duration;
            }
            BluetoothState::Disconnected => {
                model.bluetooth_standby_energy += common.power_bluetooth_standby * duration;
            }
            BluetoothState::Off => {}
        }
    }
    model.total_bluetooth_energy = model.bluetooth_active_energy + model.bluetooth_standby_energy;

    let mut screen = telemetry.screen.iter().peekable();
    while let Some(sample) = screen.next() {
        let end = screen.peek().map(|next| next.timestamp).unwrap_or(trace_duration);
        if sample.on {
            model.total_screen_energy += common.power_screen_on * (end - sample.timestamp).max(0.0);
        }
    }

    model
}
