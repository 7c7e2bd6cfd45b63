use serde::{Deserialize, Serialize};

use super::ProfileCommon;
use crate::rrc::RrcState;

/// WiFi device profile: a single tail timer and two power levels.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileWifi {
    #[serde(flatten)]
    pub common: ProfileCommon,
    /// Time the radio stays active after the last packet (seconds).
    pub wifi_tail_time: f64,
    pub power_wifi_active: f64,
    pub power_wifi_idle: f64,
}

impl Default for ProfileWifi {
    fn default() -> Self {
        Self {
            common: ProfileCommon::default(),
            wifi_tail_time: 0.25,
            power_wifi_active: 0.403,
            power_wifi_idle: 0.02,
        }
    }
}

impl ProfileWifi {
    /// Energy (joules) for one state slice.
    pub fn energy(&self, begin: f64, end: f64, state: RrcState) -> f64 {
        let delta = end - begin;
        match state {
            RrcState::WifiActive | RrcState::WifiTail => delta * self.power_wifi_active,
            RrcState::WifiIdle => delta * self.power_wifi_idle,
            _ => 0.0,
        }
    }
}
