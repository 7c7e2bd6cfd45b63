//! Radio technology profiles: named timer/power constants per technology,
//! plus the per-state energy formulas they imply.
//!
//! A profile is a tagged union over the three supported technologies. Each
//! variant owns its timing and power constants; the shared burst/user-input
//! thresholds and peripheral power draws live in [`ProfileCommon`]. All
//! values can be overridden from a TOML profile file (serde), with the
//! defaults below matching the reference device models.

mod lte;
mod three_g;
mod wifi;

pub use lte::ProfileLte;
pub use three_g::Profile3G;
pub use wifi::ProfileWifi;

use serde::{Deserialize, Serialize};

use crate::rrc::RrcState;
use crate::trace::PacketRecord;

/// Constants shared by every technology.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileCommon {
    /// Tight user-input window (seconds) for immediate burst attribution.
    pub user_input_th: f64,
    /// Inter-packet gap (seconds) that starts a new burst.
    pub burst_th: f64,
    /// Inter-burst gap (seconds) that marks a long idle period.
    pub long_burst_th: f64,
    /// Minimum repeat period (seconds) considered periodical.
    pub period_min_cycle: f64,
    /// Tolerable spread (seconds) within one periodical cluster.
    pub period_cycle_tol: f64,
    /// Minimum observations for a periodical diagnosis.
    pub period_min_samples: usize,
    /// Duration (seconds) above which a burst may be classified LONG.
    pub large_burst_duration: f64,
    /// Payload (bytes) above which a burst may be classified LONG.
    pub large_burst_size: u64,
    /// Sampling window (seconds) for throughput integration.
    pub throughput_window: f64,
    pub power_gps_active: f64,
    pub power_gps_standby: f64,
    pub power_camera_on: f64,
    pub power_bluetooth_active: f64,
    pub power_bluetooth_standby: f64,
    pub power_screen_on: f64,
}

impl Default for ProfileCommon {
    fn default() -> Self {
        Self {
            user_input_th: 1.0,
            burst_th: 1.5,
            long_burst_th: 5.0,
            period_min_cycle: 10.0,
            period_cycle_tol: 1.0,
            period_min_samples: 3,
            large_burst_duration: 5.0,
            large_burst_size: 100_000,
            throughput_window: 0.5,
            power_gps_active: 1.0,
            power_gps_standby: 0.5,
            power_camera_on: 0.3,
            power_bluetooth_active: 1.0,
            power_bluetooth_standby: 0.5,
            power_screen_on: 0.3,
        }
    }
}

/// Device profile: a tagged union over the supported radio technologies.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Profile {
    #[serde(rename = "3g")]
    ThreeG(Profile3G),
    Lte(ProfileLte),
    Wifi(ProfileWifi),
}

impl Profile {
    pub fn common(&self) -> &ProfileCommon {
        match self {
            Profile::ThreeG(p) => &p.common,
            Profile::Lte(p) => &p.common,
            Profile::Wifi(p) => &p.common,
        }
    }

    /// Short technology label used in reports.
    pub fn technology(&self) -> &'static str {
        match self {
            Profile::ThreeG(_) => "3g",
            Profile::Lte(_) => "lte",
            Profile::Wifi(_) => "wifi",
        }
    }

    /// Radio energy (joules) consumed in `state` over `[begin, end)`.
    ///
    /// The packet list is consulted only by the LTE continuous-reception
    /// formula, which integrates throughput over the interval.
    pub fn energy(&self, begin: f64, end: f64, state: RrcState, packets: &[PacketRecord]) -> f64 {
        match self {
            Profile::ThreeG(p) => p.energy(begin, end, state),
            Profile::Lte(p) => p.energy(begin, end, state, packets),
            Profile::Wifi(p) => p.energy(begin, end, state),
        }
    }
}

impl Default for Profile {
    fn default() -> Self {
        Profile::Lte(ProfileLte::default())
    }
}
