use serde::{Deserialize, Serialize};

use super::ProfileCommon;
use crate::rrc::RrcState;
use crate::stats::throughput::calculate_throughput;
use crate::trace::PacketRecord;

/// LTE device profile: promotion/inactivity/DRX timers and the power model
/// (throughput-dependent during continuous reception, ping-cycle averaged
/// in the DRX and idle states).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileLte {
    #[serde(flatten)]
    pub common: ProfileCommon,
    /// IDLE -> CONTINUOUS promotion delay (seconds).
    pub promotion_time: f64,
    /// Continuous-reception inactivity timer (seconds).
    pub inactivity_timer: f64,
    pub drx_short_time: f64,
    pub drx_ping_time: f64,
    pub drx_long_time: f64,
    pub idle_ping_time: f64,
    pub drx_short_ping_period: f64,
    pub drx_long_ping_period: f64,
    pub idle_ping_period: f64,
    pub power_promotion: f64,
    pub power_drx_short_ping: f64,
    pub power_drx_long_ping: f64,
    pub power_tail: f64,
    pub power_idle_ping: f64,
    pub power_idle: f64,
    /// Uplink throughput energy coefficient (mW per Mbps).
    pub alpha_up: f64,
    /// Downlink throughput energy coefficient (mW per Mbps).
    pub alpha_down: f64,
    /// Baseline continuous-reception power (watts).
    pub beta: f64,
}

impl Default for ProfileLte {
    fn default() -> Self {
        Self {
            common: ProfileCommon::default(),
            promotion_time: 0.26,
            inactivity_timer: 0.1,
            drx_short_time: 0.02,
            drx_ping_time: 0.002,
            drx_long_time: 10.0,
            idle_ping_time: 0.043,
            drx_short_ping_period: 0.02,
            drx_long_ping_period: 0.04,
            idle_ping_period: 1.28,
            power_promotion: 1.21,
            power_drx_short_ping: 1.68,
            power_drx_long_ping: 1.68,
            power_tail: 1.06,
            power_idle_ping: 0.594,
            power_idle: 0.0,
            alpha_up: 438.39,
            alpha_down: 51.97,
            beta: 1.2,
        }
    }
}

impl ProfileLte {
    /// Energy (joules) for one state slice.
    pub fn energy(&self, begin: f64, end: f64, state: RrcState, packets: &[PacketRecord]) -> f64 {
        let delta = end - begin;
        match state {
            RrcState::LtePromotion => delta * self.power_promotion,
            // Tail assumes no throughput.
            RrcState::LteCrTail => delta * self.beta,
            RrcState::LteContinuous => {
                let mut result = 0.0;
                for sample in
                    calculate_throughput(begin, end, self.common.throughput_window, packets)
                {
                    result += ((self.alpha_up / 1000.0) * sample.upload_mbps()
                        + (self.alpha_down / 1000.0) * sample.download_mbps()
                        + self.beta)
                        * sample.sample_period();
                }
                result
            }
            RrcState::LteDrxShort => {
                (delta / self.drx_short_ping_period)
                    * (self.drx_ping_time * self.power_drx_short_ping
                        + (self.drx_short_ping_period - self.drx_ping_time) * self.power_tail)
            }
            RrcState::LteDrxLong => {
                (delta / self.drx_long_ping_period)
                    * (self.drx_ping_time * self.power_drx_long_ping
                        + (self.drx_long_ping_period - self.drx_ping_time) * self.power_tail)
            }
            RrcState::LteIdle => {
                // Full idle ping cycles, then the residual partial cycle.
                let full_cycles = (delta / self.idle_ping_period).floor();
                let mut result = full_cycles
                    * (self.idle_ping_time * self.power_idle_ping
                        + (self.idle_ping_period - self.idle_ping_time) * self.power_idle);
                let residue = delta % self.idle_ping_period;
                result += if residue <= self.idle_ping_time {
                    residue * self.power_idle_ping
                } else {
                    self.idle_ping_time * self.power_idle_ping
                        + (residue - self.idle_ping_time) * self.power_idle
                };
                result
            }
            _ => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn promotion_energy_is_linear() {
        let profile = ProfileLte::default();
        let energy = profile.energy(0.0, 2.0, RrcState::LtePromotion, &[]);
        assert!((energy - 2.0 * 1.21).abs() < 1e-12);
    }

    #[test]
    fn continuous_without_packets_has_no_samples() {
        let profile = ProfileLte::default();
        assert_eq!(profile.energy(0.0, 1.0, RrcState::LteContinuous, &[]), 0.0);
    }

    #[test]
    fn drx_energy_averages_ping_cycle() {
        let profile = ProfileLte::default();
        let energy = profile.energy(0.0, profile.drx_short_ping_period, RrcState::LteDrxShort, &[]);
        let expected = profile.drx_ping_time * profile.power_drx_short_ping
            + (profile.drx_short_ping_period - profile.drx_ping_time) * profile.power_tail;
        assert!((energy - expected).abs() < 1e-12);
    }

    #[test]
    fn idle_energy_counts_partial_cycle() {
        let profile = ProfileLte::default();
        // Shorter than one ping: pure ping power.
        let energy = profile.energy(0.0, 0.01, RrcState::LteIdle, &[]);
        assert!((energy - 0.01 * profile.power_idle_ping).abs() < 1e-12);
    }
}
