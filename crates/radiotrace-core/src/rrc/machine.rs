//! Aggregate time/energy statistics over a simulated RRC range list,
//! broken down by state, per technology.

use serde::Serialize;

use crate::profile::Profile;
use crate::trace::PacketRecord;

use super::{RrcState, RrcStateRange};

/// Named 3G time/energy breakdown. Tail figures are included in their
/// channel totals (DCH tail inside DCH, FACH tail inside FACH).
#[derive(Debug, Clone, Default, Serialize)]
pub struct ThreeGBreakdown {
    pub idle_time: f64,
    pub idle_energy: f64,
    pub dch_time: f64,
    pub dch_energy: f64,
    pub dch_tail_time: f64,
    pub dch_tail_energy: f64,
    pub fach_time: f64,
    pub fach_energy: f64,
    pub fach_tail_time: f64,
    pub fach_tail_energy: f64,
    pub idle_to_dch_count: u64,
    pub idle_to_dch_time: f64,
    pub idle_to_dch_energy: f64,
    pub fach_to_dch_count: u64,
    pub fach_to_dch_time: f64,
    pub fach_to_dch_energy: f64,
}

/// Named LTE time/energy breakdown. CR tail is included in the CR totals.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LteBreakdown {
    pub idle_time: f64,
    pub idle_energy: f64,
    pub promotion_time: f64,
    pub promotion_energy: f64,
    pub cr_time: f64,
    pub cr_energy: f64,
    pub cr_tail_time: f64,
    pub cr_tail_energy: f64,
    pub drx_short_time: f64,
    pub drx_short_energy: f64,
    pub drx_long_time: f64,
    pub drx_long_energy: f64,
}

/// Named WiFi time/energy breakdown. Tail is included in the active totals.
#[derive(Debug, Clone, Default, Serialize)]
pub struct WifiBreakdown {
    pub active_time: f64,
    pub active_energy: f64,
    pub tail_time: f64,
    pub tail_energy: f64,
    pub idle_time: f64,
    pub idle_energy: f64,
}

/// Per-technology breakdown variant.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "technology", rename_all = "lowercase")]
pub enum RrcBreakdown {
    #[serde(rename = "3g")]
    ThreeG(ThreeGBreakdown),
    Lte(LteBreakdown),
    Wifi(WifiBreakdown),
}

/// Simulation result: the raw range list plus the per-state accumulation.
#[derive(Debug, Clone, Serialize)]
pub struct RrcStateMachine {
    pub ranges: Vec<RrcStateRange>,
    pub total_rrc_energy: f64,
    pub joules_per_kilobyte: f64,
    pub packets_duration: f64,
    pub trace_duration: f64,
    pub breakdown: RrcBreakdown,
}

/// Accumulate the per-state statistics for a simulated range list.
pub fn build_state_machine(
    ranges: Vec<RrcStateRange>,
    profile: &Profile,
    packets: &[PacketRecord],
    total_bytes: u64,
    packets_duration: f64,
    trace_duration: f64,
) -> RrcStateMachine {
    let mut total_energy = 0.0;
    let breakdown = match profile {
        Profile::ThreeG(_) => {
            let mut b = ThreeGBreakdown::default();
            for range in &ranges {
                let energy = profile.energy(range.begin_time, range.end_time, range.state, packets);
                let duration = range.duration();
                match range.state {
                    RrcState::Idle => {
                        b.idle_time += duration;
                        b.idle_energy += energy;
                    }
                    RrcState::Dch => {
                        b.dch_time += duration;
                        b.dch_energy += energy;
                    }
                    RrcState::DchTail => {
                        b.dch_time += duration;
                        b.dch_tail_time += duration;
                        b.dch_energy += energy;
                        b.dch_tail_energy += energy;
                    }
                    RrcState::Fach => {
                        b.fach_time += duration;
                        b.fach_energy += energy;
                    }
                    RrcState::FachTail => {
                        b.fach_time += duration;
                        b.fach_tail_time += duration;
                        b.fach_energy += energy;
                        b.fach_tail_energy += energy;
                    }
                    RrcState::PromoIdleDch => {
                        b.idle_to_dch_count += 1;
                        b.idle_to_dch_time += duration;
                        b.idle_to_dch_energy += energy;
                    }
                    RrcState::PromoFachDch => {
                        b.fach_to_dch_count += 1;
                        b.fach_to_dch_time += duration;
                        b.fach_to_dch_energy += energy;
                    }
                    _ => {}
                }
            }
            total_energy = b.idle_energy
                + b.dch_energy
                + b.fach_energy
                + b.idle_to_dch_energy
                + b.fach_to_dch_energy;
            RrcBreakdown::ThreeG(b)
        }
        Profile::Lte(_) => {
            let mut b = LteBreakdown::default();
            for range in &ranges {
                let energy = profile.energy(range.begin_time, range.end_time, range.state, packets);
                let duration = range.duration();
                total_energy += energy;
                match range.state {
                    RrcState::LteIdle => {
                        b.idle_time += duration;
                        b.idle_energy += energy;
                    }
                    RrcState::LtePromotion => {
                        b.promotion_time += duration;
                        b.promotion_energy += energy;
                    }
                    RrcState::LteContinuous => {
                        b.cr_time += duration;
                        b.cr_energy += energy;
                    }
                    RrcState::LteCrTail => {
                        b.cr_time += duration;
                        b.cr_tail_time += duration;
                        b.cr_energy += energy;
                        b.cr_tail_energy += energy;
                    }
                    RrcState::LteDrxShort => {
                        b.drx_short_time += duration;
                        b.drx_short_energy += energy;
                    }
                    RrcState::LteDrxLong => {
                        b.drx_long_time += duration;
                        b.drx_long_energy += energy;
                    }
                    _ => {}
                }
            }
            RrcBreakdown::Lte(b)
        }
        Profile::Wifi(_) => {
            let mut b = WifiBreakdown::default();
            for range in &ranges {
                let energy = profile.energy(range.begin_time, range.end_time, range.state, packets);
                let duration = range.duration();
                total_energy += energy;
                match range.state {
                    RrcState::WifiActive => {
                        b.active_time += duration;
                        b.active_energy += energy;
                    }
                    RrcState::WifiTail => {
                        b.active_time += duration;
                        b.active_energy += energy;
                        b.tail_time += duration;
                        b.tail_energy += energy;
                    }
                    RrcState::WifiIdle => {
                        b.idle_time += duration;
                        b.idle_energy += energy;
                    }
                    _ => {}
                }
            }
            RrcBreakdown::Wifi(b)
        }
    };

    let joules_per_kilobyte = if total_bytes != 0 {
        total_energy / (total_bytes as f64 / 1000.0)
    } else {
        0.0
    };

    RrcStateMachine {
        ranges,
        total_rrc_energy: total_energy,
        joules_per_kilobyte,
        packets_duration,
        trace_duration,
        breakdown,
    }
}
