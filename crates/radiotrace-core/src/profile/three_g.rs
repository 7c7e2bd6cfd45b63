use serde::{Deserialize, Serialize};

use super::ProfileCommon;
use crate::rrc::RrcState;

/// 3G (UMTS) device profile: DCH/FACH demotion timers, promotion delay
/// distributions, RLC queue thresholds, and per-state power draw.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Profile3G {
    #[serde(flatten)]
    pub common: ProfileCommon,
    /// DCH inactivity timer before demotion to FACH (seconds).
    pub dch_fach_timer: f64,
    /// FACH inactivity timer before demotion to IDLE (seconds).
    pub fach_idle_timer: f64,
    pub idle_dch_promo_min: f64,
    pub idle_dch_promo_avg: f64,
    pub idle_dch_promo_max: f64,
    pub fach_dch_promo_min: f64,
    pub fach_dch_promo_avg: f64,
    pub fach_dch_promo_max: f64,
    /// RLC uplink queue size triggering FACH->DCH promotion (bytes).
    pub rlc_ul_th: u32,
    /// RLC downlink queue size triggering FACH->DCH promotion (bytes).
    pub rlc_dl_th: u32,
    /// Payload volume that re-arms the DCH demotion timer (bytes).
    pub dch_timer_reset_size: u32,
    /// Window within which that volume must arrive (seconds).
    pub dch_timer_reset_win: f64,
    pub rlc_ul_rate_p2: f64,
    pub rlc_ul_rate_p1: f64,
    pub rlc_ul_rate_p0: f64,
    pub rlc_dl_rate_p2: f64,
    pub rlc_dl_rate_p1: f64,
    pub rlc_dl_rate_p0: f64,
    pub power_dch: f64,
    pub power_fach: f64,
    pub power_idle: f64,
    pub power_idle_dch: f64,
    pub power_fach_dch: f64,
}

impl Default for Profile3G {
    fn default() -> Self {
        Self {
            common: ProfileCommon::default(),
            dch_fach_timer: 5.0,
            fach_idle_timer: 12.0,
            idle_dch_promo_min: 1.5,
            idle_dch_promo_avg: 2.0,
            idle_dch_promo_max: 4.0,
            fach_dch_promo_min: 0.8,
            fach_dch_promo_avg: 1.5,
            fach_dch_promo_max: 3.0,
            rlc_ul_th: 543,
            rlc_dl_th: 475,
            dch_timer_reset_size: 320,
            dch_timer_reset_win: 0.3,
            rlc_ul_rate_p2: 0.0014,
            rlc_ul_rate_p1: 1.6,
            rlc_ul_rate_p0: 20.0,
            rlc_dl_rate_p2: 0.0,
            rlc_dl_rate_p1: 0.1,
            rlc_dl_rate_p0: 10.0,
            power_dch: 0.7,
            power_fach: 0.35,
            power_idle: 0.0,
            power_idle_dch: 0.53,
            power_fach_dch: 0.55,
        }
    }
}

impl Profile3G {
    /// Energy (joules) for one state slice: constant power per state.
    pub fn energy(&self, begin: f64, end: f64, state: RrcState) -> f64 {
        let delta = end - begin;
        match state {
            RrcState::Dch | RrcState::DchTail => delta * self.power_dch,
            RrcState::Fach | RrcState::FachTail => delta * self.power_fach,
            RrcState::Idle => delta * self.power_idle,
            RrcState::PromoIdleDch => delta * self.power_idle_dch,
            RrcState::PromoFachDch => delta * self.power_fach_dch,
            _ => 0.0,
        }
    }
}
