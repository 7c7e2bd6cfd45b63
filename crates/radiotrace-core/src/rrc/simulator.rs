//! Discrete-event RRC simulation: one algorithm per technology, driven by
//! packet arrival times and the profile's timer constants.
//!
//! The 3G machine is the intricate one: five promotion cases, a dynamic
//! DCH tail driven by recent payload volume, FACH queue simulation for
//! early promotions, and an error-correction branch that rewrites already
//! emitted ranges when a downlink packet implies an impossible promotion
//! ordering. The epsilons used in its boundary comparisons are part of the
//! model; exact comparisons reintroduce spurious state transitions.

use crate::profile::{Profile, Profile3G, ProfileLte, ProfileWifi};
use crate::trace::{Direction, PacketRecord, TagTable};

use super::{RrcState, RrcStateRange, compress_ranges, truncate_ranges};

const EPS: f64 = 1e-5;

/// Run the profile's state machine over the packet timestamps.
///
/// Returns the compressed, truncated range list tiling
/// `[0, trace_duration)` and records each packet's radio state in `tags`.
pub fn simulate(
    packets: &[PacketRecord],
    profile: &Profile,
    trace_duration: f64,
    tags: &mut TagTable,
) -> Vec<RrcStateRange> {
    let mut ranges = match profile {
        Profile::ThreeG(p) => simulate_3g(packets, p, tags),
        Profile::Lte(p) => simulate_lte(packets, p, tags),
        Profile::Wifi(p) => simulate_wifi(packets, p, tags),
    };

    ranges = compress_ranges(ranges);
    ranges.retain(|r| r.duration() > 0.0);
    truncate_ranges(&mut ranges, trace_duration);

    let idle = match profile {
        Profile::ThreeG(_) => RrcState::Idle,
        Profile::Lte(_) => RrcState::LteIdle,
        Profile::Wifi(_) => RrcState::WifiIdle,
    };
    let covered = ranges.last().map(|r| r.end_time).unwrap_or(0.0);
    if covered < trace_duration {
        ranges.push(RrcStateRange::new(covered, trace_duration, idle));
    }
    ranges
}

fn simulate_lte(
    packets: &[PacketRecord],
    profile: &ProfileLte,
    tags: &mut TagTable,
) -> Vec<RrcStateRange> {
    let mut result = Vec::new();
    let mut iter = packets.iter();

    let Some(first) = iter.next() else {
        return result;
    };
    tags.set_radio_state(first.id, RrcState::LteContinuous);
    let mut last = first.timestamp;
    let mut timer = promote_lte(&mut result, 0.0, last, profile);

    for packet in iter {
        tags.set_radio_state(packet.id, RrcState::LteContinuous);
        let curr = packet.timestamp;
        if curr - last > profile.inactivity_timer {
            timer = tail_lte(&mut result, timer, last, curr, profile);
            // The tail ran out before this packet; promote again.
            if timer < curr {
                timer = promote_lte(&mut result, timer, curr, profile);
            }
        }
        last = curr;
    }

    tail_lte(&mut result, timer, last, f64::MAX, profile);
    result
}

/// Emit IDLE (if any) and PROMOTION ranges leading up to a packet at `end`.
fn promote_lte(result: &mut Vec<RrcStateRange>, start: f64, end: f64, profile: &ProfileLte) -> f64 {
    let promo_start = (end - profile.promotion_time).max(start);
    if promo_start > start {
        result.push(RrcStateRange::new(start, promo_start, RrcState::LteIdle));
    }
    result.push(RrcStateRange::new(promo_start, end, RrcState::LtePromotion));
    end
}

/// Emit the CONTINUOUS range and the CR_TAIL / DRX_SHORT / DRX_LONG tail
/// sequence, each leg clipped at `end`. Returns where the tail stopped.
fn tail_lte(
    result: &mut Vec<RrcStateRange>,
    timer: f64,
    start: f64,
    end: f64,
    profile: &ProfileLte,
) -> f64 {
    result.push(RrcStateRange::new(timer, start, RrcState::LteContinuous));

    let mut start = start;
    let mut tail = (start + profile.inactivity_timer).min(end);
    if tail > start {
        result.push(RrcStateRange::new(start, tail, RrcState::LteCrTail));
        start = tail;
    }
    tail = (start + profile.drx_short_time).min(end);
    if tail > start {
        result.push(RrcStateRange::new(start, tail, RrcState::LteDrxShort));
        start = tail;
    }
    tail = (start + profile.drx_long_time).min(end);
    if tail > start {
        result.push(RrcStateRange::new(start, tail, RrcState::LteDrxLong));
    }
    tail
}

fn simulate_wifi(
    packets: &[PacketRecord],
    profile: &ProfileWifi,
    tags: &mut TagTable,
) -> Vec<RrcStateRange> {
    let mut result = Vec::new();
    let mut iter = packets.iter();

    let Some(first) = iter.next() else {
        return result;
    };
    tags.set_radio_state(first.id, RrcState::WifiActive);
    let mut last = first.timestamp;
    result.push(RrcStateRange::new(0.0, last, RrcState::WifiIdle));
    let mut timer = last;

    for packet in iter {
        tags.set_radio_state(packet.id, RrcState::WifiActive);
        let curr = packet.timestamp;
        if curr - last > profile.wifi_tail_time {
            timer = tail_wifi(&mut result, timer, last, curr, profile);
            if timer < curr {
                result.push(RrcStateRange::new(timer, curr, RrcState::WifiIdle));
                timer = curr;
            }
        }
        last = curr;
    }

    tail_wifi(&mut result, timer, last, f64::MAX, profile);
    result
}

fn tail_wifi(
    result: &mut Vec<RrcStateRange>,
    timer: f64,
    start: f64,
    end: f64,
    profile: &ProfileWifi,
) -> f64 {
    result.push(RrcStateRange::new(timer, start, RrcState::WifiActive));
    let tail = (start + profile.wifi_tail_time).min(end);
    if tail > start {
        result.push(RrcStateRange::new(start, tail, RrcState::WifiTail));
    }
    tail
}

/// DCH tail bookkeeping: heavy recent traffic re-arms the demotion timer,
/// so the effective tail shrinks as the last reset recedes.
struct DchDemotionQueue {
    ul_bytes: i64,
    dl_bytes: i64,
    timer_reset_ts: f64,
    last_ul_ts: f64,
    last_dl_ts: f64,
}

impl DchDemotionQueue {
    fn new() -> Self {
        Self {
            ul_bytes: -1,
            dl_bytes: -1,
            timer_reset_ts: 0.0,
            last_ul_ts: -9999.0,
            last_dl_ts: -9999.0,
        }
    }

    fn init(&mut self, ts: f64, size: usize, dir: Direction) {
        match dir {
            Direction::Uplink => {
                self.ul_bytes = size as i64;
                self.dl_bytes = 0;
                self.last_ul_ts = ts;
                self.last_dl_ts = -9999.0;
            }
            Direction::Downlink => {
                self.ul_bytes = 0;
                self.dl_bytes = size as i64;
                self.last_dl_ts = ts;
                self.last_ul_ts = -9999.0;
            }
            Direction::Unknown => {}
        }
        self.timer_reset_ts = ts;
    }

    fn update(&mut self, ts: f64, size: usize, dir: Direction, profile: &Profile3G) {
        let win = profile.dch_timer_reset_win;
        match dir {
            Direction::Uplink => {
                if ts > self.last_ul_ts + win {
                    self.ul_bytes = size as i64;
                } else {
                    self.ul_bytes += size as i64;
                }
                if ts > self.last_dl_ts + win {
                    self.dl_bytes = 0;
                }
                self.last_ul_ts = ts;
            }
            Direction::Downlink => {
                if ts > self.last_dl_ts + win {
                    self.dl_bytes = size as i64;
                } else {
                    self.dl_bytes += size as i64;
                }
                if ts > self.last_ul_ts + win {
                    self.ul_bytes = 0;
                }
                self.last_dl_ts = ts;
            }
            Direction::Unknown => {}
        }
        if self.ul_bytes >= profile.dch_timer_reset_size as i64
            || self.dl_bytes >= profile.dch_timer_reset_size as i64
        {
            self.timer_reset_ts = ts;
        }
    }

    fn dch_tail(&self, profile: &Profile3G) -> f64 {
        let last_ts = self.last_dl_ts.max(self.last_ul_ts);
        profile.dch_fach_timer - (last_ts - self.timer_reset_ts)
    }
}

/// FACH queueing model: the RLC queue drains at a rate given by the
/// profile's polynomial; a packet that pushes the queue past the threshold
/// triggers a FACH->DCH promotion.
struct FachQueue {
    ul_queue: i64,
    dl_queue: i64,
    ul_ts: f64,
    dl_ts: f64,
}

impl FachQueue {
    fn new() -> Self {
        Self { ul_queue: 0, dl_queue: 0, ul_ts: -1000.0, dl_ts: -1000.0 }
    }

    fn init(&mut self) {
        self.ul_queue = 0;
        self.dl_queue = 0;
        self.ul_ts = -1000.0;
        self.dl_ts = -1000.0;
    }

    /// Returns true when this packet triggers a FACH->DCH promotion.
    fn sim_fach(&mut self, ts: f64, dir: Direction, size: usize, profile: &Profile3G) -> bool {
        match dir {
            Direction::Uplink => {
                let queue = self.ul_queue as f64;
                let consumption = (queue * queue * profile.rlc_ul_rate_p2
                    + queue * profile.rlc_ul_rate_p1
                    + profile.rlc_ul_rate_p0)
                    / 1000.0;
                if ts - self.ul_ts > consumption {
                    self.ul_queue = 0;
                }
                self.ul_queue += size as i64;
                self.ul_ts = ts;
            }
            Direction::Downlink => {
                let queue = self.dl_queue as f64;
                let consumption = (queue * queue * profile.rlc_dl_rate_p2
                    + queue * profile.rlc_dl_rate_p1
                    + profile.rlc_dl_rate_p0)
                    / 1000.0;
                if ts - self.dl_ts > consumption {
                    self.dl_queue = 0;
                }
                self.dl_queue += size as i64;
                self.dl_ts = ts;
            }
            Direction::Unknown => {}
        }
        self.dl_queue > profile.rlc_dl_th as i64 || self.ul_queue > profile.rlc_ul_th as i64
    }
}

/// Append a range of up to `duration` seconds starting at `t`, clipped at
/// `t_max`. Returns the new cursor.
fn add_state_range(
    ranges: &mut Vec<RrcStateRange>,
    t: f64,
    duration: f64,
    state: RrcState,
    t_max: f64,
) -> f64 {
    if t >= t_max || duration <= 0.0 {
        return t;
    }
    let duration = duration.min(t_max - t);
    let end = t + duration;
    ranges.push(RrcStateRange::new(t, end, state));
    end
}

/// Retag already-emitted ranges from the back until `duration` seconds
/// have been converted to `new_state`.
fn retag_backward(ranges: &mut [RrcStateRange], duration: f64, new_state: RrcState) {
    if duration < EPS {
        return;
    }
    let mut remaining = duration;
    for range in ranges.iter_mut().rev() {
        range.state = new_state;
        remaining -= range.duration();
        if remaining <= EPS {
            break;
        }
    }
}

fn simulate_3g(
    packets: &[PacketRecord],
    profile: &Profile3G,
    tags: &mut TagTable,
) -> Vec<RrcStateRange> {
    let mut result = Vec::new();
    if packets.is_empty() {
        return result;
    }

    let promo = |state: RrcState| -> (f64, f64, f64) {
        if state == RrcState::PromoIdleDch {
            (profile.idle_dch_promo_avg, profile.idle_dch_promo_min, profile.idle_dch_promo_max)
        } else {
            (profile.fach_dch_promo_avg, profile.fach_dch_promo_min, profile.fach_dch_promo_max)
        }
    };
    let dch_fach_timer = profile.dch_fach_timer;
    let fach_idle_timer = profile.fach_idle_timer;

    let mut timer = 0.0;
    let mut dch_queue = DchDemotionQueue::new();
    let mut fach_queue = FachQueue::new();

    // Working copy of per-packet states; written to the tag table at the
    // end. The error-recovery branch reads earlier entries.
    let mut states: Vec<RrcState> = vec![RrcState::Idle; packets.len()];
    states[0] = RrcState::PromoIdleDch;

    let mut curr_ts = packets[0].timestamp;
    add_state_range(&mut result, 0.0, f64::MAX, RrcState::Idle, curr_ts);

    for i in 1..=packets.len() {
        let (dir, curr_len);
        if i >= packets.len() {
            // Virtual final iteration flushes the last demotion sequence.
            dir = Direction::Uplink;
            curr_ts = f64::MAX;
            curr_len = 0;
        } else {
            let packet = &packets[i];
            dir = packet.direction;
            curr_ts = packet.timestamp;
            curr_len = packet.len();
        }
        let mut prev_ts = packets[i - 1].timestamp;
        let delta = curr_ts - prev_ts;

        let prev_state = states[i - 1];
        let mut state = prev_state;

        match prev_state {
            RrcState::PromoIdleDch | RrcState::PromoFachDch => {
                let (promo_avg, promo_min, promo_max) = promo(prev_state);

                if timer + delta <= promo_min {
                    // Cases 1 (uplink) and the downlink error variant: the
                    // packet lands inside the minimum promotion delay.
                    add_state_range(&mut result, prev_ts, f64::MAX, prev_state, curr_ts);
                    state = prev_state;
                    timer += delta;
                } else if timer + delta <= promo_max {
                    // Case 2: promotion completes at this packet.
                    add_state_range(&mut result, prev_ts, f64::MAX, prev_state, curr_ts);
                    state = RrcState::Dch;
                    dch_queue.init(curr_ts, curr_len, dir);
                } else if timer + delta <= promo_avg + dch_fach_timer {
                    // Case 3: promotion finished earlier; we are in DCH.
                    prev_ts = add_state_range(
                        &mut result,
                        prev_ts,
                        promo_avg - timer,
                        prev_state,
                        curr_ts,
                    );
                    add_state_range(&mut result, prev_ts, f64::MAX, RrcState::Dch, curr_ts);
                    state = RrcState::Dch;
                    dch_queue.init(curr_ts, curr_len, dir);
                } else if timer + delta <= promo_avg + dch_fach_timer + fach_idle_timer {
                    // Case 4: demoted to FACH before this packet.
                    if dir == Direction::Downlink {
                        fach_queue.init();
                        if fach_queue.sim_fach(curr_ts, dir, curr_len, profile) {
                            let t_max0 = curr_ts - profile.fach_dch_promo_avg;
                            prev_ts = add_state_range(
                                &mut result,
                                prev_ts,
                                promo_avg - timer,
                                prev_state,
                                t_max0,
                            );
                            prev_ts = add_state_range(
                                &mut result,
                                prev_ts,
                                dch_fach_timer,
                                RrcState::DchTail,
                                t_max0,
                            );
                            prev_ts = add_state_range(
                                &mut result,
                                prev_ts,
                                f64::MAX,
                                RrcState::Fach,
                                t_max0,
                            );
                            add_state_range(
                                &mut result,
                                prev_ts,
                                f64::MAX,
                                RrcState::PromoFachDch,
                                curr_ts,
                            );
                            state = RrcState::Dch;
                            dch_queue.init(curr_ts, curr_len, dir);
                        } else {
                            prev_ts = add_state_range(
                                &mut result,
                                prev_ts,
                                promo_avg - timer,
                                prev_state,
                                curr_ts,
                            );
                            prev_ts = add_state_range(
                                &mut result,
                                prev_ts,
                                dch_fach_timer,
                                RrcState::DchTail,
                                curr_ts,
                            );
                            add_state_range(&mut result, prev_ts, f64::MAX, RrcState::Fach, curr_ts);
                            state = RrcState::Fach;
                        }
                    } else {
                        fach_queue.init();
                        prev_ts = add_state_range(
                            &mut result,
                            prev_ts,
                            promo_avg - timer,
                            prev_state,
                            curr_ts,
                        );
                        prev_ts = add_state_range(
                            &mut result,
                            prev_ts,
                            dch_fach_timer,
                            RrcState::DchTail,
                            curr_ts,
                        );
                        add_state_range(&mut result, prev_ts, f64::MAX, RrcState::Fach, curr_ts);
                        if fach_queue.sim_fach(curr_ts, dir, curr_len, profile) {
                            state = RrcState::PromoFachDch;
                            timer = 0.0;
                        } else {
                            state = RrcState::Fach;
                        }
                    }
                } else {
                    // Case 5: idle again; this packet restarts a promotion.
                    if dir == Direction::Uplink {
                        prev_ts = add_state_range(
                            &mut result,
                            prev_ts,
                            promo_avg - timer,
                            prev_state,
                            curr_ts,
                        );
                        prev_ts = add_state_range(
                            &mut result,
                            prev_ts,
                            dch_fach_timer,
                            RrcState::DchTail,
                            curr_ts,
                        );
                        prev_ts = add_state_range(
                            &mut result,
                            prev_ts,
                            fach_idle_timer,
                            RrcState::FachTail,
                            curr_ts,
                        );
                        add_state_range(&mut result, prev_ts, f64::MAX, RrcState::Idle, curr_ts);
                        state = RrcState::PromoIdleDch;
                        timer = 0.0;
                    } else {
                        let t_max0 = curr_ts - profile.idle_dch_promo_avg;
                        prev_ts = add_state_range(
                            &mut result,
                            prev_ts,
                            promo_avg - timer,
                            prev_state,
                            t_max0,
                        );
                        prev_ts = add_state_range(
                            &mut result,
                            prev_ts,
                            dch_fach_timer,
                            RrcState::DchTail,
                            t_max0,
                        );
                        prev_ts = add_state_range(
                            &mut result,
                            prev_ts,
                            fach_idle_timer,
                            RrcState::FachTail,
                            t_max0,
                        );
                        prev_ts =
                            add_state_range(&mut result, prev_ts, f64::MAX, RrcState::Idle, t_max0);
                        add_state_range(
                            &mut result,
                            prev_ts,
                            f64::MAX,
                            RrcState::PromoIdleDch,
                            curr_ts,
                        );
                        state = RrcState::Dch;
                        dch_queue.init(curr_ts, curr_len, dir);
                    }
                }
            }

            RrcState::Dch => {
                let dch_tail = dch_queue.dch_tail(profile);
                if delta <= dch_tail + EPS {
                    // DCH case 1: still within the (dynamic) tail.
                    add_state_range(&mut result, prev_ts, f64::MAX, RrcState::Dch, curr_ts);
                    state = RrcState::Dch;
                    dch_queue.update(curr_ts, curr_len, dir, profile);
                } else if delta <= dch_tail + fach_idle_timer {
                    // DCH case 2: demoted to FACH.
                    if dir == Direction::Downlink {
                        fach_queue.init();
                        if fach_queue.sim_fach(curr_ts, dir, curr_len, profile) {
                            let t_max0 = curr_ts - profile.fach_dch_promo_avg;
                            retag_backward(&mut result, dch_fach_timer - dch_tail, RrcState::DchTail);
                            prev_ts = add_state_range(
                                &mut result,
                                prev_ts,
                                dch_tail,
                                RrcState::DchTail,
                                t_max0,
                            );
                            prev_ts = add_state_range(
                                &mut result,
                                prev_ts,
                                f64::MAX,
                                RrcState::Fach,
                                t_max0,
                            );
                            add_state_range(
                                &mut result,
                                prev_ts,
                                f64::MAX,
                                RrcState::PromoFachDch,
                                curr_ts,
                            );
                            state = RrcState::Dch;
                            dch_queue.init(curr_ts, curr_len, dir);
                        } else {
                            retag_backward(&mut result, dch_fach_timer - dch_tail, RrcState::DchTail);
                            prev_ts = add_state_range(
                                &mut result,
                                prev_ts,
                                dch_tail,
                                RrcState::DchTail,
                                curr_ts,
                            );
                            add_state_range(&mut result, prev_ts, f64::MAX, RrcState::Fach, curr_ts);
                            state = RrcState::Fach;
                        }
                    } else {
                        fach_queue.init();
                        retag_backward(&mut result, dch_fach_timer - dch_tail, RrcState::DchTail);
                        prev_ts = add_state_range(
                            &mut result,
                            prev_ts,
                            dch_tail,
                            RrcState::DchTail,
                            curr_ts,
                        );
                        add_state_range(&mut result, prev_ts, f64::MAX, RrcState::Fach, curr_ts);
                        if fach_queue.sim_fach(curr_ts, dir, curr_len, profile) {
                            state = RrcState::PromoFachDch;
                            timer = 0.0;
                        } else {
                            state = RrcState::Fach;
                        }
                    }
                } else {
                    // DCH case 3: all the way down to IDLE.
                    if dir == Direction::Uplink {
                        retag_backward(&mut result, dch_fach_timer - dch_tail, RrcState::DchTail);
                        prev_ts = add_state_range(
                            &mut result,
                            prev_ts,
                            dch_tail,
                            RrcState::DchTail,
                            curr_ts,
                        );
                        prev_ts = add_state_range(
                            &mut result,
                            prev_ts,
                            fach_idle_timer,
                            RrcState::FachTail,
                            curr_ts,
                        );
                        add_state_range(&mut result, prev_ts, f64::MAX, RrcState::Idle, curr_ts);
                        state = RrcState::PromoIdleDch;
                        timer = 0.0;
                    } else {
                        let t_max0 = curr_ts - profile.idle_dch_promo_avg;
                        retag_backward(&mut result, dch_fach_timer - dch_tail, RrcState::DchTail);
                        prev_ts = add_state_range(
                            &mut result,
                            prev_ts,
                            dch_tail,
                            RrcState::DchTail,
                            t_max0,
                        );
                        prev_ts = add_state_range(
                            &mut result,
                            prev_ts,
                            fach_idle_timer,
                            RrcState::FachTail,
                            t_max0,
                        );
                        prev_ts =
                            add_state_range(&mut result, prev_ts, f64::MAX, RrcState::Idle, t_max0);
                        add_state_range(
                            &mut result,
                            prev_ts,
                            f64::MAX,
                            RrcState::PromoIdleDch,
                            curr_ts,
                        );
                        state = RrcState::Dch;
                        dch_queue.init(curr_ts, curr_len, dir);
                    }
                }
            }

            RrcState::Fach => {
                if delta <= fach_idle_timer {
                    if dir == Direction::Uplink {
                        add_state_range(&mut result, prev_ts, f64::MAX, RrcState::Fach, curr_ts);
                        if fach_queue.sim_fach(curr_ts, dir, curr_len, profile) {
                            state = RrcState::PromoFachDch;
                            timer = 0.0;
                        } else {
                            state = RrcState::Fach;
                        }
                    } else if fach_queue.sim_fach(curr_ts, dir, curr_len, profile) {
                        let mut t_max0 = curr_ts - profile.fach_dch_promo_avg;
                        if t_max0 > prev_ts || profile.fach_dch_promo_avg < 1e-6 {
                            prev_ts = add_state_range(
                                &mut result,
                                prev_ts,
                                f64::MAX,
                                RrcState::Fach,
                                t_max0,
                            );
                            add_state_range(
                                &mut result,
                                prev_ts,
                                f64::MAX,
                                RrcState::PromoFachDch,
                                curr_ts,
                            );
                        } else {
                            // A downlink DCH packet follows "immediately"
                            // after a FACH packet; the average promotion
                            // delay does not fit before it.
                            t_max0 = curr_ts - profile.fach_dch_promo_min;
                            if t_max0 > prev_ts {
                                prev_ts = add_state_range(
                                    &mut result,
                                    prev_ts,
                                    f64::MAX,
                                    RrcState::Fach,
                                    t_max0,
                                );
                                add_state_range(
                                    &mut result,
                                    prev_ts,
                                    f64::MAX,
                                    RrcState::PromoFachDch,
                                    curr_ts,
                                );
                            } else {
                                // Still impossible: walk back through FACH
                                // packets and re-anchor the promotion at an
                                // earlier uplink packet, rewriting the
                                // ranges emitted since then.
                                let mut fixed = false;
                                for ii in (1..i).rev() {
                                    if states[ii] != RrcState::Fach {
                                        break;
                                    }
                                    let anchor_ts = packets[ii].timestamp;
                                    if packets[ii].direction == Direction::Uplink
                                        && curr_ts >= anchor_ts + profile.fach_dch_promo_min
                                    {
                                        for jj in (1..result.len()).rev() {
                                            if result[jj].begin_time == anchor_ts {
                                                result.truncate(jj);
                                                let promo_len =
                                                    if curr_ts >= anchor_ts + profile.fach_dch_promo_avg {
                                                        profile.fach_dch_promo_avg
                                                    } else {
                                                        profile.fach_dch_promo_min
                                                    };
                                                result.push(RrcStateRange::new(
                                                    anchor_ts,
                                                    anchor_ts + promo_len,
                                                    RrcState::PromoFachDch,
                                                ));
                                                result.push(RrcStateRange::new(
                                                    anchor_ts + promo_len,
                                                    prev_ts,
                                                    RrcState::Dch,
                                                ));
                                                add_state_range(
                                                    &mut result,
                                                    prev_ts,
                                                    f64::MAX,
                                                    RrcState::Dch,
                                                    curr_ts,
                                                );
                                                break;
                                            }
                                        }
                                        fixed = true;
                                        break;
                                    }
                                }
                                if !fixed {
                                    // Give up and stay on FACH.
                                    add_state_range(
                                        &mut result,
                                        prev_ts,
                                        f64::MAX,
                                        RrcState::Fach,
                                        curr_ts,
                                    );
                                    fach_queue.init();
                                }
                            }
                        }
                        state = RrcState::Dch;
                        dch_queue.init(curr_ts, curr_len, dir);
                    } else {
                        add_state_range(&mut result, prev_ts, f64::MAX, RrcState::Fach, curr_ts);
                        state = RrcState::Fach;
                    }
                } else if dir == Direction::Uplink {
                    prev_ts = add_state_range(
                        &mut result,
                        prev_ts,
                        fach_idle_timer,
                        RrcState::FachTail,
                        curr_ts,
                    );
                    add_state_range(&mut result, prev_ts, f64::MAX, RrcState::Idle, curr_ts);
                    state = RrcState::PromoIdleDch;
                    timer = 0.0;
                } else {
                    let t_max0 = curr_ts - profile.idle_dch_promo_avg;
                    prev_ts = add_state_range(
                        &mut result,
                        prev_ts,
                        fach_idle_timer,
                        RrcState::FachTail,
                        t_max0,
                    );
                    prev_ts = add_state_range(&mut result, prev_ts, f64::MAX, RrcState::Idle, t_max0);
                    add_state_range(&mut result, prev_ts, f64::MAX, RrcState::PromoIdleDch, curr_ts);
                    state = RrcState::Dch;
                    dch_queue.init(curr_ts, curr_len, dir);
                }
            }

            _ => {}
        }

        if i < packets.len() {
            states[i] = state;
        }
    }

    for (packet, state) in packets.iter().zip(states.iter()) {
        tags.set_radio_state(packet.id, *state);
    }

    result
}
