//! Radio Resource Control modeling: the per-technology state machines that
//! turn a packet timestamp sequence into disjoint power-state time ranges,
//! and the aggregate statistics computed over those ranges.

pub mod machine;
pub mod simulator;

pub use machine::{LteBreakdown, RrcBreakdown, RrcStateMachine, ThreeGBreakdown, WifiBreakdown};
pub use simulator::simulate;

use serde::Serialize;

/// RRC power state across the three supported technologies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RrcState {
    // 3G
    Idle,
    Fach,
    Dch,
    FachTail,
    DchTail,
    PromoIdleDch,
    PromoFachDch,
    // LTE
    LteIdle,
    LtePromotion,
    LteContinuous,
    LteCrTail,
    LteDrxShort,
    LteDrxLong,
    // WiFi
    WifiIdle,
    WifiActive,
    WifiTail,
}

/// Half-open `[begin, end)` interval spent in one RRC state.
///
/// After simulation the range list is sorted, non-overlapping, and tiles
/// `[0, trace_duration)` without gaps.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RrcStateRange {
    pub begin_time: f64,
    pub end_time: f64,
    pub state: RrcState,
}

impl RrcStateRange {
    pub fn new(begin_time: f64, end_time: f64, state: RrcState) -> Self {
        Self { begin_time, end_time, state }
    }

    pub fn duration(&self) -> f64 {
        self.end_time - self.begin_time
    }
}

/// Merge adjacent same-state ranges after sorting by begin time.
pub(crate) fn compress_ranges(mut ranges: Vec<RrcStateRange>) -> Vec<RrcStateRange> {
    ranges.sort_by(|a, b| a.begin_time.total_cmp(&b.begin_time));
    let mut compressed: Vec<RrcStateRange> = Vec::with_capacity(ranges.len());
    for range in ranges {
        match compressed.last_mut() {
            Some(last) if last.state == range.state => last.end_time = range.end_time,
            _ => compressed.push(range),
        }
    }
    compressed
}

/// Clip a compressed range list at `trace_duration`, dropping ranges that
/// start at or beyond it and truncating the one crossing it.
pub(crate) fn truncate_ranges(ranges: &mut Vec<RrcStateRange>, trace_duration: f64) {
    ranges.retain(|r| r.begin_time < trace_duration && r.end_time != f64::MAX);
    for range in ranges.iter_mut() {
        if range.end_time > trace_duration {
            range.end_time = trace_duration;
        }
    }
}

/// Clip a range list to a `[begin, end]` analysis window.
pub fn clip_to_time_range(
    ranges: &[RrcStateRange],
    begin: f64,
    end: f64,
) -> Vec<RrcStateRange> {
    let mut clipped = Vec::new();
    let mut tail_added = false;
    for range in ranges {
        if range.begin_time >= begin && range.end_time <= end {
            clipped.push(*range);
        } else if range.begin_time <= begin && range.end_time <= end && range.end_time > begin {
            clipped.push(RrcStateRange::new(begin, range.end_time, range.state));
        } else if range.begin_time <= begin && range.end_time >= end {
            clipped.push(RrcStateRange::new(begin, end, range.state));
        } else if range.begin_time >= begin
            && range.begin_time < end
            && range.end_time >= end
            && !tail_added
        {
            clipped.push(RrcStateRange::new(range.begin_time, end, range.state));
            tail_added = true;
        }
    }
    clipped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compress_merges_adjacent_same_state() {
        let ranges = vec![
            RrcStateRange::new(0.0, 1.0, RrcState::Idle),
            RrcStateRange::new(1.0, 2.0, RrcState::Idle),
            RrcStateRange::new(2.0, 3.0, RrcState::Dch),
        ];
        let compressed = compress_ranges(ranges);
        assert_eq!(compressed.len(), 2);
        assert_eq!(compressed[0].end_time, 2.0);
        assert_eq!(compressed[1].state, RrcState::Dch);
    }

    #[test]
    fn truncate_clips_and_drops() {
        let mut ranges = vec![
            RrcStateRange::new(0.0, 5.0, RrcState::Dch),
            RrcStateRange::new(5.0, 15.0, RrcState::DchTail),
            RrcStateRange::new(15.0, 20.0, RrcState::Idle),
        ];
        truncate_ranges(&mut ranges, 10.0);
        assert_eq!(ranges.len(), 2);
        assert_eq!(ranges[1].end_time, 10.0);
    }

    #[test]
    fn clip_to_window_covers_overlap_cases() {
        let ranges = vec![
            RrcStateRange::new(0.0, 4.0, RrcState::Idle),
            RrcStateRange::new(4.0, 8.0, RrcState::Dch),
            RrcStateRange::new(8.0, 12.0, RrcState::DchTail),
        ];
        let clipped = clip_to_time_range(&ranges, 2.0, 10.0);
        assert_eq!(clipped.len(), 3);
        assert_eq!(clipped[0].begin_time, 2.0);
        assert_eq!(clipped[2].end_time, 10.0);
    }
}
