//! Burst grouping, classification, energy attribution, and periodic
//! diagnosis.
//!
//! Grouping uses the inter-packet threshold with an MSS suppression: a
//! gap after a maximum-size segment does not split, since the sender was
//! mid-transfer. Promotion delays are then subtracted from the timeline
//! and bursts separated only by them are merged. Classification applies
//! the ordered heuristics; the first matching rule wins.

use std::collections::{HashMap, HashSet};
use std::net::IpAddr;

use crate::profile::Profile;
use crate::rrc::{RrcState, RrcStateRange};
use crate::session::Session;
use crate::trace::{CpuSample, Direction, PacketRecord, TagTable, TcpRole, UserEvent};

use super::{Burst, BurstAnalysisInfo, BurstCategory, BurstCollectionAnalysisData};

const EPS: f64 = 1e-6;
/// Window before a burst in which a user event may still explain it.
const USER_EVENT_TOLERATE: f64 = 4.0;
/// Average CPU percentage above which a loosely-matched burst is blamed
/// on computation instead of the user.
const AVG_CPU_USAGE_THRESHOLD: f64 = 70.0;
/// Payload size above which a packet counts as "large" for the MSS
/// heuristic, the share of large traffic a size must hold, and the
/// fallback when no large packets exist.
const LARGE_PACKET_SIZE: usize = 1000;
const LARGE_PACKET_FRACTION: f64 = 0.3;
const DEFAULT_MSS: usize = 1460;

/// Run the full burst analysis.
#[allow(clippy::too_many_arguments)]
pub fn analyze(
    packets: &[PacketRecord],
    profile: &Profile,
    packet_size_counts: &std::collections::BTreeMap<usize, usize>,
    rrc_ranges: &[RrcStateRange],
    user_events: &[UserEvent],
    cpu_samples: &[CpuSample],
    sessions: &[Session],
    tags: &TagTable,
) -> BurstCollectionAnalysisData {
    let mut data = BurstCollectionAnalysisData::default();

    let mss = mss_packet_sizes(packet_size_counts);
    let mut bursts = group_into_bursts(packets, profile, &mss, rrc_ranges);
    if bursts.is_empty() {
        return data;
    }

    data.long_burst_count = classify_bursts(&mut bursts, packets, profile, user_events, cpu_samples, tags);
    data.total_energy = attribute_burst_energy(&mut bursts, rrc_ranges, profile, packets);
    diagnose_periodic_bursts(&mut bursts, packets, sessions, profile, tags);
    data.burst_analysis_info = aggregate_by_category(&bursts, packets);
    let (shortest_packet, shortest_interval) = find_shortest_period(&bursts);
    data.shortest_period_packet = shortest_packet;
    data.shortest_period_interval = shortest_interval;
    data.bursts = bursts;
    data
}

/// The trace's dominant large packet sizes: sizes above 1000 bytes that
/// individually carry more than 30% of all large packets. Falls back to
/// the common Ethernet MSS when the trace has no large packets.
fn mss_packet_sizes(packet_size_counts: &std::collections::BTreeMap<usize, usize>) -> HashSet<usize> {
    let mut sizes = HashSet::new();
    let total_large: usize = packet_size_counts
        .iter()
        .filter(|&(&size, &count)| size > LARGE_PACKET_SIZE && count > 1)
        .map(|(_, &count)| count)
        .sum();

    if total_large > 0 {
        for (&size, &count) in packet_size_counts {
            if size > LARGE_PACKET_SIZE && count > 1 {
                let fraction = count as f64 / total_large as f64;
                if fraction > LARGE_PACKET_FRACTION {
                    sizes.insert(size);
                }
            }
        }
    } else {
        sizes.insert(DEFAULT_MSS);
    }
    sizes
}

fn group_into_bursts(
    packets: &[PacketRecord],
    profile: &Profile,
    mss: &HashSet<usize>,
    rrc_ranges: &[RrcStateRange],
) -> Vec<Burst> {
    if packets.is_empty() {
        return Vec::new();
    }
    let burst_th = profile.common().burst_th;
    let long_burst_th = profile.common().long_burst_th;

    // Step 1: threshold grouping with MSS suppression.
    let mut result: Vec<Burst> = Vec::new();
    let mut current: Vec<usize> = Vec::new();
    let mut last: Option<usize> = None;
    for (index, packet) in packets.iter().enumerate() {
        let splits = match last {
            None => true,
            Some(previous) => {
                packet.timestamp - packets[previous].timestamp > burst_th
                    && !mss.contains(&packets[previous].payload_len())
            }
        };
        if splits && !current.is_empty() {
            result.push(Burst::new(std::mem::take(&mut current), packets));
        }
        current.push(index);
        last = Some(index);
    }
    result.push(Burst::new(current, packets));

    // Step 2: subtract promotion delays, then merge bursts whose gap
    // disappears.
    let normalized = normalize_times(packets, rrc_ranges);
    let mut merged: Vec<Burst> = Vec::with_capacity(result.len());
    let mut iter = result.into_iter();
    let mut current = iter.next().expect("at least one burst");
    for next in iter {
        let end = current.end_packet().expect("non-empty burst");
        let begin = next.begin_packet().expect("non-empty burst");
        if normalized[begin] - normalized[end] < burst_th {
            current.merge(next);
        } else {
            merged.push(current);
            current = next;
        }
    }
    merged.push(current);

    // Step 3: long inter-burst flags; the last burst is always long.
    for index in 0..merged.len() {
        if index + 1 < merged.len() {
            let gap = merged[index + 1].begin_time - merged[index].end_time;
            merged[index].long_inter_burst = gap > long_burst_th;
        } else {
            merged[index].long_inter_burst = true;
        }
    }
    merged
}

/// Shift packet timestamps left by the accumulated promotion time, so
/// bursts separated only by radio promotions appear adjacent.
fn normalize_times(packets: &[PacketRecord], rrc_ranges: &[RrcStateRange]) -> Vec<f64> {
    let mut promotions: Vec<&RrcStateRange> = rrc_ranges
        .iter()
        .filter(|r| matches!(r.state, RrcState::PromoFachDch | RrcState::PromoIdleDch))
        .collect();
    promotions.sort_by(|a, b| a.begin_time.total_cmp(&b.begin_time));

    let mut normalized: Vec<f64> = packets.iter().map(|p| p.timestamp).collect();
    let mut shift = 0.0;
    let mut cursor = 0;
    let mut middle_position: Option<f64> = None;
    for value in normalized.iter_mut() {
        let timestamp = *value;
        while cursor < promotions.len() && timestamp >= promotions[cursor].end_time - EPS {
            match middle_position.take() {
                Some(position) => shift += promotions[cursor].end_time - position,
                None => shift += promotions[cursor].duration(),
            }
            cursor += 1;
        }
        if cursor < promotions.len()
            && promotions[cursor].begin_time - EPS < timestamp
            && timestamp < promotions[cursor].end_time + EPS
        {
            match middle_position {
                None => shift += timestamp - promotions[cursor].begin_time,
                Some(position) => shift += timestamp - position,
            }
            middle_position = Some(timestamp);
        }
        *value = timestamp - shift;
    }
    normalized
}

/// Apply the priority-ordered classification; returns the long-burst
/// count.
fn classify_bursts(
    bursts: &mut [Burst],
    packets: &[PacketRecord],
    profile: &Profile,
    user_events: &[UserEvent],
    cpu_samples: &[CpuSample],
    tags: &TagTable,
) -> usize {
    let common = profile.common();
    let mut long_burst_count = 0;
    let mut user_event_pointer = 0;
    let mut cpu_pointer = 0;
    let mut last_burst_end: Option<f64> = None;

    for burst in bursts.iter_mut() {
        let previous_end = last_burst_end;
        last_burst_end = Some(burst.end_time);

        let mut payload_len = 0u64;
        let mut roles: HashSet<TcpRole> = HashSet::new();
        for &index in &burst.packet_indices {
            payload_len += packets[index].payload_len() as u64;
            if let Some(role) = tags.tcp_role(packets[index].id) {
                roles.insert(role);
            }
        }
        let first = burst.begin_packet().expect("non-empty burst");
        let first_role = tags.tcp_role(packets[first].id);
        let burst_start = burst.begin_time;

        // Long transfer.
        if burst.end_time - burst.begin_time > common.large_burst_duration
            && payload_len > common.large_burst_size
        {
            burst.category = BurstCategory::Long;
            long_burst_count += 1;
            continue;
        }

        // No payload: protocol overhead or loss recovery.
        if payload_len == 0 {
            if roles.contains(&TcpRole::Close)
                || roles.contains(&TcpRole::Establish)
                || roles.contains(&TcpRole::Reset)
                || roles.contains(&TcpRole::KeepAlive)
                || roles.contains(&TcpRole::KeepAliveAck)
                || roles.contains(&TcpRole::ZeroWindow)
                || roles.contains(&TcpRole::WindowUpdate)
            {
                burst.category = BurstCategory::TcpProtocol;
                continue;
            }
            if matches!(first_role, Some(TcpRole::AckRecover) | Some(TcpRole::AckDup)) {
                burst.category = BurstCategory::TcpLossOrDup;
                continue;
            }
        }

        // Server-initiated traffic.
        if packets[first].direction == Direction::Downlink
            && matches!(first_role, Some(TcpRole::Data) | Some(TcpRole::Ack))
        {
            burst.category = BurstCategory::ServerNetDelay;
            continue;
        }

        // Loss or duplication.
        if matches!(first_role, Some(TcpRole::AckDup) | Some(TcpRole::DataDup)) {
            burst.category = BurstCategory::TcpLossOrDup;
            continue;
        }
        if matches!(first_role, Some(TcpRole::DataRecover) | Some(TcpRole::AckRecover)) {
            burst.category = BurstCategory::TcpLossOrDup;
            continue;
        }

        // User-triggered.
        if payload_len > 0 {
            while user_event_pointer < user_events.len()
                && user_events[user_event_pointer].release_time < burst_start - USER_EVENT_TOLERATE
            {
                user_event_pointer += 1;
            }
            let user_category = user_events.get(user_event_pointer).map(|event| {
                if event.event_type.is_rotation() {
                    BurstCategory::ScreenRotation
                } else {
                    BurstCategory::UserInput
                }
            });

            let mut min_gap = f64::MAX;
            for event in &user_events[user_event_pointer.min(user_events.len())..] {
                if within_tolerate(event.press_time, burst_start) {
                    min_gap = min_gap.min(burst_start - event.press_time);
                }
                if within_tolerate(event.release_time, burst_start) {
                    min_gap = min_gap.min(burst_start - event.release_time);
                }
                if event.press_time > burst_start {
                    break;
                }
            }

            if min_gap < common.user_input_th {
                burst.category = user_category.unwrap_or(BurstCategory::UserInput);
                continue;
            } else if min_gap < USER_EVENT_TOLERATE
                && previous_end.map(|end| end < burst.begin_time - min_gap).unwrap_or(true)
            {
                // Only a loose match: high CPU load over the gap window
                // re-attributes the burst to computation.
                let cpu_begin = burst_start - min_gap;
                let cpu_end = burst_start;
                while cpu_pointer < cpu_samples.len()
                    && cpu_samples[cpu_pointer].timestamp < burst.begin_time - USER_EVENT_TOLERATE
                {
                    cpu_pointer += 1;
                }
                let mut usage_sum = 0.0;
                let mut usage_count = 0;
                for sample in &cpu_samples[cpu_pointer.min(cpu_samples.len())..] {
                    if sample.timestamp > cpu_begin && sample.timestamp < cpu_end {
                        usage_sum += sample.total_usage;
                        usage_count += 1;
                    }
                    if sample.timestamp >= cpu_end {
                        break;
                    }
                }
                if usage_count > 0 && usage_sum / usage_count as f64 > AVG_CPU_USAGE_THRESHOLD {
                    burst.category = BurstCategory::Cpu;
                } else {
                    burst.category = user_category.unwrap_or(BurstCategory::UserInput);
                }
                continue;
            }
        }

        burst.category = if payload_len == 0 {
            BurstCategory::Unknown
        } else {
            BurstCategory::ClientApp
        };
    }
    long_burst_count
}

fn within_tolerate(event_time: f64, burst_time: f64) -> bool {
    event_time < burst_time && event_time > burst_time - USER_EVENT_TOLERATE
}

/// Walk RRC ranges and bursts in parallel time order, attributing energy
/// and radio-active time to each burst's `[begin, next begin)` window.
fn attribute_burst_energy(
    bursts: &mut [Burst],
    rrc_ranges: &[RrcStateRange],
    profile: &Profile,
    packets: &[PacketRecord],
) -> f64 {
    if rrc_ranges.is_empty() || bursts.is_empty() {
        return 0.0;
    }
    let is_active = |state: RrcState| {
        matches!(
            state,
            RrcState::Dch
                | RrcState::DchTail
                | RrcState::LteContinuous
                | RrcState::LteCrTail
                | RrcState::WifiActive
                | RrcState::WifiTail
        )
    };

    let mut total_energy = 0.0;
    let mut cursor = 0;
    let mut window_start = rrc_ranges[0].begin_time;
    let trace_end = rrc_ranges[rrc_ranges.len() - 1].end_time;

    for index in 0..bursts.len() {
        let window_end = bursts
            .get(index + 1)
            .map(|next| next.begin_time)
            .unwrap_or(trace_end);

        let mut energy = 0.0;
        let mut active_time = 0.0;
        // Skip ranges wholly before the window, then take the first
        // overlapping slice.
        while cursor < rrc_ranges.len() {
            let range = &rrc_ranges[cursor];
            if range.end_time < window_start {
                cursor += 1;
                continue;
            }
            if window_end > range.end_time {
                energy += profile.energy(window_start, range.end_time, range.state, packets);
                if is_active(range.state) {
                    active_time += range.end_time - window_start;
                }
                cursor += 1;
            }
            break;
        }
        // Remaining ranges inside (and the one crossing) the window end.
        while cursor < rrc_ranges.len() {
            let range = &rrc_ranges[cursor];
            let slice_start = range.begin_time.max(window_start);
            if range.end_time < window_end {
                energy += profile.energy(slice_start, range.end_time, range.state, packets);
                if is_active(range.state) {
                    active_time += range.end_time - slice_start;
                }
                cursor += 1;
            } else {
                energy += profile.energy(slice_start, window_end, range.state, packets);
                if is_active(range.state) {
                    active_time += window_end - slice_start;
                }
                break;
            }
        }

        bursts[index].energy = energy;
        bursts[index].active_time = active_time;
        total_energy += energy;
        window_start = window_end;
    }
    total_energy
}

/// Inter-arrival sample used by the periodic self-correlation.
#[derive(Clone, Copy)]
struct IatSample {
    interval: f64,
    begin_time: f64,
    begin_event: usize,
    end_event: usize,
}

/// Longest chain of samples where each ends at the event the next one
/// starts from (non-overlapping repeats).
fn non_overlapping_chain(samples: &mut [IatSample]) -> usize {
    samples.sort_by(|a, b| a.begin_time.total_cmp(&b.begin_time));
    let mut best = 0;
    let mut chain_lengths: Vec<usize> = Vec::with_capacity(samples.len());
    for i in 0..samples.len() {
        let mut length = 1;
        for j in 0..i {
            if samples[j].end_event == samples[i].begin_event && chain_lengths[j] + 1 > length {
                length = chain_lengths[j] + 1;
            }
        }
        chain_lengths.push(length);
        best = best.max(length);
    }
    best
}

/// Detect a periodic repeat pattern in a sorted timestamp list.
fn is_periodic(timestamps: &[f64], profile: &Profile) -> bool {
    let n = timestamps.len();
    if n <= 3 {
        return false;
    }
    let common = profile.common();

    let mut samples: Vec<IatSample> = Vec::new();
    for i in 0..n - 1 {
        for j in i + 1..n {
            samples.push(IatSample {
                interval: timestamps[j] - timestamps[i],
                begin_time: timestamps[i],
                begin_event: i,
                end_event: j,
            });
        }
    }
    samples.sort_by(|a, b| a.interval.total_cmp(&b.interval));

    let mut best_cluster: Vec<IatSample> = Vec::new();
    let mut best_chain = 0;
    for i in 0..samples.len() {
        let mut cluster: Vec<IatSample> = Vec::new();
        let mut j = i;
        while j < samples.len() && samples[j].interval - samples[i].interval < common.period_cycle_tol {
            cluster.push(samples[j]);
            j += 1;
        }
        let average: f64 = cluster.iter().map(|s| s.interval).sum::<f64>() / cluster.len() as f64;
        let chain = non_overlapping_chain(&mut cluster);
        if average > common.period_min_cycle && chain > best_chain {
            best_cluster = cluster;
            best_chain = chain;
        }
    }

    let chain = non_overlapping_chain(&mut best_cluster);
    if chain < common.period_min_samples {
        return false;
    }
    let cycle: f64 =
        best_cluster.iter().map(|s| s.interval).sum::<f64>() / best_cluster.len() as f64;
    cycle > 0.0
}

/// Re-categorize client-app bursts that belong to a periodic connection
/// pattern (by request host, request object, or connection address).
fn diagnose_periodic_bursts(
    bursts: &mut [Burst],
    packets: &[PacketRecord],
    sessions: &[Session],
    profile: &Profile,
    tags: &TagTable,
) {
    let mut host_times: HashMap<String, Vec<f64>> = HashMap::new();
    let mut object_times: HashMap<String, Vec<f64>> = HashMap::new();
    let mut connection_times: HashMap<IpAddr, Vec<f64>> = HashMap::new();

    for session in sessions {
        if let Some(&first) = session.packet_indices.first() {
            if tags.tcp_role(packets[first].id) == Some(TcpRole::Establish) {
                connection_times
                    .entry(session.key.remote_ip)
                    .or_default()
                    .push(packets[first].timestamp);
            }
        }
        for message in &session.messages {
            if !message.is_request() {
                continue;
            }
            let Some(first) = message.first_data_packet else { continue };
            let timestamp = packets[first].timestamp;
            if let Some(host) = &message.host_name {
                host_times.entry(host.clone()).or_default().push(timestamp);
            }
            if let Some(object) = message.obj_name_without_params() {
                object_times.entry(object.to_string()).or_default().push(timestamp);
            }
        }
    }

    let periodic_hosts: HashSet<String> = host_times
        .into_iter()
        .filter_map(|(host, mut times)| {
            times.sort_by(f64::total_cmp);
            is_periodic(&times, profile).then_some(host)
        })
        .collect();
    let periodic_objects: HashSet<String> = object_times
        .into_iter()
        .filter_map(|(object, mut times)| {
            times.sort_by(f64::total_cmp);
            is_periodic(&times, profile).then_some(object)
        })
        .collect();
    let periodic_ips: HashSet<IpAddr> = connection_times
        .into_iter()
        .filter_map(|(ip, mut times)| {
            times.sort_by(f64::total_cmp);
            is_periodic(&times, profile).then_some(ip)
        })
        .collect();

    for burst in bursts.iter_mut() {
        if burst.category != BurstCategory::ClientApp {
            continue;
        }
        if let Some(first) = burst.begin_packet() {
            let packet = &packets[first];
            if periodic_ips.contains(&packet.src_ip) || periodic_ips.contains(&packet.dst_ip) {
                burst.category = BurstCategory::Periodical;
                continue;
            }
        }

        let first_uplink_payload = burst
            .packet_indices
            .iter()
            .copied()
            .find(|&index| {
                packets[index].direction == Direction::Uplink && packets[index].payload_len() > 0
            });
        let Some(first_uplink) = first_uplink_payload else { continue };

        'sessions: for session in sessions {
            for message in &session.messages {
                if !message.is_request() {
                    continue;
                }
                let matches_host = message
                    .host_name
                    .as_ref()
                    .map(|h| periodic_hosts.contains(h))
                    .unwrap_or(false);
                let matches_object = message
                    .obj_name_without_params()
                    .map(|o| periodic_objects.contains(o))
                    .unwrap_or(false);
                if (matches_host || matches_object)
                    && message.first_data_packet == Some(first_uplink)
                {
                    burst.category = BurstCategory::Periodical;
                    burst.first_uplink_data_packet = Some(first_uplink);
                    break 'sessions;
                }
            }
        }
    }
}

/// Shortest interval between consecutive periodic bursts, with the packet
/// anchoring it.
fn find_shortest_period(bursts: &[Burst]) -> (Option<usize>, Option<f64>) {
    let mut previous: Option<&Burst> = None;
    let mut min_interval = f64::MAX;
    let mut packet = None;
    for burst in bursts {
        if burst.category != BurstCategory::Periodical {
            continue;
        }
        if let Some(last) = previous {
            let interval = burst.begin_time - last.begin_time;
            if interval < min_interval {
                min_interval = interval;
                packet = burst.first_uplink_data_packet.or_else(|| burst.begin_packet());
            }
        }
        previous = Some(burst);
    }
    if packet.is_some() {
        (packet, Some(min_interval))
    } else {
        (None, None)
    }
}

/// Per-category payload/energy/active-time totals and shares.
fn aggregate_by_category(bursts: &[Burst], packets: &[PacketRecord]) -> Vec<BurstAnalysisInfo> {
    let mut payload: HashMap<BurstCategory, u64> = HashMap::new();
    let mut energy: HashMap<BurstCategory, f64> = HashMap::new();
    let mut active: HashMap<BurstCategory, f64> = HashMap::new();
    let mut total_payload = 0u64;
    let mut total_energy = 0.0;
    let mut total_active = 0.0;

    for burst in bursts {
        // Payload counts application traffic only.
        let burst_payload: u64 = burst
            .packet_indices
            .iter()
            .filter(|&&index| packets[index].app_name.is_some())
            .map(|&index| packets[index].payload_len() as u64)
            .sum();
        total_payload += burst_payload;
        total_energy += burst.energy;
        total_active += burst.active_time;
        *payload.entry(burst.category).or_default() += burst_payload;
        *energy.entry(burst.category).or_default() += burst.energy;
        *active.entry(burst.category).or_default() += burst.active_time;
    }

    let mut info = Vec::new();
    for category in BurstCategory::ALL {
        let Some(&category_energy) = energy.get(&category) else {
            continue;
        };
        let category_payload = payload.get(&category).copied().unwrap_or(0);
        let category_active = active.get(&category).copied().unwrap_or(0.0);
        info.push(BurstAnalysisInfo {
            category,
            payload_bytes: category_payload,
            payload_pct: percentage(category_payload as f64, total_payload as f64),
            energy: category_energy,
            energy_pct: percentage(category_energy, total_energy),
            active_time: category_active,
            active_time_pct: percentage(category_active, total_active),
            joules_per_kilobyte: (category_payload > 0)
                .then(|| category_energy / (category_payload as f64 * 8.0 / 1000.0)),
        });
    }
    info
}

fn percentage(part: f64, whole: f64) -> f64 {
    if whole > 0.0 { part / whole * 100.0 } else { 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::ProfileLte;
    use crate::trace::{TcpHeader, Transport, UserEventType};
    use std::collections::BTreeMap;
    use std::net::Ipv4Addr;

    fn packet(id: usize, timestamp: f64, direction: Direction, payload_len: usize) -> PacketRecord {
        PacketRecord {
            id,
            timestamp,
            direction,
            src_ip: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
            dst_ip: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)),
            ip_len: 40 + payload_len,
            transport: Transport::Tcp(TcpHeader {
                src_port: 1,
                dst_port: 2,
                sequence: 0,
                ack_number: 0,
                window: 100,
                syn: false,
                ack: true,
                fin: false,
                rst: false,
                psh: false,
            }),
            payload: vec![0; payload_len],
            app_name: Some("app".to_string()),
        }
    }

    fn lte_profile() -> Profile {
        Profile::Lte(ProfileLte::default())
    }

    fn no_sizes() -> BTreeMap<usize, usize> {
        BTreeMap::new()
    }

    #[test]
    fn mss_detection_defaults_and_dominance() {
        let mut counts = BTreeMap::new();
        counts.insert(1460usize, 90usize);
        counts.insert(1400, 5);
        counts.insert(100, 50);
        let sizes = mss_packet_sizes(&counts);
        assert!(sizes.contains(&1460));
        assert!(!sizes.contains(&1400)); // only ~5% of large packets
        assert!(!sizes.contains(&100));

        let empty = mss_packet_sizes(&no_sizes());
        assert!(empty.contains(&DEFAULT_MSS));
    }

    #[test]
    fn grouping_splits_on_threshold() {
        // burst_th = 1.5; packets at 0, 1, 10 split into [0,1] and [10].
        let packets = vec![
            packet(1, 0.0, Direction::Uplink, 100),
            packet(2, 1.0, Direction::Uplink, 100),
            packet(3, 10.0, Direction::Uplink, 100),
        ];
        let bursts = group_into_bursts(&packets, &lte_profile(), &HashSet::new(), &[]);
        assert_eq!(bursts.len(), 2);
        assert_eq!(bursts[0].packet_indices, vec![0, 1]);
        assert_eq!(bursts[1].packet_indices, vec![2]);
        // Gap of 9s > long_burst_th = 5.
        assert!(bursts[0].long_inter_burst);
        assert!(bursts[1].long_inter_burst);
    }

    #[test]
    fn bursts_partition_the_packet_list() {
        let packets: Vec<PacketRecord> = (0..20)
            .map(|i| packet(i + 1, i as f64 * 0.9, Direction::Uplink, 10))
            .collect();
        let bursts = group_into_bursts(&packets, &lte_profile(), &HashSet::new(), &[]);
        let flattened: Vec<usize> = bursts.iter().flat_map(|b| b.packet_indices.clone()).collect();
        assert_eq!(flattened, (0..20).collect::<Vec<usize>>());
    }

    #[test]
    fn mss_sized_predecessor_suppresses_split() {
        let mut counts = BTreeMap::new();
        counts.insert(1460usize, 10usize);
        let mss = mss_packet_sizes(&counts);
        let packets = vec![
            packet(1, 0.0, Direction::Downlink, 1460),
            packet(2, 3.0, Direction::Downlink, 500),
        ];
        let bursts = group_into_bursts(&packets, &lte_profile(), &mss, &[]);
        assert_eq!(bursts.len(), 1);
    }

    #[test]
    fn promotion_normalization_merges_bursts() {
        // Two packets 2.2s apart, with a 2.0s promotion between them:
        // after removing the promotion the gap is 0.2 < burst_th.
        let packets = vec![
            packet(1, 0.0, Direction::Uplink, 100),
            packet(2, 2.2, Direction::Uplink, 100),
        ];
        let ranges = vec![RrcStateRange::new(0.1, 2.1, RrcState::PromoIdleDch)];
        let bursts = group_into_bursts(&packets, &lte_profile(), &HashSet::new(), &ranges);
        assert_eq!(bursts.len(), 1);
    }

    #[test]
    fn classification_priority_tcp_protocol_beats_user_input() {
        // Zero payload burst holding a RESET, with a user event 0.5s
        // before: must stay TCP_PROTOCOL.
        let packets = vec![packet(1, 5.0, Direction::Uplink, 0)];
        let mut tags = TagTable::new(1);
        tags.set_tcp_role(1, TcpRole::Reset);
        let mut bursts = vec![Burst::new(vec![0], &packets)];
        let events = vec![UserEvent {
            event_type: UserEventType::Touch,
            press_time: 4.5,
            release_time: 4.6,
        }];
        classify_bursts(&mut bursts, &packets, &lte_profile(), &events, &[], &tags);
        assert_eq!(bursts[0].category, BurstCategory::TcpProtocol);
    }

    #[test]
    fn downlink_first_data_is_server_delay() {
        let packets = vec![packet(1, 5.0, Direction::Downlink, 700)];
        let mut tags = TagTable::new(1);
        tags.set_tcp_role(1, TcpRole::Data);
        let mut bursts = vec![Burst::new(vec![0], &packets)];
        classify_bursts(&mut bursts, &packets, &lte_profile(), &[], &[], &tags);
        assert_eq!(bursts[0].category, BurstCategory::ServerNetDelay);
    }

    #[test]
    fn tight_user_event_classifies_user_input() {
        let packets = vec![packet(1, 5.0, Direction::Uplink, 300)];
        let mut tags = TagTable::new(1);
        tags.set_tcp_role(1, TcpRole::Data);
        let mut bursts = vec![Burst::new(vec![0], &packets)];
        let events = vec![UserEvent {
            event_type: UserEventType::Touch,
            press_time: 4.5,
            release_time: 4.6,
        }];
        classify_bursts(&mut bursts, &packets, &lte_profile(), &events, &[], &tags);
        assert_eq!(bursts[0].category, BurstCategory::UserInput);
    }

    #[test]
    fn rotation_event_classifies_screen_rotation() {
        let packets = vec![packet(1, 5.0, Direction::Uplink, 300)];
        let mut tags = TagTable::new(1);
        tags.set_tcp_role(1, TcpRole::Data);
        let mut bursts = vec![Burst::new(vec![0], &packets)];
        let events = vec![UserEvent {
            event_type: UserEventType::ScreenLandscape,
            press_time: 4.8,
            release_time: 4.9,
        }];
        classify_bursts(&mut bursts, &packets, &lte_profile(), &events, &[], &tags);
        assert_eq!(bursts[0].category, BurstCategory::ScreenRotation);
    }

    #[test]
    fn loose_user_event_with_busy_cpu_becomes_cpu() {
        let packets = vec![packet(1, 5.0, Direction::Uplink, 300)];
        let mut tags = TagTable::new(1);
        tags.set_tcp_role(1, TcpRole::Data);
        let mut bursts = vec![Burst::new(vec![0], &packets)];
        // Gap of 2s: outside user_input_th (1.0) but inside tolerance.
        let events = vec![UserEvent {
            event_type: UserEventType::Touch,
            press_time: 3.0,
            release_time: 3.0,
        }];
        let cpu = vec![
            CpuSample { timestamp: 3.5, total_usage: 95.0 },
            CpuSample { timestamp: 4.5, total_usage: 90.0 },
        ];
        classify_bursts(&mut bursts, &packets, &lte_profile(), &events, &cpu, &tags);
        assert_eq!(bursts[0].category, BurstCategory::Cpu);
    }

    #[test]
    fn unmatched_payload_burst_is_client_app() {
        let packets = vec![packet(1, 5.0, Direction::Uplink, 300)];
        let mut tags = TagTable::new(1);
        tags.set_tcp_role(1, TcpRole::Data);
        let mut bursts = vec![Burst::new(vec![0], &packets)];
        classify_bursts(&mut bursts, &packets, &lte_profile(), &[], &[], &tags);
        assert_eq!(bursts[0].category, BurstCategory::ClientApp);
    }

    #[test]
    fn long_burst_detection() {
        let common = lte_profile();
        // 6 seconds long, 200kB of payload.
        let packets: Vec<PacketRecord> = (0..200)
            .map(|i| packet(i + 1, 5.0 + i as f64 * 0.03, Direction::Downlink, 1000))
            .collect();
        let indices: Vec<usize> = (0..200).collect();
        let mut bursts = vec![Burst::new(indices, &packets)];
        let tags = TagTable::new(200);
        let long_count = classify_bursts(&mut bursts, &packets, &common, &[], &[], &tags);
        assert_eq!(long_count, 1);
        assert_eq!(bursts[0].category, BurstCategory::Long);
    }

    #[test]
    fn energy_attribution_splits_ranges_between_bursts() {
        let profile = lte_profile();
        let packets = vec![
            packet(1, 1.0, Direction::Uplink, 100),
            packet(2, 10.0, Direction::Uplink, 100),
        ];
        let mut bursts = vec![
            Burst::new(vec![0], &packets),
            Burst::new(vec![1], &packets),
        ];
        // One promotion range covering the whole trace for simplicity.
        let ranges = vec![RrcStateRange::new(0.0, 20.0, RrcState::LtePromotion)];
        let total = attribute_burst_energy(&mut bursts, &ranges, &profile, &packets);
        // Burst 1 window [0,10), burst 2 [10,20): equal halves.
        assert!((bursts[0].energy - bursts[1].energy).abs() < 1e-9);
        assert!((total - 20.0 * 1.21).abs() < 1e-9);
        assert_eq!(bursts[0].active_time, 0.0); // promotion is not active
    }

    #[test]
    fn periodic_detection_needs_enough_regular_samples() {
        let profile = lte_profile();
        // Period of 12s > period_min_cycle (10), 5 samples.
        let times: Vec<f64> = (0..5).map(|i| i as f64 * 12.0).collect();
        assert!(is_periodic(&times, &profile));
        // Irregular times.
        let times = vec![0.0, 3.0, 50.0, 51.0];
        assert!(!is_periodic(&times, &profile));
        // Too few samples.
        let times = vec![0.0, 12.0, 24.0];
        assert!(!is_periodic(&times, &profile));
    }

    #[test]
    fn aggregation_percentages_sum_to_hundred() {
        let packets = vec![
            packet(1, 0.0, Direction::Uplink, 100),
            packet(2, 10.0, Direction::Uplink, 300),
        ];
        let mut bursts = vec![
            Burst::new(vec![0], &packets),
            Burst::new(vec![1], &packets),
        ];
        bursts[0].category = BurstCategory::UserInput;
        bursts[0].energy = 1.0;
        bursts[1].category = BurstCategory::ClientApp;
        bursts[1].energy = 3.0;
        let info = aggregate_by_category(&bursts, &packets);
        let payload_pct: f64 = info.iter().map(|i| i.payload_pct).sum();
        let energy_pct: f64 = info.iter().map(|i| i.energy_pct).sum();
        assert!((payload_pct - 100.0).abs() < 1e-9);
        assert!((energy_pct - 100.0).abs() < 1e-9);
        let user = info.iter().find(|i| i.category == BurstCategory::UserInput).unwrap();
        assert!(user.joules_per_kilobyte.is_some());
    }
}
