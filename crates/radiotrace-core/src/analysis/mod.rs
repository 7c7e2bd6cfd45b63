//! Analysis orchestration: filter, assemble, simulate, account.
//!
//! One call runs the whole batch pipeline over a decoded capture:
//! statistics over the session-retained packets, the RRC simulation and
//! its per-state accounting, the peripheral energy model, and the burst
//! classification. Each stage consumes the complete output of the prior
//! stage; nothing is streamed.

use std::path::Path;

use thiserror::Error;

use crate::burst::{self, BurstCollectionAnalysisData};
use crate::energy::{EnergyModel, build_energy_model};
use crate::profile::Profile;
use crate::rrc::{self, RrcStateMachine, machine::build_state_machine};
use crate::session::{Session, assemble_sessions};
use crate::source::{self, SourceError};
use crate::stats::{Statistic, compute_statistic};
use crate::trace::{AnalysisFilter, PacketRecord, TagTable, Telemetry};

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("source error: {0}")]
    Source(#[from] SourceError),
}

/// Complete output of one analysis run.
#[derive(Debug)]
pub struct AnalysisResult {
    /// The filtered packet arena every index in the result refers to.
    pub packets: Vec<PacketRecord>,
    /// Per-packet TCP role and radio state tags.
    pub tags: TagTable,
    pub statistic: Statistic,
    pub sessions: Vec<Session>,
    pub rrc: RrcStateMachine,
    pub energy: EnergyModel,
    pub bursts: BurstCollectionAnalysisData,
    pub profile: Profile,
    pub trace_duration: f64,
}

/// Analyze a capture file with the given profile, filter, and telemetry.
pub fn analyze_capture_file(
    path: &Path,
    profile: Option<Profile>,
    filter: &AnalysisFilter,
    telemetry: &Telemetry,
) -> Result<AnalysisResult, AnalysisError> {
    let capture = source::read_capture_file(path)?;
    Ok(analyze(
        capture.packets,
        profile,
        filter,
        telemetry,
        capture.trace_duration,
    ))
}

/// Analyze an in-memory packet list.
///
/// With no profile given the LTE defaults apply. The packet list is
/// filtered, sessions are assembled, then the RRC machine, energy model,
/// and burst analysis run over the filtered arena.
pub fn analyze(
    packets: Vec<PacketRecord>,
    profile: Option<Profile>,
    filter: &AnalysisFilter,
    telemetry: &Telemetry,
    trace_duration: f64,
) -> AnalysisResult {
    let profile = profile.unwrap_or_default();
    let packets = filter.apply(packets);
    let mut tags = TagTable::new(packets.len());

    let sessions = assemble_sessions(&packets, &mut tags);

    // Statistics run over the packets the sessions retained (DNS and
    // direction-less packets drop out), with the byte total taken from
    // the session transfer sums.
    let retained: Vec<&PacketRecord> = sessions
        .iter()
        .flat_map(|session| session.packet_indices.iter().map(|&index| &packets[index]))
        .collect();
    let mut statistic = compute_statistic(&retained);
    statistic.total_bytes = sessions.iter().map(|s| s.bytes_transferred).sum();

    let mut ranges = rrc::simulate(&packets, &profile, trace_duration, &mut tags);
    if let Some(time_range) = &filter.time_range {
        ranges = rrc::clip_to_time_range(&ranges, time_range.begin, time_range.end);
    }
    let rrc_machine = build_state_machine(
        ranges,
        &profile,
        &packets,
        statistic.total_bytes,
        statistic.packet_duration,
        trace_duration,
    );

    let energy = build_energy_model(
        &profile,
        rrc_machine.total_rrc_energy,
        telemetry,
        trace_duration,
    );

    let bursts = burst::analyze(
        &packets,
        &profile,
        &statistic.packet_size_counts,
        &rrc_machine.ranges,
        &telemetry.user_events,
        &telemetry.cpu_samples,
        &sessions,
        &tags,
    );

    AnalysisResult {
        packets,
        tags,
        statistic,
        sessions,
        rrc: rrc_machine,
        energy,
        bursts,
        profile,
        trace_duration,
    }
}
