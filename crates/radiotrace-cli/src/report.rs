//! JSON report assembly from an analysis result, with deterministic
//! ordering throughout.

use serde::Serialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use radiotrace_core::burst::BurstAnalysisInfo;
use radiotrace_core::energy::EnergyModel;
use radiotrace_core::rrc::{RrcBreakdown, RrcStateRange};
use radiotrace_core::stats::Statistic;
use radiotrace_core::{AnalysisResult, BurstCategory};

/// Current report schema version.
pub const REPORT_VERSION: u32 = 1;
/// Timestamp used when the capture has no usable wall-clock time.
pub const DEFAULT_GENERATED_AT: &str = "1970-01-01T00:00:00Z";

#[derive(Debug, Serialize)]
pub struct ToolInfo {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Serialize)]
pub struct InputInfo {
    pub path: String,
    pub bytes: u64,
}

#[derive(Debug, Serialize)]
pub struct SessionSummary {
    pub remote_ip: String,
    pub remote_port: u16,
    pub local_port: u16,
    pub domain_name: Option<String>,
    pub remote_host_name: Option<String>,
    pub udp: bool,
    pub ssl: bool,
    pub packets: usize,
    pub bytes_transferred: u64,
    pub file_download_count: usize,
    pub request_count: usize,
    pub response_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub termination_delay: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct BurstSummary {
    pub begin_time: f64,
    pub end_time: f64,
    pub category: BurstCategory,
    pub packets: usize,
    pub payload_bytes: u64,
    pub energy: f64,
    pub active_time: f64,
    pub long_inter_burst: bool,
}

#[derive(Debug, Serialize)]
pub struct RrcReport {
    pub technology: String,
    pub total_rrc_energy: f64,
    pub joules_per_kilobyte: f64,
    pub breakdown: RrcBreakdown,
    pub ranges: Vec<RrcStateRange>,
}

#[derive(Debug, Serialize)]
pub struct BurstReport {
    pub long_burst_count: usize,
    pub total_energy: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shortest_period_interval: Option<f64>,
    pub categories: Vec<BurstAnalysisInfo>,
    pub bursts: Vec<BurstSummary>,
}

/// Aggregated analysis report, the CLI's JSON surface.
#[derive(Debug, Serialize)]
pub struct AnalysisReport {
    pub report_version: u32,
    pub tool: ToolInfo,
    pub generated_at: String,
    pub input: InputInfo,
    pub statistic: Statistic,
    pub sessions: Vec<SessionSummary>,
    pub rrc: RrcReport,
    pub energy: EnergyModel,
    pub bursts: BurstReport,
}

/// Build the report for one analysis run.
///
/// `capture_end_wall_clock` stamps `generated_at` from the capture's own
/// clock so report output stays deterministic across runs.
pub fn build_report(
    result: &AnalysisResult,
    input_path: &str,
    input_bytes: u64,
    capture_end_wall_clock: Option<f64>,
) -> AnalysisReport {
    let generated_at = capture_end_wall_clock
        .and_then(|ts| {
            OffsetDateTime::from_unix_timestamp_nanos((ts * 1e9) as i128)
                .ok()
                .and_then(|dt| dt.format(&Rfc3339).ok())
        })
        .unwrap_or_else(|| DEFAULT_GENERATED_AT.to_string());

    let sessions = result
        .sessions
        .iter()
        .map(|session| SessionSummary {
            remote_ip: session.key.remote_ip.to_string(),
            remote_port: session.key.remote_port,
            local_port: session.key.local_port,
            domain_name: session.domain_name.clone(),
            remote_host_name: session.remote_host_name.clone(),
            udp: session.udp_only,
            ssl: session.ssl,
            packets: session.packet_indices.len(),
            bytes_transferred: session.bytes_transferred,
            file_download_count: session.file_download_count,
            request_count: session.messages.iter().filter(|m| m.is_request()).count(),
            response_count: session.messages.iter().filter(|m| !m.is_request()).count(),
            termination_delay: session.termination.map(|t| t.delay),
        })
        .collect();

    let bursts = BurstReport {
        long_burst_count: result.bursts.long_burst_count,
        total_energy: result.bursts.total_energy,
        shortest_period_interval: result.bursts.shortest_period_interval,
        categories: result.bursts.burst_analysis_info.clone(),
        bursts: result
            .bursts
            .bursts
            .iter()
            .map(|burst| BurstSummary {
                begin_time: burst.begin_time,
                end_time: burst.end_time,
                category: burst.category,
                packets: burst.packet_indices.len(),
                payload_bytes: burst
                    .packet_indices
                    .iter()
                    .map(|&index| result.packets[index].payload_len() as u64)
                    .sum(),
                energy: burst.energy,
                active_time: burst.active_time,
                long_inter_burst: burst.long_inter_burst,
            })
            .collect(),
    };

    AnalysisReport {
        report_version: REPORT_VERSION,
        tool: ToolInfo {
            name: "radiotrace".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        },
        generated_at,
        input: InputInfo { path: input_path.to_string(), bytes: input_bytes },
        statistic: result.statistic.clone(),
        sessions,
        rrc: RrcReport {
            technology: result.profile.technology().to_string(),
            total_rrc_energy: result.rrc.total_rrc_energy,
            joules_per_kilobyte: result.rrc.joules_per_kilobyte,
            breakdown: result.rrc.breakdown.clone(),
            ranges: result.rrc.ranges.clone(),
        },
        energy: result.energy.clone(),
        bursts,
    }
}
