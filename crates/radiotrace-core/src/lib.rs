//! radiotrace core library for post-mortem mobile-trace analysis.
//!
//! This crate implements the offline analysis pipeline used by the CLI:
//! packet sources feed decoded packet records into the analysis layer,
//! which reassembles TCP/UDP sessions (with HTTP extraction), simulates
//! the radio RRC state machine for the selected technology profile,
//! integrates energy over the resulting state ranges, and classifies
//! traffic bursts by cause. All processing is single-threaded and
//! batch-oriented; I/O is isolated in the `source` module.
//!
//! Invariants:
//! - RRC state ranges are sorted, disjoint, and tile `[0, trace_duration)`.
//! - Bursts partition the filtered packet list in time order.
//! - Packet records are immutable after decoding; analysis-assigned tags
//!   live in side tables keyed by packet id.
//!
//! # Examples
//! ```no_run
//! use std::path::Path;
//!
//! use radiotrace_core::trace::{AnalysisFilter, Telemetry};
//! use radiotrace_core::analyze_capture_file;
//!
//! let result = analyze_capture_file(
//!     Path::new("capture.pcap"),
//!     None,
//!     &AnalysisFilter::default(),
//!     &Telemetry::default(),
//! )?;
//! println!("sessions: {}", result.sessions.len());
//! println!("radio energy: {:.2} J", result.rrc.total_rrc_energy);
//! # Ok::<(), radiotrace_core::AnalysisError>(())
//! ```

pub mod analysis;
pub mod burst;
pub mod energy;
pub mod http;
pub mod profile;
pub mod rrc;
pub mod session;
pub mod source;
pub mod stats;
pub mod trace;

pub use analysis::{AnalysisError, AnalysisResult, analyze, analyze_capture_file};
pub use burst::{Burst, BurstAnalysisInfo, BurstCategory, BurstCollectionAnalysisData};
pub use energy::EnergyModel;
pub use profile::{Profile, Profile3G, ProfileCommon, ProfileLte, ProfileWifi};
pub use rrc::{RrcState, RrcStateMachine, RrcStateRange};
pub use session::{Session, SessionKey};
pub use source::{Capture, PacketEvent, PacketSource, PcapFileSource, SourceError};
pub use stats::Statistic;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_types_serialize_stably() {
        let range = RrcStateRange::new(0.0, 1.5, RrcState::LteCrTail);
        let value = serde_json::to_value(range).expect("range json");
        assert_eq!(value["begin_time"], 0.0);
        assert_eq!(value["state"], "LteCrTail");

        let statistic = Statistic::default();
        let value = serde_json::to_value(&statistic).expect("statistic json");
        assert_eq!(value["total_packets"], 0);
        // The internal histogram stays out of the serialized surface.
        assert!(value.get("packet_size_counts").is_none());

        let breakdown = rrc::RrcBreakdown::Wifi(rrc::WifiBreakdown::default());
        let value = serde_json::to_value(&breakdown).expect("breakdown json");
        assert_eq!(value["technology"], "wifi");
    }
}
