//! Input data model: decoded packet records, device telemetry samples, and
//! the pre-analysis packet filter.
//!
//! Everything in this module is plain data handed to the analysis pipeline
//! by an external reader (the `source` module or another collaborator). The
//! analysis never mutates a `PacketRecord`; tags assigned during analysis
//! live in [`packet::TagTable`] side tables instead.

pub mod filter;
pub mod packet;
pub mod telemetry;

pub use filter::{AnalysisFilter, TimeRange};
pub use packet::{
    Direction, DnsInfo, PacketRecord, TagTable, TcpHeader, TcpRole, Transport, UdpHeader,
};
pub use telemetry::{
    BluetoothSample, BluetoothState, CameraSample, CpuSample, GpsSample, GpsState, ScreenSample,
    Telemetry, UserEvent, UserEventType,
};
