//! klangkette-core – Gemeinsame Typen, Frames und Konfiguration
//!
//! Dieses Crate stellt die Bausteine bereit, die von der Audio-Pipeline
//! und dem Observability-Crate gemeinsam genutzt werden.

pub mod config;
pub mod frame;
pub mod types;

// Re-Exporte fuer bequemen Zugriff
pub use config::KlangketteConfig;
pub use frame::{CombinedPcmFrame, OpusPacket, PcmPacket, Provided};
pub use types::SourceId;
