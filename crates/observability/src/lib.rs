//! klangkette-observability – Logging fuer Klangkette
//!
//! Stellt bereit:
//! - Structured Logging (JSON oder Text) via tracing-subscriber
//! - Umgebungs-Overrides fuer Level und Format

pub mod logging;

pub use logging::{logging_initialisieren, LoggingFehler};
