//! Fehlertypen fuer die Audio-Pipeline
//!
//! Konfigurationsfehler (`UngueltigeKanalanzahl`, `Konfiguration`,
//! `RessourcenFehler`) schlagen beim Konstruieren fehl. Alle anderen
//! Varianten betreffen nur den aktuellen Frame bzw. die aktuelle Quelle.

use thiserror::Error;

/// Alle moeglichen Fehler der Audio-Pipeline
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("Ungueltige Kanalanzahl: {eingang} -> {ausgang} (nur 1 <-> 2 unterstuetzt)")]
    UngueltigeKanalanzahl { eingang: u16, ausgang: u16 },

    #[error("Konfigurationsfehler: {0}")]
    Konfiguration(String),

    #[error("Ressource konnte nicht erstellt werden: {0}")]
    RessourcenFehler(String),

    #[error("Ungueltiger Frame: {0}")]
    UngueltigerFrame(String),

    #[error("Codec-Fehler: {0}")]
    CodecFehler(String),

    #[error("Resampler-Fehler: {0}")]
    ResamplerFehler(String),

    #[error("Provider wurde geschlossen")]
    ProviderGeschlossen,

    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),
}

impl AudioError {
    /// Gibt true zurueck wenn der Fehler nur den aktuellen Frame betrifft
    /// und die Verarbeitung im naechsten Tick weiterlaufen kann
    pub fn ist_voruebergehend(&self) -> bool {
        matches!(
            self,
            Self::UngueltigerFrame(_) | Self::CodecFehler(_) | Self::ResamplerFehler(_) | Self::Io(_)
        )
    }
}

pub type AudioResult<T> = Result<T, AudioError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kanalanzahl_fehler_anzeige() {
        let e = AudioError::UngueltigeKanalanzahl {
            eingang: 3,
            ausgang: 1,
        };
        assert_eq!(
            e.to_string(),
            "Ungueltige Kanalanzahl: 3 -> 1 (nur 1 <-> 2 unterstuetzt)"
        );
    }

    #[test]
    fn voruebergehend_erkennung() {
        assert!(AudioError::CodecFehler("x".into()).ist_voruebergehend());
        assert!(!AudioError::ProviderGeschlossen.ist_voruebergehend());
        assert!(!AudioError::Konfiguration("x".into()).ist_voruebergehend());
    }
}
