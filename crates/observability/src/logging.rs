//! Structured Logging Setup via tracing-subscriber
//!
//! Ausgangspunkt ist der Abschnitt `[logging]` der Konfiguration.
//! Umgebungsvariablen haben Vorrang:
//! - `KK_LOG_LEVEL`: Filter-Direktive (z.B. `debug` oder `klangkette_audio=trace`)
//! - `KK_LOG_FORMAT`: `text` oder `json`

use klangkette_core::config::LoggingEinstellungen;
use thiserror::Error;
use tracing_subscriber::{fmt, EnvFilter};

pub const ENV_LOG_LEVEL: &str = "KK_LOG_LEVEL";
pub const ENV_LOG_FORMAT: &str = "KK_LOG_FORMAT";

#[derive(Debug, Error)]
pub enum LoggingFehler {
    #[error("Ungueltiger Log-Filter '{0}'")]
    UngueltigerFilter(String),

    #[error("Ungueltiges Log-Format '{0}' (erlaubt: text, json)")]
    UngueltigesFormat(String),

    #[error("Logging bereits initialisiert: {0}")]
    BereitsInitialisiert(String),
}

/// Initialisiert das globale Logging.
///
/// Ein zweiter Aufruf im selben Prozess liefert
/// [`LoggingFehler::BereitsInitialisiert`] statt zu paniken.
pub fn logging_initialisieren(config: &LoggingEinstellungen) -> Result<(), LoggingFehler> {
    let wirksam = wirksame_einstellungen(config, |name| std::env::var(name).ok());

    let filter = EnvFilter::try_new(&wirksam.level)
        .map_err(|_| LoggingFehler::UngueltigerFilter(wirksam.level.clone()))?;

    let ergebnis = match wirksam.format.as_str() {
        "json" => fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_names(true)
            .with_current_span(true)
            .try_init(),
        "text" => fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_names(true)
            .try_init(),
        anderes => return Err(LoggingFehler::UngueltigesFormat(anderes.to_string())),
    };

    ergebnis.map_err(|e| LoggingFehler::BereitsInitialisiert(e.to_string()))?;
    tracing::debug!(level = %wirksam.level, format = %wirksam.format, "Logging initialisiert");
    Ok(())
}

/// Wendet Umgebungs-Overrides auf die Konfiguration an
///
/// `lookup` liefert den Wert einer Umgebungsvariable; leere Werte zaehlen
/// als nicht gesetzt.
pub fn wirksame_einstellungen(
    config: &LoggingEinstellungen,
    lookup: impl Fn(&str) -> Option<String>,
) -> LoggingEinstellungen {
    let gesetzt = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
    LoggingEinstellungen {
        level: gesetzt(ENV_LOG_LEVEL).unwrap_or_else(|| config.level.clone()),
        format: gesetzt(ENV_LOG_FORMAT).unwrap_or_else(|| config.format.clone()),
    }
}

/// Validiert ob ein Log-Level-String gueltig ist.
pub fn log_level_gueltig(level: &str) -> bool {
    matches!(level, "trace" | "debug" | "info" | "warn" | "error")
}

/// Validiert ob ein Log-Format-String gueltig ist.
pub fn log_format_gueltig(format: &str) -> bool {
    matches!(format, "text" | "json")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn umgebung(paare: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = paare
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn log_level_gueltige_und_ungueltige_werte() {
        for level in ["trace", "debug", "info", "warn", "error"] {
            assert!(log_level_gueltig(level));
        }
        assert!(!log_level_gueltig("verbose"));
        assert!(!log_level_gueltig("INFO")); // Gross-/Kleinschreibung
        assert!(!log_level_gueltig(""));
    }

    #[test]
    fn log_format_werte() {
        assert!(log_format_gueltig("text"));
        assert!(log_format_gueltig("json"));
        assert!(!log_format_gueltig("xml"));
        assert!(!log_format_gueltig("JSON"));
    }

    #[test]
    fn ohne_umgebung_gilt_konfiguration() {
        let config = LoggingEinstellungen {
            level: "warn".into(),
            format: "json".into(),
        };
        let wirksam = wirksame_einstellungen(&config, umgebung(&[]));
        assert_eq!(wirksam.level, "warn");
        assert_eq!(wirksam.format, "json");
    }

    #[test]
    fn umgebung_hat_vorrang() {
        let config = LoggingEinstellungen::default();
        let wirksam = wirksame_einstellungen(
            &config,
            umgebung(&[(ENV_LOG_LEVEL, "klangkette_audio=trace"), (ENV_LOG_FORMAT, "json")]),
        );
        assert_eq!(wirksam.level, "klangkette_audio=trace");
        assert_eq!(wirksam.format, "json");
    }

    #[test]
    fn leere_umgebungswerte_werden_ignoriert() {
        let config = LoggingEinstellungen::default();
        let wirksam = wirksame_einstellungen(&config, umgebung(&[(ENV_LOG_LEVEL, "  ")]));
        assert_eq!(wirksam.level, "info");
    }

    #[test]
    fn zweite_initialisierung_ist_fehler() {
        // Einziger Test in diesem Prozess, der den globalen Subscriber setzt
        let config = LoggingEinstellungen {
            level: "debug".into(),
            format: "text".into(),
        };
        let erste = logging_initialisieren(&config);
        let zweite = logging_initialisieren(&config);
        assert!(zweite.is_err(), "Zweiter Aufruf darf nicht paniken");
        if erste.is_ok() {
            assert!(matches!(zweite, Err(LoggingFehler::BereitsInitialisiert(_))));
        }
    }
}
