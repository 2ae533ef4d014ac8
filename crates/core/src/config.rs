//! Pipeline-Konfiguration
//!
//! Wird aus einer TOML-Datei geladen. Alle Felder haben sinnvolle
//! Standardwerte, sodass die Pipeline ohne Konfigurationsdatei lauffaehig ist.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::frame::{DEFAULT_CHANNELS, DEFAULT_SAMPLE_RATE, FRAME_MS};

/// Von Opus unterstuetzte Abtastraten
pub const OPUS_SAMPLE_RATES: [u32; 5] = [8_000, 12_000, 16_000, 24_000, 48_000];

/// Vollstaendige Konfiguration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KlangketteConfig {
    /// Codec-Einstellungen (Abtastrate, Kanaele, Bitrate)
    pub audio: AudioEinstellungen,
    /// Mixer / Jitter-Buffer
    pub mixer: MixerEinstellungen,
    /// Prefetch-Puffer
    pub puffer: PufferEinstellungen,
    /// Logging
    pub logging: LoggingEinstellungen,
}

/// Opus-Anwendungsprofil
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpusAnwendung {
    Voip,
    #[default]
    Audio,
    LowDelay,
}

/// Codec-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioEinstellungen {
    /// Abtastrate in Hz (8000, 12000, 16000, 24000, 48000)
    pub sample_rate: u32,
    /// Kanalanzahl (1 = Mono, 2 = Stereo)
    pub channels: u16,
    /// Encoder-Bitrate in Bit/s
    pub bitrate: i32,
    /// Opus-Anwendungsprofil
    pub anwendung: OpusAnwendung,
}

impl Default for AudioEinstellungen {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            channels: DEFAULT_CHANNELS,
            bitrate: 64_000,
            anwendung: OpusAnwendung::Audio,
        }
    }
}

/// Mixer- und Jitter-Buffer-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MixerEinstellungen {
    /// Tick-Dauer in Millisekunden
    pub frame_ms: u64,
    /// Pakete die aelter sind werden beim Mischen verworfen
    pub veraltet_ms: u64,
    /// Maximale Warteschlangenlaenge pro Quelle (aelteste fliegen raus)
    pub max_pakete_pro_quelle: usize,
    /// Kanalanzahl der eingehenden PCM-Pakete
    pub channels: u16,
}

impl MixerEinstellungen {
    pub fn frame_dauer(&self) -> Duration {
        Duration::from_millis(self.frame_ms)
    }

    pub fn veraltet_nach(&self) -> Duration {
        Duration::from_millis(self.veraltet_ms)
    }
}

impl Default for MixerEinstellungen {
    fn default() -> Self {
        Self {
            frame_ms: FRAME_MS,
            veraltet_ms: 100,
            max_pakete_pro_quelle: 10,
            channels: DEFAULT_CHANNELS,
        }
    }
}

/// Einstellungen des Prefetch-Puffers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PufferEinstellungen {
    /// Kapazitaet der Warteschlange in Frames
    pub kapazitaet: usize,
    /// Wartezeit des Hintergrund-Threads bei voller Warteschlange
    pub leerlauf_ms: u64,
}

impl PufferEinstellungen {
    pub fn leerlauf(&self) -> Duration {
        Duration::from_millis(self.leerlauf_ms)
    }
}

impl Default for PufferEinstellungen {
    fn default() -> Self {
        Self {
            kapazitaet: 10,
            leerlauf_ms: 5,
        }
    }
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Format: "json" oder "text"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl KlangketteConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei.
    /// Gibt die Standardkonfiguration zurueck wenn die Datei nicht existiert.
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        match std::fs::read_to_string(pfad) {
            Ok(inhalt) => {
                let config: Self = toml::from_str(&inhalt)
                    .map_err(|e| anyhow::anyhow!("Konfigurationsfehler in '{pfad}': {e}"))?;
                config
                    .validieren()
                    .map_err(|e| anyhow::anyhow!("Ungueltige Konfiguration in '{pfad}': {e}"))?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    pfad = pfad,
                    "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
                );
                Ok(Self::default())
            }
            Err(e) => Err(anyhow::anyhow!(
                "Konfigurationsdatei '{pfad}' nicht lesbar: {e}"
            )),
        }
    }

    /// Prueft Wertebereiche, die serde allein nicht abdeckt
    pub fn validieren(&self) -> Result<(), String> {
        if !OPUS_SAMPLE_RATES.contains(&self.audio.sample_rate) {
            return Err(format!(
                "Abtastrate {} wird von Opus nicht unterstuetzt",
                self.audio.sample_rate
            ));
        }
        for (bereich, kanaele) in [("audio", self.audio.channels), ("mixer", self.mixer.channels)] {
            if !(1..=2).contains(&kanaele) {
                return Err(format!("{bereich}.channels muss 1 oder 2 sein, war {kanaele}"));
            }
        }
        if !(6_000..=510_000).contains(&self.audio.bitrate) {
            return Err(format!("Bitrate {} ausserhalb 6000..510000", self.audio.bitrate));
        }
        if self.mixer.frame_ms == 0 {
            return Err("mixer.frame_ms darf nicht 0 sein".into());
        }
        if self.mixer.max_pakete_pro_quelle == 0 {
            return Err("mixer.max_pakete_pro_quelle darf nicht 0 sein".into());
        }
        if self.puffer.kapazitaet == 0 {
            return Err("puffer.kapazitaet darf nicht 0 sein".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_config_ist_valide() {
        let cfg = KlangketteConfig::default();
        assert!(cfg.validieren().is_ok());
        assert_eq!(cfg.audio.sample_rate, 48_000);
        assert_eq!(cfg.mixer.frame_dauer(), Duration::from_millis(20));
        assert_eq!(cfg.mixer.veraltet_nach(), Duration::from_millis(100));
        assert_eq!(cfg.puffer.kapazitaet, 10);
    }

    #[test]
    fn config_aus_toml_string() {
        let toml = r#"
            [audio]
            sample_rate = 16000
            channels = 1
            anwendung = "voip"

            [mixer]
            veraltet_ms = 60
        "#;
        let cfg: KlangketteConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.audio.sample_rate, 16_000);
        assert_eq!(cfg.audio.channels, 1);
        assert_eq!(cfg.audio.anwendung, OpusAnwendung::Voip);
        assert_eq!(cfg.mixer.veraltet_ms, 60);
        // Nicht angegebene Felder behalten ihren Standardwert
        assert_eq!(cfg.mixer.frame_ms, 20);
        assert_eq!(cfg.audio.bitrate, 64_000);
    }

    #[test]
    fn ungueltige_kanalanzahl_wird_erkannt() {
        let mut cfg = KlangketteConfig::default();
        cfg.mixer.channels = 3;
        let fehler = cfg.validieren().unwrap_err();
        assert!(fehler.contains("mixer.channels"));
    }

    #[test]
    fn ungueltige_abtastrate_wird_erkannt() {
        let mut cfg = KlangketteConfig::default();
        cfg.audio.sample_rate = 44_100;
        assert!(cfg.validieren().is_err());
    }

    #[test]
    fn fehlende_datei_liefert_standardwerte() {
        let cfg = KlangketteConfig::laden("/nicht/vorhanden/klangkette.toml").unwrap();
        assert_eq!(cfg.puffer.kapazitaet, 10);
    }

    #[test]
    fn ungueltige_datei_liefert_fehler() {
        let pfad = std::env::temp_dir().join("klangkette-config-test-ungueltig.toml");
        std::fs::write(&pfad, "[mixer]\nframe_ms = 0\n").unwrap();
        let ergebnis = KlangketteConfig::laden(pfad.to_str().unwrap());
        let _ = std::fs::remove_file(&pfad);
        assert!(ergebnis.is_err());
    }
}
