//! Frame- und Paket-Definitionen
//!
//! Ein Frame deckt genau einen Tick (20 ms) unkomprimierter 16-Bit-Samples
//! ab. Mehrkanal-Frames sind interleaved (L, R, L, R, ...).

/// Dauer eines Frames / Ticks in Millisekunden
pub const FRAME_MS: u64 = 20;

/// Standard-Abtastrate (Opus-Vollband)
pub const DEFAULT_SAMPLE_RATE: u32 = 48_000;

/// Standard-Kanalanzahl
pub const DEFAULT_CHANNELS: u16 = 2;

/// Anzahl Samples (ueber alle Kanaele) in einem 20-ms-Frame
///
/// 48 kHz Stereo -> 1920, 48 kHz Mono -> 960, 16 kHz Mono -> 320.
pub fn samples_per_frame(sample_rate: u32, channels: u16) -> usize {
    (sample_rate as usize / 1000) * FRAME_MS as usize * channels as usize
}

/// Begrenzt einen breiteren Zwischenwert auf den 16-Bit-Sample-Bereich
#[inline]
pub fn clamp_sample(value: i32) -> i16 {
    value.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}

/// Ergebnis eines Pulls an einem Frame-Provider
///
/// `Empty` bedeutet "in diesem Tick kein Frame" (Pause, Unterlauf) und ist
/// kein Fehler. `EndOfStream` treibt den Ended-Zustand des Players.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Provided<T> {
    /// Ein Frame fuer diesen Tick
    Frame(T),
    /// Kein Frame in diesem Tick, der Stream laeuft weiter
    Empty,
    /// Der Stream ist zu Ende
    EndOfStream,
}

impl<T> Provided<T> {
    /// Wendet `f` auf einen enthaltenen Frame an
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Provided<U> {
        match self {
            Provided::Frame(frame) => Provided::Frame(f(frame)),
            Provided::Empty => Provided::Empty,
            Provided::EndOfStream => Provided::EndOfStream,
        }
    }

    /// Gibt den Frame zurueck, falls vorhanden
    pub fn into_frame(self) -> Option<T> {
        match self {
            Provided::Frame(frame) => Some(frame),
            _ => None,
        }
    }

    pub fn is_frame(&self) -> bool {
        matches!(self, Provided::Frame(_))
    }

    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, Provided::EndOfStream)
    }
}

/// 20-ms-PCM-Frame einer einzelnen Quelle mit Transport-Metadaten
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PcmPacket {
    pub ssrc: u32,
    pub sequence: u16,
    pub timestamp: u32,
    pub pcm: Vec<i16>,
}

/// Opus-kodierter Frame einer einzelnen Quelle, wie ihn der Transport liefert
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OpusPacket {
    pub ssrc: u32,
    pub sequence: u16,
    pub timestamp: u32,
    pub opus: Vec<u8>,
}

/// Gemischter Frame eines Ticks
///
/// Die Arrays `sequences`, `timestamps` und `ssrcs` sind parallel zur
/// Liste der beteiligten Quellen.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CombinedPcmFrame {
    pub sequences: Vec<u16>,
    pub timestamps: Vec<u32>,
    pub ssrcs: Vec<u32>,
    pub pcm: Vec<i16>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_groessen() {
        assert_eq!(samples_per_frame(48_000, 2), 1920);
        assert_eq!(samples_per_frame(48_000, 1), 960);
        assert_eq!(samples_per_frame(16_000, 1), 320);
    }

    #[test]
    fn clamp_begrenzt_auf_16_bit() {
        assert_eq!(clamp_sample(40_000), i16::MAX);
        assert_eq!(clamp_sample(-40_000), i16::MIN);
        assert_eq!(clamp_sample(123), 123);
    }

    #[test]
    fn provided_map_und_frame() {
        let p = Provided::Frame(vec![1i16, 2]).map(|f| f.len());
        assert_eq!(p, Provided::Frame(2));
        assert!(p.is_frame());
        assert_eq!(Provided::<u8>::Empty.into_frame(), None);
        assert!(Provided::<u8>::EndOfStream.map(|x| x).is_end_of_stream());
    }
}
