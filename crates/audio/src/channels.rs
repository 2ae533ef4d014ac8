//! Kanal-Konvertierung Mono <-> Stereo
//!
//! Stereo -> Mono mittelt L und R in einem `i32`-Zwischenwert (Rundung weg
//! von Null) und begrenzt auf 16 Bit. Mono -> Stereo dupliziert jedes
//! Sample. Andere Kombinationen sind ein Konfigurationsfehler.

use klangkette_core::frame::clamp_sample;
use klangkette_core::{CombinedPcmFrame, PcmPacket, Provided, SourceId};
use tracing::debug;

use crate::error::{AudioError, AudioResult};
use crate::provider::PcmFrameProvider;
use crate::receiver::{CombinedFrameReceiver, PcmFrameReceiver};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Richtung {
    StereoZuMono,
    MonoZuStereo,
}

/// Wandelt interleaved PCM zwischen Mono und Stereo um
#[derive(Debug, Clone, Copy)]
pub struct ChannelConverter {
    input_channels: u16,
    output_channels: u16,
    richtung: Richtung,
}

impl ChannelConverter {
    /// Erstellt einen Konverter. Nur 2 -> 1 und 1 -> 2 sind gueltig.
    pub fn new(input_channels: u16, output_channels: u16) -> AudioResult<Self> {
        let richtung = match (input_channels, output_channels) {
            (2, 1) => Richtung::StereoZuMono,
            (1, 2) => Richtung::MonoZuStereo,
            (eingang, ausgang) => {
                return Err(AudioError::UngueltigeKanalanzahl { eingang, ausgang })
            }
        };
        Ok(Self {
            input_channels,
            output_channels,
            richtung,
        })
    }

    pub fn input_channels(&self) -> u16 {
        self.input_channels
    }

    pub fn output_channels(&self) -> u16 {
        self.output_channels
    }

    /// Konvertiert einen Frame in einen neuen Puffer
    pub fn convert(&self, input: &[i16]) -> AudioResult<Vec<i16>> {
        match self.richtung {
            Richtung::StereoZuMono => {
                if input.len() % 2 != 0 {
                    return Err(AudioError::UngueltigerFrame(format!(
                        "Stereo-Frame mit ungerader Sample-Anzahl {}",
                        input.len()
                    )));
                }
                Ok(input
                    .chunks_exact(2)
                    .map(|paar| mittelwert(paar[0], paar[1]))
                    .collect())
            }
            Richtung::MonoZuStereo => {
                let mut output = Vec::with_capacity(input.len() * 2);
                for &s in input {
                    output.push(s);
                    output.push(s);
                }
                Ok(output)
            }
        }
    }
}

/// Mittelwert zweier Samples, gerundet weg von Null
fn mittelwert(l: i16, r: i16) -> i16 {
    let summe = l as i32 + r as i32;
    let mittel = if summe >= 0 {
        (summe + 1) / 2
    } else {
        (summe - 1) / 2
    };
    clamp_sample(mittel)
}

// ---------------------------------------------------------------------------
// Dekoratoren
// ---------------------------------------------------------------------------

/// Provider-Dekorator, der jeden Frame konvertiert
pub struct ChannelConverterProvider<P> {
    inner: P,
    converter: ChannelConverter,
}

impl<P: PcmFrameProvider> ChannelConverterProvider<P> {
    pub fn new(inner: P, input_channels: u16, output_channels: u16) -> AudioResult<Self> {
        let converter = ChannelConverter::new(input_channels, output_channels)?;
        debug!(input_channels, output_channels, "ChannelConverterProvider erstellt");
        Ok(Self { inner, converter })
    }
}

impl<P: PcmFrameProvider> PcmFrameProvider for ChannelConverterProvider<P> {
    fn provide_pcm_frame(&mut self) -> AudioResult<Provided<Vec<i16>>> {
        match self.inner.provide_pcm_frame()? {
            Provided::Frame(frame) => Ok(Provided::Frame(self.converter.convert(&frame)?)),
            Provided::Empty => Ok(Provided::Empty),
            Provided::EndOfStream => Ok(Provided::EndOfStream),
        }
    }

    fn close(&mut self) {
        self.inner.close();
    }
}

/// Receiver-Dekorator, der jedes Paket vor der Weitergabe konvertiert
pub struct ChannelConverterReceiver<R> {
    inner: R,
    converter: ChannelConverter,
}

impl<R: PcmFrameReceiver> ChannelConverterReceiver<R> {
    pub fn new(inner: R, input_channels: u16, output_channels: u16) -> AudioResult<Self> {
        let converter = ChannelConverter::new(input_channels, output_channels)?;
        Ok(Self { inner, converter })
    }
}

impl<R: PcmFrameReceiver> PcmFrameReceiver for ChannelConverterReceiver<R> {
    fn receive_pcm_frame(&self, source: SourceId, packet: &PcmPacket) -> AudioResult<()> {
        let converted = PcmPacket {
            ssrc: packet.ssrc,
            sequence: packet.sequence,
            timestamp: packet.timestamp,
            pcm: self.converter.convert(&packet.pcm)?,
        };
        self.inner.receive_pcm_frame(source, &converted)
    }

    fn cleanup_source(&self, source: SourceId) {
        self.inner.cleanup_source(source);
    }

    fn close(&self) {
        self.inner.close();
    }
}

/// Dekorator fuer den Mixer-Ausgang
pub struct ChannelConverterCombinedReceiver<R> {
    inner: R,
    converter: ChannelConverter,
}

impl<R: CombinedFrameReceiver> ChannelConverterCombinedReceiver<R> {
    pub fn new(inner: R, input_channels: u16, output_channels: u16) -> AudioResult<Self> {
        let converter = ChannelConverter::new(input_channels, output_channels)?;
        Ok(Self { inner, converter })
    }
}

impl<R: CombinedFrameReceiver> CombinedFrameReceiver for ChannelConverterCombinedReceiver<R> {
    fn receive_combined_pcm_frame(
        &mut self,
        sources: &[SourceId],
        mut frame: CombinedPcmFrame,
    ) -> AudioResult<()> {
        frame.pcm = self.converter.convert(&frame.pcm)?;
        self.inner.receive_combined_pcm_frame(sources, frame)
    }

    fn close(&mut self) {
        self.inner.close();
    }
}
