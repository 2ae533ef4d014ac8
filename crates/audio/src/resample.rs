//! Adapter fuer einen externen Sample-Rate-Konverter
//!
//! Der eigentliche Algorithmus liegt ausserhalb der Pipeline. Die Adapter
//! reichen jeden Frame mit (Eingangsrate, Ausgangsrate) weiter und geben
//! den Resampler beim Schliessen explizit frei.

use klangkette_core::frame::samples_per_frame;
use klangkette_core::{PcmPacket, Provided, SourceId};
use parking_lot::Mutex;
use tracing::debug;

use crate::error::{AudioError, AudioResult};
use crate::provider::PcmFrameProvider;
use crate::receiver::PcmFrameReceiver;

/// Vertrag fuer einen externen Resampler
pub trait Resampler: Send {
    /// Konvertiert `input` nach `output`.
    ///
    /// Gibt (verbrauchte Eingangs-Samples, erzeugte Ausgangs-Samples) zurueck.
    fn process(
        &mut self,
        input: &[i16],
        output: &mut [i16],
        input_rate: u32,
        output_rate: u32,
        end_of_input: bool,
    ) -> AudioResult<(usize, usize)>;

    /// Gibt die Ressourcen des Resamplers frei
    fn destroy(&mut self);
}

/// Raten und Kanaele eines Resampler-Adapters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResampleFormat {
    pub input_rate: u32,
    pub output_rate: u32,
    pub channels: u16,
}

impl ResampleFormat {
    fn validieren(&self) -> AudioResult<()> {
        if self.input_rate == 0 || self.output_rate == 0 {
            return Err(AudioError::Konfiguration("Abtastrate 0 ist ungueltig".into()));
        }
        if !(1..=2).contains(&self.channels) {
            return Err(AudioError::Konfiguration(format!(
                "Resampler unterstuetzt 1 oder 2 Kanaele, nicht {}",
                self.channels
            )));
        }
        Ok(())
    }

    /// Groesse des Ausgabepuffers fuer einen Frame
    fn output_len(&self) -> usize {
        samples_per_frame(self.output_rate, self.channels)
    }
}

/// Zustand, den Provider und Receiver gemeinsam haben
struct ResamplerState<S> {
    resampler: S,
    format: ResampleFormat,
    destroyed: bool,
}

impl<S: Resampler> ResamplerState<S> {
    fn resample(&mut self, input: &[i16]) -> AudioResult<Vec<i16>> {
        if self.destroyed {
            return Err(AudioError::ProviderGeschlossen);
        }
        let mut output = vec![0i16; self.format.output_len()];
        let (_verbraucht, erzeugt) = self.resampler.process(
            input,
            &mut output,
            self.format.input_rate,
            self.format.output_rate,
            false,
        )?;
        output.truncate(erzeugt);
        Ok(output)
    }

    fn destroy(&mut self) {
        if !self.destroyed {
            self.destroyed = true;
            self.resampler.destroy();
        }
    }
}

/// Provider-Dekorator, der jeden Frame auf die Ausgangsrate bringt
pub struct ResamplerProvider<P, S> {
    inner: P,
    state: ResamplerState<S>,
}

impl<P: PcmFrameProvider, S: Resampler> ResamplerProvider<P, S> {
    pub fn new(inner: P, resampler: S, format: ResampleFormat) -> AudioResult<Self> {
        format.validieren()?;
        debug!(
            input_rate = format.input_rate,
            output_rate = format.output_rate,
            channels = format.channels,
            "ResamplerProvider erstellt"
        );
        Ok(Self {
            inner,
            state: ResamplerState {
                resampler,
                format,
                destroyed: false,
            },
        })
    }
}

impl<P: PcmFrameProvider, S: Resampler> PcmFrameProvider for ResamplerProvider<P, S> {
    fn provide_pcm_frame(&mut self) -> AudioResult<Provided<Vec<i16>>> {
        match self.inner.provide_pcm_frame()? {
            Provided::Frame(frame) => Ok(Provided::Frame(self.state.resample(&frame)?)),
            Provided::Empty => Ok(Provided::Empty),
            Provided::EndOfStream => Ok(Provided::EndOfStream),
        }
    }

    fn close(&mut self) {
        self.state.destroy();
        self.inner.close();
    }
}

/// Receiver-Dekorator, der jedes Paket vor der Weitergabe umrechnet
pub struct ResamplerReceiver<R, S> {
    inner: R,
    state: Mutex<ResamplerState<S>>,
}

impl<R: PcmFrameReceiver, S: Resampler> ResamplerReceiver<R, S> {
    pub fn new(inner: R, resampler: S, format: ResampleFormat) -> AudioResult<Self> {
        format.validieren()?;
        Ok(Self {
            inner,
            state: Mutex::new(ResamplerState {
                resampler,
                format,
                destroyed: false,
            }),
        })
    }
}

impl<R: PcmFrameReceiver, S: Resampler> PcmFrameReceiver for ResamplerReceiver<R, S> {
    fn receive_pcm_frame(&self, source: SourceId, packet: &PcmPacket) -> AudioResult<()> {
        // Lock nur fuer das Resampling, nicht waehrend der Weitergabe
        let pcm = self.state.lock().resample(&packet.pcm)?;
        let resampled = PcmPacket {
            ssrc: packet.ssrc,
            sequence: packet.sequence,
            timestamp: packet.timestamp,
            pcm,
        };
        self.inner.receive_pcm_frame(source, &resampled)
    }

    fn cleanup_source(&self, source: SourceId) {
        self.inner.cleanup_source(source);
    }

    fn close(&self) {
        self.state.lock().destroy();
        self.inner.close();
    }
}
