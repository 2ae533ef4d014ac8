//! Opus-Schicht der Pipeline
//!
//! - [`FrameEncoder`] / [`FrameDecoder`]: Vertraege fuer den externen Codec
//! - [`OpusEncoder`] / [`OpusDecoder`]: audiopus-Implementierung (i16-PCM)
//! - [`PcmOpusProvider`]: PCM-Provider -> Opus-Provider (Senden)
//! - [`PcmOpusReceiver`]: Opus-Receiver -> PCM-Receiver, ein Decoder pro Quelle
//! - [`ErrorHandlingOpusProvider`]: meldet Fehler und das Schliessen an einen Handler

use audiopus::{
    coder::{Decoder, Encoder},
    Application, Bitrate, Channels, SampleRate,
};
use klangkette_core::config::{AudioEinstellungen, OpusAnwendung};
use klangkette_core::frame::samples_per_frame;
use klangkette_core::{OpusPacket, PcmPacket, Provided, SourceId};
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::{debug, trace};

use crate::error::{AudioError, AudioResult};
use crate::provider::{OpusFrameProvider, PcmFrameProvider};
use crate::receiver::{OpusFrameReceiver, PcmFrameReceiver, SourceFilter};

/// Maximale Opus-Paketgroesse in Bytes
const MAX_PAKET_BYTES: usize = 4000;

/// Laengstes Opus-Paket: 120 ms bei 48 kHz pro Kanal
const MAX_SAMPLES_PRO_KANAL: usize = 5760;

// ---------------------------------------------------------------------------
// Vertraege
// ---------------------------------------------------------------------------

/// Kodiert einen PCM-Frame zu einem komprimierten Paket
pub trait FrameEncoder: Send {
    fn encode(&mut self, pcm: &[i16]) -> AudioResult<Vec<u8>>;

    /// Gibt den Encoder frei; spaetere `encode`-Aufrufe schlagen fehl
    fn destroy(&mut self);
}

/// Dekodiert ein komprimiertes Paket zu PCM
pub trait FrameDecoder: Send {
    fn decode(&mut self, data: &[u8]) -> AudioResult<Vec<i16>>;

    fn destroy(&mut self);
}

impl<E: FrameEncoder + ?Sized> FrameEncoder for Box<E> {
    fn encode(&mut self, pcm: &[i16]) -> AudioResult<Vec<u8>> {
        (**self).encode(pcm)
    }

    fn destroy(&mut self) {
        (**self).destroy()
    }
}

impl<D: FrameDecoder + ?Sized> FrameDecoder for Box<D> {
    fn decode(&mut self, data: &[u8]) -> AudioResult<Vec<i16>> {
        (**self).decode(data)
    }

    fn destroy(&mut self) {
        (**self).destroy()
    }
}

/// Erzeugt pro neuer Quelle einen Decoder
pub type DecoderFactory = Box<dyn Fn(SourceId) -> AudioResult<Box<dyn FrameDecoder>> + Send + Sync>;

// ---------------------------------------------------------------------------
// audiopus
// ---------------------------------------------------------------------------

/// Opus-Encoder auf Basis von audiopus
pub struct OpusEncoder {
    encoder: Option<Encoder>,
    frame_size: usize,
}

impl OpusEncoder {
    /// Erstellt einen Encoder mit der gegebenen Konfiguration
    pub fn new(config: &AudioEinstellungen) -> AudioResult<Self> {
        let sample_rate = rate_to_audiopus(config.sample_rate)?;
        let channels = channels_to_audiopus(config.channels)?;
        let application = anwendung_to_audiopus(config.anwendung);

        let mut encoder = Encoder::new(sample_rate, channels, application)
            .map_err(|e| AudioError::RessourcenFehler(e.to_string()))?;

        encoder
            .set_bitrate(Bitrate::BitsPerSecond(config.bitrate))
            .map_err(|e| AudioError::RessourcenFehler(e.to_string()))?;

        let frame_size = samples_per_frame(config.sample_rate, config.channels);

        debug!(
            sample_rate = config.sample_rate,
            channels = config.channels,
            bitrate = config.bitrate,
            frame_size,
            "OpusEncoder erstellt"
        );

        Ok(Self {
            encoder: Some(encoder),
            frame_size,
        })
    }

    /// 48 kHz, Stereo, Audio, 64 kbit/s
    pub fn standard() -> AudioResult<Self> {
        Self::new(&AudioEinstellungen::default())
    }

    /// Erwartete Samples pro Frame (alle Kanaele)
    pub fn frame_size(&self) -> usize {
        self.frame_size
    }
}

impl FrameEncoder for OpusEncoder {
    fn encode(&mut self, pcm: &[i16]) -> AudioResult<Vec<u8>> {
        let encoder = self.encoder.as_mut().ok_or(AudioError::ProviderGeschlossen)?;

        if pcm.len() != self.frame_size {
            return Err(AudioError::UngueltigerFrame(format!(
                "PCM-Frame muss {} Samples lang sein, war {}",
                self.frame_size,
                pcm.len()
            )));
        }

        let mut output = vec![0u8; MAX_PAKET_BYTES];
        let written = encoder
            .encode(pcm, &mut output)
            .map_err(|e| AudioError::CodecFehler(e.to_string()))?;

        output.truncate(written);
        Ok(output)
    }

    fn destroy(&mut self) {
        if self.encoder.take().is_some() {
            debug!("OpusEncoder freigegeben");
        }
    }
}

/// Opus-Decoder auf Basis von audiopus
pub struct OpusDecoder {
    decoder: Option<Decoder>,
    channels: usize,
}

impl OpusDecoder {
    pub fn new(sample_rate: u32, channels: u16) -> AudioResult<Self> {
        let sr = rate_to_audiopus(sample_rate)?;
        let ch = channels_to_audiopus(channels)?;

        let decoder = Decoder::new(sr, ch).map_err(|e| AudioError::RessourcenFehler(e.to_string()))?;

        debug!(sample_rate, channels, "OpusDecoder erstellt");

        Ok(Self {
            decoder: Some(decoder),
            channels: channels as usize,
        })
    }

    /// 48 kHz Stereo
    pub fn standard() -> AudioResult<Self> {
        Self::new(48_000, 2)
    }
}

impl FrameDecoder for OpusDecoder {
    fn decode(&mut self, data: &[u8]) -> AudioResult<Vec<i16>> {
        let decoder = self.decoder.as_mut().ok_or(AudioError::ProviderGeschlossen)?;

        let mut output = vec![0i16; MAX_SAMPLES_PRO_KANAL * self.channels];
        let decoded = decoder
            .decode(Some(data), &mut output, false)
            .map_err(|e| AudioError::CodecFehler(e.to_string()))?;

        output.truncate(decoded * self.channels);
        Ok(output)
    }

    fn destroy(&mut self) {
        self.decoder = None;
    }
}

/// Standard-Factory: ein 48 kHz Stereo-Decoder pro Quelle
pub fn standard_decoder_factory() -> DecoderFactory {
    Box::new(|_source: SourceId| -> AudioResult<Box<dyn FrameDecoder>> {
        Ok(Box::new(OpusDecoder::standard()?))
    })
}

fn rate_to_audiopus(rate: u32) -> AudioResult<SampleRate> {
    match rate {
        8_000 => Ok(SampleRate::Hz8000),
        12_000 => Ok(SampleRate::Hz12000),
        16_000 => Ok(SampleRate::Hz16000),
        24_000 => Ok(SampleRate::Hz24000),
        48_000 => Ok(SampleRate::Hz48000),
        andere => Err(AudioError::Konfiguration(format!(
            "Opus unterstuetzt keine Abtastrate von {andere} Hz"
        ))),
    }
}

fn channels_to_audiopus(channels: u16) -> AudioResult<Channels> {
    match channels {
        1 => Ok(Channels::Mono),
        2 => Ok(Channels::Stereo),
        andere => Err(AudioError::Konfiguration(format!(
            "Opus unterstuetzt {andere} Kanaele nicht"
        ))),
    }
}

fn anwendung_to_audiopus(anwendung: OpusAnwendung) -> Application {
    match anwendung {
        OpusAnwendung::Voip => Application::Voip,
        OpusAnwendung::Audio => Application::Audio,
        OpusAnwendung::LowDelay => Application::LowDelay,
    }
}

// ---------------------------------------------------------------------------
// PcmOpusProvider
// ---------------------------------------------------------------------------

/// Kodiert jeden Frame eines PCM-Providers zu Opus
pub struct PcmOpusProvider<P, E> {
    inner: P,
    encoder: E,
}

impl<P: PcmFrameProvider, E: FrameEncoder> PcmOpusProvider<P, E> {
    pub fn new(inner: P, encoder: E) -> Self {
        Self { inner, encoder }
    }
}

impl<P: PcmFrameProvider> PcmOpusProvider<P, OpusEncoder> {
    /// Mit Standard-Encoder (48 kHz, Stereo, 64 kbit/s)
    pub fn standard(inner: P) -> AudioResult<Self> {
        Ok(Self::new(inner, OpusEncoder::standard()?))
    }
}

impl<P: PcmFrameProvider, E: FrameEncoder> OpusFrameProvider for PcmOpusProvider<P, E> {
    fn provide_opus_frame(&mut self) -> AudioResult<Provided<Vec<u8>>> {
        match self.inner.provide_pcm_frame()? {
            Provided::Frame(pcm) => Ok(Provided::Frame(self.encoder.encode(&pcm)?)),
            Provided::Empty => Ok(Provided::Empty),
            Provided::EndOfStream => Ok(Provided::EndOfStream),
        }
    }

    fn close(&mut self) {
        self.encoder.destroy();
        self.inner.close();
    }
}

// ---------------------------------------------------------------------------
// PcmOpusReceiver
// ---------------------------------------------------------------------------

struct DecoderZustand {
    decoders: HashMap<SourceId, Box<dyn FrameDecoder>>,
    geschlossen: bool,
}

/// Dekodiert eingehende Opus-Pakete pro Quelle und reicht PCM weiter
pub struct PcmOpusReceiver<R> {
    inner: R,
    factory: DecoderFactory,
    filter: Option<SourceFilter>,
    zustand: Mutex<DecoderZustand>,
}

impl<R: PcmFrameReceiver> PcmOpusReceiver<R> {
    pub fn new(inner: R, factory: DecoderFactory, filter: Option<SourceFilter>) -> Self {
        Self {
            inner,
            factory,
            filter,
            zustand: Mutex::new(DecoderZustand {
                decoders: HashMap::new(),
                geschlossen: false,
            }),
        }
    }

    /// Standard-Decoder fuer alle Quellen
    pub fn standard(inner: R) -> Self {
        Self::new(inner, standard_decoder_factory(), None)
    }

    /// Anzahl aktiver Decoder
    pub fn decoder_anzahl(&self) -> usize {
        self.zustand.lock().decoders.len()
    }
}

impl<R: PcmFrameReceiver> OpusFrameReceiver for PcmOpusReceiver<R> {
    fn receive_opus_frame(&self, source: SourceId, packet: &OpusPacket) -> AudioResult<()> {
        if let Some(filter) = &self.filter {
            if !filter(source) {
                trace!(source = %source, "Quelle gefiltert");
                return Ok(());
            }
        }

        // Lock nur fuer das Dekodieren, nicht waehrend der Weitergabe
        let pcm = {
            let mut zustand = self.zustand.lock();
            if zustand.geschlossen {
                return Err(AudioError::ProviderGeschlossen);
            }
            let decoder = match zustand.decoders.entry(source) {
                std::collections::hash_map::Entry::Occupied(e) => e.into_mut(),
                std::collections::hash_map::Entry::Vacant(e) => {
                    let decoder = (self.factory)(source)?;
                    debug!(source = %source, "Decoder fuer neue Quelle erstellt");
                    e.insert(decoder)
                }
            };
            decoder.decode(&packet.opus)?
        };

        self.inner.receive_pcm_frame(
            source,
            &PcmPacket {
                ssrc: packet.ssrc,
                sequence: packet.sequence,
                timestamp: packet.timestamp,
                pcm,
            },
        )
    }

    fn cleanup_source(&self, source: SourceId) {
        if let Some(mut decoder) = self.zustand.lock().decoders.remove(&source) {
            decoder.destroy();
            debug!(source = %source, "Decoder freigegeben");
        }
        self.inner.cleanup_source(source);
    }

    fn close(&self) {
        {
            let mut zustand = self.zustand.lock();
            if zustand.geschlossen {
                return;
            }
            zustand.geschlossen = true;
            for (_, mut decoder) in zustand.decoders.drain() {
                decoder.destroy();
            }
        }
        self.inner.close();
    }
}

// ---------------------------------------------------------------------------
// ErrorHandlingOpusProvider
// ---------------------------------------------------------------------------

/// Wird mit jedem Fehler des inneren Providers aufgerufen
pub type ErrorHandler = Box<dyn FnMut(&AudioError) + Send>;

/// Leitet Fehler des inneren Providers zusaetzlich an einen Handler weiter
///
/// Beim Schliessen erhaelt der Handler einmalig [`AudioError::ProviderGeschlossen`].
pub struct ErrorHandlingOpusProvider<P> {
    inner: P,
    handler: ErrorHandler,
    geschlossen: bool,
}

impl<P: OpusFrameProvider> ErrorHandlingOpusProvider<P> {
    pub fn new(inner: P, handler: impl FnMut(&AudioError) + Send + 'static) -> Self {
        Self {
            inner,
            handler: Box::new(handler),
            geschlossen: false,
        }
    }
}

impl<P: OpusFrameProvider> OpusFrameProvider for ErrorHandlingOpusProvider<P> {
    fn provide_opus_frame(&mut self) -> AudioResult<Provided<Vec<u8>>> {
        self.inner.provide_opus_frame().map_err(|e| {
            (self.handler)(&e);
            e
        })
    }

    fn close(&mut self) {
        if self.geschlossen {
            return;
        }
        self.geschlossen = true;
        self.inner.close();
        (self.handler)(&AudioError::ProviderGeschlossen);
    }
}
