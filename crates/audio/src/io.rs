//! PCM-Ein-/Ausgabe ueber Byte-Streams
//!
//! Rohes PCM ist 16 Bit signed little-endian, Kanaele verschraenkt.
//!
//! - [`PcmReader`]: liest Frames aus einem `Read`
//! - [`PcmWriter`]: schreibt empfangene Pakete in ein `Write`
//! - [`CombinedPcmWriter`]: schreibt gemischte Frames in ein `Write`
//! - [`StreamDecoderProvider`] + [`StreamFeeder`]: zweiseitiger Container-Decoder
//!   (z.B. mp3): Bytes werden hineingeschrieben, PCM-Frames herausgezogen

use bytes::{Buf, BufMut, BytesMut};
use klangkette_core::frame::{samples_per_frame, DEFAULT_CHANNELS, DEFAULT_SAMPLE_RATE};
use klangkette_core::{CombinedPcmFrame, PcmPacket, Provided, SourceId};
use parking_lot::Mutex;
use std::io::{self, Read, Write};
use std::sync::Arc;
use tracing::{debug, trace, warn};

use crate::error::{AudioError, AudioResult};
use crate::provider::PcmFrameProvider;
use crate::receiver::{CombinedFrameReceiver, PcmFrameReceiver, SourceFilter};

fn samples_to_bytes(samples: &[i16]) -> BytesMut {
    let mut buf = BytesMut::with_capacity(samples.len() * 2);
    for &s in samples {
        buf.put_i16_le(s);
    }
    buf
}

// ---------------------------------------------------------------------------
// PcmReader
// ---------------------------------------------------------------------------

/// Liest PCM-Frames fester Groesse aus einem Byte-Stream
///
/// Ein unvollstaendiger letzter Frame wird mit Stille aufgefuellt.
pub struct PcmReader<R> {
    reader: R,
    frame_bytes: usize,
    ende: bool,
}

impl<R: Read + Send> PcmReader<R> {
    /// 48 kHz Stereo
    pub fn new(reader: R) -> Self {
        Self::with_format(reader, DEFAULT_SAMPLE_RATE, DEFAULT_CHANNELS)
    }

    pub fn with_format(reader: R, sample_rate: u32, channels: u16) -> Self {
        Self {
            reader,
            frame_bytes: samples_per_frame(sample_rate, channels) * 2,
            ende: false,
        }
    }

    /// Liest bis der Puffer voll ist oder EOF erreicht wird
    fn fuellen(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut gelesen = 0;
        while gelesen < buf.len() {
            match self.reader.read(&mut buf[gelesen..]) {
                Ok(0) => break,
                Ok(n) => gelesen += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(gelesen)
    }
}

impl<R: Read + Send> PcmFrameProvider for PcmReader<R> {
    fn provide_pcm_frame(&mut self) -> AudioResult<Provided<Vec<i16>>> {
        if self.ende {
            return Ok(Provided::EndOfStream);
        }

        let mut roh = vec![0u8; self.frame_bytes];
        let gelesen = self.fuellen(&mut roh)?;
        if gelesen == 0 {
            self.ende = true;
            return Ok(Provided::EndOfStream);
        }
        if gelesen < self.frame_bytes {
            trace!(gelesen, "Letzter Frame unvollstaendig, mit Stille aufgefuellt");
            self.ende = true;
        }

        let mut bytes = &roh[..];
        let mut frame = Vec::with_capacity(self.frame_bytes / 2);
        while bytes.remaining() >= 2 {
            frame.push(bytes.get_i16_le());
        }
        Ok(Provided::Frame(frame))
    }

    fn close(&mut self) {
        self.ende = true;
    }
}

// ---------------------------------------------------------------------------
// PcmWriter
// ---------------------------------------------------------------------------

/// Schreibt PCM aller (gefilterten) Quellen hintereinander in einen Stream
pub struct PcmWriter<W> {
    writer: Mutex<W>,
    filter: Option<SourceFilter>,
}

impl<W: Write + Send> PcmWriter<W> {
    pub fn new(writer: W, filter: Option<SourceFilter>) -> Self {
        Self {
            writer: Mutex::new(writer),
            filter,
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

impl<W: Write + Send> PcmFrameReceiver for PcmWriter<W> {
    fn receive_pcm_frame(&self, source: SourceId, packet: &PcmPacket) -> AudioResult<()> {
        if let Some(filter) = &self.filter {
            if !filter(source) {
                return Ok(());
            }
        }
        let bytes = samples_to_bytes(&packet.pcm);
        self.writer.lock().write_all(&bytes)?;
        Ok(())
    }

    fn cleanup_source(&self, _source: SourceId) {}

    fn close(&self) {
        if let Err(e) = self.writer.lock().flush() {
            warn!(fehler = %e, "PcmWriter konnte nicht flushen");
        }
    }
}

// ---------------------------------------------------------------------------
// CombinedPcmWriter
// ---------------------------------------------------------------------------

/// Schreibt gemischte Frames in einen Stream
pub struct CombinedPcmWriter<W> {
    writer: W,
}

impl<W: Write + Send> CombinedPcmWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send> CombinedFrameReceiver for CombinedPcmWriter<W> {
    fn receive_combined_pcm_frame(
        &mut self,
        _sources: &[SourceId],
        frame: CombinedPcmFrame,
    ) -> AudioResult<()> {
        self.writer.write_all(&samples_to_bytes(&frame.pcm))?;
        Ok(())
    }

    fn close(&mut self) {
        if let Err(e) = self.writer.flush() {
            warn!(fehler = %e, "CombinedPcmWriter konnte nicht flushen");
        }
    }
}

// ---------------------------------------------------------------------------
// Stream-Decoder (Container-Formate)
// ---------------------------------------------------------------------------

/// Vertrag fuer einen externen Container-Decoder
pub trait StreamDecoder: Send {
    /// Nimmt komprimierte Bytes entgegen, gibt die Anzahl verbrauchter Bytes zurueck
    fn feed(&mut self, data: &[u8]) -> AudioResult<usize>;

    /// Kein weiterer Input mehr
    fn end_of_input(&mut self);

    /// Dekodiert nach `output`.
    ///
    /// `Frame(n)`: n Samples geschrieben, `Empty`: braucht mehr Input,
    /// `EndOfStream`: Input beendet und alles ausgegeben.
    fn read_pcm(&mut self, output: &mut [i16]) -> AudioResult<Provided<usize>>;

    fn close(&mut self);
}

/// Erstellt die zwei Enden eines Stream-Decoders (48 kHz Stereo)
pub fn stream_decoder_provider<D: StreamDecoder + 'static>(
    decoder: D,
) -> (StreamDecoderProvider<D>, StreamFeeder<D>) {
    stream_decoder_provider_with_format(decoder, DEFAULT_SAMPLE_RATE, DEFAULT_CHANNELS)
}

pub fn stream_decoder_provider_with_format<D: StreamDecoder + 'static>(
    decoder: D,
    sample_rate: u32,
    channels: u16,
) -> (StreamDecoderProvider<D>, StreamFeeder<D>) {
    let decoder = Arc::new(Mutex::new(decoder));
    debug!(sample_rate, channels, "Stream-Decoder erstellt");
    (
        StreamDecoderProvider {
            decoder: Arc::clone(&decoder),
            frame_len: samples_per_frame(sample_rate, channels),
            geschlossen: false,
        },
        StreamFeeder { decoder },
    )
}

/// Pull-Ende: liefert dekodierte PCM-Frames
pub struct StreamDecoderProvider<D> {
    decoder: Arc<Mutex<D>>,
    frame_len: usize,
    geschlossen: bool,
}

impl<D: StreamDecoder> PcmFrameProvider for StreamDecoderProvider<D> {
    fn provide_pcm_frame(&mut self) -> AudioResult<Provided<Vec<i16>>> {
        if self.geschlossen {
            return Ok(Provided::EndOfStream);
        }
        let mut frame = vec![0i16; self.frame_len];
        let gelesen = self.decoder.lock().read_pcm(&mut frame)?;
        Ok(gelesen.map(|n| {
            frame.truncate(n);
            frame
        }))
    }

    fn close(&mut self) {
        if !self.geschlossen {
            self.geschlossen = true;
            self.decoder.lock().close();
        }
    }
}

/// Push-Ende: komprimierte Bytes werden per `io::Write` eingespeist
pub struct StreamFeeder<D> {
    decoder: Arc<Mutex<D>>,
}

impl<D: StreamDecoder> StreamFeeder<D> {
    /// Signalisiert das Ende des Inputs
    pub fn finish(&mut self) {
        self.decoder.lock().end_of_input();
    }
}

impl<D: StreamDecoder> Write for StreamFeeder<D> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.decoder.lock().feed(buf).map_err(|e| match e {
            AudioError::Io(io) => io,
            andere => io::Error::new(io::ErrorKind::Other, andere),
        })
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::io::Cursor;

    fn le_bytes(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    #[test]
    fn reader_liest_frames_und_ende() {
        // 1 kHz Mono -> 20 Samples pro Frame
        let samples: Vec<i16> = (0..40i32).map(|i| (i * 1000 - 20_000) as i16).collect();
        let mut reader = PcmReader::with_format(Cursor::new(le_bytes(&samples)), 1000, 1);
        assert_eq!(
            reader.provide_pcm_frame().unwrap(),
            Provided::Frame(samples[..20].to_vec())
        );
        assert_eq!(
            reader.provide_pcm_frame().unwrap(),
            Provided::Frame(samples[20..].to_vec())
        );
        assert_eq!(reader.provide_pcm_frame().unwrap(), Provided::EndOfStream);
    }

    #[test]
    fn reader_fuellt_letzten_frame_auf() {
        let mut reader = PcmReader::with_format(Cursor::new(le_bytes(&[5, 6, 7])), 1000, 1);
        let mut erwartet = vec![0i16; 20];
        erwartet[..3].copy_from_slice(&[5, 6, 7]);
        assert_eq!(reader.provide_pcm_frame().unwrap(), Provided::Frame(erwartet));
        assert_eq!(reader.provide_pcm_frame().unwrap(), Provided::EndOfStream);
    }

    #[test]
    fn reader_standard_framegroesse() {
        let mut reader = PcmReader::new(Cursor::new(vec![0u8; 1920 * 2]));
        let frame = reader.provide_pcm_frame().unwrap().into_frame().unwrap();
        assert_eq!(frame.len(), 1920);
    }

    #[test]
    fn writer_schreibt_little_endian_mit_filter() {
        let filter: SourceFilter = Arc::new(|s: SourceId| s.inner() == 1);
        let writer = PcmWriter::new(Vec::new(), Some(filter));
        let paket = |pcm: Vec<i16>| PcmPacket {
            pcm,
            ..Default::default()
        };

        writer.receive_pcm_frame(SourceId(1), &paket(vec![1, -2])).unwrap();
        writer.receive_pcm_frame(SourceId(2), &paket(vec![9, 9])).unwrap();
        writer.close();

        assert_eq!(writer.into_inner(), vec![1, 0, 0xFE, 0xFF]);
    }

    #[test]
    fn combined_writer_schreibt_frames() {
        let mut writer = CombinedPcmWriter::new(Vec::new());
        let frame = CombinedPcmFrame {
            pcm: vec![256, -1],
            ..Default::default()
        };
        writer.receive_combined_pcm_frame(&[SourceId(1)], frame).unwrap();
        writer.close();
        assert_eq!(writer.into_inner(), vec![0, 1, 0xFF, 0xFF]);
    }

    /// "Dekodiert" Little-Endian-Bytes zu Samples
    #[derive(Default)]
    struct FakeStreamDecoder {
        samples: VecDeque<i16>,
        rest: Option<u8>,
        input_ende: bool,
        closes: usize,
    }

    impl StreamDecoder for FakeStreamDecoder {
        fn feed(&mut self, data: &[u8]) -> AudioResult<usize> {
            for &b in data {
                match self.rest.take() {
                    Some(lo) => self.samples.push_back(i16::from_le_bytes([lo, b])),
                    None => self.rest = Some(b),
                }
            }
            Ok(data.len())
        }

        fn end_of_input(&mut self) {
            self.input_ende = true;
        }

        fn read_pcm(&mut self, output: &mut [i16]) -> AudioResult<Provided<usize>> {
            if self.samples.len() >= output.len() || (self.input_ende && !self.samples.is_empty()) {
                let n = output.len().min(self.samples.len());
                for (out, s) in output.iter_mut().zip(self.samples.drain(..n)) {
                    *out = s;
                }
                return Ok(Provided::Frame(n));
            }
            if self.input_ende {
                return Ok(Provided::EndOfStream);
            }
            Ok(Provided::Empty)
        }

        fn close(&mut self) {
            self.closes += 1;
        }
    }

    #[test]
    fn stream_decoder_zwei_enden() {
        let (mut provider, mut feeder) =
            stream_decoder_provider_with_format(FakeStreamDecoder::default(), 1000, 1);
        let samples: Vec<i16> = (1..=25).collect();

        assert_eq!(provider.provide_pcm_frame().unwrap(), Provided::Empty);

        feeder.write_all(&le_bytes(&samples[..15])).unwrap();
        assert_eq!(provider.provide_pcm_frame().unwrap(), Provided::Empty, "Noch kein ganzer Frame");

        feeder.write_all(&le_bytes(&samples[15..])).unwrap();
        assert_eq!(provider.provide_pcm_frame().unwrap(), Provided::Frame(samples[..20].to_vec()));

        feeder.finish();
        assert_eq!(provider.provide_pcm_frame().unwrap(), Provided::Frame(samples[20..].to_vec()));
        assert_eq!(provider.provide_pcm_frame().unwrap(), Provided::EndOfStream);

        provider.close();
        provider.close();
        assert_eq!(provider.decoder.lock().closes, 1);
    }

    #[test]
    fn stream_decoder_standardformat_liefert_stereo_frames() {
        let (mut provider, mut feeder) = stream_decoder_provider(FakeStreamDecoder::default());
        assert_eq!(provider.frame_len, 1920);

        let samples: Vec<i16> = (0..1920i32).map(|i| (i % 100) as i16).collect();
        feeder.write_all(&le_bytes(&samples)).unwrap();
        assert_eq!(provider.provide_pcm_frame().unwrap(), Provided::Frame(samples));

        feeder.finish();
        assert_eq!(provider.provide_pcm_frame().unwrap(), Provided::EndOfStream);
    }
}
