//! Push-Vertraege fuer Frame-Receiver
//!
//! Receiver werden vom Transport (bzw. vom Decoder davor) fuer jede Quelle
//! aufgerufen, potentiell gleichzeitig aus mehreren Threads. Deshalb nehmen
//! sie `&self` und synchronisieren ihren Zustand selbst.

use std::sync::Arc;

use klangkette_core::{CombinedPcmFrame, OpusPacket, PcmPacket, SourceId};

use crate::error::AudioResult;

/// Entscheidet ob Frames einer Quelle verarbeitet werden
pub type SourceFilter = Arc<dyn Fn(SourceId) -> bool + Send + Sync>;

/// Empfaengt PCM-Frames einzelner Quellen
pub trait PcmFrameReceiver: Send + Sync {
    /// Verarbeitet einen Frame. Der Aufrufer darf den Puffer danach wiederverwenden.
    fn receive_pcm_frame(&self, source: SourceId, packet: &PcmPacket) -> AudioResult<()>;

    /// Quelle hat die Verbindung getrennt: quellenbezogenen Zustand freigeben
    fn cleanup_source(&self, source: SourceId);

    /// Faehrt den Receiver herunter. Mehrfacher Aufruf ist erlaubt.
    fn close(&self);
}

/// Empfaengt Opus-Frames einzelner Quellen vom Transport
pub trait OpusFrameReceiver: Send + Sync {
    fn receive_opus_frame(&self, source: SourceId, packet: &OpusPacket) -> AudioResult<()>;

    fn cleanup_source(&self, source: SourceId);

    fn close(&self);
}

/// Empfaengt den gemischten Frame eines Ticks
///
/// `sources` ist parallel zu den Metadaten-Arrays im Frame.
pub trait CombinedFrameReceiver: Send {
    fn receive_combined_pcm_frame(
        &mut self,
        sources: &[SourceId],
        frame: CombinedPcmFrame,
    ) -> AudioResult<()>;

    fn close(&mut self);
}

impl<R: PcmFrameReceiver + ?Sized> PcmFrameReceiver for Box<R> {
    fn receive_pcm_frame(&self, source: SourceId, packet: &PcmPacket) -> AudioResult<()> {
        (**self).receive_pcm_frame(source, packet)
    }

    fn cleanup_source(&self, source: SourceId) {
        (**self).cleanup_source(source)
    }

    fn close(&self) {
        (**self).close()
    }
}

impl<R: PcmFrameReceiver + ?Sized> PcmFrameReceiver for Arc<R> {
    fn receive_pcm_frame(&self, source: SourceId, packet: &PcmPacket) -> AudioResult<()> {
        (**self).receive_pcm_frame(source, packet)
    }

    fn cleanup_source(&self, source: SourceId) {
        (**self).cleanup_source(source)
    }

    fn close(&self) {
        (**self).close()
    }
}

impl<R: OpusFrameReceiver + ?Sized> OpusFrameReceiver for Box<R> {
    fn receive_opus_frame(&self, source: SourceId, packet: &OpusPacket) -> AudioResult<()> {
        (**self).receive_opus_frame(source, packet)
    }

    fn cleanup_source(&self, source: SourceId) {
        (**self).cleanup_source(source)
    }

    fn close(&self) {
        (**self).close()
    }
}

impl<R: CombinedFrameReceiver + ?Sized> CombinedFrameReceiver for Box<R> {
    fn receive_combined_pcm_frame(
        &mut self,
        sources: &[SourceId],
        frame: CombinedPcmFrame,
    ) -> AudioResult<()> {
        (**self).receive_combined_pcm_frame(sources, frame)
    }

    fn close(&mut self) {
        (**self).close()
    }
}

/// Test-Receiver, die von mehreren Modulen gemeinsam genutzt werden
#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use parking_lot::Mutex;

    /// Zeichnet alle empfangenen Pakete und Cleanup-/Close-Aufrufe auf
    #[derive(Default)]
    pub struct RecordingReceiver {
        pub frames: Mutex<Vec<(SourceId, PcmPacket)>>,
        pub cleanups: Mutex<Vec<SourceId>>,
        pub closes: Mutex<usize>,
    }

    impl PcmFrameReceiver for RecordingReceiver {
        fn receive_pcm_frame(&self, source: SourceId, packet: &PcmPacket) -> AudioResult<()> {
            self.frames.lock().push((source, packet.clone()));
            Ok(())
        }

        fn cleanup_source(&self, source: SourceId) {
            self.cleanups.lock().push(source);
        }

        fn close(&self) {
            *self.closes.lock() += 1;
        }
    }

    /// Gemeinsam beobachtbarer Zustand eines [`RecordingCombinedReceiver`]
    #[derive(Default)]
    pub struct CombinedLog {
        pub frames: Vec<(Vec<SourceId>, CombinedPcmFrame)>,
        pub closes: usize,
    }

    /// Sink fuer den Mixer; der Log bleibt nach der Uebergabe beobachtbar
    pub struct RecordingCombinedReceiver {
        pub log: Arc<Mutex<CombinedLog>>,
    }

    impl RecordingCombinedReceiver {
        pub fn new() -> (Self, Arc<Mutex<CombinedLog>>) {
            let log = Arc::new(Mutex::new(CombinedLog::default()));
            (Self { log: Arc::clone(&log) }, log)
        }
    }

    impl CombinedFrameReceiver for RecordingCombinedReceiver {
        fn receive_combined_pcm_frame(
            &mut self,
            sources: &[SourceId],
            frame: CombinedPcmFrame,
        ) -> AudioResult<()> {
            self.log.lock().frames.push((sources.to_vec(), frame));
            Ok(())
        }

        fn close(&mut self) {
            self.log.lock().closes += 1;
        }
    }
}
