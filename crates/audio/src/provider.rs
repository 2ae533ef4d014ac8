//! Pull-Vertraege fuer Frame-Provider
//!
//! Ein Provider wird einmal pro Tick vom Echtzeit-Aufrufer gepullt. Er darf
//! den Aufrufer blockieren, startet aber nie eigene Hintergrundarbeit
//! (Ausnahme: [`crate::buffer::BufferedProvider`], der genau dafuer da ist).

use klangkette_core::Provided;

use crate::error::AudioResult;

/// Liefert unkomprimierte 16-Bit-PCM-Frames
pub trait PcmFrameProvider: Send {
    /// Liefert den Frame fuer den aktuellen Tick
    fn provide_pcm_frame(&mut self) -> AudioResult<Provided<Vec<i16>>>;

    /// Gibt alle gehaltenen Ressourcen frei. Mehrfacher Aufruf ist erlaubt.
    fn close(&mut self);
}

/// Liefert Opus-kodierte Frames fuer den Transport
pub trait OpusFrameProvider: Send {
    /// Liefert den kodierten Frame fuer den aktuellen Tick
    fn provide_opus_frame(&mut self) -> AudioResult<Provided<Vec<u8>>>;

    /// Gibt alle gehaltenen Ressourcen frei. Mehrfacher Aufruf ist erlaubt.
    fn close(&mut self);
}

impl<P: PcmFrameProvider + ?Sized> PcmFrameProvider for Box<P> {
    fn provide_pcm_frame(&mut self) -> AudioResult<Provided<Vec<i16>>> {
        (**self).provide_pcm_frame()
    }

    fn close(&mut self) {
        (**self).close()
    }
}

impl<P: OpusFrameProvider + ?Sized> OpusFrameProvider for Box<P> {
    fn provide_opus_frame(&mut self) -> AudioResult<Provided<Vec<u8>>> {
        (**self).provide_opus_frame()
    }

    fn close(&mut self) {
        (**self).close()
    }
}

/// Test-Provider, die von mehreren Modulen gemeinsam genutzt werden
#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::error::AudioError;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Ein Schritt eines [`ScriptedProvider`]
    pub enum Step {
        Frame(Vec<i16>),
        Fehler,
    }

    /// Liefert vorgegebene Frames/Fehler und danach `EndOfStream`.
    /// Zaehlt Pulls und Close-Aufrufe.
    pub struct ScriptedProvider {
        steps: VecDeque<Step>,
        pub pulls: Arc<AtomicUsize>,
        pub closes: Arc<AtomicUsize>,
    }

    impl ScriptedProvider {
        pub fn new(steps: Vec<Step>) -> Self {
            Self {
                steps: steps.into(),
                pulls: Arc::new(AtomicUsize::new(0)),
                closes: Arc::new(AtomicUsize::new(0)),
            }
        }

        /// Frames mit aufsteigendem Inhalt: Frame i besteht aus `len` mal `i`
        pub fn counting(frames: usize, len: usize) -> Self {
            Self::new(
                (0..frames)
                    .map(|i| Step::Frame(vec![i as i16; len]))
                    .collect(),
            )
        }
    }

    impl PcmFrameProvider for ScriptedProvider {
        fn provide_pcm_frame(&mut self) -> AudioResult<Provided<Vec<i16>>> {
            self.pulls.fetch_add(1, Ordering::SeqCst);
            match self.steps.pop_front() {
                Some(Step::Frame(frame)) => Ok(Provided::Frame(frame)),
                Some(Step::Fehler) => Err(AudioError::CodecFehler("Testfehler".into())),
                None => Ok(Provided::EndOfStream),
            }
        }

        fn close(&mut self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }
}
