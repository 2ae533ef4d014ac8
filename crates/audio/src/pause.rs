//! Pausierbare Provider
//!
//! Solange das Praedikat `true` liefert, gibt das Gate `Empty` zurueck und
//! pullt den inneren Provider nicht. Die Wiedergabeposition bleibt dadurch
//! exakt erhalten. Funktioniert fuer PCM- und Opus-Provider.

use klangkette_core::Provided;
use tracing::trace;

use crate::error::AudioResult;
use crate::provider::{OpusFrameProvider, PcmFrameProvider};

/// Wird pro Tick abgefragt: `true` = pausiert
pub type PausePredicate = Box<dyn Fn() -> bool + Send>;

/// Gate vor einem beliebigen Provider
pub struct PauseGate<P> {
    inner: P,
    paused: PausePredicate,
}

impl<P> PauseGate<P> {
    pub fn new(inner: P, paused: impl Fn() -> bool + Send + 'static) -> Self {
        Self {
            inner,
            paused: Box::new(paused),
        }
    }
}

impl<P: PcmFrameProvider> PcmFrameProvider for PauseGate<P> {
    fn provide_pcm_frame(&mut self) -> AudioResult<Provided<Vec<i16>>> {
        if (self.paused)() {
            trace!("PCM-Provider pausiert, kein Pull");
            return Ok(Provided::Empty);
        }
        self.inner.provide_pcm_frame()
    }

    fn close(&mut self) {
        self.inner.close();
    }
}

impl<P: OpusFrameProvider> OpusFrameProvider for PauseGate<P> {
    fn provide_opus_frame(&mut self) -> AudioResult<Provided<Vec<u8>>> {
        if (self.paused)() {
            trace!("Opus-Provider pausiert, kein Pull");
            return Ok(Provided::Empty);
        }
        self.inner.provide_opus_frame()
    }

    fn close(&mut self) {
        self.inner.close();
    }
}
