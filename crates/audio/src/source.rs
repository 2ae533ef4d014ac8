//! Austauschbare Quelle fuer eine feste Provider-Kette
//!
//! Der Player baut seine Kette (Pause -> Lautstaerke -> Encoder) einmal auf.
//! Die eigentliche Quelle steckt in einem [`SourceSlot`] und kann zur
//! Laufzeit ersetzt werden, ohne die Kette neu zu bauen.

use klangkette_core::Provided;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

use crate::error::AudioResult;
use crate::provider::PcmFrameProvider;

type Slot = Option<Box<dyn PcmFrameProvider>>;

/// Geteilter Steckplatz fuer einen PCM-Provider
///
/// Klone teilen denselben Platz. Ein leerer Platz liefert `Empty`.
#[derive(Clone, Default)]
pub struct SourceSlot {
    inner: Arc<Mutex<Slot>>,
}

impl SourceSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Setzt eine neue Quelle und gibt die bisherige zurueck (nicht geschlossen)
    pub fn setzen(&self, provider: Box<dyn PcmFrameProvider>) -> Option<Box<dyn PcmFrameProvider>> {
        self.inner.lock().replace(provider)
    }

    pub fn ist_belegt(&self) -> bool {
        self.inner.lock().is_some()
    }
}

impl PcmFrameProvider for SourceSlot {
    fn provide_pcm_frame(&mut self) -> AudioResult<Provided<Vec<i16>>> {
        match self.inner.lock().as_mut() {
            Some(provider) => provider.provide_pcm_frame(),
            None => Ok(Provided::Empty),
        }
    }

    /// Schliesst die aktuelle Quelle und leert den Platz
    fn close(&mut self) {
        let provider = self.inner.lock().take();
        if let Some(mut provider) = provider {
            provider.close();
            debug!("Quelle im SourceSlot geschlossen");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::testing::ScriptedProvider;
    use std::sync::atomic::Ordering;

    #[test]
    fn leerer_platz_liefert_empty() {
        let mut slot = SourceSlot::new();
        assert!(!slot.ist_belegt());
        assert_eq!(slot.provide_pcm_frame().unwrap(), Provided::Empty);
        slot.close();
    }

    #[test]
    fn quelle_wird_ueber_klon_getauscht() {
        let mut slot = SourceSlot::new();
        let steuerung = slot.clone();

        steuerung.setzen(Box::new(ScriptedProvider::counting(1, 2)));
        assert_eq!(slot.provide_pcm_frame().unwrap(), Provided::Frame(vec![0, 0]));
        assert_eq!(slot.provide_pcm_frame().unwrap(), Provided::EndOfStream);

        let neu = ScriptedProvider::counting(2, 1);
        let vorher = steuerung.setzen(Box::new(neu));
        assert!(vorher.is_some());
        assert_eq!(slot.provide_pcm_frame().unwrap(), Provided::Frame(vec![0]));
    }

    #[test]
    fn close_schliesst_aktuelle_quelle() {
        let mut slot = SourceSlot::new();
        let quelle = ScriptedProvider::counting(3, 1);
        let closes = Arc::clone(&quelle.closes);
        slot.setzen(Box::new(quelle));

        slot.close();
        slot.close();
        assert_eq!(closes.load(Ordering::SeqCst), 1);
        assert!(!slot.ist_belegt());
    }
}
