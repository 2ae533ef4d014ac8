//! Prefetch-Puffer zwischen langsamem Provider und Echtzeit-Tick
//!
//! Ein Hintergrund-Thread pullt den inneren Provider und legt die Frames in
//! eine begrenzte Warteschlange (crossbeam-channel). Der Vordergrund-Pull
//! blockiert nie: leere Warteschlange = Unterlauf (`Empty`).
//!
//! Ablauf:
//! - Warteschlange voll -> Thread wartet `leerlauf` und prueft erneut
//! - innerer Provider meldet `EndOfStream` -> Thread endet, schliesst den
//!   inneren Provider; nach dem Leeren der Warteschlange liefert der Puffer
//!   selbst `EndOfStream`
//! - `close()` setzt das Stop-Flag; der Thread reagiert beim naechsten Check

use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError};
use klangkette_core::config::PufferEinstellungen;
use klangkette_core::Provided;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace, warn};

use crate::error::{AudioError, AudioResult};
use crate::provider::PcmFrameProvider;

/// PCM-Provider mit Hintergrund-Prefetch
pub struct BufferedProvider {
    frames: Receiver<Vec<i16>>,
    stop: Arc<AtomicBool>,
    underruns: u64,
}

impl BufferedProvider {
    /// Startet den Prefetch mit Standardeinstellungen (10 Frames)
    pub fn new<P: PcmFrameProvider + 'static>(inner: P) -> AudioResult<Self> {
        Self::with_config(inner, &PufferEinstellungen::default())
    }

    pub fn with_config<P: PcmFrameProvider + 'static>(
        inner: P,
        config: &PufferEinstellungen,
    ) -> AudioResult<Self> {
        if config.kapazitaet == 0 {
            return Err(AudioError::Konfiguration(
                "Puffer-Kapazitaet darf nicht 0 sein".into(),
            ));
        }

        let (tx, rx) = bounded::<Vec<i16>>(config.kapazitaet);
        let stop = Arc::new(AtomicBool::new(false));
        let stop_clone = Arc::clone(&stop);
        let leerlauf = config.leerlauf();

        std::thread::Builder::new()
            .name("klangkette-prefetch".to_string())
            .spawn(move || {
                prefetch_thread(inner, tx, stop_clone, leerlauf);
            })
            .map_err(|e| AudioError::RessourcenFehler(e.to_string()))?;

        debug!(kapazitaet = config.kapazitaet, "BufferedProvider gestartet");

        Ok(Self {
            frames: rx,
            stop,
            underruns: 0,
        })
    }

    /// Anzahl aktuell gepufferter Frames
    pub fn buffered(&self) -> usize {
        self.frames.len()
    }

    /// Anzahl Pulls, die wegen leerer Warteschlange `Empty` lieferten
    pub fn underruns(&self) -> u64 {
        self.underruns
    }
}

impl PcmFrameProvider for BufferedProvider {
    fn provide_pcm_frame(&mut self) -> AudioResult<Provided<Vec<i16>>> {
        if self.stop.load(Ordering::Acquire) {
            return Ok(Provided::EndOfStream);
        }
        match self.frames.try_recv() {
            Ok(frame) => Ok(Provided::Frame(frame)),
            Err(TryRecvError::Empty) => {
                self.underruns += 1;
                trace!("Prefetch-Unterlauf");
                Ok(Provided::Empty)
            }
            Err(TryRecvError::Disconnected) => Ok(Provided::EndOfStream),
        }
    }

    fn close(&mut self) {
        if !self.stop.swap(true, Ordering::AcqRel) {
            debug!("BufferedProvider geschlossen");
        }
    }
}

impl Drop for BufferedProvider {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
    }
}

/// Hintergrund-Thread des Prefetch-Puffers
fn prefetch_thread<P: PcmFrameProvider>(
    mut inner: P,
    tx: Sender<Vec<i16>>,
    stop: Arc<AtomicBool>,
    leerlauf: Duration,
) {
    trace!("Prefetch-Thread gestartet");

    while !stop.load(Ordering::Acquire) {
        // Einziger Produzent: nach dieser Pruefung bleibt Platz frei
        if tx.is_full() {
            std::thread::sleep(leerlauf);
            continue;
        }

        match inner.provide_pcm_frame() {
            Ok(Provided::Frame(frame)) => {
                if tx.send(frame).is_err() {
                    // Konsument existiert nicht mehr
                    break;
                }
            }
            Ok(Provided::Empty) => std::thread::sleep(leerlauf),
            Ok(Provided::EndOfStream) => {
                debug!("Innerer Provider beendet, Prefetch endet");
                break;
            }
            Err(e) if e.ist_voruebergehend() => {
                warn!(fehler = %e, "Frame im Prefetch uebersprungen");
            }
            Err(e) => {
                warn!(fehler = %e, "Prefetch abgebrochen");
                break;
            }
        }
    }

    inner.close();
    trace!("Prefetch-Thread beendet");
}
