//! Wiedergabe-Zustandsmaschine
//!
//! Der Player ist selbst ein [`OpusFrameProvider`]: der Transport pullt ihn
//! einmal pro Tick. Intern laeuft die Kette
//!
//! ```text
//! SourceSlot -> PauseGate -> VolumeProvider -> PcmOpusProvider
//! ```
//!
//! Zustaende: `Idle -> Playing -> Ended`, `Closed` ist terminal. Pause ist ein
//! eigenes Flag ueber `Playing`. Events gehen erst nach dem Freigeben aller
//! Locks an die Listener, damit diese den Player wieder aufrufen koennen.

use klangkette_core::config::AudioEinstellungen;
use klangkette_core::Provided;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::codec::{FrameEncoder, OpusEncoder, PcmOpusProvider};
use crate::error::{AudioError, AudioResult};
use crate::pause::PauseGate;
use crate::provider::{OpusFrameProvider, PcmFrameProvider};
use crate::source::SourceSlot;
use crate::volume::VolumeProvider;

/// Empfaengt Lebenszyklus-Events eines Players
///
/// Alle Methoden haben leere Standard-Implementierungen.
pub trait PlayerListener: Send + Sync {
    fn on_start(&self, _player: &Player) {}
    fn on_pause(&self, _player: &Player) {}
    fn on_resume(&self, _player: &Player) {}
    fn on_end(&self, _player: &Player) {}
    fn on_error(&self, _player: &Player, _fehler: &AudioError) {}
    fn on_close(&self, _player: &Player) {}
}

/// Wiedergabezustand
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerZustand {
    /// Noch kein Frame seit dem (Neu-)Start
    Idle,
    Playing,
    /// Quelle hat `EndOfStream` gemeldet
    Ended,
    Closed,
}

struct PlayerState {
    zustand: PlayerZustand,
    paused: bool,
    volume: f32,
}

/// Ausstehendes Event (wird ausserhalb der Locks verteilt)
enum Ereignis {
    Start,
    Pause,
    Resume,
    End,
    Fehler(AudioError),
    Close,
}

type Kette = PcmOpusProvider<VolumeProvider<PauseGate<SourceSlot>>, Box<dyn FrameEncoder>>;

/// Player fuer genau eine Quelle zur Zeit
pub struct Player {
    state: Arc<Mutex<PlayerState>>,
    kette: Mutex<Kette>,
    slot: SourceSlot,
    listeners: Vec<Arc<dyn PlayerListener>>,
}

impl Player {
    pub fn new(encoder: Box<dyn FrameEncoder>, listeners: Vec<Arc<dyn PlayerListener>>) -> Self {
        let state = Arc::new(Mutex::new(PlayerState {
            zustand: PlayerZustand::Idle,
            paused: false,
            volume: 1.0,
        }));
        let slot = SourceSlot::new();

        let pause_state = Arc::clone(&state);
        let gate = PauseGate::new(slot.clone(), move || pause_state.lock().paused);

        let volume_state = Arc::clone(&state);
        let volume = VolumeProvider::new(gate, move || volume_state.lock().volume);

        debug!(listeners = listeners.len(), "Player erstellt");

        Self {
            state,
            kette: Mutex::new(PcmOpusProvider::new(volume, encoder)),
            slot,
            listeners,
        }
    }

    /// Player mit audiopus-Encoder nach Konfiguration
    pub fn with_config(
        config: &AudioEinstellungen,
        listeners: Vec<Arc<dyn PlayerListener>>,
    ) -> AudioResult<Self> {
        let encoder = OpusEncoder::new(config)?;
        Ok(Self::new(Box::new(encoder), listeners))
    }

    /// Setzt eine neue Quelle. Die bisherige wird geschlossen.
    ///
    /// Der naechste produzierte Frame loest wieder ein Start-Event aus.
    pub fn play(&self, provider: Box<dyn PcmFrameProvider>) -> AudioResult<()> {
        // Reset und Tausch unter dem Ketten-Lock: ein laufender Pull der alten
        // Quelle schliesst seinen Zustandswechsel vorher ab
        let _kette = self.kette.lock();
        {
            let mut state = self.state.lock();
            if state.zustand == PlayerZustand::Closed {
                return Err(AudioError::ProviderGeschlossen);
            }
            state.zustand = PlayerZustand::Idle;
        }

        if let Some(mut alt) = self.slot.setzen(provider) {
            alt.close();
        }
        info!("Neue Quelle im Player");
        Ok(())
    }

    pub fn zustand(&self) -> PlayerZustand {
        self.state.lock().zustand
    }

    pub fn volume(&self) -> f32 {
        self.state.lock().volume
    }

    /// Wirkt ab dem naechsten Frame, kein Event
    pub fn set_volume(&self, volume: f32) {
        self.state.lock().volume = volume;
    }

    pub fn paused(&self) -> bool {
        self.state.lock().paused
    }

    /// Pause/Resume-Event nur bei tatsaechlicher Aenderung
    pub fn set_paused(&self, paused: bool) {
        {
            let mut state = self.state.lock();
            if state.zustand == PlayerZustand::Closed || state.paused == paused {
                return;
            }
            state.paused = paused;
        }
        self.emit(if paused { Ereignis::Pause } else { Ereignis::Resume });
    }

    /// Pullt einen Opus-Frame und schaltet die Zustandsmaschine weiter
    ///
    /// Lock-Reihenfolge ist immer `kette` vor `state`.
    pub fn provide_frame(&self) -> AudioResult<Provided<Vec<u8>>> {
        let mut kette = self.kette.lock();
        match self.state.lock().zustand {
            PlayerZustand::Closed | PlayerZustand::Ended => return Ok(Provided::EndOfStream),
            PlayerZustand::Idle | PlayerZustand::Playing => {}
        }

        // Pause- und Volume-Closures sperren `state`: hier darf er nicht gehalten werden
        let ergebnis = kette.provide_opus_frame();

        let (rueckgabe, ereignis) = {
            let mut state = self.state.lock();
            if state.zustand == PlayerZustand::Closed {
                return Ok(Provided::EndOfStream);
            }
            match ergebnis {
                Ok(Provided::Frame(frame)) => {
                    let ereignis = (state.zustand != PlayerZustand::Playing).then(|| {
                        state.zustand = PlayerZustand::Playing;
                        Ereignis::Start
                    });
                    (Provided::Frame(frame), ereignis)
                }
                Ok(Provided::Empty) => (Provided::Empty, None),
                Ok(Provided::EndOfStream) => {
                    let ereignis =
                        (state.zustand == PlayerZustand::Playing).then_some(Ereignis::End);
                    state.zustand = PlayerZustand::Ended;
                    (Provided::EndOfStream, ereignis)
                }
                Err(e) => {
                    warn!(fehler = %e, "Fehler in der Player-Kette");
                    (Provided::Empty, Some(Ereignis::Fehler(e)))
                }
            }
        };
        drop(kette);

        if let Some(ereignis) = ereignis {
            self.emit(ereignis);
        }
        Ok(rueckgabe)
    }

    /// Schliesst Kette und Quelle, Close-Event genau einmal
    pub fn close(&self) {
        {
            let mut state = self.state.lock();
            if state.zustand == PlayerZustand::Closed {
                return;
            }
            state.zustand = PlayerZustand::Closed;
        }
        self.kette.lock().close();
        info!("Player geschlossen");
        self.emit(Ereignis::Close);
    }

    fn emit(&self, ereignis: Ereignis) {
        for listener in &self.listeners {
            match &ereignis {
                Ereignis::Start => listener.on_start(self),
                Ereignis::Pause => listener.on_pause(self),
                Ereignis::Resume => listener.on_resume(self),
                Ereignis::End => listener.on_end(self),
                Ereignis::Fehler(e) => listener.on_error(self, e),
                Ereignis::Close => listener.on_close(self),
            }
        }
    }
}

impl OpusFrameProvider for Player {
    fn provide_opus_frame(&mut self) -> AudioResult<Provided<Vec<u8>>> {
        self.provide_frame()
    }

    fn close(&mut self) {
        Player::close(self);
    }
}

/// Der Transport haelt einen Klon, die Anwendung steuert ueber den anderen
impl OpusFrameProvider for Arc<Player> {
    fn provide_opus_frame(&mut self) -> AudioResult<Provided<Vec<u8>>> {
        self.provide_frame()
    }

    fn close(&mut self) {
        Player::close(self);
    }
}
