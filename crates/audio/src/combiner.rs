//! Multi-Source-Mixer mit Jitter Buffer
//!
//! Eingehende PCM-Pakete werden pro Quelle in einer begrenzten Warteschlange
//! gepuffert. Ein eigener Tick-Thread mischt alle 20 ms je ein frisches
//! Paket pro Quelle zu einem [`CombinedPcmFrame`] und reicht ihn an den
//! Sink weiter.
//!
//! ## Mischalgorithmus
//! - Pakete aelter als `veraltet_ms` werden verworfen (Latenz bleibt begrenzt)
//! - Quellen ohne frisches Paket tragen nichts bei (keine Stille)
//! - Ausgabe-Laenge = laengstes beteiligtes Paket
//! - laufender Mittelwert: `out[j] = clamp(out[j] + s / N)` pro Quelle
//!
//! ## Takt
//! Der Tick-Thread plant gegen einen Anker ([`TickClock`]) statt Schlafzeiten
//! aufzuaddieren. Liegt er mehr als zwei Frames zurueck, wird der Anker auf
//! "jetzt" gesetzt.

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use klangkette_core::config::MixerEinstellungen;
use klangkette_core::frame::clamp_sample;
use klangkette_core::{CombinedPcmFrame, PcmPacket, SourceId};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::ThreadId;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};

use crate::error::{AudioError, AudioResult};
use crate::receiver::{CombinedFrameReceiver, PcmFrameReceiver};

// ---------------------------------------------------------------------------
// Statistiken
// ---------------------------------------------------------------------------

/// Statistiken des Mixers (Snapshot)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CombinerStatistik {
    /// Angenommene Pakete gesamt
    pub empfangen: u64,
    /// Ausgefuehrte Misch-Ticks
    pub ticks: u64,
    /// Ticks, die einen gemischten Frame erzeugt haben
    pub gemischt: u64,
    /// Wegen Alter verworfene Pakete
    pub veraltet: u64,
    /// Wegen voller Warteschlange verworfene Pakete
    pub ueberlauf: u64,
    /// Fehlerhafte Pakete (leer oder nicht kanal-ausgerichtet)
    pub fehlerhaft: u64,
    /// Neusynchronisationen des Takts
    pub resyncs: u64,
}

// ---------------------------------------------------------------------------
// TickClock
// ---------------------------------------------------------------------------

/// Anker-basierter Takt fuer den Misch-Thread
#[derive(Debug, Clone)]
pub struct TickClock {
    anchor: Instant,
    frame: Duration,
}

impl TickClock {
    pub fn new(start: Instant, frame: Duration) -> Self {
        Self {
            anchor: start,
            frame,
        }
    }

    /// Zeitpunkt des naechsten Ticks
    pub fn deadline(&self) -> Instant {
        self.anchor + self.frame
    }

    /// Schaltet den Anker weiter. Gibt `true` zurueck wenn neu synchronisiert wurde.
    ///
    /// Mehr als zwei Frames Rueckstand -> Anker = `now`, sonst Anker += ein Frame.
    pub fn advance(&mut self, now: Instant) -> bool {
        if now.saturating_duration_since(self.anchor) > self.frame * 2 {
            self.anchor = now;
            true
        } else {
            self.anchor += self.frame;
            false
        }
    }
}

// ---------------------------------------------------------------------------
// JitterMixer
// ---------------------------------------------------------------------------

/// Gepuffertes Paket mit Ankunftszeit
#[derive(Debug, Clone)]
struct QueuedPacket {
    ankunft: Instant,
    packet: PcmPacket,
}

/// Warteschlangen pro Quelle plus Mischlogik
///
/// Nicht thread-safe; [`PcmCombiner`] schuetzt ihn mit genau einem Lock.
pub struct JitterMixer {
    queues: HashMap<SourceId, VecDeque<QueuedPacket>>,
    config: MixerEinstellungen,
    statistik: CombinerStatistik,
}

impl JitterMixer {
    pub fn new(config: MixerEinstellungen) -> Self {
        Self {
            queues: HashMap::new(),
            config,
            statistik: CombinerStatistik::default(),
        }
    }

    /// Kopiert das Paket in die Warteschlange der Quelle
    pub fn push(&mut self, source: SourceId, packet: &PcmPacket, ankunft: Instant) -> AudioResult<()> {
        if packet.pcm.is_empty() {
            self.statistik.fehlerhaft += 1;
            return Err(AudioError::UngueltigerFrame(format!(
                "Leeres PCM-Paket von {source}"
            )));
        }

        let max = self.config.max_pakete_pro_quelle;
        let queue = self.queues.entry(source).or_insert_with(|| {
            debug!(source = %source, "Neue Quelle im Mixer");
            VecDeque::with_capacity(max)
        });

        if queue.len() >= max {
            queue.pop_front();
            self.statistik.ueberlauf += 1;
            trace!(source = %source, "Warteschlange voll, aeltestes Paket verworfen");
        }

        queue.push_back(QueuedPacket {
            ankunft,
            packet: packet.clone(),
        });
        self.statistik.empfangen += 1;
        Ok(())
    }

    /// Entfernt eine Quelle samt Warteschlange. Gibt zurueck ob sie existierte.
    pub fn remove(&mut self, source: SourceId) -> bool {
        self.queues.remove(&source).is_some()
    }

    /// Aktuell bekannte Quellen (sortiert)
    pub fn sources(&self) -> Vec<SourceId> {
        let mut sources: Vec<SourceId> = self.queues.keys().copied().collect();
        sources.sort();
        sources
    }

    /// Anzahl gepufferter Pakete einer Quelle
    pub fn queued(&self, source: SourceId) -> usize {
        self.queues.get(&source).map_or(0, VecDeque::len)
    }

    pub fn statistik(&self) -> &CombinerStatistik {
        &self.statistik
    }

    /// Fuehrt einen Misch-Tick zum Zeitpunkt `now` aus
    ///
    /// Gibt `None` zurueck wenn keine Quelle ein frisches Paket hat.
    pub fn mix(&mut self, now: Instant) -> Option<(Vec<SourceId>, CombinedPcmFrame)> {
        self.statistik.ticks += 1;

        let veraltet_nach = self.config.veraltet_nach();
        let channels = self.config.channels.max(1) as usize;
        let mut teile: Vec<(SourceId, PcmPacket)> = Vec::new();

        for (&source, queue) in self.queues.iter_mut() {
            while queue
                .front()
                .is_some_and(|q| now.saturating_duration_since(q.ankunft) > veraltet_nach)
            {
                queue.pop_front();
                self.statistik.veraltet += 1;
            }

            let Some(eintrag) = queue.pop_front() else {
                continue;
            };

            if eintrag.packet.pcm.len() % channels != 0 {
                self.statistik.fehlerhaft += 1;
                warn!(
                    source = %source,
                    samples = eintrag.packet.pcm.len(),
                    channels,
                    "Paket nicht kanal-ausgerichtet, verworfen"
                );
                continue;
            }

            teile.push((source, eintrag.packet));
        }

        if teile.is_empty() {
            return None;
        }

        // Deterministische Reihenfolge unabhaengig von der HashMap
        teile.sort_by_key(|(source, _)| *source);

        let n = teile.len() as i32;
        let laenge = teile.iter().map(|(_, p)| p.pcm.len()).max().unwrap_or(0);

        let mut frame = CombinedPcmFrame {
            sequences: Vec::with_capacity(teile.len()),
            timestamps: Vec::with_capacity(teile.len()),
            ssrcs: Vec::with_capacity(teile.len()),
            pcm: vec![0i16; laenge],
        };
        let mut sources = Vec::with_capacity(teile.len());

        for (source, packet) in &teile {
            sources.push(*source);
            frame.sequences.push(packet.sequence);
            frame.timestamps.push(packet.timestamp);
            frame.ssrcs.push(packet.ssrc);

            for (out, &s) in frame.pcm.iter_mut().zip(packet.pcm.iter()) {
                *out = clamp_sample(*out as i32 + s as i32 / n);
            }
        }

        self.statistik.gemischt += 1;
        trace!(quellen = sources.len(), samples = laenge, "Tick gemischt");
        Some((sources, frame))
    }
}

// ---------------------------------------------------------------------------
// PcmCombiner
// ---------------------------------------------------------------------------

struct Shared {
    mixer: Mutex<JitterMixer>,
}

/// PCM-Receiver, der alle Quellen im eigenen Takt zusammenmischt
///
/// `receive_pcm_frame` darf aus beliebig vielen Threads gleichzeitig
/// aufgerufen werden. Der Sink wird nur vom Tick-Thread benutzt und beim
/// Beenden von ihm geschlossen.
pub struct PcmCombiner {
    shared: Arc<Shared>,
    running: AtomicBool,
    stop_tx: Sender<()>,
    beendet_rx: Receiver<()>,
    tick_thread: ThreadId,
}

impl PcmCombiner {
    /// Startet den Mixer mit Standardeinstellungen (20 ms, 100 ms, Stereo)
    pub fn new<S: CombinedFrameReceiver + 'static>(sink: S) -> AudioResult<Self> {
        Self::with_config(sink, MixerEinstellungen::default())
    }

    pub fn with_config<S: CombinedFrameReceiver + 'static>(
        sink: S,
        config: MixerEinstellungen,
    ) -> AudioResult<Self> {
        if config.frame_ms == 0 {
            return Err(AudioError::Konfiguration("frame_ms darf nicht 0 sein".into()));
        }
        if !(1..=2).contains(&config.channels) {
            return Err(AudioError::Konfiguration(format!(
                "Mixer unterstuetzt 1 oder 2 Kanaele, nicht {}",
                config.channels
            )));
        }
        if config.max_pakete_pro_quelle == 0 {
            return Err(AudioError::Konfiguration(
                "max_pakete_pro_quelle darf nicht 0 sein".into(),
            ));
        }

        let frame_dauer = config.frame_dauer();
        let shared = Arc::new(Shared {
            mixer: Mutex::new(JitterMixer::new(config)),
        });
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let (beendet_tx, beendet_rx) = bounded::<()>(0);

        let shared_clone = Arc::clone(&shared);
        let handle = std::thread::Builder::new()
            .name("klangkette-mixer".to_string())
            .spawn(move || {
                tick_thread(shared_clone, sink, frame_dauer, stop_rx, beendet_tx);
            })
            .map_err(|e| AudioError::RessourcenFehler(e.to_string()))?;

        info!("PcmCombiner gestartet");

        Ok(Self {
            shared,
            running: AtomicBool::new(true),
            stop_tx,
            beendet_rx,
            tick_thread: handle.thread().id(),
        })
    }

    /// Gibt aktuelle Statistiken zurueck
    pub fn statistik(&self) -> CombinerStatistik {
        self.shared.mixer.lock().statistik().clone()
    }

    /// Aktuell gepufferte Quellen
    pub fn sources(&self) -> Vec<SourceId> {
        self.shared.mixer.lock().sources()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

impl PcmFrameReceiver for PcmCombiner {
    fn receive_pcm_frame(&self, source: SourceId, packet: &PcmPacket) -> AudioResult<()> {
        let ankunft = Instant::now();
        self.shared.mixer.lock().push(source, packet, ankunft)
    }

    fn cleanup_source(&self, source: SourceId) {
        if self.shared.mixer.lock().remove(source) {
            debug!(source = %source, "Quelle aus dem Mixer entfernt");
        }
    }

    fn close(&self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }
        let _ = self.stop_tx.try_send(());

        // Aus dem Sink heraus geschlossen: der Tick-Thread beendet sich selbst
        if std::thread::current().id() == self.tick_thread {
            return;
        }
        // Liefert Err sobald der Thread seinen Sender fallen laesst
        let _ = self.beendet_rx.recv();
        info!("PcmCombiner gestoppt");
    }
}

impl Drop for PcmCombiner {
    fn drop(&mut self) {
        self.close();
    }
}

/// Misch-Thread: mischt, schlaeft bis zum naechsten Anker, schaltet weiter
fn tick_thread<S: CombinedFrameReceiver>(
    shared: Arc<Shared>,
    mut sink: S,
    frame_dauer: Duration,
    stop_rx: Receiver<()>,
    _beendet_tx: Sender<()>,
) {
    debug!("Mixer-Thread gestartet");
    let mut clock = TickClock::new(Instant::now(), frame_dauer);

    loop {
        // Lock nur fuer das Mischen, nicht waehrend der Sink-Aufruf laeuft
        let gemischt = shared.mixer.lock().mix(Instant::now());
        if let Some((sources, frame)) = gemischt {
            if let Err(e) = sink.receive_combined_pcm_frame(&sources, frame) {
                error!(fehler = %e, "Gemischter Frame konnte nicht weitergegeben werden");
            }
        }

        match stop_rx.recv_deadline(clock.deadline()) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }

        if clock.advance(Instant::now()) {
            warn!("Mixer-Takt zu weit zurueck, Anker neu gesetzt");
            shared.mixer.lock().statistik.resyncs += 1;
        }
    }

    sink.close();
    debug!("Mixer-Thread beendet");
}
