//! klangkette-audio – Echtzeit-Audio-Frame-Pipeline
//!
//! Bausteine fuer einen Voice-Client:
//! - Provider (Pull, einmal pro 20-ms-Tick) und Receiver (Push)
//! - Dekoratoren: Kanalwandlung, Lautstaerke, Pause, Resampling
//! - Prefetch-Puffer mit Hintergrund-Thread
//! - Multi-Source-Mixer mit Jitter Buffer
//! - Player mit Lebenszyklus-Events
//! - Opus-Anbindung via audiopus, PCM-Byte-Streams

pub mod buffer;
pub mod channels;
pub mod codec;
pub mod combiner;
pub mod error;
pub mod io;
pub mod pause;
pub mod player;
pub mod provider;
pub mod receiver;
pub mod resample;
pub mod source;
pub mod volume;

// Bequeme Re-Exporte der wichtigsten Typen
pub use buffer::BufferedProvider;
pub use channels::{
    ChannelConverter, ChannelConverterCombinedReceiver, ChannelConverterProvider,
    ChannelConverterReceiver,
};
pub use codec::{
    ErrorHandlingOpusProvider, FrameDecoder, FrameEncoder, OpusDecoder, OpusEncoder,
    PcmOpusProvider, PcmOpusReceiver,
};
pub use combiner::{CombinerStatistik, PcmCombiner};
pub use error::{AudioError, AudioResult};
pub use io::{CombinedPcmWriter, PcmReader, PcmWriter, StreamDecoder};
pub use pause::PauseGate;
pub use player::{Player, PlayerListener, PlayerZustand};
pub use provider::{OpusFrameProvider, PcmFrameProvider};
pub use receiver::{CombinedFrameReceiver, OpusFrameReceiver, PcmFrameReceiver, SourceFilter};
pub use resample::{ResampleFormat, Resampler, ResamplerProvider, ResamplerReceiver};
pub use source::SourceSlot;
pub use volume::{apply_volume, VolumeProvider};
