//! Lautstaerke-Skalierung fuer PCM-Frames
//!
//! Die Verstaerkung wird pro Frame neu abgefragt, damit Aenderungen ab dem
//! naechsten Frame greifen, ohne die Kette neu aufzubauen.

use klangkette_core::Provided;

use crate::error::AudioResult;
use crate::provider::PcmFrameProvider;

/// Liefert die aktuelle Verstaerkung (1.0 = unveraendert)
pub type GainSource = Box<dyn Fn() -> f32 + Send>;

/// Wendet eine Verstaerkung in-place auf einen Frame an.
///
/// `gain == 1.0` laesst den Puffer unberuehrt, `gain == 0.0` setzt alles
/// auf 0, sonst wird skaliert und auf 16 Bit begrenzt.
pub fn apply_volume(samples: &mut [i16], gain: f32) {
    if gain == 1.0 {
        return;
    }
    if gain == 0.0 {
        samples.fill(0);
        return;
    }
    for s in samples.iter_mut() {
        let v = (*s as f32 * gain).clamp(i16::MIN as f32, i16::MAX as f32);
        *s = v as i16;
    }
}

/// Provider-Dekorator mit laufzeitveraenderlicher Lautstaerke
pub struct VolumeProvider<P> {
    inner: P,
    gain: GainSource,
}

impl<P: PcmFrameProvider> VolumeProvider<P> {
    pub fn new(inner: P, gain: impl Fn() -> f32 + Send + 'static) -> Self {
        Self {
            inner,
            gain: Box::new(gain),
        }
    }
}

impl<P: PcmFrameProvider> PcmFrameProvider for VolumeProvider<P> {
    fn provide_pcm_frame(&mut self) -> AudioResult<Provided<Vec<i16>>> {
        let gain = &self.gain;
        Ok(self.inner.provide_pcm_frame()?.map(|mut frame| {
            apply_volume(&mut frame, gain());
            frame
        }))
    }

    fn close(&mut self) {
        self.inner.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::testing::{ScriptedProvider, Step};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn testsignal() -> Vec<i16> {
        vec![0, 1, -1, 1000, -1000, i16::MAX, i16::MIN, 12345]
    }

    #[test]
    fn volume_eins_laesst_puffer_unveraendert() {
        let mut samples = testsignal();
        apply_volume(&mut samples, 1.0);
        assert_eq!(samples, testsignal());
    }

    #[test]
    fn volume_null_setzt_alles_auf_null() {
        let mut samples = testsignal();
        apply_volume(&mut samples, 0.0);
        assert_eq!(samples.len(), testsignal().len());
        assert!(samples.iter().all(|&s| s == 0), "Gain 0 muss stumm schalten");
    }

    #[test]
    fn volume_halbiert() {
        let mut samples = vec![1000i16, -1000, 3];
        apply_volume(&mut samples, 0.5);
        assert_eq!(samples, vec![500, -500, 1]);
    }

    #[test]
    fn volume_verstaerkung_wird_begrenzt() {
        for gain in [2.0f32, 10.0, -3.0, 1e9, f32::MAX] {
            let mut samples = testsignal();
            apply_volume(&mut samples, gain);
            // i16 kann den Bereich ohnehin nicht verlassen; geprueft wird die Saettigung
            assert_eq!(samples[5], if gain > 0.0 { i16::MAX } else { i16::MIN });
        }
    }

    #[test]
    fn provider_liest_verstaerkung_pro_frame() {
        let gain = Arc::new(AtomicU32::new(1.0f32.to_bits()));
        let gain_lesen = Arc::clone(&gain);
        let inner = ScriptedProvider::new(vec![
            Step::Frame(vec![100, 200]),
            Step::Frame(vec![100, 200]),
        ]);
        let mut provider =
            VolumeProvider::new(inner, move || f32::from_bits(gain_lesen.load(Ordering::SeqCst)));

        assert_eq!(provider.provide_pcm_frame().unwrap(), Provided::Frame(vec![100, 200]));
        gain.store(2.0f32.to_bits(), Ordering::SeqCst);
        assert_eq!(provider.provide_pcm_frame().unwrap(), Provided::Frame(vec![200, 400]));
        assert_eq!(provider.provide_pcm_frame().unwrap(), Provided::EndOfStream);
    }
}
