//! Gemeinsame Identifikationstypen fuer Klangkette
//!
//! IDs verwenden das Newtype-Pattern, damit Quellen-IDs nicht mit
//! SSRCs oder Sequenznummern verwechselt werden koennen.

use serde::{Deserialize, Serialize};

/// Stabile Kennung einer Audio-Quelle (ein Sprecher / ein Stream)
///
/// Entspricht der Teilnehmer-ID des Transports, nicht der SSRC:
/// eine Quelle behaelt ihre ID auch wenn der Transport die SSRC wechselt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceId(pub u64);

impl SourceId {
    /// Gibt den inneren Wert zurueck
    pub fn inner(&self) -> u64 {
        self.0
    }
}

impl From<u64> for SourceId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for SourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "source:{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_id_display() {
        let id = SourceId(42);
        assert_eq!(id.to_string(), "source:42");
    }

    #[test]
    fn source_id_aus_u64() {
        let id: SourceId = 7u64.into();
        assert_eq!(id.inner(), 7);
    }

    #[test]
    fn source_ids_sortierbar() {
        let mut ids = vec![SourceId(3), SourceId(1), SourceId(2)];
        ids.sort();
        assert_eq!(ids, vec![SourceId(1), SourceId(2), SourceId(3)]);
    }
}
