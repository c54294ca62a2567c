//! Presence registry: who is connected and what they can interpret.
//!
//! Entries are keyed by connection id and owned exclusively by this
//! registry; the gateway only ever holds the connection handle.
//! An IndexMap keeps insertion order so eligibility fan-out is
//! deterministic. All operations complete without suspension, so the
//! lock is never held across an await.

use crate::client::ConnId;
use external_services::LanguagePair;
use indexmap::IndexMap;
use std::sync::RwLock;
use tracing::debug;

/// Live capability metadata for a registered translator.
#[derive(Debug, Clone)]
pub struct TranslatorPresence {
    pub translator_id: String,
    pub languages: Vec<LanguagePair>,
    pub categories: Vec<String>,
    pub available: bool,
}

/// A connected participant.
#[derive(Debug, Clone)]
pub enum Participant {
    Client { participant_id: String },
    Translator(TranslatorPresence),
}

impl Participant {
    pub fn participant_id(&self) -> &str {
        match self {
            Participant::Client { participant_id } => participant_id,
            Participant::Translator(t) => &t.translator_id,
        }
    }

    pub fn is_translator(&self) -> bool {
        matches!(self, Participant::Translator(_))
    }
}

/// Registry of connected participants, keyed by connection id.
pub struct PresenceRegistry {
    entries: RwLock<IndexMap<ConnId, Participant>>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(IndexMap::new()),
        }
    }

    /// Insert or replace a client entry for this connection.
    pub fn register_client(&self, conn_id: ConnId, participant_id: impl Into<String>) {
        let participant_id = participant_id.into();
        debug!("Client {} registered on {}", participant_id, conn_id);
        self.entries
            .write()
            .unwrap()
            .insert(conn_id, Participant::Client { participant_id });
    }

    /// Insert or replace a translator entry for this connection.
    ///
    /// The capability profile is fetched from the record store by the
    /// gateway before this call; the registry itself never suspends.
    pub fn register_translator(&self, conn_id: ConnId, presence: TranslatorPresence) {
        debug!(
            "Translator {} registered on {} ({} language pairs, {} categories)",
            presence.translator_id,
            conn_id,
            presence.languages.len(),
            presence.categories.len()
        );
        self.entries
            .write()
            .unwrap()
            .insert(conn_id, Participant::Translator(presence));
    }

    /// Toggle a translator's availability. Returns the translator id
    /// if the handle had a translator entry, None otherwise (no-op).
    pub fn set_availability(&self, conn_id: &ConnId, available: bool) -> Option<String> {
        let mut entries = self.entries.write().unwrap();
        match entries.get_mut(conn_id) {
            Some(Participant::Translator(t)) => {
                t.available = available;
                Some(t.translator_id.clone())
            }
            _ => None,
        }
    }

    /// All available translators supporting the exact language pair
    /// and the category, in insertion order.
    pub fn find_eligible(
        &self,
        source_lang: &str,
        target_lang: &str,
        category: &str,
    ) -> Vec<(ConnId, TranslatorPresence)> {
        let entries = self.entries.read().unwrap();
        entries
            .iter()
            .filter_map(|(conn_id, participant)| match participant {
                Participant::Translator(t) if t.available => {
                    let language_match = t
                        .languages
                        .iter()
                        .any(|pair| pair.from == source_lang && pair.to == target_lang);
                    let category_match = t.categories.iter().any(|c| c == category);
                    if language_match && category_match {
                        Some((*conn_id, t.clone()))
                    } else {
                        None
                    }
                }
                _ => None,
            })
            .collect()
    }

    /// Mark the translator on this connection busy.
    pub fn mark_busy(&self, conn_id: &ConnId) {
        self.set_availability(conn_id, false);
    }

    /// Mark the translator on this connection available again.
    pub fn mark_available(&self, conn_id: &ConnId) {
        self.set_availability(conn_id, true);
    }

    /// Remove the entry for a disconnected participant, returning it
    /// so the caller can resolve any room bound to it.
    pub fn remove(&self, conn_id: &ConnId) -> Option<Participant> {
        // shift_remove keeps insertion order for the remaining entries
        self.entries.write().unwrap().shift_remove(conn_id)
    }

    /// Get the translator entry for a connection, if any.
    pub fn translator(&self, conn_id: &ConnId) -> Option<TranslatorPresence> {
        match self.entries.read().unwrap().get(conn_id) {
            Some(Participant::Translator(t)) => Some(t.clone()),
            _ => None,
        }
    }

    /// Count of all entries regardless of role or availability.
    pub fn online_count(&self) -> usize {
        self.entries.read().unwrap().len()
    }
}

impl Default for PresenceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
