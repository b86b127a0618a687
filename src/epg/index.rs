//! Lookup tables over schedule channel names

use super::normalize::{extract_keywords, is_generic_word, normalize};
use super::parser::ScheduleSnapshot;
use std::collections::HashMap;

/// One display name of a schedule channel, pre-tokenized for the fuzzy tiers
#[derive(Debug, Clone)]
pub struct AliasEntry {
    pub channel_id: String,
    pub name: String,
    /// Every keyword of the name, as [`extract_keywords`] returns them
    pub keywords: Vec<String>,
    /// Keywords longer than two characters, minus generic words like "tv" or "radio"
    pub informative: Vec<String>,
}

/// Exact and normalized name -> channel id maps, plus every alias in document order.
///
/// Built once per schedule; read-only afterwards. On name collisions the
/// channel appearing later in the document wins.
#[derive(Debug, Clone, Default)]
pub struct ResolutionIndex {
    exact: HashMap<String, String>,
    normalized: HashMap<String, String>,
    aliases: Vec<AliasEntry>,
}

impl ResolutionIndex {
    pub fn build(snapshot: &ScheduleSnapshot) -> Self {
        let mut index = Self::default();

        for channel in snapshot.channels() {
            for name in &channel.display_names {
                index.exact.insert(name.trim().to_lowercase(), channel.id.clone());

                let normalized = normalize(name);
                if !normalized.is_empty() {
                    index.normalized.insert(normalized, channel.id.clone());
                }

                let keywords = extract_keywords(name);
                let informative = keywords
                    .iter()
                    .filter(|k| k.chars().count() > 2 && !is_generic_word(k))
                    .cloned()
                    .collect();
                index.aliases.push(AliasEntry {
                    channel_id: channel.id.clone(),
                    name: name.clone(),
                    keywords,
                    informative,
                });
            }
        }

        index
    }

    /// Lookup by lowercased name
    pub fn exact(&self, lowercased: &str) -> Option<&str> {
        self.exact.get(lowercased).map(String::as_str)
    }

    /// Lookup by normalized name
    pub fn normalized(&self, normalized: &str) -> Option<&str> {
        self.normalized.get(normalized).map(String::as_str)
    }

    pub fn aliases(&self) -> &[AliasEntry] {
        &self.aliases
    }

    pub fn len(&self) -> usize {
        self.exact.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exact.is_empty()
    }
}
