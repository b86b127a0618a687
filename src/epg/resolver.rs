//! Playlist name -> schedule channel resolution
//!
//! Tiers run in order and the first hit wins:
//!
//! 1. exact lowercase name
//! 2. normalized name
//! 3. each of [`variants`] against the normalized map
//! 4. keyword overlap
//! 5. single-keyword similarity
//! 6. single-keyword similarity, looser, short aliases only
//! 7. configured alias table
//!
//! Every answer, including "no match", is remembered until the resolver is
//! replaced by a schedule reload.

use super::index::{AliasEntry, ResolutionIndex};
use super::normalize::{extract_keywords, is_generic_word, normalize, variants};
use super::parser::ScheduleSnapshot;
use crate::config::EngineConfig;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tracing::debug;

/// Which strategy matched a playlist name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchTier {
    Exact,
    Normalized,
    Variant,
    KeywordOverlap,
    Similarity,
    LooseSimilarity,
    ConfiguredAlias,
}

impl MatchTier {
    pub fn label(&self) -> &'static str {
        match self {
            MatchTier::Exact => "exact",
            MatchTier::Normalized => "normalized",
            MatchTier::Variant => "variant",
            MatchTier::KeywordOverlap => "keyword overlap",
            MatchTier::Similarity => "similarity",
            MatchTier::LooseSimilarity => "loose similarity",
            MatchTier::ConfiguredAlias => "configured alias",
        }
    }
}

/// A schedule channel matched to a playlist name
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedChannel {
    pub id: String,
    /// First display name in the schedule
    pub name: String,
    pub icon: Option<String>,
    pub tier: MatchTier,
}

/// Tunables for the fuzzy tiers
#[derive(Debug, Clone)]
pub struct MatchSettings {
    pub keyword_count_slack: usize,
    pub similarity_threshold: f64,
    pub loose_similarity_threshold: f64,
    pub loose_max_alias_keywords: usize,
    pub min_similarity_keyword_len: usize,
    /// (normalized fragment, channel id), sorted by fragment
    pub aliases: Vec<(String, String)>,
}

impl Default for MatchSettings {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

impl From<&EngineConfig> for MatchSettings {
    fn from(config: &EngineConfig) -> Self {
        let aliases = config
            .aliases
            .iter()
            .map(|(fragment, id)| (normalize(fragment), id.clone()))
            .filter(|(fragment, _)| !fragment.is_empty())
            .collect();
        Self {
            keyword_count_slack: config.keyword_count_slack,
            similarity_threshold: config.similarity_threshold,
            loose_similarity_threshold: config.loose_similarity_threshold,
            loose_max_alias_keywords: config.loose_max_alias_keywords,
            min_similarity_keyword_len: config.min_similarity_keyword_len,
            aliases,
        }
    }
}

/// What a tier sees
pub struct TierInput<'a> {
    pub name: &'a str,
    pub index: &'a ResolutionIndex,
    pub snapshot: &'a ScheduleSnapshot,
    pub settings: &'a MatchSettings,
}

/// One resolution strategy: a channel id or nothing
pub type Tier = fn(&TierInput<'_>) -> Option<String>;

/// Evaluated in order with early exit
pub const TIERS: &[(MatchTier, Tier)] = &[
    (MatchTier::Exact, exact_tier),
    (MatchTier::Normalized, normalized_tier),
    (MatchTier::Variant, variant_tier),
    (MatchTier::KeywordOverlap, keyword_overlap_tier),
    (MatchTier::Similarity, similarity_tier),
    (MatchTier::LooseSimilarity, loose_similarity_tier),
    (MatchTier::ConfiguredAlias, configured_alias_tier),
];

fn exact_tier(input: &TierInput<'_>) -> Option<String> {
    input.index.exact(&input.name.trim().to_lowercase()).map(str::to_string)
}

fn normalized_tier(input: &TierInput<'_>) -> Option<String> {
    let normalized = normalize(input.name);
    if normalized.is_empty() {
        return None;
    }
    input.index.normalized(&normalized).map(str::to_string)
}

fn variant_tier(input: &TierInput<'_>) -> Option<String> {
    variants(input.name)
        .iter()
        .find_map(|v| input.index.normalized(v))
        .map(str::to_string)
}

/// Keywords of the playlist name long enough to be meaningful
fn playlist_keywords(name: &str) -> Vec<String> {
    extract_keywords(name)
        .into_iter()
        .filter(|k| k.chars().count() > 2)
        .collect()
}

fn keyword_overlap_tier(input: &TierInput<'_>) -> Option<String> {
    let keywords = playlist_keywords(input.name);
    if keywords.is_empty() {
        return None;
    }
    let max_alias_keywords = keywords.len() + input.settings.keyword_count_slack;

    input
        .index
        .aliases()
        .iter()
        .filter(|alias| !alias.keywords.is_empty() && alias.keywords.len() <= max_alias_keywords)
        .find(|alias| {
            keywords.iter().all(|k| {
                alias
                    .keywords
                    .iter()
                    .any(|a| a.contains(k.as_str()) || k.contains(a.as_str()))
            })
        })
        .map(|alias| alias.channel_id.clone())
}

/// The single informative keyword of a name, if there is exactly one and it is long enough.
fn single_informative_keyword(name: &str, min_len: usize) -> Option<String> {
    let mut informative = playlist_keywords(name)
        .into_iter()
        .filter(|k| !is_generic_word(k));
    let keyword = informative.next()?;
    if informative.next().is_some() || keyword.chars().count() < min_len {
        return None;
    }
    Some(keyword)
}

fn similar_alias<'a>(
    keyword: &str,
    aliases: &'a [AliasEntry],
    threshold: f64,
    max_alias_keywords: Option<usize>,
) -> Option<&'a AliasEntry> {
    aliases
        .iter()
        .filter(|alias| max_alias_keywords.map_or(true, |max| alias.keywords.len() <= max))
        .find(|alias| {
            alias
                .informative
                .iter()
                .any(|a| strsim::normalized_levenshtein(keyword, a) >= threshold)
        })
}

fn similarity_tier(input: &TierInput<'_>) -> Option<String> {
    let keyword = single_informative_keyword(input.name, input.settings.min_similarity_keyword_len)?;
    similar_alias(
        &keyword,
        input.index.aliases(),
        input.settings.similarity_threshold,
        None,
    )
    .map(|alias| alias.channel_id.clone())
}

fn loose_similarity_tier(input: &TierInput<'_>) -> Option<String> {
    let keyword = single_informative_keyword(input.name, input.settings.min_similarity_keyword_len)?;
    similar_alias(
        &keyword,
        input.index.aliases(),
        input.settings.loose_similarity_threshold,
        Some(input.settings.loose_max_alias_keywords),
    )
    .map(|alias| alias.channel_id.clone())
}

fn configured_alias_tier(input: &TierInput<'_>) -> Option<String> {
    let normalized = normalize(input.name);
    if normalized.is_empty() {
        return None;
    }
    input
        .settings
        .aliases
        .iter()
        .filter(|(fragment, _)| normalized.contains(fragment.as_str()))
        .find(|(_, id)| input.snapshot.channel(id).is_some())
        .map(|(_, id)| id.clone())
}

/// Resolves playlist names against one schedule, memoizing every answer.
pub struct ChannelResolver {
    snapshot: Arc<ScheduleSnapshot>,
    index: Arc<ResolutionIndex>,
    settings: Arc<MatchSettings>,
    cache: Mutex<LruCache<String, Option<ResolvedChannel>>>,
}

impl ChannelResolver {
    pub fn new(
        snapshot: Arc<ScheduleSnapshot>,
        index: Arc<ResolutionIndex>,
        settings: Arc<MatchSettings>,
        cache_size: usize,
    ) -> Self {
        let capacity = NonZeroUsize::new(cache_size).unwrap_or(NonZeroUsize::MIN);
        Self {
            snapshot,
            index,
            settings,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Build the index for `snapshot` and a resolver over it.
    pub fn for_snapshot(
        snapshot: Arc<ScheduleSnapshot>,
        settings: Arc<MatchSettings>,
        cache_size: usize,
    ) -> Self {
        let index = Arc::new(ResolutionIndex::build(&snapshot));
        Self::new(snapshot, index, settings, cache_size)
    }

    /// Match a playlist channel name; `None` when nothing fits.
    pub fn resolve(&self, playlist_name: &str) -> Option<ResolvedChannel> {
        if let Some(hit) = self.cache.lock().get(playlist_name) {
            return hit.clone();
        }

        let resolved = self.resolve_uncached(playlist_name);
        self.cache.lock().put(playlist_name.to_string(), resolved.clone());
        resolved
    }

    fn resolve_uncached(&self, playlist_name: &str) -> Option<ResolvedChannel> {
        if playlist_name.trim().is_empty() {
            return None;
        }

        let input = TierInput {
            name: playlist_name,
            index: &self.index,
            snapshot: &self.snapshot,
            settings: &self.settings,
        };

        let (tier, id) = TIERS
            .iter()
            .find_map(|(tier, run)| run(&input).map(|id| (*tier, id)))?;
        let channel = self.snapshot.channel(&id)?;

        debug!(name = %playlist_name, id = %id, tier = tier.label(), "resolved channel");
        Some(ResolvedChannel {
            id,
            name: channel.name().to_string(),
            icon: channel.icon.clone(),
            tier,
        })
    }

    /// Whether `playlist_name` has already been resolved (hit or miss)
    pub fn is_cached(&self, playlist_name: &str) -> bool {
        self.cache.lock().contains(playlist_name)
    }

    pub fn cached_len(&self) -> usize {
        self.cache.lock().len()
    }

    /// Forget every memoized answer
    pub fn invalidate(&self) {
        self.cache.lock().clear();
    }

    pub fn index(&self) -> &ResolutionIndex {
        &self.index
    }

    pub fn snapshot(&self) -> &Arc<ScheduleSnapshot> {
        &self.snapshot
    }

    pub fn settings(&self) -> &Arc<MatchSettings> {
        &self.settings
    }
}
