//! Engine facade: owns the loaded schedule and swaps it on reload
//!
//! A generation bundles one snapshot with the resolver and programme query
//! built over it. Readers take a cheap `Arc` clone of the current generation;
//! `reload` and `invalidate` build a fresh one and swap it in, so a reader
//! never sees a new snapshot paired with stale cache entries.

use super::parser::{ScheduleParser, ScheduleSnapshot, ScheduleStats};
use super::query::{ListingEntry, ProgramDescriptor, ProgramQuery, ProgramStatus};
use super::resolver::{ChannelResolver, MatchSettings, ResolvedChannel};
use super::time::TimeConverter;
use crate::config::EngineConfig;
use crate::error::EpgError;
use chrono::NaiveDateTime;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info, warn};

struct Generation {
    resolver: ChannelResolver,
    query: ProgramQuery,
}

impl Generation {
    fn build(
        snapshot: Arc<ScheduleSnapshot>,
        config: &EngineConfig,
        settings: &Arc<MatchSettings>,
        converter: &Arc<TimeConverter>,
    ) -> Self {
        Self {
            resolver: ChannelResolver::for_snapshot(
                snapshot.clone(),
                settings.clone(),
                config.resolution_cache_size,
            ),
            query: ProgramQuery::new(
                snapshot,
                converter.clone(),
                config.program_cache_ttl_secs,
                config.listing_limit,
            ),
        }
    }

    fn snapshot(&self) -> &Arc<ScheduleSnapshot> {
        self.query.snapshot()
    }
}

/// Channel resolution and programme queries over a replaceable schedule.
pub struct EpgEngine {
    config: EngineConfig,
    parser: ScheduleParser,
    settings: Arc<MatchSettings>,
    converter: Arc<TimeConverter>,
    current: RwLock<Arc<Generation>>,
}

impl EpgEngine {
    /// Engine with an empty schedule, converting times into the host's offset.
    pub fn new(config: EngineConfig) -> Self {
        let config = config.sanitized();
        let converter = TimeConverter::from_host(config.source_utc_offset_hours, config.timestamp_cache_size)
            .with_embedded_offset(config.use_embedded_offset);
        Self::with_converter(config, converter)
    }

    /// Engine using an explicit converter, e.g. one with a fixed host offset.
    pub fn with_converter(config: EngineConfig, converter: TimeConverter) -> Self {
        let config = config.sanitized();
        let settings = Arc::new(MatchSettings::from(&config));
        let converter = Arc::new(converter);
        let generation = Generation::build(
            Arc::new(ScheduleSnapshot::new()),
            &config,
            &settings,
            &converter,
        );
        Self {
            parser: ScheduleParser::new(config.placeholder_title.clone()),
            config,
            settings,
            converter,
            current: RwLock::new(Arc::new(generation)),
        }
    }

    fn generation(&self) -> Arc<Generation> {
        self.current.read().clone()
    }

    fn install(&self, snapshot: ScheduleSnapshot) -> ScheduleStats {
        let stats = snapshot.stats().clone();
        let generation = Generation::build(Arc::new(snapshot), &self.config, &self.settings, &self.converter);
        *self.current.write() = Arc::new(generation);
        info!(
            channels = stats.channels,
            programs = stats.programs,
            skipped_channels = stats.skipped_channels,
            skipped_programmes = stats.skipped_programmes,
            "schedule installed"
        );
        stats
    }

    fn rejected(&self, err: EpgError) -> EpgError {
        warn!(error = %err, structural = err.is_structural(), "schedule reload rejected, keeping previous");
        err
    }

    /// Replace the schedule with `document` and clear both caches.
    ///
    /// On error nothing changes: the previous schedule and caches stay in place.
    pub fn reload(&self, document: &str) -> Result<ScheduleStats, EpgError> {
        match self.parser.parse(document) {
            Ok(snapshot) => Ok(self.install(snapshot)),
            Err(err) => Err(self.rejected(err)),
        }
    }

    /// Like [`reload`](Self::reload), for raw or gzip-compressed bytes.
    pub fn reload_bytes(&self, bytes: &[u8]) -> Result<ScheduleStats, EpgError> {
        match self.parser.parse_bytes(bytes) {
            Ok(snapshot) => Ok(self.install(snapshot)),
            Err(err) => Err(self.rejected(err)),
        }
    }

    /// Drop every cached resolution and programme answer, keeping the schedule.
    pub fn invalidate(&self) {
        // Held throughout so a concurrent reload cannot be overwritten with the old snapshot
        let mut current = self.current.write();
        let snapshot = current.snapshot().clone();
        *current = Arc::new(Generation::build(snapshot, &self.config, &self.settings, &self.converter));
        debug!("caches invalidated");
    }

    pub fn resolve(&self, playlist_name: &str) -> Option<ResolvedChannel> {
        self.generation().resolver.resolve(playlist_name)
    }

    pub fn current(&self, channel_id: &str, now: NaiveDateTime) -> ProgramStatus {
        self.generation().query.current(channel_id, now)
    }

    pub fn progress_fraction(&self, channel_id: &str, now: NaiveDateTime) -> Option<f64> {
        self.generation().query.progress_fraction(channel_id, now)
    }

    pub fn describe(&self, channel_id: &str, now: NaiveDateTime) -> String {
        self.generation().query.describe(channel_id, now)
    }

    pub fn listing(&self, channel_id: &str, now: NaiveDateTime) -> Vec<ListingEntry> {
        self.generation().query.listing(channel_id, now)
    }

    pub fn programs_in_range(
        &self,
        channel_id: &str,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> Vec<ProgramDescriptor> {
        self.generation().query.programs_in_range(channel_id, from, to)
    }

    pub fn stats(&self) -> ScheduleStats {
        self.generation().snapshot().stats().clone()
    }

    pub fn snapshot(&self) -> Arc<ScheduleSnapshot> {
        self.generation().snapshot().clone()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Resolution answers held in the current generation
    pub fn cached_resolutions(&self) -> usize {
        self.generation().resolver.cached_len()
    }

    /// Programme answers held in the current generation
    pub fn cached_programs(&self) -> usize {
        self.generation().query.cached_len()
    }
}

impl Default for EpgEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}
