//! Point-in-time programme queries
//!
//! Programme lists are sorted by start when the schedule is parsed, so
//! "what is on at `now`" is a binary search for the last programme that has
//! started. Intervals are half-open: a programme ending at 11:00 is no longer
//! current at 11:00:00.

use super::parser::{ProgramRecord, ScheduleSnapshot};
use super::time::TimeConverter;
use chrono::NaiveDateTime;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Cache granularity for `current`
pub const BUCKET_SECS: i64 = 60;

/// A programme with its times converted to host-local instants
#[derive(Debug, Clone, PartialEq)]
pub struct ProgramDescriptor {
    pub title: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub episode: Option<String>,
    pub start: NaiveDateTime,
    pub ends_at: NaiveDateTime,
}

impl ProgramDescriptor {
    fn from_record(record: &ProgramRecord, converter: &TimeConverter, now: NaiveDateTime) -> Self {
        Self {
            title: record.title.clone(),
            description: record.description.clone(),
            category: record.category.clone(),
            episode: record.episode.clone(),
            start: converter.parse_or(&record.start, now),
            ends_at: converter.parse_or(&record.stop, now),
        }
    }

    fn covers(&self, now: NaiveDateTime) -> bool {
        self.start <= now && now < self.ends_at
    }
}

/// Answer to "what is on now"
#[derive(Debug, Clone, PartialEq)]
pub enum ProgramStatus {
    /// Airing at the query instant
    Current(ProgramDescriptor),
    /// Nothing airing; this is the next programme to start
    Upcoming(ProgramDescriptor),
    /// No programme now or later
    Unavailable,
}

impl ProgramStatus {
    pub fn current(&self) -> Option<&ProgramDescriptor> {
        match self {
            ProgramStatus::Current(p) => Some(p),
            _ => None,
        }
    }

    /// Short label for a channel list row
    pub fn describe(&self) -> String {
        match self {
            ProgramStatus::Current(p) => {
                format!("{} • until {}", p.title, TimeConverter::format(p.ends_at))
            }
            ProgramStatus::Upcoming(p) => {
                format!("Next: {} at {}", p.title, TimeConverter::format(p.start))
            }
            ProgramStatus::Unavailable => "No schedule data".to_string(),
        }
    }

    /// Whether a cached answer is still right at `now`
    fn still_valid(&self, now: NaiveDateTime) -> bool {
        match self {
            ProgramStatus::Current(p) => p.covers(now),
            ProgramStatus::Upcoming(p) => now < p.start,
            ProgramStatus::Unavailable => true,
        }
    }
}

/// One row of a channel's schedule listing
#[derive(Debug, Clone, PartialEq)]
pub struct ListingEntry {
    pub program: ProgramDescriptor,
    pub is_current: bool,
}

#[derive(Debug, Clone)]
struct CachedProgram {
    status: ProgramStatus,
    label: String,
    bucket: i64,
}

/// Programme lookups over one schedule snapshot
pub struct ProgramQuery {
    snapshot: Arc<ScheduleSnapshot>,
    converter: Arc<TimeConverter>,
    ttl_secs: i64,
    listing_limit: usize,
    cache: Mutex<HashMap<(String, i64), CachedProgram>>,
}

impl ProgramQuery {
    pub fn new(
        snapshot: Arc<ScheduleSnapshot>,
        converter: Arc<TimeConverter>,
        ttl_secs: i64,
        listing_limit: usize,
    ) -> Self {
        Self {
            snapshot,
            converter,
            ttl_secs: ttl_secs.max(1),
            listing_limit: listing_limit.max(1),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// What is airing on `channel_id` at `now`, or what comes next
    pub fn current(&self, channel_id: &str, now: NaiveDateTime) -> ProgramStatus {
        self.cached(channel_id, now).status
    }

    /// Rendered form of [`current`](Self::current), e.g. "News • until 12:00"
    pub fn describe(&self, channel_id: &str, now: NaiveDateTime) -> String {
        self.cached(channel_id, now).label
    }

    /// Elapsed share of the current programme in `[0, 1]`; `None` when nothing airs
    pub fn progress_fraction(&self, channel_id: &str, now: NaiveDateTime) -> Option<f64> {
        let status = self.current(channel_id, now);
        let program = status.current()?;
        let total = (program.ends_at - program.start).num_milliseconds();
        if total <= 0 {
            return None;
        }
        let elapsed = (now - program.start).num_milliseconds();
        Some((elapsed as f64 / total as f64).clamp(0.0, 1.0))
    }

    /// Uncached lookup
    pub fn lookup(&self, channel_id: &str, now: NaiveDateTime) -> ProgramStatus {
        let Some(channel) = self.snapshot.channel(channel_id) else {
            return ProgramStatus::Unavailable;
        };
        let programs = &channel.programs;
        let start_of = |p: &ProgramRecord| self.converter.parse_or(&p.start, now);

        // First programme that starts after `now`
        let next = programs.partition_point(|p| start_of(p) <= now);

        if next > 0 {
            // Ties on start keep document order; the first one covering `now` wins
            let latest_start = start_of(&programs[next - 1]);
            let first_tied = programs[..next].partition_point(|p| start_of(p) < latest_start);
            for record in &programs[first_tied..next] {
                let candidate = ProgramDescriptor::from_record(record, &self.converter, now);
                if candidate.covers(now) {
                    return ProgramStatus::Current(candidate);
                }
            }

            // Overlapping data: an earlier, longer programme may still be airing
            for record in &programs[..first_tied] {
                let candidate = ProgramDescriptor::from_record(record, &self.converter, now);
                if candidate.covers(now) {
                    return ProgramStatus::Current(candidate);
                }
            }
        }

        match programs.get(next) {
            Some(record) => {
                ProgramStatus::Upcoming(ProgramDescriptor::from_record(record, &self.converter, now))
            }
            None => ProgramStatus::Unavailable,
        }
    }

    fn cached(&self, channel_id: &str, now: NaiveDateTime) -> CachedProgram {
        let bucket = now.and_utc().timestamp().div_euclid(BUCKET_SECS);
        let key = (channel_id.to_string(), bucket);

        if let Some(hit) = self.cache.lock().get(&key) {
            if hit.status.still_valid(now) {
                return hit.clone();
            }
        }

        let status = self.lookup(channel_id, now);
        let entry = CachedProgram {
            label: status.describe(),
            status,
            bucket,
        };

        let mut cache = self.cache.lock();
        let oldest = bucket - self.ttl_secs.div_euclid(BUCKET_SECS).max(1);
        cache.retain(|_, cached| cached.bucket > oldest);
        cache.insert(key, entry.clone());
        entry
    }

    /// Upcoming programmes, the first already started one flagged as current.
    ///
    /// When everything has ended the last programme is returned on its own.
    pub fn listing(&self, channel_id: &str, now: NaiveDateTime) -> Vec<ListingEntry> {
        let Some(channel) = self.snapshot.channel(channel_id) else {
            return Vec::new();
        };

        let mut entries = Vec::new();
        let mut found_current = false;

        for record in &channel.programs {
            let program = ProgramDescriptor::from_record(record, &self.converter, now);
            if program.ends_at <= now {
                continue;
            }
            let is_current = !found_current && program.start <= now;
            found_current |= is_current;
            entries.push(ListingEntry {
                program,
                is_current,
            });
            if entries.len() >= self.listing_limit {
                break;
            }
        }

        if entries.is_empty() {
            if let Some(last) = channel.programs.last() {
                entries.push(ListingEntry {
                    program: ProgramDescriptor::from_record(last, &self.converter, now),
                    is_current: false,
                });
            }
        }

        entries
    }

    /// Programmes overlapping `[from, to)`
    pub fn programs_in_range(
        &self,
        channel_id: &str,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> Vec<ProgramDescriptor> {
        self.snapshot
            .channel(channel_id)
            .map(|channel| {
                channel
                    .programs
                    .iter()
                    .map(|p| ProgramDescriptor::from_record(p, &self.converter, from))
                    .filter(|p| p.ends_at > from && p.start < to)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn cached_len(&self) -> usize {
        self.cache.lock().len()
    }

    /// Drop every cached answer
    pub fn invalidate(&self) {
        self.cache.lock().clear();
    }

    pub fn snapshot(&self) -> &Arc<ScheduleSnapshot> {
        &self.snapshot
    }
}
