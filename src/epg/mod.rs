//! EPG (Electronic Program Guide) module
//!
//! Contains the XMLTV parser, playlist name resolution and programme queries.

pub mod engine;
pub mod index;
pub mod normalize;
pub mod parser;
pub mod query;
pub mod resolver;
pub mod time;

#[cfg(test)]
mod engine_tests;
#[cfg(test)]
mod resolver_tests;

// Re-export public types
pub use engine::EpgEngine;
pub use parser::{
    ChannelRecord,
    ProgramRecord,
    ScheduleParser,
    ScheduleSnapshot,
    ScheduleStats,
};
pub use query::{ListingEntry, ProgramDescriptor, ProgramQuery, ProgramStatus};
pub use resolver::{ChannelResolver, MatchSettings, MatchTier, ResolvedChannel};
pub use time::TimeConverter;
