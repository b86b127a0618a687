//! Matches playlist channel names to XMLTV schedule channels and answers
//! "what is on now" for them.

pub mod config;
pub mod epg;
pub mod error;

pub use config::{ConfigError, EngineConfig};
pub use epg::EpgEngine;
pub use error::EpgError;
