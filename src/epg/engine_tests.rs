//! Tests for schedule reload and cache lifecycle

#[cfg(test)]
mod tests {
    use crate::config::EngineConfig;
    use crate::epg::engine::*;
    use crate::epg::query::ProgramStatus;
    use crate::epg::resolver::MatchTier;
    use crate::epg::time::TimeConverter;
    use crate::error::EpgError;
    use chrono::{NaiveDate, NaiveDateTime};
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    const DAY_ONE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<tv>
  <channel id="42"><display-name>NTV HD</display-name><display-name>НТВ</display-name></channel>
  <channel id="7"><display-name>Discovery Channel</display-name></channel>
  <programme start="20240826100000 +0300" stop="20240826110000 +0300" channel="42"><title>Morning News</title></programme>
  <programme start="20240826110000 +0300" stop="20240826120000 +0300" channel="42"><title>Talk Show</title></programme>
</tv>"#;

    const DAY_TWO: &str = r#"<tv>
  <channel id="42"><display-name>NTV HD</display-name></channel>
  <programme start="20240826100000 +0300" stop="20240826120000 +0300" channel="42"><title>Marathon</title></programme>
</tv>"#;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 8, 26).unwrap().and_hms_opt(h, m, 0).unwrap()
    }

    /// Host at UTC+5, source at the default UTC+3
    fn engine() -> EpgEngine {
        let config = EngineConfig::default();
        let converter = TimeConverter::new(config.source_utc_offset_hours, 5 * 3600, 128);
        EpgEngine::with_converter(config, converter)
    }

    #[test]
    fn test_empty_engine() {
        let engine = engine();
        assert!(engine.snapshot().is_empty());
        assert_eq!(engine.resolve("NTV"), None);
        assert_eq!(engine.current("42", at(12, 0)), ProgramStatus::Unavailable);
        assert_eq!(engine.describe("42", at(12, 0)), "No schedule data");
    }

    #[test]
    fn test_reload_and_query() {
        let engine = engine();
        let stats = engine.reload(DAY_ONE).unwrap();
        assert_eq!(stats.channels, 2);
        assert_eq!(stats.programs, 2);

        let channel = engine.resolve("НТВ (HD) +4").unwrap();
        assert_eq!(channel.id, "42");

        // 10:00 at UTC+3 is 12:00 on the host
        assert_eq!(engine.describe(&channel.id, at(12, 30)), "Morning News • until 13:00");
        assert_eq!(engine.progress_fraction(&channel.id, at(12, 30)), Some(0.5));
        assert_eq!(engine.listing(&channel.id, at(12, 30)).len(), 2);
        assert_eq!(engine.programs_in_range(&channel.id, at(13, 0), at(14, 0)).len(), 1);
        assert_eq!(engine.stats(), stats);
    }

    #[test]
    fn test_reload_is_idempotent() {
        let engine = engine();
        let first = engine.reload(DAY_ONE).unwrap();
        let a = engine.resolve("Discovery HD");
        let second = engine.reload(DAY_ONE).unwrap();
        assert_eq!(first, second);
        assert_eq!(engine.cached_resolutions(), 0);
        assert_eq!(engine.resolve("Discovery HD"), a);
    }

    #[test]
    fn test_reload_clears_caches() {
        let engine = engine();
        engine.reload(DAY_ONE).unwrap();
        assert_eq!(engine.describe("42", at(12, 30)), "Morning News • until 13:00");
        engine.resolve("NTV HD");
        assert_eq!(engine.cached_resolutions(), 1);
        assert_eq!(engine.cached_programs(), 1);

        engine.reload(DAY_TWO).unwrap();
        assert_eq!(engine.cached_resolutions(), 0);
        assert_eq!(engine.cached_programs(), 0);
        assert_eq!(engine.describe("42", at(12, 30)), "Marathon • until 14:00");
        // Alias dropped by the new schedule
        assert_eq!(engine.resolve("НТВ"), None);
    }

    #[test]
    fn test_invalidate_keeps_schedule() {
        let engine = engine();
        engine.reload(DAY_ONE).unwrap();
        engine.resolve("Discovery Channel");
        engine.current("7", at(12, 0));
        engine.invalidate();
        assert_eq!(engine.cached_resolutions(), 0);
        assert_eq!(engine.cached_programs(), 0);
        assert_eq!(engine.snapshot().channels().len(), 2);
        assert_eq!(engine.resolve("Discovery Channel").map(|c| c.tier), Some(MatchTier::Exact));
    }

    #[test]
    fn test_failed_reload_keeps_previous_state() {
        let engine = engine();
        engine.reload(DAY_ONE).unwrap();
        engine.resolve("NTV HD");

        let err = engine.reload("<tv><channel id=\"x\">").unwrap_err();
        assert!(err.is_structural());
        assert!(matches!(
            engine.reload("<guide/>").unwrap_err(),
            EpgError::UnexpectedRoot(_)
        ));
        assert!(matches!(engine.reload("").unwrap_err(), EpgError::MissingRoot));

        assert_eq!(engine.stats().channels, 2);
        assert!(engine.cached_resolutions() > 0);
        assert_eq!(engine.resolve("NTV HD").map(|c| c.id), Some("42".to_string()));
    }

    #[test]
    fn test_reload_bytes_gzip() {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(DAY_TWO.as_bytes()).unwrap();
        let compressed = encoder.finish().unwrap();

        let engine = engine();
        let stats = engine.reload_bytes(&compressed).unwrap();
        assert_eq!(stats.programs, 1);

        let garbage = [0x1f, 0x8b, 0x00, 0x01, 0x02];
        let err = engine.reload_bytes(&garbage).unwrap_err();
        assert!(!err.is_structural());
        assert_eq!(engine.stats().programs, 1);
    }

    #[test]
    fn test_configured_alias_through_engine() {
        let mut config = EngineConfig::default();
        config.aliases.insert("муз".to_string(), "7".to_string());
        let engine = EpgEngine::with_converter(config, TimeConverter::new(3, 3 * 3600, 16));
        engine.reload(DAY_ONE).unwrap();
        let channel = engine.resolve("Муз ТВ").unwrap();
        assert_eq!(channel.id, "7");
        assert_eq!(channel.tier, MatchTier::ConfiguredAlias);
    }

    #[test]
    fn test_concurrent_readers_during_reload() {
        let engine = std::sync::Arc::new(engine());
        engine.reload(DAY_ONE).unwrap();

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let engine = engine.clone();
                std::thread::spawn(move || {
                    for _ in 0..200 {
                        let label = engine.describe("42", at(12, 30));
                        assert!(
                            label == "Morning News • until 13:00" || label == "Marathon • until 14:00",
                            "{}",
                            label
                        );
                    }
                })
            })
            .collect();

        for _ in 0..20 {
            engine.reload(DAY_TWO).unwrap();
            engine.reload(DAY_ONE).unwrap();
        }
        for reader in readers {
            reader.join().unwrap();
        }
    }

    #[test]
    fn test_invalidate_never_restores_replaced_schedule() {
        for _ in 0..50 {
            let engine = std::sync::Arc::new(engine());
            engine.reload(DAY_ONE).unwrap();

            let invalidator = {
                let engine = engine.clone();
                std::thread::spawn(move || {
                    for _ in 0..20 {
                        engine.invalidate();
                    }
                })
            };
            engine.reload(DAY_TWO).unwrap();
            invalidator.join().unwrap();

            // The last install was DAY_TWO; invalidation keeps whatever is current
            assert_eq!(engine.stats().channels, 1);
            assert_eq!(engine.describe("42", at(12, 30)), "Marathon • until 14:00");
        }
    }
}
