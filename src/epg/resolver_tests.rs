//! Tests for playlist name resolution

#[cfg(test)]
mod tests {
    use crate::epg::parser::ScheduleParser;
    use crate::epg::resolver::*;
    use std::sync::Arc;

    const SCHEDULE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<tv>
  <channel id="1"><display-name>Первый канал</display-name></channel>
  <channel id="42"><display-name>NTV HD</display-name><display-name>НТВ</display-name><icon src="http://example.com/ntv.png"/></channel>
  <channel id="ds"><display-name>Discovry Channel</display-name></channel>
  <channel id="dsc"><display-name>Discovery Science Channel Europe</display-name></channel>
  <channel id="euro"><display-name>Eurosport</display-name></channel>
  <channel id="nat"><display-name>National Geographic Wild</display-name></channel>
  <channel id="sporthd"><display-name>Sport HD</display-name></channel>
  <channel id="sport"><display-name>Sport</display-name></channel>
  <channel id="zv"><display-name>Zvezda</display-name></channel>
  <channel id="fri"><display-name>Friday!</display-name></channel>
</tv>"#;

    fn resolver_with(settings: MatchSettings) -> ChannelResolver {
        let snapshot = Arc::new(ScheduleParser::default().parse(SCHEDULE).unwrap());
        ChannelResolver::for_snapshot(snapshot, Arc::new(settings), 64)
    }

    fn resolver() -> ChannelResolver {
        resolver_with(MatchSettings::default())
    }

    fn resolved(resolver: &ChannelResolver, name: &str) -> Option<(String, MatchTier)> {
        resolver.resolve(name).map(|r| (r.id, r.tier))
    }

    #[test]
    fn test_exact_match_ignores_case() {
        let r = resolver();
        assert_eq!(resolved(&r, "первый КАНАЛ"), Some(("1".to_string(), MatchTier::Exact)));
    }

    #[test]
    fn test_normalized_match() {
        let r = resolver();
        assert_eq!(
            resolved(&r, "Первый канал HD +2"),
            Some(("1".to_string(), MatchTier::Normalized))
        );
    }

    #[test]
    fn test_decorated_cyrillic_name() {
        let r = resolver();
        let channel = r.resolve("НТВ (HD) +4").unwrap();
        assert_eq!(channel.id, "42");
        assert_eq!(channel.name, "NTV HD");
        assert_eq!(channel.icon.as_deref(), Some("http://example.com/ntv.png"));
    }

    #[test]
    fn test_exact_match_takes_precedence() {
        let r = resolver();
        // "sport" normalizes onto the plain Sport channel, but the exact alias wins
        assert_eq!(resolved(&r, "SPORT HD"), Some(("sporthd".to_string(), MatchTier::Exact)));
        assert_eq!(
            resolved(&r, "Sport FHD"),
            Some(("sport".to_string(), MatchTier::Normalized))
        );
    }

    #[test]
    fn test_variant_match() {
        let r = resolver();
        // Digits stripped: "eurosport 2" -> "eurosport"
        assert_eq!(resolved(&r, "Eurosport 2 HD"), Some(("euro".to_string(), MatchTier::Variant)));
    }

    #[test]
    fn test_keyword_overlap() {
        let r = resolver();
        assert_eq!(
            resolved(&r, "Nat Geo Wild HD"),
            Some(("nat".to_string(), MatchTier::KeywordOverlap))
        );
    }

    #[test]
    fn test_keyword_count_guard() {
        // Alias has 4 keywords, playlist name 2: over the default slack of 1
        assert_eq!(resolver().resolve("Discovery Science"), None);

        let relaxed = resolver_with(MatchSettings {
            keyword_count_slack: 2,
            ..MatchSettings::default()
        });
        assert_eq!(
            resolved(&relaxed, "Discovery Science"),
            Some(("dsc".to_string(), MatchTier::KeywordOverlap))
        );
    }

    #[test]
    fn test_keyword_count_includes_short_alias_words() {
        let xml = r#"<tv><channel id="f1"><display-name>Sky Sports F1 UK</display-name></channel></tv>"#;
        let snapshot = Arc::new(ScheduleParser::default().parse(xml).unwrap());

        // "f1" and "uk" count: 4 alias keywords against 2 + 1
        let strict = ChannelResolver::for_snapshot(snapshot.clone(), Arc::new(MatchSettings::default()), 8);
        assert_eq!(strict.resolve("Sky Sports"), None);

        let relaxed = ChannelResolver::for_snapshot(
            snapshot,
            Arc::new(MatchSettings {
                keyword_count_slack: 2,
                ..MatchSettings::default()
            }),
            8,
        );
        assert_eq!(
            resolved(&relaxed, "Sky Sports"),
            Some(("f1".to_string(), MatchTier::KeywordOverlap))
        );
    }

    #[test]
    fn test_similarity_first_alias_wins() {
        let r = resolver();
        // "discovery" vs "discovry" = 8/9, and Discovry Channel precedes the science channel
        assert_eq!(resolved(&r, "Discovery HD"), Some(("ds".to_string(), MatchTier::Similarity)));
    }

    #[test]
    fn test_loose_similarity() {
        let r = resolver();
        // "zvesda" vs "zvezda" = 5/6, below 0.85 but above 0.8
        assert_eq!(
            resolved(&r, "Zvesda HD"),
            Some(("zv".to_string(), MatchTier::LooseSimilarity))
        );
    }

    #[test]
    fn test_loose_similarity_skips_long_aliases() {
        let r = resolver();
        // "europa" vs "europe" only exists in a four-keyword alias
        assert_eq!(r.resolve("Europa"), None);
    }

    #[test]
    fn test_configured_alias() {
        let r = resolver_with(MatchSettings {
            aliases: vec![
                ("missing".to_string(), "nope".to_string()),
                ("пятница".to_string(), "fri".to_string()),
            ],
            ..MatchSettings::default()
        });
        assert_eq!(
            resolved(&r, "Пятница HD"),
            Some(("fri".to_string(), MatchTier::ConfiguredAlias))
        );
        // Alias pointing at a channel the schedule does not have
        assert_eq!(r.resolve("Missing Channel"), None);
    }

    #[test]
    fn test_settings_from_config_normalizes_alias_keys() {
        let mut config = crate::config::EngineConfig::default();
        config.aliases.insert("Пятница!".to_string(), "fri".to_string());
        config.aliases.insert("(HD)".to_string(), "x".to_string());
        let settings = MatchSettings::from(&config);
        assert_eq!(settings.aliases, vec![("пятница".to_string(), "fri".to_string())]);
    }

    #[test]
    fn test_unmatched_and_empty() {
        let r = resolver();
        assert_eq!(r.resolve("Unknown Channel XYZ"), None);
        assert_eq!(r.resolve(""), None);
        assert_eq!(r.resolve("   "), None);
    }

    #[test]
    fn test_results_are_memoized() {
        let r = resolver();
        assert!(!r.is_cached("Nat Geo Wild HD"));
        let first = r.resolve("Nat Geo Wild HD");
        assert!(r.is_cached("Nat Geo Wild HD"));
        assert_eq!(r.resolve("Nat Geo Wild HD"), first);

        // Misses are remembered too
        assert_eq!(r.resolve("Unknown Channel XYZ"), None);
        assert!(r.is_cached("Unknown Channel XYZ"));
        assert_eq!(r.cached_len(), 2);

        r.invalidate();
        assert_eq!(r.cached_len(), 0);
        assert_eq!(r.resolve("Nat Geo Wild HD"), first);
    }

    #[test]
    fn test_cache_is_bounded() {
        let snapshot = Arc::new(ScheduleParser::default().parse(SCHEDULE).unwrap());
        let r = ChannelResolver::for_snapshot(snapshot, Arc::new(MatchSettings::default()), 2);
        r.resolve("Sport");
        r.resolve("Eurosport");
        r.resolve("Zvezda");
        assert_eq!(r.cached_len(), 2);
        assert!(!r.is_cached("Sport"));
    }

    #[test]
    fn test_deterministic_across_resolvers() {
        let names = ["Nat Geo Wild HD", "Discovery HD", "Zvesda HD", "Europa", "НТВ (HD) +4"];
        let a = resolver();
        let b = resolver();
        for name in names {
            assert_eq!(a.resolve(name), b.resolve(name), "{}", name);
        }
    }

    #[test]
    fn test_tier_order() {
        let order: Vec<MatchTier> = TIERS.iter().map(|(tier, _)| *tier).collect();
        assert_eq!(
            order,
            vec![
                MatchTier::Exact,
                MatchTier::Normalized,
                MatchTier::Variant,
                MatchTier::KeywordOverlap,
                MatchTier::Similarity,
                MatchTier::LooseSimilarity,
                MatchTier::ConfiguredAlias,
            ]
        );
    }
}
