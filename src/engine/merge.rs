use crate::feed::types::{RawGameOdds, RawMarket, RawOutcome};
use crate::identity::{game_key, normalize_identifier, TeamRegistry};
use crate::models::{GameKey, Market, OddsQuote, Provider, Team};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};

/// Format an American price with the boundary sign convention: positive
/// values carry an explicit '+', negatives their natural '-'.
pub fn format_american(price: f64) -> String {
    let v = price.round() as i64;
    if v >= 0 {
        format!("+{}", v)
    } else {
        v.to_string()
    }
}

/// Spread lines follow the same sign convention as prices.
pub fn format_spread_line(point: f64) -> String {
    if point >= 0.0 {
        format!("+{}", point)
    } else {
        point.to_string()
    }
}

/// Total lines are magnitudes, not handicaps; no sign prefix.
pub fn format_total_line(point: f64) -> String {
    format!("{}", point)
}

/// One correlated game with the winning quote per market.
#[derive(Debug, Clone)]
pub struct MergedGame {
    pub key: GameKey,
    pub league: String,
    pub home_team_id: String,
    pub away_team_id: String,
    pub commence_time: Option<DateTime<Utc>>,
    pub markets: BTreeMap<Market, OddsQuote>,
}

#[derive(Debug, Default)]
pub struct MergeResult {
    pub games: Vec<MergedGame>,
    /// Provider records skipped because a team string failed to resolve.
    pub skipped_unmatched: usize,
}

struct Correlated<'a> {
    home: &'a Team,
    away: &'a Team,
    commence_time: Option<DateTime<Utc>>,
    /// Records in provider priority order (the correlation pass walks
    /// `Provider::PRIORITY`), so the per-market selection below only has
    /// to scan forward.
    records: Vec<(Provider, &'a RawGameOdds)>,
}

/// Merge raw per-provider batches into one canonical quote set per game
/// per market. Provider priority is fixed and total (primary > secondary
/// > scores feed, the latter moneyline-only); within a provider, the
/// bookmaker priority list decides; the first bookmaker with a validated
/// market wins.
pub fn merge_batches<'a>(
    registry: &'a TeamRegistry,
    league: &str,
    batches: &'a HashMap<Provider, Vec<RawGameOdds>>,
    bookmaker_priority: &[String],
    observed_at: DateTime<Utc>,
) -> MergeResult {
    let mut order: Vec<GameKey> = Vec::new();
    let mut correlated: HashMap<GameKey, Correlated<'a>> = HashMap::new();
    let mut skipped_unmatched = 0usize;

    for provider in Provider::PRIORITY {
        let Some(records) = batches.get(&provider) else { continue };
        for record in records {
            // Skip-unmatched policy: a provider team string that cannot be
            // resolved never becomes part of a correlation key.
            let away = match registry.resolve(&record.away_team, Some(league)) {
                Ok(t) => t,
                Err(_) => {
                    skipped_unmatched += 1;
                    tracing::debug!(provider = %provider, team = %record.away_team, "skipping unresolved away team");
                    continue;
                }
            };
            let home = match registry.resolve(&record.home_team, Some(league)) {
                Ok(t) => t,
                Err(_) => {
                    skipped_unmatched += 1;
                    tracing::debug!(provider = %provider, team = %record.home_team, "skipping unresolved home team");
                    continue;
                }
            };

            let key = game_key(away, home);
            let entry = correlated.entry(key.clone()).or_insert_with(|| {
                order.push(key.clone());
                Correlated {
                    home,
                    away,
                    commence_time: None,
                    records: Vec::new(),
                }
            });
            if entry.commence_time.is_none() {
                entry.commence_time = record.commence_time;
            }
            entry.records.push((provider, record));
        }
    }

    let mut games = Vec::with_capacity(order.len());
    for key in order {
        let c = &correlated[&key];
        let mut markets = BTreeMap::new();
        for market in Market::ALL {
            if let Some(quote) =
                select_quote(c, market, &key, registry, league, bookmaker_priority, observed_at)
            {
                markets.insert(market, quote);
            }
        }
        games.push(MergedGame {
            key,
            league: league.to_string(),
            home_team_id: c.home.id.clone(),
            away_team_id: c.away.id.clone(),
            commence_time: c.commence_time,
            markets,
        });
    }

    MergeResult { games, skipped_unmatched }
}

fn bookmaker_rank(key: &str, priority: &[String]) -> usize {
    priority
        .iter()
        .position(|p| p.eq_ignore_ascii_case(key))
        .unwrap_or(priority.len())
}

fn select_quote(
    c: &Correlated<'_>,
    market: Market,
    key: &GameKey,
    registry: &TeamRegistry,
    league: &str,
    bookmaker_priority: &[String],
    observed_at: DateTime<Utc>,
) -> Option<OddsQuote> {
    for (provider, record) in &c.records {
        if market != Market::Moneyline && provider.moneyline_only() {
            continue;
        }

        let mut bookmakers: Vec<_> = record.bookmakers.iter().collect();
        bookmakers.sort_by_key(|bm| bookmaker_rank(&bm.key, bookmaker_priority));

        for bm in bookmakers {
            let Some(raw) = bm.markets.iter().find(|m| m.market == market) else { continue };
            let validated = match market {
                Market::Moneyline | Market::Spread => {
                    validate_two_way(c.home, c.away, raw, market, registry, league)
                }
                Market::Total => validate_total(raw),
            };
            if let Some((line, home_price, away_price)) = validated {
                return Some(OddsQuote {
                    game_id: key.clone(),
                    market,
                    line,
                    home_price,
                    away_price,
                    source: *provider,
                    bookmaker: bm.key.clone(),
                    observed_at,
                });
            }
        }
    }
    None
}

/// Validate a two-way market: both outcomes must match the home and away
/// teams through the resolver (never raw string equality), with distinct
/// outcomes per side. Exact matches are assigned first and excluded from
/// the fuzzy pass, so one quote can never serve both sides.
fn validate_two_way(
    home: &Team,
    away: &Team,
    raw: &RawMarket,
    market: Market,
    registry: &TeamRegistry,
    league: &str,
) -> Option<(Option<String>, String, String)> {
    if raw.outcomes.len() < 2 {
        return None;
    }

    let (home_idx, away_idx) = match_sides(home, away, &raw.outcomes, registry, league)?;
    let home_out = &raw.outcomes[home_idx];
    let away_out = &raw.outcomes[away_idx];

    let home_price = home_out.price?;
    let away_price = away_out.price?;

    let line = match market {
        Market::Spread => Some(format_spread_line(home_out.point?)),
        _ => None,
    };

    Some((line, format_american(home_price), format_american(away_price)))
}

fn match_sides(
    home: &Team,
    away: &Team,
    outcomes: &[RawOutcome],
    registry: &TeamRegistry,
    league: &str,
) -> Option<(usize, usize)> {
    let mut home_idx: Option<usize> = None;
    let mut away_idx: Option<usize> = None;

    // Exact pass: full resolver lookup of the outcome name.
    for (i, out) in outcomes.iter().enumerate() {
        if let Ok(team) = registry.resolve(&out.name, Some(league)) {
            if team.id == home.id && home_idx.is_none() {
                home_idx = Some(i);
            } else if team.id == away.id && away_idx.is_none() {
                away_idx = Some(i);
            }
        }
    }

    // Fuzzy pass over the leftovers: normalized containment against the
    // canonical name, skipping ambiguous outcomes and anything already
    // claimed by the exact pass.
    for (i, out) in outcomes.iter().enumerate() {
        if home_idx == Some(i) || away_idx == Some(i) {
            continue;
        }
        let norm = normalize_identifier(&out.name);
        if norm.is_empty() {
            continue;
        }
        let hits_home = fuzzy_match(&norm, home);
        let hits_away = fuzzy_match(&norm, away);
        if hits_home && hits_away {
            continue;
        }
        if hits_home && home_idx.is_none() {
            home_idx = Some(i);
        } else if hits_away && away_idx.is_none() {
            away_idx = Some(i);
        }
    }

    match (home_idx, away_idx) {
        (Some(h), Some(a)) if h != a => Some((h, a)),
        _ => None,
    }
}

fn fuzzy_match(norm_outcome: &str, team: &Team) -> bool {
    let canonical = normalize_identifier(&team.canonical_name);
    canonical.contains(norm_outcome) || norm_outcome.contains(&canonical)
}

/// Validate a totals market: both an Over and an Under outcome with
/// prices, plus a line.
fn validate_total(raw: &RawMarket) -> Option<(Option<String>, String, String)> {
    let over_idx = raw
        .outcomes
        .iter()
        .position(|o| o.name.eq_ignore_ascii_case("over"))?;
    let under_idx = raw
        .outcomes
        .iter()
        .position(|o| o.name.eq_ignore_ascii_case("under"))?;
    if over_idx == under_idx {
        return None;
    }

    let over = &raw.outcomes[over_idx];
    let under = &raw.outcomes[under_idx];
    let over_price = over.price?;
    let under_price = under.price?;
    let line = over.point.or(under.point)?;

    Some((
        Some(format_total_line(line)),
        format_american(over_price),
        format_american(under_price),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::types::RawBookmaker;
    use std::collections::HashSet;

    fn team(id: &str, name: &str, aliases: &[&str]) -> Team {
        Team {
            id: id.to_string(),
            canonical_name: name.to_string(),
            league: "nfl".to_string(),
            aliases: aliases.iter().map(|s| s.to_string()).collect::<HashSet<_>>(),
            external_ids: Default::default(),
        }
    }

    fn registry() -> TeamRegistry {
        TeamRegistry::from_teams(vec![
            team("nfl-kc", "Kansas City Chiefs", &["Chiefs", "KC", "Kansas City"]),
            team("nfl-buf", "Buffalo Bills", &["Bills", "BUF", "Buffalo"]),
            team("nfl-lar", "Los Angeles Rams", &["Rams", "LAR"]),
            team("nfl-lac", "Los Angeles Chargers", &["Chargers", "LAC"]),
        ])
        .unwrap()
    }

    fn two_way(market: Market, outcomes: Vec<RawOutcome>) -> RawMarket {
        RawMarket { market, outcomes }
    }

    fn outcome(name: &str, price: Option<f64>, point: Option<f64>) -> RawOutcome {
        RawOutcome { name: name.to_string(), price, point }
    }

    fn record(
        provider: Provider,
        home: &str,
        away: &str,
        bookmakers: Vec<RawBookmaker>,
    ) -> RawGameOdds {
        RawGameOdds {
            provider,
            league: "nfl".to_string(),
            home_team: home.to_string(),
            away_team: away.to_string(),
            commence_time: None,
            bookmakers,
        }
    }

    fn book(key: &str, markets: Vec<RawMarket>) -> RawBookmaker {
        RawBookmaker { key: key.to_string(), markets }
    }

    #[test]
    fn test_format_american_sign_convention() {
        assert_eq!(format_american(150.0), "+150");
        assert_eq!(format_american(-135.0), "-135");
        assert_eq!(format_american(100.0), "+100");
    }

    #[test]
    fn test_format_lines() {
        assert_eq!(format_spread_line(3.5), "+3.5");
        assert_eq!(format_spread_line(-2.5), "-2.5");
        assert_eq!(format_spread_line(0.0), "+0");
        assert_eq!(format_total_line(47.5), "47.5");
        assert_eq!(format_total_line(44.0), "44");
    }

    #[test]
    fn test_secondary_provider_fills_missing_spread() {
        // Provider A has moneyline only; Provider B has a valid spread.
        let reg = registry();
        let mut batches = HashMap::new();
        batches.insert(
            Provider::JsonOdds,
            vec![record(
                Provider::JsonOdds,
                "Kansas City Chiefs",
                "Buffalo Bills",
                vec![book(
                    "jsonodds-consensus",
                    vec![two_way(
                        Market::Moneyline,
                        vec![
                            outcome("Kansas City Chiefs", Some(-135.0), None),
                            outcome("Buffalo Bills", Some(115.0), None),
                        ],
                    )],
                )],
            )],
        );
        batches.insert(
            Provider::OddsApi,
            vec![record(
                Provider::OddsApi,
                "Kansas City Chiefs",
                "Buffalo Bills",
                vec![book(
                    "draftkings",
                    vec![two_way(
                        Market::Spread,
                        vec![
                            outcome("Kansas City Chiefs", Some(-110.0), Some(-2.5)),
                            outcome("Buffalo Bills", Some(-110.0), Some(2.5)),
                        ],
                    )],
                )],
            )],
        );

        let result = merge_batches(&reg, "nfl", &batches, &[], Utc::now());
        assert_eq!(result.games.len(), 1);
        let game = &result.games[0];
        let ml = &game.markets[&Market::Moneyline];
        assert_eq!(ml.source, Provider::JsonOdds);
        assert_eq!(ml.home_price, "-135");
        assert_eq!(ml.away_price, "+115");
        let spread = &game.markets[&Market::Spread];
        assert_eq!(spread.source, Provider::OddsApi);
        assert_eq!(spread.line.as_deref(), Some("-2.5"));
    }

    #[test]
    fn test_no_line_sentinel_falls_through_to_next_provider() {
        // Provider A carries the market but with no usable price (sentinel
        // parsed to None upstream); Provider B must win.
        let reg = registry();
        let mut batches = HashMap::new();
        batches.insert(
            Provider::JsonOdds,
            vec![record(
                Provider::JsonOdds,
                "Kansas City Chiefs",
                "Buffalo Bills",
                vec![book(
                    "jsonodds-consensus",
                    vec![two_way(
                        Market::Moneyline,
                        vec![
                            outcome("Kansas City Chiefs", None, None),
                            outcome("Buffalo Bills", Some(115.0), None),
                        ],
                    )],
                )],
            )],
        );
        batches.insert(
            Provider::OddsApi,
            vec![record(
                Provider::OddsApi,
                "Kansas City Chiefs",
                "Buffalo Bills",
                vec![book(
                    "fanduel",
                    vec![two_way(
                        Market::Moneyline,
                        vec![
                            outcome("Kansas City Chiefs", Some(-140.0), None),
                            outcome("Buffalo Bills", Some(120.0), None),
                        ],
                    )],
                )],
            )],
        );

        let result = merge_batches(&reg, "nfl", &batches, &[], Utc::now());
        let ml = &result.games[0].markets[&Market::Moneyline];
        assert_eq!(ml.source, Provider::OddsApi);
        assert_eq!(ml.home_price, "-140");
    }

    #[test]
    fn test_bookmaker_priority_within_provider() {
        let reg = registry();
        let mut batches = HashMap::new();
        batches.insert(
            Provider::OddsApi,
            vec![record(
                Provider::OddsApi,
                "Kansas City Chiefs",
                "Buffalo Bills",
                vec![
                    book(
                        "barstool",
                        vec![two_way(
                            Market::Moneyline,
                            vec![
                                outcome("Kansas City Chiefs", Some(-150.0), None),
                                outcome("Buffalo Bills", Some(130.0), None),
                            ],
                        )],
                    ),
                    book(
                        "draftkings",
                        vec![two_way(
                            Market::Moneyline,
                            vec![
                                outcome("Kansas City Chiefs", Some(-135.0), None),
                                outcome("Buffalo Bills", Some(115.0), None),
                            ],
                        )],
                    ),
                ],
            )],
        );

        let priority = vec!["draftkings".to_string(), "fanduel".to_string()];
        let result = merge_batches(&reg, "nfl", &batches, &priority, Utc::now());
        let ml = &result.games[0].markets[&Market::Moneyline];
        assert_eq!(ml.bookmaker, "draftkings");
        assert_eq!(ml.home_price, "-135");
    }

    #[test]
    fn test_invalid_market_skipped_for_next_bookmaker() {
        // First-priority bookmaker has only one outcome; market is rejected
        // and the search continues.
        let reg = registry();
        let mut batches = HashMap::new();
        batches.insert(
            Provider::OddsApi,
            vec![record(
                Provider::OddsApi,
                "Kansas City Chiefs",
                "Buffalo Bills",
                vec![
                    book(
                        "draftkings",
                        vec![two_way(
                            Market::Moneyline,
                            vec![outcome("Kansas City Chiefs", Some(-135.0), None)],
                        )],
                    ),
                    book(
                        "fanduel",
                        vec![two_way(
                            Market::Moneyline,
                            vec![
                                outcome("Chiefs", Some(-130.0), None),
                                outcome("Bills", Some(110.0), None),
                            ],
                        )],
                    ),
                ],
            )],
        );

        let priority = vec!["draftkings".to_string(), "fanduel".to_string()];
        let result = merge_batches(&reg, "nfl", &batches, &priority, Utc::now());
        let ml = &result.games[0].markets[&Market::Moneyline];
        assert_eq!(ml.bookmaker, "fanduel");
    }

    #[test]
    fn test_score_feed_is_moneyline_fallback_only() {
        let reg = registry();
        let mut batches = HashMap::new();
        batches.insert(
            Provider::ScoreFeed,
            vec![record(
                Provider::ScoreFeed,
                "Kansas City Chiefs",
                "Buffalo Bills",
                vec![book(
                    "espn-consensus",
                    vec![
                        two_way(
                            Market::Moneyline,
                            vec![
                                outcome("Kansas City Chiefs", Some(-135.0), None),
                                outcome("Buffalo Bills", Some(115.0), None),
                            ],
                        ),
                        // Even if a spread somehow appeared, it must be ignored.
                        two_way(
                            Market::Spread,
                            vec![
                                outcome("Kansas City Chiefs", Some(-110.0), Some(-2.5)),
                                outcome("Buffalo Bills", Some(-110.0), Some(2.5)),
                            ],
                        ),
                    ],
                )],
            )],
        );

        let result = merge_batches(&reg, "nfl", &batches, &[], Utc::now());
        let game = &result.games[0];
        assert!(game.markets.contains_key(&Market::Moneyline));
        assert!(!game.markets.contains_key(&Market::Spread));
    }

    #[test]
    fn test_unresolved_provider_record_is_skipped_not_fabricated() {
        let reg = registry();
        let mut batches = HashMap::new();
        batches.insert(
            Provider::JsonOdds,
            vec![
                record(
                    Provider::JsonOdds,
                    "Gotham Knights",
                    "Buffalo Bills",
                    vec![],
                ),
                record(
                    Provider::JsonOdds,
                    "Kansas City Chiefs",
                    "Buffalo Bills",
                    vec![book(
                        "jsonodds-consensus",
                        vec![two_way(
                            Market::Moneyline,
                            vec![
                                outcome("Kansas City Chiefs", Some(-135.0), None),
                                outcome("Buffalo Bills", Some(115.0), None),
                            ],
                        )],
                    )],
                ),
            ],
        );

        let result = merge_batches(&reg, "nfl", &batches, &[], Utc::now());
        assert_eq!(result.skipped_unmatched, 1);
        assert_eq!(result.games.len(), 1);
        assert_eq!(result.games[0].key.0, "nfl-buf|nfl-kc");
    }

    #[test]
    fn test_exact_match_excludes_outcome_from_fuzzy_pass() {
        // "Los Angeles Rams" matches the home side exactly; the fuzzy pass
        // must not hand the same outcome to the away side even though
        // "Los Angeles Chargers" would fuzzy-match a bare "Los Angeles".
        let reg = registry();
        let home = reg.resolve("Rams", Some("nfl")).unwrap();
        let away = reg.resolve("Chargers", Some("nfl")).unwrap();

        let raw = two_way(
            Market::Moneyline,
            vec![
                outcome("Los Angeles Rams", Some(-120.0), None),
                outcome("Los Angeles C", Some(100.0), None),
            ],
        );
        let (h, a) = match_sides(home, away, &raw.outcomes, &reg, "nfl").unwrap();
        assert_eq!(h, 0);
        assert_eq!(a, 1);
    }

    #[test]
    fn test_ambiguous_fuzzy_outcome_rejected() {
        // A bare "Los Angeles" matches both LA teams; the market must be
        // rejected rather than guessed.
        let reg = registry();
        let home = reg.resolve("Rams", Some("nfl")).unwrap();
        let away = reg.resolve("Chargers", Some("nfl")).unwrap();

        let outcomes = vec![
            outcome("Los Angeles", Some(-120.0), None),
            outcome("Los Angeles", Some(100.0), None),
        ];
        assert!(match_sides(home, away, &outcomes, &reg, "nfl").is_none());
    }

    #[test]
    fn test_totals_require_over_and_under() {
        let valid = two_way(
            Market::Total,
            vec![
                outcome("Over", Some(-108.0), Some(47.5)),
                outcome("Under", Some(-112.0), Some(47.5)),
            ],
        );
        let (line, over, under) = validate_total(&valid).unwrap();
        assert_eq!(line.as_deref(), Some("47.5"));
        assert_eq!(over, "-108");
        assert_eq!(under, "-112");

        let missing_under = two_way(
            Market::Total,
            vec![outcome("Over", Some(-108.0), Some(47.5))],
        );
        assert!(validate_total(&missing_under).is_none());
    }
}
