use super::types::*;
use super::OddsFeed;
use crate::models::{Market, Provider};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::Client;
use std::time::Duration;

/// Primary odds feed. Serves one aggregated line set per game with
/// moneyline/spread/total as American-odds strings, using "0" as its
/// explicit no-line sentinel.
pub struct JsonOddsFeed {
    client: Client,
    api_key: String,
    base_url: String,
}

/// Map our internal league key to the JsonOdds sport path segment.
fn api_sport_key(league: &str) -> &str {
    match league {
        "nfl" => "NFL",
        "nba" => "NBA",
        "mlb" => "MLB",
        "nhl" => "NHL",
        "ncaaf" => "NCAAFB",
        "ncaab" => "NCAAB",
        _ => league,
    }
}

/// JsonOdds timestamps come without an offset; the feed documents UTC.
fn parse_match_time(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

#[derive(Debug, serde::Deserialize)]
struct JoEvent {
    #[serde(rename = "HomeTeam")]
    home_team: String,
    #[serde(rename = "AwayTeam")]
    away_team: String,
    #[serde(rename = "MatchTime", default)]
    match_time: Option<String>,
    #[serde(rename = "Odds", default)]
    odds: Vec<JoOdds>,
}

#[derive(Debug, serde::Deserialize)]
struct JoOdds {
    #[serde(rename = "OddType", default)]
    odd_type: String,
    #[serde(rename = "MoneyLineHome", default)]
    moneyline_home: String,
    #[serde(rename = "MoneyLineAway", default)]
    moneyline_away: String,
    #[serde(rename = "PointSpreadHome", default)]
    point_spread_home: String,
    #[serde(rename = "PointSpreadAway", default)]
    point_spread_away: String,
    #[serde(rename = "PointSpreadHomeLine", default)]
    point_spread_home_line: String,
    #[serde(rename = "PointSpreadAwayLine", default)]
    point_spread_away_line: String,
    #[serde(rename = "TotalNumber", default)]
    total_number: String,
    #[serde(rename = "OverLine", default)]
    over_line: String,
    #[serde(rename = "UnderLine", default)]
    under_line: String,
}

impl JsonOddsFeed {
    pub fn new(api_key: String, base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build jsonodds http client")?;
        Ok(Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn convert(event: JoEvent, league: &str) -> Option<RawGameOdds> {
        // Full-game lines only; ignore halves/quarters entries.
        let game_odds = event
            .odds
            .iter()
            .find(|o| o.odd_type.is_empty() || o.odd_type.eq_ignore_ascii_case("Game"))?;

        let mut markets = Vec::new();

        markets.push(RawMarket {
            market: Market::Moneyline,
            outcomes: vec![
                RawOutcome {
                    name: event.home_team.clone(),
                    price: parse_american(&game_odds.moneyline_home),
                    point: None,
                },
                RawOutcome {
                    name: event.away_team.clone(),
                    price: parse_american(&game_odds.moneyline_away),
                    point: None,
                },
            ],
        });

        markets.push(RawMarket {
            market: Market::Spread,
            outcomes: vec![
                RawOutcome {
                    name: event.home_team.clone(),
                    price: parse_american(&game_odds.point_spread_home_line),
                    point: parse_point(&game_odds.point_spread_home),
                },
                RawOutcome {
                    name: event.away_team.clone(),
                    price: parse_american(&game_odds.point_spread_away_line),
                    point: parse_point(&game_odds.point_spread_away),
                },
            ],
        });

        markets.push(RawMarket {
            market: Market::Total,
            outcomes: vec![
                RawOutcome {
                    name: "Over".to_string(),
                    price: parse_american(&game_odds.over_line),
                    point: parse_point(&game_odds.total_number),
                },
                RawOutcome {
                    name: "Under".to_string(),
                    price: parse_american(&game_odds.under_line),
                    point: parse_point(&game_odds.total_number),
                },
            ],
        });

        Some(RawGameOdds {
            provider: Provider::JsonOdds,
            league: league.to_string(),
            home_team: event.home_team,
            away_team: event.away_team,
            commence_time: event.match_time.as_deref().and_then(parse_match_time),
            bookmakers: vec![RawBookmaker {
                key: "jsonodds-consensus".to_string(),
                markets,
            }],
        })
    }
}

#[async_trait]
impl OddsFeed for JsonOddsFeed {
    fn provider(&self) -> Provider {
        Provider::JsonOdds
    }

    async fn fetch_odds(&self, league: &str) -> Result<Vec<RawGameOdds>> {
        let url = format!(
            "{}/api/odds/{}?oddType=Game",
            self.base_url,
            api_sport_key(league)
        );

        let resp = self
            .client
            .get(&url)
            .header("x-api-key", &self.api_key)
            .send()
            .await
            .context("jsonodds request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("jsonodds {} ({}): {}", league, status, body);
        }

        let events: Vec<JoEvent> = resp
            .json()
            .await
            .context("failed to parse jsonodds response")?;

        Ok(events
            .into_iter()
            .filter_map(|e| Self::convert(e, league))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event() -> JoEvent {
        serde_json::from_str(
            r#"{
                "HomeTeam": "Kansas City Chiefs",
                "AwayTeam": "Buffalo Bills",
                "MatchTime": "2026-01-18T18:30:00",
                "Odds": [
                    {
                        "OddType": "Game",
                        "MoneyLineHome": "-135",
                        "MoneyLineAway": "+115",
                        "PointSpreadHome": "-2.5",
                        "PointSpreadAway": "+2.5",
                        "PointSpreadHomeLine": "-110",
                        "PointSpreadAwayLine": "-110",
                        "TotalNumber": "47.5",
                        "OverLine": "-108",
                        "UnderLine": "-112"
                    }
                ]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_convert_builds_three_markets() {
        let raw = JsonOddsFeed::convert(sample_event(), "nfl").unwrap();
        assert_eq!(raw.provider, Provider::JsonOdds);
        assert_eq!(raw.bookmakers.len(), 1);
        let markets = &raw.bookmakers[0].markets;
        assert_eq!(markets.len(), 3);

        let spread = markets.iter().find(|m| m.market == Market::Spread).unwrap();
        assert_eq!(spread.outcomes[0].point, Some(-2.5));
        assert_eq!(spread.outcomes[1].point, Some(2.5));

        let total = markets.iter().find(|m| m.market == Market::Total).unwrap();
        assert_eq!(total.outcomes[0].name, "Over");
        assert_eq!(total.outcomes[0].point, Some(47.5));
    }

    #[test]
    fn test_convert_maps_no_line_sentinel_to_none() {
        let mut event = sample_event();
        event.odds[0].moneyline_home = "0".to_string();
        event.odds[0].total_number = "-".to_string();
        let raw = JsonOddsFeed::convert(event, "nfl").unwrap();
        let markets = &raw.bookmakers[0].markets;
        let ml = markets.iter().find(|m| m.market == Market::Moneyline).unwrap();
        assert_eq!(ml.outcomes[0].price, None);
        let total = markets.iter().find(|m| m.market == Market::Total).unwrap();
        assert_eq!(total.outcomes[0].point, None);
    }

    #[test]
    fn test_convert_skips_events_without_game_lines() {
        let mut event = sample_event();
        event.odds[0].odd_type = "FirstHalf".to_string();
        assert!(JsonOddsFeed::convert(event, "nfl").is_none());
    }

    #[test]
    fn test_parse_match_time_naive_utc() {
        let dt = parse_match_time("2026-01-18T18:30:00").unwrap();
        assert_eq!(dt.to_rfc3339(), "2026-01-18T18:30:00+00:00");
    }
}
