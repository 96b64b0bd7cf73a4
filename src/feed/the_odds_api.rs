use super::types::*;
use super::OddsFeed;
use crate::models::{Market, Provider};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::sync::Mutex;
use std::time::Duration;

/// Secondary odds feed: the-odds-api.com v4. Unlike the primary feed it
/// aggregates multiple bookmakers per game, so its payload keeps the
/// per-bookmaker structure for the merge layer's bookmaker priority.
pub struct TheOddsApi {
    client: Client,
    api_key: String,
    base_url: String,
    bookmakers: String,
    last_quota: Mutex<Option<ApiQuota>>,
}

/// Map our internal league key to the-odds-api.com sport key.
fn api_sport_key(league: &str) -> &str {
    match league {
        "nfl" => "americanfootball_nfl",
        "nba" => "basketball_nba",
        "mlb" => "baseball_mlb",
        "nhl" => "icehockey_nhl",
        "ncaaf" => "americanfootball_ncaaf",
        "ncaab" => "basketball_ncaab",
        _ => league,
    }
}

fn market_key(key: &str) -> Option<Market> {
    match key {
        "h2h" => Some(Market::Moneyline),
        "spreads" => Some(Market::Spread),
        "totals" => Some(Market::Total),
        _ => None,
    }
}

/// Parse a quota header that may be an integer or float (e.g. "14527.0").
fn parse_quota_header(headers: &reqwest::header::HeaderMap, name: &str) -> u64 {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<f64>().ok())
        .map(|v| v as u64)
        .unwrap_or(0)
}

#[derive(Debug, Deserialize)]
struct ApiEvent {
    home_team: String,
    away_team: String,
    commence_time: String,
    #[serde(default)]
    bookmakers: Vec<ApiBookmaker>,
}

#[derive(Debug, Deserialize)]
struct ApiBookmaker {
    key: String,
    markets: Vec<ApiMarket>,
}

#[derive(Debug, Deserialize)]
struct ApiMarket {
    key: String,
    outcomes: Vec<ApiOutcome>,
}

#[derive(Debug, Deserialize)]
struct ApiOutcome {
    name: String,
    price: f64,
    #[serde(default)]
    point: Option<f64>,
}

impl TheOddsApi {
    pub fn new(api_key: String, base_url: &str, bookmakers: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build the-odds-api http client")?;
        Ok(Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            bookmakers: bookmakers.to_string(),
            last_quota: Mutex::new(None),
        })
    }

    fn convert(event: ApiEvent, league: &str) -> RawGameOdds {
        let bookmakers = event
            .bookmakers
            .into_iter()
            .map(|bm| RawBookmaker {
                key: bm.key,
                markets: bm
                    .markets
                    .into_iter()
                    .filter_map(|m| {
                        let market = market_key(&m.key)?;
                        Some(RawMarket {
                            market,
                            outcomes: m
                                .outcomes
                                .into_iter()
                                .map(|o| RawOutcome {
                                    name: o.name,
                                    price: Some(o.price),
                                    point: o.point,
                                })
                                .collect(),
                        })
                    })
                    .collect(),
            })
            .collect();

        RawGameOdds {
            provider: Provider::OddsApi,
            league: league.to_string(),
            home_team: event.home_team,
            away_team: event.away_team,
            commence_time: DateTime::parse_from_rfc3339(&event.commence_time)
                .ok()
                .map(|dt| dt.with_timezone(&Utc)),
            bookmakers,
        }
    }
}

#[async_trait]
impl OddsFeed for TheOddsApi {
    fn provider(&self) -> Provider {
        Provider::OddsApi
    }

    async fn fetch_odds(&self, league: &str) -> Result<Vec<RawGameOdds>> {
        let api_sport = api_sport_key(league);

        let url = format!(
            "{}/v4/sports/{}/odds?apiKey={}&regions=us&markets=h2h,spreads,totals&oddsFormat=american&bookmakers={}",
            self.base_url, api_sport, self.api_key, self.bookmakers,
        );

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .context("the-odds-api request failed")?;

        // Quota comes back in headers on every response, success or not.
        let used = parse_quota_header(resp.headers(), "x-requests-used");
        let remaining = parse_quota_header(resp.headers(), "x-requests-remaining");
        if let Ok(mut quota) = self.last_quota.lock() {
            *quota = Some(ApiQuota {
                requests_used: used,
                requests_remaining: remaining,
            });
        }

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("the-odds-api {} ({}): {}", api_sport, status, body);
        }

        let events: Vec<ApiEvent> = resp
            .json()
            .await
            .context("failed to parse the-odds-api response")?;

        Ok(events
            .into_iter()
            .map(|e| Self::convert(e, league))
            .collect())
    }

    fn last_quota(&self) -> Option<ApiQuota> {
        self.last_quota.lock().ok().and_then(|q| q.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_market_key_mapping() {
        assert_eq!(market_key("h2h"), Some(Market::Moneyline));
        assert_eq!(market_key("spreads"), Some(Market::Spread));
        assert_eq!(market_key("totals"), Some(Market::Total));
        assert_eq!(market_key("h2h_lay"), None);
    }

    #[test]
    fn test_api_sport_key() {
        assert_eq!(api_sport_key("nfl"), "americanfootball_nfl");
        assert_eq!(api_sport_key("nba"), "basketball_nba");
        assert_eq!(api_sport_key("soccer_epl"), "soccer_epl");
    }

    #[test]
    fn test_convert_keeps_bookmaker_structure() {
        let event: ApiEvent = serde_json::from_str(
            r#"{
                "home_team": "Kansas City Chiefs",
                "away_team": "Buffalo Bills",
                "commence_time": "2026-01-18T18:30:00Z",
                "bookmakers": [
                    {
                        "key": "draftkings",
                        "markets": [
                            {
                                "key": "spreads",
                                "outcomes": [
                                    {"name": "Kansas City Chiefs", "price": -110, "point": -2.5},
                                    {"name": "Buffalo Bills", "price": -110, "point": 2.5}
                                ]
                            },
                            {"key": "h2h_lay", "outcomes": []}
                        ]
                    },
                    {
                        "key": "fanduel",
                        "markets": [
                            {
                                "key": "totals",
                                "outcomes": [
                                    {"name": "Over", "price": -105, "point": 47.5},
                                    {"name": "Under", "price": -115, "point": 47.5}
                                ]
                            }
                        ]
                    }
                ]
            }"#,
        )
        .unwrap();

        let raw = TheOddsApi::convert(event, "nfl");
        assert_eq!(raw.provider, Provider::OddsApi);
        assert_eq!(raw.bookmakers.len(), 2);
        assert_eq!(raw.bookmakers[0].key, "draftkings");
        // Unknown market keys are dropped at the boundary
        assert_eq!(raw.bookmakers[0].markets.len(), 1);
        assert_eq!(raw.bookmakers[0].markets[0].market, Market::Spread);
        assert!(raw.commence_time.is_some());
    }
}
