use super::types::*;
use super::ScoreFeed;
use crate::models::{GameStatus, Market, Provider};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

/// Schedule and scores feed (ESPN-style scoreboard). This is the source
/// of truth for Game lifecycle (scheduled -> in-progress -> final) and
/// the last-resort moneyline fallback when both odds feeds come up dry.
pub struct EspnScoreFeed {
    client: Client,
    base_url: String,
}

/// Map our internal league key to the ESPN scoreboard path.
fn api_league_path(league: &str) -> &str {
    match league {
        "nfl" => "football/nfl",
        "nba" => "basketball/nba",
        "mlb" => "baseball/mlb",
        "nhl" => "hockey/nhl",
        "ncaaf" => "football/college-football",
        "ncaab" => "basketball/mens-college-basketball",
        _ => league,
    }
}

// ── ESPN scoreboard deserialization ──────────────────────────────────

#[derive(Deserialize)]
struct EspnScoreboard {
    #[serde(default)]
    events: Vec<EspnEvent>,
}

#[derive(Deserialize)]
struct EspnEvent {
    id: String,
    #[serde(default)]
    competitions: Vec<EspnCompetition>,
}

#[derive(Deserialize)]
struct EspnCompetition {
    #[serde(default)]
    date: Option<String>,
    competitors: Vec<EspnCompetitor>,
    status: EspnStatus,
    #[serde(default)]
    odds: Vec<EspnOdds>,
}

#[derive(Deserialize)]
struct EspnCompetitor {
    #[serde(rename = "homeAway")]
    home_away: String,
    team: EspnTeam,
    #[serde(default)]
    score: String,
}

#[derive(Deserialize)]
struct EspnTeam {
    #[serde(rename = "displayName")]
    display_name: String,
}

#[derive(Deserialize)]
struct EspnStatus {
    #[serde(rename = "type")]
    status_type: EspnStatusType,
}

#[derive(Deserialize)]
struct EspnStatusType {
    id: String,
}

#[derive(Deserialize)]
struct EspnOdds {
    #[serde(rename = "homeTeamOdds", default)]
    home_team_odds: Option<EspnTeamOdds>,
    #[serde(rename = "awayTeamOdds", default)]
    away_team_odds: Option<EspnTeamOdds>,
}

#[derive(Deserialize)]
struct EspnTeamOdds {
    #[serde(rename = "moneyLine", default)]
    moneyline: Option<f64>,
}

fn espn_game_status(id: &str) -> GameStatus {
    match id {
        "2" => GameStatus::InProgress,
        "3" => GameStatus::Final,
        _ => GameStatus::Scheduled,
    }
}

pub fn parse_scoreboard(json: &str, league: &str) -> Result<Vec<ScoreUpdate>> {
    let scoreboard: EspnScoreboard =
        serde_json::from_str(json).context("failed to parse scoreboard response")?;
    let mut updates = Vec::new();
    for event in scoreboard.events {
        let Some(comp) = event.competitions.first() else { continue };
        let home = comp.competitors.iter().find(|c| c.home_away == "home");
        let away = comp.competitors.iter().find(|c| c.home_away == "away");
        let (Some(home), Some(away)) = (home, away) else { continue };

        let consensus = comp.odds.first();
        updates.push(ScoreUpdate {
            source_game_id: event.id,
            league: league.to_string(),
            home_team: home.team.display_name.clone(),
            away_team: away.team.display_name.clone(),
            home_score: home.score.parse().unwrap_or(0),
            away_score: away.score.parse().unwrap_or(0),
            status: espn_game_status(&comp.status.status_type.id),
            start_time: comp
                .date
                .as_deref()
                .and_then(|d| DateTime::parse_from_rfc3339(d).ok())
                .map(|dt| dt.with_timezone(&Utc)),
            home_moneyline: consensus
                .and_then(|o| o.home_team_odds.as_ref())
                .and_then(|t| t.moneyline),
            away_moneyline: consensus
                .and_then(|o| o.away_team_odds.as_ref())
                .and_then(|t| t.moneyline),
        });
    }
    Ok(updates)
}

/// Turn score updates carrying a consensus moneyline into a raw batch for
/// the merge layer. Moneyline only; this provider never offers spreads or
/// totals, and games without a moneyline are dropped here.
pub fn moneyline_fallback(updates: &[ScoreUpdate]) -> Vec<RawGameOdds> {
    updates
        .iter()
        .filter(|u| u.home_moneyline.is_some() && u.away_moneyline.is_some())
        .map(|u| RawGameOdds {
            provider: Provider::ScoreFeed,
            league: u.league.clone(),
            home_team: u.home_team.clone(),
            away_team: u.away_team.clone(),
            commence_time: u.start_time,
            bookmakers: vec![RawBookmaker {
                key: "espn-consensus".to_string(),
                markets: vec![RawMarket {
                    market: Market::Moneyline,
                    outcomes: vec![
                        RawOutcome {
                            name: u.home_team.clone(),
                            price: u.home_moneyline,
                            point: None,
                        },
                        RawOutcome {
                            name: u.away_team.clone(),
                            price: u.away_moneyline,
                            point: None,
                        },
                    ],
                }],
            }],
        })
        .collect()
}

impl EspnScoreFeed {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build score feed http client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl ScoreFeed for EspnScoreFeed {
    async fn fetch_scores(&self, league: &str) -> Result<Vec<ScoreUpdate>> {
        let url = format!("{}/{}/scoreboard", self.base_url, api_league_path(league));

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .context("score feed request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("score feed {} ({}): {}", league, status, body);
        }

        let body = resp.text().await.context("score feed body read failed")?;
        parse_scoreboard(&body, league)
    }
}
