use crate::models::{GameStatus, Market, Provider};
use chrono::{DateTime, Utc};

/// Normalized internal shapes used by the merge layer (provider-agnostic).
/// Provider payloads are validated into these at the ingestion boundary;
/// anything that fails to parse is dropped there, never propagated raw.

#[derive(Debug, Clone)]
pub struct RawGameOdds {
    pub provider: Provider,
    pub league: String,
    /// Raw provider team strings; only the identity resolver may turn
    /// these into anything used as a correlation key.
    pub home_team: String,
    pub away_team: String,
    pub commence_time: Option<DateTime<Utc>>,
    pub bookmakers: Vec<RawBookmaker>,
}

#[derive(Debug, Clone)]
pub struct RawBookmaker {
    pub key: String,
    pub markets: Vec<RawMarket>,
}

#[derive(Debug, Clone)]
pub struct RawMarket {
    pub market: Market,
    pub outcomes: Vec<RawOutcome>,
}

#[derive(Debug, Clone)]
pub struct RawOutcome {
    pub name: String,
    /// American odds. None when the provider sent a "no line" sentinel.
    pub price: Option<f64>,
    /// Spread or total line.
    pub point: Option<f64>,
}

/// One game's state from the schedule/scores feed.
#[derive(Debug, Clone)]
pub struct ScoreUpdate {
    pub source_game_id: String,
    pub league: String,
    pub home_team: String,
    pub away_team: String,
    pub home_score: u16,
    pub away_score: u16,
    pub status: GameStatus,
    pub start_time: Option<DateTime<Utc>>,
    /// Consensus moneylines, when the feed carries them. Fallback only.
    pub home_moneyline: Option<f64>,
    pub away_moneyline: Option<f64>,
}

/// API usage quota info extracted from response headers.
#[derive(Debug, Clone, Default)]
pub struct ApiQuota {
    pub requests_used: u64,
    pub requests_remaining: u64,
}

/// Parse an American odds string. Handles "+150", "-180", "EVEN" (= +100).
/// Explicit no-line sentinels ("", "-", "0") map to None so the merge
/// layer falls through instead of treating them as an authoritative zero.
pub fn parse_american(s: &str) -> Option<f64> {
    let s = s.trim();
    if s.is_empty() || s == "-" || s == "0" {
        return None;
    }
    if s.eq_ignore_ascii_case("EVEN") || s.eq_ignore_ascii_case("EV") {
        return Some(100.0);
    }
    s.parse::<f64>().ok()
}

/// Parse a spread/total line string ("-3.5", "+7", "45.5"). Same sentinel
/// handling as `parse_american`, except "0" is a legal pick-em line.
pub fn parse_point(s: &str) -> Option<f64> {
    let s = s.trim();
    if s.is_empty() || s == "-" {
        return None;
    }
    s.strip_prefix('+').unwrap_or(s).parse::<f64>().ok()
}
