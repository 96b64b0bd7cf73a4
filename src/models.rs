use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::fmt;

/// External data sources, in fixed fallback priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    /// Primary odds feed (per-game consensus lines).
    JsonOdds,
    /// Secondary odds feed (per-bookmaker markets).
    OddsApi,
    /// Schedule/scores feed; usable for moneyline fallback only.
    ScoreFeed,
}

impl Provider {
    /// Total priority order applied by the merge layer.
    pub const PRIORITY: [Provider; 3] = [Provider::JsonOdds, Provider::OddsApi, Provider::ScoreFeed];

    pub fn moneyline_only(&self) -> bool {
        matches!(self, Provider::ScoreFeed)
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Provider::JsonOdds => "jsonodds",
            Provider::OddsApi => "the-odds-api",
            Provider::ScoreFeed => "score-feed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Market {
    Moneyline,
    Spread,
    Total,
}

impl Market {
    pub const ALL: [Market; 3] = [Market::Moneyline, Market::Spread, Market::Total];
}

impl fmt::Display for Market {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Market::Moneyline => "moneyline",
            Market::Spread => "spread",
            Market::Total => "total",
        };
        f.write_str(s)
    }
}

/// The side a pick is on. Home/Away for moneyline and spread, Over/Under for totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Selection {
    Home,
    Away,
    Over,
    Under,
}

impl Selection {
    pub fn valid_for(&self, market: Market) -> bool {
        match market {
            Market::Moneyline | Market::Spread => matches!(self, Selection::Home | Selection::Away),
            Market::Total => matches!(self, Selection::Over | Selection::Under),
        }
    }
}

impl fmt::Display for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Selection::Home => "home",
            Selection::Away => "away",
            Selection::Over => "over",
            Selection::Under => "under",
        };
        f.write_str(s)
    }
}

/// Immutable reference data for one team, loaded once at startup.
/// `aliases` covers mascots, abbreviations, and legacy city names;
/// `external_ids` covers opaque provider-specific participant ids.
#[derive(Debug, Clone, Deserialize)]
pub struct Team {
    pub id: String,
    pub canonical_name: String,
    pub league: String,
    #[serde(default)]
    pub aliases: HashSet<String>,
    #[serde(default)]
    pub external_ids: HashMap<String, String>,
}

/// Provider-agnostic key correlating "the same game" across providers.
/// Only ever built from two resolved teams, never from raw provider strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GameKey(pub String);

impl fmt::Display for GameKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum GameStatus {
    Scheduled,
    InProgress,
    Final,
}

#[derive(Debug, Clone)]
pub struct Game {
    pub id: GameKey,
    pub league: String,
    pub home_team_id: String,
    pub away_team_id: String,
    pub scheduled_time: Option<DateTime<Utc>>,
    pub home_score: u16,
    pub away_score: u16,
    pub status: GameStatus,
}

impl Game {
    pub fn is_final(&self) -> bool {
        self.status == GameStatus::Final
    }
}

/// The current winning quote for one (game, market) after merge.
/// Both sides supersede together: `home_price`/`away_price` read as
/// over/under for totals markets. Prices and lines are American-odds
/// signed strings with an explicit '+' on positive values.
#[derive(Debug, Clone)]
pub struct OddsQuote {
    pub game_id: GameKey,
    pub market: Market,
    /// Home-relative spread line or the total line. None for moneyline.
    pub line: Option<String>,
    pub home_price: String,
    pub away_price: String,
    pub source: Provider,
    pub bookmaker: String,
    pub observed_at: DateTime<Utc>,
}

/// One leg of a wager. Immutable once attached: the line and price in
/// effect at submission are frozen so later odds movement cannot change
/// a placed wager.
#[derive(Debug, Clone)]
pub struct Pick {
    pub game_id: GameKey,
    pub market: Market,
    pub selection: Selection,
    /// The picked side's line (side-relative for spreads). None for moneyline.
    pub line_snapshot: Option<String>,
    pub price_snapshot: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WagerType {
    Straight,
    Parlay,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WagerStatus {
    Pending,
    Won,
    Lost,
    Push,
    Canceled,
}

impl WagerStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, WagerStatus::Pending)
    }
}

impl fmt::Display for WagerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WagerStatus::Pending => "pending",
            WagerStatus::Won => "won",
            WagerStatus::Lost => "lost",
            WagerStatus::Push => "push",
            WagerStatus::Canceled => "canceled",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
pub struct Wager {
    pub id: String,
    pub user_id: String,
    pub wager_type: WagerType,
    pub picks: Vec<Pick>,
    pub stake_cents: u64,
    pub status: WagerStatus,
    pub payout_cents: u64,
    pub created_at: DateTime<Utc>,
    pub settled_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountStatus {
    Active,
    Revoked,
}

/// Per-user exposure record. Invariant: `total_wagered_cents` never
/// exceeds `credit_limit_cents` while the account is active.
#[derive(Debug, Clone)]
pub struct UserLedger {
    pub user_id: String,
    pub credit_limit_cents: u64,
    pub base_credit_limit_cents: u64,
    pub total_wagered_cents: u64,
    pub last_reset_at: Option<DateTime<Utc>>,
    pub status: AccountStatus,
}

impl UserLedger {
    pub fn remaining_credit_cents(&self) -> u64 {
        self.credit_limit_cents.saturating_sub(self.total_wagered_cents)
    }
}

#[derive(Debug, Clone)]
pub enum LedgerAction {
    Reserve { wager_id: String },
    Release { wager_id: String },
    Payout { wager_id: String },
    Reset { previous_wagered_cents: u64 },
}

#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub user_id: String,
    pub action: LedgerAction,
    pub amount_cents: u64,
    pub at: DateTime<Utc>,
}
