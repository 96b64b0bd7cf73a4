use crate::engine::ledger::{self, CreditLedger};
use crate::engine::merge::{self, format_spread_line};
use crate::engine::outcome::parse_signed;
use crate::engine::settlement::{self, MAX_PARLAY_LEGS, MIN_PARLAY_LEGS};
use crate::error::WagerError;
use crate::feed::score_feed::moneyline_fallback;
use crate::feed::types::RawGameOdds;
use crate::feed::{OddsFeed, ScoreFeed};
use crate::identity::{game_key, TeamRegistry};
use crate::models::{
    Game, GameKey, GameStatus, Market, Pick, Provider, Selection, Wager, WagerStatus, WagerType,
};
use crate::store::MemoryStore;
use chrono::Utc;
use futures_util::future::join_all;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct PickRequest {
    pub game_id: GameKey,
    pub market: Market,
    pub selection: Selection,
}

#[derive(Debug, Clone)]
pub struct WagerRequest {
    pub wager_type: WagerType,
    pub stake_cents: u64,
    pub picks: Vec<PickRequest>,
}

#[derive(Debug, Default)]
pub struct RefreshSummary {
    pub games: usize,
    pub markets: usize,
    pub skipped_unmatched: usize,
    pub provider_failures: usize,
    /// Providers whose reported remaining request quota fell below the
    /// configured warning threshold this cycle.
    pub quota_warnings: usize,
}

#[derive(Debug, Clone)]
pub struct SettledWager {
    pub wager_id: String,
    pub status: WagerStatus,
    pub payout_cents: u64,
}

/// Batch settlement result. One wager's failure never aborts its
/// siblings; failures are collected and reported per wager.
#[derive(Debug, Default)]
pub struct SettlementReport {
    pub settled: Vec<SettledWager>,
    pub failed: Vec<(String, WagerError)>,
    pub still_pending: usize,
}

/// The caller-facing engine. All collaborators are injected at
/// construction; there are no global singletons inside the core.
pub struct Sportsbook {
    registry: Arc<TeamRegistry>,
    store: Arc<MemoryStore>,
    ledger: CreditLedger,
    odds_feeds: Vec<Box<dyn OddsFeed>>,
    score_feed: Box<dyn ScoreFeed>,
    bookmaker_priority: Vec<String>,
    fetch_timeout: Duration,
    quota_warning_threshold: Option<u64>,
    /// Per-process counter: ids restart with the process, same lifetime
    /// as the in-memory store they key into.
    next_wager_id: AtomicU64,
}

impl Sportsbook {
    pub fn new(
        registry: Arc<TeamRegistry>,
        store: Arc<MemoryStore>,
        odds_feeds: Vec<Box<dyn OddsFeed>>,
        score_feed: Box<dyn ScoreFeed>,
        bookmaker_priority: Vec<String>,
        fetch_timeout: Duration,
    ) -> Self {
        let ledger = CreditLedger::new(store.clone());
        Self {
            registry,
            store,
            ledger,
            odds_feeds,
            score_feed,
            bookmaker_priority,
            fetch_timeout,
            quota_warning_threshold: None,
            next_wager_id: AtomicU64::new(1),
        }
    }

    /// Warn when a metered provider reports fewer remaining requests
    /// than this after a fetch.
    pub fn with_quota_warning_threshold(mut self, threshold: Option<u64>) -> Self {
        self.quota_warning_threshold = threshold;
        self
    }

    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }

    pub fn ledger(&self) -> &CreditLedger {
        &self.ledger
    }

    // ── Odds refresh ─────────────────────────────────────────────────

    /// Fetch every odds provider concurrently (bounded by the fetch
    /// timeout), merge with source/bookmaker priority, and supersede the
    /// stored quote per (game, market). A failed provider is skipped and
    /// the merge falls through to the next one.
    pub async fn refresh_odds(&self, league: &str) -> RefreshSummary {
        let odds_futures = self.odds_feeds.iter().map(|feed| {
            let provider = feed.provider();
            async move {
                let result = tokio::time::timeout(self.fetch_timeout, feed.fetch_odds(league))
                    .await
                    .map_err(|_| anyhow::anyhow!("request timed out"))
                    .and_then(|r| r);
                (provider, result)
            }
        });

        let score_future = async {
            tokio::time::timeout(self.fetch_timeout, self.score_feed.fetch_scores(league))
                .await
                .map_err(|_| anyhow::anyhow!("request timed out"))
                .and_then(|r| r)
        };

        let (odds_results, score_result) = tokio::join!(join_all(odds_futures), score_future);

        let mut provider_failures = 0usize;
        let mut batches: HashMap<Provider, Vec<RawGameOdds>> = HashMap::new();
        for (provider, result) in odds_results {
            match result {
                Ok(batch) => {
                    batches.entry(provider).or_default().extend(batch);
                }
                Err(e) => {
                    provider_failures += 1;
                    let err = WagerError::SourceUnavailable {
                        provider,
                        reason: format!("{e:#}"),
                    };
                    tracing::warn!(provider = %provider, "{err}; falling through");
                }
            }
        }
        let mut quota_warnings = 0usize;
        if let Some(threshold) = self.quota_warning_threshold {
            for feed in &self.odds_feeds {
                if let Some(quota) = feed.last_quota() {
                    if quota.requests_remaining < threshold {
                        quota_warnings += 1;
                        tracing::warn!(
                            provider = %feed.provider(),
                            remaining = quota.requests_remaining,
                            threshold,
                            "provider request quota running low"
                        );
                    }
                }
            }
        }

        match score_result {
            Ok(updates) => {
                let fallback = moneyline_fallback(&updates);
                if !fallback.is_empty() {
                    batches.entry(Provider::ScoreFeed).or_default().extend(fallback);
                }
            }
            Err(e) => {
                provider_failures += 1;
                tracing::warn!(provider = %Provider::ScoreFeed, error = %format!("{e:#}"), "moneyline fallback unavailable");
            }
        }

        let result = merge::merge_batches(
            &self.registry,
            league,
            &batches,
            &self.bookmaker_priority,
            Utc::now(),
        );

        let mut summary = RefreshSummary {
            games: result.games.len(),
            skipped_unmatched: result.skipped_unmatched,
            provider_failures,
            quota_warnings,
            ..Default::default()
        };

        self.store.with_txn(|inner| {
            for merged in result.games {
                // The merge decision is recomputed from the latest raw
                // batch: the merged map replaces the game's quotes
                // wholesale, so a market every provider stopped quoting
                // drops out and cannot be bet against a stale line.
                summary.markets += merged.markets.len();
                inner.quotes.insert(merged.key.clone(), merged.markets);

                inner.games.entry(merged.key.clone()).or_insert_with(|| Game {
                    id: merged.key.clone(),
                    league: merged.league.clone(),
                    home_team_id: merged.home_team_id.clone(),
                    away_team_id: merged.away_team_id.clone(),
                    scheduled_time: merged.commence_time,
                    home_score: 0,
                    away_score: 0,
                    status: GameStatus::Scheduled,
                });
            }
        });

        summary
    }

    // ── Score refresh ────────────────────────────────────────────────

    /// Pull the schedule/scores feed and upsert games. Lifecycle moves
    /// forward only (scheduled -> in-progress -> final); a stale or
    /// missing feed entry just leaves the game non-final.
    pub async fn refresh_scores(&self, league: &str) -> Result<usize, WagerError> {
        let updates = tokio::time::timeout(self.fetch_timeout, self.score_feed.fetch_scores(league))
            .await
            .map_err(|_| WagerError::SourceUnavailable {
                provider: Provider::ScoreFeed,
                reason: "request timed out".to_string(),
            })?
            .map_err(|e| WagerError::SourceUnavailable {
                provider: Provider::ScoreFeed,
                reason: format!("{e:#}"),
            })?;

        let mut applied = 0usize;
        self.store.with_txn(|inner| {
            for update in &updates {
                let away = match self.registry.resolve(&update.away_team, Some(league)) {
                    Ok(t) => t,
                    Err(_) => {
                        tracing::warn!(team = %update.away_team, "score update for unresolved team skipped");
                        continue;
                    }
                };
                let home = match self.registry.resolve(&update.home_team, Some(league)) {
                    Ok(t) => t,
                    Err(_) => {
                        tracing::warn!(team = %update.home_team, "score update for unresolved team skipped");
                        continue;
                    }
                };
                let key = game_key(away, home);

                let game = inner.games.entry(key.clone()).or_insert_with(|| Game {
                    id: key.clone(),
                    league: league.to_string(),
                    home_team_id: home.id.clone(),
                    away_team_id: away.id.clone(),
                    scheduled_time: update.start_time,
                    home_score: 0,
                    away_score: 0,
                    status: GameStatus::Scheduled,
                });

                // Final games never regress.
                if game.is_final() {
                    continue;
                }
                if game.scheduled_time.is_none() {
                    game.scheduled_time = update.start_time;
                }
                if update.status >= game.status {
                    game.status = update.status;
                    game.home_score = update.home_score;
                    game.away_score = update.away_score;
                    applied += 1;
                }
            }
        });
        Ok(applied)
    }

    // ── Wager lifecycle ──────────────────────────────────────────────

    pub fn open_account(&self, user_id: &str, base_credit_limit_cents: u64) {
        self.ledger.open_account(user_id, base_credit_limit_cents);
    }

    /// Submit a wager: validate shape, freeze the current line/price into
    /// each pick, then reserve credit and persist the wager atomically.
    pub fn submit_wager(&self, user_id: &str, request: WagerRequest) -> Result<Wager, WagerError> {
        if request.stake_cents == 0 {
            return Err(WagerError::Validation("stake must be positive".to_string()));
        }
        match request.wager_type {
            WagerType::Straight if request.picks.len() != 1 => {
                return Err(WagerError::Validation(
                    "straight wager must have exactly one pick".to_string(),
                ));
            }
            WagerType::Parlay
                if !(MIN_PARLAY_LEGS..=MAX_PARLAY_LEGS).contains(&request.picks.len()) =>
            {
                return Err(WagerError::Validation(format!(
                    "parlay must have {MIN_PARLAY_LEGS}-{MAX_PARLAY_LEGS} picks, got {}",
                    request.picks.len()
                )));
            }
            _ => {}
        }
        for pick in &request.picks {
            if !pick.selection.valid_for(pick.market) {
                return Err(WagerError::Validation(format!(
                    "selection {} is not valid for a {} market",
                    pick.selection, pick.market
                )));
            }
        }

        let id = format!("w-{:06}", self.next_wager_id.fetch_add(1, Ordering::Relaxed));

        self.store.with_txn(|inner| {
            let mut picks = Vec::with_capacity(request.picks.len());
            for req in &request.picks {
                let game = inner
                    .games
                    .get(&req.game_id)
                    .ok_or_else(|| WagerError::Validation(format!("unknown game {}", req.game_id)))?;
                if game.status != GameStatus::Scheduled {
                    return Err(WagerError::Validation(format!(
                        "game {} has already started",
                        req.game_id
                    )));
                }
                let quote = inner
                    .quotes
                    .get(&req.game_id)
                    .and_then(|m| m.get(&req.market))
                    .ok_or_else(|| {
                        WagerError::Validation(format!(
                            "no current {} odds for game {}",
                            req.market, req.game_id
                        ))
                    })?;
                picks.push(snapshot_pick(req, quote.line.as_deref(), &quote.home_price, &quote.away_price)?);
            }

            let wager = Wager {
                id: id.clone(),
                user_id: user_id.to_string(),
                wager_type: request.wager_type,
                picks,
                stake_cents: request.stake_cents,
                status: WagerStatus::Pending,
                payout_cents: 0,
                created_at: Utc::now(),
                settled_at: None,
            };
            ledger::reserve_in(inner, request.stake_cents, wager.clone())?;
            Ok(wager)
        })
    }

    /// Cancel a pending wager and release its reserved credit, in one
    /// transaction. Terminal wagers are rejected, never mutated.
    pub fn cancel_wager(&self, user_id: &str, wager_id: &str) -> Result<Wager, WagerError> {
        self.store.with_txn(|inner| {
            let wager = inner
                .wagers
                .get(wager_id)
                .ok_or_else(|| WagerError::UnknownWager(wager_id.to_string()))?;
            if wager.user_id != user_id {
                return Err(WagerError::UnknownWager(wager_id.to_string()));
            }
            if wager.status.is_terminal() {
                return Err(WagerError::AlreadyTerminal {
                    id: wager_id.to_string(),
                    status: wager.status,
                });
            }
            let stake = wager.stake_cents;
            ledger::release_in(inner, user_id, stake, wager_id)?;
            match inner.wagers.get_mut(wager_id) {
                Some(wager) => {
                    wager.status = WagerStatus::Canceled;
                    Ok(wager.clone())
                }
                None => Err(WagerError::UnknownWager(wager_id.to_string())),
            }
        })
    }

    // ── Settlement ───────────────────────────────────────────────────

    /// Settle every fully-resolvable pending wager. Deterministic and
    /// idempotent: terminal wagers are skipped by the status guard, and
    /// the status transition and payout credit commit together.
    pub fn settle_pending(&self) -> SettlementReport {
        let mut report = SettlementReport::default();
        self.store.with_txn(|inner| {
            let games = inner.games.clone();
            let mut ids: Vec<String> = inner
                .wagers
                .values()
                .filter(|w| !w.status.is_terminal())
                .map(|w| w.id.clone())
                .collect();
            ids.sort();

            for id in ids {
                let Some(wager) = inner.wagers.get(&id).cloned() else {
                    continue;
                };
                match settlement::settle(&wager, &games) {
                    Ok(None) => report.still_pending += 1,
                    Ok(Some(settlement)) => {
                        if settlement.payout_cents > 0 {
                            if let Err(e) =
                                ledger::payout_in(inner, &wager.user_id, settlement.payout_cents, &id)
                            {
                                tracing::warn!(wager_id = %id, "payout failed: {e}");
                                report.failed.push((id, e));
                                continue;
                            }
                        }
                        if let Some(stored) = inner.wagers.get_mut(&id) {
                            stored.status = settlement.status;
                            stored.payout_cents = settlement.payout_cents;
                            stored.settled_at = Some(Utc::now());
                        }
                        report.settled.push(SettledWager {
                            wager_id: id,
                            status: settlement.status,
                            payout_cents: settlement.payout_cents,
                        });
                    }
                    Err(e) => {
                        tracing::warn!(wager_id = %id, "settlement failed: {e}");
                        report.failed.push((id, e));
                    }
                }
            }
        });
        report
    }

    /// Weekly credit reset across all active accounts.
    pub fn reset_week(&self) -> usize {
        self.ledger.reset_all()
    }
}

/// Freeze the current quote into an immutable pick snapshot. Spread lines
/// are stored home-relative; the away side freezes the negated line.
fn snapshot_pick(
    req: &PickRequest,
    line: Option<&str>,
    home_price: &str,
    away_price: &str,
) -> Result<Pick, WagerError> {
    let price = match req.selection {
        Selection::Home | Selection::Over => home_price.to_string(),
        Selection::Away | Selection::Under => away_price.to_string(),
    };
    let line_snapshot = match req.market {
        Market::Moneyline => None,
        Market::Total => Some(
            line.ok_or_else(|| WagerError::Validation("totals quote without a line".to_string()))?
                .to_string(),
        ),
        Market::Spread => {
            let raw = line
                .ok_or_else(|| WagerError::Validation("spread quote without a line".to_string()))?;
            match req.selection {
                Selection::Home => Some(raw.to_string()),
                Selection::Away => {
                    let value = parse_signed(raw).ok_or_else(|| {
                        WagerError::Validation(format!("unparseable spread line {raw:?}"))
                    })?;
                    Some(format_spread_line(-value))
                }
                _ => None,
            }
        }
    };
    Ok(Pick {
        game_id: req.game_id.clone(),
        market: req.market,
        selection: req.selection,
        line_snapshot,
        price_snapshot: price,
    })
}
