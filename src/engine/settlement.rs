use super::outcome::{evaluate_pick, parse_signed, PickOutcome};
use crate::error::WagerError;
use crate::models::{Game, GameKey, Wager, WagerStatus, WagerType};
use std::collections::HashMap;

/// Fixed parlay payout table, keyed by leg count 3..=10.
const PARLAY_MULTIPLIERS: [u64; 8] = [8, 15, 25, 50, 100, 150, 200, 250];

pub const MIN_PARLAY_LEGS: usize = 3;
pub const MAX_PARLAY_LEGS: usize = 10;

pub fn parlay_multiplier(legs: usize) -> Option<u64> {
    if (MIN_PARLAY_LEGS..=MAX_PARLAY_LEGS).contains(&legs) {
        Some(PARLAY_MULTIPLIERS[legs - MIN_PARLAY_LEGS])
    } else {
        None
    }
}

/// Profit on a winning stake at an American price, in integer cents
/// (floored). "+150" on 10000 -> 15000; "-120" on 12000 -> 10000.
pub fn american_profit_cents(stake_cents: u64, price: &str) -> Result<u64, WagerError> {
    let parsed = parse_signed(price)
        .ok_or_else(|| WagerError::Validation(format!("unparseable price snapshot {:?}", price)))?;
    let p = parsed.round() as i64;
    if p.abs() < 100 {
        return Err(WagerError::Validation(format!(
            "price snapshot {:?} is not a valid American price",
            price
        )));
    }
    if p > 0 {
        Ok(stake_cents * p as u64 / 100)
    } else {
        Ok(stake_cents * 100 / p.unsigned_abs())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settlement {
    pub status: WagerStatus,
    pub payout_cents: u64,
}

/// Compute a wager's final status and payout. Pure and deterministic:
/// - `Ok(None)` when the wager is already terminal (idempotency guard) or
///   any leg's game is missing or not yet final -- it stays as it is.
/// - `Err(Validation)` when a final game still cannot decide a leg
///   (malformed snapshot); the wager must not be settled.
pub fn settle(
    wager: &Wager,
    games: &HashMap<GameKey, Game>,
) -> Result<Option<Settlement>, WagerError> {
    if wager.status.is_terminal() {
        return Ok(None);
    }

    let mut outcomes = Vec::with_capacity(wager.picks.len());
    for pick in &wager.picks {
        let Some(game) = games.get(&pick.game_id) else {
            return Ok(None);
        };
        if !game.is_final() {
            return Ok(None);
        }
        match evaluate_pick(pick, game) {
            PickOutcome::Unknown => {
                return Err(WagerError::Validation(format!(
                    "pick on game {} ({}) is undecidable with a final score",
                    pick.game_id, pick.market
                )))
            }
            outcome => outcomes.push(outcome),
        }
    }

    match wager.wager_type {
        WagerType::Straight => {
            let [outcome] = outcomes.as_slice() else {
                return Err(WagerError::Validation(
                    "straight wager must have exactly one pick".to_string(),
                ));
            };
            let settlement = match outcome {
                PickOutcome::Win => Settlement {
                    status: WagerStatus::Won,
                    payout_cents: wager.stake_cents
                        + american_profit_cents(wager.stake_cents, &wager.picks[0].price_snapshot)?,
                },
                PickOutcome::Push => Settlement {
                    status: WagerStatus::Push,
                    payout_cents: wager.stake_cents,
                },
                PickOutcome::Loss => Settlement {
                    status: WagerStatus::Lost,
                    payout_cents: 0,
                },
                PickOutcome::Unknown => unreachable!("unknown legs rejected above"),
            };
            Ok(Some(settlement))
        }
        WagerType::Parlay => {
            let multiplier = parlay_multiplier(outcomes.len()).ok_or_else(|| {
                WagerError::Validation(format!("parlay with {} legs", outcomes.len()))
            })?;
            // A push counts as a loss for parlay purposes; no leg-reduction.
            if outcomes.iter().all(|o| *o == PickOutcome::Win) {
                Ok(Some(Settlement {
                    status: WagerStatus::Won,
                    payout_cents: wager.stake_cents * multiplier,
                }))
            } else {
                Ok(Some(Settlement {
                    status: WagerStatus::Lost,
                    payout_cents: 0,
                }))
            }
        }
    }
}
