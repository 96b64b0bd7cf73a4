use crate::models::{Game, Market, Pick, Selection};
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PickOutcome {
    Win,
    Loss,
    Push,
    /// Not decidable: game not final, malformed snapshot, or a selection
    /// that does not fit the market. Never settled.
    Unknown,
}

/// Parse a frozen signed snapshot ("+3.5", "-150", "45.5") back to a number.
pub fn parse_signed(s: &str) -> Option<f64> {
    let t = s.trim();
    t.strip_prefix('+').unwrap_or(t).parse::<f64>().ok()
}

/// Evaluate one pick against a game's final score. Callers must treat
/// `Unknown` as "do not settle".
pub fn evaluate_pick(pick: &Pick, game: &Game) -> PickOutcome {
    if !game.is_final() {
        return PickOutcome::Unknown;
    }
    if !pick.selection.valid_for(pick.market) {
        return PickOutcome::Unknown;
    }

    let home = game.home_score as f64;
    let away = game.away_score as f64;

    match pick.market {
        Market::Moneyline => {
            let (picked, other) = match pick.selection {
                Selection::Home => (home, away),
                Selection::Away => (away, home),
                _ => return PickOutcome::Unknown,
            };
            // Ties are impossible in the covered leagues; equal scores can
            // only mean bad data, so refuse to guess.
            match picked.partial_cmp(&other) {
                Some(Ordering::Greater) => PickOutcome::Win,
                Some(Ordering::Less) => PickOutcome::Loss,
                _ => PickOutcome::Unknown,
            }
        }
        Market::Spread => {
            let Some(line) = pick.line_snapshot.as_deref().and_then(parse_signed) else {
                return PickOutcome::Unknown;
            };
            let (picked, other) = match pick.selection {
                Selection::Home => (home, away),
                Selection::Away => (away, home),
                _ => return PickOutcome::Unknown,
            };
            let adjusted = picked + line;
            match adjusted.partial_cmp(&other) {
                Some(Ordering::Greater) => PickOutcome::Win,
                Some(Ordering::Less) => PickOutcome::Loss,
                _ => PickOutcome::Push,
            }
        }
        Market::Total => {
            let Some(line) = pick.line_snapshot.as_deref().and_then(parse_signed) else {
                return PickOutcome::Unknown;
            };
            let sum = home + away;
            let over_wins = match sum.partial_cmp(&line) {
                Some(Ordering::Greater) => Some(true),
                Some(Ordering::Less) => Some(false),
                _ => None,
            };
            match (over_wins, pick.selection) {
                (None, _) => PickOutcome::Push,
                (Some(true), Selection::Over) | (Some(false), Selection::Under) => PickOutcome::Win,
                _ => PickOutcome::Loss,
            }
        }
    }
}
