use crate::error::{CreditRejection, WagerError};
use crate::models::{AccountStatus, AuditEntry, LedgerAction, UserLedger, Wager};
use crate::store::{MemoryStore, StoreInner};
use chrono::Utc;
use std::sync::Arc;

/// Credit ledger over the shared store. Every mutating operation runs in
/// one store transaction, which serializes mutations per user and keeps
/// the invariant `total_wagered <= credit_limit` observable at all times.
///
/// The `*_in` functions take an open transaction so callers composing
/// larger units of work (cancel + release, settle + payout) stay atomic.
pub struct CreditLedger {
    store: Arc<MemoryStore>,
}

impl CreditLedger {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self { store }
    }

    /// Create the user's ledger record if absent.
    pub fn open_account(&self, user_id: &str, base_credit_limit_cents: u64) {
        self.store.with_txn(|inner| {
            inner
                .ledgers
                .entry(user_id.to_string())
                .or_insert_with(|| UserLedger {
                    user_id: user_id.to_string(),
                    credit_limit_cents: base_credit_limit_cents,
                    base_credit_limit_cents,
                    total_wagered_cents: 0,
                    last_reset_at: None,
                    status: AccountStatus::Active,
                });
        });
    }

    pub fn revoke_account(&self, user_id: &str) -> Result<(), WagerError> {
        self.store.with_txn(|inner| {
            let ledger = inner
                .ledgers
                .get_mut(user_id)
                .ok_or_else(|| WagerError::UnknownUser(user_id.to_string()))?;
            ledger.status = AccountStatus::Revoked;
            Ok(())
        })
    }

    /// Reserve credit and persist the wager in the same transaction.
    /// Never partially applies: a rejection leaves both untouched.
    pub fn reserve(&self, amount_cents: u64, wager: Wager) -> Result<(), WagerError> {
        self.store.with_txn(|inner| reserve_in(inner, amount_cents, wager))
    }

    /// Release reserved credit (cancellation path), floored at zero.
    pub fn release(&self, user_id: &str, amount_cents: u64, wager_id: &str) -> Result<(), WagerError> {
        self.store.with_txn(|inner| release_in(inner, user_id, amount_cents, wager_id))
    }

    /// Weekly reset for one user. Revoked users are skipped (Ok(false)).
    pub fn reset(&self, user_id: &str) -> Result<bool, WagerError> {
        self.store.with_txn(|inner| reset_in(inner, user_id))
    }

    /// Weekly reset across all accounts; returns how many were reset.
    pub fn reset_all(&self) -> usize {
        self.store.with_txn(|inner| {
            let users: Vec<String> = inner.ledgers.keys().cloned().collect();
            users
                .into_iter()
                .filter(|u| matches!(reset_in(inner, u), Ok(true)))
                .count()
        })
    }
}

pub fn reserve_in(inner: &mut StoreInner, amount_cents: u64, wager: Wager) -> Result<(), WagerError> {
    let user_id = wager.user_id.clone();
    let ledger = inner
        .ledgers
        .get_mut(&user_id)
        .ok_or_else(|| WagerError::UnknownUser(user_id.clone()))?;

    if ledger.status == AccountStatus::Revoked {
        return Err(WagerError::CreditRejected(CreditRejection::Revoked));
    }
    let remaining = ledger.remaining_credit_cents();
    if amount_cents > remaining {
        return Err(WagerError::CreditRejected(CreditRejection::LimitExceeded {
            requested_cents: amount_cents,
            remaining_cents: remaining,
        }));
    }

    ledger.total_wagered_cents += amount_cents;
    check_invariant(ledger)?;

    inner.audit.push(AuditEntry {
        user_id: user_id.clone(),
        action: LedgerAction::Reserve { wager_id: wager.id.clone() },
        amount_cents,
        at: Utc::now(),
    });
    inner.wagers.insert(wager.id.clone(), wager);
    Ok(())
}

pub fn release_in(
    inner: &mut StoreInner,
    user_id: &str,
    amount_cents: u64,
    wager_id: &str,
) -> Result<(), WagerError> {
    let ledger = inner
        .ledgers
        .get_mut(user_id)
        .ok_or_else(|| WagerError::UnknownUser(user_id.to_string()))?;

    ledger.total_wagered_cents = ledger.total_wagered_cents.saturating_sub(amount_cents);
    check_invariant(ledger)?;

    inner.audit.push(AuditEntry {
        user_id: user_id.to_string(),
        action: LedgerAction::Release { wager_id: wager_id.to_string() },
        amount_cents,
        at: Utc::now(),
    });
    Ok(())
}

/// Settlement payout. Payouts are a separate balance concept and never
/// decrement `total_wagered`; here they only leave an audit trail.
pub fn payout_in(
    inner: &mut StoreInner,
    user_id: &str,
    amount_cents: u64,
    wager_id: &str,
) -> Result<(), WagerError> {
    if !inner.ledgers.contains_key(user_id) {
        return Err(WagerError::UnknownUser(user_id.to_string()));
    }
    inner.audit.push(AuditEntry {
        user_id: user_id.to_string(),
        action: LedgerAction::Payout { wager_id: wager_id.to_string() },
        amount_cents,
        at: Utc::now(),
    });
    Ok(())
}

pub fn reset_in(inner: &mut StoreInner, user_id: &str) -> Result<bool, WagerError> {
    let ledger = inner
        .ledgers
        .get_mut(user_id)
        .ok_or_else(|| WagerError::UnknownUser(user_id.to_string()))?;

    if ledger.status == AccountStatus::Revoked {
        return Ok(false);
    }

    let previous = ledger.total_wagered_cents;
    ledger.total_wagered_cents = 0;
    ledger.credit_limit_cents = ledger.base_credit_limit_cents;
    ledger.last_reset_at = Some(Utc::now());

    inner.audit.push(AuditEntry {
        user_id: user_id.to_string(),
        action: LedgerAction::Reset { previous_wagered_cents: previous },
        amount_cents: 0,
        at: Utc::now(),
    });
    Ok(true)
}

/// Post-mutation invariant check. A violation here means a defect
/// upstream; it is logged as critical and surfaced, never corrected.
fn check_invariant(ledger: &UserLedger) -> Result<(), WagerError> {
    if ledger.status == AccountStatus::Active
        && ledger.total_wagered_cents > ledger.credit_limit_cents
    {
        tracing::error!(
            user_id = %ledger.user_id,
            total_wagered = ledger.total_wagered_cents,
            credit_limit = ledger.credit_limit_cents,
            "ledger invariant violated"
        );
        return Err(WagerError::InvariantViolation {
            user_id: ledger.user_id.clone(),
            total_wagered_cents: ledger.total_wagered_cents,
            credit_limit_cents: ledger.credit_limit_cents,
        });
    }
    Ok(())
}
