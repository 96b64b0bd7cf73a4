use crate::models::{AuditEntry, Game, GameKey, Market, OddsQuote, UserLedger, Wager};
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

/// Everything the engine persists, behind one lock. Stands in for the
/// transactional document-store collaborator: a `with_txn` closure is the
/// unit of atomicity, so reserve-and-persist and settle-and-credit apply
/// together or not at all, and per-user ledger mutations are serialized.
#[derive(Default)]
pub struct StoreInner {
    pub ledgers: HashMap<String, UserLedger>,
    pub wagers: HashMap<String, Wager>,
    pub games: HashMap<GameKey, Game>,
    pub quotes: HashMap<GameKey, BTreeMap<Market, OddsQuote>>,
    pub audit: Vec<AuditEntry>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<StoreInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_txn<T>(&self, f: impl FnOnce(&mut StoreInner) -> T) -> T {
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        f(&mut inner)
    }

    // ── Read-only snapshots ──────────────────────────────────────────

    pub fn game(&self, key: &GameKey) -> Option<Game> {
        self.with_txn(|inner| inner.games.get(key).cloned())
    }

    pub fn quote(&self, key: &GameKey, market: Market) -> Option<OddsQuote> {
        self.with_txn(|inner| inner.quotes.get(key).and_then(|m| m.get(&market)).cloned())
    }

    pub fn wager(&self, id: &str) -> Option<Wager> {
        self.with_txn(|inner| inner.wagers.get(id).cloned())
    }

    pub fn ledger(&self, user_id: &str) -> Option<UserLedger> {
        self.with_txn(|inner| inner.ledgers.get(user_id).cloned())
    }

    pub fn audit_log(&self) -> Vec<AuditEntry> {
        self.with_txn(|inner| inner.audit.clone())
    }

    pub fn pending_wager_ids(&self) -> Vec<String> {
        self.with_txn(|inner| {
            let mut ids: Vec<String> = inner
                .wagers
                .values()
                .filter(|w| !w.status.is_terminal())
                .map(|w| w.id.clone())
                .collect();
            ids.sort();
            ids
        })
    }
}
