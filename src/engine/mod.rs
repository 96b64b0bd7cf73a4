pub mod ledger;
pub mod merge;
pub mod outcome;
pub mod settlement;
