pub mod json_odds;
pub mod score_feed;
pub mod the_odds_api;
pub mod types;

use crate::models::Provider;
use anyhow::Result;
use async_trait::async_trait;
use types::{ApiQuota, RawGameOdds, ScoreUpdate};

#[async_trait]
pub trait OddsFeed: Send + Sync {
    fn provider(&self) -> Provider;
    async fn fetch_odds(&self, league: &str) -> Result<Vec<RawGameOdds>>;
    fn last_quota(&self) -> Option<ApiQuota> {
        None
    }
}

#[async_trait]
pub trait ScoreFeed: Send + Sync {
    async fn fetch_scores(&self, league: &str) -> Result<Vec<ScoreUpdate>>;
}
