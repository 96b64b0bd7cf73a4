use anyhow::{bail, Result};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use wagerline::config::Config;
use wagerline::feed::json_odds::JsonOddsFeed;
use wagerline::feed::score_feed::EspnScoreFeed;
use wagerline::feed::the_odds_api::TheOddsApi;
use wagerline::feed::OddsFeed;
use wagerline::identity::TeamRegistry;
use wagerline::service::Sportsbook;
use wagerline::store::MemoryStore;

const USAGE: &str = "usage: wagerline <refresh|settle|reset>";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wagerline=info".into()),
        )
        .init();

    let command = match std::env::args().nth(1) {
        Some(c) => c,
        None => bail!(USAGE),
    };

    let config = Config::load(Path::new("config.toml"))?;
    Config::load_env_file();

    let registry = Arc::new(TeamRegistry::load(Path::new(&config.teams_file))?);
    tracing::info!(teams = registry.len(), "team registry loaded");

    let store = Arc::new(MemoryStore::new());
    let book = build_sportsbook(&config, registry, store)?;

    match command.as_str() {
        "refresh" => {
            for league in config.leagues.enabled_keys() {
                let summary = book.refresh_odds(&league).await;
                tracing::info!(
                    %league,
                    games = summary.games,
                    markets = summary.markets,
                    skipped_unmatched = summary.skipped_unmatched,
                    provider_failures = summary.provider_failures,
                    "odds refreshed"
                );
                let applied = book.refresh_scores(&league).await?;
                tracing::info!(%league, applied, "scores refreshed");
            }
        }
        "settle" => {
            for league in config.leagues.enabled_keys() {
                book.refresh_scores(&league).await?;
            }
            let report = book.settle_pending();
            tracing::info!(
                settled = report.settled.len(),
                failed = report.failed.len(),
                still_pending = report.still_pending,
                "settlement pass complete"
            );
            for (wager_id, err) in &report.failed {
                tracing::warn!(wager_id = %wager_id, "not settled: {err}");
            }
        }
        "reset" => {
            let count = book.reset_week();
            tracing::info!(accounts = count, "weekly credit reset complete");
        }
        other => bail!("unknown command {other:?}\n{USAGE}"),
    }

    Ok(())
}

fn build_sportsbook(
    config: &Config,
    registry: Arc<TeamRegistry>,
    store: Arc<MemoryStore>,
) -> Result<Sportsbook> {
    let mut odds_feeds: Vec<Box<dyn OddsFeed>> = Vec::new();

    match Config::jsonodds_api_key() {
        Ok(key) => {
            odds_feeds.push(Box::new(JsonOddsFeed::new(
                key,
                &config.jsonodds_feed.base_url,
                Duration::from_millis(config.jsonodds_feed.request_timeout_ms),
            )?));
        }
        Err(e) => tracing::warn!("jsonodds feed disabled: {e}"),
    }
    match Config::odds_api_key() {
        Ok(key) => {
            odds_feeds.push(Box::new(TheOddsApi::new(
                key,
                &config.odds_api_feed.base_url,
                &config.odds_api_feed.bookmakers,
                Duration::from_millis(config.odds_api_feed.request_timeout_ms),
            )?));
        }
        Err(e) => tracing::warn!("the-odds-api feed disabled: {e}"),
    }

    let score_feed = EspnScoreFeed::new(
        &config.score_feed.espn_api_url,
        Duration::from_millis(config.score_feed.request_timeout_ms),
    )?;

    let fetch_timeout = Duration::from_millis(
        config
            .jsonodds_feed
            .request_timeout_ms
            .max(config.odds_api_feed.request_timeout_ms)
            .max(config.score_feed.request_timeout_ms),
    );

    Ok(Sportsbook::new(
        registry,
        store,
        odds_feeds,
        Box::new(score_feed),
        config.odds_api_feed.bookmaker_priority(),
        fetch_timeout,
    )
    .with_quota_warning_threshold(config.odds_api_feed.quota_warning_threshold))
}
