use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use topicpulse::analytics::{rank_topics, RankStrategy};
use topicpulse::config::Config;
use topicpulse::models::TopicAggregate;

use super::{print_json, read_json};

/// Ranking input file
#[derive(Debug, Deserialize)]
struct RankInput {
    /// Aggregates inside the ranking window
    current: Vec<TopicAggregate>,

    /// Aggregates of the preceding window, read by `volume_increase_abs`
    #[serde(default)]
    previous: Vec<TopicAggregate>,
}

/// Rank topics from a file of aggregates and print the entries
pub fn rank(config: &Config, input: &Path, rank_by: &str, limit: usize) -> Result<()> {
    let data: RankInput = read_json(input)?;
    let strategy: RankStrategy = rank_by.parse().context("Invalid --rank-by")?;

    if strategy.needs_previous_window() && data.previous.is_empty() {
        tracing::warn!("No previous-window aggregates supplied; every topic counts as new");
    }

    let entries = rank_topics(
        &data.current,
        &data.previous,
        strategy,
        limit,
        &config.analysis.concern_labels,
    );

    tracing::info!(rank_by = %strategy, ranked = entries.len(), "Ranking complete");
    print_json(&entries, config.analysis.output_precision)
}
