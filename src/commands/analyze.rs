use anyhow::{bail, Context, Result};
use std::path::Path;

use topicpulse::analytics::{execute, AnalysisRequest};
use topicpulse::config::Config;
use topicpulse::storage::MemorySignalStore;

use super::{print_json, read_json};

/// Analyze the inline series of a request file and print the result
pub async fn analyze(config: &Config, input: &Path) -> Result<()> {
    let request: AnalysisRequest = read_json(input)?;

    if request.time_series_data.is_none() {
        bail!(
            "{} has no time_series_data; stored signals can only be analyzed through the API",
            input.display()
        );
    }

    let store = MemorySignalStore::new();
    let output = execute(&request, &store, &config.analysis_defaults())
        .await
        .with_context(|| format!("Analysis '{}' failed", request.analysis_type))?;

    tracing::info!(
        signal_name = %output.signal_name,
        analysis_type = %output.result.analysis_type(),
        "Analysis complete"
    );

    print_json(&output, config.analysis.output_precision)
}
