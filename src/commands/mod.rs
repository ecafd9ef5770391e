pub mod aggregate;
pub mod analyze;
pub mod rank;
pub mod serve;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

use topicpulse::service::to_rounded_value;

// Re-export command functions for convenience
pub use aggregate::aggregate;
pub use analyze::analyze;
pub use rank::rank;
pub use serve::serve;

/// Read and parse a JSON input file
pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read input file: {}", path.display()))?;

    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse JSON input file: {}", path.display()))
}

/// Print `data` as pretty JSON rounded to `precision` places
pub(crate) fn print_json<T: Serialize>(data: &T, precision: u32) -> Result<()> {
    let value = to_rounded_value(data, precision).context("Failed to serialize output")?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}
