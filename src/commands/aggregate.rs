use anyhow::{anyhow, Context, Result};
use std::path::Path;

use topicpulse::analytics::{aggregate_by_bucket, aggregate_request};
use topicpulse::config::Config;
use topicpulse::models::{AggregationRequest, DocumentSignal, TimeAggregation};

use super::{print_json, read_json};

/// Aggregate the documents of a request file
///
/// With `bucket`, documents inside the request's timeframe are split into
/// buckets of that width and one aggregate per bucket is printed. Otherwise
/// all documents are aggregated over the request's own timeframe and a
/// single aggregate is printed.
pub fn aggregate(config: &Config, input: &Path, bucket: Option<&str>) -> Result<()> {
    let request: AggregationRequest = read_json(input)?;
    let precision = config.analysis.output_precision;

    match bucket {
        Some(bucket) => {
            let aggregation: TimeAggregation = bucket.parse().map_err(|e: String| anyhow!(e))?;
            let documents: Vec<DocumentSignal> = request
                .documents
                .iter()
                .filter(|doc| request.in_timeframe(doc))
                .cloned()
                .collect();

            let dropped = request.documents.len() - documents.len();
            if dropped > 0 {
                tracing::warn!(dropped, "Documents outside the requested timeframe were not bucketed");
            }

            let aggregates = aggregate_by_bucket(&request.topic_id, &request.topic_name, &documents, aggregation)
                .context("Aggregation failed")?;

            tracing::info!(
                topic_id = %request.topic_id,
                buckets = aggregates.len(),
                "Aggregated documents into buckets"
            );
            print_json(&aggregates, precision)
        }
        None => {
            let aggregate = aggregate_request(&request).context("Aggregation failed")?;

            tracing::info!(
                topic_id = %aggregate.topic_id,
                documents = aggregate.document_count,
                "Aggregated documents"
            );
            print_json(&aggregate, precision)
        }
    }
}
