use std::sync::Arc;

use anyhow::Context as _;

use crate::formats::ExtractedRecord;
use crate::openai::{CompletionError, StructuredCompletion, StructuredSchema};

pub const SYSTEM_PROMPT: &str =
    "You are to extract a content from a website in markdown format to a predefine structure.";

#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("no language model credential configured")]
    MissingCredential,
    #[error("model refused to extract: {0}")]
    Refusal(String),
    #[error("structured completion failed")]
    Completion(#[source] CompletionError),
    #[error("model output does not match the record schema")]
    Schema(#[from] serde_json::Error),
    #[error("extracted record violates constraint: {0}")]
    Constraint(String),
}

impl From<CompletionError> for ExtractionError {
    fn from(err: CompletionError) -> Self {
        match err {
            CompletionError::MissingCredential => Self::MissingCredential,
            CompletionError::Refusal(reason) => Self::Refusal(reason),
            other => Self::Completion(other),
        }
    }
}

/// What the fan-out does when a single page fails to extract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OnExtractError {
    /// Fail the whole run on the first failure.
    #[default]
    Abort,
    /// Log the failure and leave the page out of the results.
    Skip,
}

pub struct StructuredExtractor {
    completion: Arc<dyn StructuredCompletion>,
    schema: StructuredSchema,
}

impl StructuredExtractor {
    pub fn new(completion: Arc<dyn StructuredCompletion>) -> anyhow::Result<Self> {
        let schema =
            StructuredSchema::of::<ExtractedRecord>().context("build extraction schema")?;
        Ok(Self { completion, schema })
    }

    pub async fn extract(&self, text_content: &str) -> Result<ExtractedRecord, ExtractionError> {
        if text_content.trim().is_empty() {
            return Err(ExtractionError::Constraint(
                "page text is empty".to_owned(),
            ));
        }

        let value = self
            .completion
            .complete_structured(SYSTEM_PROMPT, text_content, &self.schema)
            .await?;
        let record: ExtractedRecord = serde_json::from_value(value)?;
        record.validate().map_err(ExtractionError::Constraint)?;
        Ok(record)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FanoutOptions {
    pub concurrency: usize,
    pub on_error: OnExtractError,
}

pub fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Runs the extractor over every text concurrently. Output index `i` holds the
/// outcome for input `i`.
///
/// With [`OnExtractError::Abort`] the first failure is returned as an error and
/// the tasks still in flight are aborted.
pub async fn extract_all(
    extractor: Arc<StructuredExtractor>,
    texts: Vec<String>,
    options: FanoutOptions,
) -> anyhow::Result<Vec<Result<ExtractedRecord, ExtractionError>>> {
    let total = texts.len();
    let concurrency = options.concurrency.max(1).min(total.max(1));
    tracing::info!(pages = total, concurrency, "extract: start");

    let mut pending = texts.into_iter().enumerate();
    let mut join_set = tokio::task::JoinSet::new();
    let mut results: Vec<Option<Result<ExtractedRecord, ExtractionError>>> =
        std::iter::repeat_with(|| None).take(total).collect();
    let mut done = 0usize;
    let mut failed = 0usize;

    loop {
        while join_set.len() < concurrency {
            let Some((page_index, text)) = pending.next() else {
                break;
            };
            let extractor = Arc::clone(&extractor);
            join_set.spawn(async move {
                tracing::debug!(page_index, "extract page");
                let outcome = extractor.extract(&text).await;
                (page_index, outcome)
            });
        }

        let Some(joined) = join_set.join_next().await else {
            break;
        };
        let (page_index, outcome) = joined.context("join extraction task")?;
        done += 1;

        let outcome = match (outcome, options.on_error) {
            (Err(err), OnExtractError::Abort) => {
                return Err(anyhow::Error::new(err).context(format!("extract page {page_index}")));
            }
            (Err(err), OnExtractError::Skip) => {
                failed += 1;
                tracing::warn!(page_index, err = %error_chain(&err), "extraction failed; skipping page");
                Err(err)
            }
            (ok, _) => ok,
        };
        tracing::info!(done, total, failed, "extract: progress");
        results[page_index] = Some(outcome);
    }

    results
        .into_iter()
        .enumerate()
        .map(|(idx, item)| {
            item.ok_or_else(|| anyhow::anyhow!("missing extraction result for page {idx}"))
        })
        .collect()
}

fn error_chain(err: &dyn std::error::Error) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        out.push_str(": ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}
