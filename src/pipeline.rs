use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use url::Url;

use crate::cli::Cli;
use crate::extract::{FanoutOptions, StructuredExtractor};
use crate::fetch::{FetchOptions, HttpPageFetcher, PageFetcher};
use crate::openai::{OpenAiClient, OpenAiConfig, StructuredCompletion};
use crate::scratch::ScratchStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub links: usize,
    pub fetched: usize,
    pub exported: usize,
    pub out: PathBuf,
}

pub fn openai_config(args: &Cli) -> OpenAiConfig {
    let api_key = args
        .openai_api_key
        .clone()
        .or_else(|| std::env::var("OPENAI_API_KEY").ok());
    OpenAiConfig {
        api_key,
        base_url: args.openai_base_url.clone(),
        model: args.openai_model.clone(),
        timeout: Duration::from_secs(args.openai_timeout_secs),
    }
}

pub async fn run(args: &Cli) -> anyhow::Result<RunSummary> {
    let fetcher = HttpPageFetcher::new(Duration::from_secs(args.fetch_timeout_secs))
        .context("build page fetcher")?;
    let completion = OpenAiClient::new(openai_config(args)).context("build OpenAI client")?;
    run_with(args, Arc::new(fetcher), Arc::new(completion)).await
}

pub async fn run_with(
    args: &Cli,
    fetcher: Arc<dyn PageFetcher>,
    completion: Arc<dyn StructuredCompletion>,
) -> anyhow::Result<RunSummary> {
    let base_url = Url::parse(&args.base_url).context("parse --base-url")?;
    if base_url.scheme() != "http" && base_url.scheme() != "https" {
        anyhow::bail!("--base-url must be http/https: {base_url}");
    }
    let out = PathBuf::from(&args.out);
    let extractor =
        Arc::new(StructuredExtractor::new(completion).context("build structured extractor")?);

    let scratch = ScratchStore::new(&args.cache_dir);
    scratch.clear();
    scratch.ensure_exists().context("prepare scratch dir")?;

    tracing::info!(query = %args.search_query, "run: discover");
    let hrefs = crate::discover::discover(
        fetcher.as_ref(),
        &scratch,
        &base_url,
        &args.search_query,
        Duration::from_millis(args.search_settle_ms),
    )
    .await
    .context("discover detail links")?;
    let urls = crate::discover::resolve_detail_urls(&base_url, &hrefs)?;

    tracing::info!(urls = urls.len(), "run: fetch");
    let captures = crate::fetch::fetch_all(
        fetcher.as_ref(),
        &scratch,
        &urls,
        FetchOptions::bypass_cache(Duration::from_millis(args.detail_settle_ms)),
    )
    .await
    .context("fetch detail pages")?;

    let texts = captures
        .into_iter()
        .filter_map(|capture| {
            if capture.success {
                Some(capture.text_content)
            } else {
                tracing::warn!(url = %capture.source_url, "skipping page that failed to fetch");
                None
            }
        })
        .collect::<Vec<_>>();
    let fetched = texts.len();

    tracing::info!(pages = fetched, "run: extract");
    let options = FanoutOptions {
        concurrency: args
            .extract_concurrency
            .unwrap_or_else(crate::extract::default_concurrency),
        on_error: args.on_extract_error,
    };
    let records = crate::extract::extract_all(extractor, texts, options)
        .await
        .context("extract records")?
        .into_iter()
        .filter_map(Result::ok)
        .collect::<Vec<_>>();

    tracing::info!(rows = records.len(), out = %out.display(), "run: export");
    crate::export::export_csv(&records, &out).context("export csv")?;

    Ok(RunSummary {
        links: urls.len(),
        fetched,
        exported: records.len(),
        out,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use clap::Parser as _;

    use super::*;
    use crate::fetch::FetchedPage;
    use crate::formats::sample_record;
    use crate::openai::{CompletionError, StructuredSchema};

    struct Marketplace;

    #[async_trait]
    impl PageFetcher for Marketplace {
        async fn fetch_one(&self, url: &str, _options: &FetchOptions) -> anyhow::Result<FetchedPage> {
            let (html, success) = if url.contains("/services/search") {
                (
                    r#"<a href="/services/product/one">1</a>
<a href="/services/product/broken">2</a>
<a href="/about">3</a>
<a href="/services/product/three">4</a>"#
                        .to_owned(),
                    true,
                )
            } else if url.ends_with("/broken") {
                ("<h1>Service Unavailable</h1>".to_owned(), false)
            } else {
                let slug = url.rsplit('/').next().unwrap_or_default();
                (format!("<h1>{slug}</h1>"), true)
            };
            Ok(FetchedPage {
                url: url.to_owned(),
                html,
                success,
            })
        }
    }

    #[derive(Default)]
    struct RecordingCompletion {
        inputs: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl StructuredCompletion for RecordingCompletion {
        async fn complete_structured(
            &self,
            _system_prompt: &str,
            user_content: &str,
            _schema: &StructuredSchema,
        ) -> Result<serde_json::Value, CompletionError> {
            self.inputs
                .lock()
                .map_err(|_| CompletionError::InvalidResponse("poisoned".to_owned()))?
                .push(user_content.to_owned());
            let mut record = sample_record();
            record.title = user_content.trim().to_owned();
            serde_json::to_value(record)
                .map_err(|err| CompletionError::InvalidResponse(err.to_string()))
        }
    }

    #[tokio::test]
    async fn run_with_skips_failed_pages_and_exports_in_order() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let out = temp.path().join("output.csv");
        let cache = temp.path().join("cache");
        std::fs::create_dir_all(cache.join("old"))?;
        std::fs::write(cache.join("stale.html"), "stale")?;

        let args = Cli::try_parse_from([
            "gigscrape",
            "--search-query",
            "logo design",
            "--base-url",
            "https://market.test",
            "--out",
            out.to_str().ok_or_else(|| anyhow::anyhow!("non-UTF-8 temp path"))?,
            "--cache-dir",
            cache.to_str().ok_or_else(|| anyhow::anyhow!("non-UTF-8 temp path"))?,
            "--search-settle-ms",
            "0",
            "--detail-settle-ms",
            "0",
        ])?;
        let completion = Arc::new(RecordingCompletion::default());

        let summary = run_with(&args, Arc::new(Marketplace), completion.clone()).await?;

        assert_eq!(summary.links, 3);
        assert_eq!(summary.fetched, 2);
        assert_eq!(summary.exported, 2);

        let inputs = completion
            .inputs
            .lock()
            .map_err(|_| anyhow::anyhow!("poisoned"))?
            .clone();
        assert_eq!(inputs.len(), 2);
        assert!(inputs.iter().all(|text| !text.contains("Service Unavailable")));

        let mut reader = csv::Reader::from_path(&out)?;
        let titles = reader
            .records()
            .map(|row| row.map(|row| row[1].to_owned()))
            .collect::<Result<Vec<_>, _>>()?;
        assert_eq!(titles.len(), 2);
        assert!(titles[0].contains("one"));
        assert!(titles[1].contains("three"));

        assert!(!cache.join("stale.html").exists());
        assert!(!cache.join("old").exists());
        assert!(cache.join("search_result.html").is_file());
        for idx in 0..3 {
            assert!(cache.join(format!("project_result_{idx}.html")).is_file());
        }
        Ok(())
    }
}
