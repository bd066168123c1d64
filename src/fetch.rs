use std::time::Duration;

use anyhow::Context as _;
use async_trait::async_trait;
use reqwest::header::{ACCEPT, CACHE_CONTROL, PRAGMA, USER_AGENT};

use crate::formats::PageCapture;
use crate::scratch::ScratchStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchOptions {
    pub cache_disabled: bool,
    /// Pause between the response arriving and its content being captured.
    pub settle_delay: Duration,
}

impl FetchOptions {
    pub fn bypass_cache(settle_delay: Duration) -> Self {
        Self {
            cache_disabled: true,
            settle_delay,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage {
    pub url: String,
    pub html: String,
    pub success: bool,
}

#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetches a single page. Transport failures are errors; HTTP-level
    /// failures come back as a page with `success == false`.
    async fn fetch_one(&self, url: &str, options: &FetchOptions) -> anyhow::Result<FetchedPage>;

    /// Fetches every URL concurrently. Output index `i` holds the outcome for
    /// `urls[i]`.
    async fn fetch_many(
        &self,
        urls: &[String],
        options: &FetchOptions,
    ) -> Vec<anyhow::Result<FetchedPage>> {
        futures::future::join_all(urls.iter().map(|url| self.fetch_one(url, options))).await
    }
}

#[derive(Debug, Clone)]
pub struct HttpPageFetcher {
    client: reqwest::Client,
}

impl HttpPageFetcher {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .context("build page fetch http client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch_one(&self, url: &str, options: &FetchOptions) -> anyhow::Result<FetchedPage> {
        let mut request = self
            .client
            .get(url)
            .header(USER_AGENT, concat!("gigscrape/", env!("CARGO_PKG_VERSION")))
            .header(ACCEPT, "text/html,application/xhtml+xml;q=0.9,*/*;q=0.8");
        if options.cache_disabled {
            request = request
                .header(CACHE_CONTROL, "no-cache")
                .header(PRAGMA, "no-cache");
        }

        let response = request.send().await.with_context(|| format!("GET {url}"))?;
        let status = response.status();
        let final_url = response.url().to_string();

        if !options.settle_delay.is_zero() {
            tokio::time::sleep(options.settle_delay).await;
        }

        let html = response
            .text()
            .await
            .with_context(|| format!("read body: {url}"))?;
        if !status.is_success() {
            tracing::debug!(url = %url, %status, "non-success status");
        }

        Ok(FetchedPage {
            url: final_url,
            html,
            success: status.is_success(),
        })
    }
}

/// Fetches every URL concurrently and returns one capture per URL, in input order.
///
/// Each raw page is written to the scratch store as `project_result_<index>.html`.
pub async fn fetch_all(
    fetcher: &dyn PageFetcher,
    scratch: &ScratchStore,
    urls: &[String],
    options: FetchOptions,
) -> anyhow::Result<Vec<PageCapture>> {
    let fetched = fetcher.fetch_many(urls, &options).await;
    if fetched.len() != urls.len() {
        anyhow::bail!(
            "page fetcher returned {} results for {} urls",
            fetched.len(),
            urls.len()
        );
    }

    let mut captures = Vec::with_capacity(urls.len());
    for (index, (url, fetched)) in urls.iter().zip(fetched).enumerate() {
        let capture = match fetched {
            Ok(page) => to_capture(url, page),
            Err(err) => {
                tracing::warn!(url = %url, err = %format!("{err:#}"), "fetch failed");
                PageCapture::failed(url.clone())
            }
        };
        tracing::info!(url = %capture.source_url, success = capture.success, "fetched page");
        scratch
            .write(&crate::scratch::detail_page_name(index), &capture.raw_content)
            .context("write detail page to scratch")?;
        captures.push(capture);
    }
    Ok(captures)
}

fn to_capture(requested_url: &str, page: FetchedPage) -> PageCapture {
    if page.url != requested_url {
        tracing::debug!(url = %requested_url, final_url = %page.url, "followed redirect");
    }
    let text_content = if page.success {
        html2md::parse_html(&page.html)
    } else {
        String::new()
    };
    PageCapture {
        source_url: requested_url.to_owned(),
        raw_content: page.html,
        text_content,
        success: page.success,
    }
}
