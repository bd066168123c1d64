use std::sync::LazyLock;

use anyhow::Context as _;
use regex::Regex;
use url::Url;

use crate::fetch::{FetchOptions, PageFetcher};
use crate::scratch::ScratchStore;

/// Substring that marks a service detail page link.
pub const DETAIL_PATH_MARKER: &str = "/services/product/";

static ANCHOR_HREF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<a[^>]+href=['"]([^'"]+)['"]"#).expect("anchor href regex is valid")
});

/// `base_url` must be a bare origin; the search path is absolute on the site.
pub fn search_url(base_url: &Url, query: &str) -> anyhow::Result<Url> {
    if base_url.path() != "/" {
        anyhow::bail!("base url must not have a path: {base_url}");
    }
    let mut url = base_url
        .join("/services/search")
        .with_context(|| format!("build search url from base: {base_url}"))?;
    url.query_pairs_mut().clear().append_pair("q", query);
    Ok(url)
}

/// Fetches the search results page for `query` and returns the detail page
/// hrefs it links to, in document order with duplicates kept.
pub async fn discover(
    fetcher: &dyn PageFetcher,
    scratch: &ScratchStore,
    base_url: &Url,
    query: &str,
    settle_delay: std::time::Duration,
) -> anyhow::Result<Vec<String>> {
    let url = search_url(base_url, query)?;
    tracing::info!(url = %url, "fetch search results");

    let page = fetcher
        .fetch_one(url.as_str(), &FetchOptions::bypass_cache(settle_delay))
        .await
        .context("fetch search results page")?;
    scratch
        .write(crate::scratch::search_result_name(), &page.html)
        .context("write search results to scratch")?;
    if !page.success {
        anyhow::bail!("search results page fetch was not successful: {url}");
    }

    let links = detail_links(&page.html);
    tracing::info!(links = links.len(), "discovered detail links");
    Ok(links)
}

pub fn detail_links(html: &str) -> Vec<String> {
    ANCHOR_HREF
        .captures_iter(html)
        .filter_map(|caps| caps.get(1))
        .map(|href| href.as_str())
        .filter(|href| href.contains(DETAIL_PATH_MARKER))
        .map(str::to_owned)
        .collect()
}

/// Resolves hrefs against `base_url`. Absolute hrefs are kept as they are.
pub fn resolve_detail_urls(base_url: &Url, hrefs: &[String]) -> anyhow::Result<Vec<String>> {
    hrefs
        .iter()
        .map(|href| {
            base_url
                .join(href)
                .map(|url| url.to_string())
                .with_context(|| format!("resolve detail link: {href}"))
        })
        .collect()
}
