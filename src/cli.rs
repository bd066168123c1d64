use clap::Parser;

use crate::extract::OnExtractError;

#[derive(Debug, Parser)]
#[command(author, version, about = "Search marketplace service listings and extract them to CSV")]
pub struct Cli {
    /// Search query text.
    #[arg(long, visible_alias = "search_query")]
    pub search_query: String,

    /// OpenAI API key (overrides OPENAI_API_KEY).
    #[arg(long)]
    pub openai_api_key: Option<String>,

    /// Output CSV path.
    #[arg(long, default_value = "output.csv")]
    pub out: String,

    /// Scratch directory for raw page captures (cleared on every run).
    #[arg(long, default_value = "cache")]
    pub cache_dir: String,

    /// Marketplace base URL.
    #[arg(long, default_value = "https://www.upwork.com")]
    pub base_url: String,

    /// Delay before capturing the search results page.
    #[arg(long, default_value_t = 2000)]
    pub search_settle_ms: u64,

    /// Delay before capturing each detail page.
    #[arg(long, default_value_t = 1000)]
    pub detail_settle_ms: u64,

    /// Per-request timeout for page fetches.
    #[arg(long, default_value_t = 60)]
    pub fetch_timeout_secs: u64,

    /// OpenAI API base URL.
    #[arg(long, env = "OPENAI_BASE_URL", default_value = crate::openai::DEFAULT_BASE_URL)]
    pub openai_base_url: String,

    /// OpenAI model used for extraction.
    #[arg(long, env = "OPENAI_MODEL", default_value = crate::openai::DEFAULT_MODEL)]
    pub openai_model: String,

    /// Per-request timeout for extraction calls.
    #[arg(long, default_value_t = 300)]
    pub openai_timeout_secs: u64,

    /// Maximum concurrent extraction calls (default: available parallelism).
    #[arg(long)]
    pub extract_concurrency: Option<usize>,

    /// What to do when a single page fails to extract.
    #[arg(long, value_enum, default_value_t = OnExtractError::Abort)]
    pub on_extract_error: OnExtractError,
}
