use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser as _;

fn main() -> ExitCode {
    // `.env` mutates the process environment, so it is loaded while this is
    // still the only thread.
    let dotenv = dotenvy::dotenv();

    let result = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("build tokio runtime")
        .and_then(|runtime| runtime.block_on(try_main(dotenv)));
    if let Err(err) = result {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn try_main(dotenv: Result<std::path::PathBuf, dotenvy::Error>) -> anyhow::Result<()> {
    gigscrape::logging::init().context("init logging")?;

    match dotenv {
        Ok(path) => tracing::debug!(path = %path.display(), "loaded .env"),
        Err(err) if err.not_found() => {}
        Err(err) => return Err(err).context("load .env"),
    }

    let cli = gigscrape::cli::Cli::parse();
    tracing::debug!(
        query = %cli.search_query,
        out = %cli.out,
        cache_dir = %cli.cache_dir,
        base_url = %cli.base_url,
        model = %cli.openai_model,
        "parsed cli"
    );

    let summary = gigscrape::pipeline::run(&cli).await.context("run")?;
    tracing::info!(
        links = summary.links,
        fetched = summary.fetched,
        exported = summary.exported,
        "run complete"
    );
    println!("Please check the file {}", summary.out.display());

    Ok(())
}
