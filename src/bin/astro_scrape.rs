use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use miette::IntoDiagnostic;

use astro_dataset_builder::cli::{ConfigArgs, finish, init_tracing};
use astro_dataset_builder::config::ConfigLoader;
use astro_dataset_builder::crawler::{CrawlOptions, Crawler};
use astro_dataset_builder::fetch::HttpFetcher;
use astro_dataset_builder::layout::OutputLayout;
use astro_dataset_builder::output::{JsonOutput, LogProgress};

#[derive(Parser)]
#[command(name = "astro-scrape")]
#[command(about = "Crawl the lensed quasar catalog and download survey cutouts")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    config: ConfigArgs,
}

fn main() -> ExitCode {
    finish(run())
}

fn run() -> miette::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let config = ConfigLoader::load(&cli.config.config_file)?;
    let crawl = ConfigLoader::resolve_crawl(&config)?;
    let layout = OutputLayout::new(crawl.output_dir.clone());
    layout.copy_config(&cli.config.config_file)?;

    let fetcher = HttpFetcher::new(Duration::from_secs(crawl.http_timeout_secs))?;
    let crawler = Crawler::new(fetcher, layout.clone(), CrawlOptions::from(&crawl));
    let result = crawler.run(&LogProgress)?;

    JsonOutput::print(&result.summary(&layout)).into_diagnostic()?;
    Ok(())
}
