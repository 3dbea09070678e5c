use std::process::ExitCode;

use clap::Parser;
use miette::IntoDiagnostic;

use astro_dataset_builder::archive::normalize_archives;
use astro_dataset_builder::cli::{ConfigArgs, finish, init_tracing};
use astro_dataset_builder::config::ConfigLoader;
use astro_dataset_builder::layout::OutputLayout;
use astro_dataset_builder::output::{JsonOutput, LogProgress};

#[derive(Parser)]
#[command(name = "astro-extract")]
#[command(about = "Decompress downloaded archives into one directory of .fits files")]
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
    let extract = ConfigLoader::resolve_extract(&config)?;
    if let Some(root) = &config.output_dir {
        OutputLayout::new(root.clone()).copy_config(&cli.config.config_file)?;
    }

    let summary = normalize_archives(&extract.source_dir, &extract.target_dir, &LogProgress)?;
    JsonOutput::print(&summary).into_diagnostic()?;
    Ok(())
}
