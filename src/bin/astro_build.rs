use std::process::ExitCode;

use clap::Parser;
use miette::IntoDiagnostic;

use astro_dataset_builder::cli::{ConfigArgs, finish, init_tracing};
use astro_dataset_builder::config::ConfigLoader;
use astro_dataset_builder::layout::OutputLayout;
use astro_dataset_builder::normalize::build_dataset;
use astro_dataset_builder::output::{JsonOutput, LogProgress};

#[derive(Parser)]
#[command(name = "astro-build")]
#[command(about = "Normalize HST cutouts and Galaxy Zoo images into a square training set")]
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
    let build = ConfigLoader::resolve_build(&config)?;
    OutputLayout::new(build.dir_output.clone()).copy_config(&cli.config.config_file)?;

    let summary = build_dataset(&build, &LogProgress)?;
    JsonOutput::print(&summary).into_diagnostic()?;
    Ok(())
}
