use std::process::ExitCode;

use clap::Parser;
use miette::IntoDiagnostic;

use astro_dataset_builder::cli::{ConfigArgs, finish, init_tracing};
use astro_dataset_builder::config::ConfigLoader;
use astro_dataset_builder::convert::{convert_directory, summarize, write_manifests};
use astro_dataset_builder::layout::OutputLayout;
use astro_dataset_builder::output::{JsonOutput, LogProgress};

#[derive(Parser)]
#[command(name = "astro-convert")]
#[command(about = "Convert .fits files to .npy arrays and record which files failed")]
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
    let convert = ConfigLoader::resolve_convert(&config)?;
    let layout = OutputLayout::new(convert.output_dir.clone());
    layout.copy_config(&cli.config.config_file)?;

    let manifest = convert_directory(&convert.input_dir, &layout, &LogProgress)?;
    let written = write_manifests(&manifest, &layout)?;

    JsonOutput::print(&summarize(&manifest, &layout, &written)).into_diagnostic()?;
    Ok(())
}
