//! Pieces shared by the stage binaries.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Args;
use tracing_subscriber::EnvFilter;

use crate::error::AstroError;

#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    /// YAML configuration document for this run
    #[arg(short = 'c', long)]
    pub config_file: PathBuf,
}

/// Logs go to stderr so stdout carries only the JSON summary. Defaults to `info` when
/// `RUST_LOG` is unset.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

pub fn map_exit_code(error: &AstroError) -> u8 {
    match error {
        AstroError::ConfigRead(_)
        | AstroError::ConfigParse(_)
        | AstroError::MissingConfigKey(_)
        | AstroError::InvalidConfig { .. } => 2,
        AstroError::Network(_) | AstroError::HttpStatus { .. } => 3,
        _ => 1,
    }
}

/// Prints the report and turns the outcome of a stage into a process exit code.
pub fn finish(result: miette::Result<()>) -> ExitCode {
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(report) => {
            eprintln!("{report:?}");
            let code = report
                .downcast_ref::<AstroError>()
                .map(map_exit_code)
                .unwrap_or(1);
            ExitCode::from(code)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes() {
        assert_eq!(map_exit_code(&AstroError::MissingConfigKey("output_dir")), 2);
        assert_eq!(
            map_exit_code(&AstroError::ConfigRead(PathBuf::from("missing.yaml"))),
            2
        );
        assert_eq!(map_exit_code(&AstroError::Network("timeout".into())), 3);
        assert_eq!(
            map_exit_code(&AstroError::HttpStatus {
                status: 500,
                url: "https://example.org".into()
            }),
            3
        );
        assert_eq!(map_exit_code(&AstroError::Filesystem("disk full".into())), 1);
    }
}
