use std::fs;
use std::path::{Path, PathBuf};

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::error::AstroError;

pub const DEFAULT_CATALOG_URL: &str = "https://research.ast.cam.ac.uk/lensedquasars/index.html";
pub const DEFAULT_SURVEY: &str = "HST";
pub const DEFAULT_LINK_COLUMN: &str = "Name";
pub const DEFAULT_HST_SUFFIX: &str = "cutout.npy";
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 60;

/// Flat key/value document shared by every stage. Each stage picks the keys it needs.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub output_dir: Option<Utf8PathBuf>,
    #[serde(default)]
    pub catalog_url: Option<String>,
    #[serde(default)]
    pub survey: Option<String>,
    #[serde(default)]
    pub link_column: Option<String>,
    #[serde(default)]
    pub http_timeout_secs: Option<u64>,
    #[serde(default)]
    pub source_dir: Option<Utf8PathBuf>,
    #[serde(default)]
    pub target_dir: Option<Utf8PathBuf>,
    #[serde(default)]
    pub dir_hst: Option<Utf8PathBuf>,
    #[serde(default)]
    pub dir_zoo: Option<Utf8PathBuf>,
    #[serde(default)]
    pub dir_output: Option<Utf8PathBuf>,
    #[serde(default)]
    pub image_size: Option<u32>,
    #[serde(default)]
    pub hst_suffix: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CrawlConfig {
    pub output_dir: Utf8PathBuf,
    pub catalog_url: String,
    pub survey: String,
    pub link_column: String,
    pub http_timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct ExtractConfig {
    pub source_dir: Utf8PathBuf,
    pub target_dir: Utf8PathBuf,
}

#[derive(Debug, Clone)]
pub struct ConvertConfig {
    pub input_dir: Utf8PathBuf,
    pub output_dir: Utf8PathBuf,
}

#[derive(Debug, Clone)]
pub struct BuildConfig {
    pub dir_hst: Utf8PathBuf,
    pub dir_zoo: Utf8PathBuf,
    pub dir_output: Utf8PathBuf,
    pub image_size: u32,
    pub hst_suffix: String,
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn load(path: &Path) -> Result<Config, AstroError> {
        let content =
            fs::read_to_string(path).map_err(|_| AstroError::ConfigRead(PathBuf::from(path)))?;
        Self::parse(&content)
    }

    /// YAML parser; JSON documents are accepted as well.
    pub fn parse(content: &str) -> Result<Config, AstroError> {
        serde_yaml::from_str(content).map_err(|err| AstroError::ConfigParse(err.to_string()))
    }

    pub fn resolve_crawl(config: &Config) -> Result<CrawlConfig, AstroError> {
        let output_dir = config
            .output_dir
            .clone()
            .ok_or(AstroError::MissingConfigKey("output_dir"))?;
        let http_timeout_secs = config
            .http_timeout_secs
            .unwrap_or(DEFAULT_HTTP_TIMEOUT_SECS);
        if http_timeout_secs == 0 {
            return Err(AstroError::InvalidConfig {
                key: "http_timeout_secs",
                message: "must be greater than zero".to_string(),
            });
        }
        Ok(CrawlConfig {
            output_dir,
            catalog_url: config
                .catalog_url
                .clone()
                .unwrap_or_else(|| DEFAULT_CATALOG_URL.to_string()),
            survey: non_empty(config.survey.as_deref(), "survey")?
                .unwrap_or_else(|| DEFAULT_SURVEY.to_string()),
            link_column: non_empty(config.link_column.as_deref(), "link_column")?
                .unwrap_or_else(|| DEFAULT_LINK_COLUMN.to_string()),
            http_timeout_secs,
        })
    }

    /// `source_dir` defaults to `<output_dir>/downloads`, `target_dir` to `<output_dir>/tmp`.
    pub fn resolve_extract(config: &Config) -> Result<ExtractConfig, AstroError> {
        let source_dir = match (&config.source_dir, &config.output_dir) {
            (Some(dir), _) => dir.clone(),
            (None, Some(output)) => output.join("downloads"),
            (None, None) => return Err(AstroError::MissingConfigKey("source_dir")),
        };
        Ok(ExtractConfig {
            source_dir,
            target_dir: consolidated_dir(config, "target_dir")?,
        })
    }

    pub fn resolve_convert(config: &Config) -> Result<ConvertConfig, AstroError> {
        let output_dir = config
            .output_dir
            .clone()
            .ok_or(AstroError::MissingConfigKey("output_dir"))?;
        Ok(ConvertConfig {
            input_dir: consolidated_dir(config, "target_dir")?,
            output_dir,
        })
    }

    pub fn resolve_build(config: &Config) -> Result<BuildConfig, AstroError> {
        let image_size = config
            .image_size
            .ok_or(AstroError::MissingConfigKey("image_size"))?;
        if image_size == 0 {
            return Err(AstroError::InvalidConfig {
                key: "image_size",
                message: "must be greater than zero".to_string(),
            });
        }
        Ok(BuildConfig {
            dir_hst: config
                .dir_hst
                .clone()
                .ok_or(AstroError::MissingConfigKey("dir_hst"))?,
            dir_zoo: config
                .dir_zoo
                .clone()
                .ok_or(AstroError::MissingConfigKey("dir_zoo"))?,
            dir_output: config
                .dir_output
                .clone()
                .ok_or(AstroError::MissingConfigKey("dir_output"))?,
            image_size,
            hst_suffix: non_empty(config.hst_suffix.as_deref(), "hst_suffix")?
                .unwrap_or_else(|| DEFAULT_HST_SUFFIX.to_string()),
        })
    }
}

fn consolidated_dir(config: &Config, key: &'static str) -> Result<Utf8PathBuf, AstroError> {
    match (&config.target_dir, &config.output_dir) {
        (Some(dir), _) => Ok(dir.clone()),
        (None, Some(output)) => Ok(output.join("tmp")),
        (None, None) => Err(AstroError::MissingConfigKey(key)),
    }
}

fn non_empty(value: Option<&str>, key: &'static str) -> Result<Option<String>, AstroError> {
    match value.map(str::trim) {
        Some("") => Err(AstroError::InvalidConfig {
            key,
            message: "must not be empty".to_string(),
        }),
        Some(value) => Ok(Some(value.to_string())),
        None => Ok(None),
    }
}
