use std::{io, path::PathBuf};

use thiserror::Error;

/// Problems reading the configuration document.  These abort the run.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config file not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("failed to read config file {}: {source}", .path.display())]
    Io { path: PathBuf, source: io::Error },
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// Everything that can go wrong while fetching and unpacking one archive.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Failed to fetch {url}, status={status}")]
    Transfer { url: String, status: u16 },
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("bad zip archive: {0}")]
    Archive(#[from] zip::result::ZipError),
    #[error("{0}")]
    Io(#[from] io::Error),
}

#[derive(Error, Debug)]
pub enum IngestError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to build http client: {0}")]
    Client(#[from] reqwest::Error),
    #[error("{0}")]
    Io(#[from] io::Error),
}
