//! Node configuration files.
//!
//! Bootstrap file:
//! ```text
//! 0
//! 9000
//! 5 x
//! 800 y
//! ```
//! Name server file:
//! ```text
//! 300
//! 9300
//! 127.0.0.1 9000
//! ```
//! Blank lines are ignored.

use crate::membership::types::{BOOTSTRAP_ID, MAX_KEY};
use crate::storage::memory::validate_entry;

use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Cannot read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Config file is missing the {0} line")]
    Missing(&'static str),

    #[error("Line {line}: {message}")]
    Invalid { line: usize, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapConfig {
    pub port: u16,
    /// Entries the bootstrap node starts with.
    pub seeds: Vec<(u32, String)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameServerConfig {
    pub id: u32,
    pub port: u16,
    pub bootstrap_host: String,
    pub bootstrap_port: u16,
}

impl BootstrapConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::parse(&read(path.as_ref())?)
    }

    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let mut lines = significant_lines(contents);

        let (line, id) = lines.next().ok_or(ConfigError::Missing("node id"))?;
        let id: u32 = number(line, id, "node id")?;
        if id != BOOTSTRAP_ID {
            return Err(ConfigError::Invalid {
                line,
                message: format!("bootstrap node id must be {}, found {}", BOOTSTRAP_ID, id),
            });
        }

        let (line, port) = lines.next().ok_or(ConfigError::Missing("port"))?;
        let port = number(line, port, "port")?;

        let mut seeds = Vec::new();
        for (line, text) in lines {
            let mut tokens = text.split_whitespace();
            let (Some(key), Some(value), None) = (tokens.next(), tokens.next(), tokens.next())
            else {
                return Err(ConfigError::Invalid {
                    line,
                    message: format!("expected '<key> <value>', found '{}'", text),
                });
            };
            let key = number(line, key, "key")?;
            validate_entry(key, value).map_err(|e| ConfigError::Invalid {
                line,
                message: e.to_string(),
            })?;
            if seeds.iter().any(|(existing, _)| *existing == key) {
                tracing::warn!(
                    "Config line {}: key {} repeated, keeping the first value",
                    line,
                    key
                );
                continue;
            }
            seeds.push((key, value.to_string()));
        }

        Ok(Self { port, seeds })
    }
}

impl NameServerConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::parse(&read(path.as_ref())?)
    }

    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let mut lines = significant_lines(contents);

        let (line, id) = lines.next().ok_or(ConfigError::Missing("node id"))?;
        let id: u32 = number(line, id, "node id")?;
        if id == BOOTSTRAP_ID || id > MAX_KEY {
            return Err(ConfigError::Invalid {
                line,
                message: format!("name server id must be in 1-{}, found {}", MAX_KEY, id),
            });
        }

        let (line, port) = lines.next().ok_or(ConfigError::Missing("port"))?;
        let port = number(line, port, "port")?;

        let (line, bootstrap) = lines
            .next()
            .ok_or(ConfigError::Missing("bootstrap address"))?;
        let tokens: Vec<&str> = bootstrap.split_whitespace().collect();
        let (bootstrap_host, bootstrap_port) = match tokens[..] {
            [host, port] => (host.to_string(), number(line, port, "bootstrap port")?),
            _ => {
                return Err(ConfigError::Invalid {
                    line,
                    message: format!("expected '<host> <port>', found '{}'", bootstrap),
                });
            }
        };

        Ok(Self {
            id,
            port,
            bootstrap_host,
            bootstrap_port,
        })
    }
}

fn read(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Non-blank lines, trimmed, with 1-based line numbers.
fn significant_lines(contents: &str) -> impl Iterator<Item = (usize, &str)> {
    contents
        .lines()
        .enumerate()
        .map(|(i, text)| (i + 1, text.trim()))
        .filter(|(_, text)| !text.is_empty())
}

fn number<T: std::str::FromStr>(line: usize, token: &str, what: &str) -> Result<T, ConfigError> {
    token.trim().parse().map_err(|_| ConfigError::Invalid {
        line,
        message: format!("invalid {} '{}'", what, token),
    })
}
