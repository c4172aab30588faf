//! Coordinator configuration.
//!
//! The configuration file is line oriented, one `<key> <value>` pair per line,
//! and `#` starts a comment that runs to the end of the line:
//!
//! ```text
//! process 1        # instance id of this process, allocated when omitted
//! workers 4        # dispatcher worker threads
//! group render     # group (type) name registered at startup, repeatable
//! ```
//!
//! Every process that talks to the same coordinator should agree on the group
//! names, otherwise groups registered on one side will not resolve on the
//! other.

use std::{fs, io, path::Path, str::FromStr};

use thiserror::Error;

use crate::common::{InstanceId, INVALID_INSTANCE_ID};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub process_id: Option<InstanceId>,
    pub n_worker: usize,
    pub group: Vec<String>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("line {line}: missing value for `{key}`")]
    MissingValue { line: usize, key: String },
    #[error("line {line}: unexpected key `{key}`")]
    UnknownKey { line: usize, key: String },
    #[error("line {line}: invalid value `{value}` for `{key}`")]
    InvalidValue {
        line: usize,
        key: String,
        value: String,
    },
    #[error("failed to read configuration: {0}")]
    Io(#[from] io::Error),
}

impl Default for Config {
    fn default() -> Self {
        Self {
            process_id: None,
            n_worker: 4,
            group: Vec::new(),
        }
    }
}

impl FromStr for Config {
    type Err = ConfigError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut config = Self::default();
        for (index, line) in s.lines().enumerate() {
            let line_number = index + 1;
            let line = line.split_once('#').map_or(line, |(line, _)| line).trim();
            if line.is_empty() {
                continue;
            }
            let (key, value) = match line.split_once(char::is_whitespace) {
                Some((key, value)) => (key, value.trim()),
                None => (line, ""),
            };
            if value.is_empty() {
                return Err(ConfigError::MissingValue {
                    line: line_number,
                    key: key.to_string(),
                });
            }
            let invalid = || ConfigError::InvalidValue {
                line: line_number,
                key: key.to_string(),
                value: value.to_string(),
            };
            match key {
                "process" => {
                    let process_id: InstanceId = value.parse().map_err(|_| invalid())?;
                    if process_id == INVALID_INSTANCE_ID {
                        return Err(invalid());
                    }
                    config.process_id = Some(process_id);
                }
                "workers" => {
                    config.n_worker = value.parse().map_err(|_| invalid())?;
                    if config.n_worker == 0 {
                        return Err(invalid());
                    }
                }
                "group" => config.group.push(value.to_string()),
                _ => {
                    return Err(ConfigError::UnknownKey {
                        line: line_number,
                        key: key.to_string(),
                    })
                }
            }
        }
        Ok(config)
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        fs::read_to_string(path)?.parse()
    }
}
