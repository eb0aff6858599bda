use thiserror::Error;

use crate::config::ConfigError;

#[derive(Error, Debug)]
pub enum SimError {
    #[error("Unknown policy '{name}' (available: {available})")]
    UnknownPolicy { name: String, available: String },
    #[error(transparent)]
    Config(#[from] ConfigError),
}
