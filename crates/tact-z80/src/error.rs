//! Configuration errors.

use thiserror::Error;

/// Rejected CPU configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("interrupt mode {0} does not exist (expected 0, 1 or 2)")]
    InvalidInterruptMode(u8),
}
