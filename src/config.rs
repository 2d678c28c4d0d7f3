//! Pipeline configuration
//!
//! Hardware and firmware revisions change the curve, the counter prefix and
//! the key tag, so these are configuration values rather than literals.
//!
//! | Variable                     | Default                         |
//! |------------------------------|---------------------------------|
//! | `TAP_SIGNATURE_SCHEME`       | `secp256k1` (or `p256`)         |
//! | `TAP_COUNTER_PREFIX_HEX`     | hex of `"\x19Attest counter pk62:\n"` |
//! | `TAP_PUBLIC_KEY_TAG_LEN`     | `4`                             |
//! | `TAP_REPLAY_WINDOW`          | `0` (strictly increasing, max 64) |
//! | `ENVELOPE_MAX_PAYLOAD_BYTES` | `65536`                         |

use crate::crypto::{SignatureScheme, COUNTER_MESSAGE_PREFIX};
use crate::infra::MAX_REPLAY_WINDOW;

pub const ENV_SIGNATURE_SCHEME: &str = "TAP_SIGNATURE_SCHEME";
pub const ENV_COUNTER_PREFIX_HEX: &str = "TAP_COUNTER_PREFIX_HEX";
pub const ENV_PUBLIC_KEY_TAG_LEN: &str = "TAP_PUBLIC_KEY_TAG_LEN";
pub const ENV_REPLAY_WINDOW: &str = "TAP_REPLAY_WINDOW";
pub const ENV_MAX_PAYLOAD_BYTES: &str = "ENVELOPE_MAX_PAYLOAD_BYTES";

/// Default hardware tag length in hex characters
pub const DEFAULT_PUBLIC_KEY_TAG_LEN: usize = 4;

/// Default bound on serialized envelope payloads (64 KiB)
pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid {var}: '{value}' ({reason})")]
    InvalidValue {
        var: &'static str,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    fn invalid(var: &'static str, value: &str, reason: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            var,
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

/// Configuration for the tap verifier and envelope protocol
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttestConfig {
    pub signature_scheme: SignatureScheme,
    pub counter_prefix: Vec<u8>,
    /// Hex characters stripped from the front of `pkN`
    pub public_key_tag_len: usize,
    /// Nonces this far below the high-water mark are admitted once
    pub replay_window: u32,
    pub max_payload_bytes: usize,
}

impl Default for AttestConfig {
    fn default() -> Self {
        Self {
            signature_scheme: SignatureScheme::default(),
            counter_prefix: COUNTER_MESSAGE_PREFIX.to_vec(),
            public_key_tag_len: DEFAULT_PUBLIC_KEY_TAG_LEN,
            replay_window: 0,
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
        }
    }
}

impl AttestConfig {
    /// Load from environment, falling back per field with a warning
    pub fn from_env() -> Self {
        Self::from_lookup_lenient(|var| std::env::var(var).ok())
    }

    /// Load from environment, failing on the first bad value
    pub fn try_from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from an arbitrary key lookup; unset keys keep their default
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        for var in ALL_VARS {
            if let Some(value) = lookup(var) {
                config.apply(var, &value)?;
            }
        }
        config.validate()?;
        Ok(config)
    }

    fn from_lookup_lenient<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        for var in ALL_VARS {
            if let Some(value) = lookup(var) {
                if let Err(e) = config.apply(var, &value) {
                    tracing::warn!("{}", e);
                }
            }
        }
        if let Err(e) = config.validate() {
            tracing::warn!("{}; using defaults", e);
            return Self::default();
        }
        config
    }

    fn apply(&mut self, var: &'static str, value: &str) -> Result<(), ConfigError> {
        let trimmed = value.trim();
        match var {
            ENV_SIGNATURE_SCHEME => {
                self.signature_scheme = SignatureScheme::parse(trimmed).ok_or_else(|| {
                    ConfigError::invalid(var, value, "expected secp256k1 or p256")
                })?;
            }
            ENV_COUNTER_PREFIX_HEX => {
                let hex_str = trimmed.strip_prefix("0x").unwrap_or(trimmed);
                self.counter_prefix =
                    hex::decode(hex_str).map_err(|e| ConfigError::invalid(var, value, e.to_string()))?;
            }
            ENV_PUBLIC_KEY_TAG_LEN => {
                self.public_key_tag_len = trimmed
                    .parse()
                    .map_err(|_| ConfigError::invalid(var, value, "expected a number"))?;
            }
            ENV_REPLAY_WINDOW => {
                self.replay_window = trimmed
                    .parse()
                    .map_err(|_| ConfigError::invalid(var, value, "expected a number"))?;
            }
            ENV_MAX_PAYLOAD_BYTES => {
                self.max_payload_bytes = trimmed
                    .parse()
                    .map_err(|_| ConfigError::invalid(var, value, "expected a number"))?;
            }
            _ => {}
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.counter_prefix.is_empty() {
            return Err(ConfigError::invalid(
                ENV_COUNTER_PREFIX_HEX,
                "",
                "prefix must not be empty",
            ));
        }
        if self.replay_window > MAX_REPLAY_WINDOW {
            return Err(ConfigError::invalid(
                ENV_REPLAY_WINDOW,
                &self.replay_window.to_string(),
                format!("maximum is {}", MAX_REPLAY_WINDOW),
            ));
        }
        if self.max_payload_bytes == 0 {
            return Err(ConfigError::invalid(
                ENV_MAX_PAYLOAD_BYTES,
                "0",
                "must be positive",
            ));
        }
        Ok(())
    }
}

const ALL_VARS: [&str; 5] = [
    ENV_SIGNATURE_SCHEME,
    ENV_COUNTER_PREFIX_HEX,
    ENV_PUBLIC_KEY_TAG_LEN,
    ENV_REPLAY_WINDOW,
    ENV_MAX_PAYLOAD_BYTES,
];
