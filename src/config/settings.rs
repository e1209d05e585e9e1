//! Engine settings types.
//!
//! These types define the structure of `stackplate.yaml`. Every field has a
//! default, so an empty file is valid.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, SettingsError, StackplateError};
use crate::planner::{DEFAULT_MAX_CONCURRENCY, KindOrder};
use crate::state::STATE_DIR;
use crate::template::{
    AddressValidator, DEFAULT_FETCH_TIMEOUT_SECS, Kind, PassValidator, PrivateIpValidator,
};

/// Engine settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    /// Directory holding the stack store and backend snapshot.
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    /// Whether Jinja templates are accepted.
    #[serde(default = "default_true")]
    pub enable_templating: bool,

    /// Which hosts remote templates may be fetched from.
    #[serde(default)]
    pub address_policy: AddressPolicy,

    /// Timeout for a single remote fetch.
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,

    /// Concurrent backend writes per apply phase.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Custom apply phases; the built-in order when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind_order: Option<Vec<Vec<Kind>>>,

    /// Values exposed to Jinja templates.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub template_parameters: BTreeMap<String, Value>,
}

fn default_state_dir() -> PathBuf {
    PathBuf::from(STATE_DIR)
}

const fn default_true() -> bool {
    true
}

const fn default_fetch_timeout() -> u64 {
    DEFAULT_FETCH_TIMEOUT_SECS
}

const fn default_max_concurrency() -> usize {
    DEFAULT_MAX_CONCURRENCY
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
            enable_templating: true,
            address_policy: AddressPolicy::default(),
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            kind_order: None,
            template_parameters: BTreeMap::new(),
        }
    }
}

impl Settings {
    /// Returns the fetch timeout.
    #[must_use]
    pub const fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    /// Returns the configured kind order.
    ///
    /// # Errors
    ///
    /// Returns an error if the custom order is invalid.
    pub fn kind_order(&self) -> Result<KindOrder> {
        match &self.kind_order {
            Some(phases) => Ok(KindOrder::new(phases.clone())?),
            None => Ok(KindOrder::default()),
        }
    }

    /// Checks values that parse but cannot work.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError::InvalidValue` naming the first bad field.
    pub fn validate(&self) -> Result<()> {
        if self.fetch_timeout_secs == 0 {
            return Err(invalid("fetch_timeout_secs", "0"));
        }
        if self.max_concurrency == 0 {
            return Err(invalid("max_concurrency", "0"));
        }
        self.kind_order()?;
        Ok(())
    }

    /// Path of the stack store file.
    #[must_use]
    pub fn stacks_path(&self) -> PathBuf {
        self.state_dir.join("stacks.json")
    }

    /// Path of the backend snapshot file.
    #[must_use]
    pub fn backend_path(&self) -> PathBuf {
        self.state_dir.join("backend.json")
    }
}

pub(super) fn invalid(name: &str, value: &str) -> StackplateError {
    SettingsError::InvalidValue {
        name: name.to_string(),
        value: value.to_string(),
    }
    .into()
}

/// Address policy for remote template fetches.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum AddressPolicy {
    /// Any resolvable host.
    Pass,
    /// Public addresses only.
    #[default]
    Private,
}

impl AddressPolicy {
    /// Returns the validator enforcing this policy.
    #[must_use]
    pub fn validator(self) -> Arc<dyn AddressValidator> {
        match self {
            Self::Pass => Arc::new(PassValidator),
            Self::Private => Arc::new(PrivateIpValidator),
        }
    }
}

impl fmt::Display for AddressPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pass => write!(f, "pass"),
            Self::Private => write!(f, "private"),
        }
    }
}

impl FromStr for AddressPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pass" => Ok(Self::Pass),
            "private" => Ok(Self::Private),
            other => Err(format!("unknown address policy \"{other}\"")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.state_dir, PathBuf::from(".stackplate"));
        assert!(settings.enable_templating);
        assert_eq!(settings.address_policy, AddressPolicy::Private);
        assert_eq!(settings.fetch_timeout(), Duration::from_secs(30));
        assert_eq!(settings.max_concurrency, 4);
        assert_eq!(settings.kind_order().unwrap(), KindOrder::default());
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_invalid_values() {
        let settings = Settings {
            max_concurrency: 0,
            ..Settings::default()
        };
        assert!(settings.validate().is_err());

        let settings = Settings {
            kind_order: Some(vec![vec![Kind::Bucket]]),
            ..Settings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_policy_from_str() {
        assert_eq!("PASS".parse::<AddressPolicy>(), Ok(AddressPolicy::Pass));
        assert_eq!("private".parse::<AddressPolicy>(), Ok(AddressPolicy::Private));
        assert!("open".parse::<AddressPolicy>().is_err());
    }
}
