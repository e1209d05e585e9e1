//! Settings parser for loading settings files.
//!
//! This module handles loading settings from YAML files and environment
//! variables, with proper precedence and error handling.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{Result, SettingsError, StackplateError};

use super::settings::{Settings, invalid};

/// Environment variable overriding `state_dir`.
pub const ENV_STATE_DIR: &str = "STACKPLATE_STATE_DIR";
/// Environment variable overriding `enable_templating`.
pub const ENV_ENABLE_TEMPLATING: &str = "STACKPLATE_ENABLE_TEMPLATING";
/// Environment variable overriding `address_policy`.
pub const ENV_ADDRESS_POLICY: &str = "STACKPLATE_ADDRESS_POLICY";
/// Environment variable overriding `fetch_timeout_secs`.
pub const ENV_FETCH_TIMEOUT_SECS: &str = "STACKPLATE_FETCH_TIMEOUT_SECS";
/// Environment variable overriding `max_concurrency`.
pub const ENV_MAX_CONCURRENCY: &str = "STACKPLATE_MAX_CONCURRENCY";

/// Parser for loading engine settings.
#[derive(Debug, Default)]
pub struct SettingsParser {
    /// Base path for resolving relative paths.
    base_path: Option<PathBuf>,
}

impl SettingsParser {
    /// Creates a new settings parser.
    #[must_use]
    pub const fn new() -> Self {
        Self { base_path: None }
    }

    /// Sets the base path for resolving relative paths.
    #[must_use]
    pub fn with_base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Loads settings from a YAML file.
    ///
    /// A relative `state_dir` is resolved against the file's directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<Settings> {
        let path = path.as_ref();
        info!("Loading settings from: {}", path.display());

        if !path.exists() {
            return Err(SettingsError::FileNotFound {
                path: path.to_path_buf(),
            }
            .into());
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            StackplateError::Settings(SettingsError::ParseError {
                message: format!("Failed to read file: {e}"),
                location: Some(path.display().to_string()),
            })
        })?;

        let mut settings = self.parse_yaml(&content, Some(path))?;
        if settings.state_dir.is_relative()
            && let Some(dir) = path.parent()
        {
            settings.state_dir = dir.join(&settings.state_dir);
        }
        Ok(settings)
    }

    /// Parses settings from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid.
    pub fn parse_yaml(&self, content: &str, source: Option<&Path>) -> Result<Settings> {
        debug!("Parsing YAML settings");

        if content.trim().is_empty() {
            return Ok(Settings::default());
        }

        serde_yaml::from_str(content).map_err(|e| {
            StackplateError::Settings(SettingsError::ParseError {
                message: format!("YAML parse error: {e}"),
                location: source.map(|p| p.display().to_string()),
            })
        })
    }

    /// Loads settings from the first file found from `start_dir` upward,
    /// falling back to defaults, then applies environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if a found file is invalid or an override is unusable.
    pub fn load(&self, start_dir: impl AsRef<Path>) -> Result<Settings> {
        let mut settings = match find_settings_file(start_dir) {
            Ok(path) => self.load_file(path)?,
            Err(_) => {
                debug!("No settings file found, using defaults");
                Settings::default()
            }
        };
        Self::apply_env_overrides(&mut settings)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Applies environment variable overrides to the settings.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError::InvalidValue` for values that do not parse.
    pub fn apply_env_overrides(settings: &mut Settings) -> Result<()> {
        Self::apply_overrides(settings, |name| std::env::var(name).ok())
    }

    /// Applies overrides read through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError::InvalidValue` for values that do not parse.
    pub fn apply_overrides(
        settings: &mut Settings,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<()> {
        if let Some(dir) = lookup(ENV_STATE_DIR) {
            debug!("Overriding state_dir from environment");
            settings.state_dir = PathBuf::from(dir);
        }

        if let Some(value) = lookup(ENV_ENABLE_TEMPLATING) {
            debug!("Overriding enable_templating from environment");
            settings.enable_templating = match value.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => return Err(invalid(ENV_ENABLE_TEMPLATING, &value)),
            };
        }

        if let Some(value) = lookup(ENV_ADDRESS_POLICY) {
            debug!("Overriding address_policy from environment");
            settings.address_policy = value
                .parse()
                .map_err(|_| invalid(ENV_ADDRESS_POLICY, &value))?;
        }

        if let Some(value) = lookup(ENV_FETCH_TIMEOUT_SECS) {
            debug!("Overriding fetch_timeout_secs from environment");
            settings.fetch_timeout_secs = value
                .trim()
                .parse()
                .map_err(|_| invalid(ENV_FETCH_TIMEOUT_SECS, &value))?;
        }

        if let Some(value) = lookup(ENV_MAX_CONCURRENCY) {
            debug!("Overriding max_concurrency from environment");
            settings.max_concurrency = value
                .trim()
                .parse()
                .map_err(|_| invalid(ENV_MAX_CONCURRENCY, &value))?;
        }

        Ok(())
    }

    /// Loads the .env file if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the .env file exists but cannot be loaded.
    pub fn load_dotenv(&self) -> Result<()> {
        let env_path = self
            .base_path
            .as_ref()
            .map_or_else(|| PathBuf::from(".env"), |p| p.join(".env"));

        if env_path.exists() {
            info!("Loading environment from: {}", env_path.display());
            dotenvy::from_path(&env_path).map_err(|e| {
                StackplateError::Settings(SettingsError::ParseError {
                    message: format!("Failed to load .env file: {e}"),
                    location: Some(env_path.display().to_string()),
                })
            })?;
        } else {
            debug!(".env file not found at: {}", env_path.display());
        }

        Ok(())
    }
}

/// Default settings file names to search for.
pub const DEFAULT_SETTINGS_FILES: &[&str] = &["stackplate.yaml", "stackplate.yml"];

/// Finds the settings file in the given directory or its parents.
///
/// # Errors
///
/// Returns an error if no settings file is found.
pub fn find_settings_file(start_dir: impl AsRef<Path>) -> Result<PathBuf> {
    let start = start_dir.as_ref();
    let mut current = start.to_path_buf();

    loop {
        for filename in DEFAULT_SETTINGS_FILES {
            let path = current.join(filename);
            if path.exists() {
                info!("Found settings file: {}", path.display());
                return Ok(path);
            }
        }

        if !current.pop() {
            break;
        }
    }

    Err(SettingsError::FileNotFound {
        path: start.join(DEFAULT_SETTINGS_FILES[0]),
    }
    .into())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use tempfile::TempDir;

    use super::*;
    use crate::config::AddressPolicy;
    use crate::template::Kind;

    #[test]
    fn test_parse_empty_settings() {
        let settings = SettingsParser::new().parse_yaml("", None).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_parse_full_settings() {
        let yaml = r"
state_dir: /var/lib/stackplate
enable_templating: false
address_policy: pass
fetch_timeout_secs: 5
max_concurrency: 8
kind_order:
  - [Label]
  - [Bucket, Check, Dashboard, NotificationEndpoint, Task, Telegraf, Variable]
  - [NotificationRule]
  - [LabelMapping]
template_parameters:
  region: eu
";
        let settings = SettingsParser::new().parse_yaml(yaml, None).unwrap();
        assert_eq!(settings.state_dir, PathBuf::from("/var/lib/stackplate"));
        assert!(!settings.enable_templating);
        assert_eq!(settings.address_policy, AddressPolicy::Pass);
        assert_eq!(settings.max_concurrency, 8);
        assert_eq!(settings.kind_order.as_ref().unwrap()[0], vec![Kind::Label]);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_parse_invalid_yaml() {
        let err = SettingsParser::new()
            .parse_yaml("max_concurrency: [", None)
            .unwrap_err();
        assert!(err.to_string().contains("YAML parse error"));
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = HashMap::from([
            (ENV_ENABLE_TEMPLATING, "off"),
            (ENV_ADDRESS_POLICY, "pass"),
            (ENV_MAX_CONCURRENCY, "2"),
        ]);
        let mut settings = Settings::default();
        SettingsParser::apply_overrides(&mut settings, |name| {
            vars.get(name).map(ToString::to_string)
        })
        .unwrap();

        assert!(!settings.enable_templating);
        assert_eq!(settings.address_policy, AddressPolicy::Pass);
        assert_eq!(settings.max_concurrency, 2);
        assert_eq!(settings.fetch_timeout_secs, 30);
    }

    #[test]
    fn test_invalid_override() {
        let mut settings = Settings::default();
        let err = SettingsParser::apply_overrides(&mut settings, |name| {
            (name == ENV_FETCH_TIMEOUT_SECS).then(|| String::from("soon"))
        })
        .unwrap_err();
        assert!(err.to_string().contains(ENV_FETCH_TIMEOUT_SECS));
    }

    #[test]
    fn test_find_settings_file_in_parent() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("a/b");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(dir.path().join("stackplate.yaml"), "max_concurrency: 3\n").unwrap();

        let found = find_settings_file(&nested).unwrap();
        assert_eq!(found, dir.path().join("stackplate.yaml"));

        let settings = SettingsParser::new().load_file(&found).unwrap();
        assert_eq!(settings.max_concurrency, 3);
        assert_eq!(settings.state_dir, dir.path().join(".stackplate"));
    }
}
