//! Settings loader with environment variable expansion

use super::{ConfigError, Settings};
use std::path::Path;

/// Settings loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load settings from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Settings, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse settings from YAML text
    pub fn from_yaml(content: &str) -> Result<Settings, ConfigError> {
        let expanded = Self::expand_env_vars(content);
        let settings: Settings = serde_yaml::from_str(&expanded)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Expand `${VAR}` and `${VAR:-default}`
    ///
    /// A placeholder with no value and no default is left untouched.
    fn expand_env_vars(content: &str) -> String {
        let re = regex_lite::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]*))?\}").unwrap();
        let mut last_match = 0;
        let mut result = String::with_capacity(content.len());

        for cap in re.captures_iter(content) {
            let Some(full_match) = cap.get(0) else {
                continue;
            };
            result.push_str(&content[last_match..full_match.start()]);

            let value = match std::env::var(&cap[1]) {
                Ok(val) => val,
                Err(_) => match cap.get(2) {
                    Some(default) => default.as_str().to_string(),
                    None => full_match.as_str().to_string(),
                },
            };
            result.push_str(&value);
            last_match = full_match.end();
        }

        result.push_str(&content[last_match..]);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[serial_test::serial]
    fn test_expand_env_vars() {
        std::env::set_var("CLIPVAULT_TEST_VAR", "test_value");
        let expanded = ConfigLoader::expand_env_vars("key: ${CLIPVAULT_TEST_VAR}");
        assert_eq!(expanded, "key: test_value");
        std::env::remove_var("CLIPVAULT_TEST_VAR");
    }

    #[test]
    fn test_expand_default_and_missing() {
        let expanded =
            ConfigLoader::expand_env_vars("a: ${CLIPVAULT_UNSET_A:-42}\nb: ${CLIPVAULT_UNSET_B}");
        assert_eq!(expanded, "a: 42\nb: ${CLIPVAULT_UNSET_B}");
    }

    #[test]
    fn test_from_yaml_partial() {
        let settings = ConfigLoader::from_yaml(
            "transport:\n  request_timeout_secs: 900\nsync:\n  drift_threshold: 10\n",
        )
        .unwrap();

        assert_eq!(settings.transport.request_timeout_secs, 900);
        assert_eq!(settings.transport.connect_timeout_secs, 30);
        assert_eq!(settings.sync.drift_threshold, 10);
    }

    #[test]
    fn test_from_yaml_rejects_invalid() {
        let result = ConfigLoader::from_yaml("listing:\n  page_size: 5000\n");
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }
}
