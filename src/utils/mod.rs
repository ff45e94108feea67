pub mod shell;

use std::collections::BTreeMap;
use std::path::PathBuf;

use which::which;

use crate::errors::ConfigError;

/// Locates the external programs a pipeline is made of.
///
/// Paths configured under `utilities` win; anything else is looked up in PATH.
#[derive(Debug, Clone, Default)]
pub struct Utilities {
    overrides: BTreeMap<String, PathBuf>,
}

impl Utilities {
    pub fn new(overrides: BTreeMap<String, PathBuf>) -> Self {
        Utilities { overrides }
    }

    #[cfg(test)]
    pub fn with_override(mut self, name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.overrides.insert(name.into(), path.into());
        self
    }

    pub fn resolve(&self, name: &str) -> Result<String, ConfigError> {
        let path = match self.overrides.get(name) {
            Some(path) => path.clone(),
            None => which(name).map_err(|_| ConfigError::UtilityNotFound(name.to_string()))?,
        };
        Ok(path.to_string_lossy().into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_override_wins_over_path_lookup() {
        let utilities = Utilities::default().with_override("sh", "/opt/custom/sh");
        assert_eq!(utilities.resolve("sh").unwrap(), "/opt/custom/sh");
    }

    #[test]
    fn test_falls_back_to_path() {
        let resolved = Utilities::default().resolve("sh").unwrap();
        assert!(resolved.ends_with("/sh"), "unexpected path {}", resolved);
    }

    #[test]
    fn test_unknown_utility_is_a_config_error() {
        let err = Utilities::default()
            .resolve("definitely-not-a-real-dump-tool")
            .unwrap_err();
        assert!(matches!(err, ConfigError::UtilityNotFound(name) if name == "definitely-not-a-real-dump-tool"));
    }
}
