use crate::core::{DbError, Result};

/// Repository configuration
///
/// Built with chained setters or parsed from a `memorm://` URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryConfig {
    /// Repository name, recorded in every query built against it
    pub name: String,

    /// Let positional reads fetch single rows instead of the whole collection
    pub partial_loading: bool,

    /// Share one resource per persisted row
    pub identity_map: bool,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self::new("default")
    }
}

impl RepositoryConfig {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            partial_loading: true,
            identity_map: true,
        }
    }

    pub fn name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn partial_loading(mut self, enabled: bool) -> Self {
        self.partial_loading = enabled;
        self
    }

    pub fn identity_map(mut self, enabled: bool) -> Self {
        self.identity_map = enabled;
        self
    }

    /// Parse from a repository URL
    ///
    /// Format: "memorm://name?partial_loading=false&identity_map=true"
    ///
    /// # Examples
    ///
    /// ```ignore
    /// let config = RepositoryConfig::from_url("memorm://blog?partial_loading=false")?;
    /// ```
    pub fn from_url(url: &str) -> Result<Self> {
        let rest = url
            .strip_prefix("memorm://")
            .ok_or_else(|| DbError::ParseError("URL must start with 'memorm://'".to_string()))?;

        let (name, params) = match rest.split_once('?') {
            Some((name, params)) => (name, Some(params)),
            None => (rest, None),
        };
        if name.is_empty() {
            return Err(DbError::ParseError("Repository name cannot be empty".to_string()));
        }

        let mut config = Self::new(name);
        for pair in params.into_iter().flat_map(|params| params.split('&')) {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| DbError::ParseError(format!("Invalid parameter '{}'", pair)))?;
            let enabled = match value {
                "true" | "1" => true,
                "false" | "0" => false,
                other => {
                    return Err(DbError::ParseError(format!(
                        "Invalid boolean '{}' for {}",
                        other, key
                    )));
                }
            };
            config = match key {
                "partial_loading" => config.partial_loading(enabled),
                "identity_map" => config.identity_map(enabled),
                other => {
                    return Err(DbError::ParseError(format!("Unknown parameter '{}'", other)));
                }
            };
        }

        Ok(config)
    }

    /// Convert back to a URL
    pub fn to_url(&self) -> String {
        format!(
            "memorm://{}?partial_loading={}&identity_map={}",
            self.name, self.partial_loading, self.identity_map
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RepositoryConfig::default();
        assert_eq!(config.name, "default");
        assert!(config.partial_loading);
        assert!(config.identity_map);
    }

    #[test]
    fn test_from_url() {
        let config = RepositoryConfig::from_url("memorm://blog?partial_loading=false").unwrap();
        assert_eq!(config.name, "blog");
        assert!(!config.partial_loading);
        assert!(config.identity_map);

        assert_eq!(RepositoryConfig::from_url(&config.to_url()).unwrap(), config);
    }

    #[test]
    fn test_from_url_rejects_garbage() {
        assert!(RepositoryConfig::from_url("postgres://blog").is_err());
        assert!(RepositoryConfig::from_url("memorm://").is_err());
        assert!(RepositoryConfig::from_url("memorm://blog?cache=yes").is_err());
        assert!(RepositoryConfig::from_url("memorm://blog?partial_loading").is_err());
    }
}
