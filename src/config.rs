//! Suggester configuration

use crate::error::{SuggesterError, SuggesterResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Suggester engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuggesterConfig {
    /// Root directory holding one storage unit per corpus
    pub storage_root: PathBuf,

    /// Maximum number of suggestions returned by a search
    #[serde(default = "default_max_results")]
    pub max_results: usize,

    /// Interval between scheduled rebuilds of every tracked corpus
    pub rebuild_interval_ms: u64,

    /// Optional cron expression (seconds field first) that also triggers a full rebuild
    #[serde(default)]
    pub rebuild_cron: Option<String>,

    /// Rank suggestions by recorded search counts before document frequency
    #[serde(default)]
    pub allow_most_popular: bool,

    /// Build a corpus on the first search that finds it missing
    #[serde(default = "default_true")]
    pub allow_lazy_build: bool,

    /// Corpora the engine accepts (None or empty = all)
    #[serde(default)]
    pub allowed_corpora: Option<HashSet<String>>,

    /// Fields that participate in suggestions (None or empty = every indexed text field)
    #[serde(default)]
    pub allowed_fields: Option<HashSet<String>>,

    /// Size of the build worker pool
    #[serde(default = "default_max_concurrent_builds")]
    pub max_concurrent_builds: usize,

    /// Time budget for the per-corpus lookups of one search
    #[serde(default = "default_search_timeout_ms")]
    pub search_timeout_ms: u64,
}

fn default_max_results() -> usize {
    10
}

fn default_true() -> bool {
    true
}

fn default_max_concurrent_builds() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

fn default_search_timeout_ms() -> u64 {
    2_000
}

impl SuggesterConfig {
    /// Load configuration from an optional TOML file and `SUGGESTER__*` environment variables
    pub fn load(path: Option<&Path>) -> SuggesterResult<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(false));
        }

        let config: Self = builder
            .add_source(
                config::Environment::with_prefix("SUGGESTER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Check every constraint the engine relies on
    pub fn validate(&self) -> SuggesterResult<()> {
        if self.storage_root.as_os_str().is_empty() {
            return Err(SuggesterError::InvalidConfiguration(
                "storage root must not be empty".to_string(),
            ));
        }
        if self.rebuild_interval_ms == 0 {
            return Err(SuggesterError::InvalidConfiguration(
                "rebuild interval must be positive".to_string(),
            ));
        }
        if self.max_results == 0 {
            return Err(SuggesterError::InvalidConfiguration(
                "max results must be positive".to_string(),
            ));
        }
        if self.max_concurrent_builds == 0 {
            return Err(SuggesterError::InvalidConfiguration(
                "build pool needs at least one worker".to_string(),
            ));
        }
        if self.search_timeout_ms == 0 {
            return Err(SuggesterError::InvalidConfiguration(
                "search timeout must be positive".to_string(),
            ));
        }
        if let Some(cron) = &self.rebuild_cron {
            let fields = cron.split_whitespace().count();
            if !(6..=7).contains(&fields) {
                return Err(SuggesterError::InvalidConfiguration(format!(
                    "rebuild cron '{}' must have 6 or 7 fields, got {}",
                    cron, fields
                )));
            }
        }
        Ok(())
    }

    pub fn rebuild_interval(&self) -> Duration {
        Duration::from_millis(self.rebuild_interval_ms)
    }

    pub fn search_timeout(&self) -> Duration {
        Duration::from_millis(self.search_timeout_ms)
    }

    /// Whether `corpus` passes the allow-list
    pub fn is_corpus_allowed(&self, corpus: &str) -> bool {
        match &self.allowed_corpora {
            Some(allowed) if !allowed.is_empty() => allowed.contains(corpus),
            _ => true,
        }
    }

    /// Whether `field` participates in suggestions
    pub fn is_field_allowed(&self, field: &str) -> bool {
        match &self.allowed_fields {
            Some(allowed) if !allowed.is_empty() => allowed.contains(field),
            _ => true,
        }
    }
}

/// Builder for SuggesterConfig
pub struct SuggesterConfigBuilder {
    config: SuggesterConfig,
}

impl SuggesterConfigBuilder {
    /// Start from the defaults; storage root and rebuild interval have none and must be set
    pub fn new() -> Self {
        Self {
            config: SuggesterConfig {
                storage_root: PathBuf::new(),
                max_results: default_max_results(),
                rebuild_interval_ms: 0,
                rebuild_cron: None,
                allow_most_popular: false,
                allow_lazy_build: true,
                allowed_corpora: None,
                allowed_fields: None,
                max_concurrent_builds: default_max_concurrent_builds(),
                search_timeout_ms: default_search_timeout_ms(),
            },
        }
    }

    pub fn storage_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.storage_root = path.into();
        self
    }

    pub fn max_results(mut self, max: usize) -> Self {
        self.config.max_results = max;
        self
    }

    /// Interval between scheduled rebuilds, kept at millisecond resolution
    ///
    /// Anything below one millisecond rounds down to zero and fails
    /// validation; durations beyond `u64::MAX` milliseconds saturate.
    pub fn rebuild_interval(mut self, interval: Duration) -> Self {
        self.config.rebuild_interval_ms = duration_millis(interval);
        self
    }

    pub fn rebuild_cron(mut self, expression: impl Into<String>) -> Self {
        self.config.rebuild_cron = Some(expression.into());
        self
    }

    pub fn allow_most_popular(mut self, enabled: bool) -> Self {
        self.config.allow_most_popular = enabled;
        self
    }

    pub fn allow_lazy_build(mut self, enabled: bool) -> Self {
        self.config.allow_lazy_build = enabled;
        self
    }

    pub fn allowed_corpora<I, S>(mut self, corpora: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.allowed_corpora = Some(corpora.into_iter().map(Into::into).collect());
        self
    }

    pub fn allowed_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.allowed_fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn max_concurrent_builds(mut self, workers: usize) -> Self {
        self.config.max_concurrent_builds = workers;
        self
    }

    /// Search time threshold, kept at millisecond resolution like the interval
    pub fn search_timeout(mut self, timeout: Duration) -> Self {
        self.config.search_timeout_ms = duration_millis(timeout);
        self
    }

    pub fn build(self) -> SuggesterConfig {
        self.config
    }
}

fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl Default for SuggesterConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> SuggesterConfigBuilder {
        SuggesterConfigBuilder::new()
            .storage_root("/tmp/suggester")
            .rebuild_interval(Duration::from_secs(60))
    }

    #[test]
    fn test_valid_config() {
        assert!(valid().build().validate().is_ok());
    }

    #[test]
    fn test_empty_root_rejected() {
        let config = valid().storage_root("").build();
        assert!(matches!(
            config.validate(),
            Err(SuggesterError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_zero_interval_rejected() {
        let config = valid().rebuild_interval(Duration::ZERO).build();
        assert!(matches!(
            config.validate(),
            Err(SuggesterError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_durations_keep_millisecond_resolution() {
        let config = valid().rebuild_interval(Duration::from_micros(500)).build();
        assert_eq!(config.rebuild_interval_ms, 0);
        assert!(config.validate().is_err());

        let config = valid()
            .rebuild_interval(Duration::MAX)
            .search_timeout(Duration::MAX)
            .build();
        assert_eq!(config.rebuild_interval_ms, u64::MAX);
        assert_eq!(config.search_timeout_ms, u64::MAX);

        let config = valid().search_timeout(Duration::from_micros(1_500)).build();
        assert_eq!(config.search_timeout(), Duration::from_millis(1));
    }

    #[test]
    fn test_bad_cron_rejected() {
        let config = valid().rebuild_cron("every day").build();
        assert!(config.validate().is_err());

        let config = valid().rebuild_cron("0 0 2 * * *").build();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_allow_lists() {
        let config = valid().allowed_corpora(["a"]).allowed_fields(["body"]).build();
        assert!(config.is_corpus_allowed("a"));
        assert!(!config.is_corpus_allowed("b"));
        assert!(config.is_field_allowed("body"));
        assert!(!config.is_field_allowed("title"));

        let open = valid().allowed_corpora(Vec::<String>::new()).build();
        assert!(open.is_corpus_allowed("anything"));
    }

    #[test]
    fn test_load_from_toml() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("suggester.toml");
        std::fs::write(
            &path,
            "storage_root = \"/var/lib/suggester\"\nrebuild_interval_ms = 300000\nmax_results = 25\n",
        )
        .unwrap();

        let config = SuggesterConfig::load(Some(&path)).unwrap();
        assert_eq!(config.max_results, 25);
        assert_eq!(config.rebuild_interval(), Duration::from_secs(300));
        assert!(config.allow_lazy_build);
    }
}
