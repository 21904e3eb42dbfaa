use super::AppConfig;
use crate::errors::Error;
use std::fs;
use std::path::Path;

use tracing::{debug, info};

/// Environment variable overriding `database.path`
pub const DATABASE_PATH_ENV: &str = "JOBSEARCH_DATABASE_PATH";

/// Loads and parses the configuration from a YAML file
///
/// # Arguments
///
/// * `file_path` - Path to the YAML configuration file
///
/// # Returns
///
/// * `Result<AppConfig, Error>` - The parsed configuration, with environment
///   overrides applied
///
/// # Errors
///
/// Returns an error if:
/// * The file cannot be read
/// * The YAML content cannot be parsed into an AppConfig
pub fn load_config(file_path: &str) -> Result<AppConfig, Error> {
    let yaml_str = fs::read_to_string(file_path)
        .map_err(|e| Error::ConfigError(format!("cannot read {}: {}", file_path, e)))?;
    let mut config: AppConfig = serde_yaml::from_str(&yaml_str)?;
    apply_env_overrides(&mut config);
    info!("Loaded configuration from {}", file_path);
    Ok(config)
}

/// Loads `file_path` if it exists, otherwise starts from the defaults
pub fn load_config_or_default(file_path: &str) -> Result<AppConfig, Error> {
    if Path::new(file_path).exists() {
        return load_config(file_path);
    }
    debug!("No configuration at {}, using defaults", file_path);
    let mut config = AppConfig::default();
    apply_env_overrides(&mut config);
    Ok(config)
}

/// Applies overrides read from the environment
pub fn apply_env_overrides(config: &mut AppConfig) {
    if let Ok(path) = std::env::var(DATABASE_PATH_ENV) {
        if !path.trim().is_empty() {
            debug!("Database path overridden by {}", DATABASE_PATH_ENV);
            config.database.path = path;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheStep;
    use std::io::Write;

    #[test]
    fn empty_file_gives_defaults() {
        let config: AppConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config.cache.path, ".cache/steps.db");
        assert_eq!(config.daemon.poll_interval_ms, 1000);
        assert_eq!(config.daemon.error_backoff_ms, 5000);
        assert_eq!(config.isolation.timeout_secs, 120);
        assert_eq!(config.isolation.grace_period_ms, 500);
        assert_eq!(config.pipeline.model, "claude-3-5-sonnet-latest");
        assert_eq!(config.pipeline.max_referrals, 4);
        assert!(config.pipeline.research.is_none());
    }

    #[test]
    fn parses_sections_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
cache:
  cache_until: basic_research
  clear_cache: [reply]
isolation:
  timeout_secs: 30
pipeline:
  levels:
    program: python3
    args: ["levels_searcher.py", "--json"]
"#
        )
        .unwrap();

        let config = load_config(file.path().to_str().unwrap()).unwrap();
        let settings = config.cache.settings();
        assert_eq!(settings.cache_until, Some(CacheStep::BasicResearch));
        assert_eq!(settings.clear_cache, vec![CacheStep::Reply]);
        assert_eq!(config.isolation.timeout(), std::time::Duration::from_secs(30));

        let levels = config.pipeline.levels.unwrap();
        assert_eq!(levels.program, "python3");
        assert_eq!(levels.args, vec!["levels_searcher.py", "--json"]);
    }

    #[test]
    fn sample_config_parses() {
        let raw = include_str!("../../jobsearch.sample.yaml");
        let config: AppConfig = serde_yaml::from_str(raw).unwrap();
        assert_eq!(config.database.path, "data/tasks.db");
        assert!(config.pipeline.research.is_some());
        assert!(config.pipeline.reply.is_some());
    }

    #[test]
    fn invalid_yaml_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "daemon: [not, a, map]").unwrap();
        assert!(matches!(
            load_config(file.path().to_str().unwrap()),
            Err(Error::YamlError(_))
        ));
        assert!(matches!(
            load_config("/nonexistent/jobsearch.yaml"),
            Err(Error::ConfigError(_))
        ));
    }
}
