use std::collections::HashSet;

use super::{types::Config, ConfigError, Domain};

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Fetch delay bounds are ordered
/// - Source ids are unique
/// - Each domain default names an existing source of that domain
/// - Download cleanup grace is at least one second
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    if config.fetch.min_delay_ms > config.fetch.max_delay_ms {
        return Err(ConfigError::ValidationError(format!(
            "fetch.min_delay_ms ({}) exceeds fetch.max_delay_ms ({})",
            config.fetch.min_delay_ms, config.fetch.max_delay_ms
        )));
    }

    let mut seen = HashSet::new();
    for source in &config.sources {
        if !seen.insert(source.id.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "duplicate source id: {}",
                source.id
            )));
        }
    }

    for domain in [Domain::Comic, Domain::Ebook, Domain::Podcast, Domain::Video] {
        let id = config.defaults.for_domain(domain);
        match config.source(id) {
            Some(source) if source.domain == domain => {}
            Some(_) => {
                return Err(ConfigError::ValidationError(format!(
                    "defaults.{} names source '{}' of another domain",
                    domain.as_str(),
                    id
                )))
            }
            None => {
                return Err(ConfigError::ValidationError(format!(
                    "defaults.{} names unknown source '{}'",
                    domain.as_str(),
                    id
                )))
            }
        }
    }

    if config.transcoder.cleanup_grace_ms < 1000 {
        return Err(ConfigError::ValidationError(
            "transcoder.cleanup_grace_ms must be at least 1000".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_valid_config() {
        let config = Config::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_port_zero_fails() {
        let mut config = Config::default();
        config.server.port = 0;
        let err = validate_config(&config).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_validate_delay_bounds() {
        let mut config = Config::default();
        config.fetch.min_delay_ms = 2000;
        config.fetch.max_delay_ms = 100;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_duplicate_source() {
        let mut config = Config::default();
        let dup = config.sources[0].clone();
        config.sources.push(dup);
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("duplicate source id"));
    }

    #[test]
    fn test_validate_default_must_exist() {
        let mut config = Config::default();
        config.defaults.comic = "nope".to_string();
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("unknown source"));
    }

    #[test]
    fn test_validate_default_wrong_domain() {
        let mut config = Config::default();
        config.defaults.comic = "biquge".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_cleanup_grace_floor() {
        let mut config = Config::default();
        config.transcoder.cleanup_grace_ms = 500;
        assert!(validate_config(&config).is_err());
    }
}
