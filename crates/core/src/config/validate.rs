use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Timeouts are not 0
/// - At least one download attempt is allowed
/// - The download URL template contains `{remote_id}`
/// - An enabled extraction step with a command has a program to run
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.discovery.timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "discovery.timeout_secs cannot be 0".to_string(),
        ));
    }

    if config.download.timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "download.timeout_secs cannot be 0".to_string(),
        ));
    }

    if config.download.max_attempts == 0 {
        return Err(ConfigError::ValidationError(
            "download.max_attempts must be at least 1".to_string(),
        ));
    }

    if !config.download.url_template.contains("{remote_id}") {
        return Err(ConfigError::ValidationError(
            "download.url_template must contain {remote_id}".to_string(),
        ));
    }

    if config
        .extraction
        .command
        .first()
        .is_some_and(|program| program.trim().is_empty())
    {
        return Err(ConfigError::ValidationError(
            "extraction.command program cannot be empty".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_default_config() {
        assert!(validate_config(&Config::default()).is_ok());
    }

    #[test]
    fn test_validate_zero_timeout_fails() {
        let mut config = Config::default();
        config.download.timeout_secs = 0;
        let result = validate_config(&config);
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_validate_zero_attempts_fails() {
        let mut config = Config::default();
        config.download.max_attempts = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_template_without_placeholder_fails() {
        let mut config = Config::default();
        config.download.url_template = "https://example.org/download".to_string();
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("{remote_id}"));
    }

    #[test]
    fn test_validate_blank_extraction_program_fails() {
        let mut config = Config::default();
        config.extraction.command = vec!["  ".to_string(), "{staging_dir}".to_string()];
        assert!(validate_config(&config).is_err());
    }
}
