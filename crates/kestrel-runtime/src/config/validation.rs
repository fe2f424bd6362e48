//! Configuration validation utilities.

use super::error::{ConfigError, ConfigResult};
use super::schema::{DispatchConfig, GatewayConfig, LogOutput, LoggingConfig};

/// Upper bound of a dispatch deadline: the platform's 15 minute
/// interaction-token lifetime.
const MAX_TIMEOUT_MS: u64 = 900_000;

/// Validates the entire configuration, returning the first violation.
pub fn validate_config(config: &GatewayConfig) -> ConfigResult<()> {
    validate_token(&config.token)?;
    if let Some(url) = &config.database_url {
        validate_database_url(url)?;
    }
    validate_dispatch(&config.dispatch)?;
    validate_logging(&config.logging)?;
    if let Some(contact) = &config.errors.contact
        && contact.trim().is_empty()
    {
        return Err(ConfigError::validation("errors.contact must not be blank"));
    }
    Ok(())
}

fn validate_token(token: &str) -> ConfigResult<()> {
    if token.is_empty() {
        return Err(ConfigError::missing_field("token"));
    }
    if token.chars().any(char::is_whitespace) {
        return Err(ConfigError::validation("Token cannot contain whitespace"));
    }
    Ok(())
}

fn validate_database_url(url: &str) -> ConfigResult<()> {
    let valid_schemes = ["postgres://", "postgresql://"];
    if !valid_schemes.iter().any(|s| url.starts_with(s)) {
        return Err(ConfigError::invalid_url(
            url,
            format!("URL must start with one of: {valid_schemes:?}"),
        ));
    }
    Ok(())
}

fn validate_dispatch(dispatch: &DispatchConfig) -> ConfigResult<()> {
    for (name, value) in [
        ("dispatch.interaction_timeout_ms", dispatch.interaction_timeout_ms),
        ("dispatch.event_timeout_ms", dispatch.event_timeout_ms),
    ] {
        if value == 0 || value > MAX_TIMEOUT_MS {
            return Err(ConfigError::validation(format!(
                "{name} must be between 1 and {MAX_TIMEOUT_MS}, got {value}"
            )));
        }
    }
    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::missing_field("logging.file_path"));
    }
    for module in logging.filters.keys() {
        if module.is_empty() || module.contains(char::is_whitespace) {
            return Err(ConfigError::validation(format!(
                "Invalid logging filter target: {module:?}"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use tokio_test::{assert_err, assert_ok};

    use super::*;

    fn valid() -> GatewayConfig {
        GatewayConfig {
            token: "abc.def".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_validate_minimal_config() {
        assert_ok!(validate_config(&valid()));
    }

    #[test]
    fn test_validate_missing_token() {
        let result = validate_config(&GatewayConfig::default());
        assert!(matches!(result, Err(ConfigError::MissingField { field }) if field == "token"));
    }

    #[test]
    fn test_validate_database_url_scheme() {
        let mut config = valid();
        config.database_url = Some("mysql://localhost/db".to_string());
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::InvalidUrl { .. })
        ));

        config.database_url = Some("postgresql://localhost/db".to_string());
        assert_ok!(validate_config(&config));
    }

    #[test]
    fn test_validate_timeouts() {
        let mut config = valid();
        config.dispatch.interaction_timeout_ms = 0;
        assert_err!(validate_config(&config));

        config.dispatch.interaction_timeout_ms = MAX_TIMEOUT_MS + 1;
        assert_err!(validate_config(&config));
    }

    #[test]
    fn test_validate_file_output_needs_path() {
        let mut config = valid();
        config.logging.output = LogOutput::File;
        assert_err!(validate_config(&config));
    }
}
