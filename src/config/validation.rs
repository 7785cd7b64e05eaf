use crate::config::types::{
    BrowserConfig, Config, FetchConfig, InputConfig, OutputConfig, PipelineConfig,
};
use crate::{ConfigError, ConfigResult};

/// Validates the entire configuration
pub fn validate(config: &Config) -> ConfigResult<()> {
    validate_pipeline_config(&config.pipeline)?;
    validate_fetch_config(&config.fetch)?;
    validate_browser_config(&config.browser)?;
    validate_input_config(&config.input)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates batch scheduling configuration
fn validate_pipeline_config(config: &PipelineConfig) -> ConfigResult<()> {
    if config.batch_size < 1 {
        return Err(ConfigError::Validation(format!(
            "batch_size must be >= 1, got {}",
            config.batch_size
        )));
    }

    if config.concurrency < 1 || config.concurrency > 1000 {
        return Err(ConfigError::Validation(format!(
            "concurrency must be between 1 and 1000, got {}",
            config.concurrency
        )));
    }

    if config.pacing_max_ms < config.pacing_min_ms {
        return Err(ConfigError::Validation(format!(
            "pacing_max_ms ({}) must be >= pacing_min_ms ({})",
            config.pacing_max_ms, config.pacing_min_ms
        )));
    }

    Ok(())
}

/// Validates primary fetch configuration
fn validate_fetch_config(config: &FetchConfig) -> ConfigResult<()> {
    if config.max_attempts < 1 {
        return Err(ConfigError::Validation(format!(
            "max_attempts must be >= 1, got {}",
            config.max_attempts
        )));
    }

    if config.timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "fetch timeout_secs must be >= 1".to_string(),
        ));
    }

    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user_agent cannot be empty".to_string(),
        ));
    }

    // Header values must be visible ASCII
    if !config
        .user_agent
        .chars()
        .all(|c| c == ' ' || c.is_ascii_graphic())
    {
        return Err(ConfigError::Validation(format!(
            "user_agent contains characters not allowed in a header: '{}'",
            config.user_agent
        )));
    }

    Ok(())
}

/// Validates browser fallback configuration
fn validate_browser_config(config: &BrowserConfig) -> ConfigResult<()> {
    if !config.enabled {
        return Ok(());
    }

    if config.timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "browser timeout_secs must be >= 1".to_string(),
        ));
    }

    if config.max_concurrent_renders < 1 {
        return Err(ConfigError::Validation(format!(
            "max_concurrent_renders must be >= 1, got {}",
            config.max_concurrent_renders
        )));
    }

    Ok(())
}

/// Validates input configuration
fn validate_input_config(config: &InputConfig) -> ConfigResult<()> {
    if config.path.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "input path cannot be empty".to_string(),
        ));
    }

    if config.delimiter.is_empty() {
        return Err(ConfigError::Validation(
            "input delimiter cannot be empty".to_string(),
        ));
    }

    if config.delimiter.contains('\n') || config.delimiter.contains('"') {
        return Err(ConfigError::Validation(format!(
            "input delimiter cannot contain a newline or quote, got {:?}",
            config.delimiter
        )));
    }

    if config.url_column.trim().is_empty() {
        return Err(ConfigError::Validation(
            "url_column cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> ConfigResult<()> {
    for (name, path) in [
        ("output path", &config.path),
        ("retry_path", &config.retry_path),
        ("failure_log", &config.failure_log),
    ] {
        if path.as_os_str().is_empty() {
            return Err(ConfigError::Validation(format!("{} cannot be empty", name)));
        }
    }

    if config.path == config.retry_path {
        return Err(ConfigError::Validation(
            "retry_path must differ from the output path".to_string(),
        ));
    }

    Ok(())
}
