use std::path::Path;

use super::{
    types::{Config, JobOptions},
    ConfigError,
};

/// Validate configuration
/// Currently validates:
/// - Index chunk size is not 0
/// - Retry attempt limit is not 0
/// - Transcoder timeout and bitrate are not 0
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.index.chunk_size == 0 {
        return Err(ConfigError::ValidationError(
            "index.chunk_size cannot be 0".to_string(),
        ));
    }

    if config.retry.max_attempts == 0 {
        return Err(ConfigError::ValidationError(
            "retry.max_attempts cannot be 0".to_string(),
        ));
    }

    if config.transcoder.timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "transcoder.timeout_secs cannot be 0".to_string(),
        ));
    }

    if config.transcoder.bitrate_kbps == 0 {
        return Err(ConfigError::ValidationError(
            "transcoder.bitrate_kbps cannot be 0".to_string(),
        ));
    }

    Ok(())
}

/// Validate job options before anything touches the file system.
pub fn validate_job(job: &JobOptions) -> Result<(), ConfigError> {
    if job.single_file && job.target == Path::new("./") {
        return Err(ConfigError::ValidationError(
            "target is mandatory for single file use".to_string(),
        ));
    }

    if job.single_file && job.flatten {
        return Err(ConfigError::ValidationError(
            "--flatten has no meaning with --single-file".to_string(),
        ));
    }

    Ok(())
}
