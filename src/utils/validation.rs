use crate::utils::error::{MulticamError, Result};
use std::collections::HashSet;
use url::Url;

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

/// Schemes the ffmpeg and GStreamer backends are able to open.
pub const SUPPORTED_SCHEMES: &[&str] = &["rtsp", "rtsps", "http", "https", "file", "synthetic"];

pub fn validate_stream_url(field_name: &str, url_str: &str) -> Result<()> {
    if url_str.is_empty() {
        return Err(MulticamError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: url_str.to_string(),
            reason: "URL cannot be empty".to_string(),
        });
    }

    match Url::parse(url_str) {
        Ok(url) => {
            if !SUPPORTED_SCHEMES.contains(&url.scheme()) {
                return Err(MulticamError::InvalidConfigValueError {
                    field: field_name.to_string(),
                    value: crate::utils::redact::redact_url(url_str),
                    reason: format!(
                        "Unsupported URL scheme: {}. Supported: {}",
                        url.scheme(),
                        SUPPORTED_SCHEMES.join(", ")
                    ),
                });
            }
            if url.scheme().starts_with("rtsp") && url.host_str().map_or(true, str::is_empty) {
                return Err(MulticamError::InvalidConfigValueError {
                    field: field_name.to_string(),
                    value: crate::utils::redact::redact_url(url_str),
                    reason: "RTSP URL has no host".to_string(),
                });
            }
            Ok(())
        }
        Err(e) => Err(MulticamError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: crate::utils::redact::redact_url(url_str),
            reason: format!("Invalid URL format: {}", e),
        }),
    }
}

pub fn validate_path(field_name: &str, path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(MulticamError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: path.to_string(),
            reason: "Path cannot be empty".to_string(),
        });
    }

    if path.contains('\0') {
        return Err(MulticamError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: path.to_string(),
            reason: "Path contains null bytes".to_string(),
        });
    }

    Ok(())
}

pub fn validate_positive_number(field_name: &str, value: u64, min_value: u64) -> Result<()> {
    if value < min_value {
        return Err(MulticamError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: format!("Value must be at least {}", min_value),
        });
    }
    Ok(())
}

pub fn validate_non_empty_string(field_name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(MulticamError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: "Value cannot be empty or whitespace-only".to_string(),
        });
    }
    Ok(())
}

pub fn validate_range<T: PartialOrd + std::fmt::Display + Copy>(
    field_name: &str,
    value: T,
    min: T,
    max: T,
) -> Result<()> {
    if value < min || value > max {
        return Err(MulticamError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: format!("Value must be between {} and {}", min, max),
        });
    }
    Ok(())
}

/// Camera names double as window names and report keys, so they must be unique.
pub fn validate_unique_names<'a, I>(field_name: &str, names: I) -> Result<()>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut seen = HashSet::new();
    for name in names {
        validate_non_empty_string(field_name, name)?;
        if !seen.insert(name) {
            return Err(MulticamError::InvalidConfigValueError {
                field: field_name.to_string(),
                value: name.to_string(),
                reason: "Duplicate camera name".to_string(),
            });
        }
    }
    Ok(())
}
