use crate::utils::error::{IngressError, Result};
use url::Url;

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

fn invalid(field_name: &str, value: impl ToString, reason: impl Into<String>) -> IngressError {
    IngressError::InvalidConfigValueError {
        field: field_name.to_string(),
        value: value.to_string(),
        reason: reason.into(),
    }
}

/// Only http(s) endpoints are reachable by the adapter.
pub fn validate_url(field_name: &str, url_str: &str) -> Result<()> {
    if url_str.trim().is_empty() {
        return Err(invalid(field_name, url_str, "URL cannot be empty"));
    }
    let url = Url::parse(url_str)
        .map_err(|e| invalid(field_name, url_str, format!("Invalid URL format: {}", e)))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(invalid(
            field_name,
            url_str,
            format!("Unsupported URL scheme: {}", scheme),
        )),
    }
}

/// Local filesystem path.
pub fn validate_path(field_name: &str, path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(invalid(field_name, path, "Path cannot be empty"));
    }
    if path.contains('\0') {
        return Err(invalid(field_name, path, "Path contains null bytes"));
    }
    Ok(())
}

/// Path inside the storage filesystem, relative to the dataset directory.
pub fn validate_object_path(field_name: &str, path: &str) -> Result<()> {
    validate_path(field_name, path)?;
    if path.ends_with('/') {
        return Err(invalid(field_name, path, "Object path must name a file"));
    }
    if path.split('/').any(|segment| segment == "..") {
        return Err(invalid(
            field_name,
            path,
            "Object path cannot leave the dataset directory",
        ));
    }
    Ok(())
}

pub fn validate_non_empty_string(field_name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(invalid(
            field_name,
            value,
            "Value cannot be empty or whitespace-only",
        ));
    }
    Ok(())
}

/// A secret still reading `${VAR}` means the environment variable was unset.
pub fn validate_resolved(field_name: &str, value: &str) -> Result<()> {
    validate_non_empty_string(field_name, value)?;
    if value.starts_with("${") && value.ends_with('}') {
        return Err(IngressError::MissingConfigError {
            field: format!("{} (environment variable {} is not set)", field_name, value),
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
        return Err(invalid(
            field_name,
            value,
            format!("Value must be between {} and {}", min, max),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_url() {
        assert!(validate_url("server_url", "https://api.jao.eu/OWSMP/").is_ok());
        assert!(validate_url("server_url", "http://localhost:8080/").is_ok());
        assert!(validate_url("server_url", "").is_err());
        assert!(validate_url("server_url", "invalid-url").is_err());
        assert!(validate_url("server_url", "ftp://example.com").is_err());
    }

    #[test]
    fn test_validate_object_path() {
        assert!(validate_object_path("state_path", "state.json").is_ok());
        assert!(validate_object_path("state_path", "jao/state.json").is_ok());
        assert!(validate_object_path("state_path", "").is_err());
        assert!(validate_object_path("state_path", "jao/").is_err());
        assert!(validate_object_path("state_path", "../other/state.json").is_err());
    }

    #[test]
    fn test_validate_resolved() {
        assert!(validate_resolved("auth_api_key", "abc").is_ok());
        assert!(matches!(
            validate_resolved("auth_api_key", "${JAO_API_KEY}"),
            Err(IngressError::MissingConfigError { .. })
        ));
    }

    #[test]
    fn test_validate_range() {
        assert!(validate_range("max_concurrent_corridors", 4usize, 1, 64).is_ok());
        assert!(validate_range("max_concurrent_corridors", 0usize, 1, 64).is_err());
        assert!(validate_range("max_window_days", 400u32, 1, 366).is_err());
    }
}
