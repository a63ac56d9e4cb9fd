//! Field-level checks shared by every configuration domain

use crate::error::{ConfigError, ConfigResult};
use std::collections::HashSet;

/// A configuration section that can check itself before a run starts
pub trait Validatable {
    fn validate(&self) -> ConfigResult<()>;

    /// Section path used to prefix error messages, e.g. `script.step`
    fn domain_name(&self) -> &'static str;

    fn validation_error(&self, message: impl Into<String>) -> ConfigError {
        domain_error(self.domain_name(), message)
    }
}

fn domain_error(domain: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::Domain {
        domain: domain.to_string(),
        message: message.into(),
    }
}

/// Non-blank string
pub fn validate_required_string(value: &str, field_name: &str, domain: &str) -> ConfigResult<()> {
    if value.trim().is_empty() {
        return Err(domain_error(domain, format!("{} cannot be empty", field_name)));
    }
    Ok(())
}

/// Strictly above the type's zero
pub fn validate_positive<T>(value: T, field_name: &str, domain: &str) -> ConfigResult<()>
where
    T: PartialOrd + Default + std::fmt::Display,
{
    if value <= T::default() {
        return Err(domain_error(
            domain,
            format!("{} must be greater than 0, got {}", field_name, value),
        ));
    }
    Ok(())
}

/// Rates and VU targets: finite and not negative
pub fn validate_non_negative(value: f64, field_name: &str, domain: &str) -> ConfigResult<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(domain_error(
            domain,
            format!("{} must be a finite number >= 0, got {}", field_name, value),
        ));
    }
    Ok(())
}

/// Absolute http or https URL
pub fn validate_url(url: &str, field_name: &str, domain: &str) -> ConfigResult<()> {
    let parsed = url::Url::parse(url)
        .map_err(|e| domain_error(domain, format!("{} '{}' is not a URL: {}", field_name, url, e)))?;

    match parsed.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(domain_error(
            domain,
            format!("{} must use http or https, not '{}'", field_name, scheme),
        )),
    }
}

/// Case-insensitive membership in a fixed list
pub fn validate_enum_choice<T>(
    value: &str,
    valid_choices: &[T],
    field_name: &str,
    domain: &str,
) -> ConfigResult<()>
where
    T: AsRef<str>,
{
    if valid_choices
        .iter()
        .any(|choice| choice.as_ref().eq_ignore_ascii_case(value))
    {
        return Ok(());
    }

    let valid: Vec<&str> = valid_choices.iter().map(AsRef::as_ref).collect();
    Err(domain_error(
        domain,
        format!(
            "{} '{}' is not one of {}",
            field_name,
            value,
            valid.join(", ")
        ),
    ))
}

/// Template variables every transaction gets without declaring them
pub const BUILTIN_VARIABLES: [&str; 4] = ["base_url", "scenario", "iteration", "vu"];

/// A name templates can refer to that does not shadow a built-in variable
pub fn validate_variable_name(name: &str, field_name: &str, domain: &str) -> ConfigResult<()> {
    let mut chars = name.chars();
    let identifier = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !identifier {
        return Err(domain_error(
            domain,
            format!("{} '{}' is not a valid variable name", field_name, name),
        ));
    }
    if BUILTIN_VARIABLES.contains(&name) {
        return Err(domain_error(
            domain,
            format!("{} '{}' shadows a built-in variable", field_name, name),
        ));
    }
    Ok(())
}

/// Every name in the sequence appears once
pub fn validate_unique_names<'a, I>(names: I, field_name: &str, domain: &str) -> ConfigResult<()>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(domain_error(domain, format!("duplicate {} '{}'", field_name, name)));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_variable_name() {
        assert!(validate_variable_name("orders_url", "vars", "scenario").is_ok());
        assert!(validate_variable_name("_id2", "vars", "scenario").is_ok());
        assert!(validate_variable_name("", "vars", "scenario").is_err());
        assert!(validate_variable_name("2nd", "vars", "scenario").is_err());
        assert!(validate_variable_name("order.id", "vars", "scenario").is_err());
        assert!(validate_variable_name("base_url", "vars", "scenario").is_err());
    }

    #[test]
    fn test_validate_positive() {
        assert!(validate_positive(1u64, "max", "scenario").is_ok());
        assert!(validate_positive(0u64, "max", "scenario").is_err());
    }

    #[test]
    fn test_validate_non_negative() {
        assert!(validate_non_negative(0.0, "target", "stage").is_ok());
        assert!(validate_non_negative(-1.0, "target", "stage").is_err());
        assert!(validate_non_negative(f64::NAN, "target", "stage").is_err());
        assert!(validate_non_negative(f64::INFINITY, "target", "stage").is_err());
    }

    #[test]
    fn test_validate_url() {
        assert!(validate_url("http://localhost:8001", "base_url", "scenario").is_ok());
        assert!(validate_url("not-a-url", "base_url", "scenario").is_err());
        assert!(validate_url("", "base_url", "scenario").is_err());
        let err = validate_url("ftp://example.com", "base_url", "scenario").unwrap_err();
        assert!(err.to_string().contains("http or https"));
    }

    #[test]
    fn test_validate_unique_names() {
        assert!(validate_unique_names(["a", "b"], "scenario name", "run").is_ok());
        let err = validate_unique_names(["a", "b", "a"], "scenario name", "run").unwrap_err();
        assert!(err.to_string().contains("duplicate scenario name 'a'"));
    }
}
