//! `${NAME:-default}` expansion for values resolved at load time

use regex::Regex;
use std::sync::OnceLock;

fn env_reference_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")
            .expect("env reference pattern is valid")
    })
}

/// Expand `${NAME}` and `${NAME:-default}` references using `lookup`.
///
/// Returns the name of the first variable that is neither set nor given a
/// default as the error.
pub fn expand_env_references<F>(value: &str, lookup: F) -> Result<String, String>
where
    F: Fn(&str) -> Option<String>,
{
    let pattern = env_reference_pattern();
    let mut expanded = String::with_capacity(value.len());
    let mut last = 0;

    for captures in pattern.captures_iter(value) {
        let whole = captures.get(0).map(|m| m.range()).unwrap_or(0..0);
        let name = &captures[1];
        let resolved = match (lookup(name), captures.get(2)) {
            (Some(found), _) if !found.is_empty() => found,
            (_, Some(default)) => default.as_str().to_string(),
            (Some(found), None) => found,
            (None, None) => return Err(name.to_string()),
        };
        expanded.push_str(&value[last..whole.start]);
        expanded.push_str(&resolved);
        last = whole.end;
    }

    expanded.push_str(&value[last..]);
    Ok(expanded)
}
