// Environment variable loading

use serde_json::Value;

/// Separator between nesting levels in variable names
pub const NESTING_SEPARATOR: &str = "__";

/// Maps prefixed environment variables onto configuration paths.
///
/// With prefix `ORGSPACE`, `ORGSPACE_CACHE__IDLE_TTL_SECS=60` becomes the path
/// `["cache", "idle_ttl_secs"]` with the integer value `60`.
pub struct EnvLoader {
    prefix: String,
}

impl EnvLoader {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Map one variable to a path and value, or `None` if it is not ours.
    pub fn map_var(&self, key: &str, value: &str) -> Option<(Vec<String>, Value)> {
        let rest = key.strip_prefix(&self.prefix)?.strip_prefix('_')?;
        if rest.is_empty() {
            return None;
        }

        let path: Vec<String> = rest
            .split(NESTING_SEPARATOR)
            .map(|segment| segment.to_lowercase())
            .collect();
        if path.iter().any(|segment| segment.is_empty()) {
            return None;
        }

        Some((path, coerce_scalar(value)))
    }

    /// Collect every matching variable from `vars`.
    pub fn collect<I, K, V>(&self, vars: I) -> Vec<(Vec<String>, Value)>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        vars.into_iter()
            .filter_map(|(k, v)| self.map_var(k.as_ref(), v.as_ref()))
            .collect()
    }
}

/// Interpret an environment string as bool, integer or float when it parses.
pub fn coerce_scalar(raw: &str) -> Value {
    let trimmed = raw.trim();
    match trimmed.to_ascii_lowercase().as_str() {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }

    if let Ok(n) = trimmed.parse::<i64>() {
        return Value::from(n);
    }

    let numeric = trimmed.chars().any(|c| c.is_ascii_digit())
        && trimmed
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | 'e' | 'E'));
    if numeric
        && let Ok(f) = trimmed.parse::<f64>()
        && let Some(number) = serde_json::Number::from_f64(f)
    {
        return Value::Number(number);
    }

    Value::String(raw.to_string())
}
