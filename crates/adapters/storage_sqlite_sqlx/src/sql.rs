//! Row codec helpers shared by the repositories.

use chrono::SecondsFormat;
use devreg_domain::time::Timestamp;

/// Fixed-width RFC 3339 so stored timestamps sort lexically.
pub(crate) fn encode_time(at: Timestamp) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub(crate) fn decode_time(raw: &str) -> Result<Timestamp, sqlx::Error> {
    chrono::DateTime::parse_from_rfc3339(raw)
        .map(|at| at.to_utc())
        .map_err(|err| sqlx::Error::Decode(Box::new(err)))
}

/// Wrap a parse failure of a stored column as a decode error.
pub(crate) fn decode<T, E>(result: Result<T, E>) -> Result<T, sqlx::Error>
where
    E: std::error::Error + Send + Sync + 'static,
{
    result.map_err(|err| sqlx::Error::Decode(Box::new(err)))
}

pub(crate) fn decode_values(raw: &str) -> Result<Vec<String>, sqlx::Error> {
    decode(serde_json::from_str(raw))
}

/// `LIKE` pattern matching every key starting with `prefix`, escaped with `\`.
pub(crate) fn like_prefix(prefix: &str) -> String {
    let mut pattern = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}
