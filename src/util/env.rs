//! Environment helpers: centralized dotenv loading and ergonomic getters.
//! Call `init_env()` once early in the binary (or rely on the lazy Once).
use std::str::FromStr;
use std::sync::Once;
use std::time::Duration;
use tracing::warn;

static INIT: Once = Once::new();

/// Load .env exactly once. Safe to call many times.
pub fn init_env() {
    INIT.call_once(|| {
        if dotenv::dotenv().is_err() {
            // fall back to the crate root so `cargo run` from a subdirectory still works
            let candidate = concat!(env!("CARGO_MANIFEST_DIR"), "/.env");
            let _ = dotenv::from_filename(candidate);
        }
    });
}

/// Get optional env var (None if unset or empty).
pub fn env_opt(key: &str) -> Option<String> {
    init_env();
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}

/// Get parsed value with default fallback. Unparsable values are logged and ignored.
pub fn env_parse<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    match env_opt(key) {
        Some(raw) => match raw.trim().parse::<T>() {
            Ok(v) => v,
            Err(_) => {
                warn!(target = "env", key, value = %raw, "unparsable value; using default");
                default
            }
        },
        None => default,
    }
}

/// Millisecond duration with default fallback.
pub fn env_duration_ms(key: &str, default: Duration) -> Duration {
    let default_ms = u64::try_from(default.as_millis()).unwrap_or(u64::MAX);
    Duration::from_millis(env_parse(key, default_ms))
}

/// Boolean flag; accepts 1/true/on/yes (case-insensitive) as true.
pub fn env_flag(key: &str, default: bool) -> bool {
    match env_opt(key) {
        Some(raw) => {
            let v = raw.trim().to_ascii_lowercase();
            matches!(v.as_str(), "1" | "true" | "on" | "yes")
        }
        None => default,
    }
}

/// Comma/space separated list, lowercased, empties dropped.
pub fn env_list(key: &str) -> Option<Vec<String>> {
    env_opt(key).map(|raw| {
        raw.split(|c: char| c == ',' || c.is_whitespace())
            .filter(|s| !s.is_empty())
            .map(|s| s.trim().to_ascii_lowercase())
            .collect()
    })
}
