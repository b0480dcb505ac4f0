use std::time::{SystemTime, UNIX_EPOCH};

/// Generates a random 6-character token to use as a globally unique name.
pub fn random_token() -> String {
    use rand::Rng;

    rand::rng()
        .sample_iter(&rand::distr::Alphanumeric)
        .take(6)
        .map(char::from)
        .collect()
}

/// Adds a timestamp and a random suffix to `v`, so two test runs never
/// collide on the same exchange/queue/prefix name.
pub fn mangle(v: &str) -> String {
    format!(
        "{}.{}.{}",
        v,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs(),
        random_token(),
    )
}
