use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch. Reads 0 if the clock is before the epoch.
pub fn now_millis() -> i64 {
  SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .map(|elapsed| elapsed.as_millis() as i64)
    .unwrap_or_default()
}
