//! Runtime tuning knobs for the discovery core.

use std::time::Duration;

/// Tunables the embedding server may override.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// How often the reconciler sweeps every registry.
    pub reconcile_interval: Duration,
    /// Buffered responses per connection before sends block on
    /// transport backpressure.
    pub send_buffer: usize,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            reconcile_interval: Duration::from_secs(30),
            send_buffer: 64,
        }
    }
}

/// Parses a human-readable duration string into a `Duration`.
///
/// Supports suffixes: ms (milliseconds), s (seconds), m (minutes),
/// h (hours). Plain numbers are treated as seconds.
///
/// # Examples
///
/// - "500ms" → 500 milliseconds
/// - "10s" → 10 seconds
/// - "5m" → 5 minutes
/// - "30" → 30 seconds
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let input = input.trim();
    if input.is_empty() {
        return Err("empty duration string".into());
    }

    let (num_str, unit_millis) = if let Some(n) = input.strip_suffix("ms") {
        (n, 1u64)
    } else if let Some(n) = input.strip_suffix('s') {
        (n, 1_000)
    } else if let Some(n) = input.strip_suffix('m') {
        (n, 60_000)
    } else if let Some(n) = input.strip_suffix('h') {
        (n, 3_600_000)
    } else {
        (input, 1_000)
    };

    let num: u64 = num_str
        .trim()
        .parse()
        .map_err(|_| format!("invalid duration: '{input}'"))?;

    num.checked_mul(unit_millis)
        .map(Duration::from_millis)
        .ok_or_else(|| format!("duration overflow: '{input}'"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_with_units() {
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("10s").unwrap(), Duration::from_secs(10));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("2h").unwrap(), Duration::from_secs(7200));
    }

    #[test]
    fn plain_number_is_seconds() {
        assert_eq!(parse_duration("30").unwrap(), Duration::from_secs(30));
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("abc").is_err());
        assert!(parse_duration("10x").is_err());
    }
}
