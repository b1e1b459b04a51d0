//! Timestamps are unix nanoseconds throughout; context lifetimes are configured in seconds.

use crate::foundation::constants::NANOS_PER_SECOND;
use std::time::{SystemTime, UNIX_EPOCH};

pub fn now_nanos() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|elapsed| u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX)).unwrap_or(0)
}

pub fn nanos_to_secs(nanos: u64) -> u64 {
    nanos / NANOS_PER_SECOND
}

pub fn secs_to_nanos(secs: u64) -> u64 {
    secs.saturating_mul(NANOS_PER_SECOND)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_conversions_saturate() {
        assert_eq!(nanos_to_secs(secs_to_nanos(42) + 999), 42);
        assert_eq!(secs_to_nanos(u64::MAX), u64::MAX);
        assert!(now_nanos() > secs_to_nanos(1_600_000_000));
    }
}
