use chrono::{DateTime, Duration, Utc};

/// Current wall-clock time. Every store reads time through here.
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Absolute expiry for a record created at `created_at` with the given TTL.
pub fn expiry_after(created_at: DateTime<Utc>, ttl_secs: u64) -> DateTime<Utc> {
    created_at + Duration::seconds(ttl_secs as i64)
}

/// A record is expired from its expiry instant onwards.
pub fn is_expired(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    now >= expires_at
}

/// Whole seconds left before `expires_at`, rounded up, never negative.
pub fn seconds_remaining(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    let millis = (expires_at - now).num_milliseconds();
    if millis <= 0 {
        return 0;
    }
    (millis as u64).div_ceil(1000)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiry_boundaries() {
        let created = now();
        let expires = expiry_after(created, 60);

        assert_eq!((expires - created).num_seconds(), 60);
        assert!(!is_expired(expires, created));
        assert!(!is_expired(expires, expires - Duration::milliseconds(1)));
        assert!(is_expired(expires, expires));
        assert!(is_expired(expires, expires + Duration::seconds(1)));
    }

    #[test]
    fn test_seconds_remaining_rounds_up() {
        let created = now();
        let expires = expiry_after(created, 60);

        assert_eq!(seconds_remaining(expires, created), 60);
        assert_eq!(
            seconds_remaining(expires, created + Duration::milliseconds(500)),
            60
        );
        assert_eq!(
            seconds_remaining(expires, expires - Duration::milliseconds(1)),
            1
        );
        assert_eq!(seconds_remaining(expires, expires), 0);
        assert_eq!(seconds_remaining(expires, expires + Duration::hours(1)), 0);
    }
}
