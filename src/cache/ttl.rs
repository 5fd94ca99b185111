//! TTL Module
//!
//! Time-to-live values accepted by `set` and `wrap`. A TTL is resolved at the
//! moment the value is written, so computed TTLs can depend on data that was
//! only known after a fetch.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// How long a written value stays fresh.
#[derive(Clone)]
pub enum Ttl {
    /// Expire after the given duration
    For(Duration),
    /// Never expire
    Forever,
    /// Delete the key instead of writing it
    Expire,
    /// Evaluated when the write happens
    Computed(Arc<dyn Fn() -> Ttl + Send + Sync>),
}

/// A TTL resolved against a clock reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Lifetime {
    Delete,
    Until(Option<u64>),
}

impl Ttl {
    pub fn secs(secs: u64) -> Self {
        Ttl::For(Duration::from_secs(secs))
    }

    pub fn millis(ms: u64) -> Self {
        Ttl::For(Duration::from_millis(ms))
    }

    /// Signed milliseconds; negative values delete the key.
    pub fn from_millis(ms: i64) -> Self {
        if ms < 0 {
            Ttl::Expire
        } else {
            Ttl::millis(ms as u64)
        }
    }

    /// Wraps a closure evaluated at write time.
    pub fn computed<F>(f: F) -> Self
    where
        F: Fn() -> Ttl + Send + Sync + 'static,
    {
        Ttl::Computed(Arc::new(f))
    }

    pub(crate) fn resolve(&self, now_ms: u64) -> Lifetime {
        match self {
            Ttl::For(duration) => {
                let ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
                Lifetime::Until(Some(now_ms.saturating_add(ms)))
            }
            Ttl::Forever => Lifetime::Until(None),
            Ttl::Expire => Lifetime::Delete,
            Ttl::Computed(f) => f().resolve(now_ms),
        }
    }
}

impl From<Duration> for Ttl {
    fn from(duration: Duration) -> Self {
        Ttl::For(duration)
    }
}

impl fmt::Debug for Ttl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ttl::For(duration) => f.debug_tuple("For").field(duration).finish(),
            Ttl::Forever => f.write_str("Forever"),
            Ttl::Expire => f.write_str("Expire"),
            Ttl::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI64, Ordering};

    #[test]
    fn test_duration_resolves_relative_to_now() {
        assert_eq!(Ttl::secs(2).resolve(1_000), Lifetime::Until(Some(3_000)));
        assert_eq!(Ttl::millis(0).resolve(1_000), Lifetime::Until(Some(1_000)));
    }

    #[test]
    fn test_negative_millis_delete() {
        assert_eq!(Ttl::from_millis(-1).resolve(0), Lifetime::Delete);
        assert_eq!(Ttl::from_millis(250).resolve(0), Lifetime::Until(Some(250)));
    }

    #[test]
    fn test_forever_has_no_expiry() {
        assert_eq!(Ttl::Forever.resolve(5), Lifetime::Until(None));
    }

    #[test]
    fn test_huge_duration_saturates() {
        let ttl = Ttl::For(Duration::from_secs(u64::MAX));
        assert_eq!(ttl.resolve(10), Lifetime::Until(Some(u64::MAX)));
    }

    #[test]
    fn test_computed_is_evaluated_at_resolve_time() {
        let expires_in = Arc::new(AtomicI64::new(1_000));
        let source = expires_in.clone();
        let ttl = Ttl::computed(move || Ttl::from_millis(source.load(Ordering::SeqCst)));

        expires_in.store(60_000, Ordering::SeqCst);
        assert_eq!(ttl.resolve(0), Lifetime::Until(Some(60_000)));

        expires_in.store(-5, Ordering::SeqCst);
        assert_eq!(ttl.resolve(0), Lifetime::Delete);
    }

    #[test]
    fn test_debug_hides_closure() {
        let ttl = Ttl::computed(|| Ttl::Forever);
        assert_eq!(format!("{:?}", ttl), "Computed(..)");
    }
}
