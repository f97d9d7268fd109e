//! ULID helpers for batch ids and the per-process run id.
//!
//! Batch ids returned by the analysis queue come from [`generate`]. Each process also
//! carries one run id ([`get`]) that binaries log at startup so log lines from the same
//! execution can be grouped.

use std::sync::LazyLock;

use ulid::Ulid;

static RUN_ID: LazyLock<String> = LazyLock::new(|| Ulid::new().to_string());

/// Process-level run id, generated on first access.
#[inline]
pub fn get() -> &'static str {
    &RUN_ID
}

/// Fresh ULID (26 chars, sorts by creation time).
#[inline]
pub fn generate() -> String {
    Ulid::new().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_returns_same_value() {
        let first = get();
        let second = get();
        assert_eq!(first, second);
        assert_eq!(first.len(), 26);
    }

    #[test]
    fn generate_returns_unique_values() {
        let a = generate();
        let b = generate();
        assert_ne!(a, b);
        assert_eq!(a.len(), 26);
    }

    #[test]
    fn batch_ids_are_time_ordered() {
        let older = generate();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let newer = generate();
        assert!(older < newer);
    }
}
