//! UUID v7 utilities for time-ordered identifiers.
//!
//! Content items and extension connections use UUIDv7 ids, which embed a
//! millisecond-precision timestamp in the first 48 bits and therefore sort
//! in creation order.

use uuid::Uuid;

/// Generate a new UUIDv7 identifier.
#[inline]
pub fn new_v7() -> Uuid {
    Uuid::now_v7()
}

/// Check whether a UUID is version 7.
pub fn is_v7(id: &Uuid) -> bool {
    id.get_version_num() == 7
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_v7_is_v7() {
        let id = new_v7();
        assert!(is_v7(&id));
    }

    #[test]
    fn test_v4_is_not_v7() {
        let id = Uuid::new_v4();
        assert!(!is_v7(&id));
    }

    #[test]
    fn test_v7_ids_are_time_ordered() {
        let a = new_v7();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = new_v7();
        assert!(a < b);
    }
}
