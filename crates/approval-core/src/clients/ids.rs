//! Identifier allocation

use uuid::Uuid;

use crate::workflow::traits::IdGenerator;

/// Random v4 UUIDs for instances and steps
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidIdGenerator;

impl IdGenerator for UuidIdGenerator {
    fn generate_id(&self) -> String {
        Uuid::new_v4().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_ids_are_unique_uuids() {
        let ids: HashSet<String> = (0..100).map(|_| UuidIdGenerator.generate_id()).collect();
        assert_eq!(ids.len(), 100);
        assert!(ids.iter().all(|id| Uuid::parse_str(id).is_ok()));
    }
}
