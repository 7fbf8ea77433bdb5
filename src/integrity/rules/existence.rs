//! Existence rule: every extracted reference must name a declared entity.
use crate::graph::NetworkDefinition;
use crate::validation::{Diagnostic, ReferenceError};

/// One `DanglingReference` per reference whose target was never declared.
/// Targets that were declared but rejected are not reported again.
pub fn check_references(network: &NetworkDefinition) -> Vec<Diagnostic> {
    network
        .references()
        .filter(|(_, reference)| !network.declares(&reference.target))
        .map(|(subject, reference)| {
            Diagnostic::new(
                subject,
                ReferenceError::DanglingReference { field: reference.field.clone(), target: reference.target.to_string() },
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{AuxEntity, EntityAttrs, EntityRef, Reference};
    use crate::schema::EntityCategory;

    fn novelty(id: i64, buffer: i64) -> AuxEntity {
        AuxEntity {
            category: EntityCategory::NoveltyModule,
            id,
            attrs: EntityAttrs {
                references: vec![Reference { field: "memory_buffer_id".into(), target: EntityRef::MemoryBuffer(buffer) }],
                ..EntityAttrs::default()
            },
        }
    }

    #[test]
    fn test_missing_target_is_dangling() {
        let mut network = NetworkDefinition::new();
        network.aux.entry(EntityCategory::NoveltyModule).or_default().insert(0, novelty(0, 5));

        let found = check_references(&network);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].code(), "08-0-memory_buffer_id");
        assert!(found[0].violation.to_string().contains("MemoryBuffer 5"));
    }

    #[test]
    fn test_rejected_target_is_not_reported_twice() {
        let mut network = NetworkDefinition::new();
        network.aux.entry(EntityCategory::NoveltyModule).or_default().insert(0, novelty(0, 5));
        network.rejected.insert(EntityRef::MemoryBuffer(5));
        assert!(check_references(&network).is_empty());
    }
}
