//! Property tests for version lineage and log ordering.

use notesync_core::{
    ApplyOutcome, ChangeRequest, EntityKey, EntityKind, MemoryBackends, NotePayload, Operation,
    OwnerDomain, Registry,
};
use proptest::prelude::*;
use std::collections::HashMap;

#[derive(Debug, Clone)]
enum Step {
    Create(u8),
    Update { id: u8, stale: bool },
    Delete(u8),
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        (0u8..4).prop_map(Step::Create),
        (0u8..4, any::<bool>()).prop_map(|(id, stale)| Step::Update { id, stale }),
        (0u8..4).prop_map(Step::Delete),
    ]
}

fn request(domain: &OwnerDomain, step: &Step) -> ChangeRequest {
    match *step {
        Step::Create(id) => ChangeRequest::create(
            format!("n{id}"),
            NotePayload::new(format!("note {id}"), ""),
            "prop",
        ),
        Step::Update { id, stale } => {
            let key = EntityKey::new(EntityKind::Note, format!("n{id}"));
            let current = domain.version(&key);
            let base = if stale { current.saturating_sub(1) } else { current };
            ChangeRequest::update(
                format!("n{id}"),
                NotePayload::new(format!("edit {id}"), "body"),
                base,
                "prop",
            )
        }
        Step::Delete(id) => {
            let key = EntityKey::new(EntityKind::Note, format!("n{id}"));
            ChangeRequest::delete(EntityKind::Note, format!("n{id}"), domain.version(&key), "prop")
        }
    }
}

proptest! {
    #[test]
    fn versions_form_gap_free_lineage(steps in prop::collection::vec(step(), 1..60)) {
        let domain = OwnerDomain::in_memory("alice".into()).unwrap();
        let mut applied = 0u64;
        for step in &steps {
            let before = domain.head();
            match domain.apply(request(&domain, step)).unwrap() {
                ApplyOutcome::Applied(a) => {
                    applied += 1;
                    prop_assert_eq!(a.sequence, before + 1);
                }
                ApplyOutcome::Conflict(_) => prop_assert_eq!(domain.head(), before),
            }
        }

        let entries = domain.entries_after(0, usize::MAX);
        prop_assert_eq!(entries.len() as u64, applied);

        let mut last: HashMap<String, u64> = HashMap::new();
        for (i, entry) in entries.iter().enumerate() {
            prop_assert_eq!(entry.sequence, i as u64 + 1);
            let prev = last.insert(entry.entity_id.to_string(), entry.resulting_version).unwrap_or(0);
            prop_assert_eq!(entry.resulting_version, prev + 1);
            if entry.operation == Operation::Create {
                prop_assert_eq!(prev, 0);
            }
        }
    }

    #[test]
    fn replay_reproduces_state(steps in prop::collection::vec(step(), 1..40)) {
        let buffers = MemoryBackends::new();
        let live_before = {
            let registry = Registry::new(Box::new(buffers.clone()), false);
            let domain = registry.domain(&"alice".into()).unwrap();
            for step in &steps {
                domain.apply(request(&domain, step)).unwrap();
            }
            domain.all_entities()
        };
        let registry = Registry::new(Box::new(buffers), false);
        let domain = registry.domain(&"alice".into()).unwrap();
        prop_assert_eq!(domain.all_entities(), live_before);
    }
}
