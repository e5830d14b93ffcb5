//! Cross-crate integration test helpers.
//!
//! Provides a harness that replays [`EntityOperation`]s against the
//! fixture model while tracking the expected store contents, then checks
//! records and indexes against that expectation.

use crate::fixtures::TestModels;
use crate::generators::EntityOperation;
use kvmodel_core::connector::record_key;
use kvmodel_core::{Entity, Field, Query};
use kvmodel_store::KeyValueStore;
use std::collections::{BTreeSet, HashMap, HashSet};

type Fields = HashMap<String, String>;

/// A test harness for integration testing.
pub struct IntegrationHarness {
    /// The fixture models.
    pub models: TestModels,
    /// Field values each record should hold in the store.
    persisted: HashMap<String, Fields>,
    /// Field values each entity should report, staged changes included.
    views: HashMap<String, Fields>,
    seen_names: HashSet<String>,
    seen_ages: BTreeSet<i64>,
}

impl IntegrationHarness {
    /// Creates a new harness over fresh fixture models.
    pub fn new() -> Self {
        Self {
            models: TestModels::new(),
            persisted: HashMap::new(),
            views: HashMap::new(),
            seen_names: HashSet::new(),
            seen_ages: BTreeSet::new(),
        }
    }

    fn entity(&self, id: &str) -> Entity {
        self.models.users.lookup(id)
    }

    fn view_mut(&mut self, id: &str) -> &mut Fields {
        let persisted = self.persisted.get(id).cloned().unwrap_or_default();
        self.views.entry(id.to_string()).or_insert(persisted)
    }

    /// Applies one operation and updates tracking.
    pub fn apply(&mut self, op: &EntityOperation) {
        let entity = self.entity(op.id());
        match op {
            EntityOperation::SetName { id, name } => {
                self.models
                    .name
                    .set(&entity, name.clone())
                    .expect("Failed to set name");
                self.view_mut(id).insert("name".into(), name.clone());
                self.seen_names.insert(name.clone());
            }
            EntityOperation::SetAge { id, age } => {
                self.models.age.set(&entity, *age).expect("Failed to set age");
                let raw = self.models.age.to_storage(age).expect("Invalid age");
                self.view_mut(id).insert("age".into(), raw);
                self.seen_ages.insert(*age);
            }
            EntityOperation::RemoveName { id } => {
                entity.remove("name");
                self.view_mut(id).remove("name");
            }
            EntityOperation::Save { id } => {
                entity.save().expect("Failed to save entity");
                let view = self.view_mut(id).clone();
                self.persisted.insert(id.clone(), view);
            }
            EntityOperation::Delete { id } => {
                entity.delete().expect("Failed to delete entity");
                self.persisted.remove(id);
                self.views.insert(id.clone(), Fields::new());
            }
            EntityOperation::Revert { id } => {
                entity.revert();
                let persisted = self.persisted.get(id).cloned().unwrap_or_default();
                self.views.insert(id.clone(), persisted);
            }
        }
    }

    /// Applies every operation in order.
    pub fn apply_all(&mut self, ops: &[EntityOperation]) {
        for op in ops {
            self.apply(op);
        }
    }

    /// Verifies records, entity views and both indexes.
    pub fn verify_all(&self) {
        self.verify_records();
        self.verify_views();
        self.verify_name_index();
        self.verify_age_index();
    }

    fn verify_records(&self) {
        let prefix = self.models.users.prefix();
        for id in self.persisted.keys().chain(self.views.keys()) {
            let actual = self
                .models
                .store
                .hgetall(&record_key(prefix, id))
                .expect("Failed to read record");
            let expected = self.persisted.get(id).cloned().unwrap_or_default();
            assert_eq!(actual, expected, "Record mismatch for {id:?}");
        }
    }

    fn verify_views(&self) {
        for (id, expected) in &self.views {
            let actual = self
                .entity(id)
                .get_all(false)
                .expect("Failed to read entity");
            assert_eq!(&actual, expected, "View mismatch for {id:?}");
        }
    }

    fn persisted_ids_where(&self, field: &str, value: &str) -> BTreeSet<String> {
        self.persisted
            .iter()
            .filter(|(_, fields)| fields.get(field).map(String::as_str) == Some(value))
            .map(|(id, _)| id.clone())
            .collect()
    }

    fn ids(query: &Query) -> BTreeSet<String> {
        query
            .entities()
            .expect("Failed to resolve query")
            .iter()
            .map(|e| e.id().to_string())
            .collect()
    }

    fn verify_name_index(&self) {
        for name in &self.seen_names {
            let query = Query::equals(&self.models.users, &self.models.name, name)
                .expect("Failed to build query");
            assert_eq!(
                Self::ids(&query),
                self.persisted_ids_where("name", name),
                "Name index mismatch for {name:?}"
            );
        }
    }

    fn verify_age_index(&self) {
        for age in &self.seen_ages {
            let query = Query::equals(&self.models.users, &self.models.age, age)
                .expect("Failed to build query");
            assert_eq!(
                Self::ids(&query),
                self.persisted_ids_where("age", &age.to_string()),
                "Age index mismatch for {age}"
            );
        }
        let all = Query::at_least(&self.models.users, &self.models.age, &0)
            .expect("Failed to build query");
        let expected: BTreeSet<String> = self
            .persisted
            .iter()
            .filter(|(_, fields)| fields.contains_key("age"))
            .map(|(id, _)| id.clone())
            .collect();
        assert_eq!(Self::ids(&all), expected, "Age range index mismatch");
    }

    /// Returns the count of persisted records.
    pub fn persisted_count(&self) -> usize {
        self.persisted.values().filter(|f| !f.is_empty()).count()
    }
}

impl Default for IntegrationHarness {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generators::{operation_sequence_strategy, PropTestConfig};
    use proptest::prelude::*;

    fn set_name(id: &str, name: &str) -> EntityOperation {
        EntityOperation::SetName {
            id: id.into(),
            name: name.into(),
        }
    }

    fn save(id: &str) -> EntityOperation {
        EntityOperation::Save { id: id.into() }
    }

    #[test]
    fn test_rename_moves_index_entry() {
        let mut harness = IntegrationHarness::new();
        harness.apply_all(&[
            set_name("a", "Ann"),
            EntityOperation::SetAge {
                id: "a".into(),
                age: 30,
            },
            save("a"),
            set_name("a", "Bea"),
            save("a"),
        ]);
        harness.verify_all();
        assert_eq!(harness.persisted_count(), 1);
    }

    #[test]
    fn test_revert_keeps_persisted_state() {
        let mut harness = IntegrationHarness::new();
        harness.apply_all(&[
            set_name("a", "Ann"),
            save("a"),
            set_name("a", "Bea"),
            EntityOperation::RemoveName { id: "a".into() },
            EntityOperation::Revert { id: "a".into() },
        ]);
        harness.verify_all();
    }

    #[test]
    fn test_delete_then_recreate() {
        let mut harness = IntegrationHarness::new();
        harness.apply_all(&[
            set_name("a", "Ann"),
            save("a"),
            EntityOperation::Delete { id: "a".into() },
            set_name("a", "Cid"),
            save("a"),
        ]);
        harness.verify_all();
    }

    proptest! {
        #![proptest_config(PropTestConfig::quick().to_proptest_config())]

        #[test]
        fn random_operations_keep_store_and_indexes_consistent(
            ops in operation_sequence_strategy(40)
        ) {
            let mut harness = IntegrationHarness::new();
            harness.apply_all(&ops);
            harness.verify_all();
        }
    }
}
