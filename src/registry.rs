//! Unit-id keyed database registry.
//!
//! A server can answer for several Modbus units on one socket. The registry
//! maps unit identifiers to their process images; adding a database for a
//! unit id that is already present replaces the old one.

use std::collections::HashMap;

use crate::database::Database;

/// Collection of per-unit databases hosted by one server.
///
/// A registry always holds at least its default unit's database, so lookups
/// can never come up empty.
#[derive(Debug)]
pub struct DatabaseRegistry {
    databases: HashMap<u8, Database>,
    default_unit: u8,
}

impl Default for DatabaseRegistry {
    fn default() -> Self {
        Self::new(Database::default())
    }
}

impl DatabaseRegistry {
    /// Create a registry whose lookups fall back to `default` when a
    /// requested unit id is not registered.
    pub fn new(default: Database) -> Self {
        let default_unit = default.unit_id();
        let mut databases = HashMap::new();
        databases.insert(default_unit, default);
        Self {
            databases,
            default_unit,
        }
    }

    /// Register a database, replacing any existing one with the same unit id.
    pub fn add(&mut self, database: Database) {
        self.databases.insert(database.unit_id(), database);
    }

    /// Remove the database for `unit_id`, returning it if present. The
    /// default unit cannot be removed.
    pub fn remove(&mut self, unit_id: u8) -> Option<Database> {
        if unit_id == self.default_unit {
            return None;
        }
        self.databases.remove(&unit_id)
    }

    /// Unit id of the fallback database.
    pub fn default_unit(&self) -> u8 {
        self.default_unit
    }

    /// True when a database is registered for `unit_id`.
    pub fn contains(&self, unit_id: u8) -> bool {
        self.databases.contains_key(&unit_id)
    }

    /// Database for `unit_id`, without fallback.
    pub fn get(&self, unit_id: u8) -> Option<&Database> {
        self.databases.get(&unit_id)
    }

    /// Mutable database for `unit_id`, without fallback.
    pub fn get_mut(&mut self, unit_id: u8) -> Option<&mut Database> {
        self.databases.get_mut(&unit_id)
    }

    /// Database that should answer for `unit_id`: the registered one when
    /// present, otherwise the default unit's database.
    pub fn resolve_mut(&mut self, unit_id: u8) -> &mut Database {
        let key = if self.databases.contains_key(&unit_id) {
            unit_id
        } else {
            self.default_unit
        };
        self.databases
            .get_mut(&key)
            .expect("default unit database is always registered")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::DEFAULT_UNIT_ID;

    #[test]
    fn default_registry_always_resolves() {
        let mut registry = DatabaseRegistry::default();
        assert_eq!(registry.default_unit(), DEFAULT_UNIT_ID);
        assert!(registry.contains(DEFAULT_UNIT_ID));

        // Lookups for any unit resolve without panicking.
        assert_eq!(registry.resolve_mut(DEFAULT_UNIT_ID).unit_id(), DEFAULT_UNIT_ID);
        assert_eq!(registry.resolve_mut(200).unit_id(), DEFAULT_UNIT_ID);
    }

    #[test]
    fn add_replaces_same_unit_id() {
        let mut registry = DatabaseRegistry::new(Database::new(1, 10));

        let mut replacement = Database::new(1, 10);
        replacement.set_coil(0, true).unwrap();
        registry.add(replacement);

        assert_eq!(registry.get(1).unwrap().coil(0), Some(true));
    }

    #[test]
    fn unknown_unit_resolves_to_default() {
        let mut registry = DatabaseRegistry::new(Database::new(1, 10));
        registry.add(Database::new(7, 10));

        assert_eq!(registry.resolve_mut(7).unit_id(), 7);
        assert_eq!(registry.resolve_mut(42).unit_id(), 1);
    }

    #[test]
    fn default_unit_cannot_be_removed() {
        let mut registry = DatabaseRegistry::new(Database::new(1, 10));
        registry.add(Database::new(2, 10));

        assert!(registry.remove(1).is_none());
        assert!(registry.remove(2).is_some());
        assert!(!registry.contains(2));
        assert!(registry.contains(1));
    }
}
