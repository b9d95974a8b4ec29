//! Keyed register collection
//!
//! Iteration order is insertion order. Overwriting an existing name keeps its
//! position; `update` removes the old entry and appends the new one.
//! Lookups of unknown names are never errors.

use super::history::Sample;
use super::spec::RegisterSpec;

/// Registers plus their per-register sample history
#[derive(Debug, Clone, Default)]
pub struct RegisterStore {
    registers: Vec<RegisterSpec>,
}

impl RegisterStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.registers.iter().position(|r| r.name() == name)
    }

    /// Insert a register, replacing any existing one with the same name
    pub fn add(&mut self, spec: RegisterSpec) {
        match self.position(spec.name()) {
            Some(idx) => self.registers[idx] = spec,
            None => self.registers.push(spec),
        }
    }

    /// Remove a register and its history; false if the name is unknown
    pub fn remove(&mut self, name: &str) -> bool {
        match self.position(name) {
            Some(idx) => {
                self.registers.remove(idx);
                true
            },
            None => false,
        }
    }

    /// Replace `old_name` with `spec` (renaming allowed)
    ///
    /// Returns false and changes nothing when `old_name` is unknown.
    pub fn update(&mut self, old_name: &str, spec: RegisterSpec) -> bool {
        if !self.remove(old_name) {
            return false;
        }
        self.add(spec);
        true
    }

    pub fn get(&self, name: &str) -> Option<&RegisterSpec> {
        self.registers.iter().find(|r| r.name() == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut RegisterSpec> {
        self.registers.iter_mut().find(|r| r.name() == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Enabled registers in insertion order
    pub fn all_enabled(&self) -> Vec<&RegisterSpec> {
        self.registers.iter().filter(|r| r.is_enabled()).collect()
    }

    /// Enabled registers copied without their history
    pub fn enabled_detached(&self) -> Vec<RegisterSpec> {
        self.registers
            .iter()
            .filter(|r| r.is_enabled())
            .map(RegisterSpec::detached)
            .collect()
    }

    /// Names of the enabled registers in insertion order
    pub fn enabled_names(&self) -> Vec<String> {
        self.registers
            .iter()
            .filter(|r| r.is_enabled())
            .map(|r| r.name().to_string())
            .collect()
    }

    /// Append a sample to a register's history; false if the name is unknown
    pub fn record(&mut self, name: &str, sample: Sample) -> bool {
        match self.get_mut(name) {
            Some(spec) => {
                spec.history_mut().push(sample);
                true
            },
            None => false,
        }
    }

    pub fn clear_all_history(&mut self) {
        for spec in &mut self.registers {
            spec.history_mut().clear();
        }
    }

    pub fn clear_history(&mut self, name: &str) -> bool {
        match self.get_mut(name) {
            Some(spec) => {
                spec.history_mut().clear();
                true
            },
            None => false,
        }
    }

    /// Sum of history lengths across all registers
    pub fn total_sample_count(&self) -> usize {
        self.registers.iter().map(|r| r.history().len()).sum()
    }

    pub fn len(&self) -> usize {
        self.registers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registers.is_empty()
    }

    pub fn enabled_count(&self) -> usize {
        self.registers.iter().filter(|r| r.is_enabled()).count()
    }

    pub fn names(&self) -> Vec<String> {
        self.registers.iter().map(|r| r.name().to_string()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegisterSpec> + '_ {
        self.registers.iter()
    }

    /// Enabled registers, mutable, in insertion order
    pub fn enabled_mut(&mut self) -> impl Iterator<Item = &mut RegisterSpec> + '_ {
        self.registers.iter_mut().filter(|r| r.is_enabled())
    }
}

impl FromIterator<RegisterSpec> for RegisterStore {
    fn from_iter<I: IntoIterator<Item = RegisterSpec>>(iter: I) -> Self {
        let mut store = RegisterStore::new();
        for spec in iter {
            store.add(spec);
        }
        store
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::register::RegisterKind;
    use chrono::Local;

    fn spec(name: &str, address: u16) -> RegisterSpec {
        RegisterSpec::new(name, 10, address, 2, RegisterKind::HoldingFloat32).unwrap()
    }

    fn store() -> RegisterStore {
        [spec("output", 3335), spec("pv", 1284), spec("setpoint", 1539)]
            .into_iter()
            .collect()
    }

    #[test]
    fn test_insertion_order() {
        let store = store();
        assert_eq!(store.names(), vec!["output", "pv", "setpoint"]);
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_add_overwrites_in_place() {
        let mut store = store();
        store.add(spec("pv", 9999));
        assert_eq!(store.names(), vec!["output", "pv", "setpoint"]);
        assert_eq!(store.get("pv").unwrap().address(), 9999);
    }

    #[test]
    fn test_remove_missing_is_noop() {
        let mut store = store();
        assert!(store.remove("pv"));
        assert!(!store.remove("pv"));
        assert!(store.get("pv").is_none());
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_update_renames() {
        let mut store = store();
        assert!(store.update("pv", spec("process_value", 1284)));
        assert!(store.get("pv").is_none());
        assert_eq!(store.names(), vec!["output", "setpoint", "process_value"]);

        assert!(!store.update("missing", spec("other", 1)));
        assert!(!store.contains("other"));
    }

    #[test]
    fn test_all_enabled_filters_disabled() {
        let mut store = store();
        store.get_mut("pv").unwrap().set_enabled(false);

        let names: Vec<_> = store.all_enabled().iter().map(|r| r.name()).collect();
        assert_eq!(names, vec!["output", "setpoint"]);
        assert_eq!(store.enabled_count(), 2);
        assert_eq!(store.enabled_names(), vec!["output", "setpoint"]);
    }

    #[test]
    fn test_history_accounting() {
        let mut store = store();
        let now = Local::now();
        assert!(store.record("pv", Sample::new(now, 1.0)));
        assert!(store.record("pv", Sample::new(now, 2.0)));
        assert!(store.record("output", Sample::new(now, 3.0)));
        assert!(!store.record("missing", Sample::new(now, 4.0)));
        assert_eq!(store.total_sample_count(), 3);

        assert!(store.clear_history("pv"));
        assert_eq!(store.total_sample_count(), 1);

        store.clear_all_history();
        assert_eq!(store.total_sample_count(), 0);
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_remove_discards_history() {
        let mut store = store();
        store.record("pv", Sample::new(Local::now(), 1.0));
        store.remove("pv");
        store.add(spec("pv", 1284));
        assert!(store.get("pv").unwrap().history().is_empty());
    }

    #[test]
    fn test_enabled_detached_has_empty_history() {
        let mut store = store();
        store.record("pv", Sample::new(Local::now(), 1.0));
        let copies = store.enabled_detached();
        assert_eq!(copies.len(), 3);
        assert!(copies.iter().all(|r| r.history().is_empty()));
    }
}
