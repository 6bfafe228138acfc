//! Keyed sets of active faults with lazily evaluated expiry.
//!
//! Each key holds at most one active entry. Entries carry an optional
//! `expires_at`; [`FaultRegistry::sweep_expired`] drops everything past due and
//! is called at the top of each simulation cycle. A manual clear removes the
//! entry right away, so there is never a pending timer to cancel.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};

use crate::models::telemetry::{ActiveFault, ActivePanelFault, ActiveSystemAlert};

pub trait Expiring {
    fn expires_at(&self) -> Option<DateTime<Utc>>;
}

impl Expiring for ActiveFault {
    fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }
}

impl Expiring for ActiveSystemAlert {
    fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }
}

impl Expiring for ActivePanelFault {
    fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }
}

/// Expiry instant for an entry raised at `now`; `None` when it never auto-clears.
pub fn expiry_after(now: DateTime<Utc>, auto_clear_ms: u64) -> Option<DateTime<Utc>> {
    if auto_clear_ms == 0 {
        return None;
    }
    i64::try_from(auto_clear_ms)
        .ok()
        .and_then(Duration::try_milliseconds)
        .and_then(|d| now.checked_add_signed(d))
}

#[derive(Debug, Clone)]
pub struct FaultRegistry<K: Ord + Clone, V> {
    entries: BTreeMap<K, V>,
}

impl<K: Ord + Clone, V: Expiring> Default for FaultRegistry<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Ord + Clone, V: Expiring> FaultRegistry<K, V> {
    pub fn new() -> Self {
        Self { entries: BTreeMap::new() }
    }

    /// Inserts `value` unless `key` is already active. Returns whether it was inserted.
    pub fn register(&mut self, key: K, value: V) -> bool {
        if self.entries.contains_key(&key) {
            return false;
        }
        self.entries.insert(key, value);
        true
    }

    /// Removes the entry for `key`; clearing an absent key is a no-op.
    pub fn clear(&mut self, key: &K) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn clear_all(&mut self) -> usize {
        let n = self.entries.len();
        self.entries.clear();
        n
    }

    /// Drops every entry whose expiry is at or before `now`, returning their keys.
    pub fn sweep_expired(&mut self, now: DateTime<Utc>) -> Vec<K> {
        let expired: Vec<K> = self
            .entries
            .iter()
            .filter(|(_, v)| v.expires_at().is_some_and(|at| at <= now))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &expired {
            self.entries.remove(key);
        }
        expired
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Entries not yet due at `now`, whether or not they have been swept.
    pub fn live_at(&self, now: DateTime<Utc>) -> impl Iterator<Item = &V> {
        self.entries
            .values()
            .filter(move |v| v.expires_at().is_none_or(|at| at > now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::telemetry::{AlarmSeverity, FaultCategory};
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 21, 12, 0, 0).unwrap()
    }

    fn fault(id: &str, code: &str, auto_clear_ms: u64) -> ActiveFault {
        ActiveFault {
            equipment_id: id.to_string(),
            code: code.to_string(),
            severity: AlarmSeverity::Warning,
            category: FaultCategory::Inverter,
            message: String::new(),
            auto_clear_ms,
            raised_at: t0(),
            expires_at: expiry_after(t0(), auto_clear_ms),
        }
    }

    #[test]
    fn second_registration_for_same_key_is_ignored() {
        let mut reg = FaultRegistry::new();
        assert!(reg.register("INV-01".to_string(), fault("INV-01", "A", 0)));
        assert!(!reg.register("INV-01".to_string(), fault("INV-01", "B", 0)));
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.get(&"INV-01".to_string()).unwrap().code, "A");
    }

    #[test]
    fn expiry_is_no_earlier_than_duration() {
        let mut reg = FaultRegistry::new();
        reg.register("INV-01".to_string(), fault("INV-01", "A", 60_000));
        reg.register("INV-02".to_string(), fault("INV-02", "B", 0));

        assert!(reg.sweep_expired(t0() + Duration::seconds(59)).is_empty());
        assert_eq!(reg.sweep_expired(t0() + Duration::seconds(60)), vec!["INV-01".to_string()]);
        // no auto-clear: stays forever
        assert!(reg.sweep_expired(t0() + Duration::days(365)).is_empty());
        assert!(reg.contains(&"INV-02".to_string()));
    }

    #[test]
    fn manual_clear_then_reregister_keeps_new_expiry() {
        let mut reg = FaultRegistry::new();
        reg.register("INV-01".to_string(), fault("INV-01", "A", 60_000));
        assert!(reg.clear(&"INV-01".to_string()));
        assert!(!reg.clear(&"INV-01".to_string()));

        let mut later = fault("INV-01", "B", 60_000);
        later.expires_at = expiry_after(t0() + Duration::seconds(50), 60_000);
        reg.register("INV-01".to_string(), later);
        // the first entry's expiry has passed; the new one must survive it
        assert!(reg.sweep_expired(t0() + Duration::seconds(61)).is_empty());
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn live_view_skips_due_entries_before_the_sweep() {
        let mut reg = FaultRegistry::new();
        reg.register("INV-01".to_string(), fault("INV-01", "A", 60_000));
        reg.register("INV-02".to_string(), fault("INV-02", "B", 0));
        assert_eq!(reg.live_at(t0() + Duration::seconds(59)).count(), 2);
        let live: Vec<&str> = reg
            .live_at(t0() + Duration::seconds(60))
            .map(|f| f.code.as_str())
            .collect();
        assert_eq!(live, vec!["B"]);
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn expiry_helper() {
        assert_eq!(expiry_after(t0(), 0), None);
        assert_eq!(expiry_after(t0(), 1500), Some(t0() + Duration::milliseconds(1500)));
        assert_eq!(expiry_after(t0(), u64::MAX), None);
    }
}
