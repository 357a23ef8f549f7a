//! Versioned rule store with whole-snapshot swap.
//!
//! Readers clone an `Arc<RuleSnapshot>` and work on it without holding any
//! lock; a snapshot is never mutated after publication. Writers serialize on
//! `write_gate`, build a complete replacement, then swap the pointer. An
//! admission check therefore sees either the old rule set or the new one,
//! never a mix.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use riskgate_core::error::{Result, RiskGateError};

use super::rule::AdmissionRule;

/// Rules that apply to one resource, split by family.
#[derive(Debug, Default)]
pub struct ResourceRules {
    pub flow: Vec<AdmissionRule>,
    pub degrade: Vec<AdmissionRule>,
}

/// Immutable, published rule set.
#[derive(Debug, Default)]
pub struct RuleSnapshot {
    pub version: u64,
    rules: Vec<AdmissionRule>,
    by_resource: HashMap<String, ResourceRules>,
}

impl RuleSnapshot {
    fn build(version: u64, rules: Vec<AdmissionRule>) -> Self {
        let mut by_resource: HashMap<String, ResourceRules> = HashMap::new();
        for r in &rules {
            let entry = by_resource.entry(r.resource.clone()).or_default();
            if r.kind.is_flow() {
                entry.flow.push(r.clone());
            } else {
                entry.degrade.push(r.clone());
            }
        }
        Self { version, rules, by_resource }
    }

    pub fn rules(&self) -> &[AdmissionRule] {
        &self.rules
    }

    pub fn for_resource(&self, resource: &str) -> Option<&ResourceRules> {
        self.by_resource.get(resource)
    }
}

pub struct RuleStore {
    current: RwLock<Arc<RuleSnapshot>>,
    write_gate: Mutex<()>,
}

impl RuleStore {
    pub fn new(rules: Vec<AdmissionRule>) -> Result<Self> {
        let rules = prepare_rules(rules)?;
        Ok(Self {
            current: RwLock::new(Arc::new(RuleSnapshot::build(1, rules))),
            write_gate: Mutex::new(()),
        })
    }

    /// Current published snapshot. The read lock is held only for the Arc clone.
    pub fn snapshot(&self) -> Arc<RuleSnapshot> {
        let g = self.current.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&*g)
    }

    pub fn version(&self) -> u64 {
        self.snapshot().version
    }

    pub fn list(&self) -> Vec<AdmissionRule> {
        self.snapshot().rules.clone()
    }

    pub fn get(&self, id: &str) -> Option<AdmissionRule> {
        self.snapshot().rules.iter().find(|r| r.id == id).cloned()
    }

    /// Insert or replace (by id). Returns the new snapshot's rule list.
    pub fn upsert(&self, rule: AdmissionRule) -> Result<Vec<AdmissionRule>> {
        let mut rule = rule;
        rule.normalize();
        rule.validate()?;

        self.mutate(|rules| {
            match rules.iter().position(|r| r.id == rule.id) {
                Some(idx) => {
                    tracing::info!(rule=%rule.id, resource=%rule.resource, "updating admission rule");
                    rules[idx] = rule;
                }
                None => {
                    tracing::info!(rule=%rule.id, resource=%rule.resource, "adding admission rule");
                    rules.push(rule);
                }
            }
            Ok(())
        })
    }

    /// Remove by id. `NotFound` when no such rule exists.
    pub fn delete(&self, id: &str) -> Result<Vec<AdmissionRule>> {
        self.mutate(|rules| {
            let before = rules.len();
            rules.retain(|r| r.id != id);
            if rules.len() == before {
                return Err(RiskGateError::NotFound(format!("admission rule {id}")));
            }
            tracing::info!(rule=%id, "deleted admission rule");
            Ok(())
        })
    }

    /// Replace the whole rule set (hot reload).
    pub fn replace_all(&self, rules: Vec<AdmissionRule>) -> Result<Vec<AdmissionRule>> {
        let rules = prepare_rules(rules)?;
        self.mutate(move |current| {
            *current = rules;
            Ok(())
        })
    }

    fn mutate<F>(&self, f: F) -> Result<Vec<AdmissionRule>>
    where
        F: FnOnce(&mut Vec<AdmissionRule>) -> Result<()>,
    {
        let _gate = self.write_gate.lock().unwrap_or_else(PoisonError::into_inner);

        let base = self.snapshot();
        let mut next = base.rules.clone();
        f(&mut next)?;

        let published = Arc::new(RuleSnapshot::build(base.version + 1, next));
        let out = published.rules.clone();
        {
            let mut g = self.current.write().unwrap_or_else(PoisonError::into_inner);
            *g = published;
        }
        tracing::debug!(version = base.version + 1, rules = out.len(), "admission rules published");
        Ok(out)
    }
}

/// Normalize, validate and reject duplicate ids.
pub fn prepare_rules(mut rules: Vec<AdmissionRule>) -> Result<Vec<AdmissionRule>> {
    let mut seen = std::collections::HashSet::new();
    for r in &mut rules {
        r.normalize();
        r.validate()?;
        if !seen.insert(r.id.clone()) {
            return Err(RiskGateError::BadRequest(format!("duplicate admission rule id: {}", r.id)));
        }
    }
    Ok(rules)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admission::rule::RuleKind;

    #[test]
    fn upsert_replaces_by_id_and_bumps_version() {
        let store = RuleStore::new(vec![AdmissionRule::new("a", RuleKind::Qps, 10.0)]).unwrap();
        assert_eq!(store.version(), 1);

        let old = store.snapshot();
        store.upsert(AdmissionRule::new("a", RuleKind::Qps, 20.0)).unwrap();

        assert_eq!(store.version(), 2);
        assert_eq!(store.list().len(), 1);
        assert_eq!(store.get("a:qps").unwrap().threshold, 20.0);
        // previously taken snapshot is untouched
        assert_eq!(old.rules()[0].threshold, 10.0);
    }

    #[test]
    fn duplicate_ids_rejected() {
        let r = AdmissionRule::new("a", RuleKind::Qps, 10.0);
        assert!(RuleStore::new(vec![r.clone(), r]).is_err());
    }

    #[test]
    fn delete_unknown_is_not_found() {
        let store = RuleStore::new(vec![]).unwrap();
        let err = store.delete("nope").unwrap_err();
        assert_eq!(err.client_code().as_str(), "NOT_FOUND");
        assert_eq!(store.version(), 1);
    }

    #[test]
    fn rules_split_by_family() {
        let store = RuleStore::new(vec![
            AdmissionRule::new("a", RuleKind::Qps, 10.0),
            AdmissionRule::new("a", RuleKind::ErrorRatio, 0.5),
            AdmissionRule::new("b", RuleKind::Concurrency, 2.0),
        ])
        .unwrap();
        let snap = store.snapshot();
        let a = snap.for_resource("a").unwrap();
        assert_eq!(a.flow.len(), 1);
        assert_eq!(a.degrade.len(), 1);
        assert!(snap.for_resource("c").is_none());
    }
}
