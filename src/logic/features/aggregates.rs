//! Historical Aggregate Table
//!
//! Usage counts, pair co-occurrence, guard mean bandwidth and preferred
//! exit country, built in one pass over the training partition and frozen.
//! The serving path loads the same table; it is never recomputed from a
//! single incoming observation.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::logic::dataset::{CircuitObservation, RelayRole};

/// Which pair histogram to query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairKind {
    GuardExit,
    GuardMiddle,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateTable {
    total_circuits: u64,
    usage: BTreeMap<RelayRole, HashMap<String, u64>>,
    guard_exit_pairs: HashMap<String, HashMap<String, u64>>,
    guard_middle_pairs: HashMap<String, HashMap<String, u64>>,
    guard_mean_bandwidth: HashMap<String, f64>,
    guard_preferred_exit_country: HashMap<String, String>,
    /// SHA-256 over the canonical (sorted) content, hex encoded
    digest: String,
}

impl AggregateTable {
    /// Single pass over the training corpus; records without a guard only
    /// contribute middle/exit usage.
    pub fn build(training: &[CircuitObservation]) -> Self {
        let mut table = Self::default();
        let mut bandwidth_acc: HashMap<String, (f64, u64)> = HashMap::new();
        let mut exit_countries: HashMap<String, HashMap<String, u64>> = HashMap::new();

        for obs in training {
            table.total_circuits += 1;
            table.bump_usage(RelayRole::Middle, &obs.middle.fingerprint);
            table.bump_usage(RelayRole::Exit, &obs.exit.fingerprint);

            let Some(guard) = obs.guard.as_ref() else { continue };
            let g = guard.fingerprint.as_str();

            table.bump_usage(RelayRole::Guard, g);
            *table.guard_exit_pairs
                .entry(g.to_string()).or_default()
                .entry(obs.exit.fingerprint.clone()).or_insert(0) += 1;
            *table.guard_middle_pairs
                .entry(g.to_string()).or_default()
                .entry(obs.middle.fingerprint.clone()).or_insert(0) += 1;
            *exit_countries
                .entry(g.to_string()).or_default()
                .entry(obs.exit.country.clone()).or_insert(0) += 1;

            // NaN cells are skipped, like a column mean would
            if guard.bandwidth.is_finite() {
                let acc = bandwidth_acc.entry(g.to_string()).or_insert((0.0, 0));
                acc.0 += guard.bandwidth;
                acc.1 += 1;
            }
        }

        table.guard_mean_bandwidth = bandwidth_acc
            .into_iter()
            .map(|(fp, (sum, n))| (fp, sum / n as f64))
            .collect();

        // Highest count wins, ties go to the lexically smallest country
        table.guard_preferred_exit_country = exit_countries
            .into_iter()
            .filter_map(|(fp, hist)| {
                hist.into_iter()
                    .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(&a.0)))
                    .map(|(country, _)| (fp, country))
            })
            .collect();

        table.digest = table.compute_digest();

        log::info!(
            "Aggregate table built: {} circuits, {} guards, digest {}",
            table.total_circuits,
            table.usage.get(&RelayRole::Guard).map(HashMap::len).unwrap_or(0),
            &table.digest[..12]
        );

        table
    }

    fn bump_usage(&mut self, role: RelayRole, fingerprint: &str) {
        *self.usage
            .entry(role).or_default()
            .entry(fingerprint.to_string()).or_insert(0) += 1;
    }

    // ========================================================================
    // LOOKUPS (default 0 / None for unseen keys, never fail)
    // ========================================================================

    pub fn lookup_usage(&self, role: RelayRole, fingerprint: &str) -> u64 {
        self.usage
            .get(&role)
            .and_then(|m| m.get(fingerprint))
            .copied()
            .unwrap_or(0)
    }

    pub fn lookup_pair(&self, kind: PairKind, guard: &str, other: &str) -> u64 {
        let pairs = match kind {
            PairKind::GuardExit => &self.guard_exit_pairs,
            PairKind::GuardMiddle => &self.guard_middle_pairs,
        };
        pairs
            .get(guard)
            .and_then(|m| m.get(other))
            .copied()
            .unwrap_or(0)
    }

    pub fn guard_mean_bandwidth(&self, guard: &str) -> f64 {
        self.guard_mean_bandwidth.get(guard).copied().unwrap_or(0.0)
    }

    pub fn preferred_exit_country(&self, guard: &str) -> Option<&str> {
        self.guard_preferred_exit_country.get(guard).map(String::as_str)
    }

    pub fn total_circuits(&self) -> u64 {
        self.total_circuits
    }

    pub fn digest(&self) -> &str {
        &self.digest
    }

    /// Recompute the digest from content and compare with the stored one
    pub fn is_intact(&self) -> bool {
        self.compute_digest() == self.digest
    }

    fn compute_digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.total_circuits.to_le_bytes());

        for (role, counts) in &self.usage {
            hasher.update(role.as_str().as_bytes());
            for (fp, n) in sorted(counts) {
                hasher.update(fp.as_bytes());
                hasher.update(n.to_le_bytes());
            }
        }
        for pairs in [&self.guard_exit_pairs, &self.guard_middle_pairs] {
            for (guard, inner) in sorted(pairs) {
                hasher.update(guard.as_bytes());
                for (other, n) in sorted(inner) {
                    hasher.update(other.as_bytes());
                    hasher.update(n.to_le_bytes());
                }
            }
            hasher.update([0xff]);
        }
        for (guard, mean) in sorted(&self.guard_mean_bandwidth) {
            hasher.update(guard.as_bytes());
            hasher.update(mean.to_bits().to_le_bytes());
        }
        for (guard, country) in sorted(&self.guard_preferred_exit_country) {
            hasher.update(guard.as_bytes());
            hasher.update(country.as_bytes());
        }

        hex::encode(hasher.finalize())
    }
}

fn sorted<V>(map: &HashMap<String, V>) -> Vec<(&String, &V)> {
    let mut entries: Vec<_> = map.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));
    entries
}
