use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;

/// Picks the next assignees from a family pool: least-assigned first,
/// random among ties, never the family that was assigned immediately before.
#[derive(Debug, Clone)]
pub struct Allocator<R: Rng = StdRng> {
    rng: R,
}

impl Allocator<StdRng> {
    pub fn from_entropy() -> Self {
        Self::new(StdRng::from_entropy())
    }

    /// Deterministic tie-breaks, for tests and reproducible runs
    pub fn seeded(seed: u64) -> Self {
        Self::new(StdRng::seed_from_u64(seed))
    }
}

impl<R: Rng> Allocator<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }

    /// Returns `count` names from `pool`.
    ///
    /// Counts are read, not modified: picks made during this call are tallied
    /// on a working copy so the same family is not chosen twice for one event.
    /// When the pool has fewer eligible families than `count`, families are
    /// reused (never back to back while another family is available).
    /// `last_assigned` is updated to the final pick.
    pub fn choose(
        &mut self,
        team: &str,
        pool: &[String],
        counts: &BTreeMap<String, u32>,
        last_assigned: &mut Option<String>,
        count: usize,
    ) -> Vec<String> {
        let mut families: Vec<&str> = Vec::with_capacity(pool.len());
        for name in pool {
            if !families.contains(&name.as_str()) {
                families.push(name.as_str());
            }
        }
        if families.is_empty() || count == 0 {
            return Vec::new();
        }

        let mut working: BTreeMap<&str, u32> = families
            .iter()
            .map(|name| (*name, counts.get(*name).copied().unwrap_or(0)))
            .collect();
        let single = families.len() == 1;
        let mut chosen: Vec<String> = Vec::with_capacity(count);

        for _ in 0..count {
            let previous = chosen.last().or(last_assigned.as_ref()).map(String::as_str);

            let mut candidates: Vec<&str> = families
                .iter()
                .copied()
                .filter(|name| !chosen.iter().any(|c| c == name))
                .filter(|name| single || Some(*name) != last_assigned.as_deref())
                .collect();

            if candidates.is_empty() {
                tracing::debug!(
                    team,
                    requested = count,
                    pool = families.len(),
                    "Pool exhausted, reusing families"
                );
                candidates = families
                    .iter()
                    .copied()
                    .filter(|name| single || Some(*name) != previous)
                    .collect();
            }

            let min = candidates
                .iter()
                .map(|name| working[name])
                .min()
                .unwrap_or(0);
            let tied: Vec<&str> = candidates
                .into_iter()
                .filter(|name| working[name] == min)
                .collect();

            let Some(pick) = tied.choose(&mut self.rng).copied() else {
                break;
            };
            if let Some(tally) = working.get_mut(pick) {
                *tally += 1;
            }
            chosen.push(pick.to_string());
        }

        if let Some(last) = chosen.last() {
            *last_assigned = Some(last.clone());
        }
        chosen
    }
}
