use std::collections::VecDeque;

use hashbrown::HashSet;
use rand::{Rng, SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};

use crate::types::{ContentId, Phase};

use super::store::{RatedPhoto, RatingStore};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchmakingParams {
    /// Selections remembered to avoid immediate repeats.
    pub recent_capacity: usize,
    /// Random candidate pairs scored per Refine selection.
    pub refine_sample: usize,
    /// Fixed RNG seed; `None` seeds from the OS.
    pub seed: Option<u64>,
}

impl Default for MatchmakingParams {
    fn default() -> Self {
        Self {
            recent_capacity: 20,
            refine_sample: 64,
            seed: None,
        }
    }
}

/// How stale a candidate pair is; lower is preferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Freshness {
    /// At least one side was not paired recently.
    Fresh,
    /// Both sides were paired recently, but not with each other.
    BothRecent,
    /// This exact pair was served recently.
    RepeatPair,
}

struct Candidate<'a> {
    left: &'a RatedPhoto,
    right: &'a RatedPhoto,
    freshness: Freshness,
}

/// Picks the next pair to compare. State lives for one session only.
#[derive(Debug)]
pub struct Matchmaker {
    params: MatchmakingParams,
    recent: VecDeque<(ContentId, ContentId)>,
    rng: StdRng,
}

impl Matchmaker {
    pub fn new(params: MatchmakingParams) -> Self {
        let rng = match params.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            params,
            recent: VecDeque::new(),
            rng,
        }
    }

    pub fn params(&self) -> &MatchmakingParams {
        &self.params
    }

    pub fn recently_paired(&self) -> impl Iterator<Item = &(ContentId, ContentId)> + '_ {
        self.recent.iter()
    }

    pub fn is_recent_pair(&self, a: &str, b: &str) -> bool {
        self.recent
            .iter()
            .any(|(x, y)| ordered(x, y) == ordered(a, b))
    }

    /// Remembers a served pair, evicting the oldest beyond capacity.
    pub fn note_pair(&mut self, a: &str, b: &str) {
        if self.params.recent_capacity == 0 {
            return;
        }
        self.recent.push_back((a.to_string(), b.to_string()));
        while self.recent.len() > self.params.recent_capacity {
            self.recent.pop_front();
        }
    }

    /// Returns `None` when fewer than two photos are rated.
    pub fn select_pair(&mut self, store: &RatingStore, phase: Phase, beta: f64) -> Option<(ContentId, ContentId)> {
        if store.len() < 2 {
            return None;
        }

        let (left, right) = match phase {
            Phase::Bootstrap => self.select_bootstrap(store)?,
            Phase::Refine => self.select_refine(store, beta)?,
        };
        self.note_pair(&left, &right);
        Some((left, right))
    }

    /// Least-compared photos first, ties by pool-entry order.
    fn select_bootstrap(&self, store: &RatingStore) -> Option<(ContentId, ContentId)> {
        let mut pool: Vec<&RatedPhoto> = store.iter().collect();
        // `iter` is already in entry order and the sort is stable.
        pool.sort_by_key(|p| p.rating.comparisons);

        let recency = Recency::of(&self.recent);
        let mut best: Option<Candidate<'_>> = None;

        for (i, &left) in pool.iter().enumerate() {
            for &right in &pool[i + 1..] {
                let candidate = recency.candidate(left, right);
                if candidate.freshness == Freshness::Fresh {
                    return Some(candidate.ids());
                }
                if best.as_ref().is_none_or(|b| candidate.freshness < b.freshness) {
                    best = Some(candidate);
                }
            }
        }

        best.map(|c| c.ids())
    }

    /// Highest `priority` among sampled pairs, preferring fresh pairs.
    fn select_refine(&mut self, store: &RatingStore, beta: f64) -> Option<(ContentId, ContentId)> {
        let pool: Vec<&RatedPhoto> = store.iter().collect();
        let n = pool.len();
        let sample = self.params.refine_sample.max(1);
        let recency = Recency::of(&self.recent);
        let rng = &mut self.rng;

        let sampled = n * (n - 1) / 2 > sample;
        let candidates: Vec<Candidate<'_>> = if sampled {
            (0..sample)
                .map(|_| {
                    let i = rng.gen_range(0..n);
                    let mut j = rng.gen_range(0..n - 1);
                    if j >= i {
                        j += 1;
                    }
                    recency.candidate(pool[i.min(j)], pool[i.max(j)])
                })
                .collect()
        } else {
            all_index_pairs(n)
                .map(|(i, j)| recency.candidate(pool[i], pool[j]))
                .collect()
        };

        let best = best_by_priority(&candidates, beta);

        // A sample made only of stale pairs must not hide a fresh one.
        if sampled && best.is_some_and(|c| c.freshness != Freshness::Fresh) {
            let fresh: Vec<Candidate<'_>> = all_index_pairs(n)
                .map(|(i, j)| recency.candidate(pool[i], pool[j]))
                .filter(|c| c.freshness == Freshness::Fresh)
                .collect();
            if let Some(found) = best_by_priority(&fresh, beta) {
                return Some(found.ids());
            }
        }

        best.map(Candidate::ids)
    }
}

/// Borrowed view of the recent-pair queue.
struct Recency<'r> {
    ids: HashSet<&'r str>,
    pairs: HashSet<(&'r str, &'r str)>,
}

impl<'r> Recency<'r> {
    fn of(recent: &'r VecDeque<(ContentId, ContentId)>) -> Self {
        let mut ids = HashSet::new();
        let mut pairs = HashSet::new();
        for (a, b) in recent {
            ids.insert(a.as_str());
            ids.insert(b.as_str());
            pairs.insert(ordered(a, b));
        }
        Self { ids, pairs }
    }

    fn candidate<'a>(&self, left: &'a RatedPhoto, right: &'a RatedPhoto) -> Candidate<'a> {
        let (a, b) = (left.content_id.as_str(), right.content_id.as_str());
        let freshness = if self.pairs.contains(&ordered(a, b)) {
            Freshness::RepeatPair
        } else if self.ids.contains(a) && self.ids.contains(b) {
            Freshness::BothRecent
        } else {
            Freshness::Fresh
        };
        Candidate {
            left,
            right,
            freshness,
        }
    }
}

impl Candidate<'_> {
    fn ids(&self) -> (ContentId, ContentId) {
        (self.left.content_id.clone(), self.right.content_id.clone())
    }
}

fn ordered<'s>(a: &'s str, b: &'s str) -> (&'s str, &'s str) {
    if a <= b { (a, b) } else { (b, a) }
}

/// Expected information of a comparison: combined variance, discounted by
/// how far apart the two estimates already are.
pub fn pair_priority(left: &RatedPhoto, right: &RatedPhoto, beta: f64) -> f64 {
    let uncertainty = left.rating.sigma.powi(2) + right.rating.sigma.powi(2);
    let gap = (left.rating.mu - right.rating.mu).abs();
    uncertainty / (1.0 + gap / beta)
}

fn best_by_priority<'c, 'a>(candidates: &'c [Candidate<'a>], beta: f64) -> Option<&'c Candidate<'a>> {
    let mut best: Option<(&Candidate<'a>, f64)> = None;
    for c in candidates {
        let priority = pair_priority(c.left, c.right, beta);
        let better = match best {
            None => true,
            Some((b, bp)) => c.freshness < b.freshness || (c.freshness == b.freshness && priority > bp),
        };
        if better {
            best = Some((c, priority));
        }
    }
    best.map(|(c, _)| c)
}

fn all_index_pairs(n: usize) -> impl Iterator<Item = (usize, usize)> {
    (0..n).flat_map(move |i| (i + 1..n).map(move |j| (i, j)))
}
