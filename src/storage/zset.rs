// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Ordered member → score structure backing sorted sets in [`InMemoryStore`].
//!
//! Ordering matches Redis: ascending score, ties broken by member bytes.
//! Rank arguments follow Redis index rules (negative indexes count from
//! the end, out-of-range indexes are clamped).
//!
//! [`InMemoryStore`]: super::memory::InMemoryStore

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone, Copy)]
struct Score(f64);

impl PartialEq for Score {
    fn eq(&self, other: &Self) -> bool {
        self.0.total_cmp(&other.0) == Ordering::Equal
    }
}

impl Eq for Score {}

impl PartialOrd for Score {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Score {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

#[derive(Debug, Clone, Default)]
pub struct SortedSet {
    scores: HashMap<String, f64>,
    order: BTreeSet<(Score, String)>,
}

impl SortedSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.scores.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// Insert or update a member. Returns true if the member was new.
    pub fn insert(&mut self, member: &str, score: f64) -> bool {
        let previous = self.scores.insert(member.to_string(), score);
        if let Some(old) = previous {
            self.order.remove(&(Score(old), member.to_string()));
        }
        self.order.insert((Score(score), member.to_string()));
        previous.is_none()
    }

    pub fn remove(&mut self, member: &str) -> bool {
        match self.scores.remove(member) {
            Some(old) => {
                self.order.remove(&(Score(old), member.to_string()));
                true
            }
            None => false,
        }
    }

    /// Add `delta` to a member's score (missing members start at 0).
    pub fn incr(&mut self, member: &str, delta: f64) -> f64 {
        let score = self.scores.get(member).copied().unwrap_or(0.0) + delta;
        self.insert(member, score);
        score
    }

    #[must_use]
    pub fn score(&self, member: &str) -> Option<f64> {
        self.scores.get(member).copied()
    }

    #[must_use]
    pub fn rank(&self, member: &str) -> Option<usize> {
        let score = self.scores.get(member)?;
        let key = (Score(*score), member.to_string());
        Some(self.order.range(..key).count())
    }

    /// Members with scores between rank `start` and `stop` inclusive.
    #[must_use]
    pub fn range(&self, start: isize, stop: isize) -> Vec<(String, f64)> {
        match self.resolve_range(start, stop) {
            Some((from, to)) => self
                .order
                .iter()
                .skip(from)
                .take(to - from + 1)
                .map(|(score, member)| (member.clone(), score.0))
                .collect(),
            None => Vec::new(),
        }
    }

    /// Remove members between rank `start` and `stop` inclusive.
    /// Returns the number of members removed.
    pub fn remove_range_by_rank(&mut self, start: isize, stop: isize) -> usize {
        let doomed: Vec<String> = self
            .range(start, stop)
            .into_iter()
            .map(|(member, _)| member)
            .collect();
        for member in &doomed {
            self.remove(member);
        }
        doomed.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.order.iter().map(|(score, member)| (member.as_str(), score.0))
    }

    /// Weighted intersection with SUM aggregation.
    ///
    /// A member survives only if present in every source.
    #[must_use]
    pub fn intersect_weighted(sources: &[(&SortedSet, f64)]) -> SortedSet {
        let mut out = SortedSet::new();
        let Some(((first, first_weight), rest)) = sources.split_first() else {
            return out;
        };
        'members: for (member, score) in first.iter() {
            let mut total = score * first_weight;
            for (other, weight) in rest {
                match other.score(member) {
                    Some(s) => total += s * weight,
                    None => continue 'members,
                }
            }
            out.insert(member, total);
        }
        out
    }

    fn resolve_range(&self, start: isize, stop: isize) -> Option<(usize, usize)> {
        let len = self.len() as isize;
        if len == 0 {
            return None;
        }
        let start = if start < 0 { (start + len).max(0) } else { start };
        let stop = if stop < 0 { stop + len } else { stop.min(len - 1) };
        if start > stop || start >= len || stop < 0 {
            return None;
        }
        Some((start as usize, stop as usize))
    }
}
