use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

/// Result of comparing two vector clocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Causality {
    Equal,
    /// Every counter is `<=` the other clock's, at least one strictly.
    Less,
    /// Every counter is `>=` the other clock's, at least one strictly.
    Greater,
    /// Neither clock dominates.
    Concurrent,
}

/// A vector clock keyed by node address.
///
/// Serialized as a flat JSON object (`{"10.0.0.2:8080": 3}`), which is also the
/// `causal-context` clients pass around. A `BTreeMap` keeps the encoding stable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VectorClock {
    counters: BTreeMap<String, u64>,
}

impl VectorClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the counter for `node`, zero if absent.
    pub fn get(&self, node: &str) -> u64 {
        self.counters.get(node).copied().unwrap_or(0)
    }

    /// Bumps a single counter by one. A counter at `u64::MAX` stays there.
    pub fn increment(&mut self, node: &str) {
        let count = self.counters.entry(node.to_string()).or_insert(0);
        *count = count.saturating_add(1);
    }

    /// Pointwise maximum with `other`, in place.
    pub fn max(&mut self, other: &VectorClock) {
        for (node, &count) in &other.counters {
            let mine = self.counters.entry(node.clone()).or_insert(0);
            if count > *mine {
                *mine = count;
            }
        }
    }

    /// Pointwise maximum without touching `self`.
    pub fn merged(&self, other: &VectorClock) -> VectorClock {
        let mut merged = self.clone();
        merged.max(other);
        merged
    }

    /// A new clock holding only the counters of `members`.
    pub fn subset<S: AsRef<str>>(&self, members: &[S]) -> VectorClock {
        let counters = members
            .iter()
            .filter_map(|member| {
                let member = member.as_ref();
                self.counters
                    .get(member)
                    .map(|&count| (member.to_string(), count))
            })
            .collect();
        VectorClock { counters }
    }

    pub fn compare(&self, other: &VectorClock) -> Causality {
        let mut less = false;
        let mut greater = false;

        for node in self.union_keys(other) {
            match self.get(node).cmp(&other.get(node)) {
                Ordering::Less => less = true,
                Ordering::Greater => greater = true,
                Ordering::Equal => {}
            }
            if less && greater {
                return Causality::Concurrent;
            }
        }

        match (less, greater) {
            (false, false) => Causality::Equal,
            (true, false) => Causality::Less,
            (false, true) => Causality::Greater,
            (true, true) => Causality::Concurrent,
        }
    }

    /// True when every counter of `self` is `<=` the matching counter of `other`.
    pub fn is_covered_by(&self, other: &VectorClock) -> bool {
        matches!(self.compare(other), Causality::Less | Causality::Equal)
    }

    /// Delivery test for gossip.
    ///
    /// Ignoring the counter of `node`, returns true iff `other` is exactly one increment
    /// ahead of `self` on a single counter and not ahead anywhere else. Counters where
    /// `other` is behind are allowed: the sender simply had not seen that history yet.
    pub fn one_up_except(&self, node: &str, other: &VectorClock) -> bool {
        let mut advanced = 0;

        for key in self.union_keys(other) {
            if key == node {
                continue;
            }
            let mine = self.get(key);
            let theirs = other.get(key);
            if mine.checked_add(1) == Some(theirs) {
                advanced += 1;
            } else if theirs > mine {
                return false;
            }
        }

        advanced == 1
    }

    /// Sum of all counters. Strictly grows along any causal chain, so sorting by it
    /// yields an order compatible with happened-before.
    ///
    /// Accumulated in `u128`: counters come from clients and may sit anywhere in `u64`.
    pub fn sum(&self) -> u128 {
        self.counters.values().map(|&count| u128::from(count)).sum()
    }

    fn union_keys<'a>(&'a self, other: &'a VectorClock) -> impl Iterator<Item = &'a str> {
        self.counters.keys().map(String::as_str).chain(
            other
                .counters
                .keys()
                .filter(|node| !self.counters.contains_key(*node))
                .map(String::as_str),
        )
    }
}

impl<S: Into<String>> FromIterator<(S, u64)> for VectorClock {
    fn from_iter<I: IntoIterator<Item = (S, u64)>>(iter: I) -> Self {
        Self {
            counters: iter.into_iter().map(|(node, count)| (node.into(), count)).collect(),
        }
    }
}

impl fmt::Display for VectorClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (node, count)) in self.counters.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", node, count)?;
        }
        write!(f, "}}")
    }
}
