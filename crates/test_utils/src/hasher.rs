//! A table-driven topic hasher for collision tests.

use bloomcast_api::*;
use std::collections::HashMap;

/// Maps listed topics to fixed fingerprints, so tests can force the hash
/// collisions that are astronomically unlikely with the real seeded
/// family.
///
/// Topics outside the table fall back to a cheap byte fold, which keeps
/// them distinct from small hand-written tables.
#[derive(Debug)]
pub struct FixedTopicHasher {
    family_size: usize,
    table: HashMap<Topic, Vec<i32>>,
}

impl FixedTopicHasher {
    /// Build a hasher from `(topic, fingerprints)` entries. Every entry
    /// must carry exactly `family_size` fingerprints.
    pub fn new(
        family_size: usize,
        entries: impl IntoIterator<Item = (&'static str, Vec<i32>)>,
    ) -> Self {
        let table: HashMap<Topic, Vec<i32>> = entries
            .into_iter()
            .map(|(topic, fingerprints)| {
                assert_eq!(
                    family_size,
                    fingerprints.len(),
                    "table entry for '{topic}' has the wrong family size",
                );
                (Topic::from(topic), fingerprints)
            })
            .collect();
        Self { family_size, table }
    }
}

impl TopicHasher for FixedTopicHasher {
    fn family_size(&self) -> usize {
        self.family_size
    }

    fn hashes(&self, topic: &Topic) -> Vec<i32> {
        if let Some(fingerprints) = self.table.get(topic) {
            return fingerprints.clone();
        }
        let folded = topic
            .as_bytes()
            .iter()
            .fold(0i32, |acc, b| acc.wrapping_mul(31).wrapping_add(*b as i32));
        (0..self.family_size)
            .map(|index| folded ^ (index as i32).wrapping_mul(0x9e3d))
            .collect()
    }
}
