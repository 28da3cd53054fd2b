//! The seeded topic hash family.
//!
//! Every node of a cluster must run the identical family: the same seed
//! and the same family size. A node advertises the fingerprints of its
//! local topics instead of the topics themselves, so per-topic memory
//! advertised cluster-wide is bounded by the family size rather than the
//! topic length, at the price of hash-collision false positives that the
//! subscriber filters out.

use crate::Topic;
use std::collections::HashSet;
use std::sync::Arc;

/// A family of `k` independent hash functions mapping a topic to `k`
/// 32-bit fingerprints.
///
/// Implementations must be pure: identical input produces identical
/// output, on every node, for the lifetime of the cluster.
pub trait TopicHasher: 'static + Send + Sync + std::fmt::Debug {
    /// The number of hash functions in the family.
    fn family_size(&self) -> usize;

    /// Map a topic to one fingerprint per family member.
    fn hashes(&self, topic: &Topic) -> Vec<i32>;
}

/// Trait object [TopicHasher].
pub type DynTopicHasher = Arc<dyn TopicHasher>;

/// Union of fingerprints across a set of topics.
pub fn hash_all<'t>(
    hasher: &dyn TopicHasher,
    topics: impl IntoIterator<Item = &'t Topic>,
) -> HashSet<i32> {
    topics
        .into_iter()
        .flat_map(|topic| hasher.hashes(topic))
        .collect()
}

/// The default hash family: for index `i`, the first four bytes of
/// `SHA-256(seed ‖ i ‖ topic)` interpreted as a little-endian i32.
///
/// Salting the digest with the member index makes the family members
/// independent; salting with the cluster seed makes fingerprints
/// unpredictable to parties that do not know the seed. Collision
/// probability of two distinct topics on all `k` fingerprints is
/// ≈ 1/2^(32k).
#[derive(Debug, Clone)]
pub struct SeededTopicHasher {
    seed: Arc<str>,
    family_size: usize,
}

impl SeededTopicHasher {
    /// Construct a hash family from the cluster-wide seed and family size.
    pub fn new(seed: impl Into<Arc<str>>, family_size: usize) -> Self {
        Self {
            seed: seed.into(),
            family_size,
        }
    }
}

impl TopicHasher for SeededTopicHasher {
    fn family_size(&self) -> usize {
        self.family_size
    }

    fn hashes(&self, topic: &Topic) -> Vec<i32> {
        use sha2::{Digest, Sha256};
        (0..self.family_size)
            .map(|index| {
                let mut digest = Sha256::new();
                digest.update(self.seed.as_bytes());
                digest.update((index as u32).to_le_bytes());
                digest.update(topic.as_bytes());
                let digest = digest.finalize();
                i32::from_le_bytes(
                    digest[..4].try_into().expect("digest is 32 bytes"),
                )
            })
            .collect()
    }
}
