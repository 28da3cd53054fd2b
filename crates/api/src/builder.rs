//! Builder-related types.

use crate::*;
use std::sync::Arc;

/// The general bloomcast builder.
/// This contains both configuration and factory instances,
/// allowing construction of runtime module instances.
///
/// One builder describes one cluster: every node's pub-sub factory is
/// created from the same (frozen) builder so that all nodes share the
/// replicated stores and resolve the identical topic hash family.
pub struct Builder {
    /// The module configuration to be used when building modules.
    /// This can be loaded from disk or modified before freezing the
    /// builder.
    pub config: config::Config,

    /// Override for the topic hash family.
    ///
    /// When `None`, each node derives a [SeededTopicHasher] from the
    /// pub-sub module config. Whatever this resolves to must be identical
    /// on every node of the cluster for the pub-sub to function.
    pub topic_hasher: Option<DynTopicHasher>,

    /// The [DDataFactory] for the compressed topic-advertisement store.
    pub compressed: DynDDataFactory<i32>,

    /// The [DDataFactory] for the literal ack-label store, if declared
    /// acknowledgement labels are used.
    pub acks: Option<DynDDataFactory<String>>,
}

impl Builder {
    /// Construct a default config given the configured module factories.
    /// Note, this should be called before freezing the Builder instance
    /// in an Arc<>.
    pub fn set_default_config(&mut self) -> BcResult<()> {
        let Self {
            config,
            topic_hasher: _,
            compressed,
            acks,
        } = self;

        compressed.default_config(config)?;
        if let Some(acks) = acks {
            acks.default_config(config)?;
        }

        Ok(())
    }

    /// Validate the configuration against the configured module factories.
    pub fn validate_config(&self) -> BcResult<()> {
        self.compressed.validate_config(&self.config)?;
        if let Some(acks) = &self.acks {
            acks.validate_config(&self.config)?;
        }
        Ok(())
    }

    /// Freeze the builder so node factories can be created from it.
    pub fn build(self) -> Arc<Self> {
        Arc::new(self)
    }
}

impl std::fmt::Debug for Builder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Builder")
            .field("config", &self.config)
            .field("compressed", &self.compressed)
            .field("acks", &self.acks)
            .finish()
    }
}
