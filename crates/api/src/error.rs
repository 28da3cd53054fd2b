//! Bloomcast error types.

use crate::{AckLabel, NodeId};
use std::sync::Arc;

/// A clonable trait-object inner error.
#[derive(Clone, Default)]
pub struct DynInnerError(
    pub Option<Arc<dyn std::error::Error + 'static + Send + Sync>>,
);

impl std::fmt::Debug for DynInnerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::fmt::Display for DynInnerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0.as_ref() {
            None => f.write_str("None"),
            Some(s) => s.fmt(f),
        }
    }
}

impl std::error::Error for DynInnerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.as_ref().map(|s| {
            let out: &(dyn std::error::Error + 'static) = &**s;
            out
        })
    }
}

impl DynInnerError {
    /// Construct a new DynInnerError from a source error.
    pub fn new<E: std::error::Error + 'static + Send + Sync>(e: E) -> Self {
        Self(Some(Arc::new(e)))
    }
}

/// The core bloomcast error type. This type is used in all external
/// bloomcast apis as well as internally in some modules.
///
/// This type is required to implement `Clone` to ease the use of
/// shared futures, which require the entire `Result` to be `Clone`.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BcError {
    /// Generic bloomcast internal error.
    #[error("{ctx} (src: {src})")]
    Other {
        /// Any context associated with this error.
        ctx: Arc<str>,

        /// The inner error (if any).
        #[source]
        src: DynInnerError,
    },

    /// A replicated write did not reach the requested consistency in time.
    ///
    /// The update loop swallows this and re-advertises on a later, forced
    /// tick. It is only surfaced to callers of synchronous operations such
    /// as ack-label declaration.
    #[error("replicated write timed out: {ctx}")]
    ReplicationTimeout {
        /// Any context associated with this error.
        ctx: Arc<str>,
    },

    /// The replication subsystem reports no reachable peers.
    #[error("cluster unreachable")]
    ClusterUnreachable,

    /// An acknowledgement label is already declared by another node.
    #[error("ack label '{label}' is already declared by node '{owner}'")]
    LabelConflict {
        /// The conflicting label.
        label: AckLabel,

        /// The node currently advertising the label.
        owner: NodeId,
    },
}

impl BcError {
    /// Construct an "other" error with an inner source error.
    pub fn other_src<
        C: std::fmt::Display,
        S: std::error::Error + 'static + Send + Sync,
    >(
        ctx: C,
        src: S,
    ) -> Self {
        Self::Other {
            ctx: ctx.to_string().into_boxed_str().into(),
            src: DynInnerError::new(src),
        }
    }

    /// Construct an "other" error.
    pub fn other<C: std::fmt::Display>(ctx: C) -> Self {
        Self::Other {
            ctx: ctx.to_string().into_boxed_str().into(),
            src: DynInnerError::default(),
        }
    }

    /// Construct a replication timeout error.
    pub fn replication_timeout<C: std::fmt::Display>(ctx: C) -> Self {
        Self::ReplicationTimeout {
            ctx: ctx.to_string().into_boxed_str().into(),
        }
    }

    /// `true` if this error reports a replication failure that the update
    /// loop should absorb and recover from on a later tick.
    pub fn is_replication_failure(&self) -> bool {
        matches!(
            self,
            Self::ReplicationTimeout { .. } | Self::ClusterUnreachable
        )
    }
}

/// The core bloomcast result type.
pub type BcResult<T> = Result<T, BcError>;

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn error_display() {
        assert_eq!(
            "bla (src: None)",
            BcError::other("bla").to_string().as_str(),
        );
        assert_eq!(
            "foo (src: bar)",
            BcError::other_src("foo", std::io::Error::other("bar"))
                .to_string()
                .as_str(),
        );
        assert_eq!(
            "replicated write timed out: flush",
            BcError::replication_timeout("flush").to_string().as_str(),
        );
        assert_eq!(
            "ack label 'live' is already declared by node 'n1'",
            BcError::LabelConflict {
                label: "live".into(),
                owner: "n1".into(),
            }
            .to_string()
            .as_str(),
        );
    }

    #[test]
    fn replication_failures_are_recoverable() {
        assert!(BcError::replication_timeout("x").is_replication_failure());
        assert!(BcError::ClusterUnreachable.is_replication_failure());
        assert!(!BcError::other("x").is_replication_failure());
    }
}
