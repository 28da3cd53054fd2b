//! String-backed identity types used across the pub-sub.
//!
//! All of these are cheap-to-clone wrappers around `Arc<str>` with bytewise
//! equality and lexicographic ordering. The ordering matters: ack-label
//! reconciliation resolves concurrent declarations in favor of the
//! lexicographically smallest [NodeId].

use std::sync::Arc;

macro_rules! imp_str_id {
    ($(#[doc = $doc:expr])* $name:ident) => {
        $(#[doc = $doc])*
        #[derive(
            Clone,
            PartialEq,
            Eq,
            PartialOrd,
            Ord,
            Hash,
            serde::Serialize,
            serde::Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub Arc<str>);

        impl std::ops::Deref for $name {
            type Target = str;

            fn deref(&self) -> &Self::Target {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(
                &self,
                f: &mut std::fmt::Formatter<'_>,
            ) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        // Render as the bare string. The derived form ($name("…")) makes
        // cluster traces unreadable.
        impl std::fmt::Debug for $name {
            fn fmt(
                &self,
                f: &mut std::fmt::Formatter<'_>,
            ) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<Arc<str>> for $name {
            fn from(s: Arc<str>) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.into())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s.into())
            }
        }

        impl $name {
            /// Borrow the inner string.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }
    };
}

imp_str_id!(
    /// Cluster-unique identifier of a pub-sub participant node.
    NodeId
);

imp_str_id!(
    /// A publication channel. Non-empty UTF-8; equality is bytewise.
    /// There are no wildcards, a topic only matches itself.
    Topic
);

imp_str_id!(
    /// A declared acknowledgement label. Globally unique at the moment of
    /// declaration: at most one node advertises a given label at a time.
    AckLabel
);

imp_str_id!(
    /// Identity of a local subscriber handle. Two handles refer to the
    /// same subscriber exactly when their ids are equal.
    SubscriberId
);

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn display_and_debug_render_bare() {
        let n = NodeId::from("node-1");
        assert_eq!("node-1", format!("{n}"));
        assert_eq!("node-1", format!("{n:?}"));
    }

    #[test]
    fn node_id_ordering_is_lexicographic() {
        let a = NodeId::from("node-a");
        let b = NodeId::from("node-b");
        assert!(a < b);
        assert_eq!(a, NodeId::from("node-a"));
    }

    #[test]
    fn serde_is_transparent() {
        let t = Topic::from("twin/events");
        let enc = serde_json::to_string(&t).unwrap();
        assert_eq!("\"twin/events\"", enc);
        let dec: Topic = serde_json::from_str(&enc).unwrap();
        assert_eq!(t, dec);
    }
}
