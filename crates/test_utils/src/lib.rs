//! Internal test utilities for bloomcast crates.

use bloomcast_api::NodeId;

pub mod handle;
pub mod hasher;

/// Enable tracing with the RUST_LOG environment variable.
///
/// This is intended to be used in tests, so it defaults to DEBUG level.
pub fn enable_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(tracing::Level::DEBUG.into())
                .from_env_lossy(),
        )
        .try_init();
}

/// A node id for tests.
pub fn test_node(index: usize) -> NodeId {
    NodeId::from(format!("node-{index}"))
}

/// Poll an async condition until it holds or the timeout elapses.
///
/// The block is evaluated repeatedly with a short sleep in between; the
/// macro panics if the condition is still false once the timeout is up.
#[macro_export]
macro_rules! iter_check {
    ($timeout_ms:expr, $code:block) => {{
        let deadline = std::time::Instant::now()
            + std::time::Duration::from_millis($timeout_ms);
        loop {
            if $code {
                break;
            }
            if std::time::Instant::now() > deadline {
                panic!("iter_check timed out after {}ms", $timeout_ms);
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
    }};
    ($code:block) => {
        $crate::iter_check!(1000, $code)
    };
}
