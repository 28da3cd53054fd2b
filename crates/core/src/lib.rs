#![deny(missing_docs)]
//! Reference implementations of the [bloomcast API](bloomcast_api).

use bloomcast_api::*;

pub mod factories;

mod subscriptions;
pub use subscriptions::*;

/// Construct a builder wired with the in-process reference modules: mem
/// ddata stores for the compressed and the literal map, and the seeded
/// topic hash family derived from the pub-sub module config.
///
/// One builder models one cluster. Create every node's [PubSubFactory]
/// (see [factories::PubSubFactory]) from the same frozen builder so all
/// nodes share the replicated stores.
pub fn default_builder() -> Builder {
    let mut config = config::Config::default();
    config
        .set_module_config(&factories::CorePubSubModConfig::default())
        .expect("failed to seed an empty config with defaults");
    let compressed: DynDDataFactory<i32> =
        factories::MemDDataFactory::<i32>::new();
    let acks: DynDDataFactory<String> =
        factories::MemDDataFactory::<String>::new();
    let mut builder = Builder {
        config,
        topic_hasher: None,
        compressed,
        acks: Some(acks),
    };
    builder
        .set_default_config()
        .expect("mem modules carry no config");
    builder
}
