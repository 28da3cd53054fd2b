//! Factories for generating instances of bloomcast modules.

mod core_pubsub;
pub use core_pubsub::*;

mod core_publisher;
pub use core_publisher::*;

mod core_subscriber;

mod core_updater;

mod core_acks;

mod supervisor;

mod mem_ddata;
pub use mem_ddata::*;

mod mem_transport;
pub use mem_transport::*;
