//! Gateway implementations: wires [`crate::config::Config`] and a caller's
//! provider adapters into a ready-to-use [`Router`](crate::router::Router).

mod builder;
mod embedded;

pub use builder::RouterBuilder;
pub use embedded::EmbeddedRouter;
