//! Kubernetes backing for the koop object store interface.

pub mod client;
pub mod profile;

pub use client::{KubeConnector, KubeStore};
pub use profile::Profiles;
