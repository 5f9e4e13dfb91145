//! The resource abstraction and canonicalization core of koop.
//!
//! A resource kind is described once, as data, and registered in a
//! [`descriptor::Registry`]. Objects travel as schemaless JSON values and are
//! canonicalized by the [`patch`] engine before they are stored as YAML.

pub mod descriptor;
pub mod document;
pub mod kinds;
pub mod patch;
pub mod policy;
pub mod store;

pub use descriptor::{Registry, ResourceDescriptor, UnknownKind};
pub use document::Document;
pub use policy::{RunConfig, WriteOutcome, WritePolicy};
pub use store::{ApiKind, Connector, NotFound, ObjectStore};
