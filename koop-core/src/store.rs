//! The interface to the cluster object store, and to the set of clusters we
//! know how to connect to.
//!
//! Both are blocking: koop processes one object at a time.

pub mod memory;

use std::{error::Error, fmt::Display};

use anyhow::Result;
use serde_json::Value;

/// Where the objects of a kind live in the object store API.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ApiKind {
    /// API group; empty for the core group.
    pub group: String,
    pub version: String,
    pub kind: String,
    /// Plural resource name used in request paths.
    pub plural: String,
}

impl ApiKind {
    pub fn new(group: &str, version: &str, kind: &str, plural: &str) -> ApiKind {
        ApiKind {
            group: group.to_string(),
            version: version.to_string(),
            kind: kind.to_string(),
            plural: plural.to_string(),
        }
    }

    /// The `apiVersion` of objects of this kind, e.g. `apps/v1` or `v1`.
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }
}

/// The object store has no object by this name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NotFound {
    pub kind: String,
    pub namespace: String,
    pub name: String,
}
impl Display for NotFound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} '{}' not found in namespace '{}'",
            self.kind, self.name, self.namespace
        )
    }
}
impl Error for NotFound {}

impl NotFound {
    pub fn new(api: &ApiKind, namespace: &str, name: &str) -> NotFound {
        NotFound {
            kind: api.kind.clone(),
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }
}

/// Whether an error is, at its root, a [`NotFound`].
pub fn is_not_found(e: &anyhow::Error) -> bool {
    e.chain().any(|cause| cause.downcast_ref::<NotFound>().is_some())
}

/// Namespaced object operations, per kind.
///
/// Objects are passed as whole JSON documents including `metadata`.
pub trait ObjectStore {
    /// Names of all namespaces in the cluster.
    fn namespaces(&self) -> Result<Vec<String>>;

    fn namespace_exists(&self, namespace: &str) -> Result<bool>;

    fn list(&self, api: &ApiKind, namespace: &str) -> Result<Vec<Value>>;

    /// `Ok(None)` when the object does not exist.
    fn get(&self, api: &ApiKind, namespace: &str, name: &str) -> Result<Option<Value>>;

    fn create(&self, api: &ApiKind, namespace: &str, object: &Value) -> Result<()>;

    /// Replace an existing object. Fails with [`NotFound`] when it is absent.
    fn replace(&self, api: &ApiKind, namespace: &str, name: &str, object: &Value) -> Result<()>;

    /// Merge `patch` into an existing object. Fails with [`NotFound`] when it
    /// is absent.
    fn patch(&self, api: &ApiKind, namespace: &str, name: &str, patch: &Value) -> Result<()>;
}

/// The clusters that can be reached, by profile name.
pub trait Connector {
    /// All known cluster names, sorted.
    fn clusters(&self) -> Result<Vec<String>>;

    fn connect(&self, cluster: &str) -> Result<Box<dyn ObjectStore>>;
}
