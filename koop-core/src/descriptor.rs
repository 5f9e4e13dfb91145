//! Resource kinds, and the registry that maps kind names to them.

use std::{error::Error, fmt::Display};

use anyhow::Result;
use serde_json::Value;

use crate::policy::{RunConfig, Write, WriteOutcome, WritePolicy};
use crate::store::{ApiKind, NotFound, ObjectStore};

/// Everything koop can do with one kind of resource.
pub trait ResourceDescriptor {
    /// The name used on the command line and as the directory name.
    fn kind(&self) -> &str;

    /// Names of the objects in `namespace`, minus the ones this kind never
    /// synchronizes.
    fn list(&self, store: &dyn ObjectStore, namespace: &str) -> Result<Vec<String>>;

    /// The live object. Fails with [`NotFound`] when it does not exist.
    fn fetch(&self, store: &dyn ObjectStore, namespace: &str, name: &str) -> Result<Value>;

    /// Write a canonical document back, according to the kind's policy.
    fn write(
        &self,
        store: &dyn ObjectStore,
        namespace: &str,
        name: &str,
        doc: &Value,
        run: RunConfig,
    ) -> Result<WriteOutcome>;
}

/// A kind described entirely by data.
#[derive(Clone)]
pub struct KindDescriptor {
    pub name: String,
    pub api: ApiKind,
    pub policy: WritePolicy,
    /// Has `spec.replicas`.
    pub scalable: bool,
    /// Objects for which this returns true are left out of listings.
    pub exclude: fn(&Value) -> bool,
}

impl KindDescriptor {
    pub fn new(name: &str, api: ApiKind, policy: WritePolicy) -> KindDescriptor {
        KindDescriptor {
            name: name.to_string(),
            api,
            policy,
            scalable: false,
            exclude: |_| false,
        }
    }

    pub fn scalable(mut self) -> KindDescriptor {
        self.scalable = true;
        self
    }

    pub fn excluding(mut self, exclude: fn(&Value) -> bool) -> KindDescriptor {
        self.exclude = exclude;
        self
    }
}

impl ResourceDescriptor for KindDescriptor {
    fn kind(&self) -> &str {
        &self.name
    }

    fn list(&self, store: &dyn ObjectStore, namespace: &str) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for object in store.list(&self.api, namespace)? {
            if (self.exclude)(&object) {
                continue;
            }
            match object.pointer("/metadata/name").and_then(Value::as_str) {
                Some(name) => names.push(name.to_string()),
                None => anyhow::bail!("{} object without a name in '{}'", self.name, namespace),
            }
        }
        Ok(names)
    }

    fn fetch(&self, store: &dyn ObjectStore, namespace: &str, name: &str) -> Result<Value> {
        store
            .get(&self.api, namespace, name)?
            .ok_or_else(|| NotFound::new(&self.api, namespace, name).into())
    }

    fn write(
        &self,
        store: &dyn ObjectStore,
        namespace: &str,
        name: &str,
        doc: &Value,
        run: RunConfig,
    ) -> Result<WriteOutcome> {
        let w = Write {
            store,
            api: &self.api,
            namespace,
            name,
            scalable: self.scalable,
            run,
        };
        self.policy.apply(&w, doc)
    }
}

/// No kind by this name has been registered.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnknownKind {
    pub kind: String,
    pub known: Vec<String>,
}
impl Display for UnknownKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "unknown resource kind '{}', known kinds are {}",
            self.kind,
            self.known.join(", ")
        )
    }
}
impl Error for UnknownKind {}

/// The set of kinds, in registration order.
#[derive(Default)]
pub struct Registry {
    descriptors: Vec<Box<dyn ResourceDescriptor>>,
}

impl Registry {
    pub fn new() -> Registry {
        Registry::default()
    }

    /// Add a kind. Registering a name twice is accepted; lookups keep
    /// returning the first registration.
    pub fn register(&mut self, descriptor: impl ResourceDescriptor + 'static) {
        self.descriptors.push(Box::new(descriptor));
    }

    pub fn find(&self, kind: &str) -> Result<&dyn ResourceDescriptor, UnknownKind> {
        self.descriptors
            .iter()
            .find(|d| d.kind() == kind)
            .map(|d| &**d)
            .ok_or_else(|| UnknownKind {
                kind: kind.to_string(),
                known: self.known_kinds(),
            })
    }

    /// Kind names in registration order, without duplicates.
    pub fn known_kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = Vec::new();
        for d in &self.descriptors {
            if !kinds.iter().any(|k| k == d.kind()) {
                kinds.push(d.kind().to_string());
            }
        }
        kinds
    }
}
