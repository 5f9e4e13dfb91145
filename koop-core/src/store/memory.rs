//! An object store held in memory.
//!
//! It does the bookkeeping a real API server does on writes (UIDs, resource
//! versions with optimistic concurrency, generation, status retention) so
//! that canonicalization and write policies can be exercised without a
//! cluster. Clones share state.

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::{Arc, Mutex, MutexGuard},
};

use anyhow::{anyhow, bail, Result};
use serde_json::{json, Value};

use super::{ApiKind, Connector, NotFound, ObjectStore};

const CREATION_TIMESTAMP: &str = "2020-01-01T00:00:00Z";

/// A write that reached the store, for assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Create { kind: String, namespace: String, name: String },
    Replace { kind: String, namespace: String, name: String },
    Patch { kind: String, namespace: String, name: String },
}

#[derive(Debug, Default)]
struct Inner {
    namespaces: BTreeSet<String>,
    /// key: (group/plural, namespace, name)
    objects: BTreeMap<(String, String, String), Value>,
    next_version: u64,
    calls: Vec<Call>,
}

impl Inner {
    fn bump(&mut self) -> String {
        self.next_version += 1;
        self.next_version.to_string()
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

fn key(api: &ApiKind, namespace: &str, name: &str) -> (String, String, String) {
    (
        format!("{}/{}", api.group, api.plural),
        namespace.to_string(),
        name.to_string(),
    )
}

fn metadata_mut(object: &mut Value) -> Result<&mut serde_json::Map<String, Value>> {
    let root = object
        .as_object_mut()
        .ok_or_else(|| anyhow!("object must be a mapping"))?;
    root.entry("metadata")
        .or_insert_with(|| json!({}))
        .as_object_mut()
        .ok_or_else(|| anyhow!("metadata must be a mapping"))
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panic while holding the lock can only come from a failing test.
        self.inner.lock().expect("mutex poisoned")
    }

    pub fn add_namespace(&self, namespace: &str) -> &Self {
        self.lock().namespaces.insert(namespace.to_string());
        self
    }

    /// Store `object` as-is, the way it would come back from the server.
    /// The namespace is created if needed and `metadata.name` must be set.
    pub fn insert(&self, api: &ApiKind, namespace: &str, object: Value) -> Result<&Self> {
        let name = object
            .pointer("/metadata/name")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow!("{}: metadata.name is required", api.kind))?
            .to_string();
        let mut inner = self.lock();
        inner.namespaces.insert(namespace.to_string());
        inner.objects.insert(key(api, namespace, &name), object);
        Ok(self)
    }

    pub fn object(&self, api: &ApiKind, namespace: &str, name: &str) -> Option<Value> {
        self.lock().objects.get(&key(api, namespace, name)).cloned()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }
}

impl ObjectStore for MemoryStore {
    fn namespaces(&self) -> Result<Vec<String>> {
        Ok(self.lock().namespaces.iter().cloned().collect())
    }

    fn namespace_exists(&self, namespace: &str) -> Result<bool> {
        Ok(self.lock().namespaces.contains(namespace))
    }

    fn list(&self, api: &ApiKind, namespace: &str) -> Result<Vec<Value>> {
        let inner = self.lock();
        let (kind_key, _, _) = key(api, namespace, "");
        Ok(inner
            .objects
            .iter()
            .filter(|((k, ns, _), _)| *k == kind_key && ns == namespace)
            .map(|(_, v)| v.clone())
            .collect())
    }

    fn get(&self, api: &ApiKind, namespace: &str, name: &str) -> Result<Option<Value>> {
        Ok(self.object(api, namespace, name))
    }

    fn create(&self, api: &ApiKind, namespace: &str, object: &Value) -> Result<()> {
        let mut object = object.clone();
        let name = object
            .pointer("/metadata/name")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow!("{}: metadata.name is required", api.kind))?
            .to_string();
        let mut inner = self.lock();
        if !inner.namespaces.contains(namespace) {
            bail!("namespace '{}' not found", namespace);
        }
        let k = key(api, namespace, &name);
        if inner.objects.contains_key(&k) {
            bail!("{} '{}' already exists", api.kind, name);
        }
        let version = inner.bump();
        let uid = format!("uid-{}", version);
        let meta = metadata_mut(&mut object)?;
        if meta.contains_key("resourceVersion") {
            bail!("resourceVersion should not be set on objects to be created");
        }
        meta.insert("namespace".into(), json!(namespace));
        meta.insert("uid".into(), json!(uid));
        meta.insert("resourceVersion".into(), json!(version));
        meta.insert("generation".into(), json!(1));
        meta.insert("creationTimestamp".into(), json!(CREATION_TIMESTAMP));
        inner.calls.push(Call::Create {
            kind: api.kind.clone(),
            namespace: namespace.to_string(),
            name,
        });
        inner.objects.insert(k, object);
        Ok(())
    }

    fn replace(&self, api: &ApiKind, namespace: &str, name: &str, object: &Value) -> Result<()> {
        let mut inner = self.lock();
        let k = key(api, namespace, name);
        let live = match inner.objects.get(&k) {
            Some(live) => live.clone(),
            None => return Err(NotFound::new(api, namespace, name).into()),
        };
        let mut object = object.clone();
        let live_version = live.pointer("/metadata/resourceVersion").cloned();
        if let Some(v) = object.pointer("/metadata/resourceVersion") {
            if Some(v) != live_version.as_ref() {
                bail!(
                    "conflict: {} '{}' has been modified (resourceVersion {} != {:?})",
                    api.kind,
                    name,
                    v,
                    live_version
                );
            }
        }
        let spec_changed = object.get("spec") != live.get("spec");
        let generation = live
            .pointer("/metadata/generation")
            .and_then(Value::as_i64)
            .unwrap_or(1);
        let version = inner.bump();
        let meta = metadata_mut(&mut object)?;
        meta.insert("namespace".into(), json!(namespace));
        meta.insert("resourceVersion".into(), json!(version));
        meta.insert(
            "generation".into(),
            json!(if spec_changed { generation + 1 } else { generation }),
        );
        for field in ["uid", "creationTimestamp"] {
            if let Some(v) = live.pointer(&format!("/metadata/{}", field)) {
                meta.insert(field.into(), v.clone());
            }
        }
        if let (Some(status), Some(root)) = (live.get("status"), object.as_object_mut()) {
            root.insert("status".into(), status.clone());
        }
        inner.calls.push(Call::Replace {
            kind: api.kind.clone(),
            namespace: namespace.to_string(),
            name: name.to_string(),
        });
        inner.objects.insert(k, object);
        Ok(())
    }

    fn patch(&self, api: &ApiKind, namespace: &str, name: &str, patch: &Value) -> Result<()> {
        let mut inner = self.lock();
        let k = key(api, namespace, name);
        let mut object = match inner.objects.get(&k) {
            Some(live) => live.clone(),
            None => return Err(NotFound::new(api, namespace, name).into()),
        };
        json_patch::merge(&mut object, patch);
        let version = inner.bump();
        metadata_mut(&mut object)?.insert("resourceVersion".into(), json!(version));
        inner.calls.push(Call::Patch {
            kind: api.kind.clone(),
            namespace: namespace.to_string(),
            name: name.to_string(),
        });
        inner.objects.insert(k, object);
        Ok(())
    }
}

/// A fixed set of in-memory clusters.
#[derive(Clone, Default)]
pub struct MemoryConnector {
    clusters: BTreeMap<String, MemoryStore>,
}

impl MemoryConnector {
    pub fn new() -> MemoryConnector {
        MemoryConnector::default()
    }

    pub fn with_cluster(mut self, name: &str, store: MemoryStore) -> MemoryConnector {
        self.clusters.insert(name.to_string(), store);
        self
    }
}

impl Connector for MemoryConnector {
    fn clusters(&self) -> Result<Vec<String>> {
        Ok(self.clusters.keys().cloned().collect())
    }

    fn connect(&self, cluster: &str) -> Result<Box<dyn ObjectStore>> {
        match self.clusters.get(cluster) {
            Some(store) => Ok(Box::new(store.clone())),
            None => bail!("unknown cluster profile '{}'", cluster),
        }
    }
}
