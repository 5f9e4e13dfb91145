//! How a stored document is written back to the object store.
//!
//! Kinds differ in how they reconcile with the live object, and that choice
//! is kept per kind in the [`WritePolicy`] of its descriptor.

use std::fmt::Display;

use anyhow::{anyhow, Context, Result};
use serde_json::{json, Value};

use crate::patch::strip_version_token;
use crate::store::{is_not_found, ApiKind, ObjectStore};

/// Run-wide switches, fixed before the first object is processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunConfig {
    /// Never modify an object that already exists; only create missing ones.
    pub no_update: bool,
    /// Create scalable workloads with zero replicas.
    pub zero_replicas: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WritePolicy {
    /// Read the live object first and carry its resource version (and, for
    /// scalable kinds, its replica count) into a full update. Create when
    /// absent.
    PreserveIdentity,
    /// Merge-patch the live object; create when absent.
    PatchOrCreate,
    /// Full update without the resource version, so the write is not
    /// checked against concurrent changes; create when absent.
    UpdateOrCreate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Created,
    Updated,
    Patched,
    /// The object exists and the no-update gate is on.
    Skipped,
}

impl Display for WriteOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WriteOutcome::Created => "created",
            WriteOutcome::Updated => "updated",
            WriteOutcome::Patched => "patched",
            WriteOutcome::Skipped => "skipped, already exists",
        };
        f.write_str(s)
    }
}

/// A write request for one object.
pub struct Write<'a> {
    pub store: &'a dyn ObjectStore,
    pub api: &'a ApiKind,
    pub namespace: &'a str,
    pub name: &'a str,
    /// Whether the kind has a replica count.
    pub scalable: bool,
    pub run: RunConfig,
}

impl WritePolicy {
    /// Write `doc` (a stored document) under `namespace/name`.
    pub fn apply(&self, w: &Write<'_>, doc: &Value) -> Result<WriteOutcome> {
        let object = with_identity(doc, w.namespace, w.name)?;
        match self {
            WritePolicy::PreserveIdentity => replace_live(w, object, true),
            WritePolicy::PatchOrCreate => {
                if w.run.no_update && exists(w)? {
                    return Ok(WriteOutcome::Skipped);
                }
                let mut patch = object.clone();
                if w.scalable {
                    remove_replicas(&mut patch);
                }
                match w.store.patch(w.api, w.namespace, w.name, &patch) {
                    Ok(()) => Ok(WriteOutcome::Patched),
                    Err(e) if is_not_found(&e) => create(w, object),
                    Err(e) => Err(e),
                }
            }
            WritePolicy::UpdateOrCreate => replace_live(w, object, false),
        }
    }
}

/// Metadata kept by the server across updates and never stored in files.
const CARRIED_METADATA: &[&str] = &["finalizers", "ownerReferences"];

fn exists(w: &Write<'_>) -> Result<bool> {
    Ok(w.store.get(w.api, w.namespace, w.name)?.is_some())
}

/// Full update of the live object, or create it when absent. Carries over
/// what the file cannot know: finalizers, owner references, the live replica
/// count of scalable kinds and, if `with_version`, the resource version.
fn replace_live(w: &Write<'_>, mut object: Value, with_version: bool) -> Result<WriteOutcome> {
    let current = match w.store.get(w.api, w.namespace, w.name)? {
        Some(current) => current,
        None => return create(w, object),
    };
    if w.run.no_update {
        return Ok(WriteOutcome::Skipped);
    }
    let meta = metadata_mut(&mut object)?;
    if with_version {
        if let Some(version) = current.pointer("/metadata/resourceVersion") {
            meta.insert("resourceVersion".into(), version.clone());
        }
    }
    for field in CARRIED_METADATA {
        if let Some(v) = current.pointer(&format!("/metadata/{}", field)) {
            meta.insert(field.to_string(), v.clone());
        }
    }
    if w.scalable {
        match current.pointer("/spec/replicas") {
            Some(replicas) => set_replicas(&mut object, replicas.clone())?,
            None => remove_replicas(&mut object),
        }
    }
    match w.store.replace(w.api, w.namespace, w.name, &object) {
        Ok(()) => Ok(WriteOutcome::Updated),
        // Deleted between our read and the update.
        Err(e) if is_not_found(&e) => create(w, object),
        Err(e) => Err(e),
    }
}

fn create(w: &Write<'_>, mut object: Value) -> Result<WriteOutcome> {
    if object.pointer("/metadata/resourceVersion").is_some() {
        object = strip_version_token(&object)?;
    }
    if w.scalable && w.run.zero_replicas {
        set_replicas(&mut object, json!(0))?;
    }
    w.store
        .create(w.api, w.namespace, &object)
        .with_context(|| format!("creating {} '{}'", w.api.kind, w.name))?;
    Ok(WriteOutcome::Created)
}

/// Re-attach the name and namespace that canonicalization removed.
fn with_identity(doc: &Value, namespace: &str, name: &str) -> Result<Value> {
    let mut object = doc.clone();
    let meta = metadata_mut(&mut object)?;
    meta.insert("name".into(), json!(name));
    meta.insert("namespace".into(), json!(namespace));
    Ok(object)
}

fn metadata_mut(object: &mut Value) -> Result<&mut serde_json::Map<String, Value>> {
    object
        .as_object_mut()
        .ok_or_else(|| anyhow!("document root must be a mapping"))?
        .entry("metadata")
        .or_insert_with(|| json!({}))
        .as_object_mut()
        .ok_or_else(|| anyhow!("metadata must be a mapping"))
}

fn remove_replicas(object: &mut Value) {
    if let Some(spec) = object.get_mut("spec").and_then(Value::as_object_mut) {
        spec.remove("replicas");
    }
}

fn set_replicas(object: &mut Value, replicas: Value) -> Result<()> {
    object
        .as_object_mut()
        .ok_or_else(|| anyhow!("document root must be a mapping"))?
        .entry("spec")
        .or_insert_with(|| json!({}))
        .as_object_mut()
        .ok_or_else(|| anyhow!("spec must be a mapping"))?
        .insert("replicas".into(), replicas);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::{Call, MemoryStore};

    fn deployments() -> ApiKind {
        ApiKind::new("apps", "v1", "Deployment", "deployments")
    }

    fn write<'a>(store: &'a MemoryStore, api: &'a ApiKind, run: RunConfig) -> Write<'a> {
        Write {
            store,
            api,
            namespace: "shop",
            name: "web",
            scalable: true,
            run,
        }
    }

    fn stored() -> Value {
        json!({"spec": {"template": {"spec": {"containers": [{"image": "nginx:2"}]}}}})
    }

    fn live(replicas: i64) -> Value {
        json!({
            "metadata": {"name": "web", "namespace": "shop", "resourceVersion": "41", "uid": "u"},
            "spec": {"replicas": replicas, "template": {"spec": {"containers": [{"image": "nginx:1"}]}}}
        })
    }

    #[test]
    fn test_preserve_identity_keeps_live_replicas() {
        let store = MemoryStore::new();
        let api = deployments();
        store.insert(&api, "shop", live(3)).unwrap();
        let outcome = WritePolicy::PreserveIdentity
            .apply(&write(&store, &api, RunConfig::default()), &stored())
            .unwrap();
        assert_eq!(outcome, WriteOutcome::Updated);
        let obj = store.object(&api, "shop", "web").unwrap();
        assert_eq!(obj.pointer("/spec/replicas"), Some(&json!(3)));
        assert_eq!(
            obj.pointer("/spec/template/spec/containers/0/image"),
            Some(&json!("nginx:2"))
        );
        assert_eq!(obj.pointer("/metadata/uid"), Some(&json!("u")));
    }

    #[test]
    fn test_preserve_identity_keeps_live_replicas_with_zero_replicas_gate() {
        let store = MemoryStore::new();
        let api = deployments();
        store.insert(&api, "shop", live(3)).unwrap();
        let run = RunConfig {
            zero_replicas: true,
            ..Default::default()
        };
        WritePolicy::PreserveIdentity
            .apply(&write(&store, &api, run), &stored())
            .unwrap();
        let obj = store.object(&api, "shop", "web").unwrap();
        assert_eq!(obj.pointer("/spec/replicas"), Some(&json!(3)));
    }

    #[test]
    fn test_create_with_zero_replicas() {
        let store = MemoryStore::new();
        store.add_namespace("shop");
        let api = deployments();
        let run = RunConfig {
            zero_replicas: true,
            ..Default::default()
        };
        let outcome = WritePolicy::PreserveIdentity
            .apply(&write(&store, &api, run), &stored())
            .unwrap();
        assert_eq!(outcome, WriteOutcome::Created);
        let obj = store.object(&api, "shop", "web").unwrap();
        assert_eq!(obj.pointer("/spec/replicas"), Some(&json!(0)));
        assert_eq!(obj.pointer("/metadata/name"), Some(&json!("web")));
    }

    #[test]
    fn test_create_without_gate_leaves_replicas_unset() {
        let store = MemoryStore::new();
        store.add_namespace("shop");
        let api = deployments();
        WritePolicy::PreserveIdentity
            .apply(&write(&store, &api, RunConfig::default()), &stored())
            .unwrap();
        let obj = store.object(&api, "shop", "web").unwrap();
        assert!(obj.pointer("/spec/replicas").is_none());
    }

    #[test]
    fn test_create_uses_stored_replicas_without_gate() {
        let store = MemoryStore::new();
        store.add_namespace("shop");
        let api = deployments();
        let doc = json!({"spec": {"replicas": 5}});
        WritePolicy::PreserveIdentity
            .apply(&write(&store, &api, RunConfig::default()), &doc)
            .unwrap();
        let obj = store.object(&api, "shop", "web").unwrap();
        assert_eq!(obj.pointer("/spec/replicas"), Some(&json!(5)));
    }

    #[test]
    fn test_update_keeps_live_replicas_over_stored() {
        let store = MemoryStore::new();
        let api = deployments();
        store.insert(&api, "shop", live(3)).unwrap();
        let doc = json!({"spec": {"replicas": 5}});
        WritePolicy::PreserveIdentity
            .apply(&write(&store, &api, RunConfig::default()), &doc)
            .unwrap();
        let obj = store.object(&api, "shop", "web").unwrap();
        assert_eq!(obj.pointer("/spec/replicas"), Some(&json!(3)));
    }

    #[test]
    fn test_full_updates_carry_server_metadata() {
        let api = deployments();
        let finalizers = json!(["example.com/protect"]);
        let owners = json!([{"apiVersion": "v1", "kind": "Owner", "name": "o", "uid": "ou"}]);
        for policy in [WritePolicy::PreserveIdentity, WritePolicy::UpdateOrCreate] {
            let store = MemoryStore::new();
            let mut current = live(3);
            current["metadata"]["finalizers"] = finalizers.clone();
            current["metadata"]["ownerReferences"] = owners.clone();
            store.insert(&api, "shop", current).unwrap();
            let outcome = policy
                .apply(&write(&store, &api, RunConfig::default()), &stored())
                .unwrap();
            assert_eq!(outcome, WriteOutcome::Updated, "{:?}", policy);
            let obj = store.object(&api, "shop", "web").unwrap();
            assert_eq!(obj["metadata"]["finalizers"], finalizers, "{:?}", policy);
            assert_eq!(obj["metadata"]["ownerReferences"], owners, "{:?}", policy);
        }
    }

    #[test]
    fn test_patch_leaves_live_replicas() {
        let store = MemoryStore::new();
        let api = deployments();
        store.insert(&api, "shop", live(3)).unwrap();
        let doc = json!({"spec": {"replicas": 5}});
        WritePolicy::PatchOrCreate
            .apply(&write(&store, &api, RunConfig::default()), &doc)
            .unwrap();
        let obj = store.object(&api, "shop", "web").unwrap();
        assert_eq!(obj.pointer("/spec/replicas"), Some(&json!(3)));
    }

    #[test]
    fn test_zero_replicas_ignored_for_non_scalable() {
        let store = MemoryStore::new();
        store.add_namespace("shop");
        let api = ApiKind::new("", "v1", "ConfigMap", "configmaps");
        let mut w = write(
            &store,
            &api,
            RunConfig {
                zero_replicas: true,
                ..Default::default()
            },
        );
        w.scalable = false;
        WritePolicy::PreserveIdentity
            .apply(&w, &json!({"data": {"a": "1"}}))
            .unwrap();
        let obj = store.object(&api, "shop", "web").unwrap();
        assert!(obj.get("spec").is_none());
    }

    #[test]
    fn test_no_update_skips_existing() {
        let api = deployments();
        let run = RunConfig {
            no_update: true,
            ..Default::default()
        };
        for policy in [
            WritePolicy::PreserveIdentity,
            WritePolicy::PatchOrCreate,
            WritePolicy::UpdateOrCreate,
        ] {
            let store = MemoryStore::new();
            store.insert(&api, "shop", live(3)).unwrap();
            let outcome = policy.apply(&write(&store, &api, run), &stored()).unwrap();
            assert_eq!(outcome, WriteOutcome::Skipped, "{:?}", policy);
            assert!(store.calls().is_empty(), "{:?}", policy);
            assert_eq!(store.object(&api, "shop", "web"), Some(live(3)));
        }
    }

    #[test]
    fn test_no_update_still_creates() {
        let api = deployments();
        let run = RunConfig {
            no_update: true,
            ..Default::default()
        };
        for policy in [
            WritePolicy::PreserveIdentity,
            WritePolicy::PatchOrCreate,
            WritePolicy::UpdateOrCreate,
        ] {
            let store = MemoryStore::new();
            store.add_namespace("shop");
            let outcome = policy.apply(&write(&store, &api, run), &stored()).unwrap();
            assert_eq!(outcome, WriteOutcome::Created, "{:?}", policy);
        }
    }

    #[test]
    fn test_patch_or_create_patches_existing() {
        let store = MemoryStore::new();
        let api = deployments();
        store.insert(&api, "shop", live(3)).unwrap();
        let outcome = WritePolicy::PatchOrCreate
            .apply(&write(&store, &api, RunConfig::default()), &stored())
            .unwrap();
        assert_eq!(outcome, WriteOutcome::Patched);
        assert_eq!(
            store.calls(),
            vec![Call::Patch {
                kind: "Deployment".into(),
                namespace: "shop".into(),
                name: "web".into()
            }]
        );
        let obj = store.object(&api, "shop", "web").unwrap();
        assert_eq!(obj.pointer("/spec/replicas"), Some(&json!(3)));
    }

    #[test]
    fn test_patch_or_create_creates_missing() {
        let store = MemoryStore::new();
        store.add_namespace("shop");
        let api = deployments();
        let outcome = WritePolicy::PatchOrCreate
            .apply(&write(&store, &api, RunConfig::default()), &stored())
            .unwrap();
        assert_eq!(outcome, WriteOutcome::Created);
    }

    #[test]
    fn test_update_or_create() {
        let store = MemoryStore::new();
        let api = ApiKind::new("", "v1", "PersistentVolumeClaim", "persistentvolumeclaims");
        store.add_namespace("shop");
        let mut w = write(&store, &api, RunConfig::default());
        w.scalable = false;
        let doc = json!({"spec": {"storageClassName": "fast"}});
        assert_eq!(
            WritePolicy::UpdateOrCreate.apply(&w, &doc).unwrap(),
            WriteOutcome::Created
        );
        assert_eq!(
            WritePolicy::UpdateOrCreate.apply(&w, &doc).unwrap(),
            WriteOutcome::Updated
        );
    }

    #[test]
    fn test_create_drops_stale_version_token() {
        let store = MemoryStore::new();
        store.add_namespace("shop");
        let api = deployments();
        let doc = json!({"metadata": {"resourceVersion": "5"}, "spec": {}});
        let outcome = WritePolicy::UpdateOrCreate
            .apply(&write(&store, &api, RunConfig::default()), &doc)
            .unwrap();
        assert_eq!(outcome, WriteOutcome::Created);
    }

    #[test]
    fn test_non_mapping_document_is_rejected() {
        let store = MemoryStore::new();
        let api = deployments();
        assert!(WritePolicy::PatchOrCreate
            .apply(&write(&store, &api, RunConfig::default()), &json!([1, 2]))
            .is_err());
    }
}
