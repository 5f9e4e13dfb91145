//! Structural patches over object documents.
//!
//! Canonicalization is expressed as a set of JSON patches that strip what the
//! server generates, so that an object read from a cluster, written to a file
//! and read back compares equal regardless of when it was fetched.
//!
//! ## Groups
//!
//! A [`PatchSet`] is an ordered list of RFC 6902 patch documents ("groups").
//! Within a group the operations apply atomically: either all of them or
//! none. Across groups there are two policies:
//!
//! - [`PatchSet::apply_tolerant`]: a group that fails (usually because the
//!   path it removes is absent from this particular kind of object) is
//!   skipped and later groups still apply. This is what allows a single
//!   canonicalization set to cover every kind.
//! - [`PatchSet::apply_strict`]: the first failing group is an error. Used
//!   where the caller knows the target exists, such as stripping a version
//!   token it injected itself.
//!
//! Neither policy mutates its input.

use anyhow::{Context, Result};
use json_patch::{Patch, PatchOperation};
use serde_json::{json, Value};

#[derive(Debug, Clone, Default)]
pub struct PatchSet {
    pub groups: Vec<Patch>,
}

impl PatchSet {
    pub fn new(groups: Vec<Patch>) -> PatchSet {
        PatchSet { groups }
    }

    /// One `remove` group per path.
    pub fn removals<S: AsRef<str>>(paths: &[S]) -> Result<PatchSet> {
        let groups = paths
            .iter()
            .map(|p| Ok(Patch(vec![remove(p.as_ref())?])))
            .collect::<Result<Vec<_>>>()?;
        Ok(PatchSet { groups })
    }

    /// Apply every group that applies cleanly; skip the others.
    pub fn apply_tolerant(&self, doc: &Value) -> Value {
        let mut out = doc.clone();
        for (index, group) in self.groups.iter().enumerate() {
            if let Err(e) = apply_group(&mut out, group) {
                tracing::debug!(group = index, "patch group skipped: {}", e);
            }
        }
        out
    }

    /// Apply every group; the first failing group is an error.
    pub fn apply_strict(&self, doc: &Value) -> Result<Value> {
        let mut out = doc.clone();
        for (index, group) in self.groups.iter().enumerate() {
            apply_group(&mut out, group)
                .with_context(|| format!("applying patch group {}", index))?;
        }
        Ok(out)
    }
}

/// Apply a group to a scratch copy and only commit it on success, so a
/// failure halfway through a group leaves `doc` as it was.
fn apply_group(doc: &mut Value, group: &Patch) -> Result<()> {
    let mut scratch = doc.clone();
    json_patch::patch(&mut scratch, group.0.as_slice())?;
    *doc = scratch;
    Ok(())
}

/// Build a single operation from its JSON form.
pub fn operation(op: Value) -> Result<PatchOperation> {
    serde_json::from_value(op.clone()).with_context(|| format!("invalid patch operation: {}", op))
}

pub fn remove(path: &str) -> Result<PatchOperation> {
    operation(json!({"op": "remove", "path": path}))
}

/// Escape a key for use as one JSON pointer segment.
pub fn escape_segment(key: &str) -> String {
    key.replace('~', "~0").replace('/', "~1")
}

const METADATA_REMOVALS: &[&str] = &[
    "/metadata/name",
    "/metadata/namespace",
    "/metadata/creationTimestamp",
    "/metadata/generation",
    "/metadata/resourceVersion",
    "/metadata/selfLink",
    "/metadata/uid",
    "/metadata/managedFields",
    "/metadata/finalizers",
    "/metadata/ownerReferences",
];

/// Annotations injected by controllers and tooling rather than by the user.
const NOISY_ANNOTATIONS: &[&str] = &[
    "kubectl.kubernetes.io/last-applied-configuration",
    "deployment.kubernetes.io/revision",
    "field.cattle.io/creatorId",
    "field.cattle.io/ingressState",
    "field.cattle.io/publicEndpoints",
    "field.cattle.io/targetWorkloadIds",
    "workload.cattle.io/targetWorkloadIdNoop",
    "workload.cattle.io/workloadPortBased",
    "analysis.crane.io/replicas-recommendation",
    "analysis.crane.io/resource-recommendation",
    "net.guoyk.autodown/lease",
];

const NOISY_LABELS: &[&str] = &["cattle.io/creator", "workload.user.cattle.io/workloadselector"];

const NOISY_TEMPLATE_ANNOTATIONS: &[&str] = &[
    "cattle.io/timestamp",
    "field.cattle.io/ports",
    "net.guoyk.deployer/timestamp",
    "workload.cattle.io/state",
];

const SPEC_REMOVALS: &[&str] = &[
    // Scaling is left to whoever operates the live object.
    "/spec/replicas",
    "/spec/clusterIP",
    "/spec/clusterIPs",
    "/spec/template/metadata/creationTimestamp",
];

/// Containers that are dropped when canonicalization leaves them empty,
/// innermost first.
const PRUNED_WHEN_EMPTY: &[&str] = &[
    "/metadata/annotations",
    "/metadata/labels",
    "/metadata",
    "/spec/template/metadata/annotations",
    "/spec/template/metadata",
];

/// Fields the server owns: status, type discriminators and identity
/// metadata.
pub fn server_owned_paths() -> Vec<String> {
    let mut paths = vec![
        "/status".to_string(),
        "/kind".to_string(),
        "/apiVersion".to_string(),
    ];
    paths.extend(METADATA_REMOVALS.iter().map(|p| p.to_string()));
    paths
}

/// Every path removed by canonicalization, in application order.
pub fn canonical_paths() -> Vec<String> {
    let mut paths = server_owned_paths();
    paths.extend(
        NOISY_ANNOTATIONS
            .iter()
            .map(|a| format!("/metadata/annotations/{}", escape_segment(a))),
    );
    paths.extend(
        NOISY_LABELS
            .iter()
            .map(|l| format!("/metadata/labels/{}", escape_segment(l))),
    );
    paths.extend(SPEC_REMOVALS.iter().map(|p| p.to_string()));
    paths.extend(
        NOISY_TEMPLATE_ANNOTATIONS
            .iter()
            .map(|a| format!("/spec/template/metadata/annotations/{}", escape_segment(a))),
    );
    paths
}

/// One removal group per path, followed by `test`-guarded removals of
/// containers left empty.
fn pruned_removals(paths: &[String]) -> PatchSet {
    let mut set = PatchSet::removals(paths).expect("removal paths are valid pointers");
    for path in PRUNED_WHEN_EMPTY {
        let test = operation(json!({"op": "test", "path": path, "value": {}}))
            .expect("pruned paths are valid pointers");
        let remove = remove(path).expect("pruned paths are valid pointers");
        set.groups.push(Patch(vec![test, remove]));
    }
    set
}

/// The canonicalization set.
pub fn canonical() -> PatchSet {
    pruned_removals(&canonical_paths())
}

/// Strip server-generated and ephemeral fields from a fetched object.
pub fn canonicalize(doc: &Value) -> Value {
    canonical().apply_tolerant(doc)
}

/// Strip only what the server owns from a stored document about to be
/// written back. Unlike [`canonicalize`] this keeps desired state such as
/// `spec.replicas`, which the write policy reconciles with the live object.
pub fn strip_server_owned(doc: &Value) -> Value {
    pruned_removals(&server_owned_paths()).apply_tolerant(doc)
}

/// Remove the version token. The token must be present.
pub fn strip_version_token(doc: &Value) -> Result<Value> {
    PatchSet::removals(&["/metadata/resourceVersion"])?
        .apply_strict(doc)
        .context("stripping resource version")
}
