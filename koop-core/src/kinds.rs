//! The built-in resource kinds.

use serde_json::Value;

use crate::descriptor::{KindDescriptor, Registry};
use crate::policy::WritePolicy::{PatchOrCreate, PreserveIdentity, UpdateOrCreate};
use crate::store::ApiKind;

/// Secrets carrying this annotation are copies made by a replication
/// controller and are owned by it.
pub const REPLICATED_SECRET_ANNOTATION: &str = "autoops.auto-replicate-secret/replicated";

pub const SERVICE_ACCOUNT_TOKEN_TYPE: &str = "kubernetes.io/service-account-token";

/// Config maps published into every namespace by the control plane.
const IGNORED_CONFIG_MAP_PREFIXES: &[&str] = &["kube-root-ca"];

fn name(object: &Value) -> &str {
    object
        .pointer("/metadata/name")
        .and_then(Value::as_str)
        .unwrap_or_default()
}

fn is_system_config_map(object: &Value) -> bool {
    let name = name(object);
    IGNORED_CONFIG_MAP_PREFIXES
        .iter()
        .any(|prefix| name.starts_with(prefix))
}

/// Same truth values as Go's `strconv.ParseBool`, which is what the
/// replication controller writes.
fn parse_bool(s: &str) -> bool {
    matches!(s, "1" | "t" | "T" | "true" | "TRUE" | "True")
}

fn is_unmanaged_secret(object: &Value) -> bool {
    if object.get("type").and_then(Value::as_str) == Some(SERVICE_ACCOUNT_TOKEN_TYPE) {
        return true;
    }
    object
        .pointer("/metadata/annotations")
        .and_then(|a| a.get(REPLICATED_SECRET_ANNOTATION))
        .and_then(Value::as_str)
        .map(parse_bool)
        .unwrap_or(false)
}

/// All built-in kinds, in the order a wildcard kind selector visits them.
pub fn builtin() -> Vec<KindDescriptor> {
    vec![
        KindDescriptor::new(
            "deployment",
            ApiKind::new("apps", "v1", "Deployment", "deployments"),
            PreserveIdentity,
        )
        .scalable(),
        KindDescriptor::new(
            "statefulset",
            ApiKind::new("apps", "v1", "StatefulSet", "statefulsets"),
            PatchOrCreate,
        )
        .scalable(),
        KindDescriptor::new(
            "daemonset",
            ApiKind::new("apps", "v1", "DaemonSet", "daemonsets"),
            PatchOrCreate,
        ),
        KindDescriptor::new(
            "cronjob",
            ApiKind::new("batch", "v1", "CronJob", "cronjobs"),
            PreserveIdentity,
        ),
        KindDescriptor::new(
            "service",
            ApiKind::new("", "v1", "Service", "services"),
            PatchOrCreate,
        ),
        KindDescriptor::new(
            "configmap",
            ApiKind::new("", "v1", "ConfigMap", "configmaps"),
            PreserveIdentity,
        )
        .excluding(is_system_config_map),
        KindDescriptor::new(
            "secret",
            ApiKind::new("", "v1", "Secret", "secrets"),
            PatchOrCreate,
        )
        .excluding(is_unmanaged_secret),
        KindDescriptor::new(
            "ingress",
            ApiKind::new("networking.k8s.io", "v1", "Ingress", "ingresses"),
            PreserveIdentity,
        ),
        KindDescriptor::new(
            "hpa",
            ApiKind::new("autoscaling", "v2", "HorizontalPodAutoscaler", "horizontalpodautoscalers"),
            PatchOrCreate,
        ),
        KindDescriptor::new(
            "pvc",
            ApiKind::new("", "v1", "PersistentVolumeClaim", "persistentvolumeclaims"),
            UpdateOrCreate,
        ),
    ]
}

impl Registry {
    /// A registry holding the [`builtin`] kinds.
    pub fn builtin() -> Registry {
        let mut registry = Registry::new();
        for kind in builtin() {
            registry.register(kind);
        }
        registry
    }
}
