//! Expansion of a [`Selector`] into concrete (cluster, namespace, kind, name)
//! tuples.
//!
//! Levels are resolved outside in. A level is only enumerated once the level
//! around it has been fixed, so a namespace wildcard is listed per cluster and
//! a name wildcard per namespace and kind. The first error stops the walk.

use std::{
    io,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use koop_core::{Connector, ObjectStore, Registry, ResourceDescriptor};

use crate::selector::{Sel, Selector};

/// Extension of the files in a kind directory.
pub const EXTENSION: &str = "yaml";

/// Namespaces owned by the platform. Matched as prefixes of the lowercased
/// name, and only when expanding a namespace wildcard.
const IGNORED_NAMESPACE_PREFIXES: &[&str] = &[
    "cattle-prometheus",
    "cattle-system",
    "kube-system",
    "kube-public",
    "kube-node-lease",
    "nginx-ingress",
    "ingress-nginx",
    "nfs-client-provisioner",
    "security-scan",
    "nfs-provisioner",
];

pub fn is_ignored_namespace(namespace: &str) -> bool {
    let namespace = namespace.to_lowercase();
    IGNORED_NAMESPACE_PREFIXES
        .iter()
        .any(|prefix| namespace.starts_with(prefix))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Names come from the object store.
    Pull,
    /// Names come from the local file tree.
    Push,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Names {
    /// The name was a wildcard; these are the names it expanded to.
    Wildcard(Vec<String>),
    Named(String),
}

impl Names {
    pub fn as_slice(&self) -> &[String] {
        match self {
            Names::Wildcard(names) => names,
            Names::Named(name) => std::slice::from_ref(name),
        }
    }
}

/// One resolved (cluster, namespace, kind) with the names to process in it.
pub struct Scope<'a> {
    pub cluster: &'a str,
    pub namespace: &'a str,
    pub store: &'a dyn ObjectStore,
    pub descriptor: &'a dyn ResourceDescriptor,
    /// `<root>/<cluster>/<namespace>/<kind>`
    pub dir: PathBuf,
    pub names: Names,
}

impl Scope<'_> {
    pub fn kind(&self) -> &str {
        self.descriptor.kind()
    }

    pub fn file(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", name, EXTENSION))
    }
}

pub struct Traversal<'a> {
    pub root: &'a Path,
    pub registry: &'a Registry,
    pub connector: &'a dyn Connector,
}

impl Traversal<'_> {
    /// Call `visit` once per resolved (cluster, namespace, kind).
    pub fn walk(
        &self,
        selector: &Selector,
        direction: Direction,
        visit: &mut dyn FnMut(Scope<'_>) -> Result<()>,
    ) -> Result<()> {
        selector.validate(self.registry)?;
        for cluster in self.clusters(&selector.cluster)? {
            let store = self.connector.connect(&cluster)?;
            for namespace in self.namespaces(&cluster, store.as_ref(), &selector.namespace)? {
                for descriptor in self.kinds(&selector.kind)? {
                    let dir = self
                        .root
                        .join(&cluster)
                        .join(&namespace)
                        .join(descriptor.kind());
                    let names = match &selector.name {
                        Sel::Named(name) => Names::Named(name.clone()),
                        Sel::All => Names::Wildcard(match direction {
                            Direction::Pull => descriptor
                                .list(store.as_ref(), &namespace)
                                .with_context(|| {
                                    format!(
                                        "listing {} in {}/{}",
                                        descriptor.kind(),
                                        cluster,
                                        namespace
                                    )
                                })?,
                            Direction::Push => local_names(&dir)?,
                        }),
                    };
                    visit(Scope {
                        cluster: &cluster,
                        namespace: &namespace,
                        store: store.as_ref(),
                        descriptor,
                        dir,
                        names,
                    })?;
                }
            }
        }
        Ok(())
    }

    fn clusters(&self, sel: &Sel) -> Result<Vec<String>> {
        match sel {
            Sel::All => self.connector.clusters(),
            Sel::Named(cluster) => Ok(vec![cluster.clone()]),
        }
    }

    fn namespaces(
        &self,
        cluster: &str,
        store: &dyn ObjectStore,
        sel: &Sel,
    ) -> Result<Vec<String>> {
        match sel {
            Sel::All => {
                let namespaces = store
                    .namespaces()
                    .with_context(|| format!("listing namespaces of cluster '{}'", cluster))?;
                Ok(namespaces
                    .into_iter()
                    .filter(|ns| !is_ignored_namespace(ns))
                    .collect())
            }
            Sel::Named(namespace) => {
                if !store.namespace_exists(namespace)? {
                    bail!(
                        "namespace '{}' does not exist in cluster '{}'",
                        namespace,
                        cluster
                    );
                }
                Ok(vec![namespace.clone()])
            }
        }
    }

    fn kinds(&self, sel: &Sel) -> Result<Vec<&dyn ResourceDescriptor>> {
        match sel {
            Sel::All => self
                .registry
                .known_kinds()
                .iter()
                .map(|kind| Ok(self.registry.find(kind)?))
                .collect(),
            Sel::Named(kind) => Ok(vec![self.registry.find(kind)?]),
        }
    }
}

/// Object names stored in a kind directory. A missing directory has none.
/// Anything that is not a `.yaml` file is reported and skipped.
pub fn local_names(dir: &Path) -> Result<Vec<String>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e).with_context(|| format!("reading {}", dir.display())),
    };
    let suffix = format!(".{}", EXTENSION);
    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("reading {}", dir.display()))?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            tracing::warn!("found unexpected directory {}", path.display());
            continue;
        }
        let file_name = entry.file_name().to_string_lossy().to_string();
        match file_name.strip_suffix(&suffix) {
            Some(name) if !name.is_empty() => names.push(name.to_string()),
            _ if file_name.ends_with(".yml") => {
                tracing::warn!(
                    "skipping {}: object files must use the extension '.{}', not '.yml'",
                    path.display(),
                    EXTENSION
                );
            }
            _ => tracing::warn!("skipping unexpected file {}", path.display()),
        }
    }
    names.sort();
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use koop_core::kinds::REPLICATED_SECRET_ANNOTATION;
    use koop_core::store::memory::{MemoryConnector, MemoryStore};
    use koop_core::ApiKind;
    use serde_json::json;

    fn secrets() -> ApiKind {
        ApiKind::new("", "v1", "Secret", "secrets")
    }

    fn config_maps() -> ApiKind {
        ApiKind::new("", "v1", "ConfigMap", "configmaps")
    }

    /// Collect (cluster, namespace, kind, names) for every visited scope.
    fn walk(
        connector: &MemoryConnector,
        root: &Path,
        selector: Selector,
        direction: Direction,
    ) -> Result<Vec<(String, String, String, Names)>> {
        let registry = Registry::builtin();
        let traversal = Traversal {
            root,
            registry: &registry,
            connector,
        };
        let mut seen = Vec::new();
        traversal.walk(&selector, direction, &mut |scope| {
            seen.push((
                scope.cluster.to_string(),
                scope.namespace.to_string(),
                scope.kind().to_string(),
                scope.names.clone(),
            ));
            Ok(())
        })?;
        Ok(seen)
    }

    #[test]
    fn test_ignored_namespaces() {
        assert!(is_ignored_namespace("kube-system"));
        assert!(is_ignored_namespace("kube-system-extra"));
        assert!(is_ignored_namespace("Kube-System"));
        assert!(is_ignored_namespace("cattle-system"));
        assert!(!is_ignored_namespace("myapp-kube-system"));
        assert!(!is_ignored_namespace("default"));
    }

    #[test]
    fn test_namespace_wildcard_excludes_platform_namespaces() {
        let store = MemoryStore::new();
        store
            .add_namespace("kube-system-extra")
            .add_namespace("myapp-kube-system")
            .add_namespace("app");
        let connector = MemoryConnector::new().with_cluster("prod", store);
        let root = tempfile::tempdir().unwrap();
        let seen = walk(
            &connector,
            root.path(),
            Selector::parse("prod", "-", "secret", "x"),
            Direction::Pull,
        )
        .unwrap();
        let namespaces: Vec<&str> = seen.iter().map(|s| s.1.as_str()).collect();
        assert_eq!(namespaces, vec!["app", "myapp-kube-system"]);
    }

    #[test]
    fn test_explicit_ignored_namespace_is_allowed() {
        let store = MemoryStore::new();
        store.add_namespace("kube-system");
        let connector = MemoryConnector::new().with_cluster("prod", store);
        let root = tempfile::tempdir().unwrap();
        let seen = walk(
            &connector,
            root.path(),
            Selector::parse("prod", "kube-system", "configmap", "x"),
            Direction::Pull,
        )
        .unwrap();
        assert_eq!(seen.len(), 1);
    }

    #[test]
    fn test_missing_namespace_aborts() {
        let connector = MemoryConnector::new().with_cluster("prod", MemoryStore::new());
        let root = tempfile::tempdir().unwrap();
        let err = walk(
            &connector,
            root.path(),
            Selector::parse("prod", "nope", "configmap", "-"),
            Direction::Pull,
        )
        .unwrap_err();
        assert!(err.to_string().contains("namespace 'nope' does not exist"));
    }

    #[test]
    fn test_unknown_kind_fails_before_connecting() {
        // The connector knows no clusters, so any connection attempt would
        // fail with a different error.
        let connector = MemoryConnector::new();
        let root = tempfile::tempdir().unwrap();
        let err = walk(
            &connector,
            root.path(),
            Selector::parse("prod", "app", "widget", "-"),
            Direction::Push,
        )
        .unwrap_err();
        assert!(err
            .to_string()
            .starts_with("unknown resource kind 'widget', known kinds are deployment"));
    }

    #[test]
    fn test_kind_wildcard_in_registration_order() {
        let store = MemoryStore::new();
        store.add_namespace("app");
        let connector = MemoryConnector::new().with_cluster("prod", store);
        let root = tempfile::tempdir().unwrap();
        let seen = walk(
            &connector,
            root.path(),
            Selector::parse("-", "app", "-", "x"),
            Direction::Pull,
        )
        .unwrap();
        let kinds: Vec<String> = seen.into_iter().map(|s| s.2).collect();
        assert_eq!(kinds, Registry::builtin().known_kinds());
    }

    #[test]
    fn test_cluster_wildcard() {
        let a = MemoryStore::new();
        a.add_namespace("app");
        let b = MemoryStore::new();
        b.add_namespace("app");
        let connector = MemoryConnector::new()
            .with_cluster("b", b)
            .with_cluster("a", a);
        let root = tempfile::tempdir().unwrap();
        let seen = walk(
            &connector,
            root.path(),
            Selector::parse("-", "app", "configmap", "x"),
            Direction::Pull,
        )
        .unwrap();
        let clusters: Vec<&str> = seen.iter().map(|s| s.0.as_str()).collect();
        assert_eq!(clusters, vec!["a", "b"]);
    }

    #[test]
    fn test_pull_name_wildcard_excludes_unmanaged_secrets() {
        let store = MemoryStore::new();
        store
            .insert(
                &secrets(),
                "app",
                json!({"metadata": {"name": "db"}, "type": "Opaque"}),
            ).unwrap()
            .insert(
                &secrets(),
                "app",
                json!({
                    "metadata": {"name": "default-token-abc"},
                    "type": "kubernetes.io/service-account-token"
                }),
            ).unwrap()
            .insert(
                &secrets(),
                "app",
                json!({
                    "metadata": {
                        "name": "registry",
                        "annotations": {(REPLICATED_SECRET_ANNOTATION): "true"}
                    },
                    "type": "kubernetes.io/dockerconfigjson"
                }),
            ).unwrap();
        let connector = MemoryConnector::new().with_cluster("prod", store);
        let root = tempfile::tempdir().unwrap();
        let seen = walk(
            &connector,
            root.path(),
            Selector::parse("prod", "app", "secret", "-"),
            Direction::Pull,
        )
        .unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].3, Names::Wildcard(vec!["db".to_string()]));
    }

    #[test]
    fn test_push_name_wildcard_reads_kind_directory() {
        let store = MemoryStore::new();
        store.insert(&config_maps(), "app", json!({"metadata": {"name": "live-only"}})).unwrap();
        let connector = MemoryConnector::new().with_cluster("prod", store);
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("prod/app/configmap");
        std::fs::create_dir_all(dir.join("nested")).unwrap();
        std::fs::write(dir.join("b.yaml"), "data: {}\n").unwrap();
        std::fs::write(dir.join("a.yaml"), "data: {}\n").unwrap();
        std::fs::write(dir.join("c.yml"), "data: {}\n").unwrap();
        std::fs::write(dir.join("notes.txt"), "").unwrap();
        let seen = walk(
            &connector,
            root.path(),
            Selector::parse("prod", "app", "configmap", "-"),
            Direction::Push,
        )
        .unwrap();
        assert_eq!(
            seen[0].3,
            Names::Wildcard(vec!["a".to_string(), "b".to_string()])
        );
    }

    #[test]
    fn test_local_names_missing_directory_is_empty() {
        let root = tempfile::tempdir().unwrap();
        assert!(local_names(&root.path().join("nope")).unwrap().is_empty());
    }

    #[test]
    fn test_scope_file() {
        let store = MemoryStore::new();
        store.add_namespace("app");
        let registry = Registry::builtin();
        let scope = Scope {
            cluster: "prod",
            namespace: "app",
            store: &store,
            descriptor: registry.find("service").unwrap(),
            dir: PathBuf::from("root/prod/app/service"),
            names: Names::Named("web".to_string()),
        };
        assert_eq!(scope.file("web"), PathBuf::from("root/prod/app/service/web.yaml"));
        assert_eq!(scope.names.as_slice(), &["web".to_string()]);
    }
}
