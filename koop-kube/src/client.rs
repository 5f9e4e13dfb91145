//! An [`ObjectStore`] talking to a Kubernetes API server.
//!
//! `kube` is asynchronous; koop is not. Each store blocks on a small
//! single-threaded runtime shared by all connections of one run.

use std::{future::Future, sync::Arc};

use anyhow::{bail, Context, Result};
use k8s_openapi::api::core::v1::Namespace;
use kube::{
    api::{Api, DynamicObject, ListParams, Patch, PatchParams, PostParams},
    config::{KubeConfigOptions, Kubeconfig},
    core::ApiResource,
    Client, Config,
};
use serde_json::Value;
use tokio::runtime::Runtime;

use koop_core::store::{ApiKind, Connector, NotFound, ObjectStore};

use crate::profile::Profiles;

/// Connects to the clusters listed in a [`Profiles`] directory.
pub struct KubeConnector {
    profiles: Profiles,
    runtime: Arc<Runtime>,
}

impl KubeConnector {
    pub fn new(profiles: Profiles) -> Result<KubeConnector> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("initializing tokio runtime")?;
        Ok(KubeConnector {
            profiles,
            runtime: Arc::new(runtime),
        })
    }
}

impl Connector for KubeConnector {
    fn clusters(&self) -> Result<Vec<String>> {
        self.profiles.clusters()
    }

    fn connect(&self, cluster: &str) -> Result<Box<dyn ObjectStore>> {
        let path = self.profiles.path(cluster)?;
        let kubeconfig = Kubeconfig::read_from(&path)
            .with_context(|| format!("reading cluster profile {}", path.display()))?;
        let client = self
            .runtime
            .block_on(async {
                let config =
                    Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                        .await?;
                anyhow::Ok(Client::try_from(config)?)
            })
            .with_context(|| format!("connecting to cluster '{}'", cluster))?;
        tracing::debug!(cluster, "connected");
        Ok(Box::new(KubeStore {
            client,
            runtime: self.runtime.clone(),
        }))
    }
}

pub struct KubeStore {
    client: Client,
    runtime: Arc<Runtime>,
}

fn api_resource(api: &ApiKind) -> ApiResource {
    ApiResource {
        group: api.group.clone(),
        version: api.version.clone(),
        api_version: api.api_version(),
        kind: api.kind.clone(),
        plural: api.plural.clone(),
    }
}

fn is_404(e: &kube::Error) -> bool {
    matches!(e, kube::Error::Api(response) if response.code == 404)
}

/// Turn a document into a typed request body. The type discriminators are
/// filled in from the endpoint, since canonical documents do not carry them.
fn to_object(api: &ApiKind, object: &Value) -> Result<DynamicObject> {
    let mut object = object.clone();
    match object.as_object_mut() {
        Some(root) => {
            root.insert("apiVersion".into(), Value::String(api.api_version()));
            root.insert("kind".into(), Value::String(api.kind.clone()));
        }
        None => bail!("{} document must be a mapping", api.kind),
    }
    serde_json::from_value(object).with_context(|| format!("invalid {} object", api.kind))
}

impl KubeStore {
    fn block_on<F: Future>(&self, f: F) -> F::Output {
        self.runtime.block_on(f)
    }

    fn namespaced(&self, api: &ApiKind, namespace: &str) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), namespace, &api_resource(api))
    }

    fn namespaces_api(&self) -> Api<Namespace> {
        Api::all(self.client.clone())
    }
}

impl ObjectStore for KubeStore {
    fn namespaces(&self) -> Result<Vec<String>> {
        let list = self
            .block_on(self.namespaces_api().list(&ListParams::default()))
            .context("listing namespaces")?;
        Ok(list
            .items
            .into_iter()
            .filter_map(|ns| ns.metadata.name)
            .collect())
    }

    fn namespace_exists(&self, namespace: &str) -> Result<bool> {
        let ns = self
            .block_on(self.namespaces_api().get_opt(namespace))
            .with_context(|| format!("getting namespace '{}'", namespace))?;
        Ok(ns.is_some())
    }

    fn list(&self, api: &ApiKind, namespace: &str) -> Result<Vec<Value>> {
        let list = self
            .block_on(self.namespaced(api, namespace).list(&ListParams::default()))
            .with_context(|| format!("listing {} in '{}'", api.plural, namespace))?;
        list.items
            .into_iter()
            .map(|o| serde_json::to_value(o).map_err(Into::into))
            .collect()
    }

    fn get(&self, api: &ApiKind, namespace: &str, name: &str) -> Result<Option<Value>> {
        let object = self
            .block_on(self.namespaced(api, namespace).get_opt(name))
            .with_context(|| format!("getting {} '{}' in '{}'", api.kind, name, namespace))?;
        object
            .map(|o| serde_json::to_value(o).map_err(Into::into))
            .transpose()
    }

    fn create(&self, api: &ApiKind, namespace: &str, object: &Value) -> Result<()> {
        let object = to_object(api, object)?;
        self.block_on(
            self.namespaced(api, namespace)
                .create(&PostParams::default(), &object),
        )
        .with_context(|| format!("creating {} in '{}'", api.kind, namespace))?;
        Ok(())
    }

    fn replace(&self, api: &ApiKind, namespace: &str, name: &str, object: &Value) -> Result<()> {
        let object = to_object(api, object)?;
        match self.block_on(self.namespaced(api, namespace).replace(
            name,
            &PostParams::default(),
            &object,
        )) {
            Ok(_) => Ok(()),
            Err(e) if is_404(&e) => Err(NotFound::new(api, namespace, name).into()),
            Err(e) => Err(e).with_context(|| {
                format!("updating {} '{}' in '{}'", api.kind, name, namespace)
            }),
        }
    }

    /// Strategic merge patch, so lists keyed by name (containers, ports)
    /// merge the way `kubectl apply` would.
    fn patch(&self, api: &ApiKind, namespace: &str, name: &str, patch: &Value) -> Result<()> {
        match self.block_on(self.namespaced(api, namespace).patch(
            name,
            &PatchParams::default(),
            &Patch::Strategic(patch),
        )) {
            Ok(_) => Ok(()),
            Err(e) if is_404(&e) => Err(NotFound::new(api, namespace, name).into()),
            Err(e) => Err(e).with_context(|| {
                format!("patching {} '{}' in '{}'", api.kind, name, namespace)
            }),
        }
    }
}
