//! Routing rules that are applied for the duration of one verification.

use anyhow::{anyhow, ensure, Context, Result};
use async_trait::async_trait;
use kube::{
    api::{Api, DeleteParams, Patch, PatchParams},
    core::{DynamicObject, GroupVersionKind},
    discovery::{self, Scope},
};
use serde::Deserialize;
use std::{future::Future, path::Path};
use tracing::{debug, info, info_span, warn, Instrument};

const FIELD_MANAGER: &str = "mesh-split";

/// A named group of manifests that are deployed and removed together.
#[derive(Clone, Debug)]
pub struct RuleSet {
    name: String,
    manifests: Vec<DynamicObject>,
}

/// Deploys and removes rule sets.
#[async_trait]
pub trait RuleDeployer {
    type Handle: Send + 'static;

    async fn deploy(&self, rules: &RuleSet) -> Result<Self::Handle>;

    async fn undeploy(&self, handle: Self::Handle) -> Result<()>;
}

/// Applies rules to a Kubernetes cluster with server-side apply.
#[derive(Clone)]
pub struct KubeRules {
    client: kube::Client,
    namespace: String,
}

/// The objects a [`KubeRules`] deployment created.
pub struct Applied {
    rules: String,
    objects: Vec<(Api<DynamicObject>, String)>,
}

/// Deploys `rules` in order, runs `test`, and then removes every deployed
/// rule set in reverse order, whether or not the test completed.
///
/// If a rule set fails to deploy, the sets deployed before it are removed and
/// the test is not run. A panic in the test is resumed once the rules have
/// been removed.
pub async fn with_rules<D, F, Fut>(deployer: &D, rules: &[RuleSet], test: F) -> Result<Fut::Output>
where
    D: RuleDeployer + Sync,
    F: FnOnce() -> Fut,
    Fut: Future + Send + 'static,
    Fut::Output: Send + 'static,
{
    let mut deployed = Vec::with_capacity(rules.len());
    for set in rules {
        match deployer.deploy(set).await {
            Ok(handle) => {
                info!(rules = %set.name, "Deployed");
                deployed.push((set.name.clone(), handle));
            }
            Err(error) => {
                undeploy_all(deployer, deployed).await;
                return Err(error.context(format!("failed to deploy {}", set.name)));
            }
        }
    }

    let res = tokio::spawn(test().instrument(info_span!("verify"))).await;
    undeploy_all(deployer, deployed).await;
    match res {
        Ok(output) => Ok(output),
        Err(error) if error.is_panic() => std::panic::resume_unwind(error.into_panic()),
        Err(error) => Err(error).context("verification was cancelled"),
    }
}

async fn undeploy_all<D>(deployer: &D, deployed: Vec<(String, D::Handle)>)
where
    D: RuleDeployer + Sync,
{
    for (name, handle) in deployed.into_iter().rev() {
        match deployer.undeploy(handle).await {
            Ok(()) => info!(rules = %name, "Undeployed"),
            Err(error) => warn!(rules = %name, %error, "Failed to undeploy"),
        }
    }
}

// === impl RuleSet ===

impl RuleSet {
    /// Parses a multi-document YAML stream. Empty documents are skipped.
    pub fn from_yaml(name: impl Into<String>, yaml: &str) -> Result<Self> {
        let name = name.into();
        let mut manifests = Vec::new();
        for (i, doc) in serde_yaml::Deserializer::from_str(yaml).enumerate() {
            let value = serde_yaml::Value::deserialize(doc)
                .with_context(|| format!("{name}: document {i} is not valid YAML"))?;
            if value.is_null() {
                continue;
            }
            let obj = serde_yaml::from_value::<DynamicObject>(value)
                .with_context(|| format!("{name}: document {i} is not a Kubernetes object"))?;
            ensure!(
                obj.types.is_some(),
                "{name}: document {i} has no apiVersion or kind"
            );
            ensure!(
                obj.metadata.name.is_some(),
                "{name}: document {i} has no metadata.name"
            );
            manifests.push(obj);
        }
        ensure!(!manifests.is_empty(), "{name}: no manifests");
        Ok(Self { name, manifests })
    }

    /// Reads a rule file, naming the set after the file.
    pub fn load(path: &Path) -> Result<Self> {
        let yaml = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self::from_yaml(name, &yaml)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn manifests(&self) -> &[DynamicObject] {
        &self.manifests
    }
}

// === impl KubeRules ===

impl KubeRules {
    /// Namespaced manifests without a namespace are applied to `namespace`.
    pub fn new(client: kube::Client, namespace: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
        }
    }

    async fn api_for(&self, obj: &DynamicObject) -> Result<Api<DynamicObject>> {
        let types = obj
            .types
            .as_ref()
            .ok_or_else(|| anyhow!("manifest has no apiVersion or kind"))?;
        let gvk = GroupVersionKind::try_from(types)?;
        let (resource, caps) = discovery::pinned_kind(&self.client, &gvk)
            .await
            .with_context(|| format!("failed to discover {}", types.kind))?;
        let api = match caps.scope {
            Scope::Namespaced => {
                let ns = obj.metadata.namespace.as_deref().unwrap_or(&self.namespace);
                Api::namespaced_with(self.client.clone(), ns, &resource)
            }
            Scope::Cluster => Api::all_with(self.client.clone(), &resource),
        };
        Ok(api)
    }

    async fn apply(&self, obj: &DynamicObject, applied: &mut Applied) -> Result<()> {
        let name = obj
            .metadata
            .name
            .clone()
            .ok_or_else(|| anyhow!("manifest has no name"))?;
        let api = self.api_for(obj).await?;
        let params = PatchParams::apply(FIELD_MANAGER).force();
        api.patch(&name, &params, &Patch::Apply(obj))
            .await
            .with_context(|| format!("failed to apply {name}"))?;
        debug!(rules = %applied.rules, %name, "Applied");
        applied.objects.push((api, name));
        Ok(())
    }
}

#[async_trait]
impl RuleDeployer for KubeRules {
    type Handle = Applied;

    async fn deploy(&self, rules: &RuleSet) -> Result<Applied> {
        let mut applied = Applied {
            rules: rules.name.clone(),
            objects: Vec::with_capacity(rules.manifests.len()),
        };
        for obj in &rules.manifests {
            if let Err(error) = self.apply(obj, &mut applied).await {
                if let Err(cleanup) = self.undeploy(applied).await {
                    warn!(rules = %rules.name, error = %cleanup, "Failed to remove partially applied rules");
                }
                return Err(error);
            }
        }
        Ok(applied)
    }

    async fn undeploy(&self, applied: Applied) -> Result<()> {
        let Applied { rules, objects } = applied;
        let mut failed = 0;
        for (api, name) in objects.into_iter().rev() {
            match api.delete(&name, &DeleteParams::background()).await {
                Ok(_) => debug!(%rules, %name, "Deleted"),
                Err(kube::Error::Api(rsp)) if rsp.code == 404 => {
                    debug!(%rules, %name, "Already deleted")
                }
                Err(error) => {
                    warn!(%rules, %name, %error, "Failed to delete");
                    failed += 1;
                }
            }
        }
        ensure!(failed == 0, "{rules}: failed to delete {failed} objects");
        Ok(())
    }
}
