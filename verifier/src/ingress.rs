use anyhow::{anyhow, Context, Result};
use http::Uri;
use kube::{
    api::Api,
    core::{DynamicObject, GroupVersionKind},
    discovery::ApiResource,
};
use std::{fmt, str::FromStr};

/// Identifies the OpenShift route that exposes the mesh ingress.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteRef {
    pub namespace: String,
    pub name: String,
}

/// Resolves the base URL of the mesh ingress from its OpenShift route.
pub async fn ingress_url(client: &kube::Client, route: &RouteRef) -> Result<Uri> {
    let gvk = GroupVersionKind::gvk("route.openshift.io", "v1", "Route");
    let resource = ApiResource::from_gvk(&gvk);
    let api = Api::<DynamicObject>::namespaced_with(client.clone(), &route.namespace, &resource);
    let obj = api
        .get_opt(&route.name)
        .await
        .with_context(|| format!("failed to get route {route}"))?
        .ok_or_else(|| anyhow!("ingress route {route} not found"))?;
    let host = route_host(&obj).ok_or_else(|| anyhow!("ingress route {route} has no host"))?;
    tracing::debug!(%route, %host, "Resolved ingress");
    format!("http://{host}/")
        .parse()
        .with_context(|| format!("ingress route {route} has an invalid host: {host}"))
}

fn route_host(route: &DynamicObject) -> Option<&str> {
    route.data.get("spec")?.get("host")?.as_str()
}

/// Joins a path onto a base URL, treating the base as a directory.
pub fn endpoint(base: &Uri, path: &str) -> Result<Uri> {
    let base = base.to_string();
    let uri = format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    uri.parse()
        .with_context(|| format!("invalid endpoint: {uri}"))
}

// === impl RouteRef ===

impl Default for RouteRef {
    fn default() -> Self {
        Self {
            namespace: "istio-system".to_string(),
            name: "istio-ingress".to_string(),
        }
    }
}

impl fmt::Display for RouteRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

impl FromStr for RouteRef {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.split_once('/') {
            Some((namespace, name)) if !namespace.is_empty() && !name.is_empty() => Ok(Self {
                namespace: namespace.to_string(),
                name: name.to_string(),
            }),
            _ => Err(anyhow!("expected NAMESPACE/NAME, got {s:?}")),
        }
    }
}
