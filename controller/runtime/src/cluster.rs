use ahash::AHashMap as HashMap;
use anyhow::{Context, Result};
use parking_lot::Mutex;
use std::{future::Future, path::PathBuf, sync::Arc};
use tokio::time::{self, Duration, Instant};
use tooc_controller_core::IngressRecord;
use tooc_controller_k8s_api::{self as k8s, exported_selector, Api, Client, ListParams};
use tracing::{debug, info};

const LIST_TIMEOUT: time::Duration = time::Duration::from_secs(10);

/// Lists the exported ingresses of a cluster.
#[async_trait::async_trait]
pub trait IngressSource: Send + Sync + 'static {
    async fn list_exported(&self) -> Result<Vec<IngressRecord>>;
}

/// Establishes a connection to a cluster.
#[async_trait::async_trait]
pub trait Connect: Send + Sync + 'static {
    type Source: IngressSource;

    async fn connect(&self) -> Result<Self::Source>;
}

/// Connects with an explicit kubeconfig, or the inferred environment
/// (`KUBECONFIG`, `~/.kube/config`, then in-cluster).
#[derive(Clone, Debug)]
pub struct KubeConnect {
    kubeconfig: Option<PathBuf>,
    classes: Arc<ClassAddresses>,
}

pub struct KubeSource {
    client: Client,
    api: Api<k8s::Ingress>,
    classes_api: Api<k8s::IngressClass>,
    params: ListParams,
    classes: Arc<ClassAddresses>,
}

/// Caches the load balancer address of each ingress class's service.
///
/// Failed lookups are not cached.
#[derive(Debug)]
pub struct ClassAddresses {
    ttl: Duration,
    entries: Mutex<HashMap<String, ClassEntry>>,
}

#[derive(Debug)]
struct ClassEntry {
    address: Option<String>,
    age: Instant,
}

// === impl KubeConnect ===

impl KubeConnect {
    /// Ingress class addresses are reused for `class_ttl`, across
    /// reconnects.
    pub fn new(kubeconfig: Option<PathBuf>, class_ttl: Duration) -> Self {
        Self {
            kubeconfig,
            classes: Arc::new(ClassAddresses::new(class_ttl)),
        }
    }
}

#[async_trait::async_trait]
impl Connect for KubeConnect {
    type Source = KubeSource;

    async fn connect(&self) -> Result<KubeSource> {
        let config = match &self.kubeconfig {
            Some(path) => {
                info!(path = %path.display(), "Loading kubeconfig");
                let kubeconfig = kube::config::Kubeconfig::read_from(path)
                    .with_context(|| format!("failed to read kubeconfig {}", path.display()))?;
                kube::Config::from_custom_kubeconfig(
                    kubeconfig,
                    &kube::config::KubeConfigOptions::default(),
                )
                .await
                .context("invalid kubeconfig")?
            }
            None => kube::Config::infer()
                .await
                .context("failed to infer cluster configuration")?,
        };
        let client = Client::try_from(config).context("failed to build cluster client")?;
        debug!("Connected to cluster");
        Ok(KubeSource::new(client, self.classes.clone()))
    }
}

// === impl KubeSource ===

impl KubeSource {
    pub fn new(client: Client, classes: Arc<ClassAddresses>) -> Self {
        Self {
            api: Api::all(client.clone()),
            classes_api: Api::all(client.clone()),
            client,
            params: ListParams::default().labels(&exported_selector()),
            classes,
        }
    }

    /// Follows an ingress class to the service of the Helm release that
    /// installed it.
    async fn lookup_class_address(&self, class: &str) -> Result<Option<String>> {
        let class = time::timeout(LIST_TIMEOUT, self.classes_api.get(class))
            .await
            .context("timed out getting ingress class")?
            .with_context(|| format!("failed to get ingress class {class}"))?;
        let Some((namespace, name)) = k8s::helm_release(&class) else {
            return Ok(None);
        };

        let services = Api::<k8s::Service>::namespaced(self.client.clone(), &namespace);
        let service = time::timeout(LIST_TIMEOUT, services.get(&name))
            .await
            .context("timed out getting ingress class service")?
            .with_context(|| format!("failed to get service {namespace}/{name}"))?;
        Ok(k8s::service_address(&service))
    }
}

#[async_trait::async_trait]
impl IngressSource for KubeSource {
    async fn list_exported(&self) -> Result<Vec<IngressRecord>> {
        let list = time::timeout(LIST_TIMEOUT, self.api.list(&self.params))
            .await
            .context("timed out listing ingresses")?
            .context("failed to list ingresses")?;
        debug!(count = list.items.len(), "Listed exported ingresses");

        let mut records = list.items.iter().map(k8s::to_record).collect::<Vec<_>>();
        for record in records.iter_mut() {
            if record.status_address().is_some() {
                continue;
            }
            if let Some(class) = record.ingress_class.clone() {
                record.class_address = self
                    .classes
                    .get(&class, || self.lookup_class_address(&class))
                    .await;
            }
        }
        Ok(records)
    }
}

// === impl ClassAddresses ===

impl ClassAddresses {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the cached address of `class`, calling `lookup` when it is
    /// missing or older than the TTL.
    pub async fn get<F, Fut>(&self, class: &str, lookup: F) -> Option<String>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<String>>>,
    {
        if let Some(address) = self.fresh(class) {
            return address;
        }

        match lookup().await {
            Ok(address) => {
                debug!(class, address = ?address, "Resolved ingress class address");
                self.entries.lock().insert(
                    class.to_string(),
                    ClassEntry {
                        address: address.clone(),
                        age: Instant::now(),
                    },
                );
                address
            }
            Err(error) => {
                debug!(class, error = %format!("{error:#}"), "Failed to resolve ingress class address");
                None
            }
        }
    }

    fn fresh(&self, class: &str) -> Option<Option<String>> {
        let entries = self.entries.lock();
        let entry = entries.get(class)?;
        (entry.age.elapsed() < self.ttl).then(|| entry.address.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn caches_class_addresses_for_ttl() {
        let classes = ClassAddresses::new(Duration::from_secs(5));
        let lookups = AtomicUsize::new(0);
        let lookup = || async {
            lookups.fetch_add(1, Ordering::SeqCst);
            Ok::<_, anyhow::Error>(Some("172.16.0.9".to_string()))
        };

        assert_eq!(classes.get("traefik", lookup).await.as_deref(), Some("172.16.0.9"));
        assert_eq!(classes.get("traefik", lookup).await.as_deref(), Some("172.16.0.9"));
        assert_eq!(lookups.load(Ordering::SeqCst), 1);

        time::advance(Duration::from_secs(5)).await;
        classes.get("traefik", lookup).await;
        assert_eq!(lookups.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_lookups_are_retried() {
        let classes = ClassAddresses::new(Duration::from_secs(5));
        let lookups = AtomicUsize::new(0);

        let failing = || async {
            lookups.fetch_add(1, Ordering::SeqCst);
            Err::<Option<String>, _>(anyhow::anyhow!("forbidden"))
        };
        assert_eq!(classes.get("traefik", failing).await, None);
        assert_eq!(classes.get("traefik", failing).await, None);
        assert_eq!(lookups.load(Ordering::SeqCst), 2);

        // Classes without a resolvable release are remembered as such.
        let missing = || async {
            lookups.fetch_add(1, Ordering::SeqCst);
            Ok::<Option<String>, anyhow::Error>(None)
        };
        assert_eq!(classes.get("nginx", missing).await, None);
        assert_eq!(classes.get("nginx", missing).await, None);
        assert_eq!(lookups.load(Ordering::SeqCst), 3);
    }
}
