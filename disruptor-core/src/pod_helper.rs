//! A thin, namespace-scoped facade over the cluster API (C2)

use std::time::Duration;

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use k8s_openapi::api::core::v1::{Pod, Service};
use kube::api::{
    Api, AttachParams, DeleteParams, ListParams, Patch, PatchParams, WatchEvent, WatchParams,
};
use serde_json::json;
use tracing::{event, instrument, Level};

use crate::models::{PodSelector, ServiceDescriptor, TargetPod};
use crate::Error;

/// The spec for the ephemeral container the orchestrator attaches to a pod
#[derive(Debug, Clone)]
pub struct EphemeralContainerSpec {
    pub name: String,
    pub image: String,
    pub command: Vec<String>,
}

/// Options governing how `attach_ephemeral` behaves
#[derive(Debug, Clone, Copy, Default)]
pub struct AttachOptions {
    /// How long to wait for the container to reach `Running`; `0` returns immediately
    pub timeout: Duration,
    /// Succeed silently if a container with the same name already exists
    pub ignore_if_exists: bool,
}

/// Contract the visitor and resolver layers depend on, so tests can swap in a fake cluster
#[async_trait]
pub trait PodHelper: Send + Sync {
    /// List pods matching an inclusion/exclusion label filter
    async fn list(&self, selector: &PodSelector) -> Result<Vec<TargetPod>, Error>;

    /// Fetch a service by name
    async fn get_service(&self, name: &str) -> Result<ServiceDescriptor, Error>;

    /// Watch a pod until it reaches `Running`, fails, or the timeout elapses
    async fn wait_running(&self, name: &str, timeout: Duration) -> Result<bool, Error>;

    /// Run a one-shot, streamed command inside a container; no TTY
    async fn exec(
        &self,
        pod: &str,
        container: &str,
        argv: &[String],
    ) -> Result<(String, String), Error>;

    /// Patch an ephemeral container onto a pod, optionally waiting for it to run
    async fn attach_ephemeral(
        &self,
        pod: &str,
        spec: &EphemeralContainerSpec,
        opts: AttachOptions,
    ) -> Result<(), Error>;

    /// Delete a pod with the given grace period
    async fn terminate(&self, pod: &str, timeout: Duration) -> Result<(), Error>;
}

/// The `kube`-backed implementation of [`PodHelper`]
pub struct KubePodHelper {
    namespace: String,
    pods: Api<Pod>,
    services: Api<Service>,
}

/// The oldest server minor version that serves ephemeral containers as a first-class
/// subresource (§6); anything older is refused before any other cluster call is made.
const MIN_SERVER_MINOR: u32 = 23;

/// Check a server's reported major/minor version string against the minimum supported
/// release, tolerating the trailing `+` some distributions (e.g. GKE) append
///
/// # Arguments
///
/// * `major` - The server's reported major version (e.g. `"1"`)
/// * `minor` - The server's reported minor version (e.g. `"23+"`)
fn check_server_version(major: &str, minor: &str) -> Result<(), Error> {
    let major: u32 = major.trim_end_matches('+').parse().unwrap_or(0);
    let minor: u32 = minor.trim_end_matches('+').parse().unwrap_or(0);
    if major < 1 || (major == 1 && minor < MIN_SERVER_MINOR) {
        return Err(Error::UnsupportedCluster(format!(
            "server version {major}.{minor} is older than the minimum supported 1.{MIN_SERVER_MINOR}"
        )));
    }
    Ok(())
}

impl KubePodHelper {
    /// Build a namespace-scoped pod helper
    ///
    /// # Arguments
    ///
    /// * `client` - The cluster client
    /// * `namespace` - The namespace this helper is scoped to
    #[must_use]
    pub fn new(client: kube::Client, namespace: &str) -> Self {
        KubePodHelper {
            namespace: namespace.to_owned(),
            pods: Api::namespaced(client.clone(), namespace),
            services: Api::namespaced(client, namespace),
        }
    }

    /// Probe the server version and build a namespace-scoped pod helper, refusing clusters
    /// older than Kubernetes 1.23 per §6
    ///
    /// # Arguments
    ///
    /// * `client` - The cluster client to probe and then scope
    /// * `namespace` - The namespace this helper is scoped to
    #[instrument(name = "KubePodHelper::connect", skip(client), err(Debug))]
    pub async fn connect(client: kube::Client, namespace: &str) -> Result<Self, Error> {
        let version = client.apiserver_version().await?;
        check_server_version(&version.major, &version.minor)?;
        event!(Level::INFO, major = %version.major, minor = %version.minor, msg = "cluster version accepted");
        Ok(Self::new(client, namespace))
    }

    /// Run a watch until a predicate observed on a pod's phase resolves it, or the timeout fires
    #[instrument(name = "KubePodHelper::watch_until", skip(self, predicate), err(Debug))]
    async fn watch_until<F>(
        &self,
        name: &str,
        timeout: Duration,
        mut predicate: F,
    ) -> Result<bool, Error>
    where
        F: FnMut(&Pod) -> Option<Result<bool, Error>> + Send,
    {
        let wp = WatchParams::default().fields(&format!("metadata.name={name}"));
        let mut stream = self.pods.watch(&wp, "0").await?.boxed();
        let outcome = tokio::time::timeout(timeout, async {
            while let Some(event) = stream.try_next().await? {
                match event {
                    WatchEvent::Added(pod) | WatchEvent::Modified(pod) => {
                        if let Some(done) = predicate(&pod) {
                            return done;
                        }
                    }
                    WatchEvent::Deleted(_) => return Ok(false),
                    WatchEvent::Error(err) => return Err(Error::from(kube::Error::Api(err))),
                    WatchEvent::Bookmark(_) => {}
                }
            }
            Ok(false)
        })
        .await;
        // the stream (and the watch it holds open) is dropped here on every path
        match outcome {
            Ok(result) => result,
            Err(_) => Ok(false),
        }
    }
}

#[async_trait]
impl PodHelper for KubePodHelper {
    #[instrument(name = "KubePodHelper::list", skip_all, err(Debug))]
    async fn list(&self, selector: &PodSelector) -> Result<Vec<TargetPod>, Error> {
        let lp = ListParams::default();
        let pods = self.pods.list(&lp).await?;
        let matched = pods
            .items
            .iter()
            .map(TargetPod::from)
            .filter(|pod| selector.matches(&pod.labels))
            .collect::<Vec<_>>();
        Ok(matched)
    }

    #[instrument(name = "KubePodHelper::get_service", skip(self), err(Debug))]
    async fn get_service(&self, name: &str) -> Result<ServiceDescriptor, Error> {
        match self.services.get(name).await {
            Ok(service) => Ok(ServiceDescriptor::from(&service)),
            Err(kube::Error::Api(err)) if err.code == 404 => {
                Err(Error::NotFound(format!(
                    "service {name} not found in ns {}",
                    self.namespace
                )))
            }
            Err(err) => Err(Error::from(err)),
        }
    }

    #[instrument(name = "KubePodHelper::wait_running", skip(self), err(Debug))]
    async fn wait_running(&self, name: &str, timeout: Duration) -> Result<bool, Error> {
        self.watch_until(name, timeout, move |pod| {
            match pod.status.as_ref().and_then(|s| s.phase.as_deref()) {
                Some("Running") => Some(Ok(true)),
                Some("Failed") => Some(Err(Error::Generic(format!("pod {name} failed")))),
                _ => None,
            }
        })
        .await
    }

    #[instrument(name = "KubePodHelper::exec", skip(self, argv), err(Debug))]
    async fn exec(
        &self,
        pod: &str,
        container: &str,
        argv: &[String],
    ) -> Result<(String, String), Error> {
        use tokio::io::AsyncReadExt;

        let ap = AttachParams::default()
            .container(container)
            .stdin(false)
            .stdout(true)
            .stderr(true)
            .tty(false);
        let mut attached = self.pods.exec(pod, argv, &ap).await?;

        let mut stdout = String::new();
        if let Some(mut out) = attached.stdout() {
            out.read_to_string(&mut stdout).await?;
        }
        let mut stderr = String::new();
        if let Some(mut err) = attached.stderr() {
            err.read_to_string(&mut stderr).await?;
        }

        if let Some(status_fut) = attached.take_status() {
            if let Some(status) = status_fut.await {
                if status.status.as_deref() == Some("Failure") {
                    return Err(Error::ExecFailed {
                        msg: status.message.unwrap_or_else(|| "exec failed".to_owned()),
                        stderr,
                    });
                }
            }
        }
        event!(Level::DEBUG, pod, container, msg = "exec completed");
        Ok((stdout, stderr))
    }

    #[instrument(name = "KubePodHelper::attach_ephemeral", skip(self, spec), err(Debug))]
    async fn attach_ephemeral(
        &self,
        pod_name: &str,
        spec: &EphemeralContainerSpec,
        opts: AttachOptions,
    ) -> Result<(), Error> {
        let pod = self.pods.get(pod_name).await?;
        let exists = pod
            .status
            .as_ref()
            .and_then(|s| s.ephemeral_container_statuses.as_ref())
            .map(|statuses| statuses.iter().any(|c| c.name == spec.name))
            .unwrap_or(false)
            || pod
                .spec
                .as_ref()
                .and_then(|s| s.ephemeral_containers.as_ref())
                .map(|containers| containers.iter().any(|c| c.name == spec.name))
                .unwrap_or(false);

        if exists {
            if opts.ignore_if_exists {
                event!(Level::INFO, pod = pod_name, msg = "agent already attached");
                return self.wait_for_attach(pod_name, spec, opts.timeout).await;
            }
            return Err(Error::AttachFailed(format!(
                "ephemeral container {} already exists on pod {pod_name}",
                spec.name
            )));
        }

        let patch = json!({
            "spec": {
                "ephemeralContainers": [{
                    "name": spec.name,
                    "image": spec.image,
                    "command": spec.command,
                    "stdin": true,
                    "tty": true,
                    "securityContext": {
                        "runAsUser": 0,
                        "runAsGroup": 0,
                        "runAsNonRoot": false,
                        "capabilities": { "add": ["NET_ADMIN"] }
                    }
                }]
            }
        });
        self.pods
            .patch_ephemeral_containers(
                pod_name,
                &PatchParams::default(),
                &Patch::Strategic(patch),
            )
            .await
            .map_err(|err| Error::AttachFailed(format!("patching {pod_name}: {err}")))?;

        self.wait_for_attach(pod_name, spec, opts.timeout).await
    }

    #[instrument(name = "KubePodHelper::terminate", skip(self), err(Debug))]
    async fn terminate(&self, pod: &str, timeout: Duration) -> Result<(), Error> {
        let grace = timeout.max(Duration::from_secs(1)).as_secs() as i64;
        let dp = DeleteParams::default().grace_period(grace as u32);
        self.pods.delete(pod, &dp).await?;
        Ok(())
    }
}

impl KubePodHelper {
    /// Wait for the ephemeral container to report `Running`, honoring the negative-means-zero
    /// and zero-means-skip rules from §4.3
    async fn wait_for_attach(
        &self,
        pod_name: &str,
        spec: &EphemeralContainerSpec,
        timeout: Duration,
    ) -> Result<(), Error> {
        if timeout.is_zero() {
            return Ok(());
        }
        let name = spec.name.clone();
        let reached = self
            .watch_until(pod_name, timeout, move |pod| {
                pod.status
                    .as_ref()
                    .and_then(|s| s.ephemeral_container_statuses.as_ref())
                    .and_then(|statuses| statuses.iter().find(|c| c.name == name))
                    .and_then(|status| status.state.as_ref().map(|state| state.running.is_some()))
                    .map(Ok)
            })
            .await?;
        if reached {
            Ok(())
        } else {
            Err(Error::NotStarted(format!(
                "ephemeral container {} on pod {pod_name} did not reach Running",
                spec.name
            )))
        }
    }
}


#[cfg(test)]
mod tests {
    use super::check_server_version;
    use crate::Error;

    #[test]
    fn accepts_the_minimum_supported_minor() {
        assert!(check_server_version("1", "23").is_ok());
    }

    #[test]
    fn accepts_newer_minors_and_tolerates_a_trailing_plus() {
        assert!(check_server_version("1", "30+").is_ok());
        assert!(check_server_version("2", "0").is_ok());
    }

    #[test]
    fn refuses_older_minors() {
        match check_server_version("1", "22") {
            Err(Error::UnsupportedCluster(_)) => {}
            other => panic!("expected UnsupportedCluster, got {other:?}"),
        }
    }
}

/// A fake, in-memory [`PodHelper`] used by unit tests elsewhere in this crate
#[cfg(test)]
pub(crate) mod tests_support {
    use super::{AttachOptions, EphemeralContainerSpec, PodHelper};
    use crate::models::{PodSelector, ServiceDescriptor, TargetPod};
    use crate::Error;
    use async_trait::async_trait;
    use std::time::Duration;

    /// A helper that succeeds on everything and returns empty data
    pub struct NoopHelper;

    #[async_trait]
    impl PodHelper for NoopHelper {
        async fn list(&self, _selector: &PodSelector) -> Result<Vec<TargetPod>, Error> {
            Ok(Vec::new())
        }

        async fn get_service(&self, _name: &str) -> Result<ServiceDescriptor, Error> {
            Ok(ServiceDescriptor::default())
        }

        async fn wait_running(&self, _name: &str, _timeout: Duration) -> Result<bool, Error> {
            Ok(true)
        }

        async fn exec(
            &self,
            _pod: &str,
            _container: &str,
            _argv: &[String],
        ) -> Result<(String, String), Error> {
            Ok((String::new(), String::new()))
        }

        async fn attach_ephemeral(
            &self,
            _pod: &str,
            _spec: &EphemeralContainerSpec,
            _opts: AttachOptions,
        ) -> Result<(), Error> {
            Ok(())
        }

        async fn terminate(&self, _pod: &str, _timeout: Duration) -> Result<(), Error> {
            Ok(())
        }
    }
}
