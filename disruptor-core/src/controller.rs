//! Concurrent fan-out of a visitor over the resolved target pods (C5)

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{event, instrument, Level};

use crate::models::TargetPod;
use crate::visitor::Visitor;
use crate::Error;

/// Fans a [`Visitor`] out across a fixed set of target pods
pub struct PodController {
    targets: Vec<TargetPod>,
}

impl PodController {
    /// Build a controller over an already-resolved set of target pods
    ///
    /// # Arguments
    ///
    /// * `targets` - The pods this controller's `visit` calls will fan out across
    #[must_use]
    pub fn new(targets: Vec<TargetPod>) -> Self {
        PodController { targets }
    }

    /// The names of the pods this controller targets; performs no I/O
    #[must_use]
    pub fn targets(&self) -> Vec<String> {
        self.targets.iter().map(|pod| pod.name.clone()).collect()
    }

    /// The pods this controller targets
    #[must_use]
    pub fn pods(&self) -> &[TargetPod] {
        &self.targets
    }

    /// Run `visitor` against every target pod concurrently
    ///
    /// Returns the first non-cancellation error observed, or the parent token's cancellation
    /// once every worker has finished, whichever is appropriate per §4.5.
    ///
    /// # Arguments
    ///
    /// * `parent` - The caller's cancellation token; the controller derives a child from it
    /// * `visitor` - The per-pod operation to run
    #[instrument(name = "PodController::visit", skip_all, fields(targets = self.targets.len()))]
    pub async fn visit(
        &self,
        parent: CancellationToken,
        visitor: Arc<dyn Visitor>,
    ) -> Result<(), Error> {
        if self.targets.is_empty() {
            return Ok(());
        }

        let child = parent.child_token();
        let (tx, mut rx) = mpsc::channel::<Error>(self.targets.len());

        let mut handles = Vec::with_capacity(self.targets.len());
        for pod in self.targets.clone() {
            let visitor = Arc::clone(&visitor);
            let token = child.clone();
            let tx = tx.clone();
            handles.push(tokio::spawn(async move {
                if let Err(err) = visitor.visit(token.clone(), &pod).await {
                    if !err.is_cancelled() {
                        event!(Level::WARN, pod = %pod.name, error = %err, msg = "visitor failed");
                        let _ = tx.send(err).await;
                    }
                }
            }));
        }
        drop(tx);

        for handle in handles {
            handle.await?;
        }
        // always cancel the child so in-flight cleanup tasks (if any) unblock promptly
        child.cancel();

        if let Some(err) = rx.recv().await {
            return Err(err);
        }
        if parent.is_cancelled() {
            return Err(Error::Cancelled);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingVisitor {
        calls: Arc<AtomicUsize>,
        fail_named: Option<String>,
    }

    #[async_trait]
    impl Visitor for CountingVisitor {
        async fn visit(&self, _token: CancellationToken, pod: &TargetPod) -> Result<(), Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_named.as_deref() == Some(pod.name.as_str()) {
                return Err(Error::Generic("boom".to_owned()));
            }
            Ok(())
        }
    }

    fn pod(name: &str) -> TargetPod {
        TargetPod {
            name: name.to_owned(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn empty_target_set_succeeds_without_spawning() {
        let controller = PodController::new(Vec::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let visitor = Arc::new(CountingVisitor {
            calls: calls.clone(),
            fail_named: None,
        });
        let result = controller.visit(CancellationToken::new(), visitor).await;
        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn success_when_every_worker_succeeds() {
        let controller = PodController::new(vec![pod("a"), pod("b"), pod("c")]);
        let calls = Arc::new(AtomicUsize::new(0));
        let visitor = Arc::new(CountingVisitor {
            calls: calls.clone(),
            fail_named: None,
        });
        let result = controller.visit(CancellationToken::new(), visitor).await;
        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn returns_first_non_cancellation_error() {
        let controller = PodController::new(vec![pod("a"), pod("b")]);
        let visitor = Arc::new(CountingVisitor {
            calls: Arc::new(AtomicUsize::new(0)),
            fail_named: Some("b".to_owned()),
        });
        let result = controller.visit(CancellationToken::new(), visitor).await;
        assert!(matches!(result, Err(Error::Generic(_))));
    }

    #[tokio::test]
    async fn targets_lists_pod_names_without_io() {
        let controller = PodController::new(vec![pod("a"), pod("b")]);
        assert_eq!(controller.targets(), vec!["a".to_owned(), "b".to_owned()]);
    }
}
