//! Group scheduler: bounded fan-out of host tasks with a join barrier

use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{error, info, instrument};

use crate::pipeline::HostTask;
use crate::types::{HostResult, HostStatus};

/// Fans a group's hosts out to a [`HostTask`] with at most `worker_limit`
/// running at once.
pub struct GroupScheduler {
    task: Arc<dyn HostTask>,
    worker_limit: usize,
}

impl GroupScheduler {
    pub fn new(task: Arc<dyn HostTask>, worker_limit: usize) -> Self {
        Self {
            task,
            worker_limit: worker_limit.clamp(1, Semaphore::MAX_PERMITS),
        }
    }

    #[must_use]
    pub fn worker_limit(&self) -> usize {
        self.worker_limit
    }

    /// Run every host and wait for all of them.
    ///
    /// Returns exactly one result per input host, in input order. A panicking
    /// task is converted into `OtherFailure` for its host; siblings keep
    /// running.
    #[instrument(skip(self, hosts), fields(hosts = hosts.len(), workers = self.worker_limit))]
    pub async fn run_group(&self, hosts: &[String]) -> Vec<HostResult> {
        let permits = Arc::new(Semaphore::new(self.worker_limit));
        let mut handles = Vec::with_capacity(hosts.len());

        for host in hosts {
            let task = self.task.clone();
            let permits = permits.clone();
            let host_name = host.clone();

            let handle = tokio::spawn(async move {
                // the semaphore is never closed, so acquire cannot fail
                let _permit = permits.acquire_owned().await.ok();
                task.run(&host_name).await
            });

            handles.push((host.clone(), handle));
        }

        // Barrier: wait for every task, success or failure
        let mut results = Vec::with_capacity(handles.len());
        for (host, handle) in handles {
            match handle.await {
                Ok(result) => results.push(result),
                Err(e) => {
                    error!(host = %host, error = %e, "host task panicked");
                    results.push(HostResult::status_only(
                        host,
                        HostStatus::OtherFailure(format!("host task panicked: {e}")),
                    ));
                }
            }
        }

        let compliant = results.iter().filter(|r| r.status.is_compliant()).count();
        info!(
            total = results.len(),
            compliant,
            failed = results.len() - compliant,
            "group run finished"
        );

        results
    }
}
