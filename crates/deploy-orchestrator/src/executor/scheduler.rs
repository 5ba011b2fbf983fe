use crate::error::DeployError;
use crate::executor::{ComponentOutcome, Executor, Resolved};
use crate::model::ComponentSet;
use std::collections::HashSet;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Dispatches ready components in parallel, up to `concurrency` at a time.
///
/// A component is ready once every `depends_on` entry has completed. Ready
/// components are started in execution order. After the first failure no new
/// work is started; in-flight deployments are allowed to finish (and persist)
/// before the error is returned.
pub struct Scheduler {
    executor: Executor,
    concurrency: usize,
}

impl Scheduler {
    pub fn new(executor: Executor, concurrency: usize) -> Self {
        Self {
            executor,
            concurrency: concurrency.max(1),
        }
    }

    /// Runs every component of `set` in `order`. Outcomes come back in `order`.
    pub async fn run(
        &self,
        set: &ComponentSet,
        order: &[String],
        mut resolved: Resolved,
    ) -> Result<Vec<ComponentOutcome>, DeployError> {
        let mut waiting: Vec<&str> = order.iter().map(String::as_str).collect();
        let mut done: HashSet<String> = HashSet::new();
        let mut running: JoinSet<(String, Result<ComponentOutcome, DeployError>)> = JoinSet::new();
        let mut outcomes = Vec::with_capacity(order.len());
        let mut failure: Option<DeployError> = None;

        loop {
            if failure.is_none() {
                let mut index = 0;
                while index < waiting.len() && running.len() < self.concurrency {
                    let name = waiting[index];
                    let Some(spec) = set.get(name) else {
                        return Err(DeployError::Inconsistent {
                            component: name.to_string(),
                            detail: "scheduled component is not in the set".to_string(),
                        });
                    };
                    if !spec.depends_on.iter().all(|d| done.contains(d)) {
                        index += 1;
                        continue;
                    }
                    waiting.remove(index);

                    let executor = self.executor.clone();
                    let spec = spec.clone();
                    let snapshot = resolved.clone();
                    debug!(component = %spec.name, in_flight = running.len() + 1, "Dispatch");
                    running.spawn(async move {
                        let result = executor.ensure_deployed(&spec, &snapshot).await;
                        (spec.name, result)
                    });
                }
            }

            let Some(joined) = running.join_next().await else {
                break;
            };
            match joined {
                Ok((name, Ok(outcome))) => {
                    debug!(component = %name, kind = ?outcome.kind, "Completed");
                    resolved.record(&outcome);
                    done.insert(name);
                    outcomes.push(outcome);
                }
                Ok((name, Err(e))) => {
                    warn!(component = %name, error = %e, "Stopping dispatch");
                    failure.get_or_insert(e);
                }
                Err(e) => {
                    failure.get_or_insert(DeployError::TaskAborted(e.to_string()));
                }
            }
        }

        if let Some(e) = failure {
            return Err(e);
        }
        if let Some(stuck) = waiting.first() {
            return Err(DeployError::Inconsistent {
                component: stuck.to_string(),
                detail: "dependencies never completed".to_string(),
            });
        }

        outcomes.sort_by_key(|o| order.iter().position(|n| *n == o.name));
        info!(components = outcomes.len(), "All components satisfied");
        Ok(outcomes)
    }
}
