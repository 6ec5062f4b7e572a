use std::sync::Arc;

use futures::{pin_mut, select, FutureExt};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use bigip_rest::{Bigip, ConfigTree};
use bigip_utils::metrics::time_it;
use bigip_utils::DeployQueue;

use crate::types::{DeployRequest, DeployResponse};
use crate::{ErrorKind, Result, ResultExt};

/// Single consumer draining the pending queue and publishing responses.
///
/// Many producers may enqueue concurrently; one worker applies requests
/// strictly in dequeue order, device by device. BIG-IP transactions are
/// per-session, so serializing the writes keeps their semantics simple.
pub struct Deployer {
    pending: Arc<DeployQueue<DeployRequest>>,
    done: Arc<DeployQueue<DeployResponse>>,
    stop_tx: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl Deployer {
    /// Spawn the worker over the given devices. Must be called from
    /// within a tokio runtime.
    pub fn start(bigips: Vec<Arc<Bigip>>) -> Deployer {
        let pending = Arc::new(DeployQueue::new());
        let done = Arc::new(DeployQueue::new());
        let (stop_tx, stop_rx) = oneshot::channel::<()>();

        let worker_pending = pending.clone();
        let worker_done = done.clone();
        let handle = tokio::spawn(async move {
            let mut stop = stop_rx.fuse();
            loop {
                let r = {
                    let next = worker_pending.get().fuse();
                    pin_mut!(next);
                    select! {
                        _ = stop => break,
                        r = next => r,
                    }
                };
                let response = process(&bigips, r).await;
                worker_done.add(response);
            }
            debug!("deployer worker stopped");
        });

        Deployer {
            pending,
            done,
            stop_tx,
            handle,
        }
    }

    /// Producers enqueue here; `insert` jumps the line, `filter` coalesces.
    pub fn pending(&self) -> Arc<DeployQueue<DeployRequest>> {
        self.pending.clone()
    }

    /// Responses come out here, one per request, in processing order.
    pub fn done(&self) -> Arc<DeployQueue<DeployResponse>> {
        self.done.clone()
    }

    /// Stop the worker at the next dequeue boundary.
    pub async fn stop(self) {
        let _ = self.stop_tx.send(());
        let _ = self.handle.await;
    }
}

/// Apply one request to every targeted device, merging failures.
async fn process(bigips: &[Arc<Bigip>], r: DeployRequest) -> DeployResponse {
    let tag = r.context.log_tag();
    info!("{}Processing request: {}", tag, r.meta);

    let mut failures: Vec<String> = Vec::new();
    for bigip in bigips {
        if let Some(ref url) = r.context.specified_bigip {
            if url != &bigip.url {
                info!("{}skipping bigip {}", tag, bigip.url);
                continue;
            }
        }
        if let Err(e) = handle_request(bigip, &r).await {
            error!("{}{}", tag, error_text(&e));
            failures.push(error_text(&e));
        }
    }

    let status: Result<()> = if failures.is_empty() {
        Ok(())
    } else {
        Err(ErrorKind::DeviceFailures(failures.join("; ")).into())
    };
    DeployResponse { request: r, status }
}

async fn handle_request(bigip: &Bigip, r: &DeployRequest) -> Result<()> {
    let tag = r.context.log_tag();
    if r.context.create_partition {
        info!("{}creating partition: {}", tag, r.partition);
        bigip
            .deploy_partition(&r.partition)
            .await
            .chain_err(|| format!("failed to deploy partition {}", r.partition))?;
    }
    deploy(bigip, &r.partition, r.from.as_ref(), r.to.as_ref())
        .await
        .chain_err(|| format!("failed to do deployment to {}", bigip.url))?;
    if r.context.delete_partition {
        info!("{}deleting partition: {}", tag, r.partition);
        bigip
            .delete_partition(&r.partition)
            .await
            .chain_err(|| format!("failed to delete partition {}", r.partition))?;
    }
    Ok(())
}

/// The full pipeline for one device: live state, diff, ordered execution.
async fn deploy(bigip: &Bigip, partition: &str, from: Option<&ConfigTree>, to: Option<&ConfigTree>) -> Result<()> {
    let _t = time_it("deploy");
    let cmds = bigip.gen_rest_requests(partition, from, to).await?;
    bigip.do_rest_requests(&cmds).await?;
    Ok(())
}

// flatten an error chain into one line so per-device messages can be
// merged without losing the retry marker carried by inner causes
fn error_text(e: &crate::Error) -> String {
    e.iter().map(|c| c.to_string()).collect::<Vec<_>>().join(": ")
}
