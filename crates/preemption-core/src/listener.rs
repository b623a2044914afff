//! Signal listener: one notification loop per cluster-manager connection.
//!
//! Reads inbound signals from an mpsc channel, translates them through the
//! adapter and hands events to the dispatcher. Deliveries run on their own
//! tasks; the loop only waits for them after it stops reading.

use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::adapter::ResourceManagerAdapter;
use crate::dispatcher::{DispatchReport, PreemptionDispatcher};
use crate::metrics::METRICS;
use crate::shutdown::ShutdownSignal;
use crate::signal::RawPreemptionSignal;

/// A signal as received from a connection, either still encoded or already
/// decoded by the link.
#[derive(Debug, Clone)]
pub enum InboundSignal {
    Encoded(Vec<u8>),
    Decoded(RawPreemptionSignal),
}

impl From<Vec<u8>> for InboundSignal {
    fn from(bytes: Vec<u8>) -> Self {
        InboundSignal::Encoded(bytes)
    }
}

impl From<RawPreemptionSignal> for InboundSignal {
    fn from(signal: RawPreemptionSignal) -> Self {
        InboundSignal::Decoded(signal)
    }
}

/// What one listener saw over its lifetime.
#[derive(Debug, Default, Clone, Serialize)]
pub struct ListenerSummary {
    pub signals: usize,
    pub malformed: usize,
    pub suppressed: usize,
    pub reports: Vec<DispatchReport>,
}

pub struct SignalListener {
    adapter: Arc<ResourceManagerAdapter>,
    dispatcher: PreemptionDispatcher,
    shutdown: ShutdownSignal,
}

impl SignalListener {
    pub fn new(
        adapter: Arc<ResourceManagerAdapter>,
        dispatcher: PreemptionDispatcher,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            adapter,
            dispatcher,
            shutdown,
        }
    }

    pub fn spawn(self, inbound: mpsc::Receiver<InboundSignal>) -> JoinHandle<ListenerSummary> {
        tokio::spawn(self.run(inbound))
    }

    /// Run until the channel closes or shutdown begins, then wait for
    /// in-flight deliveries.
    pub async fn run(self, mut inbound: mpsc::Receiver<InboundSignal>) -> ListenerSummary {
        let mut summary = ListenerSummary::default();
        let mut deliveries = FuturesUnordered::new();
        let mut shutdown = self.shutdown.clone();

        loop {
            tokio::select! {
                biased;
                _ = shutdown.wait() => {
                    info!("shutdown requested; preemption listener stopping");
                    break;
                }
                Some(delivered) = deliveries.next(), if !deliveries.is_empty() => {
                    collect(&mut summary, delivered);
                }
                received = inbound.recv() => {
                    let Some(signal) = received else {
                        break;
                    };
                    summary.signals += 1;
                    let translated = match signal {
                        InboundSignal::Encoded(bytes) => self.adapter.ingest(&bytes).await,
                        InboundSignal::Decoded(raw) => self.adapter.translate(raw).await,
                    };
                    match translated {
                        Ok(Some(event)) => deliveries.push(self.dispatcher.dispatch(event)),
                        Ok(None) => summary.suppressed += 1,
                        Err(_) => summary.malformed += 1,
                    }
                }
            }
        }

        while let Some(delivered) = deliveries.next().await {
            collect(&mut summary, delivered);
        }
        METRICS.flush();
        summary
    }
}

fn collect(
    summary: &mut ListenerSummary,
    delivered: Result<DispatchReport, tokio::task::JoinError>,
) {
    match delivered {
        Ok(report) => summary.reports.push(report),
        Err(e) => warn!(error = %e, "preemption delivery task failed"),
    }
}
