//! Wiring of adapter, negotiator, dispatcher and listener for one driver.

use std::sync::Arc;

use evaluator_registry::EvaluatorRegistry;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::adapter::{ClusterManagerLink, ResourceManagerAdapter};
use crate::config::PreemptionConfig;
use crate::dispatcher::{DispatchReport, PreemptionDispatcher, PreemptionHandler};
use crate::error::PreemptionResult;
use crate::listener::{InboundSignal, ListenerSummary, SignalListener};
use crate::negotiator::MitigationNegotiator;
use crate::shutdown::{shutdown_channel, ShutdownTrigger};
use crate::signal::RawPreemptionSignal;

/// The preemption subsystem of one driver.
pub struct PreemptionSubsystem {
    config: PreemptionConfig,
    adapter: Arc<ResourceManagerAdapter>,
    dispatcher: PreemptionDispatcher,
    shutdown: ShutdownTrigger,
}

impl PreemptionSubsystem {
    pub fn new(
        registry: Arc<dyn EvaluatorRegistry>,
        link: Arc<dyn ClusterManagerLink>,
        config: PreemptionConfig,
    ) -> PreemptionResult<Self> {
        config.validate()?;
        let (shutdown, signal) = shutdown_channel();
        let adapter = Arc::new(ResourceManagerAdapter::new(registry, link));
        let negotiator =
            MitigationNegotiator::new(Arc::clone(&adapter), config.negotiation_timeout(), signal);
        let dispatcher = PreemptionDispatcher::new(Arc::clone(&adapter), negotiator);
        Ok(Self {
            config,
            adapter,
            dispatcher,
            shutdown,
        })
    }

    pub fn config(&self) -> &PreemptionConfig {
        &self.config
    }

    pub fn adapter(&self) -> &Arc<ResourceManagerAdapter> {
        &self.adapter
    }

    pub fn dispatcher(&self) -> &PreemptionDispatcher {
        &self.dispatcher
    }

    pub fn register_handler(&self, handler: Arc<dyn PreemptionHandler>) {
        self.dispatcher.register_handler(handler);
    }

    /// Translate and dispatch one signal. `Ok(None)` if it was suppressed.
    pub async fn submit(
        &self,
        signal: RawPreemptionSignal,
    ) -> PreemptionResult<Option<JoinHandle<DispatchReport>>> {
        let event = self.adapter.translate(signal).await?;
        Ok(event.map(|event| self.dispatcher.dispatch(event)))
    }

    /// Start a listener for one cluster-manager connection.
    pub fn listen(&self, inbound: mpsc::Receiver<InboundSignal>) -> JoinHandle<ListenerSummary> {
        SignalListener::new(
            Arc::clone(&self.adapter),
            self.dispatcher.clone(),
            self.shutdown.subscribe(),
        )
        .spawn(inbound)
    }

    /// Begin driver shutdown: listeners stop reading and outstanding
    /// negotiations resolve as rejected.
    pub fn shutdown(&self) {
        self.shutdown.trigger();
    }
}
