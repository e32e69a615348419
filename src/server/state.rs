//! Shared state handed to every request task: the Registry, the Varz sink,
//! and the one config field the dispatcher consults (the advertised proxy
//! IP). `ArcSwap` guards the config so a reload never blocks an in-flight
//! request's read.

use crate::config::RouterConfig;
use crate::metrics::Metrics;
use crate::registry::Registry;
use crate::varz::Varz;
use arc_swap::ArcSwap;
use std::sync::Arc;

#[derive(Clone)]
pub struct RouterState {
    pub config: Arc<ArcSwap<RouterConfig>>,
    pub registry: Arc<dyn Registry>,
    pub varz: Arc<dyn Varz>,
    pub metrics: Metrics,
}

impl RouterState {
    pub fn new(
        config: RouterConfig,
        registry: Arc<dyn Registry>,
        varz: Arc<dyn Varz>,
        metrics: Metrics,
    ) -> Self {
        Self {
            config: Arc::new(ArcSwap::new(Arc::new(config))),
            registry,
            varz,
            metrics,
        }
    }

    pub fn router_ip(&self) -> String {
        self.config.load().router_ip.clone()
    }

    pub fn upstream_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.config.load().upstream_timeout_secs)
    }
}
