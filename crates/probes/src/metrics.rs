//! Prometheus counters shared by the FleetOS binaries

use crate::error::ProbeError;
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

/// Counters for one process. Cloning shares the underlying registry.
#[derive(Debug, Clone)]
pub struct Metrics {
    registry: Registry,
    reconcile_total: IntCounterVec,
    nodes_dispatched_total: IntCounter,
    agent_calls_total: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Result<Self, ProbeError> {
        let registry = Registry::new();

        let reconcile_total = IntCounterVec::new(
            Opts::new("fleetos_reconcile_total", "Reconcile passes by controller and result"),
            &["controller", "result"],
        )?;
        let nodes_dispatched_total = IntCounter::new(
            "fleetos_nodes_dispatched_total",
            "Nodes labeled for upgrade or configuration by the operator",
        )?;
        let agent_calls_total = IntCounterVec::new(
            Opts::new("fleetos_agent_calls_total", "Agent calls by method and result"),
            &["method", "result"],
        )?;

        registry.register(Box::new(reconcile_total.clone()))?;
        registry.register(Box::new(nodes_dispatched_total.clone()))?;
        registry.register(Box::new(agent_calls_total.clone()))?;

        Ok(Self {
            registry,
            reconcile_total,
            nodes_dispatched_total,
            agent_calls_total,
        })
    }

    pub fn record_reconcile(&self, controller: &str, ok: bool) {
        self.reconcile_total
            .with_label_values(&[controller, result_label(ok)])
            .inc();
    }

    pub fn record_dispatched(&self, count: u64) {
        self.nodes_dispatched_total.inc_by(count);
    }

    pub fn record_agent_call(&self, method: &str, ok: bool) {
        self.agent_calls_total
            .with_label_values(&[method, result_label(ok)])
            .inc();
    }

    /// Renders all counters in the Prometheus text format
    pub fn render(&self) -> Result<String, ProbeError> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

fn result_label(ok: bool) -> &'static str {
    if ok { "success" } else { "error" }
}
