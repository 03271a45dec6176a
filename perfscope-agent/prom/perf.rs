use prometheus::{Encoder, IntGaugeVec, Opts, Registry, TextEncoder};
use std::sync::Arc;

use crate::counters::PerThreadBinding;
use crate::error::Result;
use crate::orchestrator::PerfCollector;

const LABELS: [&str; 4] = ["thread", "tid", "device", "series"];

/// Publishes the latest collection round of every binding
pub struct PerfMetricExporter {
    registry: Arc<Registry>,
    deltas: IntGaugeVec,
}

impl PerfMetricExporter {
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());
        let deltas = IntGaugeVec::new(
            Opts::new(
                "perfscope_counter_delta",
                "Counter delta over the latest collection round",
            ),
            &LABELS,
        )?;
        registry.register(Box::new(deltas.clone()))?;
        #[cfg(target_os = "linux")]
        registry.register(Box::new(
            prometheus::process_collector::ProcessCollector::for_self(),
        ))?;

        Ok(Self { registry, deltas })
    }

    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(&self.registry)
    }

    /// Refresh gauges from every binding of `collector` (called after each collect)
    pub fn update(&self, collector: &PerfCollector) {
        collector.visit_bindings(|binding| self.observe(binding));
    }

    pub fn observe(&self, binding: &PerThreadBinding) {
        let tid = binding
            .tid()
            .map(|tid| tid.to_string())
            .unwrap_or_else(|| "all".to_string());

        for name in binding.event_names() {
            let Some(value) = binding.results().get(name).and_then(|s| s.last()) else {
                continue;
            };
            self.deltas
                .with_label_values(&[binding.name(), &tid, binding.device(), name])
                .set(value);
        }
    }

    /// Render the registry in the text exposition format.
    pub fn gather(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}
