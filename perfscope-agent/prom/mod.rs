pub mod perf;

pub use perf::PerfMetricExporter;
