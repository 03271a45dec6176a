// Names of merged thread groups in the result document
use crate::metric_enum;

metric_enum! {
    pub enum Aggregate {
        ReplayMainThreads => "replayMainThreads",
        BackgroundThreads => "backgroundThreads",
        AllThreads => "allThreads",
    }
}

/// Thread-name key of every `thread_data` entry.
pub const THREAD_KEY: &str = "CCthread";
pub const DEVICE_KEY: &str = "device";
pub const SUM_KEY: &str = "SUM";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregate_names() {
        let names: Vec<&str> = Aggregate::all().iter().map(|a| a.name()).collect();
        assert_eq!(
            names,
            vec!["replayMainThreads", "backgroundThreads", "allThreads"]
        );
    }
}
