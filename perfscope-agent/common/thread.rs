// Thread enumeration from procfs

use std::fs;
use std::path::Path;

use nix::unistd::{getpid, gettid};

use crate::error::Result;

pub const TASK_DIR: &str = "/proc/self/task";

/// A live thread of this process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadInfo {
    pub tid: i32,
    pub name: String,
}

/// OS thread id of the calling thread.
pub fn current_tid() -> i32 {
    gettid().as_raw()
}

pub fn current_pid() -> i32 {
    getpid().as_raw()
}

/// Name of `tid` from its `comm` file, or of the process when `tid` is `None`.
pub fn thread_name(tid: Option<i32>) -> Option<String> {
    let path = match tid {
        Some(tid) => format!("{TASK_DIR}/{tid}/comm"),
        None => "/proc/self/comm".to_string(),
    };
    match fs::read_to_string(&path) {
        Ok(name) => Some(name.trim_end().to_string()),
        Err(e) => {
            tracing::debug!("Failed to read comm file {}: {}", path, e);
            None
        }
    }
}

pub fn process_name() -> String {
    thread_name(None).unwrap_or_else(|| format!("pid{}", current_pid()))
}

/// All threads listed under `task_dir`, sorted by tid.
///
/// Threads that exit while being listed are skipped.
pub fn list_threads(task_dir: &Path) -> Result<Vec<ThreadInfo>> {
    let mut threads = Vec::new();
    for entry in fs::read_dir(task_dir)?.flatten() {
        let file_name = entry.file_name();
        let Some(tid) = file_name.to_str().and_then(|s| s.parse::<i32>().ok()) else {
            continue;
        };
        match fs::read_to_string(entry.path().join("comm")) {
            Ok(name) => threads.push(ThreadInfo {
                tid,
                name: name.trim_end().to_string(),
            }),
            Err(e) => tracing::debug!("Fail to open comm file for thread {}: {}", tid, e),
        }
    }
    threads.sort_by_key(|t| t.tid);
    Ok(threads)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn test_named_thread_is_listed() {
        let (tx, rx) = mpsc::channel();
        let (done_tx, done_rx) = mpsc::channel::<()>();
        let handle = std::thread::Builder::new()
            .name("lister-test".to_string())
            .spawn(move || {
                tx.send(current_tid()).unwrap();
                let _ = done_rx.recv();
            })
            .unwrap();

        let tid = rx.recv().unwrap();
        let threads = list_threads(Path::new(TASK_DIR)).unwrap();
        let name = thread_name(Some(tid));
        done_tx.send(()).unwrap();
        handle.join().unwrap();

        let listed = threads.iter().find(|t| t.tid == tid).unwrap();
        assert_eq!(listed.name, "lister-test");
        assert_eq!(name.as_deref(), Some("lister-test"));
    }

    #[test]
    fn test_list_threads_from_fake_task_dir() {
        let dir = tempfile::tempdir().unwrap();
        for (tid, name) in [(12, "patrace-1"), (7, "mali-cmar"), (30, "worker")] {
            let task = dir.path().join(tid.to_string());
            fs::create_dir(&task).unwrap();
            fs::write(task.join("comm"), format!("{name}\n")).unwrap();
        }
        fs::create_dir(dir.path().join("not-a-tid")).unwrap();

        let threads = list_threads(dir.path()).unwrap();
        let tids: Vec<i32> = threads.iter().map(|t| t.tid).collect();
        assert_eq!(tids, vec![7, 12, 30]);
        assert_eq!(threads[1].name, "patrace-1");
    }
}
