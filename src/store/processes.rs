//! Latest process list per agent target

use std::collections::HashMap;

use crate::model::{ProcessSnapshot, TargetId};

/// Maximum processes returned for a target
const PROCESS_LIST_LIMIT: usize = 20;

#[derive(Debug, Default)]
pub struct ProcessStore {
    batches: HashMap<TargetId, Vec<ProcessSnapshot>>,
}

impl ProcessStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the batch of a target with a new one
    pub fn replace(&mut self, target_id: TargetId, batch: Vec<ProcessSnapshot>) {
        self.batches.insert(target_id, batch);
    }

    /// Latest batch, busiest processes first
    pub fn latest(&self, target_id: TargetId) -> Vec<ProcessSnapshot> {
        let Some(batch) = self.batches.get(&target_id) else {
            return Vec::new();
        };

        let mut processes = batch.clone();
        processes.sort_by(|a, b| b.cpu_percent.total_cmp(&a.cpu_percent));
        processes.truncate(PROCESS_LIST_LIMIT);
        processes
    }


    pub fn remove_target(&mut self, target_id: TargetId) -> usize {
        self.batches.remove(&target_id).map_or(0, |b| b.len())
    }

    pub fn snapshot(&self) -> Vec<ProcessSnapshot> {
        self.batches.values().flatten().cloned().collect()
    }

    /// Rebuild from persisted snapshots, keeping only the newest batch per target
    pub fn restore(processes: Vec<ProcessSnapshot>) -> Self {
        let mut batches: HashMap<TargetId, Vec<ProcessSnapshot>> = HashMap::new();

        for process in processes {
            let batch = batches.entry(process.target_id).or_default();
            match batch.first().map(|p| p.timestamp) {
                Some(ts) if process.timestamp > ts => {
                    batch.clear();
                    batch.push(process);
                }
                Some(ts) if process.timestamp < ts => {}
                _ => batch.push(process),
            }
        }

        Self { batches }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, Utc};

    fn process(target_id: TargetId, pid: u32, cpu: f64, timestamp: DateTime<Utc>) -> ProcessSnapshot {
        ProcessSnapshot {
            target_id,
            timestamp,
            pid,
            name: format!("proc-{pid}"),
            cpu_percent: cpu,
            mem_percent: 1.0,
            mem_rss: 1024,
            user: "root".to_string(),
            command: format!("/usr/bin/proc-{pid}"),
        }
    }

    #[test]
    fn test_new_batch_replaces_previous() {
        let mut store = ProcessStore::new();
        let now = Utc::now();

        store.replace(1, vec![process(1, 10, 5.0, now), process(1, 11, 3.0, now)]);
        let later = now + Duration::seconds(30);
        store.replace(1, vec![process(1, 12, 1.0, later)]);

        let latest = store.latest(1);
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].pid, 12);
        assert_eq!(latest[0].timestamp, later);
    }

    #[test]
    fn test_latest_sorted_by_cpu_and_capped() {
        let mut store = ProcessStore::new();
        let now = Utc::now();
        let batch = (0..30).map(|i| process(1, i, i as f64, now)).collect();

        store.replace(1, batch);

        let latest = store.latest(1);
        assert_eq!(latest.len(), PROCESS_LIST_LIMIT);
        assert_eq!(latest[0].pid, 29);
        assert!(latest.windows(2).all(|w| w[0].cpu_percent >= w[1].cpu_percent));
    }

    #[test]
    fn test_restore_keeps_newest_batch() {
        let now = Utc::now();
        let old = now - Duration::minutes(1);

        let store = ProcessStore::restore(vec![
            process(1, 1, 1.0, old),
            process(1, 2, 1.0, now),
            process(1, 3, 1.0, old),
            process(1, 4, 1.0, now),
        ]);

        let mut pids: Vec<_> = store.latest(1).iter().map(|p| p.pid).collect();
        pids.sort();
        assert_eq!(pids, vec![2, 4]);
    }
}
