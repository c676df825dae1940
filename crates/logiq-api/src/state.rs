use chrono::{DateTime, TimeDelta, Utc};
use logiq_core::config::Settings;
use logiq_core::task::{TaskReport, TaskStatus};
use logiq_rag::RagEngine;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

use crate::queue::TaskQueue;

/// Unfinished tasks are kept this many times longer than finished ones.
const UNFINISHED_RETENTION_FACTOR: i32 = 24;

#[derive(Clone, Debug, PartialEq)]
pub struct TaskEntry {
    pub status: TaskStatus,
    pub updated_at: DateTime<Utc>,
}

/// Last known status of tasks enqueued by this process.
///
/// Bounded two ways: entries age out after the retention window, and the
/// board never holds more than `max_entries`, dropping the oldest finished
/// tasks first when it is full.
#[derive(Debug)]
pub struct TaskBoard {
    tasks: RwLock<HashMap<Uuid, TaskEntry>>,
    finished_ttl: TimeDelta,
    unfinished_ttl: TimeDelta,
    max_entries: usize,
}

impl TaskBoard {
    pub fn new(retention: Duration, max_entries: usize) -> Self {
        let finished_ttl = TimeDelta::from_std(retention).unwrap_or(TimeDelta::MAX);
        Self {
            tasks: RwLock::new(HashMap::new()),
            finished_ttl,
            unfinished_ttl: finished_ttl
                .checked_mul(UNFINISHED_RETENTION_FACTOR)
                .unwrap_or(TimeDelta::MAX),
            max_entries: max_entries.max(1),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.task_retention(), settings.max_tracked_tasks)
    }

    pub fn insert_pending(&self, task_id: Uuid) {
        let now = Utc::now();
        let Ok(mut tasks) = self.tasks.write() else {
            return;
        };
        self.make_room(&mut tasks, now);
        tasks.insert(
            task_id,
            TaskEntry {
                status: TaskStatus::Pending,
                updated_at: now,
            },
        );
    }

    /// Records a worker report. A finished task never moves back to running.
    pub fn apply(&self, report: TaskReport) {
        let Ok(mut tasks) = self.tasks.write() else {
            return;
        };
        let known = match tasks.get(&report.task_id) {
            Some(existing) if existing.status.is_finished() && !report.status.is_finished() => return,
            Some(_) => true,
            None => false,
        };
        if !known {
            self.make_room(&mut tasks, Utc::now());
        }
        tasks.insert(
            report.task_id,
            TaskEntry {
                status: report.status,
                updated_at: report.reported_at,
            },
        );
    }

    pub fn get(&self, task_id: &Uuid) -> Option<TaskEntry> {
        self.tasks.read().ok()?.get(task_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.tasks.read().map(|tasks| tasks.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops entries past their retention window. Returns how many were dropped.
    pub fn prune(&self, now: DateTime<Utc>) -> usize {
        let Ok(mut tasks) = self.tasks.write() else {
            return 0;
        };
        self.prune_expired(&mut tasks, now)
    }

    fn is_expired(&self, entry: &TaskEntry, now: DateTime<Utc>) -> bool {
        let ttl = if entry.status.is_finished() {
            self.finished_ttl
        } else {
            self.unfinished_ttl
        };
        now.signed_duration_since(entry.updated_at) > ttl
    }

    fn prune_expired(&self, tasks: &mut HashMap<Uuid, TaskEntry>, now: DateTime<Utc>) -> usize {
        let before = tasks.len();
        tasks.retain(|_, entry| !self.is_expired(entry, now));
        before - tasks.len()
    }

    // Leaves space for one more entry, evicting down to 90% of capacity at once
    // so a full board does not sort on every insert.
    fn make_room(&self, tasks: &mut HashMap<Uuid, TaskEntry>, now: DateTime<Utc>) {
        if tasks.len() < self.max_entries {
            return;
        }
        let expired = self.prune_expired(tasks, now);
        if tasks.len() < self.max_entries {
            debug!(expired, "Pruned task board");
            return;
        }

        let target = (self.max_entries - self.max_entries / 10).min(self.max_entries - 1);
        let mut oldest: Vec<(bool, DateTime<Utc>, Uuid)> = tasks
            .iter()
            .map(|(id, entry)| (!entry.status.is_finished(), entry.updated_at, *id))
            .collect();
        oldest.sort_unstable();

        let evicted = tasks.len() - target;
        for (_, _, id) in oldest.into_iter().take(evicted) {
            tasks.remove(&id);
        }
        debug!(expired, evicted, "Task board full, evicted oldest tasks");
    }
}

pub struct AppState {
    pub queue: Arc<dyn TaskQueue>,
    pub rag_engine: RagEngine,
    pub tasks: Arc<TaskBoard>,
    pub settings: Settings,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn succeeded() -> TaskStatus {
        TaskStatus::Succeeded {
            log_id: Uuid::new_v4(),
            attempts: 1,
        }
    }

    fn report_at(task_id: Uuid, status: TaskStatus, reported_at: DateTime<Utc>) -> TaskReport {
        TaskReport {
            task_id,
            status,
            reported_at,
        }
    }

    #[test]
    fn test_finished_task_ignores_late_started_report() {
        let board = TaskBoard::new(Duration::from_secs(3_600), 100);
        let id = Uuid::new_v4();
        board.insert_pending(id);

        board.apply(TaskReport::new(id, succeeded()));
        board.apply(TaskReport::new(id, TaskStatus::Started));

        assert!(board.get(&id).unwrap().status.is_finished());
        assert!(board.get(&Uuid::new_v4()).is_none());
    }

    #[test]
    fn test_finished_tasks_expire_after_retention() {
        let board = TaskBoard::new(Duration::from_secs(60), 100);
        let now = Utc::now();
        let (done, running) = (Uuid::new_v4(), Uuid::new_v4());
        board.apply(report_at(done, succeeded(), now - TimeDelta::seconds(120)));
        board.apply(report_at(running, TaskStatus::Started, now - TimeDelta::seconds(120)));

        assert_eq!(board.prune(now), 1);
        assert!(board.get(&done).is_none());
        // unfinished tasks get the longer window
        assert_eq!(board.get(&running).unwrap().status, TaskStatus::Started);

        assert_eq!(board.prune(now + TimeDelta::hours(1)), 1);
        assert_eq!(board.len(), 0);
    }

    #[test]
    fn test_full_board_evicts_oldest_finished_first() {
        let board = TaskBoard::new(Duration::from_secs(3_600), 10);
        let now = Utc::now();
        let oldest_running = Uuid::new_v4();
        board.apply(report_at(oldest_running, TaskStatus::Started, now - TimeDelta::seconds(100)));
        let finished: Vec<Uuid> = (0..9)
            .map(|i| {
                let id = Uuid::new_v4();
                board.apply(report_at(id, succeeded(), now - TimeDelta::seconds(50 - i)));
                id
            })
            .collect();
        assert_eq!(board.len(), 10);

        let newest = Uuid::new_v4();
        board.insert_pending(newest);

        assert!(board.len() <= 10);
        assert_eq!(board.get(&newest).unwrap().status, TaskStatus::Pending);
        assert!(board.get(&oldest_running).is_some());
        assert!(board.get(&finished[0]).is_none());
        assert!(board.get(&finished[8]).is_some());
    }

    #[test]
    fn test_board_stays_bounded_under_load() {
        let board = TaskBoard::new(Duration::from_secs(3_600), 50);
        for _ in 0..1_000 {
            board.insert_pending(Uuid::new_v4());
        }
        assert!(board.len() <= 50);
    }
}
