use std::collections::{HashMap, VecDeque};

use crate::worker::job::Job;

/// Where an active job currently sits.
#[derive(Debug)]
enum Slot {
    Queued(Job),
    Running { run_id: String },
    /// Finished, but the terminal status has not reached the status store yet.
    Unreconciled(Job),
}

/// Jobs the orchestrator is responsible for, keyed by row id.
///
/// A row id stays here from admission until its terminal status is written
/// back, and `admit` refuses ids already present.
#[derive(Debug, Default)]
pub struct JobRegistry {
    slots: HashMap<String, Slot>,
    queue: VecDeque<String>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.slots.contains_key(id)
    }

    /// Queues a job. Returns false if its id is already active.
    pub fn admit(&mut self, job: Job) -> bool {
        if self.contains(&job.id) {
            return false;
        }
        self.queue.push_back(job.id.clone());
        self.slots.insert(job.id.clone(), Slot::Queued(job));
        true
    }

    /// Pops the oldest queued job and marks its id running.
    pub fn dispatch_next(&mut self) -> Option<Job> {
        while let Some(id) = self.queue.pop_front() {
            let run_id = match self.slots.get(&id) {
                Some(Slot::Queued(job)) => job.run_id.clone(),
                _ => continue,
            };
            if let Some(Slot::Queued(job)) = self.slots.insert(id, Slot::Running { run_id }) {
                return Some(job);
            }
        }
        None
    }

    /// Puts a job that could not be dispatched back at the head of the queue.
    pub fn requeue(&mut self, job: Job) {
        self.queue.push_front(job.id.clone());
        self.slots.insert(job.id.clone(), Slot::Queued(job));
    }

    pub fn is_running(&self, id: &str, run_id: &str) -> bool {
        matches!(self.slots.get(id), Some(Slot::Running { run_id: r }) if r == run_id)
    }

    /// Parks a finished job whose terminal status still has to be written.
    pub fn park_unreconciled(&mut self, job: Job) {
        self.slots.insert(job.id.clone(), Slot::Unreconciled(job));
    }

    /// Takes every unreconciled job out for another write attempt.
    ///
    /// Their ids stay reserved; callers either `remove` or re-park them.
    pub fn take_unreconciled(&mut self) -> Vec<Job> {
        let ids: Vec<String> = self
            .slots
            .iter()
            .filter(|(_, slot)| matches!(slot, Slot::Unreconciled(_)))
            .map(|(id, _)| id.clone())
            .collect();

        ids.into_iter()
            .filter_map(|id| {
                let run_id = match self.slots.get(&id) {
                    Some(Slot::Unreconciled(job)) => job.run_id.clone(),
                    _ => return None,
                };
                match self.slots.insert(id, Slot::Running { run_id }) {
                    Some(Slot::Unreconciled(job)) => Some(job),
                    _ => None,
                }
            })
            .collect()
    }

    /// Drops a job whose lifecycle is over.
    pub fn remove(&mut self, id: &str) {
        self.slots.remove(id);
        self.queue.retain(|queued| queued != id);
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn running(&self) -> usize {
        self.count(|slot| matches!(slot, Slot::Running { .. }))
    }

    pub fn unreconciled(&self) -> usize {
        self.count(|slot| matches!(slot, Slot::Unreconciled(_)))
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn count(&self, pred: impl Fn(&Slot) -> bool) -> usize {
        self.slots.values().filter(|slot| pred(slot)).count()
    }
}
