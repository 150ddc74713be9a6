//! Progress broadcasting and the job board.
//!
//! Sessions and the orchestrator report through a [`ProgressReporter`]; the
//! board keeps the latest snapshot per job for status queries and the
//! broadcaster streams the same events to live subscribers.

pub mod job_board;
pub mod job_progress;

use std::sync::Arc;

pub use job_board::{JobBoard, JobSnapshot, ProgressEntry};
pub use job_progress::{JobPhase, JobProgressBroadcaster, JobProgressEvent};

pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: JobProgressEvent);
}

/// No-op reporter for unit tests.
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn report(&self, _event: JobProgressEvent) {}
}

/// Updates the job board, then fans the event out to subscribers.
#[derive(Clone)]
pub struct BoardProgress {
    board: Arc<JobBoard>,
    broadcaster: JobProgressBroadcaster,
}

impl BoardProgress {
    pub fn new(board: Arc<JobBoard>, broadcaster: JobProgressBroadcaster) -> Self {
        Self { board, broadcaster }
    }

    pub fn board(&self) -> &Arc<JobBoard> {
        &self.board
    }

    pub fn broadcaster(&self) -> &JobProgressBroadcaster {
        &self.broadcaster
    }
}

impl ProgressReporter for BoardProgress {
    fn report(&self, event: JobProgressEvent) {
        self.board.apply(&event);
        self.broadcaster.send(event);
    }
}
