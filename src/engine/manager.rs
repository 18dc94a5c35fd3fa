use std::sync::mpsc::{self, Sender, SyncSender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crate::driver::ConnectionDriver;
use crate::error::FanoutError;
use crate::location::Location;

use super::channel::{Command, Completion, WorkItem};
use super::dispatcher::run_worker;

/// One dedicated thread per Location, fed through a bounded FIFO queue.
pub(super) struct Worker {
    sender: SyncSender<Command>,
    thread: Option<JoinHandle<()>>,
}

impl Worker {
    pub(super) fn spawn<D: ConnectionDriver>(
        id: usize,
        driver: Arc<D>,
        location: Location,
        handle: Arc<Mutex<D::Handle>>,
        capacity: usize,
        completions: Sender<Completion>,
    ) -> Result<Self, FanoutError> {
        let (sender, receiver) = mpsc::sync_channel::<Command>(capacity);
        let thread = thread::Builder::new()
            .name(format!("fanout-worker-{id}"))
            .spawn(move || {
                run_worker(&*driver, &location, &handle, &receiver, &completions);
            })
            .map_err(|err| {
                FanoutError::ConnectionError(format!("failed to spawn worker thread: {err}"))
            })?;

        Ok(Self {
            sender,
            thread: Some(thread),
        })
    }

    /// Blocks while the queue is full. Hands the item back if the worker is gone.
    pub(super) fn push(&self, item: WorkItem) -> Result<(), Option<WorkItem>> {
        self.sender
            .send(Command::Run(item))
            .map_err(|rejected| match rejected.0 {
                Command::Run(item) => Some(item),
                Command::Shutdown => None,
            })
    }

    /// Send the end-of-work signal and wait for the thread to exit.
    pub(super) fn stop(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        let _ = self.sender.send(Command::Shutdown);
        if thread.join().is_err() {
            tracing::warn!("worker thread panicked");
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.stop();
    }
}
