use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use anyhow::Context;
use tokio::{
    runtime::Runtime,
    sync::mpsc::{self, UnboundedReceiver, UnboundedSender},
    task::{AbortHandle, JoinHandle},
};

use crate::model::ModelPrefab;

pub type LoadId = u64;

pub enum LoadOutcome {
    Loaded(ModelPrefab),
    Failed(anyhow::Error),
}

pub struct LoadEvent {
    pub id: LoadId,
    pub path: PathBuf,
    pub outcome: LoadOutcome,
}

/// A load in flight. Dropping the handle does not cancel the load.
pub struct LoadHandle {
    pub id: LoadId,
    pub path: PathBuf,
    task: JoinHandle<()>,
}

impl LoadHandle {
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Imports glTF files on tokio's blocking pool and hands the results back to
/// the main thread through [`AssetLoader::poll`].
pub struct AssetLoader {
    runtime: Runtime,
    sender: UnboundedSender<LoadEvent>,
    receiver: UnboundedReceiver<LoadEvent>,
    next_id: LoadId,
    /// Cancelled loads whose outcome may still arrive on the channel.
    cancelled: HashMap<LoadId, AbortHandle>,
}

impl AssetLoader {
    pub fn new() -> anyhow::Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("asset-loader")
            .build()
            .context("Failed to start asset loader runtime")?;

        let (sender, receiver) = mpsc::unbounded_channel();

        Ok(Self {
            runtime,
            sender,
            receiver,
            next_id: 0,
            cancelled: HashMap::new(),
        })
    }

    pub fn load(&mut self, path: impl AsRef<Path>) -> LoadHandle {
        let path = path.as_ref().to_path_buf();
        let id = self.next_id;
        self.next_id += 1;

        log::info!("Loading model {}", path.display());

        let sender = self.sender.clone();
        let task_path = path.clone();
        let task = self.runtime.spawn(async move {
            let import_path = task_path.clone();
            let outcome = match tokio::task::spawn_blocking(move || {
                ModelPrefab::import(&import_path)
            })
            .await
            {
                Ok(Ok(prefab)) => LoadOutcome::Loaded(prefab),
                Ok(Err(error)) => LoadOutcome::Failed(error),
                Err(join_error) => LoadOutcome::Failed(anyhow::anyhow!(
                    "Model import task failed: {join_error}"
                )),
            };

            // The receiver only goes away with the loader itself.
            let _ = sender.send(LoadEvent {
                id,
                path: task_path,
                outcome,
            });
        });

        LoadHandle { id, path, task }
    }

    /// Aborts a pending load. Its outcome will not be reported even if the
    /// import already finished.
    pub fn cancel(&mut self, handle: &LoadHandle) {
        handle.task.abort();
        self.cancelled
            .insert(handle.id, handle.task.abort_handle());
        log::info!("Cancelled model load {}", handle.path.display());
    }

    /// Returns the loads that finished since the last call, without blocking.
    pub fn poll(&mut self) -> Vec<LoadEvent> {
        // A finished task has already sent whatever it was going to send, so
        // after this drain nothing more can arrive for these ids.
        let finished: Vec<LoadId> = self
            .cancelled
            .iter()
            .filter(|(_, task)| task.is_finished())
            .map(|(&id, _)| id)
            .collect();

        let mut events = Vec::new();

        while let Ok(event) = self.receiver.try_recv() {
            if self.cancelled.remove(&event.id).is_some() {
                continue;
            }
            events.push(event);
        }

        for id in finished {
            self.cancelled.remove(&id);
        }

        events
    }

    #[cfg(test)]
    pub fn cancelled_count(&self) -> usize {
        self.cancelled.len()
    }

    /// Blocks until the next reported outcome. Only for callers outside the runtime.
    #[cfg(test)]
    pub fn wait(&mut self) -> Option<LoadEvent> {
        loop {
            let event = self.receiver.blocking_recv()?;
            if self.cancelled.remove(&event.id).is_none() {
                return Some(event);
            }
        }
    }
}
