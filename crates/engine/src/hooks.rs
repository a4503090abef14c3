//! Protection hooks: third-party claim or zone checks that veto deletion.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::HookError;
use crate::world::ChunkPos;

/// A source of "this chunk must never be deleted" answers.
pub trait ProtectionHook: Send + Sync {
    fn name(&self) -> &str;

    fn is_chunk_protected(&self, world: &str, chunk_x: i32, chunk_z: i32) -> anyhow::Result<bool>;

    /// Whether the hook may be queried from a deletion worker. Hooks that are
    /// not are routed through the `MainThread` executor.
    fn is_async_capable(&self) -> bool {
        false
    }
}

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Handle for running closures on the host thread that owns the stores
/// non-async hooks read from.
pub struct MainThread {
    jobs: Mutex<Sender<Job>>,
}

/// Receiving end of a `MainThread`, drained by the host thread.
pub struct MainThreadQueue {
    jobs: Receiver<Job>,
}

impl MainThread {
    pub fn channel() -> (MainThread, MainThreadQueue) {
        let (sender, receiver) = mpsc::channel();
        (
            MainThread {
                jobs: Mutex::new(sender),
            },
            MainThreadQueue { jobs: receiver },
        )
    }

    /// Run `f` on the host thread and wait for its result.
    pub fn call<R, F>(&self, f: F) -> Result<R, HookError>
    where
        R: Send + 'static,
        F: FnOnce() -> R + Send + 'static,
    {
        let (result_tx, result_rx) = mpsc::sync_channel(1);
        let job: Job = Box::new(move || {
            let _ = result_tx.send(f());
        });
        self.jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .send(job)
            .map_err(|_| HookError::MainThreadUnavailable)?;
        result_rx.recv().map_err(|_| HookError::MainThreadUnavailable)
    }
}

impl MainThreadQueue {
    /// Run jobs until every `MainThread` handle is dropped.
    pub fn run(self) {
        for job in self.jobs {
            job();
        }
    }
}

/// Registered hooks, queried in registration order.
#[derive(Default)]
pub struct HookRegistry {
    hooks: Vec<Arc<dyn ProtectionHook>>,
    main_thread: Option<MainThread>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, hook: Arc<dyn ProtectionHook>) {
        tracing::info!("Enabled protection hook for {}", hook.name());
        self.hooks.push(hook);
    }

    /// Route non-async hooks through `main_thread` instead of calling them
    /// on the worker.
    pub fn attach_main_thread(&mut self, main_thread: MainThread) {
        self.main_thread = Some(main_thread);
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.hooks.iter().map(|hook| hook.name())
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// True as soon as any hook reports the chunk protected.
    pub fn is_protected(&self, world: &str, chunk: ChunkPos) -> Result<bool, HookError> {
        for hook in &self.hooks {
            if self.query(hook, world, chunk)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn query(&self, hook: &Arc<dyn ProtectionHook>, world: &str, chunk: ChunkPos) -> Result<bool, HookError> {
        let result = match &self.main_thread {
            Some(main_thread) if !hook.is_async_capable() => {
                let hook = Arc::clone(hook);
                let world = world.to_owned();
                main_thread.call(move || hook.is_chunk_protected(&world, chunk.x, chunk.z))?
            }
            _ => hook.is_chunk_protected(world, chunk.x, chunk.z),
        };
        result.map_err(|e| HookError::Hook {
            name: hook.name().to_string(),
            source: e.into(),
        })
    }
}
