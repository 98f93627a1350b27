use rand::rngs::SmallRng;
use rand::SeedableRng;
use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use tracing::error;

/// Per-worker context handed to every task. The RNG is seeded once at pool
/// creation from the pool seed and the worker index; a worker runs one task
/// at a time, so tasks may use it without synchronization.
pub struct WorkerCtx {
    pub index: usize,
    pub rng: SmallRng,
}

pub type Task = Box<dyn FnOnce(&mut WorkerCtx) + Send + 'static>;

struct PoolState {
    queue: VecDeque<Task>,
    pending: usize,
    active: usize,
    shutdown: bool,
}

struct Shared {
    state: Mutex<PoolState>,
    work_available: Condvar,
    all_idle: Condvar,
}

/// Fixed-size worker set consuming a single FIFO task queue.
///
/// `wait()` blocks until every previously submitted task has completed,
/// which establishes the happens-before edge from parallel phase writes into
/// the serial code that follows.
pub struct WorkerPool {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
    size: usize,
}

impl WorkerPool {
    /// Spawn `size` workers. Worker `i`'s RNG seed is a fixed odd-constant
    /// mix of `seed` and `i`, so runs with the same seed vector and
    /// task-to-worker mapping reproduce.
    pub fn new(size: usize, seed: u64) -> Self {
        assert!(size >= 1, "worker pool requires at least one worker");
        let shared = Arc::new(Shared {
            state: Mutex::new(PoolState {
                queue: VecDeque::new(),
                pending: 0,
                active: 0,
                shutdown: false,
            }),
            work_available: Condvar::new(),
            all_idle: Condvar::new(),
        });

        let workers = (0..size)
            .map(|index| {
                let shared = Arc::clone(&shared);
                let worker_seed = seed
                    .wrapping_add(index as u64)
                    .wrapping_mul(0x517C_C1B7_2722_0A95)
                    .wrapping_add(0x9E37_79B9_7F4A_7C15);
                std::thread::spawn(move || {
                    let mut ctx = WorkerCtx {
                        index,
                        rng: SmallRng::seed_from_u64(worker_seed),
                    };
                    worker_loop(&shared, &mut ctx);
                })
            })
            .collect();

        Self {
            shared,
            workers,
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Append a task and wake one worker. Tasks submitted after `shutdown`
    /// are dropped; returns whether the task was accepted.
    pub fn submit(&self, task: Task) -> bool {
        let mut state = self.shared.state.lock().expect("pool mutex poisoned");
        if state.shutdown {
            return false;
        }
        state.queue.push_back(task);
        state.pending += 1;
        drop(state);
        self.shared.work_available.notify_one();
        true
    }

    /// Block until the queue is drained and no task is running.
    pub fn wait(&self) {
        let mut state = self.shared.state.lock().expect("pool mutex poisoned");
        while state.pending > 0 || state.active > 0 {
            state = self
                .shared
                .all_idle
                .wait(state)
                .expect("pool mutex poisoned");
        }
    }

    /// Drain remaining tasks, then join every worker. In-flight and queued
    /// tasks complete; only work submitted afterwards is refused.
    pub fn shutdown(&mut self) {
        {
            let mut state = self.shared.state.lock().expect("pool mutex poisoned");
            if state.shutdown {
                return;
            }
            state.shutdown = true;
        }
        self.shared.work_available.notify_all();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(shared: &Shared, ctx: &mut WorkerCtx) {
    loop {
        let task = {
            let mut state = shared.state.lock().expect("pool mutex poisoned");
            loop {
                if let Some(task) = state.queue.pop_front() {
                    state.pending -= 1;
                    state.active += 1;
                    break task;
                }
                if state.shutdown {
                    return;
                }
                state = shared
                    .work_available
                    .wait(state)
                    .expect("pool mutex poisoned");
            }
        };

        // Task failures never unwind into the engine; they are logged and
        // the tick proceeds as if the task were a no-op.
        if let Err(panic) = catch_unwind(AssertUnwindSafe(|| task(ctx))) {
            let msg = panic
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "opaque panic payload".to_string());
            error!(worker = ctx.index, %msg, "task panicked; suppressed");
        }

        let mut state = shared.state.lock().expect("pool mutex poisoned");
        state.active -= 1;
        if state.pending == 0 && state.active == 0 {
            drop(state);
            shared.all_idle.notify_all();
        }
    }
}
