//! Resource limiting for the in-process Lua VM.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use mlua::{HookTriggers, Lua, VmState};

/// Shared flag the supervisor flips to abort a running chunk.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Instruction hook that stops a chunk at its deadline.
///
/// The hook fires every `interval` VM instructions, so a script spinning in a
/// pure-Lua loop cannot outrun the check.
#[derive(Debug, Clone)]
pub struct ExecutionGuard {
    /// `None` when the deadline lies past what `Instant` can represent.
    deadline: Option<Instant>,
    timeout: Duration,
    interval: u32,
    cancel: CancelHandle,
    timed_out: Arc<AtomicBool>,
    instructions: Arc<AtomicU64>,
}

impl ExecutionGuard {
    /// Create a guard whose deadline is `timeout` from now.
    pub fn new(timeout: Duration, interval: u32) -> Self {
        Self {
            deadline: Instant::now().checked_add(timeout),
            timeout,
            interval: interval.max(1),
            cancel: CancelHandle::default(),
            timed_out: Arc::new(AtomicBool::new(false)),
            instructions: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Whether the hook stopped the chunk.
    pub fn timed_out(&self) -> bool {
        self.timed_out.load(Ordering::SeqCst)
    }

    /// Approximate number of instructions executed, rounded to the interval.
    pub fn instructions(&self) -> u64 {
        self.instructions.load(Ordering::Relaxed)
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn should_stop(&self) -> bool {
        self.cancel.is_cancelled() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Install the hook on `lua`.
    pub fn install(&self, lua: &Lua) {
        let guard = self.clone();
        lua.set_hook(
            HookTriggers::new().every_nth_instruction(self.interval),
            move |_lua, _debug| {
                guard
                    .instructions
                    .fetch_add(u64::from(guard.interval), Ordering::Relaxed);
                if guard.should_stop() {
                    guard.timed_out.store(true, Ordering::SeqCst);
                    Err(mlua::Error::RuntimeError(format!(
                        "execution timed out after {:?}",
                        guard.timeout
                    )))
                } else {
                    Ok(VmState::Continue)
                }
            },
        );
    }
}

/// Cap the Lua heap. Allocations past the limit raise a memory error in the script.
pub fn apply_memory_limit(lua: &Lua, max_memory: usize) -> mlua::Result<()> {
    lua.set_memory_limit(max_memory)?;
    Ok(())
}
