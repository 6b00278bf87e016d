//! Background thread that runs merge passes for a while after each wakeup.
//!
//! The thread holds a countdown. [`MergeThread::wakeup`] resets it to the
//! active window; every firing runs one merge step and subtracts one period.
//! Once the countdown reaches zero the thread sleeps on its condition
//! variable until the next wakeup, so an idle log costs no CPU.

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tracing::debug;

use crate::config::TraceConfig;
use crate::merger::Merger;

/// One unit of work the merge thread runs per firing.
pub trait MergeStep: Send + 'static {
    fn merge_step(&mut self);
}

impl MergeStep for Merger {
    fn merge_step(&mut self) {
        self.merge();
    }
}

struct TimerState {
    remaining: Duration,
    exit: bool,
}

struct Shared {
    state: Mutex<TimerState>,
    signal: Condvar,
}

/// Handle on the merge thread. Dropping it stops and joins the thread,
/// without waiting out the active window.
pub struct MergeThread {
    shared: Arc<Shared>,
    window: Duration,
    handle: Option<JoinHandle<()>>,
}

impl MergeThread {
    /// Spawns the thread, initially idle.
    pub fn spawn<T: MergeStep>(step: Arc<Mutex<T>>, period: Duration, window: Duration) -> io::Result<Self> {
        let shared = Arc::new(Shared {
            state: Mutex::new(TimerState {
                remaining: Duration::ZERO,
                exit: false,
            }),
            signal: Condvar::new(),
        });

        let thread_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name("event-trace-merge".to_string())
            .spawn(move || merge_loop(&thread_shared, &step, period))?;

        Ok(Self {
            shared,
            window,
            handle: Some(handle),
        })
    }

    pub fn from_config<T: MergeStep>(step: Arc<Mutex<T>>, config: &TraceConfig) -> io::Result<Self> {
        Self::spawn(step, config.merge_period, config.wakeup_window)
    }

    /// Restarts the active window.
    pub fn wakeup(&self) {
        self.set_timeout(self.window);
    }

    /// Sets the remaining active time. Zero stops firing.
    pub fn set_timeout(&self, timeout: Duration) {
        let mut state = self.shared.state.lock();
        state.remaining = timeout;
        self.shared.signal.notify_one();
    }
}

fn merge_loop<T: MergeStep>(shared: &Shared, step: &Mutex<T>, period: Duration) {
    loop {
        let fire = {
            let mut state = shared.state.lock();
            if state.exit {
                break;
            }
            if state.remaining > Duration::ZERO {
                shared.signal.wait_for(&mut state, period);
            } else {
                shared.signal.wait(&mut state);
            }
            if state.exit {
                break;
            }
            let fire = state.remaining > Duration::ZERO;
            state.remaining = state.remaining.saturating_sub(period);
            fire
        };
        if fire {
            step.lock().merge_step();
        }
    }
    debug!("Merge thread exiting");
}

impl Drop for MergeThread {
    fn drop(&mut self) {
        {
            let mut state = self.shared.state.lock();
            state.exit = true;
            state.remaining = Duration::ZERO;
            self.shared.signal.notify_one();
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
