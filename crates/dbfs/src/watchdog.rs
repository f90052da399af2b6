//! Idle timer for open streams

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// Time of the last recorded stream activity
#[derive(Clone)]
pub(crate) struct Activity(Arc<Mutex<Instant>>);

impl Activity {
    fn new() -> Self {
        Activity(Arc::new(Mutex::new(Instant::now())))
    }

    fn touch(&self) {
        *self.0.lock().unwrap_or_else(|e| e.into_inner()) = Instant::now();
    }

    pub(crate) fn idle(&self) -> Duration {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).elapsed()
    }
}

/// Runs a callback once no activity has been recorded for `timeout`.
///
/// The timer lives on the tokio runtime the store was opened on. The
/// callback runs on the blocking pool since it touches the database. It is
/// handed the activity clock so it can check again under its own locks, and
/// returns false to re-arm the timer when the stream turned out to be busy.
pub(crate) struct Watchdog {
    activity: Activity,
    task: JoinHandle<()>,
}

impl Watchdog {
    pub(crate) fn start<F>(runtime: &Handle, timeout: Duration, on_idle: F) -> Self
    where
        F: FnMut(&Activity) -> bool + Send + 'static,
    {
        let activity = Activity::new();
        let clock = activity.clone();
        let task = runtime.spawn(async move {
            let mut on_idle = on_idle;
            loop {
                let idle = clock.idle();
                if idle < timeout {
                    tokio::time::sleep(timeout - idle).await;
                    continue;
                }
                diagnostics::debug!("Stream idle for {ms}ms", ms: idle.as_millis() as u64);
                let seen = clock.clone();
                let fired = tokio::task::spawn_blocking(move || {
                    let done = on_idle(&seen);
                    (on_idle, done)
                })
                .await;
                match fired {
                    Ok((_, true)) => break,
                    Ok((callback, false)) => on_idle = callback,
                    Err(err) => {
                        diagnostics::error!("Idle callback failed: {error}", error: err.to_string());
                        break;
                    }
                }
            }
        });
        Watchdog { activity, task }
    }

    /// Records activity, pushing the deadline back
    pub(crate) fn watch(&self) {
        self.activity.touch();
    }

    pub(crate) fn cancel(&self) {
        self.task.abort();
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.cancel();
    }
}
