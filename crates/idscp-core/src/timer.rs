//! Re-armable timers.
//!
//! A timer schedules one callback after a delay on the session's tokio
//! runtime. Arming an armed timer replaces the pending expiry; cancelling an
//! idle timer is a no-op.
//!
//! Expiry races with the FSM: a timer can fire just as a transition cancels
//! it. Every arm hands out a fresh [`TimerTicket`] and the callback receives
//! it. The FSM compares the ticket with [`is_current`](StaticTimer::is_current)
//! under the transition lock and drops expiries whose ticket has been
//! superseded by a cancel or a re-arm.

use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use parking_lot::Mutex;
use tokio::{runtime::Handle, task::JoinHandle};

/// Identifies one arming of a timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerTicket(u64);

/// Expiry callback. Runs on the runtime's blocking pool.
pub type TimerCallback = Arc<dyn Fn(TimerTicket) + Send + Sync>;

struct TimerCore {
    runtime: Handle,
    generation: AtomicU64,
    task: Mutex<Option<JoinHandle<()>>>,
    callback: TimerCallback,
}

impl TimerCore {
    fn new(runtime: Handle, callback: TimerCallback) -> Self {
        Self { runtime, generation: AtomicU64::new(0), task: Mutex::new(None), callback }
    }

    fn arm(&self, delay: Duration) {
        let mut task = self.task.lock();
        if let Some(pending) = task.take() {
            pending.abort();
        }

        let ticket = TimerTicket(self.generation.fetch_add(1, Ordering::SeqCst) + 1);
        let callback = Arc::clone(&self.callback);
        *task = Some(self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            // The callback takes the FSM lock, keep it off the async workers.
            drop(tokio::task::spawn_blocking(move || callback(ticket)));
        }));
    }

    fn cancel(&self) {
        let mut task = self.task.lock();
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(pending) = task.take() {
            pending.abort();
        }
    }

    fn is_current(&self, ticket: TimerTicket) -> bool {
        self.generation.load(Ordering::SeqCst) == ticket.0
    }
}

/// Timer with a fixed delay.
pub struct StaticTimer {
    core: TimerCore,
    delay: Duration,
}

impl StaticTimer {
    /// Create an idle timer.
    pub fn new(runtime: Handle, delay: Duration, callback: TimerCallback) -> Self {
        Self { core: TimerCore::new(runtime, callback), delay }
    }

    /// Arm the timer, replacing a pending expiry.
    pub fn start(&self) {
        self.core.arm(self.delay);
    }

    /// Cancel a pending expiry and arm again.
    pub fn reset(&self) {
        self.core.cancel();
        self.core.arm(self.delay);
    }

    /// Cancel a pending expiry.
    pub fn cancel(&self) {
        self.core.cancel();
    }

    /// Whether `ticket` belongs to the latest arming and was not cancelled.
    pub fn is_current(&self, ticket: TimerTicket) -> bool {
        self.core.is_current(ticket)
    }

    /// Configured delay.
    pub fn delay(&self) -> Duration {
        self.delay
    }
}

impl fmt::Debug for StaticTimer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticTimer").field("delay", &self.delay).finish_non_exhaustive()
    }
}

/// Timer whose delay is supplied on every arm.
///
/// Used for token expiry: the delay is the remaining validity reported by
/// the token service.
pub struct DynamicTimer {
    core: TimerCore,
}

impl DynamicTimer {
    /// Create an idle timer.
    pub fn new(runtime: Handle, callback: TimerCallback) -> Self {
        Self { core: TimerCore::new(runtime, callback) }
    }

    /// Arm the timer with `delay`, replacing a pending expiry.
    pub fn start(&self, delay: Duration) {
        self.core.arm(delay);
    }

    /// Cancel a pending expiry.
    pub fn cancel(&self) {
        self.core.cancel();
    }

    /// Whether `ticket` belongs to the latest arming and was not cancelled.
    pub fn is_current(&self, ticket: TimerTicket) -> bool {
        self.core.is_current(ticket)
    }
}

impl fmt::Debug for DynamicTimer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicTimer").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    fn counting() -> (Arc<AtomicUsize>, Arc<Mutex<Vec<TimerTicket>>>, TimerCallback) {
        let count = Arc::new(AtomicUsize::new(0));
        let tickets = Arc::new(Mutex::new(Vec::new()));
        let callback: TimerCallback = {
            let count = Arc::clone(&count);
            let tickets = Arc::clone(&tickets);
            Arc::new(move |ticket| {
                count.fetch_add(1, Ordering::SeqCst);
                tickets.lock().push(ticket);
            })
        };
        (count, tickets, callback)
    }

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_multi_thread().worker_threads(1).enable_time().build().unwrap()
    }

    #[test]
    fn fires_once_with_current_ticket() {
        let rt = runtime();
        let (count, tickets, callback) = counting();
        let timer = StaticTimer::new(rt.handle().clone(), Duration::from_millis(20), callback);

        timer.start();
        std::thread::sleep(Duration::from_millis(200));

        assert_eq!(count.load(Ordering::SeqCst), 1);
        let fired = tickets.lock()[0];
        assert!(timer.is_current(fired));
    }

    #[test]
    fn cancel_prevents_expiry_and_invalidates_ticket() {
        let rt = runtime();
        let (count, _, callback) = counting();
        let timer = StaticTimer::new(rt.handle().clone(), Duration::from_millis(50), callback);

        timer.start();
        timer.cancel();
        std::thread::sleep(Duration::from_millis(200));

        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert!(!timer.is_current(TimerTicket(1)));
    }

    #[test]
    fn cancel_on_idle_timer_is_noop() {
        let rt = runtime();
        let (count, _, callback) = counting();
        let timer = DynamicTimer::new(rt.handle().clone(), callback);

        timer.cancel();
        timer.cancel();
        std::thread::sleep(Duration::from_millis(50));

        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn rearm_supersedes_previous_ticket() {
        let rt = runtime();
        let (count, tickets, callback) = counting();
        let timer = DynamicTimer::new(rt.handle().clone(), callback);

        timer.start(Duration::from_millis(500));
        timer.start(Duration::from_millis(20));
        std::thread::sleep(Duration::from_millis(200));

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(tickets.lock()[0], TimerTicket(2));
        assert!(timer.is_current(TimerTicket(2)));
        assert!(!timer.is_current(TimerTicket(1)));
    }

    #[test]
    fn reset_restarts_the_delay() {
        let rt = runtime();
        let (count, _, callback) = counting();
        let timer = StaticTimer::new(rt.handle().clone(), Duration::from_millis(150), callback);

        timer.start();
        std::thread::sleep(Duration::from_millis(100));
        timer.reset();
        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(count.load(Ordering::SeqCst), 0);

        std::thread::sleep(Duration::from_millis(300));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
