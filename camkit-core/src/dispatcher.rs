use std::{
    cell::RefCell,
    collections::VecDeque,
    sync::{Arc, Condvar, Mutex},
    thread::ThreadId,
    time::Duration,
};

use crossbeam_queue::SegQueue;
use log::warn;

use crate::{time, timer::TimerCore};

type Invocation = Box<dyn FnOnce() + Send>;

/// Per-thread event dispatcher.
///
/// Each thread that participates in the framework owns exactly one dispatcher,
/// created lazily by [`EventDispatcher::instance`]. The dispatcher carries the
/// thread's message inbox and the set of armed timers; [`process_events`]
/// performs one round of dispatch and is the only blocking primitive in the
/// framework.
///
/// Handles are cheap clones of the same dispatcher and may be shared across
/// threads to post messages or register timers; only `process_events` is
/// restricted to the owning thread.
///
/// [`process_events`]: EventDispatcher::process_events
#[derive(Clone)]
pub struct EventDispatcher {
    inner: Arc<Inner>,
}

struct Inner {
    thread: ThreadId,
    messages: SegQueue<Invocation>,
    timers: Mutex<Vec<Arc<TimerCore>>>,
    sleep: Mutex<()>,
    wake: Condvar,
}

thread_local! {
    static CURRENT: RefCell<Option<EventDispatcher>> = const { RefCell::new(None) };
}

impl EventDispatcher {
    fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                thread: std::thread::current().id(),
                messages: SegQueue::new(),
                timers: Mutex::new(Vec::new()),
                sleep: Mutex::new(()),
                wake: Condvar::new(),
            }),
        }
    }

    /// The calling thread's dispatcher, created on first use.
    pub fn instance() -> EventDispatcher {
        CURRENT.with(|current| {
            current
                .borrow_mut()
                .get_or_insert_with(EventDispatcher::new)
                .clone()
        })
    }

    /// Whether the calling thread is the one this dispatcher serves.
    pub fn is_current(&self) -> bool {
        std::thread::current().id() == self.inner.thread
    }

    pub fn thread_id(&self) -> ThreadId {
        self.inner.thread
    }

    pub fn same_thread(&self, other: &EventDispatcher) -> bool {
        self.inner.thread == other.inner.thread
    }

    /// Post an erased invocation to this dispatcher's thread.
    ///
    /// The invocation runs during that thread's next dispatch round, in
    /// posting order.
    pub fn post<F>(&self, invocation: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.inner.messages.push(Box::new(invocation));
        let _guard = self.inner.sleep.lock().unwrap();
        self.inner.wake.notify_one();
    }

    /// Wake the dispatcher out of its blocking wait without posting work.
    pub fn interrupt(&self) {
        let _guard = self.inner.sleep.lock().unwrap();
        self.inner.wake.notify_one();
    }

    /// Perform one round of dispatch.
    ///
    /// Drains the message inbox; when that found nothing to do, blocks until
    /// the earliest timer deadline or the arrival of a new message. Expired
    /// timers then fire exactly once each. Must be called from the owning
    /// thread.
    pub fn process_events(&self) {
        if !self.is_current() {
            warn!("process_events() called from a foreign thread, ignoring");
            return;
        }

        if self.dispatch_messages() == 0 {
            self.wait();
            self.dispatch_messages();
        }
        self.fire_expired_timers();
    }

    fn dispatch_messages(&self) -> usize {
        // Bound the round to the messages present on entry so that slots
        // posting new work cannot starve timer dispatch.
        let pending = self.inner.messages.len();
        let mut batch = VecDeque::with_capacity(pending);
        for _ in 0..pending {
            match self.inner.messages.pop() {
                Some(invocation) => batch.push_back(invocation),
                None => break,
            }
        }

        let count = batch.len();
        for invocation in batch {
            invocation();
        }
        count
    }

    fn wait(&self) {
        let mut guard = self.inner.sleep.lock().unwrap();

        loop {
            if !self.inner.messages.is_empty() {
                return;
            }

            match self.earliest_deadline() {
                Some(deadline) => {
                    let now = time::clock_ns();
                    if deadline <= now {
                        return;
                    }

                    let timeout = Duration::from_nanos(deadline - now);
                    let (g, result) = self.inner.wake.wait_timeout(guard, timeout).unwrap();
                    guard = g;
                    if result.timed_out() {
                        return;
                    }
                }
                None => {
                    guard = self.inner.wake.wait(guard).unwrap();
                    // Re-registration or message arrival, re-evaluate.
                    if self.inner.messages.is_empty() && self.earliest_deadline().is_none() {
                        return;
                    }
                }
            }
        }
    }

    fn earliest_deadline(&self) -> Option<u64> {
        let timers = self.inner.timers.lock().unwrap();
        timers.iter().map(|t| t.deadline()).filter(|d| *d != 0).min()
    }

    fn fire_expired_timers(&self) {
        let now = time::clock_ns();
        let expired: Vec<Arc<TimerCore>> = {
            let mut timers = self.inner.timers.lock().unwrap();
            let mut expired = Vec::new();
            timers.retain(|timer| {
                let deadline = timer.deadline();
                if deadline != 0 && deadline <= now {
                    expired.push(timer.clone());
                    false
                } else {
                    deadline != 0
                }
            });
            expired
        };

        for timer in expired {
            timer.fire();
        }
    }

    pub(crate) fn register_timer(&self, timer: &Arc<TimerCore>) {
        {
            let mut timers = self.inner.timers.lock().unwrap();
            if !timers.iter().any(|t| Arc::ptr_eq(t, timer)) {
                timers.push(timer.clone());
            }
        }

        // The new deadline may be earlier than the one the dispatcher is
        // currently sleeping on.
        self.interrupt();
    }

    pub(crate) fn unregister_timer(&self, timer: &Arc<TimerCore>) {
        let mut timers = self.inner.timers.lock().unwrap();
        timers.retain(|t| !Arc::ptr_eq(t, timer));
    }
}
