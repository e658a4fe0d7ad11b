use std::sync::{Arc, Mutex, Weak};

use log::warn;

use crate::{
    dispatcher::EventDispatcher,
    object::{invoke, move_to_thread, Message, Object, ObjectCore},
    signal::{ConnectionType, Signal},
    time,
};

/// Single-shot timer.
///
/// Started with [`start`], the timer registers with its owning thread's event
/// dispatcher and emits [`timeout`] once the deadline elapses, exclusively
/// from that thread's `process_events`. Starting an armed timer silently
/// restarts it. After [`stop`] returns, no `timeout` emission from the
/// previous arming can be observed. Periodic behavior is built by re-arming
/// from the slot.
///
/// [`start`]: Timer::start
/// [`stop`]: Timer::stop
/// [`timeout`]: Timer::timeout
pub struct Timer {
    core: Arc<TimerCore>,
}

pub struct TimerCore {
    object: ObjectCore,
    state: Mutex<TimerState>,
    timeout: Signal<()>,
    self_weak: Weak<TimerCore>,
}

struct TimerState {
    interval_ms: u64,
    deadline_ns: u64,
    registered: Option<EventDispatcher>,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            core: Arc::new_cyclic(|weak| TimerCore {
                object: ObjectCore::new(),
                state: Mutex::new(TimerState {
                    interval_ms: 0,
                    deadline_ns: 0,
                    registered: None,
                }),
                timeout: Signal::new(),
                self_weak: weak.clone(),
            }),
        }
    }

    /// Start or restart the timer with a timeout of `msec` milliseconds.
    pub fn start(&self, msec: u64) {
        self.core.start(msec);
    }

    /// Stop the timer.
    ///
    /// No `timeout` signal from the current arming is emitted after this
    /// returns. A no-op when the timer is not running.
    pub fn stop(&self) {
        self.core.stop();
    }

    pub fn is_running(&self) -> bool {
        self.core.deadline() != 0
    }

    /// The interval of the last arming, in milliseconds.
    pub fn interval(&self) -> u64 {
        self.core.state.lock().unwrap().interval_ms
    }

    /// The current deadline in monotonic nanoseconds, 0 when idle.
    pub fn deadline(&self) -> u64 {
        self.core.deadline()
    }

    pub fn timeout(&self) -> &Signal<()> {
        &self.core.timeout
    }

    /// Reparent the timer onto the thread served by `dispatcher`.
    ///
    /// An armed timer stays armed; its pending deadline fires on the new
    /// thread only.
    pub fn move_to_thread(&self, dispatcher: &EventDispatcher) {
        move_to_thread(&self.core, dispatcher);
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.core.stop();
    }
}

impl TimerCore {
    fn start(&self, msec: u64) {
        let dispatcher = self.object.dispatcher();
        if !dispatcher.is_current() {
            warn!("timer started from a thread it does not belong to");
        }

        let old = {
            let mut state = self.state.lock().unwrap();
            state.interval_ms = msec;
            state.deadline_ns = time::clock_ns() + msec * time::NSEC_PER_MSEC;
            state.registered.replace(dispatcher.clone())
        };

        if let Some(old) = old {
            if !old.same_thread(&dispatcher) {
                old.unregister_timer(&self.arc());
            }
        }

        dispatcher.register_timer(&self.arc());
    }

    fn stop(&self) {
        let registered = {
            let mut state = self.state.lock().unwrap();
            state.deadline_ns = 0;
            state.registered.take()
        };

        if let Some(dispatcher) = registered {
            dispatcher.unregister_timer(&self.arc());
        }
    }

    pub(crate) fn deadline(&self) -> u64 {
        self.state.lock().unwrap().deadline_ns
    }

    /// Called by the dispatcher once the deadline has expired.
    pub(crate) fn fire(&self) {
        let expired = {
            let mut state = self.state.lock().unwrap();
            if state.deadline_ns == 0 {
                false
            } else {
                state.deadline_ns = 0;
                state.registered = None;
                true
            }
        };

        if expired {
            self.timeout.emit(());
        }
    }

    fn reregister(&self) {
        let dispatcher = self.object.dispatcher();
        let armed = {
            let mut state = self.state.lock().unwrap();
            if state.deadline_ns != 0 {
                state.registered = Some(dispatcher.clone());
                true
            } else {
                false
            }
        };

        if armed {
            dispatcher.register_timer(&self.arc());
        }
    }

    fn arc(&self) -> Arc<TimerCore> {
        self.self_weak.upgrade().expect("timer invoked after drop")
    }
}

impl Object for TimerCore {
    fn object_core(&self) -> &ObjectCore {
        &self.object
    }

    fn message(&self, msg: &Message) {
        match msg {
            Message::ThreadMove => {
                // Leave the old thread's dispatcher immediately; registration
                // on the new thread must happen on the new thread.
                let old = self.state.lock().unwrap().registered.take();
                if let Some(dispatcher) = old {
                    dispatcher.unregister_timer(&self.arc());
                    invoke(&self.arc(), ConnectionType::Queued, |timer| {
                        timer.reregister()
                    });
                }
            }
        }
    }
}
