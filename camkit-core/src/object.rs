use std::sync::{Arc, Mutex};

use crate::{dispatcher::EventDispatcher, signal::ConnectionType};

/// Notifications delivered through an object's [`Object::message`] hook.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Message {
    /// The object's thread affinity has just changed. Resources registered
    /// with the previous thread's dispatcher must migrate.
    ThreadMove,
}

/// A framework object with thread affinity.
///
/// Every object belongs to exactly one thread at a time, inherited from an
/// optional parent at construction and changed with [`move_to_thread`]. The
/// affinity decides where queued invocations and queued signal deliveries for
/// the object run.
pub trait Object: Send + Sync + 'static {
    fn object_core(&self) -> &ObjectCore;

    /// Hook invoked for framework notifications, see [`Message`].
    fn message(&self, msg: &Message) {
        let _ = msg;
    }
}

/// The embedded state every [`Object`] carries: a handle to the dispatcher of
/// the thread the object currently belongs to.
pub struct ObjectCore {
    dispatcher: Mutex<EventDispatcher>,
}

impl ObjectCore {
    /// Bind to the calling thread.
    pub fn new() -> Self {
        Self {
            dispatcher: Mutex::new(EventDispatcher::instance()),
        }
    }

    /// Inherit the thread affinity of `parent`.
    pub fn with_parent(parent: &dyn Object) -> Self {
        Self {
            dispatcher: Mutex::new(parent.object_core().dispatcher()),
        }
    }

    pub fn dispatcher(&self) -> EventDispatcher {
        self.dispatcher.lock().unwrap().clone()
    }
}

impl Default for ObjectCore {
    fn default() -> Self {
        Self::new()
    }
}

/// Invoke `func` on `obj` with the given delivery policy.
///
/// `Auto` runs inline when the caller is already on the object's thread and
/// queues onto the object's dispatcher otherwise; `Queued` always queues, even
/// on the same thread; `Direct` always runs inline.
pub fn invoke<O, F>(obj: &Arc<O>, policy: ConnectionType, func: F)
where
    O: Object,
    F: FnOnce(&O) + Send + 'static,
{
    let dispatcher = obj.object_core().dispatcher();

    let inline = match policy {
        ConnectionType::Direct => true,
        ConnectionType::Queued => false,
        ConnectionType::Auto => dispatcher.is_current(),
    };

    if inline {
        func(obj);
    } else {
        let obj = obj.clone();
        dispatcher.post(move || func(&obj));
    }
}

/// Reparent `obj` onto the thread served by `target`.
///
/// The object's [`Object::message`] hook is invoked with
/// [`Message::ThreadMove`] after the affinity change so that thread-bound
/// resources (armed timers in particular) can re-register on the new thread.
pub fn move_to_thread<O: Object>(obj: &Arc<O>, target: &EventDispatcher) {
    {
        let mut dispatcher = obj.object_core().dispatcher.lock().unwrap();
        if dispatcher.same_thread(target) {
            return;
        }
        *dispatcher = target.clone();
    }

    obj.message(&Message::ThreadMove);
}
