use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex, Weak,
};

use crate::object::Object;

/// Delivery policy for object slots and queued invocations.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ConnectionType {
    /// Inline when source and target share a thread, queued otherwise.
    #[default]
    Auto,
    /// Always inline, on the emitting thread.
    Direct,
    /// Always queued onto the target's dispatcher.
    Queued,
}

/// A multicast signal.
///
/// Slots are either free functions, invoked inline on the emitting thread, or
/// methods bound to an [`Object`] target, delivered according to the
/// connection's [`ConnectionType`]. Emission enumerates connections in connect
/// order; connections whose target has been dropped are pruned.
pub struct Signal<T: Clone + Send + 'static> {
    connections: Mutex<Vec<Arc<Connection<T>>>>,
    next_id: AtomicU64,
}

struct Connection<T> {
    id: u64,
    slot: Slot<T>,
}

enum Slot<T> {
    Function(Box<dyn Fn(&T) + Send + Sync>),
    Object(Box<dyn ObjectSlot<T> + Send + Sync>),
}

trait ObjectSlot<T> {
    /// Deliver `args`, returning false when the target is gone.
    fn deliver(&self, args: &T) -> bool;
    fn target_ptr(&self) -> usize;
}

struct BoundSlot<O: Object, T> {
    target: Weak<O>,
    func: Arc<dyn Fn(&O, &T) + Send + Sync>,
    policy: ConnectionType,
}

impl<O: Object, T: Clone + Send + 'static> ObjectSlot<T> for BoundSlot<O, T> {
    fn deliver(&self, args: &T) -> bool {
        let Some(obj) = self.target.upgrade() else {
            return false;
        };

        let dispatcher = obj.object_core().dispatcher();
        let inline = match self.policy {
            ConnectionType::Direct => true,
            ConnectionType::Queued => false,
            ConnectionType::Auto => dispatcher.is_current(),
        };

        if inline {
            (self.func)(&obj, args);
        } else {
            let func = self.func.clone();
            let args = args.clone();
            dispatcher.post(move || func(&obj, &args));
        }

        true
    }

    fn target_ptr(&self) -> usize {
        self.target.as_ptr() as usize
    }
}

impl<T: Clone + Send + 'static> Signal<T> {
    pub fn new() -> Self {
        Self {
            connections: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Connect a free-function slot, invoked inline on the emitting thread.
    pub fn connect<F>(&self, func: F) -> u64
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.push(Slot::Function(Box::new(func)))
    }

    /// Connect a slot bound to `target`.
    ///
    /// The connection holds a weak reference: it is pruned once the target is
    /// dropped. Delivery follows `policy` against the target's current thread
    /// affinity at emission time.
    pub fn connect_object<O, F>(&self, target: &Arc<O>, policy: ConnectionType, func: F) -> u64
    where
        O: Object,
        F: Fn(&O, &T) + Send + Sync + 'static,
    {
        self.push(Slot::Object(Box::new(BoundSlot {
            target: Arc::downgrade(target),
            func: Arc::new(func),
            policy,
        })))
    }

    fn push(&self, slot: Slot<T>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.connections.lock().unwrap().push(Arc::new(Connection {
            id,
            slot,
        }));
        id
    }

    pub fn disconnect(&self, id: u64) {
        self.connections.lock().unwrap().retain(|c| c.id != id);
    }

    pub fn disconnect_object<O: Object>(&self, target: &Arc<O>) {
        let ptr = Arc::as_ptr(target) as usize;
        self.connections.lock().unwrap().retain(|c| match &c.slot {
            Slot::Object(slot) => slot.target_ptr() != ptr,
            Slot::Function(_) => true,
        });
    }

    pub fn disconnect_all(&self) {
        self.connections.lock().unwrap().clear();
    }

    pub fn emit(&self, args: T) {
        // Snapshot outside the lock so slots may connect or disconnect.
        let snapshot: Vec<Arc<Connection<T>>> = self.connections.lock().unwrap().clone();

        let mut dead = Vec::new();
        for connection in &snapshot {
            match &connection.slot {
                Slot::Function(func) => func(&args),
                Slot::Object(slot) => {
                    if !slot.deliver(&args) {
                        dead.push(connection.id);
                    }
                }
            }
        }

        if !dead.is_empty() {
            self.connections
                .lock()
                .unwrap()
                .retain(|c| !dead.contains(&c.id));
        }
    }
}

impl<T: Clone + Send + 'static> Default for Signal<T> {
    fn default() -> Self {
        Self::new()
    }
}
