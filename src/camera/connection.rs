//! Callback subscription with scoped lifetime.
//!
//! [`Signal::connect`] returns a [`Connection`]; the callback stays
//! registered exactly as long as the connection value is alive.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

struct Slot<F: ?Sized> {
    id: u64,
    /// Taken out while the callback runs.
    callback: Option<Box<F>>,
}

type Slots<F> = RefCell<Vec<Slot<F>>>;

/// List of subscribers to one event. `F` is the callback trait object type.
pub struct Signal<F: ?Sized> {
    slots: Rc<Slots<F>>,
    next_id: Cell<u64>,
}

impl<F: ?Sized> Default for Signal<F> {
    fn default() -> Self {
        Self {
            slots: Rc::new(RefCell::new(Vec::new())),
            next_id: Cell::new(1),
        }
    }
}

impl<F: ?Sized + 'static> Signal<F> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect(&self, callback: Box<F>) -> Connection {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        self.slots.borrow_mut().push(Slot {
            id,
            callback: Some(callback),
        });

        let slots: Weak<Slots<F>> = Rc::downgrade(&self.slots);
        Connection {
            disconnect: Some(Box::new(move || {
                if let Some(slots) = slots.upgrade() {
                    slots.borrow_mut().retain(|slot| slot.id != id);
                }
            })),
        }
    }

    pub fn connection_count(&self) -> usize {
        self.slots.borrow().len()
    }

    pub fn has_connections(&self) -> bool {
        self.connection_count() > 0
    }

    /// Invoke every subscriber. Subscribers may drop connections while this runs.
    pub fn emit_with(&self, mut invoke: impl FnMut(&mut F)) {
        let ids: Vec<u64> = self.slots.borrow().iter().map(|slot| slot.id).collect();
        for id in ids {
            let callback = self
                .slots
                .borrow_mut()
                .iter_mut()
                .find(|slot| slot.id == id)
                .and_then(|slot| slot.callback.take());
            let Some(mut callback) = callback else {
                continue;
            };
            invoke(callback.as_mut());
            if let Some(slot) = self
                .slots
                .borrow_mut()
                .iter_mut()
                .find(|slot| slot.id == id)
            {
                slot.callback = Some(callback);
            }
        }
    }
}

/// Subscription handle. Dropping it unsubscribes.
#[must_use = "dropping a Connection immediately unsubscribes its callback"]
pub struct Connection {
    disconnect: Option<Box<dyn FnOnce()>>,
}

impl Connection {
    /// Unsubscribe now.
    pub fn disconnect(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(disconnect) = self.disconnect.take() {
            disconnect();
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("active", &self.disconnect.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Callback = dyn FnMut(&[u8]);

    #[test]
    fn test_drop_unsubscribes() {
        let signal: Signal<Callback> = Signal::new();
        let seen = Rc::new(Cell::new(0usize));

        let counter = seen.clone();
        let connection = signal.connect(Box::new(move |data: &[u8]| {
            counter.set(counter.get() + data.len());
        }));
        signal.emit_with(|cb| cb(&[1, 2, 3]));
        assert_eq!(seen.get(), 3);
        assert_eq!(signal.connection_count(), 1);

        drop(connection);
        signal.emit_with(|cb| cb(&[1, 2, 3]));
        assert_eq!(seen.get(), 3);
        assert!(!signal.has_connections());
    }

    #[test]
    fn test_disconnect_during_emit() {
        let signal: Signal<Callback> = Signal::new();
        let holder: Rc<RefCell<Option<Connection>>> = Rc::new(RefCell::new(None));
        let calls = Rc::new(Cell::new(0));

        let inner = holder.clone();
        let count = calls.clone();
        let connection = signal.connect(Box::new(move |_: &[u8]| {
            count.set(count.get() + 1);
            inner.borrow_mut().take();
        }));
        *holder.borrow_mut() = Some(connection);

        signal.emit_with(|cb| cb(&[]));
        signal.emit_with(|cb| cb(&[]));
        assert_eq!(calls.get(), 1);
        assert_eq!(signal.connection_count(), 0);
    }

    #[test]
    fn test_connection_outliving_signal_is_harmless() {
        let connection = {
            let signal: Signal<Callback> = Signal::new();
            signal.connect(Box::new(|_: &[u8]| {}))
        };
        connection.disconnect();
    }
}
