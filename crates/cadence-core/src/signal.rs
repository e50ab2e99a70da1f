//! Minimal publish/subscribe primitives.
//!
//! [`Signal`] is a subscriber list called synchronously on `emit`.
//! [`Observable`] is a value cell that emits only when the value changes.

/// Handle returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// A listener receives each emitted value by reference.
pub type Listener<T> = Box<dyn FnMut(&T)>;

pub struct Signal<T> {
    listeners: Vec<(SubscriptionId, Listener<T>)>,
    next_id: u64,
}

impl<T> std::fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl<T> Default for Signal<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Signal<T> {
    pub fn new() -> Self {
        Self {
            listeners: Vec::new(),
            next_id: 0,
        }
    }

    /// Register a listener. Listeners run in registration order.
    pub fn subscribe(&mut self, listener: impl FnMut(&T) + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Remove a listener. Returns `false` if it was not registered.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(sid, _)| *sid != id);
        self.listeners.len() != before
    }

    pub fn emit(&mut self, value: &T) {
        for (_, listener) in &mut self.listeners {
            listener(value);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

/// A value cell that notifies subscribers when it changes.
#[derive(Debug)]
pub struct Observable<T> {
    value: T,
    changed: Signal<T>,
}

impl<T: Clone + PartialEq> Observable<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            changed: Signal::new(),
        }
    }

    pub fn get(&self) -> T {
        self.value.clone()
    }

    /// Store a value, emitting only if it differs from the current one.
    /// Returns whether it changed.
    pub fn set(&mut self, value: T) -> bool {
        if self.value == value {
            return false;
        }
        self.value = value;
        self.changed.emit(&self.value);
        true
    }

    pub fn subscribe(&mut self, listener: impl FnMut(&T) + 'static) -> SubscriptionId {
        self.changed.subscribe(listener)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.changed.unsubscribe(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn signal_delivers_in_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut signal = Signal::new();
        let l1 = Rc::clone(&log);
        signal.subscribe(move |v: &u32| l1.borrow_mut().push(("a", *v)));
        let l2 = Rc::clone(&log);
        signal.subscribe(move |v: &u32| l2.borrow_mut().push(("b", *v)));

        signal.emit(&7);
        assert_eq!(*log.borrow(), vec![("a", 7), ("b", 7)]);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let hits = Rc::new(RefCell::new(0));
        let mut signal = Signal::new();
        let h = Rc::clone(&hits);
        let id = signal.subscribe(move |_: &()| *h.borrow_mut() += 1);
        signal.emit(&());
        assert!(signal.unsubscribe(id));
        assert!(!signal.unsubscribe(id));
        signal.emit(&());
        assert_eq!(*hits.borrow(), 1);
    }

    #[test]
    fn observable_emits_only_on_change() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut cell = Observable::new(0u32);
        let s = Rc::clone(&seen);
        cell.subscribe(move |v| s.borrow_mut().push(*v));

        assert!(!cell.set(0));
        assert!(cell.set(3));
        assert!(!cell.set(3));
        assert!(cell.set(4));
        assert_eq!(*seen.borrow(), vec![3, 4]);
        assert_eq!(cell.get(), 4);
    }
}
