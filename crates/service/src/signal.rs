use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;

/// Shared latest-value cell.
///
/// Clones observe and update the same value. Setting an equal value wakes nobody.
pub struct Signal<T> {
    tx: Arc<watch::Sender<T>>,
}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T: Default> Default for Signal<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> Signal<T> {
    pub fn new(value: T) -> Self {
        let (tx, _) = watch::channel(value);
        Self { tx: Arc::new(tx) }
    }

    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.tx.subscribe()
    }
}

impl<T: Clone> Signal<T> {
    pub fn get(&self) -> T {
        self.tx.borrow().clone()
    }
}

impl<T: PartialEq> Signal<T> {
    /// Stores `value`. Returns `true` if it differed from the previous one.
    pub fn set(&self, value: T) -> bool {
        self.tx.send_if_modified(|current| {
            if *current == value {
                return false;
            }
            *current = value;
            true
        })
    }
}

impl<T: fmt::Debug> fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Signal").field(&*self.tx.borrow()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_value() {
        let signal = Signal::new(1u8);
        let other = signal.clone();
        assert!(other.set(2));
        assert_eq!(signal.get(), 2);
        assert!(!signal.set(2));
    }

    #[tokio::test]
    async fn test_equal_value_does_not_wake() {
        let signal = Signal::new("a");
        let mut rx = signal.subscribe();
        signal.set("a");
        assert!(!rx.has_changed().unwrap());
        signal.set("b");
        assert!(rx.has_changed().unwrap());
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), "b");
    }
}
