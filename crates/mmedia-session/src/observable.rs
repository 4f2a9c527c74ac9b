//! Observable state slots and single-consumption events.
//!
//! An [`Observable`] is a current-value cell plus an observer registry.  A new
//! observer receives the current value first, then every later value in the
//! order it was set.  Nothing is coalesced: each `set` is one delivery per
//! observer.  Deliveries run on the session's [`DeliveryContext`], and each one
//! re-checks the registration when it runs, so once [`Observable::remove`]
//! returns the observer is never called again.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::delivery::DeliveryContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

type Observer<T> = Arc<dyn Fn(&T) + Send + Sync + 'static>;

struct Slot<T> {
    value: T,
    observers: HashMap<ObserverId, Observer<T>>,
    next_id: u64,
}

pub struct Observable<T> {
    slot: Arc<Mutex<Slot<T>>>,
    delivery: DeliveryContext,
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
            delivery: self.delivery.clone(),
        }
    }
}

impl<T> Observable<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(initial: T, delivery: DeliveryContext) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Slot {
                value: initial,
                observers: HashMap::new(),
                next_id: 1,
            })),
            delivery,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slot<T>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn value(&self) -> T {
        self.lock().value.clone()
    }

    /// Register `observer`.  It is called with the current value, then with
    /// every value set afterwards.
    pub fn observe<F>(&self, observer: F) -> ObserverId
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let mut slot = self.lock();
        let id = ObserverId(slot.next_id);
        slot.next_id += 1;
        slot.observers.insert(id, Arc::new(observer));
        let value = slot.value.clone();
        self.post_to(id, value);
        id
    }

    /// Unregister an observer.  Returns `false` if it was not registered.
    pub fn remove(&self, id: ObserverId) -> bool {
        self.lock().observers.remove(&id).is_some()
    }

    pub fn observer_count(&self) -> usize {
        self.lock().observers.len()
    }

    /// Store `value` and deliver it to every registered observer.
    pub fn set(&self, value: T) {
        let mut slot = self.lock();
        slot.value = value.clone();
        let ids: Vec<ObserverId> = slot.observers.keys().copied().collect();
        // Posting under the lock keeps concurrent `set` calls in order.
        for id in ids {
            self.post_to(id, value.clone());
        }
    }

    fn post_to(&self, id: ObserverId, value: T) {
        let slot = Arc::clone(&self.slot);
        self.delivery.post(move || {
            let observer = slot
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .observers
                .get(&id)
                .cloned();
            if let Some(observer) = observer {
                observer(&value);
            }
        });
    }
}

/// A value meant to be handled by at most one consumer.
#[derive(Debug)]
pub struct Event<T> {
    content: T,
    handled: AtomicBool,
}

impl<T> Event<T> {
    pub fn new(content: T) -> Self {
        Self {
            content,
            handled: AtomicBool::new(false),
        }
    }

    /// The content, the first time this is called; `None` afterwards.
    pub fn get_content_if_not_handled(&self) -> Option<&T> {
        if self.handled.swap(true, Ordering::AcqRel) {
            None
        } else {
            Some(&self.content)
        }
    }

    /// The content, whether or not it was already handled.
    pub fn peek_content(&self) -> &T {
        &self.content
    }

    pub fn has_been_handled(&self) -> bool {
        self.handled.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder<T: Clone + Send + 'static>() -> (Arc<Mutex<Vec<T>>>, impl Fn(&T) + Send + Sync) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        (seen, move |v: &T| s.lock().unwrap().push(v.clone()))
    }

    #[tokio::test]
    async fn test_late_observer_gets_current_value_first() {
        let delivery = DeliveryContext::spawn();
        let cell = Observable::new(1, delivery.clone());
        cell.set(2);

        let (seen, observer) = recorder::<i32>();
        cell.observe(observer);
        cell.set(3);
        delivery.flush().await;
        assert_eq!(*seen.lock().unwrap(), vec![2, 3]);
    }

    #[tokio::test]
    async fn test_every_set_is_delivered() {
        let delivery = DeliveryContext::spawn();
        let cell = Observable::new(0, delivery.clone());
        let (seen, observer) = recorder::<i32>();
        cell.observe(observer);
        for i in 1..=5 {
            cell.set(i);
        }
        cell.set(5);
        delivery.flush().await;
        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2, 3, 4, 5, 5]);
    }

    #[tokio::test]
    async fn test_removed_observer_skips_queued_deliveries() {
        let delivery = DeliveryContext::spawn();
        let cell = Observable::new("a".to_string(), delivery.clone());
        let (seen, observer) = recorder::<String>();

        // Hold the delivery task so the queued jobs cannot run yet.
        let (tx, rx) = std::sync::mpsc::channel::<()>();
        delivery.post(move || {
            let _ = rx.recv();
        });
        let id = cell.observe(observer);
        cell.set("b".to_string());
        assert!(cell.remove(id));
        tx.send(()).unwrap();

        delivery.flush().await;
        assert!(seen.lock().unwrap().is_empty());
        assert!(!cell.remove(id));
    }

    #[tokio::test]
    async fn test_removing_one_observer_keeps_the_other() {
        let delivery = DeliveryContext::spawn();
        let cell = Observable::new(0, delivery.clone());
        let (first, o1) = recorder::<i32>();
        let (second, o2) = recorder::<i32>();
        let id1 = cell.observe(o1);
        cell.observe(o2);
        delivery.flush().await;

        cell.remove(id1);
        cell.set(7);
        delivery.flush().await;
        assert_eq!(*first.lock().unwrap(), vec![0]);
        assert_eq!(*second.lock().unwrap(), vec![0, 7]);
        assert_eq!(cell.observer_count(), 1);
    }

    #[test]
    fn test_event_is_consumed_once() {
        let event = Event::new("album".to_string());
        assert!(!event.has_been_handled());
        assert_eq!(event.get_content_if_not_handled().map(String::as_str), Some("album"));
        assert_eq!(event.get_content_if_not_handled(), None);
        assert_eq!(event.peek_content(), "album");
        assert!(event.has_been_handled());
    }
}
