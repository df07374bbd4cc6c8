#![forbid(unsafe_code)]

//! Typed value channel with change notification.
//!
//! # Design
//!
//! [`Channel<T>`] wraps one value of type `T` in shared, reference-counted
//! storage (`Rc<RefCell<..>>`). Every [`set_value`](Channel::set_value)
//! call stores the new value and invokes all registered listeners with the
//! previous and new value, in registration order. A newly added listener is
//! immediately replayed the current value as `(T::default(), current)`, so
//! subscribers never query existing state through a separate API.
//!
//! The awaitable variants route through a [`ValueSource`]: a pair of hooks
//! a concrete channel kind can override to do real I/O (loading a value
//! from disk, a remote fetch). The default [`InMemory`] source completes in
//! the same tick without suspending.
//!
//! # Invariants
//!
//! 1. Listeners are notified in registration order.
//! 2. Every `set_value` call notifies, including writes of an equal value;
//!    `version` increments by exactly 1 per call.
//! 3. Replay-on-subscribe happens exactly once, before any future change
//!    is observed.
//! 4. Each registration is a distinct identity: `add_listener` returns a
//!    fresh [`ListenerId`], never reused within this channel instance.
//!
//! # Failure Modes
//!
//! - **Re-entrant set**: calling `set_value` from within a listener panics
//!   (RefCell borrow rules). Re-entrant mutation of the same channel
//!   indicates a design bug in the subscriber graph.
//! - **Dangling listeners**: listeners are stored by `Rc` reference only;
//!   a closure capturing external state keeps that state alive until the
//!   registration is removed.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use async_trait::async_trait;

/// Identifies one listener registration on a [`Channel`].
///
/// Ids are allocated per channel instance, starting at 1, and never reused
/// within that instance. Id 0 is reserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl ListenerId {
    pub(crate) fn raw(self) -> u64 {
        self.0
    }
}

pub(crate) type Callback<T> = Rc<dyn Fn(&T, &T)>;

/// Asynchronous backing hooks for a channel.
///
/// The defaults complete immediately without suspending, which keeps plain
/// in-memory channels synchronous in shape even on the awaitable path.
/// Kinds backed by real I/O install a custom source via
/// [`Channel::with_source`].
#[async_trait(?Send)]
pub trait ValueSource<T> {
    /// Produce the value for an awaited read.
    ///
    /// Receives the value currently held in memory; the default returns it
    /// unchanged. A custom source returning something else does not mutate
    /// the channel — adopting a loaded value is an explicit `set_value`
    /// by the source's owner.
    async fn load(&self, current: T) -> T
    where
        T: 'async_trait,
    {
        current
    }

    /// Persist an awaited write.
    ///
    /// Runs after the in-memory value has been stored and listeners have
    /// been notified. The default does nothing.
    async fn store(&self, _value: &T) {}
}

/// Source used by [`Channel::new`]: both hooks complete in the same tick.
#[derive(Debug, Clone, Copy, Default)]
pub struct InMemory;

#[async_trait(?Send)]
impl<T> ValueSource<T> for InMemory {}

struct ChannelInner<T> {
    value: T,
    version: u64,
    listeners: Vec<(ListenerId, Callback<T>)>,
    next_listener: u64,
}

/// A single typed value slot with observers.
///
/// Cloning a `Channel` creates a new handle to the **same** inner state;
/// both handles see the same value and share listeners.
pub struct Channel<T> {
    inner: Rc<RefCell<ChannelInner<T>>>,
    source: Rc<dyn ValueSource<T>>,
}

// Manual Clone: shares the same Rc.
impl<T> Clone for Channel<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
            source: Rc::clone(&self.source),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Channel<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Channel")
            .field("value", &inner.value)
            .field("version", &inner.version)
            .field("listener_count", &inner.listeners.len())
            .finish()
    }
}

impl<T: Clone + Default + 'static> Channel<T> {
    /// Create a channel with the given initial value and the same-tick
    /// [`InMemory`] source.
    #[must_use]
    pub fn new(value: T) -> Self {
        Self::with_source(value, InMemory)
    }

    /// Create a channel whose awaitable reads and writes route through a
    /// custom [`ValueSource`].
    #[must_use]
    pub fn with_source(value: T, source: impl ValueSource<T> + 'static) -> Self {
        Self {
            inner: Rc::new(RefCell::new(ChannelInner {
                value,
                version: 0,
                listeners: Vec::new(),
                next_listener: 1,
            })),
            source: Rc::new(source),
        }
    }

    /// Get a clone of the current value. No side effects.
    #[must_use]
    pub fn value(&self) -> T {
        self.inner.borrow().value.clone()
    }

    /// Access the current value by reference without cloning.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.borrow().value)
    }

    /// Number of `set_value` calls this channel has seen.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.borrow().version
    }

    /// Number of currently registered listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.inner.borrow().listeners.len()
    }

    /// Store `value` and synchronously invoke every listener with the
    /// previous and new value, in registration order.
    ///
    /// Listeners run with no interior borrow held, so they may read this
    /// channel or touch other channels freely.
    ///
    /// # Panics
    ///
    /// Panics if called re-entrantly from within a listener of this
    /// channel.
    pub fn set_value(&self, value: T) {
        let (old, new, callbacks) = {
            let mut inner = self.inner.borrow_mut();
            let old = std::mem::replace(&mut inner.value, value);
            inner.version += 1;
            let callbacks: Vec<Callback<T>> = inner
                .listeners
                .iter()
                .map(|(_, cb)| Rc::clone(cb))
                .collect();
            (old, inner.value.clone(), callbacks)
        };
        for cb in &callbacks {
            cb(&old, &new);
        }
    }

    /// Register a listener and immediately replay the current value to it
    /// as `(T::default(), current)`.
    pub fn add_listener(&self, listener: impl Fn(&T, &T) + 'static) -> ListenerId {
        let cb: Callback<T> = Rc::new(listener);
        let id = self.register(Rc::clone(&cb));
        self.replay_to(&cb);
        id
    }

    /// Append a listener without replaying. The registry records its
    /// diagnostic entry between registration and replay.
    pub(crate) fn register(&self, cb: Callback<T>) -> ListenerId {
        let mut inner = self.inner.borrow_mut();
        let id = ListenerId(inner.next_listener);
        inner.next_listener += 1;
        inner.listeners.push((id, cb));
        id
    }

    /// Invoke `cb` once with `(T::default(), current)`.
    pub(crate) fn replay_to(&self, cb: &Callback<T>) {
        let current = self.value();
        cb(&T::default(), &current);
    }

    /// Remove a previously registered listener.
    ///
    /// Returns whether a registration was removed; unknown or already
    /// removed ids are ignored.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut inner = self.inner.borrow_mut();
        let before = inner.listeners.len();
        inner.listeners.retain(|(lid, _)| *lid != id);
        inner.listeners.len() != before
    }

    /// Drop every listener. The stored value is untouched.
    pub fn remove_all_listeners(&self) {
        self.inner.borrow_mut().listeners.clear();
    }

    /// Awaitable read through the channel's [`ValueSource`].
    ///
    /// With the default source this returns the in-memory value in the
    /// same tick.
    pub async fn get_value_async(&self) -> T {
        let source = Rc::clone(&self.source);
        let current = self.value();
        source.load(current).await
    }

    /// Awaitable write: the synchronous mutation and notification happen
    /// first, then the source's store hook runs.
    pub async fn set_value_async(&self, value: T) {
        self.set_value(value.clone());
        let source = Rc::clone(&self.source);
        source.store(&value).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn value_and_set_basic() {
        let channel = Channel::new(42);
        assert_eq!(channel.value(), 42);
        assert_eq!(channel.version(), 0);

        channel.set_value(99);
        assert_eq!(channel.value(), 99);
        assert_eq!(channel.version(), 1);
    }

    #[test]
    fn equal_value_still_notifies_and_bumps_version() {
        let channel = Channel::new(42);
        let count = Rc::new(Cell::new(0u32));
        let count_clone = Rc::clone(&count);
        channel.add_listener(move |_, _| count_clone.set(count_clone.get() + 1));
        assert_eq!(count.get(), 1); // replay

        channel.set_value(42);
        channel.set_value(42);
        assert_eq!(count.get(), 3);
        assert_eq!(channel.version(), 2);
    }

    #[test]
    fn replay_on_subscribe_uses_default_and_current() {
        let channel = Channel::new(7);
        let seen = Rc::new(Cell::new((i32::MIN, i32::MIN)));
        let seen_clone = Rc::clone(&seen);
        channel.add_listener(move |old, new| seen_clone.set((*old, *new)));
        assert_eq!(seen.get(), (0, 7));
    }

    #[test]
    fn replay_fires_even_when_current_equals_default() {
        let channel = Channel::new(0);
        let count = Rc::new(Cell::new(0u32));
        let count_clone = Rc::clone(&count);
        channel.add_listener(move |old, new| {
            assert_eq!((*old, *new), (0, 0));
            count_clone.set(count_clone.get() + 1);
        });
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn listeners_see_old_and_new_in_a_chain() {
        let channel = Channel::new(0);
        let log = Rc::new(RefCell::new(Vec::new()));
        let log_clone = Rc::clone(&log);
        channel.add_listener(move |old, new| log_clone.borrow_mut().push((*old, *new)));

        channel.set_value(5);
        channel.set_value(2);
        channel.set_value(2);
        assert_eq!(*log.borrow(), vec![(0, 0), (0, 5), (5, 2), (2, 2)]);
    }

    #[test]
    fn notification_order_is_registration_order() {
        let channel = Channel::new(0);
        let log = Rc::new(RefCell::new(Vec::new()));

        let log1 = Rc::clone(&log);
        channel.add_listener(move |_, _| log1.borrow_mut().push('A'));
        let log2 = Rc::clone(&log);
        channel.add_listener(move |_, _| log2.borrow_mut().push('B'));
        let log3 = Rc::clone(&log);
        channel.add_listener(move |_, _| log3.borrow_mut().push('C'));

        log.borrow_mut().clear(); // drop the replay entries
        channel.set_value(1);
        assert_eq!(*log.borrow(), vec!['A', 'B', 'C']);
    }

    #[test]
    fn remove_listener_is_idempotent() {
        let channel = Channel::new(0);
        let a = Rc::new(Cell::new(0u32));
        let b = Rc::new(Cell::new(0u32));
        let a_clone = Rc::clone(&a);
        let b_clone = Rc::clone(&b);

        let id_a = channel.add_listener(move |_, _| a_clone.set(a_clone.get() + 1));
        channel.add_listener(move |_, _| b_clone.set(b_clone.get() + 1));

        assert!(channel.remove_listener(id_a));
        assert!(!channel.remove_listener(id_a));

        channel.set_value(1);
        assert_eq!(a.get(), 1); // replay only
        assert_eq!(b.get(), 2); // replay + set
    }

    #[test]
    fn listener_ids_are_never_reused() {
        let channel = Channel::new(0);
        let first = channel.add_listener(|_, _| {});
        channel.remove_listener(first);
        let second = channel.add_listener(|_, _| {});
        assert_ne!(first, second);
    }

    #[test]
    fn remove_all_listeners_keeps_value() {
        let channel = Channel::new(0);
        channel.add_listener(|_, _| {});
        channel.add_listener(|_, _| {});
        channel.set_value(9);
        channel.remove_all_listeners();
        assert_eq!(channel.listener_count(), 0);
        assert_eq!(channel.value(), 9);
    }

    #[test]
    fn clone_shares_state_and_listeners() {
        let one = Channel::new(0);
        let two = one.clone();
        let count = Rc::new(Cell::new(0u32));
        let count_clone = Rc::clone(&count);
        one.add_listener(move |_, _| count_clone.set(count_clone.get() + 1));

        two.set_value(42);
        assert_eq!(one.value(), 42);
        assert_eq!(count.get(), 2); // replay + set via the other handle
    }

    #[test]
    fn with_borrows_without_cloning() {
        let channel = Channel::new(vec![1, 2, 3]);
        let sum = channel.with(|v| v.iter().sum::<i32>());
        assert_eq!(sum, 6);
    }

    #[test]
    fn debug_format() {
        let channel = Channel::new(42);
        let dbg = format!("{channel:?}");
        assert!(dbg.contains("Channel"));
        assert!(dbg.contains("42"));
        assert!(dbg.contains("version"));
    }

    #[tokio::test]
    async fn async_defaults_complete_in_the_same_tick() {
        let channel = Channel::new(1);
        let count = Rc::new(Cell::new(0u32));
        let count_clone = Rc::clone(&count);
        channel.add_listener(move |_, _| count_clone.set(count_clone.get() + 1));

        channel.set_value_async(5).await;
        assert_eq!(channel.value(), 5);
        assert_eq!(count.get(), 2); // replay + async set
        assert_eq!(channel.get_value_async().await, 5);
    }

    #[tokio::test]
    async fn custom_source_hooks_are_invoked() {
        struct Recording {
            stored: Rc<RefCell<Vec<i32>>>,
        }

        #[async_trait(?Send)]
        impl ValueSource<i32> for Recording {
            async fn load(&self, current: i32) -> i32 {
                current + 100
            }

            async fn store(&self, value: &i32) {
                self.stored.borrow_mut().push(*value);
            }
        }

        let stored = Rc::new(RefCell::new(Vec::new()));
        let channel = Channel::with_source(
            1,
            Recording {
                stored: Rc::clone(&stored),
            },
        );

        channel.set_value_async(5).await;
        assert_eq!(*stored.borrow(), vec![5]);

        // A loading source answers the awaited read; the in-memory value
        // is not adopted.
        assert_eq!(channel.get_value_async().await, 105);
        assert_eq!(channel.value(), 5);
    }
}
