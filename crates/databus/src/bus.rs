#![forbid(unsafe_code)]

//! The process-scoped channel registry.
//!
//! # Design
//!
//! [`DataBus`] maps `(kind, interned args)` keys to channel slots. A slot
//! is created lazily on the first listener registration for its key, by
//! the factory registered for the kind, and evicted as soon as its last
//! listener is removed — a channel with zero listeners holds no value, and
//! re-subscribing later observes the factory-seeded value again, not the
//! last one written.
//!
//! Reads and writes are gated on slot existence and fail soft in opposite
//! directions: reading an unobserved channel returns the value type's
//! default, writing one is silently dropped. The only hard failures are
//! `add_listener` against an unregistered kind and a factory rejecting its
//! parameter tuple.
//!
//! # Concurrency
//!
//! Single-threaded by design, like the rest of the crate: interior
//! mutability via `RefCell`, shared handles via `Rc`. Operations are
//! atomic end-to-end because nothing preempts mid-call. No borrow is held
//! while listener callbacks run, so callbacks may re-enter the bus; a
//! re-entrant `set_value` on the *same* channel panics (see
//! [`Channel::set_value`]).
//!
//! # Example
//!
//! ```
//! use databus::{ArgValue, Channel, ChannelKind, ConstructError, DataBus};
//!
//! struct Counter;
//!
//! impl ChannelKind for Counter {
//!     type Value = i32;
//!
//!     fn name() -> &'static str {
//!         "Counter"
//!     }
//!
//!     fn construct(_args: &[ArgValue]) -> Result<Channel<i32>, ConstructError> {
//!         Ok(Channel::new(0))
//!     }
//! }
//!
//! let bus = DataBus::new();
//! bus.register_kind::<Counter>();
//!
//! let handle = bus
//!     .add_listener::<Counter>(&[], |old, new| println!("{old} -> {new}"))
//!     .unwrap();
//! bus.set_value::<Counter>(5, &[]);
//! assert_eq!(bus.get_value::<Counter>(&[]), 5);
//!
//! bus.remove_listener(handle);
//! assert_eq!(bus.get_value::<Counter>(&[]), 0); // evicted with its value
//! ```

use std::any::TypeId;
use std::cell::RefCell;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;
use std::rc::Rc;

use tracing::{debug, trace};

use crate::args::ArgValue;
use crate::channel::{Callback, Channel, ListenerId};
use crate::entry::{AnyChannel, ChannelEntry, ChannelId, ErasedChannel};
use crate::interner::{ArgsId, ArgsInterner};
use crate::kind::{ChannelKind, ConstructError};

/// Errors surfaced by listener registration.
///
/// Reads and removals on unknown channels are deliberately not errors;
/// registration is the one place the registry fails hard.
#[derive(Debug, Clone)]
pub enum BusError {
    /// The kind was never registered on this bus.
    UnknownKind {
        /// Diagnostic name of the kind.
        kind: &'static str,
    },
    /// The kind's factory rejected the resolved parameter tuple.
    Construct {
        /// Diagnostic name of the kind.
        kind: &'static str,
        /// The factory's rejection message.
        reason: String,
    },
}

impl fmt::Display for BusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownKind { kind } => {
                write!(f, "channel kind '{kind}' is not registered")
            }
            Self::Construct { kind, reason } => {
                write!(f, "constructing channel kind '{kind}' failed: {reason}")
            }
        }
    }
}

impl std::error::Error for BusError {}

/// Handle identifying one listener registration.
///
/// Returned by [`DataBus::add_listener`] and required by
/// [`DataBus::remove_listener`]. The handle carries the channel instance
/// it was minted against, so a handle that outlives an evict/recreate
/// cycle of its key is ignored rather than removing a newer listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerHandle {
    key: BusKey,
    channel: ChannelId,
    listener: ListenerId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct BusKey {
    kind: TypeId,
    args: ArgsId,
}

type ConstructFn =
    Box<dyn Fn(&[ArgValue], ChannelId) -> Result<Box<dyn AnyChannel>, ConstructError>>;

struct KindRegistration {
    name: &'static str,
    construct: ConstructFn,
}

struct Slot {
    channel: Box<dyn AnyChannel>,
    entries: Vec<ChannelEntry>,
}

struct BusInner {
    kinds: HashMap<TypeId, KindRegistration>,
    interner: ArgsInterner,
    slots: HashMap<BusKey, Slot>,
    next_channel: u64,
}

/// Process-scoped typed publish/subscribe registry.
///
/// Construct one at startup, register kinds, and pass it by reference to
/// call sites (wrap it in an `Rc` where listeners need to reach back into
/// it). Dropping the bus, or calling [`clear`](DataBus::clear), tears
/// every channel down.
pub struct DataBus {
    inner: RefCell<BusInner>,
}

impl DataBus {
    /// Create an empty bus with no registered kinds.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: RefCell::new(BusInner {
                kinds: HashMap::new(),
                interner: ArgsInterner::new(),
                slots: HashMap::new(),
                next_channel: 1,
            }),
        }
    }

    /// Register a kind using its own [`ChannelKind::construct`] as the
    /// factory. Registering a kind twice is a no-op.
    pub fn register_kind<K: ChannelKind>(&self) {
        self.register_kind_with::<K>(K::construct);
    }

    /// Register a kind with a custom factory closure.
    ///
    /// Lets the factory capture environment the kind's own constructor
    /// cannot reach — a storage handle, a connection pool. The first
    /// registration for a kind wins; later ones are no-ops.
    pub fn register_kind_with<K: ChannelKind>(
        &self,
        factory: impl Fn(&[ArgValue]) -> Result<Channel<K::Value>, ConstructError> + 'static,
    ) {
        let mut inner = self.inner.borrow_mut();
        inner
            .kinds
            .entry(TypeId::of::<K>())
            .or_insert_with(|| KindRegistration {
                name: K::name(),
                construct: Box::new(move |args, id| {
                    let channel = factory(args)?;
                    Ok(Box::new(ErasedChannel {
                        id,
                        kind: K::name(),
                        channel,
                    }))
                }),
            });
    }

    /// Register a listener for `(K, args)`, lazily constructing the
    /// channel on first registration for the key.
    ///
    /// The callback is immediately replayed the current value as
    /// `(default, current)` — subscribers observe existing state without a
    /// separate query.
    ///
    /// # Errors
    ///
    /// [`BusError::UnknownKind`] if `K` was never registered;
    /// [`BusError::Construct`] if the kind's factory rejects `args`.
    pub fn add_listener<K: ChannelKind>(
        &self,
        args: &[ArgValue],
        listener: impl Fn(&K::Value, &K::Value) + 'static,
    ) -> Result<ListenerHandle, BusError> {
        self.add_listener_inner::<K>(None, args, Rc::new(listener))
    }

    /// Like [`add_listener`](DataBus::add_listener), with a caller-supplied
    /// owner label recorded on the diagnostic entry.
    pub fn add_listener_with_owner<K: ChannelKind>(
        &self,
        owner: impl Into<String>,
        args: &[ArgValue],
        listener: impl Fn(&K::Value, &K::Value) + 'static,
    ) -> Result<ListenerHandle, BusError> {
        self.add_listener_inner::<K>(Some(owner.into()), args, Rc::new(listener))
    }

    fn add_listener_inner<K: ChannelKind>(
        &self,
        owner: Option<String>,
        args: &[ArgValue],
        cb: Callback<K::Value>,
    ) -> Result<ListenerHandle, BusError> {
        let (channel, handle) = {
            let mut guard = self.inner.borrow_mut();
            let BusInner {
                kinds,
                interner,
                slots,
                next_channel,
            } = &mut *guard;

            let args_id = interner.resolve(args);
            let key = BusKey {
                kind: TypeId::of::<K>(),
                args: args_id,
            };
            let tuple = interner
                .tuple(args_id)
                .expect("freshly resolved tuple must be interned");

            let slot = match slots.entry(key) {
                Entry::Occupied(occupied) => occupied.into_mut(),
                Entry::Vacant(vacant) => {
                    let registration =
                        kinds
                            .get(&key.kind)
                            .ok_or(BusError::UnknownKind { kind: K::name() })?;
                    let id = ChannelId(*next_channel);
                    let channel =
                        (registration.construct)(&tuple, id).map_err(|err| BusError::Construct {
                            kind: registration.name,
                            reason: err.reason().to_string(),
                        })?;
                    *next_channel += 1;
                    debug!(kind = registration.name, channel = id.0, "constructed channel");
                    vacant.insert(Slot {
                        channel,
                        entries: Vec::new(),
                    })
                }
            };

            let erased = slot
                .channel
                .as_any()
                .downcast_ref::<ErasedChannel<K::Value>>()
                .expect("slot channel type must match its kind's value type");
            let channel = erased.channel.clone();
            let channel_id = erased.id;

            // Record the entry before replaying, so a re-entrant listing
            // from inside the callback already sees this registration.
            let listener = channel.register(Rc::clone(&cb));
            let entry = ChannelEntry::new(K::name(), owner, tuple, listener);
            trace!(entry = entry.name(), "listener registered");
            slot.entries.push(entry);

            (
                channel,
                ListenerHandle {
                    key,
                    channel: channel_id,
                    listener,
                },
            )
        };

        channel.replay_to(&cb);
        Ok(handle)
    }

    /// Remove a listener registration.
    ///
    /// Silently ignores handles whose key has no slot, stale handles from
    /// an evicted channel, and already removed listeners. Removing the
    /// last listener of a key evicts the whole slot: the channel and its
    /// stored value are discarded.
    pub fn remove_listener(&self, handle: ListenerHandle) {
        let mut guard = self.inner.borrow_mut();
        let Some(slot) = guard.slots.get_mut(&handle.key) else {
            return;
        };
        if slot.channel.id() != handle.channel {
            trace!(channel = handle.channel.0, "stale listener handle ignored");
            return;
        }
        slot.channel.remove_listener(handle.listener);
        slot.entries.retain(|e| e.listener() != handle.listener);
        if slot.entries.is_empty() {
            let kind = slot.channel.kind_name();
            guard.slots.remove(&handle.key);
            debug!(
                kind,
                channel = handle.channel.0,
                "evicted channel with no remaining listeners"
            );
        }
    }

    /// Current value of the `(K, args)` channel, or `K::Value::default()`
    /// when nobody is listening. Never constructs a channel.
    #[must_use]
    pub fn get_value<K: ChannelKind>(&self, args: &[ArgValue]) -> K::Value {
        match self.lookup::<K>(args) {
            Some(channel) => channel.value(),
            None => K::Value::default(),
        }
    }

    /// Write the `(K, args)` channel and synchronously notify its
    /// listeners. Writes to a channel nobody listens to are dropped.
    pub fn set_value<K: ChannelKind>(&self, value: K::Value, args: &[ArgValue]) {
        match self.lookup::<K>(args) {
            Some(channel) => channel.set_value(value),
            None => trace!(kind = K::name(), "write to unobserved channel dropped"),
        }
    }

    /// Awaitable read through the channel's [`ValueSource`] hooks.
    /// Existence gating matches [`get_value`](DataBus::get_value).
    ///
    /// [`ValueSource`]: crate::channel::ValueSource
    pub async fn get_value_async<K: ChannelKind>(&self, args: &[ArgValue]) -> K::Value {
        match self.lookup::<K>(args) {
            Some(channel) => channel.get_value_async().await,
            None => K::Value::default(),
        }
    }

    /// Awaitable write: synchronous mutation and notification, then the
    /// source's store hook. Existence gating matches
    /// [`set_value`](DataBus::set_value).
    pub async fn set_value_async<K: ChannelKind>(&self, value: K::Value, args: &[ArgValue]) {
        match self.lookup::<K>(args) {
            Some(channel) => channel.set_value_async(value).await,
            None => trace!(kind = K::name(), "async write to unobserved channel dropped"),
        }
    }

    /// Read-only snapshot of every active diagnostic entry, sorted by
    /// display name. Inspector surface only; core logic never consults it.
    #[must_use]
    pub fn entries(&self) -> Vec<ChannelEntry> {
        let guard = self.inner.borrow();
        let mut entries: Vec<ChannelEntry> = guard
            .slots
            .values()
            .flat_map(|slot| slot.entries.iter().cloned())
            .collect();
        entries.sort_by(|a, b| a.name().cmp(b.name()));
        entries
    }

    /// Number of live channels (keys with at least one listener).
    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.inner.borrow().slots.len()
    }

    /// Total number of listener registrations across all channels.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.inner
            .borrow()
            .slots
            .values()
            .map(|slot| slot.channel.listener_count())
            .sum()
    }

    /// Whether no channel is currently alive.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.borrow().slots.is_empty()
    }

    /// Tear down every channel and entry. Kind registrations and interned
    /// tuple identities survive; interned identity is stable for the
    /// bus's lifetime.
    pub fn clear(&self) {
        self.inner.borrow_mut().slots.clear();
    }

    /// Resolve `(K, args)` to its live channel handle, if any. Interns the
    /// tuple as a side effect, like every keyed operation.
    fn lookup<K: ChannelKind>(&self, args: &[ArgValue]) -> Option<Channel<K::Value>> {
        let mut guard = self.inner.borrow_mut();
        let BusInner {
            interner, slots, ..
        } = &mut *guard;
        let args_id = interner.resolve(args);
        let key = BusKey {
            kind: TypeId::of::<K>(),
            args: args_id,
        };
        let slot = slots.get(&key)?;
        let erased = slot
            .channel
            .as_any()
            .downcast_ref::<ErasedChannel<K::Value>>()
            .expect("slot channel type must match its kind's value type");
        Some(erased.channel.clone())
    }
}

impl Default for DataBus {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DataBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("DataBus")
            .field("kinds", &inner.kinds.len())
            .field("channels", &inner.slots.len())
            .field(
                "listeners",
                &inner
                    .slots
                    .values()
                    .map(|slot| slot.channel.listener_count())
                    .sum::<usize>(),
            )
            .finish()
    }
}
