#![forbid(unsafe_code)]

//! Typed publish/subscribe data channels behind a process-scoped registry.
//!
//! A *channel* is a single named, typed value slot with observers, keyed
//! by a kind marker plus an optional parameter tuple. The [`DataBus`]
//! registry owns every channel: it canonicalizes parameter tuples by value
//! equality, constructs channels lazily on first subscription, replays the
//! current value to new listeners, and evicts a channel the moment its
//! last listener leaves.
//!
//! # Architecture
//!
//! - [`Channel<T>`]: the leaf — one value, a version counter, and an
//!   ordered listener list, with synchronous set/notify and awaitable
//!   hooks through [`ValueSource`].
//! - [`ArgsInterner`]: value-equality canonicalization of [`ArgValue`]
//!   tuples into stable [`ArgsId`]s.
//! - [`ChannelKind`]: the construction contract a concrete kind
//!   implements; registered on the bus as a factory, optionally with a
//!   closure capturing environment.
//! - [`DataBus`]: the registry mapping `(kind, interned args)` to channel
//!   slots, with [`ChannelEntry`] diagnostics on the side.
//!
//! Everything is single-threaded by design (`Rc<RefCell<..>>`, the same
//! cooperative model as a UI update loop); the bus is an explicit context
//! object handed to call sites rather than a process global.
//!
//! # Invariants
//!
//! 1. A newly added listener is invoked exactly once with
//!    `(T::default(), current)` before it observes any change.
//! 2. Every set call notifies all listeners, in registration order, with
//!    `(previous, new)` pairs forming an unbroken chain.
//! 3. Equal-by-value parameter tuples from different call sites resolve
//!    to the same channel instance.
//! 4. A channel with zero listeners does not exist: reads return the
//!    value type's default, writes are dropped, and re-subscription
//!    observes the factory-seeded value.
//!
//! # Example
//!
//! ```
//! use databus::{args, ArgValue, Channel, ChannelKind, ConstructError, DataBus};
//!
//! struct PlayerHealth;
//!
//! impl ChannelKind for PlayerHealth {
//!     type Value = i32;
//!
//!     fn name() -> &'static str {
//!         "PlayerHealth"
//!     }
//!
//!     fn construct(_args: &[ArgValue]) -> Result<Channel<i32>, ConstructError> {
//!         Ok(Channel::new(100))
//!     }
//! }
//!
//! let bus = DataBus::new();
//! bus.register_kind::<PlayerHealth>();
//!
//! let handle = bus
//!     .add_listener::<PlayerHealth>(&args![7], |old, new| {
//!         println!("player 7 health: {old} -> {new}");
//!     })
//!     .unwrap();
//!
//! bus.set_value::<PlayerHealth>(85, &args![7]);
//! assert_eq!(bus.get_value::<PlayerHealth>(&args![7]), 85);
//!
//! bus.remove_listener(handle);
//! // Last listener gone: the channel and its value were discarded.
//! assert_eq!(bus.get_value::<PlayerHealth>(&args![7]), 0);
//! ```

/// Channel parameter values and the `args![..]` macro.
pub mod args;
/// The process-scoped registry.
pub mod bus;
/// The typed channel leaf and its async hooks.
pub mod channel;
/// Type-erased storage and diagnostic entries.
pub mod entry;
/// Value-equality interning of parameter tuples.
pub mod interner;
/// Channel kind markers and construction.
pub mod kind;

pub use args::ArgValue;
pub use bus::{BusError, DataBus, ListenerHandle};
pub use channel::{Channel, InMemory, ListenerId, ValueSource};
pub use entry::{ChannelEntry, ChannelId};
pub use interner::{ArgsId, ArgsInterner};
pub use kind::{ChannelKind, ConstructError};
