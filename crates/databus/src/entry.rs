#![forbid(unsafe_code)]

//! Type-erased channel storage and per-listener diagnostic entries.
//!
//! The registry holds many `Channel<T>` instances for varying `T` behind
//! one map. Storage goes through [`AnyChannel`], an internal trait exposing
//! only type-erased operations (instance id, diagnostic kind name,
//! listener bookkeeping) plus an `as_any` downcast that recovers the
//! concrete `Channel<T>` for typed operations. The registry key embeds the
//! kind's `TypeId`, so a successful lookup always downcasts.
//!
//! [`ChannelEntry`] is the introspection side: one record per registered
//! listener, never consulted for correctness.

use std::any::Any;
use std::rc::Rc;

use crate::args::{ArgValue, format_tuple};
use crate::channel::{Channel, ListenerId};

/// Identity of one constructed channel instance.
///
/// Allocated by the bus and never reused, so a listener handle minted
/// before a slot was evicted cannot alias the slot's replacement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelId(pub(crate) u64);

/// Type-erased operations over a stored [`Channel`].
pub(crate) trait AnyChannel {
    fn id(&self) -> ChannelId;
    fn kind_name(&self) -> &'static str;
    fn listener_count(&self) -> usize;
    fn remove_listener(&self, id: ListenerId) -> bool;
    fn as_any(&self) -> &dyn Any;
}

/// A `Channel<T>` tagged with its bus-assigned identity.
pub(crate) struct ErasedChannel<T> {
    pub(crate) id: ChannelId,
    pub(crate) kind: &'static str,
    pub(crate) channel: Channel<T>,
}

impl<T: Clone + Default + 'static> AnyChannel for ErasedChannel<T> {
    fn id(&self) -> ChannelId {
        self.id
    }

    fn kind_name(&self) -> &'static str {
        self.kind
    }

    fn listener_count(&self) -> usize {
        self.channel.listener_count()
    }

    fn remove_listener(&self, id: ListenerId) -> bool {
        self.channel.remove_listener(id)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Diagnostic record for one registered listener.
///
/// Exposed read-only through [`DataBus::entries`](crate::bus::DataBus::entries)
/// for inspector-style tooling. The display name composes the kind, the
/// parenthesized parameter tuple, the caller-supplied owner label if any,
/// and the listener id: `PlayerHealth(7) >> hud #1`.
#[derive(Debug, Clone)]
pub struct ChannelEntry {
    name: String,
    kind: &'static str,
    owner: Option<String>,
    args: Rc<[ArgValue]>,
    listener: ListenerId,
}

impl ChannelEntry {
    pub(crate) fn new(
        kind: &'static str,
        owner: Option<String>,
        args: Rc<[ArgValue]>,
        listener: ListenerId,
    ) -> Self {
        let mut name = String::from(kind);
        if !args.is_empty() {
            name.push('(');
            name.push_str(&format_tuple(&args));
            name.push(')');
        }
        if let Some(owner) = &owner {
            name.push_str(" >> ");
            name.push_str(owner);
        }
        name.push_str(&format!(" #{}", listener.raw()));
        Self {
            name,
            kind,
            owner,
            args,
            listener,
        }
    }

    /// Human-readable label, used as the sort key of the entry listing.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Diagnostic name of the kind this listener is registered under.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// Caller-supplied owner label, if one was given.
    #[must_use]
    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    /// The canonical parameter tuple of the entry's channel.
    #[must_use]
    pub fn args(&self) -> &[ArgValue] {
        &self.args
    }

    /// The listener registration this entry describes.
    #[must_use]
    pub fn listener(&self) -> ListenerId {
        self.listener
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args;

    fn entry(owner: Option<&str>, args: Rc<[ArgValue]>) -> ChannelEntry {
        let channel = Channel::new(0i32);
        let id = channel.add_listener(|_, _| {});
        ChannelEntry::new("PlayerHealth", owner.map(String::from), args, id)
    }

    #[test]
    fn name_without_owner_or_args() {
        let e = entry(None, Rc::from(Vec::new()));
        assert_eq!(e.name(), "PlayerHealth #1");
        assert_eq!(e.kind(), "PlayerHealth");
        assert_eq!(e.owner(), None);
        assert!(e.args().is_empty());
    }

    #[test]
    fn name_with_owner_and_args() {
        let e = entry(Some("hud"), Rc::from(args![7].to_vec()));
        assert_eq!(e.name(), "PlayerHealth(7) >> hud #1");
        assert_eq!(e.owner(), Some("hud"));
        assert_eq!(e.args(), &args![7]);
    }

    #[test]
    fn erased_channel_roundtrip() {
        let channel = Channel::new(5i32);
        let erased: Box<dyn AnyChannel> = Box::new(ErasedChannel {
            id: ChannelId(3),
            kind: "Score",
            channel: channel.clone(),
        });
        assert_eq!(erased.id(), ChannelId(3));
        assert_eq!(erased.kind_name(), "Score");
        assert_eq!(erased.listener_count(), 0);

        let recovered = erased
            .as_any()
            .downcast_ref::<ErasedChannel<i32>>()
            .unwrap();
        assert_eq!(recovered.channel.value(), 5);

        let id = channel.add_listener(|_, _| {});
        assert_eq!(erased.listener_count(), 1);
        assert!(erased.remove_listener(id));
        assert!(!erased.remove_listener(id));
    }
}
