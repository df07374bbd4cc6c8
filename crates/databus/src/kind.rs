#![forbid(unsafe_code)]

//! Channel kind markers and their construction contract.
//!
//! A *kind* names "which channel" independently of its parameters:
//! `PlayerHealth` vs `PlayerMana`, with the parameter tuple telling
//! per-player instances apart. Kinds are plain marker types; the registry
//! keys on their `TypeId` and builds the backing [`Channel`] through the
//! factory registered for the kind (see
//! [`DataBus::register_kind`](crate::bus::DataBus::register_kind)).

use std::fmt;

use crate::args::ArgValue;
use crate::channel::Channel;

/// Error raised by a kind constructor that rejects its parameter tuple.
///
/// This is the one hard failure in the registry protocol: reads and
/// removals fail soft, but a malformed tuple reaching a constructor
/// surfaces to the `add_listener` caller.
#[derive(Debug, Clone)]
pub struct ConstructError {
    reason: String,
}

impl ConstructError {
    /// Describe why the tuple was rejected.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    /// The rejection message.
    #[must_use]
    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl fmt::Display for ConstructError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "channel construction failed: {}", self.reason)
    }
}

impl std::error::Error for ConstructError {}

/// A concrete channel kind.
///
/// Implementors are marker types: the registry never stores a kind value,
/// only its `TypeId`, its diagnostic [`name`](ChannelKind::name), and the
/// constructor. The constructor runs lazily, on the first listener
/// registration for a `(kind, args)` key, and receives the canonical
/// interned tuple — the empty tuple when the kind is unparameterized.
///
/// # Example
///
/// ```
/// use databus::{ArgValue, Channel, ChannelKind, ConstructError};
///
/// struct PlayerHealth;
///
/// impl ChannelKind for PlayerHealth {
///     type Value = i32;
///
///     fn name() -> &'static str {
///         "PlayerHealth"
///     }
///
///     fn construct(args: &[ArgValue]) -> Result<Channel<i32>, ConstructError> {
///         match args {
///             [] | [ArgValue::Int(_)] => Ok(Channel::new(100)),
///             other => Err(ConstructError::new(format!(
///                 "expected at most one player id, got {} parameters",
///                 other.len()
///             ))),
///         }
///     }
/// }
/// ```
pub trait ChannelKind: 'static {
    /// Value type carried by channels of this kind.
    type Value: Clone + Default + 'static;

    /// Diagnostic label used in registry entry names.
    fn name() -> &'static str;

    /// Build the backing channel for one `(kind, args)` slot.
    ///
    /// Seeds the slot's initial value; a kind parameterized per entity can
    /// derive it from `args`. Rejecting a malformed tuple here propagates
    /// as [`BusError::Construct`](crate::bus::BusError::Construct) to the
    /// `add_listener` caller.
    fn construct(args: &[ArgValue]) -> Result<Channel<Self::Value>, ConstructError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Score;

    impl ChannelKind for Score {
        type Value = u32;

        fn name() -> &'static str {
            "Score"
        }

        fn construct(args: &[ArgValue]) -> Result<Channel<u32>, ConstructError> {
            if args.is_empty() {
                Ok(Channel::new(0))
            } else {
                Err(ConstructError::new("Score takes no parameters"))
            }
        }
    }

    #[test]
    fn construct_with_empty_tuple() {
        let channel = Score::construct(&[]).unwrap();
        assert_eq!(channel.value(), 0);
    }

    #[test]
    fn construct_error_carries_reason() {
        let err = Score::construct(&[ArgValue::Int(1)]).unwrap_err();
        assert_eq!(err.reason(), "Score takes no parameters");
        assert!(err.to_string().contains("Score takes no parameters"));
    }
}
