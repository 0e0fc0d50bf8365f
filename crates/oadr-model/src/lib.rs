//! Shared data model: the (vtn_id, event_id) keyed event, its parsed
//! descriptor, and the VEN's own immutable identity. No I/O here — the
//! raw XML bytes remain the single source of truth (`oadr-store`), these
//! types are what the handler/controller extract from it per request.

mod event;
mod identity;

pub use event::{EventDescriptor, EventKey, Signal, SignalInterval, SignalType, StoredEvent, Targets};
pub use identity::{OadrProfile, VenIdentity};
