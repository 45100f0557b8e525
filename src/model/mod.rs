//! Core data model: request context, identities, and queue envelopes.

pub mod context;
pub mod envelope;

pub use context::{Context, License};
pub use envelope::{Envelope, GroupId, TraitValue, Traits, Unroutable, UserId, name_traits};
