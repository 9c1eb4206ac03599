//! Data models.

pub mod entry;
pub mod policy;
pub mod user;

pub use entry::{Entry, EntryChanges, NewEntry, TITLE_MAX_LENGTH};
pub use policy::{Policy, PolicyInput, PolicyKind, PolicyRow};
pub use user::{NewUser, User};
