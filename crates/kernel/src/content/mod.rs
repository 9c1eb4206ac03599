//! Content management module.
//!
//! This module provides:
//! - EntryService: entry CRUD, publication rules and listings
//! - BodyRenderer: markdown or plain text bodies to HTML
//! - FormBuilder: HTML inputs for content template fields

mod filter;
mod form;
mod service;

pub use filter::{BodyFormat, BodyRenderer, RenderStep};
pub use form::{FormBuilder, stored_values};
pub use service::{
    ContentError, ContentResult, EMPTY_ENTRY_MESSAGE, EntryDraft, EntryService, EntryView,
    FieldInput, can_edit,
};
