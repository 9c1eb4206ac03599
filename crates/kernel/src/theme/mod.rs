//! Theme engine and template rendering.
//!
//! Page templates are embedded in the binary. A directory of Tera files can
//! override any of them by name.

mod engine;

pub use engine::ThemeEngine;
