//! Overlay selectors
//!
//! A selector names one location in a rule document tree. Three forms:
//!
//! - entity: `rule[id=testing]`, `section[heading="Code Style"]`
//! - index: `sections[2]`
//! - path: `vendor.cursor.globs`, `sections[0].vendor`
//!
//! Entity and index selectors may continue with a dot path
//! (`rule[id=testing].vendor.cursor`). Selector strings parse into a
//! closed `Selector` AST; resolution against a JSON tree either yields a
//! concrete path or explains why nothing matched.

mod error;
mod parser;
mod patch;
mod resolve;

pub use error::SelectorError;
pub use parser::{parse_selector, EntityField, EntityKind, PathSegment, Selector};
pub use patch::{remove_dotted, set_dotted, value_at, value_at_mut};
pub use resolve::{resolve, Resolution};
