//! Interning tables for strings and classes.
//!
//! Both tables are owned by the dump context and live for one dump.
//! Entries are appended in insertion order and remembered as pending
//! until the context writes their definition records; a table never
//! hands out the same id for different content.
//!
//! A table must be started before use. Any call on a table that was never
//! started, or that was shut down, fails with
//! [`crate::Reason::TableUninitialized`].

mod class;
mod string;

pub use class::{ClassEntry, ClassTable, FieldDescriptor};
pub use string::{StringTable, FIRST_STRING_ID};
