#![deny(unreachable_pub)]

// Public modules that make up the data model shared between the host and
// the edit-and-continue service.
pub mod active_statement;
pub mod document;
pub mod ids;
pub mod read_only;
pub mod span;
