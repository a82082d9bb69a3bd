//! Runtime data structures backing the builtin container classes.

pub mod dict;

pub use dict::{hash_number, hash_str, ValueDict};
