//! Resolution of function ids to class and method names.

pub mod resolver;

pub use resolver::{NameResolver, NameSource, ResolveReport};
