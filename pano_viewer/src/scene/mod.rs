//! Declarative scene descriptions and the query-string plumbing around them.

mod descriptor;
pub mod query;

pub use descriptor::{SceneDescriptor, SceneDescriptorBuilder};
pub use query::{sanitize_message, uri_encode};
