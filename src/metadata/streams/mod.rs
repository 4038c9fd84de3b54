//! Heaps referenced by the metadata tables: the `#Strings` identifier heap
//! and the `#Blob` heap holding signatures and custom attribute values.

mod blob;
mod strings;

pub use blob::Blob;
pub use strings::Strings;
