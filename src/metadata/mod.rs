//! CLI metadata parsing: the CLR runtime header, the metadata root with its
//! stream directory, the `#~` tables stream, heaps, signatures and method
//! bodies, tied together by [`view::MetadataView`].

pub mod body;
pub mod cor20;
pub mod root;
pub mod signatures;
pub mod streams;
pub mod tables;
pub mod token;
pub mod view;

pub use cor20::Cor20Header;
pub use token::Token;
pub use view::MetadataView;
