//! Token Store Core Components
//!
//! Leaf collaborators of the token store: time source, fingerprinting,
//! token value generation and serialization.

pub mod clock;
pub mod fingerprint;
pub mod serializer;
pub mod token_value;

pub use clock::*;
pub use fingerprint::*;
pub use serializer::*;
pub use token_value::*;
