//! Bit-granular serialization for the Opal transport.
//!
//! The wire format this workspace implements frames fields at bit
//! granularity, so correctness of the whole protocol rests on the exact
//! cursor semantics of [`BitStream`]. See the module docs in [`stream`].

pub mod error;
pub mod stream;
pub mod traits;

pub use error::{BitStreamError, Result};
pub use stream::BitStream;
pub use traits::{FromStream, ToStream};
