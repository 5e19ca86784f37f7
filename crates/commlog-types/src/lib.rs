//! Shared types for the commlog call and message cache.

mod filter;
mod record;
mod source;
mod summary;
mod sync;
mod ws;

pub use filter::*;
pub use record::*;
pub use source::*;
pub use summary::*;
pub use sync::*;
pub use ws::*;
