//! Area identifiers, redacted secrets, and stored credential records.

pub mod id;
pub mod record;
pub mod secret;

pub use id::*;
pub use record::*;
pub use secret::*;
