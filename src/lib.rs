//! Server-side gate for git pushes: a ref update is accepted only when the
//! object it points to carries an SSH signature from a key authorized for
//! that part of the ref namespace.

pub mod config;
pub mod extract;
pub mod gate;
pub mod hook;
pub mod object;
pub mod store;
pub mod trust;

pub use gate::{BatchReport, Gate, Rejection, Verdict};
pub use hook::ReferenceUpdate;
pub use object::{ObjectId, ObjectType};
