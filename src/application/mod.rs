//! Application layer: persistence ports and commit notifications.

pub mod commit;
pub mod error;
pub mod graph;
