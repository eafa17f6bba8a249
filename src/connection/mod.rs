//! Persistent link to ground control

mod manager;

pub use manager::{Link, LinkConfig, LinkEvent, LinkSender};
