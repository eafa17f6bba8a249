//! Behaviors for each command in the menu

mod connect;
mod files;
mod ping;
mod safemode;
mod telemetry;

pub use connect::rf_lock;
pub use files::update_file_list;
pub use ping::{error_drill, ping};
pub use safemode::safemode;
pub use telemetry::telemetry_beacon;
