mod config;
mod events;
mod model;
mod ports;
mod util;

pub use config::*;
pub use events::*;
pub use model::*;
pub use ports::*;
pub use util::*;
