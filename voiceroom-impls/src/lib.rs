mod http;
mod loopback;
mod memory_relay;
mod memory_services;
mod memory_store;
mod player;
mod util;

pub use http::*;
pub use loopback::*;
pub use memory_relay::*;
pub use memory_services::*;
pub use memory_store::*;
pub use player::*;
