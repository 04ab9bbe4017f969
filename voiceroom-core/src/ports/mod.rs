mod media;
mod services;
mod store;

pub use media::*;
pub use services::*;
pub use store::*;
