mod feed;
mod music;
mod participant;
mod room;
mod signal;
mod update;

pub use feed::*;
pub use music::*;
pub use participant::*;
pub use room::*;
pub use signal::*;
pub use update::*;
