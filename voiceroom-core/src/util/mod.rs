mod clock;
mod id;

pub use clock::*;
pub use id::*;

/// Identifies a user across every room.
pub type UserId = String;

/// Identifies a room document.
pub type RoomId = String;

/// Identifies an entry in a room sub-collection (signals, invites, feed).
pub type DocumentId = String;
