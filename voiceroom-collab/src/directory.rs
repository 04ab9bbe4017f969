use std::sync::Arc;

use dashmap::DashMap;
use log::info;
use thiserror::Error;
use voiceroom_core::{document_id, NewRoom, Profile, RoomDocument, RoomId, StoreError, UserId};

use crate::{Denied, RoomSession, SessionContext, SessionError};

/// Creates rooms and keeps track of the sessions running in this process.
pub struct RoomDirectory {
    context: SessionContext,
    sessions: DashMap<(RoomId, UserId), Arc<RoomSession>>,
}

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("{user_id} is already in {room_id}")]
    AlreadyJoined { room_id: RoomId, user_id: UserId },
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Denied(#[from] Denied),
}

impl RoomDirectory {
    pub fn new(context: &SessionContext) -> Self {
        Self {
            context: context.clone(),
            sessions: Default::default(),
        }
    }

    /// Creates a new, active room. The creator still has to join it.
    pub async fn create_room(&self, new_room: NewRoom) -> Result<RoomDocument, StoreError> {
        let room = RoomDocument::new(document_id(), new_room);
        self.context.store.put_room(room.clone()).await?;

        info!("{} created room {} ({})", room.created_by, room.name, room.id);
        Ok(room)
    }

    /// Deletes a room outright, ending every session in it
    pub async fn delete_room(&self, room_id: &str, actor: &str) -> Result<(), DirectoryError> {
        let room = self.context.store.room(room_id).await?;

        if !room.is_host(actor) {
            return Err(Denied::NotHost("delete the room").into());
        }

        self.context.store.delete_room(room_id).await?;
        self.sessions.retain(|(id, _), _| id != room_id);

        info!("{actor} deleted room {room_id}");
        Ok(())
    }

    pub async fn join(
        &self,
        room_id: &str,
        profile: Profile,
    ) -> Result<Arc<RoomSession>, DirectoryError> {
        let key = (room_id.to_string(), profile.uid.clone());

        if let Some(existing) = self.sessions.get(&key) {
            if existing.exit_reason().is_none() {
                return Err(DirectoryError::AlreadyJoined {
                    room_id: key.0,
                    user_id: key.1,
                });
            }
        }

        let session = Arc::new(RoomSession::join(&self.context, room_id, profile).await?);
        self.sessions.insert(key, session.clone());

        Ok(session)
    }

    /// Leaves a room and forgets the session
    pub async fn leave(&self, room_id: &str, user_id: &str) -> Result<(), SessionError> {
        let key = (room_id.to_string(), user_id.to_string());

        match self.sessions.remove(&key) {
            Some((_, session)) => session.leave().await,
            None => Ok(()),
        }
    }

    pub fn session(&self, room_id: &str, user_id: &str) -> Option<Arc<RoomSession>> {
        let key = (room_id.to_string(), user_id.to_string());
        self.sessions.get(&key).map(|s| s.clone())
    }

    /// Every session that hasn't ended
    pub fn list_live(&self) -> Vec<Arc<RoomSession>> {
        self.sessions
            .iter()
            .filter(|s| s.exit_reason().is_none())
            .map(|s| s.clone())
            .collect()
    }

    /// Forgets sessions that ended on their own
    pub fn prune(&self) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, s| s.exit_reason().is_none());

        before - self.sessions.len()
    }
}
