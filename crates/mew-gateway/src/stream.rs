//! Stream registry and state machine (§3.3, §4.1.2, §4.3).

use std::collections::{HashMap, HashSet};

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamDirection {
    Upload,
    Download,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamState {
    Requested,
    Open,
    Closed,
}

#[derive(Debug, Clone)]
pub struct Stream {
    pub stream_id: String,
    pub direction: StreamDirection,
    pub description: String,
    pub encoding: String,
    pub owner: String,
    pub authorized_writers: HashSet<String>,
    pub state: StreamState,
}

impl Stream {
    fn new(
        stream_id: String,
        direction: StreamDirection,
        description: String,
        encoding: String,
        owner: String,
    ) -> Self {
        let mut authorized_writers = HashSet::new();
        authorized_writers.insert(owner.clone());
        Self {
            stream_id,
            direction,
            description,
            encoding,
            owner,
            authorized_writers,
            state: StreamState::Requested,
        }
    }
}

/// Errors produced by owner-only stream operations; each maps to a `system/error` kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOpError {
    NotOwner,
    UnknownStream,
    StreamClosed,
}

/// Per-space registry of streams. Owned exclusively by the gateway (§5 shared-resource policy).
#[derive(Debug, Default)]
pub struct StreamRegistry {
    streams: HashMap<String, Stream>,
}

impl StreamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, stream_id: &str) -> Option<&Stream> {
        self.streams.get(stream_id)
    }

    /// `stream/request` pre-routing: allocate and register a stream in `requested` state.
    pub fn request(
        &mut self,
        stream_id: String,
        direction: StreamDirection,
        description: String,
        encoding: String,
        requester: String,
    ) {
        self.streams
            .insert(stream_id.clone(), Stream::new(stream_id, direction, description, encoding, requester));
    }

    /// Transition `requested -> open`, the moment the gateway emits `stream/open`.
    pub fn open(&mut self, stream_id: &str) -> Result<(), StreamOpError> {
        let stream = self.streams.get_mut(stream_id).ok_or(StreamOpError::UnknownStream)?;
        stream.state = StreamState::Open;
        Ok(())
    }

    pub fn grant_write(
        &mut self,
        stream_id: &str,
        owner: &str,
        participant_id: &str,
    ) -> Result<HashSet<String>, StreamOpError> {
        let stream = self.owned_mut(stream_id, owner)?;
        stream.authorized_writers.insert(participant_id.to_string());
        Ok(stream.authorized_writers.clone())
    }

    pub fn revoke_write(
        &mut self,
        stream_id: &str,
        owner: &str,
        participant_id: &str,
    ) -> Result<HashSet<String>, StreamOpError> {
        let stream = self.owned_mut(stream_id, owner)?;
        if participant_id != stream.owner {
            stream.authorized_writers.remove(participant_id);
        }
        Ok(stream.authorized_writers.clone())
    }

    /// `owner := new_owner`; `authorized_writers := {new_owner}` (§4.3 table, no re-grant in v0.4).
    pub fn transfer_ownership(
        &mut self,
        stream_id: &str,
        owner: &str,
        new_owner: &str,
    ) -> Result<(String, HashSet<String>), StreamOpError> {
        let stream = self.owned_mut(stream_id, owner)?;
        let previous_owner = stream.owner.clone();
        stream.owner = new_owner.to_string();
        stream.authorized_writers = HashSet::from([new_owner.to_string()]);
        Ok((previous_owner, stream.authorized_writers.clone()))
    }

    pub fn close(&mut self, stream_id: &str, owner: &str) -> Result<(), StreamOpError> {
        self.owned_mut(stream_id, owner)?.state = StreamState::Closed;
        Ok(())
    }

    /// Close every stream owned by a disconnecting participant; returns their ids (§4.1 disconnect).
    pub fn close_all_owned_by(&mut self, owner: &str) -> Vec<String> {
        let mut closed = Vec::new();
        for stream in self.streams.values_mut() {
            if stream.owner == owner && stream.state != StreamState::Closed {
                stream.state = StreamState::Closed;
                closed.push(stream.stream_id.clone());
            }
        }
        closed
    }

    /// Validate a raw stream frame against the writer/open-state invariant (§8.1).
    pub fn authorize_frame(&self, stream_id: &str, sender: &str) -> Result<(), StreamOpError> {
        let stream = self.streams.get(stream_id).ok_or(StreamOpError::UnknownStream)?;
        match stream.state {
            StreamState::Closed => Err(StreamOpError::StreamClosed),
            StreamState::Requested => Err(StreamOpError::UnknownStream),
            StreamState::Open if stream.authorized_writers.contains(sender) => Ok(()),
            StreamState::Open => Err(StreamOpError::NotOwner),
        }
    }

    fn owned_mut(&mut self, stream_id: &str, owner: &str) -> Result<&mut Stream, StreamOpError> {
        let stream = self.streams.get_mut(stream_id).ok_or(StreamOpError::UnknownStream)?;
        if stream.owner != owner {
            return Err(StreamOpError::NotOwner);
        }
        Ok(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_stream(registry: &mut StreamRegistry, id: &str, owner: &str) {
        registry.request(
            id.to_string(),
            StreamDirection::Upload,
            "test".to_string(),
            "utf-8".to_string(),
            owner.to_string(),
        );
        registry.open(id).unwrap();
    }

    #[test]
    fn owner_is_always_an_authorized_writer() {
        let mut registry = StreamRegistry::new();
        open_stream(&mut registry, "s1", "owner");
        assert!(registry.authorize_frame("s1", "owner").is_ok());
    }

    #[test]
    fn non_writer_frame_rejected() {
        let mut registry = StreamRegistry::new();
        open_stream(&mut registry, "s1", "owner");
        assert_eq!(registry.authorize_frame("s1", "intruder"), Err(StreamOpError::NotOwner));
    }

    #[test]
    fn grant_then_revoke_write_access() {
        let mut registry = StreamRegistry::new();
        open_stream(&mut registry, "s1", "owner");

        registry.grant_write("s1", "owner", "writer").unwrap();
        assert!(registry.authorize_frame("s1", "writer").is_ok());

        registry.revoke_write("s1", "owner", "writer").unwrap();
        assert_eq!(registry.authorize_frame("s1", "writer"), Err(StreamOpError::NotOwner));
    }

    #[test]
    fn non_owner_cannot_grant() {
        let mut registry = StreamRegistry::new();
        open_stream(&mut registry, "s1", "owner");
        assert_eq!(registry.grant_write("s1", "not-owner", "writer"), Err(StreamOpError::NotOwner));
    }

    #[test]
    fn transfer_ownership_resets_writer_set() {
        let mut registry = StreamRegistry::new();
        open_stream(&mut registry, "s1", "owner");
        registry.grant_write("s1", "owner", "writer").unwrap();

        let (previous, writers) = registry.transfer_ownership("s1", "owner", "writer").unwrap();
        assert_eq!(previous, "owner");
        assert_eq!(writers, HashSet::from(["writer".to_string()]));
        assert_eq!(registry.authorize_frame("s1", "owner"), Err(StreamOpError::NotOwner));
        assert!(registry.authorize_frame("s1", "writer").is_ok());

        // previous owner can no longer perform owner-only ops
        assert_eq!(registry.grant_write("s1", "owner", "someone"), Err(StreamOpError::NotOwner));
    }

    #[test]
    fn closed_stream_rejects_frames_and_ops() {
        let mut registry = StreamRegistry::new();
        open_stream(&mut registry, "s1", "owner");
        registry.close("s1", "owner").unwrap();
        assert_eq!(registry.authorize_frame("s1", "owner"), Err(StreamOpError::StreamClosed));
    }

    #[test]
    fn disconnect_closes_all_owned_streams() {
        let mut registry = StreamRegistry::new();
        open_stream(&mut registry, "s1", "owner");
        open_stream(&mut registry, "s2", "owner");
        open_stream(&mut registry, "s3", "other");

        let mut closed = registry.close_all_owned_by("owner");
        closed.sort();
        assert_eq!(closed, vec!["s1".to_string(), "s2".to_string()]);
        assert_eq!(registry.get("s3").unwrap().state, StreamState::Open);
    }
}
