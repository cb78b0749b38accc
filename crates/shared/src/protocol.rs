use serde::{Deserialize, Serialize};

use crate::{
    domain::{ProjectId, TaskId, UserId},
    error::ApiError,
};

/// Events a client may send over its socket after the handshake.
///
/// Join/leave manage room membership; the rest are collaboration signals
/// scoped to a single project room.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ClientEvent {
    JoinProject {
        project_id: ProjectId,
    },
    LeaveProject {
        project_id: ProjectId,
    },
    TaskMoved {
        task_id: TaskId,
        project_id: ProjectId,
        phase: String,
    },
    LockTask {
        task_id: TaskId,
        project_id: ProjectId,
    },
    UnlockTask {
        task_id: TaskId,
        project_id: ProjectId,
    },
}

/// Events pushed to clients. Lock replies (`LockAcquired`/`LockDenied`) go
/// to the requesting connection only; the rest fan out to a project room.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServerEvent {
    TaskUpdated {
        task_id: TaskId,
        project_id: ProjectId,
        phase: String,
    },
    TaskLocked {
        task_id: TaskId,
        locked_by: UserId,
    },
    TaskUnlocked {
        task_id: TaskId,
    },
    LockAcquired {
        task_id: TaskId,
    },
    LockDenied {
        task_id: TaskId,
    },
    NewMessage {
        project_id: ProjectId,
        message: serde_json::Value,
    },
    Error(ApiError),
}

/// Body of the `POST /relay` collaborator endpoint: the CRUD layer hands
/// over an already-persisted change for fan-out to a project room.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayRequest {
    pub project_id: ProjectId,
    pub event: ServerEvent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceStatus {
    pub identity: UserId,
    pub online: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_events_use_snake_case_tags() {
        let event: ClientEvent = serde_json::from_str(
            r#"{"type":"lock_task","payload":{"task_id":"t9","project_id":"p1"}}"#,
        )
        .expect("decode");
        assert!(matches!(event, ClientEvent::LockTask { task_id, .. } if task_id.as_str() == "t9"));
    }

    #[test]
    fn server_events_carry_holder_identity() {
        let event = ServerEvent::TaskLocked {
            task_id: TaskId::new("t9"),
            locked_by: UserId::new("alice"),
        };
        let json = serde_json::to_value(&event).expect("encode");
        assert_eq!(json["type"], "task_locked");
        assert_eq!(json["payload"]["locked_by"], "alice");
    }
}
