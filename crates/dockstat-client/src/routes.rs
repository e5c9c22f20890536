//! Daemon API routes.
//!
//! [`Route`] is the closed set of operations the client performs. Each maps
//! to a fixed method and an origin-form path; nothing here touches a socket.

use std::fmt;

use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};

use crate::codec::{Method, OutgoingRequest};

/// Characters escaped when an identifier is embedded as one path segment.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// A logical daemon operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Route {
    /// `GET /containers/json`, optionally including stopped containers.
    ListContainers {
        /// Include containers that are not running.
        all: bool,
    },
    /// `GET /containers/{id}/json`.
    GetContainer {
        /// Container identifier or name.
        id: String,
    },
    /// `POST /containers/{id}/start`.
    StartContainer {
        /// Container identifier or name.
        id: String,
    },
    /// `POST /containers/{id}/stop`.
    StopContainer {
        /// Container identifier or name.
        id: String,
    },
    /// `POST /containers/{id}/pause`.
    PauseContainer {
        /// Container identifier or name.
        id: String,
    },
    /// `POST /containers/{id}/unpause`.
    ResumeContainer {
        /// Container identifier or name.
        id: String,
    },
    /// `DELETE /containers/{id}`.
    RemoveContainer {
        /// Container identifier or name.
        id: String,
    },
    /// `GET /version`.
    GetVersion,
}

impl Route {
    /// HTTP method used by the route.
    #[must_use]
    pub const fn method(&self) -> Method {
        match self {
            Self::ListContainers { .. } | Self::GetContainer { .. } | Self::GetVersion => {
                Method::Get
            }
            Self::StartContainer { .. }
            | Self::StopContainer { .. }
            | Self::PauseContainer { .. }
            | Self::ResumeContainer { .. } => Method::Post,
            Self::RemoveContainer { .. } => Method::Delete,
        }
    }

    /// Origin-form request target, query string included.
    #[must_use]
    pub fn path(&self) -> String {
        match self {
            Self::ListContainers { all: false } => "/containers/json".to_owned(),
            Self::ListContainers { all: true } => "/containers/json?all=1".to_owned(),
            Self::GetContainer { id } => container_path(id, Some("json")),
            Self::StartContainer { id } => container_path(id, Some("start")),
            Self::StopContainer { id } => container_path(id, Some("stop")),
            Self::PauseContainer { id } => container_path(id, Some("pause")),
            Self::ResumeContainer { id } => container_path(id, Some("unpause")),
            Self::RemoveContainer { id } => container_path(id, None),
            Self::GetVersion => "/version".to_owned(),
        }
    }

    /// Builds the request for this route.
    #[must_use]
    pub fn request(&self) -> OutgoingRequest {
        OutgoingRequest::new(self.method(), self.path())
    }

    /// Returns true for routes that change container state.
    ///
    /// The daemon answers these with `304 Not Modified` when the container is
    /// already in the requested state.
    #[must_use]
    pub const fn is_state_change(&self) -> bool {
        matches!(
            self,
            Self::StartContainer { .. }
                | Self::StopContainer { .. }
                | Self::PauseContainer { .. }
                | Self::ResumeContainer { .. }
        )
    }
}

impl fmt::Display for Route {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{} {}", self.method(), self.path())
    }
}

fn container_path(id: &str, action: Option<&str>) -> String {
    let segment = utf8_percent_encode(id, PATH_SEGMENT);
    match action {
        Some(action) => format!("/containers/{segment}/{action}"),
        None => format!("/containers/{segment}"),
    }
}
