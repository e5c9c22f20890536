//! Records decoded from daemon responses.
//!
//! Field names follow the Docker Engine API, which uses PascalCase keys.
//! Unknown keys are ignored.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// Lifecycle state reported for a container.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize, Serialize, Display, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ContainerState {
    /// Processes are running.
    Running,
    /// Processes are frozen.
    Paused,
    /// The main process has terminated.
    Exited,
    /// Created but never started.
    Created,
    /// Being restarted by its restart policy.
    Restarting,
    /// Being removed.
    Removing,
    /// Partially removed; cannot be restarted.
    Dead,
    /// A state this client does not recognise.
    #[default]
    #[serde(other)]
    Unknown,
}

/// One entry of `GET /containers/json`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerSummary {
    /// Full container identifier.
    pub id: String,
    /// Names, each with a leading `/`.
    pub names: Vec<String>,
    /// Image the container was created from.
    pub image: String,
    /// Creation time in seconds since the Unix epoch.
    pub created: i64,
    /// Human-readable status, for example `Up 3 hours`.
    pub status: String,
    /// Machine-readable state.
    pub state: ContainerState,
}

impl ContainerSummary {
    /// Primary name without the leading `/`, or the short identifier when
    /// the container has no name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.names
            .first()
            .map_or_else(|| short_id(&self.id), |name| trim_name(name))
    }

    /// The first twelve characters of the identifier.
    #[must_use]
    pub fn short_id(&self) -> &str {
        short_id(&self.id)
    }

    /// Creation time, when the timestamp is representable.
    #[must_use]
    pub fn created_at(&self) -> Option<OffsetDateTime> {
        OffsetDateTime::from_unix_timestamp(self.created).ok()
    }
}

/// Subset of a container's configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerConfig {
    /// Image reference.
    pub image: String,
    /// Command and arguments; `null` when the image default is used.
    #[serde(default)]
    pub cmd: Option<Vec<String>>,
}

/// Runtime state block of `GET /containers/{id}/json`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerStatus {
    /// Lifecycle state.
    pub status: ContainerState,
}

/// Response of `GET /containers/{id}/json`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerDetails {
    /// Full container identifier.
    pub id: String,
    /// Name with a leading `/`.
    pub name: String,
    /// Creation time as an RFC 3339 timestamp.
    pub created: String,
    /// Configuration.
    pub config: ContainerConfig,
    /// Runtime state.
    pub state: ContainerStatus,
}

impl ContainerDetails {
    /// Name without the leading `/`.
    #[must_use]
    pub fn display_name(&self) -> &str {
        trim_name(&self.name)
    }

    /// Image reference.
    #[must_use]
    pub fn image(&self) -> &str {
        &self.config.image
    }

    /// Command line, arguments separated by single spaces.
    #[must_use]
    pub fn command(&self) -> String {
        self.config
            .cmd
            .as_deref()
            .map(|arguments| arguments.join(" "))
            .unwrap_or_default()
    }

    /// Lifecycle state.
    #[must_use]
    pub const fn status(&self) -> ContainerState {
        self.state.status
    }

    /// Parses the creation timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`time::error::Parse`] when the daemon sent a value that is
    /// not RFC 3339.
    pub fn created_at(&self) -> Result<OffsetDateTime, time::error::Parse> {
        OffsetDateTime::parse(&self.created, &Rfc3339)
    }
}

/// Response of `GET /version`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct VersionInfo {
    /// Engine version.
    pub version: String,
    /// Highest supported API version.
    pub api_version: String,
    /// Source revision.
    pub git_commit: String,
    /// Go toolchain version.
    pub go_version: String,
    /// Operating system.
    pub os: String,
    /// CPU architecture.
    pub arch: String,
    /// Host kernel version. Absent on some platforms.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kernel_version: Option<String>,
    /// Build timestamp (RFC 3339).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_time: Option<String>,
}

impl VersionInfo {
    /// Parses the build timestamp, when present and well formed.
    #[must_use]
    pub fn built_at(&self) -> Option<OffsetDateTime> {
        self.build_time
            .as_deref()
            .and_then(|value| OffsetDateTime::parse(value, &Rfc3339).ok())
    }
}

fn trim_name(name: &str) -> &str {
    name.strip_prefix('/').unwrap_or(name)
}

fn short_id(id: &str) -> &str {
    id.get(..12).unwrap_or(id)
}
