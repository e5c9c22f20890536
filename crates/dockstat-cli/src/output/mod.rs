//! Rendering of daemon records for people and for scripts.
//!
//! Human output is a set of aligned tables and field lists. JSON output is
//! one compact document per line, so `watch --output json` produces a
//! stream of JSON lines.

mod table;

use std::io::Write;

use clap::ValueEnum;
use dockstat_client::{ContainerDetails, ContainerSummary, VersionInfo};
use serde::Serialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::AppError;
use table::{Table, write_fields};

/// Output format selection for command results.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, ValueEnum)]
pub enum OutputFormat {
    /// Selects `human` for terminal output and `json` for redirected output.
    #[default]
    Auto,
    /// Always render human-readable output.
    Human,
    /// Always emit JSON records.
    Json,
}

/// Output format after resolving `auto` based on TTY detection.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ResolvedOutputFormat {
    /// Aligned tables and field lists.
    Human,
    /// One JSON document per line.
    Json,
}

impl OutputFormat {
    /// Resolves the output format based on whether stdout is a terminal.
    #[must_use]
    pub const fn resolve(self, stdout_is_terminal: bool) -> ResolvedOutputFormat {
        match self {
            Self::Auto => {
                if stdout_is_terminal {
                    ResolvedOutputFormat::Human
                } else {
                    ResolvedOutputFormat::Json
                }
            }
            Self::Human => ResolvedOutputFormat::Human,
            Self::Json => ResolvedOutputFormat::Json,
        }
    }
}

/// Result of a lifecycle command, as reported in JSON mode.
#[derive(Debug, Serialize)]
struct ActionRecord<'a> {
    action: &'a str,
    id: &'a str,
}

/// Writes records to stdout in the resolved format.
pub(crate) struct Renderer<'a, W: Write> {
    out: &'a mut W,
    format: ResolvedOutputFormat,
}

impl<'a, W: Write> Renderer<'a, W> {
    pub(crate) const fn new(out: &'a mut W, format: ResolvedOutputFormat) -> Self {
        Self { out, format }
    }

    pub(crate) fn containers(&mut self, containers: &[ContainerSummary]) -> Result<(), AppError> {
        if self.format == ResolvedOutputFormat::Json {
            return self.json(&containers);
        }
        let mut table = Table::new(["CONTAINER ID", "NAME", "IMAGE", "STATE", "STATUS", "CREATED"]);
        for container in containers {
            table.push_row([
                container.short_id().to_owned(),
                container.name().to_owned(),
                container.image.clone(),
                container.state.to_string(),
                container.status.clone(),
                container.created_at().map(timestamp).unwrap_or_default(),
            ]);
        }
        table.write_to(&mut *self.out)?;
        self.flush()
    }

    pub(crate) fn details(&mut self, details: &ContainerDetails) -> Result<(), AppError> {
        if self.format == ResolvedOutputFormat::Json {
            return self.json(details);
        }
        let created = details
            .created_at()
            .map_or_else(|_| details.created.clone(), timestamp);
        write_fields(
            &mut *self.out,
            &[
                ("ID", details.id.clone()),
                ("Name", details.display_name().to_owned()),
                ("Image", details.image().to_owned()),
                ("Command", details.command()),
                ("State", details.status().to_string()),
                ("Created", created),
            ],
        )?;
        self.flush()
    }

    pub(crate) fn version(&mut self, version: &VersionInfo) -> Result<(), AppError> {
        if self.format == ResolvedOutputFormat::Json {
            return self.json(version);
        }
        let mut fields = vec![
            ("Version", version.version.clone()),
            ("API version", version.api_version.clone()),
            ("Git commit", version.git_commit.clone()),
            ("Go version", version.go_version.clone()),
            ("OS/Arch", format!("{}/{}", version.os, version.arch)),
        ];
        if let Some(kernel) = &version.kernel_version {
            fields.push(("Kernel", kernel.clone()));
        }
        if let Some(built) = version.built_at() {
            fields.push(("Built", timestamp(built)));
        }
        write_fields(&mut *self.out, &fields)?;
        self.flush()
    }

    pub(crate) fn action(&mut self, action: &str, id: &str) -> Result<(), AppError> {
        if self.format == ResolvedOutputFormat::Json {
            return self.json(&ActionRecord { action, id });
        }
        writeln!(self.out, "{id}")?;
        self.flush()
    }

    /// Separates successive refreshes of human `watch` output.
    pub(crate) fn separator(&mut self) -> Result<(), AppError> {
        if self.format == ResolvedOutputFormat::Human {
            writeln!(self.out)?;
        }
        Ok(())
    }

    fn json<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), AppError> {
        serde_json::to_writer(&mut *self.out, value)?;
        writeln!(self.out)?;
        self.flush()
    }

    fn flush(&mut self) -> Result<(), AppError> {
        self.out.flush().map_err(AppError::WriteOutput)
    }
}

fn timestamp(at: OffsetDateTime) -> String {
    let whole_seconds = at.replace_nanosecond(0).unwrap_or(at);
    whole_seconds
        .format(&Rfc3339)
        .unwrap_or_else(|_| at.unix_timestamp().to_string())
}
