//! Message schema and blocking client for the editor socket.
//!
//! Every message is a newline-delimited JSON object with a `type`
//! discriminator. Editor-originated messages additionally carry an `origin`
//! that is matched against the configured allow-list; local control messages
//! (sent by the CLI over the 0600 socket) carry none and are trusted by
//! socket permissions instead.

use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::thread::sleep;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use prompter_core::types::{FieldChange, FieldName};

use crate::error::{io_err, DaemonError};
use crate::paths::socket_path;

// ---------------------------------------------------------------------------
// Inbound messages
// ---------------------------------------------------------------------------

/// Everything the daemon accepts on the socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum InboundMessage {
    // -- editor messages (origin-checked) ---------------------------------
    /// Editing mode on; staged writes go to the pending layer.
    EnableEditing,
    /// Editing mode off; pending edits discarded without committing.
    DisableEditing,
    /// A confirmed save: write remote + local, clear pending, arm the guard.
    ApplySavedChanges { changes: Vec<FieldChange> },
    /// Capability probe; answered synchronously, no state change.
    TestAccess,
    /// Document visibility transition; `visible: true` triggers a sync pass.
    Visibility { visible: bool },
    /// Completion of an in-flight save-content RPC.
    SaveContentResponse {
        request_id: String,
        ok: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    // -- local control messages (socket-trusted) --------------------------
    Status,
    Fields,
    Resolve {
        field: FieldName,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        fallback: Option<String>,
    },
    StageEdit { field: FieldName, value: String },
    SetEditing { enabled: bool },
    /// Unified diffs of pending edits against confirmed values.
    Diff,
    Save {
        #[serde(default)]
        direct: bool,
    },
    Sync {
        #[serde(default)]
        force: bool,
    },
    Stop,
}

impl InboundMessage {
    /// Editor-originated messages must pass the origin allow-list; control
    /// messages are trusted by socket permissions.
    pub fn requires_origin(&self) -> bool {
        matches!(
            self,
            InboundMessage::EnableEditing
                | InboundMessage::DisableEditing
                | InboundMessage::ApplySavedChanges { .. }
                | InboundMessage::TestAccess
                | InboundMessage::Visibility { .. }
                | InboundMessage::SaveContentResponse { .. }
        )
    }
}

/// One line on the wire: optional origin plus the typed message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    #[serde(flatten)]
    pub message: InboundMessage,
}

impl Envelope {
    pub fn control(message: InboundMessage) -> Self {
        Self {
            origin: None,
            message,
        }
    }

    pub fn from_origin(origin: impl Into<String>, message: InboundMessage) -> Self {
        Self {
            origin: Some(origin.into()),
            message,
        }
    }
}

// ---------------------------------------------------------------------------
// Outbound messages
// ---------------------------------------------------------------------------

/// Messages the daemon pushes to the attached editor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum OutboundMessage {
    /// Announces the engine is ready to receive editor messages.
    IframeReady,
    /// Editing mode is active; staged writes will land in pending.
    UniversalEditingReady,
    /// Save RPC request; the editor answers with `save-content-response`
    /// carrying the same `request_id`.
    SaveContent {
        request_id: String,
        changes: Vec<FieldChange>,
    },
    /// Synchronous reply to `test-access`.
    TestAccessResponse { ok: bool, editing: bool },
}

/// JSON newline-delimited response to a control message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ControlResponse {
    pub fn ok(data: Value) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// Blocking client (CLI side)
// ---------------------------------------------------------------------------

/// Send one envelope to the daemon socket and return one response line.
pub fn send_request(home: &Path, envelope: &Envelope) -> Result<ControlResponse, DaemonError> {
    let socket = socket_path(home);
    if !socket.exists() {
        return Err(DaemonError::DaemonNotRunning { socket });
    }

    let mut stream = UnixStream::connect(&socket).map_err(|err| {
        if matches!(
            err.kind(),
            std::io::ErrorKind::NotFound
                | std::io::ErrorKind::ConnectionRefused
                | std::io::ErrorKind::ConnectionReset
        ) {
            DaemonError::DaemonNotRunning {
                socket: socket.clone(),
            }
        } else {
            io_err(&socket, err)
        }
    })?;

    let payload = serde_json::to_string(envelope)?;
    stream
        .write_all(payload.as_bytes())
        .map_err(|e| io_err(&socket, e))?;
    stream.write_all(b"\n").map_err(|e| io_err(&socket, e))?;
    stream.flush().map_err(|e| io_err(&socket, e))?;

    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    let read = reader
        .read_line(&mut line)
        .map_err(|e| io_err(&socket, e))?;
    if read == 0 {
        return Err(DaemonError::Protocol(
            "daemon closed connection before responding".to_string(),
        ));
    }

    let response: ControlResponse = serde_json::from_str(line.trim_end())?;
    Ok(response)
}

/// `status` with a short retry loop for a daemon that is still binding its
/// socket.
pub fn request_status(home: &Path) -> Result<Value, DaemonError> {
    let envelope = Envelope::control(InboundMessage::Status);

    let mut last_not_running: Option<DaemonError> = None;
    for attempt in 0..5 {
        match send_request(home, &envelope) {
            Ok(response) => return response_into_data(response),
            Err(err @ DaemonError::DaemonNotRunning { .. }) => {
                last_not_running = Some(err);
                if attempt < 4 {
                    sleep(Duration::from_millis(100));
                    continue;
                }
            }
            Err(err) => return Err(err),
        }
    }

    Err(last_not_running.unwrap_or_else(|| {
        DaemonError::Protocol("daemon status retry loop exited unexpectedly".to_string())
    }))
}

pub fn request_fields(home: &Path) -> Result<Value, DaemonError> {
    let response = send_request(home, &Envelope::control(InboundMessage::Fields))?;
    response_into_data(response)
}

pub fn request_resolve(
    home: &Path,
    field: FieldName,
    fallback: Option<String>,
) -> Result<Value, DaemonError> {
    let response = send_request(
        home,
        &Envelope::control(InboundMessage::Resolve { field, fallback }),
    )?;
    response_into_data(response)
}

pub fn request_stage_edit(
    home: &Path,
    field: FieldName,
    value: String,
) -> Result<Value, DaemonError> {
    let response = send_request(
        home,
        &Envelope::control(InboundMessage::StageEdit { field, value }),
    )?;
    response_into_data(response)
}

pub fn request_set_editing(home: &Path, enabled: bool) -> Result<Value, DaemonError> {
    let response = send_request(
        home,
        &Envelope::control(InboundMessage::SetEditing { enabled }),
    )?;
    response_into_data(response)
}

pub fn request_diff(home: &Path) -> Result<Value, DaemonError> {
    let response = send_request(home, &Envelope::control(InboundMessage::Diff))?;
    response_into_data(response)
}

pub fn request_save(home: &Path, direct: bool) -> Result<Value, DaemonError> {
    let response = send_request(home, &Envelope::control(InboundMessage::Save { direct }))?;
    response_into_data(response)
}

pub fn request_sync(home: &Path, force: bool) -> Result<Value, DaemonError> {
    let response = send_request(home, &Envelope::control(InboundMessage::Sync { force }))?;
    response_into_data(response)
}

pub fn request_stop(home: &Path) -> Result<(), DaemonError> {
    let response = send_request(home, &Envelope::control(InboundMessage::Stop))?;
    response_into_data(response).map(|_| ())
}

fn response_into_data(response: ControlResponse) -> Result<Value, DaemonError> {
    if response.ok {
        Ok(response.data.unwrap_or(Value::Null))
    } else {
        Err(DaemonError::Protocol(
            response
                .error
                .unwrap_or_else(|| "unknown daemon error".to_string()),
        ))
    }
}
