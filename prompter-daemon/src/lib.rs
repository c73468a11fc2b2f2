//! Daemon runtime: editor message channel, sync triggers, socket server.

mod error;
pub mod log_rotation;
pub mod paths;
pub mod protocol;
mod runtime;

pub use error::DaemonError;
pub use protocol::{
    request_diff, request_fields, request_resolve, request_save, request_set_editing,
    request_stage_edit, request_status, request_stop, request_sync, send_request, ControlResponse,
    Envelope, InboundMessage, OutboundMessage,
};
pub use runtime::{run, start_blocking};
