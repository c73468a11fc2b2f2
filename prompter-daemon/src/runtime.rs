//! Daemon runtime: editor message channel + sync triggers + socket server.
//!
//! Tasks: socket server (editor bridge and CLI control share one socket),
//! idle sync ticker, log rotation, ctrl-c handler. The engine lives behind a
//! blocking mutex; every critical section is short and never held across an
//! await point. Network fetches run on the blocking pool via the scheduler,
//! which re-checks the grace guard at write time.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc, oneshot, Mutex as AsyncMutex, RwLock};

use prompter_core::config::{self, EngineConfig};
use prompter_engine::scheduler::{self, SyncOutcome};
use prompter_engine::{ContentEngine, ContentSource, RemoteClient};

use crate::error::{io_err, DaemonError};
use crate::paths::{run_dir, socket_path, state_dir};
use crate::protocol::{ControlResponse, Envelope, InboundMessage, OutboundMessage};

/// Completion of one save-content RPC, delivered to the waiting oneshot.
#[derive(Debug, Clone)]
struct SaveResult {
    ok: bool,
    error: Option<String>,
}

struct Shared {
    home: PathBuf,
    config: EngineConfig,
    engine: Mutex<ContentEngine>,
    remote: RemoteClient,
    /// Outbound line channel of the attached editor connection, if any.
    editor: RwLock<Option<mpsc::Sender<String>>>,
    /// In-flight save-content RPCs by correlation id.
    save_waiters: AsyncMutex<HashMap<String, oneshot::Sender<SaveResult>>>,
    save_seq: AtomicU64,
    started_at_unix: u64,
    changes_observed: Arc<AtomicU64>,
}

/// Start the daemon runtime and block the current thread until it exits.
pub fn start_blocking(home: &Path) -> Result<(), DaemonError> {
    init_tracing();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(home.to_path_buf()))
}

/// Run the daemon runtime.
pub async fn run(home: PathBuf) -> Result<(), DaemonError> {
    ensure_runtime_dirs(&home)?;

    let cfg = config::load_at(&home)?;
    let shared = build_shared(&home, cfg)?;
    let (shutdown_tx, _) = broadcast::channel::<()>(16);

    // Mount trigger: one sync pass as soon as the runtime is up.
    {
        let shared = shared.clone();
        tokio::spawn(async move {
            match run_sync(shared, false).await {
                Ok(outcome) => tracing::info!(?outcome, "startup sync pass"),
                Err(err) => tracing::warn!(error = %err, "startup sync failed"),
            }
        });
    }

    let socket_handle = {
        let shutdown = shutdown_tx.clone();
        let shared = shared.clone();
        tokio::spawn(async move {
            let result = socket_server_task(shared, shutdown.clone(), shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let ticker_handle = {
        let shutdown = shutdown_tx.clone();
        let shared = shared.clone();
        tokio::spawn(async move {
            let result = sync_ticker_task(shared, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let rotation_handle = {
        let shutdown = shutdown_tx.clone();
        let home = home.clone();
        tokio::spawn(async move {
            let result = log_rotation_task(home, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            let mut shutdown_rx = shutdown.subscribe();
            tokio::select! {
                _ = shutdown_rx.recv() => Ok(()),
                signal = tokio::signal::ctrl_c() => {
                    match signal {
                        Ok(()) => {
                            tracing::info!("received ctrl-c, shutting down daemon");
                            let _ = shutdown.send(());
                            Ok(())
                        }
                        Err(err) => Err(DaemonError::Protocol(format!("ctrl-c handler failed: {err}"))),
                    }
                }
            }
        })
    };

    let (socket_result, ticker_result, rotation_result, signal_result) =
        tokio::join!(socket_handle, ticker_handle, rotation_handle, signal_handle);

    handle_join("socket_server", socket_result)?;
    handle_join("sync_ticker", ticker_result)?;
    handle_join("log_rotation", rotation_result)?;
    handle_join("signal_handler", signal_result)?;
    Ok(())
}

fn build_shared(home: &Path, cfg: EngineConfig) -> Result<Arc<Shared>, DaemonError> {
    let mut engine = ContentEngine::open(cfg.clone(), &state_dir(home))?;

    let changes_observed = Arc::new(AtomicU64::new(0));
    {
        let counter = changes_observed.clone();
        engine.subscribe(Box::new(move |field, _value| {
            counter.fetch_add(1, Ordering::SeqCst);
            tracing::debug!(%field, "field resolution changed");
        }));
    }

    Ok(Arc::new(Shared {
        home: home.to_path_buf(),
        remote: RemoteClient::new(&cfg),
        config: cfg,
        engine: Mutex::new(engine),
        editor: RwLock::new(None),
        save_waiters: AsyncMutex::new(HashMap::new()),
        save_seq: AtomicU64::new(0),
        started_at_unix: unix_seconds_now(),
        changes_observed,
    }))
}

// ---------------------------------------------------------------------------
// Sync triggers
// ---------------------------------------------------------------------------

async fn run_sync(shared: Arc<Shared>, force: bool) -> Result<SyncOutcome, DaemonError> {
    let result = tokio::task::spawn_blocking(move || {
        scheduler::maybe_sync(&shared.engine, &shared.remote as &dyn ContentSource, force)
    })
    .await
    .map_err(|err| DaemonError::Protocol(format!("sync task join error: {err}")))?;
    result.map_err(DaemonError::from)
}

async fn sync_ticker_task(
    shared: Arc<Shared>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let period = Duration::from_millis(shared.config.idle_sync_interval_ms.max(1_000));
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    interval.tick().await; // consume the first immediate tick

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = interval.tick() => {
                match run_sync(shared.clone(), false).await {
                    Ok(outcome) => tracing::debug!(?outcome, "idle sync pass"),
                    Err(err) => tracing::warn!(error = %err, "idle sync failed"),
                }
            }
        }
    }
    Ok(())
}

async fn log_rotation_task(
    home: PathBuf,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let mut interval = tokio::time::interval(Duration::from_secs(60));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    interval.tick().await;

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = interval.tick() => {
                let home = home.clone();
                tokio::task::spawn_blocking(move || {
                    crate::log_rotation::rotate_logs(&home);
                })
                .await
                .ok(); // rotation errors are logged inside rotate_logs
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Socket server
// ---------------------------------------------------------------------------

async fn socket_server_task(
    shared: Arc<Shared>,
    shutdown_tx: broadcast::Sender<()>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let run = run_dir(&shared.home);
    if !run.exists() {
        fs::create_dir_all(&run).map_err(|e| io_err(&run, e))?;
    }

    let socket = socket_path(&shared.home);
    prepare_socket_for_bind(&socket)?;

    let listener = UnixListener::bind(&socket).map_err(|e| io_err(&socket, e))?;
    set_socket_permissions(&socket)?;
    tracing::info!(socket = %socket.display(), "listening for editor and control messages");

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            accepted = listener.accept() => {
                let (stream, _) = accepted.map_err(|e| io_err(&socket, e))?;
                let shared = shared.clone();
                let shutdown_tx = shutdown_tx.clone();
                tokio::spawn(async move {
                    if let Err(err) = handle_client(stream, shared, shutdown_tx).await {
                        tracing::error!(error = %err, "socket client error");
                    }
                });
            }
        }
    }

    if socket.exists() {
        let _ = fs::remove_file(&socket);
    }
    Ok(())
}

async fn handle_client(
    stream: UnixStream,
    shared: Arc<Shared>,
    shutdown_tx: broadcast::Sender<()>,
) -> Result<(), DaemonError> {
    let (reader, mut writer) = stream.into_split();

    // Outbound lines (responses and pushed messages) funnel through one
    // channel so the save RPC can write to this connection asynchronously.
    let (line_tx, mut line_rx) = mpsc::channel::<String>(32);
    let writer_task = tokio::spawn(async move {
        while let Some(line) = line_rx.recv().await {
            if writer.write_all(line.as_bytes()).await.is_err() {
                break;
            }
            if writer.write_all(b"\n").await.is_err() {
                break;
            }
            if writer.flush().await.is_err() {
                break;
            }
        }
    });

    let mut lines = BufReader::new(reader).lines();
    let mut is_editor = false;

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| io_err("daemon socket read", e))?
    {
        if line.trim().is_empty() {
            continue;
        }

        let envelope: Envelope = match serde_json::from_str(&line) {
            Ok(envelope) => envelope,
            Err(err) => {
                send_line(
                    &line_tx,
                    &ControlResponse::error(format!("invalid message JSON: {err}")),
                )
                .await;
                continue;
            }
        };

        let stop = matches!(envelope.message, InboundMessage::Stop);
        dispatch(&shared, envelope, &line_tx, &shutdown_tx, &mut is_editor).await;
        if stop {
            break;
        }
    }

    drop(line_tx);
    let _ = writer_task.await;
    Ok(())
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

async fn dispatch(
    shared: &Arc<Shared>,
    envelope: Envelope,
    line_tx: &mpsc::Sender<String>,
    shutdown_tx: &broadcast::Sender<()>,
    is_editor: &mut bool,
) {
    let Envelope { origin, message } = envelope;

    if message.requires_origin() {
        let allowed = origin
            .as_deref()
            .map(|o| shared.config.origin_allowed(o))
            .unwrap_or(false);
        if !allowed {
            // Security boundary, intentionally quiet: no reply, no mutation.
            tracing::debug!(?origin, "dropped editor message from disallowed origin");
            return;
        }
        if !*is_editor {
            *is_editor = true;
            register_editor(shared, line_tx).await;
        }
    }

    match message {
        InboundMessage::EnableEditing => {
            lock(&shared.engine).set_editing(true);
            send_line(line_tx, &OutboundMessage::UniversalEditingReady).await;
            send_line(line_tx, &ControlResponse::ok(json!({ "editing": true }))).await;
        }

        InboundMessage::DisableEditing => {
            lock(&shared.engine).set_editing(false);
            send_line(line_tx, &ControlResponse::ok(json!({ "editing": false }))).await;
        }

        InboundMessage::ApplySavedChanges { changes } => {
            let summary = lock(&shared.engine).apply_saved_changes(&changes);
            send_line(line_tx, &ControlResponse::ok(json!(summary))).await;
        }

        InboundMessage::TestAccess => {
            let editing = lock(&shared.engine).editing();
            send_line(line_tx, &OutboundMessage::TestAccessResponse { ok: true, editing }).await;
        }

        InboundMessage::Visibility { visible } => {
            if visible {
                let shared = shared.clone();
                tokio::spawn(async move {
                    match run_sync(shared, false).await {
                        Ok(outcome) => tracing::debug!(?outcome, "visibility sync pass"),
                        Err(err) => tracing::warn!(error = %err, "visibility sync failed"),
                    }
                });
            }
            send_line(line_tx, &ControlResponse::ok(json!({ "visible": visible }))).await;
        }

        InboundMessage::SaveContentResponse {
            request_id,
            ok,
            error,
        } => {
            let waiter = shared.save_waiters.lock().await.remove(&request_id);
            match waiter {
                Some(waiter) => {
                    let _ = waiter.send(SaveResult { ok, error });
                }
                None => {
                    tracing::debug!(%request_id, "save response for unknown or expired request");
                }
            }
        }

        InboundMessage::Status => {
            let payload = build_status_payload(shared).await;
            send_line(line_tx, &ControlResponse::ok(payload)).await;
        }

        InboundMessage::Fields => {
            let fields = lock(&shared.engine).resolved_fields();
            send_line(line_tx, &ControlResponse::ok(json!(fields))).await;
        }

        InboundMessage::Resolve { field, fallback } => {
            let payload = {
                let engine = lock(&shared.engine);
                let value = match &fallback {
                    Some(fallback) => engine.resolve(&field, fallback),
                    None => engine.resolve_or_default(&field),
                };
                let (_, source) = engine.layers().resolve_with_source(&field, "");
                json!({ "field": field, "value": value, "source": source })
            };
            send_line(line_tx, &ControlResponse::ok(payload)).await;
        }

        InboundMessage::StageEdit { field, value } => {
            let result = lock(&shared.engine).stage_edit(field, value);
            let response = match result {
                Ok(()) => {
                    let pending = lock(&shared.engine).pending_changes().len();
                    ControlResponse::ok(json!({ "staged": true, "pending": pending }))
                }
                Err(err) => ControlResponse::error(err.to_string()),
            };
            send_line(line_tx, &response).await;
        }

        InboundMessage::Diff => {
            let diffs: Vec<Value> = {
                let engine = lock(&shared.engine);
                prompter_engine::diff::diff_pending(&engine)
                    .into_iter()
                    .map(|d| json!({ "field": d.field, "unified_diff": d.unified_diff }))
                    .collect()
            };
            send_line(line_tx, &ControlResponse::ok(json!(diffs))).await;
        }

        InboundMessage::SetEditing { enabled } => {
            lock(&shared.engine).set_editing(enabled);
            send_line(line_tx, &ControlResponse::ok(json!({ "editing": enabled }))).await;
        }

        InboundMessage::Save { direct } => {
            let response = match run_save(shared.clone(), direct).await {
                Ok(payload) => ControlResponse::ok(payload),
                Err(err) => ControlResponse::error(err.to_string()),
            };
            send_line(line_tx, &response).await;
        }

        InboundMessage::Sync { force } => {
            let response = match run_sync(shared.clone(), force).await {
                Ok(outcome) => ControlResponse::ok(json!(outcome)),
                Err(err) => ControlResponse::error(err.to_string()),
            };
            send_line(line_tx, &response).await;
        }

        InboundMessage::Stop => {
            let _ = shutdown_tx.send(());
            send_line(line_tx, &ControlResponse::ok(json!({ "stopping": true }))).await;
        }
    }
}

async fn register_editor(shared: &Arc<Shared>, line_tx: &mpsc::Sender<String>) {
    *shared.editor.write().await = Some(line_tx.clone());
    send_line(line_tx, &OutboundMessage::IframeReady).await;
    tracing::info!("editor attached; announced readiness");
}

// ---------------------------------------------------------------------------
// Save RPC
// ---------------------------------------------------------------------------

/// Run the save flow for the current pending edits.
///
/// Default path: a `save-content` RPC to the attached editor, correlated by
/// `request_id` and bounded by the configured timeout; the waiter is removed
/// on success, failure, and timeout alike so handlers never leak. The editor
/// confirms the actual write separately via `apply-saved-changes`.
///
/// `direct` path: POST straight to the save endpoint, then apply locally.
async fn run_save(shared: Arc<Shared>, direct: bool) -> Result<Value, DaemonError> {
    let changes = lock(&shared.engine).pending_changes();
    if changes.is_empty() {
        return Ok(json!({ "saved": false, "detail": "no pending edits" }));
    }

    if direct {
        let push = {
            let shared = shared.clone();
            let changes = changes.clone();
            tokio::task::spawn_blocking(move || shared.remote.push_save(&changes))
        };
        push.await
            .map_err(|err| DaemonError::Protocol(format!("save task join error: {err}")))??;
        let summary = lock(&shared.engine).apply_saved_changes(&changes);
        return Ok(json!({ "saved": true, "direct": true, "summary": summary }));
    }

    let editor = shared.editor.read().await.clone();
    let Some(editor_tx) = editor else {
        return Err(DaemonError::NoEditorAttached);
    };

    let request_id = format!(
        "{}-{}",
        shared.started_at_unix,
        shared.save_seq.fetch_add(1, Ordering::SeqCst) + 1,
    );
    let (tx, rx) = oneshot::channel();
    shared
        .save_waiters
        .lock()
        .await
        .insert(request_id.clone(), tx);

    let request = OutboundMessage::SaveContent {
        request_id: request_id.clone(),
        changes,
    };
    if !try_send_line(&editor_tx, &request).await {
        shared.save_waiters.lock().await.remove(&request_id);
        return Err(DaemonError::NoEditorAttached);
    }

    let timeout = Duration::from_millis(shared.config.save_timeout_ms);
    match tokio::time::timeout(timeout, rx).await {
        Ok(Ok(result)) if result.ok => {
            Ok(json!({ "saved": true, "request_id": request_id }))
        }
        Ok(Ok(result)) => Err(DaemonError::Protocol(format!(
            "editor reported save failure: {}",
            result.error.unwrap_or_else(|| "unknown".to_string()),
        ))),
        Ok(Err(_)) => {
            shared.save_waiters.lock().await.remove(&request_id);
            Err(DaemonError::ChannelClosed("save-content response"))
        }
        Err(_elapsed) => {
            shared.save_waiters.lock().await.remove(&request_id);
            Err(DaemonError::SaveTimeout {
                timeout_ms: shared.config.save_timeout_ms,
            })
        }
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

async fn build_status_payload(shared: &Arc<Shared>) -> Value {
    // Engine snapshot under one short lock.
    let (editing, pending, grace_active, grace_remaining_ms, sync, field_count) = {
        let engine = lock(&shared.engine);
        (
            engine.editing(),
            engine.pending_changes().len(),
            engine.guard().is_active(),
            engine.guard().remaining_ms(),
            *engine.sync_state(),
            engine.resolved_fields().len(),
        )
    };
    let editor_attached = shared.editor.read().await.is_some();

    json!({
        "running": true,
        "started_at_unix": shared.started_at_unix,
        "editing": editing,
        "pending": pending,
        "grace_active": grace_active,
        "grace_remaining_ms": grace_remaining_ms,
        "connected": sync.connected,
        "sync_in_flight": sync.sync_in_flight,
        "last_sync_at": sync.last_sync_at.map(|t| t.to_rfc3339()),
        "last_save_at": sync.last_save_at.map(|t| t.to_rfc3339()),
        "field_count": field_count,
        "changes_observed": shared.changes_observed.load(Ordering::SeqCst),
        "editor_attached": editor_attached,
        "socket": socket_path(&shared.home).display().to_string(),
    })
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn lock(engine: &Mutex<ContentEngine>) -> MutexGuard<'_, ContentEngine> {
    engine.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

async fn send_line<T: serde::Serialize>(line_tx: &mpsc::Sender<String>, payload: &T) {
    if !try_send_line(line_tx, payload).await {
        tracing::debug!("connection gone before line could be written");
    }
}

async fn try_send_line<T: serde::Serialize>(line_tx: &mpsc::Sender<String>, payload: &T) -> bool {
    match serde_json::to_string(payload) {
        Ok(line) => line_tx.send(line).await.is_ok(),
        Err(err) => {
            tracing::error!(error = %err, "failed to serialize outbound line");
            false
        }
    }
}

fn ensure_runtime_dirs(home: &Path) -> Result<(), DaemonError> {
    for dir in [
        state_dir(home),
        run_dir(home),
        crate::paths::logs_dir(home),
    ] {
        if !dir.exists() {
            fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
        }
    }
    Ok(())
}

fn prepare_socket_for_bind(socket: &Path) -> Result<(), DaemonError> {
    if !socket.exists() {
        return Ok(());
    }

    match StdUnixStream::connect(socket) {
        Ok(_) => {
            return Err(DaemonError::Protocol(format!(
                "daemon socket already in use: {}",
                socket.display()
            )));
        }
        Err(err) => {
            tracing::warn!(
                socket = %socket.display(),
                error = %err,
                "removing stale daemon socket before bind",
            );
        }
    }

    match fs::remove_file(socket) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(io_err(socket, err)),
    }
}

fn handle_join(
    task: &str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Protocol(format!(
            "{task} task join failure: {err}"
        ))),
    }
}

fn unix_seconds_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

#[cfg(unix)]
fn set_socket_permissions(path: &Path) -> Result<(), DaemonError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
fn set_socket_permissions(_path: &Path) -> Result<(), DaemonError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    use prompter_core::types::{FieldChange, FieldName};
    use tempfile::TempDir;

    const EDITOR: &str = "https://editor.example.com";

    fn test_config() -> EngineConfig {
        EngineConfig {
            allowed_origins: vec![EDITOR.to_string()],
            save_timeout_ms: 100,
            ..EngineConfig::default()
        }
    }

    fn test_shared(home: &TempDir) -> Arc<Shared> {
        build_shared(home.path(), test_config()).expect("shared")
    }

    async fn drain(rx: &mut mpsc::Receiver<String>) -> Vec<Value> {
        let mut lines = Vec::new();
        while let Ok(line) = rx.try_recv() {
            lines.push(serde_json::from_str(&line).expect("line json"));
        }
        lines
    }

    #[tokio::test]
    async fn disallowed_origin_is_silently_dropped() {
        let home = TempDir::new().expect("home");
        let shared = test_shared(&home);
        let (line_tx, mut line_rx) = mpsc::channel(8);
        let (shutdown_tx, _) = broadcast::channel(1);
        let mut is_editor = false;

        let envelope = Envelope::from_origin(
            "https://evil.example.net",
            InboundMessage::ApplySavedChanges {
                changes: vec![FieldChange::new("hero_title", "pwned")],
            },
        );
        dispatch(&shared, envelope, &line_tx, &shutdown_tx, &mut is_editor).await;

        assert!(drain(&mut line_rx).await.is_empty(), "no reply expected");
        assert!(!is_editor);
        let engine = lock(&shared.engine);
        assert_eq!(engine.resolve(&FieldName::from("hero_title"), "x"), "x");
        assert!(!engine.guard().is_active());
    }

    #[tokio::test]
    async fn missing_origin_is_also_dropped() {
        let home = TempDir::new().expect("home");
        let shared = test_shared(&home);
        let (line_tx, mut line_rx) = mpsc::channel(8);
        let (shutdown_tx, _) = broadcast::channel(1);
        let mut is_editor = false;

        let envelope = Envelope::control(InboundMessage::ApplySavedChanges {
            changes: vec![FieldChange::new("hero_title", "pwned")],
        });
        dispatch(&shared, envelope, &line_tx, &shutdown_tx, &mut is_editor).await;

        assert!(drain(&mut line_rx).await.is_empty());
        assert_eq!(
            lock(&shared.engine).resolve(&FieldName::from("hero_title"), "x"),
            "x"
        );
    }

    #[tokio::test]
    async fn allowed_apply_registers_editor_and_mutates_engine() {
        let home = TempDir::new().expect("home");
        let shared = test_shared(&home);
        let (line_tx, mut line_rx) = mpsc::channel(8);
        let (shutdown_tx, _) = broadcast::channel(1);
        let mut is_editor = false;

        let envelope = Envelope::from_origin(
            EDITOR,
            InboundMessage::ApplySavedChanges {
                changes: vec![FieldChange::new("hero_title", "Edited")],
            },
        );
        dispatch(&shared, envelope, &line_tx, &shutdown_tx, &mut is_editor).await;

        let lines = drain(&mut line_rx).await;
        assert_eq!(lines.len(), 2, "iframe-ready then the apply response");
        assert_eq!(lines[0]["type"], "iframe-ready");
        assert_eq!(lines[1]["ok"], true);
        assert_eq!(lines[1]["data"]["written"], 1);

        assert!(is_editor);
        let engine = lock(&shared.engine);
        assert_eq!(
            engine.resolve(&FieldName::from("hero_title"), "x"),
            "Edited"
        );
        assert!(engine.guard().is_active());
    }

    #[tokio::test]
    async fn test_access_replies_with_capability_confirmation() {
        let home = TempDir::new().expect("home");
        let shared = test_shared(&home);
        let (line_tx, mut line_rx) = mpsc::channel(8);
        let (shutdown_tx, _) = broadcast::channel(1);
        let mut is_editor = false;

        dispatch(
            &shared,
            Envelope::from_origin(EDITOR, InboundMessage::TestAccess),
            &line_tx,
            &shutdown_tx,
            &mut is_editor,
        )
        .await;

        let lines = drain(&mut line_rx).await;
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["type"], "iframe-ready");
        assert_eq!(lines[1]["type"], "test-access-response");
        assert_eq!(lines[1]["ok"], true);
        assert_eq!(lines[1]["editing"], false);
    }

    #[tokio::test]
    async fn save_rpc_times_out_and_cleans_up_its_waiter() {
        let home = TempDir::new().expect("home");
        let shared = test_shared(&home);
        let (line_tx, mut line_rx) = mpsc::channel(8);
        let (shutdown_tx, _) = broadcast::channel(1);
        let mut is_editor = false;

        // Attach an editor and stage one edit.
        dispatch(
            &shared,
            Envelope::from_origin(EDITOR, InboundMessage::EnableEditing),
            &line_tx,
            &shutdown_tx,
            &mut is_editor,
        )
        .await;
        lock(&shared.engine)
            .stage_edit(FieldName::from("hero_title"), "draft".to_string())
            .expect("stage");

        let err = run_save(shared.clone(), false).await.unwrap_err();
        assert!(matches!(err, DaemonError::SaveTimeout { timeout_ms: 100 }));

        // The request went out, the waiter is gone, pending is preserved.
        let lines = drain(&mut line_rx).await;
        assert!(lines.iter().any(|l| l["type"] == "save-content"));
        assert!(shared.save_waiters.lock().await.is_empty());
        assert!(lock(&shared.engine).has_pending());
    }

    #[tokio::test]
    async fn save_rpc_completes_when_the_editor_responds() {
        let home = TempDir::new().expect("home");
        let shared = test_shared(&home);
        let (line_tx, mut line_rx) = mpsc::channel(8);
        let (shutdown_tx, _) = broadcast::channel(1);
        let mut is_editor = false;

        dispatch(
            &shared,
            Envelope::from_origin(EDITOR, InboundMessage::EnableEditing),
            &line_tx,
            &shutdown_tx,
            &mut is_editor,
        )
        .await;
        lock(&shared.engine)
            .stage_edit(FieldName::from("hero_title"), "draft".to_string())
            .expect("stage");

        // Fake editor: answer the save-content request as soon as it shows up.
        let responder = {
            let shared = shared.clone();
            let shutdown_tx = shutdown_tx.clone();
            tokio::spawn(async move {
                let (tx, _rx) = mpsc::channel(8);
                loop {
                    let Some(line) = line_rx.recv().await else { break };
                    let value: Value = serde_json::from_str(&line).expect("line json");
                    if value["type"] == "save-content" {
                        let request_id = value["request_id"].as_str().expect("id").to_string();
                        let mut is_editor = true;
                        dispatch(
                            &shared,
                            Envelope::from_origin(
                                EDITOR,
                                InboundMessage::SaveContentResponse {
                                    request_id,
                                    ok: true,
                                    error: None,
                                },
                            ),
                            &tx,
                            &shutdown_tx,
                            &mut is_editor,
                        )
                        .await;
                        break;
                    }
                }
            })
        };

        let payload = run_save(shared.clone(), false).await.expect("save");
        assert_eq!(payload["saved"], true);
        assert!(shared.save_waiters.lock().await.is_empty());
        responder.await.expect("responder");
    }

    #[tokio::test]
    async fn save_without_editor_fails_fast() {
        let home = TempDir::new().expect("home");
        let shared = test_shared(&home);
        lock(&shared.engine).set_editing(true);
        lock(&shared.engine)
            .stage_edit(FieldName::from("hero_title"), "draft".to_string())
            .expect("stage");

        let err = run_save(shared.clone(), false).await.unwrap_err();
        assert!(matches!(err, DaemonError::NoEditorAttached));
        assert!(lock(&shared.engine).has_pending());
    }

    #[tokio::test]
    async fn save_with_nothing_pending_is_a_no_op() {
        let home = TempDir::new().expect("home");
        let shared = test_shared(&home);
        let payload = run_save(shared, false).await.expect("save");
        assert_eq!(payload["saved"], false);
    }

    #[tokio::test]
    async fn status_payload_reflects_engine_state() {
        let home = TempDir::new().expect("home");
        let shared = test_shared(&home);
        {
            let mut engine = lock(&shared.engine);
            engine.set_editing(true);
            engine
                .stage_edit(FieldName::from("hero_title"), "draft".to_string())
                .expect("stage");
        }

        let payload = build_status_payload(&shared).await;
        assert_eq!(payload["running"], true);
        assert_eq!(payload["editing"], true);
        assert_eq!(payload["pending"], 1);
        assert_eq!(payload["grace_active"], false);
        assert_eq!(payload["connected"], false);
        assert_eq!(payload["editor_attached"], false);
        assert_eq!(payload["last_sync_at"], Value::Null);
    }
}
