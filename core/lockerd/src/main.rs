//! Stroop Locker daemon entrypoint.
//!
//! Single-writer service that owns the locked-app set and the challenge slot.
//! Foreground notifications are queued to one coordinator thread; UI calls are
//! answered directly from the connection threads.

use fs_err as fs;
use std::env;
use std::io::{Read, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::Utc;
use locker_core::{load_settings, run_event_loop, LockerError, LockerSettings, StorageConfig};
use serde::Serialize;
use serde_json::Value;
use stroop_locker_protocol::{
    parse_answer, parse_foreground, parse_package, ChallengeActivity, ErrorInfo, HealthInfo,
    Method, Request, Response, MAX_REQUEST_BYTES, PROTOCOL_VERSION,
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod db;
mod state;

use db::Db;
use state::SharedState;

const DEBUG_LOG_ENV: &str = "STROOP_LOCKER_DEBUG_LOG";
const READ_TIMEOUT_SECS: u64 = 2;
const READ_CHUNK_SIZE: usize = 4096;
const SWEEP_INTERVAL_MS: u64 = 500;

fn main() {
    init_logging();

    let storage = StorageConfig::default();
    let socket_path = storage.socket_file();

    if let Err(err) = prepare_socket_dir(&socket_path) {
        error!(error = %err, "Failed to prepare daemon socket directory");
        std::process::exit(1);
    }

    if let Err(err) = remove_existing_socket(&socket_path) {
        error!(error = %err, path = %socket_path.display(), "Failed to remove existing socket");
        std::process::exit(1);
    }

    let listener = match UnixListener::bind(&socket_path) {
        Ok(listener) => listener,
        Err(err) => {
            error!(error = %err, path = %socket_path.display(), "Failed to bind daemon socket");
            std::process::exit(1);
        }
    };

    info!(path = %socket_path.display(), "Stroop Locker daemon started");

    let db = match Db::new(storage.database_file()) {
        Ok(db) => db,
        Err(err) => {
            error!(error = %err, "Failed to initialize daemon database");
            std::process::exit(1);
        }
    };

    let settings = match load_settings(&storage) {
        Ok(settings) => settings,
        Err(err) => {
            warn!(error = %err, "Failed to load settings; using defaults");
            LockerSettings::default()
        }
    };
    info!(
        challenge_timeout_secs = settings.challenge_timeout_secs,
        session_duration_secs = settings.session_duration_secs,
        challenges_required = settings.challenges_required,
        master_disable = settings.master_disable,
        "Settings loaded"
    );

    let (shared_state, events) = SharedState::new(db, settings);
    let shared_state = Arc::new(shared_state);
    spawn_event_loop(&shared_state, events);

    for stream in listener.incoming() {
        match stream {
            Ok(stream) => {
                let state = Arc::clone(&shared_state);
                thread::spawn(|| handle_connection(stream, state));
            }
            Err(err) => {
                warn!(error = %err, "Failed to accept daemon connection");
            }
        }
    }
}

fn spawn_event_loop(
    state: &Arc<SharedState>,
    events: std::sync::mpsc::Receiver<locker_core::ForegroundEvent>,
) {
    let coordinator = Arc::clone(state.coordinator());
    thread::spawn(move || {
        run_event_loop(coordinator, events, Duration::from_millis(SWEEP_INTERVAL_MS));
        warn!("Foreground event loop exited");
    });
}

fn init_logging() {
    let debug_enabled = env::var(DEBUG_LOG_ENV)
        .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"))
        .unwrap_or(false);
    let filter = if debug_enabled {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn prepare_socket_dir(socket_path: &Path) -> Result<(), String> {
    let parent = socket_path
        .parent()
        .ok_or_else(|| "Socket path has no parent".to_string())?;
    fs::create_dir_all(parent).map_err(|err| format!("Failed to create socket directory: {}", err))
}

fn remove_existing_socket(socket_path: &Path) -> Result<(), String> {
    if socket_path.exists() {
        fs::remove_file(socket_path)
            .map_err(|err| format!("Failed to remove existing socket: {}", err))?;
    }
    Ok(())
}

fn handle_connection(mut stream: UnixStream, state: Arc<SharedState>) {
    let request = match read_request(&mut stream) {
        Ok(request) => request,
        Err(err) => {
            warn!(code = %err.code, message = %err.message, "Failed to read request");
            let response = Response::error_with_info(None, err);
            let _ = write_response(&mut stream, response);
            return;
        }
    };

    tracing::debug!(method = ?request.method, id = ?request.id, "Daemon request received");
    let response = handle_request(request, &state);
    let _ = write_response(&mut stream, response);
}

fn read_request(stream: &mut UnixStream) -> Result<Request, ErrorInfo> {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(READ_TIMEOUT_SECS)));

    let mut buffer = Vec::new();
    let mut chunk = [0u8; READ_CHUNK_SIZE];

    loop {
        match stream.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                buffer.extend_from_slice(&chunk[..n]);
                if buffer.len() > MAX_REQUEST_BYTES {
                    return Err(ErrorInfo::new(
                        "request_too_large",
                        "request exceeded maximum size",
                    ));
                }
                if chunk[..n].contains(&b'\n') {
                    break;
                }
            }
            Err(err)
                if matches!(
                    err.kind(),
                    std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                ) =>
            {
                return Err(ErrorInfo::new("read_timeout", "request timed out"));
            }
            Err(err) => {
                return Err(ErrorInfo::new(
                    "read_error",
                    format!("failed to read request: {}", err),
                ));
            }
        }
    }

    let request_bytes = match buffer.iter().position(|b| *b == b'\n') {
        Some(index) => {
            if buffer[index + 1..].iter().any(|b| !b.is_ascii_whitespace()) {
                warn!("Extra bytes detected after newline; ignoring trailing data");
            }
            &buffer[..index]
        }
        None => buffer.as_slice(),
    };

    if request_bytes.iter().all(|b| b.is_ascii_whitespace()) {
        return Err(ErrorInfo::new("empty_request", "request body was empty"));
    }

    serde_json::from_slice(request_bytes).map_err(|err| {
        ErrorInfo::new(
            "invalid_json",
            format!("request was not valid JSON: {}", err),
        )
    })
}

fn handle_request(request: Request, state: &SharedState) -> Response {
    if request.protocol_version != PROTOCOL_VERSION {
        return Response::error(
            request.id,
            "protocol_mismatch",
            "unsupported protocol version",
        );
    }

    let coordinator = state.coordinator();
    let id = request.id;
    let params = request.params;

    match request.method {
        Method::GetHealth => respond(
            id,
            &HealthInfo {
                status: "ok".to_string(),
                pid: std::process::id(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                protocol_version: PROTOCOL_VERSION,
                challenge_active: coordinator.is_challenge_active(),
            },
        ),
        Method::ForegroundChanged => {
            let parsed = match require_params(params, "package is required").and_then(parse_foreground) {
                Ok(parsed) => parsed,
                Err(err) => return Response::error_with_info(id, err),
            };
            let observed_at = parsed.observed_at_or(Utc::now());
            info!(package = %parsed.package, observed_at = %observed_at, "Foreground changed");
            match state.submit_foreground(&parsed.package, observed_at) {
                Ok(()) => Response::ok(id, serde_json::json!({ "accepted": true })),
                Err(err) => Response::error(id, "event_loop_unavailable", err),
            }
        }
        Method::StartOrGetChallenge => {
            let parsed = match require_params(params, "package is required").and_then(parse_package) {
                Ok(parsed) => parsed,
                Err(err) => return Response::error_with_info(id, err),
            };
            respond_result(id, coordinator.start_or_get_challenge(&parsed.package))
        }
        Method::SubmitAnswer => {
            let parsed = match require_params(params, "selected_color is required").and_then(parse_answer) {
                Ok(parsed) => parsed,
                Err(err) => return Response::error_with_info(id, err),
            };
            let outcome = match parsed.challenge_id {
                Some(challenge_id) => coordinator.submit_answer_for(challenge_id, &parsed.selected_color),
                None => coordinator.submit_answer(&parsed.selected_color),
            };
            info!(outcome = ?outcome, "Answer submitted");
            respond(id, &outcome)
        }
        Method::IsChallengeActive => {
            let package = coordinator
                .current_challenge()
                .map(|active| active.challenge.locked_package);
            respond(
                id,
                &ChallengeActivity {
                    active: package.is_some(),
                    package,
                },
            )
        }
        Method::LockApp => {
            let parsed = match require_params(params, "package is required").and_then(parse_package) {
                Ok(parsed) => parsed,
                Err(err) => return Response::error_with_info(id, err),
            };
            let result = coordinator
                .lock_app(&parsed.package)
                .map(|()| serde_json::json!({ "package": parsed.package.trim(), "locked": true }));
            respond_result(id, result)
        }
        Method::UnlockApp => {
            let parsed = match require_params(params, "package is required").and_then(parse_package) {
                Ok(parsed) => parsed,
                Err(err) => return Response::error_with_info(id, err),
            };
            let result = coordinator
                .unlock_app(&parsed.package)
                .map(|()| serde_json::json!({ "package": parsed.package.trim(), "locked": false }));
            respond_result(id, result)
        }
        Method::ListLocked => {
            let result = coordinator
                .locked_apps()
                .map(|packages| serde_json::json!({ "packages": packages }));
            respond_result(id, result)
        }
        Method::EndAllSessions => {
            coordinator.end_all_sessions();
            Response::ok(id, serde_json::json!({ "ended": true }))
        }
        Method::PollDirectives => {
            let directives = state.drain_directives();
            tracing::debug!(count = directives.len(), "Directives polled");
            respond(id, &directives)
        }
        Method::GetStats => {
            let stats = coordinator.stats();
            respond(
                id,
                &serde_json::json!({
                    "successful": stats.successful,
                    "unsuccessful": stats.unsuccessful,
                    "timed_out": stats.timed_out,
                    "total": stats.total(),
                    "completed_packages": coordinator.completed_packages(),
                }),
            )
        }
        Method::GetSettings => respond(id, coordinator.settings()),
    }
}

fn require_params(params: Option<Value>, message: &str) -> Result<Value, ErrorInfo> {
    params.ok_or_else(|| ErrorInfo::new("invalid_params", message))
}

fn respond<T: Serialize + ?Sized>(id: Option<String>, data: &T) -> Response {
    match serde_json::to_value(data) {
        Ok(value) => Response::ok(id, value),
        Err(err) => Response::error(
            id,
            "serialization_error",
            format!("Failed to serialize response: {}", err),
        ),
    }
}

fn respond_result<T: Serialize>(id: Option<String>, result: Result<T, LockerError>) -> Response {
    match result {
        Ok(data) => respond(id, &data),
        Err(err) => {
            warn!(code = err.code(), error = %err, "Request failed");
            Response::error(id, err.code(), err.to_string())
        }
    }
}

fn write_response(stream: &mut UnixStream, response: Response) -> std::io::Result<()> {
    serde_json::to_writer(&mut *stream, &response)?;
    stream.write_all(b"\n")?;
    stream.flush()?;
    Ok(())
}
