//! Client helper for talking to stroop-lockerd over its Unix socket.

use chrono::Utc;
use locker_core::StorageConfig;
use rand::RngCore;
use serde_json::Value;
use std::env;
use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::time::Duration;
use stroop_locker_protocol::{Method, Request, Response, MAX_REQUEST_BYTES, PROTOCOL_VERSION};
use thiserror::Error;

const SOCKET_ENV: &str = "STROOP_LOCKER_SOCKET";
const READ_TIMEOUT_MS: u64 = 2000;
const WRITE_TIMEOUT_MS: u64 = 600;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Failed to connect to daemon at {path}: {source}")]
    Connect {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid daemon response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Response exceeded maximum size")]
    TooLarge,

    #[error("Daemon returned {code}: {message}")]
    Daemon { code: String, message: String },
}

pub fn socket_path() -> PathBuf {
    if let Ok(path) = env::var(SOCKET_ENV) {
        return PathBuf::from(path);
    }
    StorageConfig::default().socket_file()
}

/// Sends one request and returns the `data` payload of a successful response.
pub fn call(method: Method, params: Option<Value>) -> Result<Value, ClientError> {
    let mut request = Request::new(method, params);
    request.id = Some(make_request_id());
    let response = send_request(&request)?;
    if response.ok {
        return Ok(response.data.unwrap_or(Value::Null));
    }
    let (code, message) = response
        .error
        .map(|err| (err.code, err.message))
        .unwrap_or_else(|| ("unknown".to_string(), "Unknown daemon error".to_string()));
    Err(ClientError::Daemon { code, message })
}

fn send_request(request: &Request) -> Result<Response, ClientError> {
    let socket = socket_path();
    tracing::debug!(method = ?request.method, socket = %socket.display(), "Sending daemon request");
    let mut stream = UnixStream::connect(&socket).map_err(|source| ClientError::Connect {
        path: socket.clone(),
        source,
    })?;
    let _ = stream.set_read_timeout(Some(Duration::from_millis(READ_TIMEOUT_MS)));
    let _ = stream.set_write_timeout(Some(Duration::from_millis(WRITE_TIMEOUT_MS)));

    serde_json::to_writer(&mut stream, request)?;
    stream.write_all(b"\n")?;
    stream.flush().ok();

    read_response(&mut stream)
}

fn read_response(stream: &mut impl Read) -> Result<Response, ClientError> {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];

    loop {
        let n = stream.read(&mut chunk)?;
        if n == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..n]);
        if buffer.len() > MAX_REQUEST_BYTES * 4 {
            return Err(ClientError::TooLarge);
        }
        if chunk[..n].contains(&b'\n') {
            break;
        }
    }

    let response_bytes = match buffer.iter().position(|b| *b == b'\n') {
        Some(index) => &buffer[..index],
        None => buffer.as_slice(),
    };
    Ok(serde_json::from_slice(response_bytes)?)
}

fn make_request_id() -> String {
    let mut random = rand::thread_rng();
    format!(
        "req-{}-{}-{:x}",
        Utc::now().timestamp_millis(),
        std::process::id(),
        random.next_u64()
    )
}

/// Protocol version this client speaks, for `status` output.
pub fn protocol_version() -> u32 {
    PROTOCOL_VERSION
}
