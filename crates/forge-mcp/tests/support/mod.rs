//! Shared fixtures: a raw TCP HTTP server and shell-script MCP servers.

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use forge_mcp::ProxyTimeouts;
use forge_types::ProcessDescriptor;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Successful `initialize` response for request id 1.
pub const INIT_OK: &str = r#"{"jsonrpc":"2.0","id":1,"result":{"protocolVersion":"2024-11-05","capabilities":{"tools":{}},"serverInfo":{"name":"mock","version":"0.0.1"}}}"#;

pub fn test_timeouts() -> ProxyTimeouts {
    ProxyTimeouts {
        handshake_ms: 2000,
        response_ms: 2000,
        remote_ms: 2000,
        grace_ms: 500,
    }
}

/// A shell server that completes the handshake, then runs `then`.
pub fn mock_process(then: &str) -> ProcessDescriptor {
    let script = format!("read -r l; echo '{INIT_OK}'; read -r l; read -r l; {then}");
    ProcessDescriptor::new("sh").with_args(["-c".to_string(), script])
}

/// Like [`mock_process`], but the shell first writes its pid to `pidfile`.
pub fn pid_recording_process(pidfile: &Path, then: &str) -> ProcessDescriptor {
    let script = format!(
        "echo $$ > \"$PIDFILE\"; read -r l; echo '{INIT_OK}'; read -r l; read -r l; {then}"
    );
    ProcessDescriptor::new("sh")
        .with_args(["-c".to_string(), script])
        .with_env("PIDFILE", pidfile.to_string_lossy())
}

/// Read the pid a mock server recorded.
pub fn read_pid(pidfile: &Path) -> i32 {
    std::fs::read_to_string(pidfile)
        .unwrap()
        .trim()
        .parse()
        .unwrap()
}

/// Whether a process with `pid` still exists (zombies count as gone once reaped).
#[cfg(unix)]
pub fn is_alive(pid: i32) -> bool {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;
    kill(Pid::from_raw(pid), None).is_ok()
}

/// Build an HTTP/1.1 response with a body.
pub fn http_response(status: &str, content_type: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {status}\r\n\
         Content-Type: {content_type}\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         \r\n\
         {body}",
        body.len()
    )
}

/// JSON-RPC success response for the remote transport's fixed id.
pub fn http_json_result(result: &str) -> String {
    http_response(
        "200 OK",
        "application/json",
        &format!(r#"{{"jsonrpc":"2.0","id":1,"result":{result}}}"#),
    )
}

/// One request as seen by the mock server.
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub head: String,
    pub body: String,
}

impl CapturedRequest {
    pub fn request_line(&self) -> &str {
        self.head.lines().next().unwrap_or_default()
    }

    /// Header value, matched case-insensitively.
    pub fn header(&self, name: &str) -> Option<String> {
        self.head.lines().skip(1).find_map(|line| {
            let (key, value) = line.split_once(':')?;
            key.trim()
                .eq_ignore_ascii_case(name)
                .then(|| value.trim().to_string())
        })
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.body).unwrap()
    }
}

/// Raw TCP HTTP server answering every connection with the same response.
pub struct MockHttp {
    pub url: String,
    hits: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<CapturedRequest>>>,
}

impl MockHttp {
    /// Serve `response` to every request. `None` accepts and never answers.
    pub async fn start(response: Option<String>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let requests = Arc::new(Mutex::new(Vec::new()));

        let hits_clone = Arc::clone(&hits);
        let requests_clone = Arc::clone(&requests);
        tokio::spawn(async move {
            let response = Arc::new(response);
            loop {
                let (mut socket, _) = match listener.accept().await {
                    Ok(conn) => conn,
                    Err(_) => break,
                };
                hits_clone.fetch_add(1, Ordering::SeqCst);
                let requests = Arc::clone(&requests_clone);
                let response = Arc::clone(&response);

                tokio::spawn(async move {
                    let captured = read_request(&mut socket).await;
                    requests.lock().unwrap().push(captured);
                    match response.as_ref() {
                        Some(response) => {
                            let _ = socket.write_all(response.as_bytes()).await;
                            let _ = socket.shutdown().await;
                        }
                        None => tokio::time::sleep(Duration::from_secs(30)).await,
                    }
                });
            }
        });

        Self {
            url: format!("http://{addr}/mcp"),
            hits,
            requests,
        }
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<CapturedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

async fn read_request(socket: &mut TcpStream) -> CapturedRequest {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let head_end = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
        let n = socket.read(&mut chunk).await.unwrap_or(0);
        if n == 0 {
            break buf.len();
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).into_owned();
    let length = head
        .lines()
        .find_map(|line| {
            let (key, value) = line.split_once(':')?;
            if key.trim().eq_ignore_ascii_case("content-length") {
                value.trim().parse::<usize>().ok()
            } else {
                None
            }
        })
        .unwrap_or(0);

    while buf.len() < head_end + length {
        let n = socket.read(&mut chunk).await.unwrap_or(0);
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    CapturedRequest {
        head: head.trim_end().to_string(),
        body: String::from_utf8_lossy(&buf[head_end..]).into_owned(),
    }
}
