//! Loopback HTTP server for service tests. Serves canned routes, honors
//! single `Range` requests and records every request path.

use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct Route {
    path: String,
    status: u16,
    body: Vec<u8>,
    content_type: &'static str,
    accept_ranges: bool,
}

impl Route {
    pub fn json(path: &str, body: &str) -> Self {
        Self {
            path: path.to_string(),
            status: 200,
            body: body.as_bytes().to_vec(),
            content_type: "application/json",
            accept_ranges: false,
        }
    }

    pub fn bytes(path: &str, body: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.to_string(),
            status: 200,
            body: body.into(),
            content_type: "application/octet-stream",
            accept_ranges: false,
        }
    }

    pub fn ranged(path: &str, body: impl Into<Vec<u8>>) -> Self {
        Self {
            accept_ranges: true,
            ..Self::bytes(path, body)
        }
    }

    pub fn status(path: &str, status: u16, body: &str) -> Self {
        Self {
            path: path.to_string(),
            status,
            body: body.as_bytes().to_vec(),
            content_type: "text/plain; charset=utf-8",
            accept_ranges: false,
        }
    }
}

struct ServerState {
    running: AtomicBool,
    routes: Vec<Route>,
    requests: Mutex<Vec<String>>,
}

pub struct TestServer {
    port: u16,
    state: Arc<ServerState>,
}

impl TestServer {
    pub fn start(routes: Vec<Route>) -> Self {
        let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind loopback");
        listener.set_nonblocking(true).expect("nonblocking listener");
        let port = listener.local_addr().expect("local addr").port();
        let state = Arc::new(ServerState {
            running: AtomicBool::new(true),
            routes,
            requests: Mutex::new(Vec::new()),
        });
        let loop_state = Arc::clone(&state);
        thread::spawn(move || serve_loop(listener, loop_state));
        Self { port, state }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://127.0.0.1:{}{}", self.port, path)
    }

    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    /// Raw request targets (path and query) in arrival order.
    pub fn requests(&self) -> Vec<String> {
        self.state
            .requests
            .lock()
            .map(|items| items.clone())
            .unwrap_or_default()
    }

    pub fn hits(&self, path: &str) -> usize {
        self.requests()
            .iter()
            .filter(|target| target.split('?').next() == Some(path))
            .count()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.state.running.store(false, Ordering::Relaxed);
    }
}

fn serve_loop(listener: TcpListener, state: Arc<ServerState>) {
    while state.running.load(Ordering::Relaxed) {
        match listener.accept() {
            Ok((stream, _)) => {
                let state = Arc::clone(&state);
                thread::spawn(move || {
                    let _ = handle_connection(stream, &state);
                });
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(Duration::from_millis(5));
            }
            Err(_) => thread::sleep(Duration::from_millis(20)),
        }
    }
}

struct Request {
    method: String,
    target: String,
    range: Option<(u64, Option<u64>)>,
}

fn read_request(stream: &TcpStream) -> std::io::Result<Option<Request>> {
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut first_line = String::new();
    if reader.read_line(&mut first_line)? == 0 {
        return Ok(None);
    }
    let mut parts = first_line.split_whitespace();
    let method = parts.next().unwrap_or("").to_string();
    let target = parts.next().unwrap_or("/").to_string();

    let mut range = None;
    for _ in 0..64 {
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 || line == "\r\n" || line == "\n" {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("range") {
                range = parse_range(value.trim());
            }
        }
    }
    Ok(Some(Request {
        method,
        target,
        range,
    }))
}

fn parse_range(value: &str) -> Option<(u64, Option<u64>)> {
    let ranges = value.strip_prefix("bytes=")?;
    let (start, end) = ranges.split_once('-')?;
    let start = start.trim().parse::<u64>().ok()?;
    let end = end.trim();
    let end = if end.is_empty() {
        None
    } else {
        Some(end.parse::<u64>().ok()?)
    };
    Some((start, end))
}

fn handle_connection(mut stream: TcpStream, state: &ServerState) -> std::io::Result<()> {
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(Duration::from_secs(5)))?;
    let Some(request) = read_request(&stream)? else {
        return Ok(());
    };
    if let Ok(mut requests) = state.requests.lock() {
        requests.push(request.target.clone());
    }

    let path = request.target.split('?').next().unwrap_or("/");
    let Some(route) = state.routes.iter().find(|route| route.path == path) else {
        return write_response(&mut stream, 404, "text/plain", &[], b"not found", true);
    };

    let head_only = request.method.eq_ignore_ascii_case("HEAD");
    let mut extra_headers = Vec::new();
    if route.accept_ranges {
        extra_headers.push("Accept-Ranges: bytes".to_string());
    }

    if let (true, Some((start, end)), 200) = (route.accept_ranges, request.range, route.status) {
        let len = route.body.len() as u64;
        let end = end.unwrap_or(len.saturating_sub(1)).min(len.saturating_sub(1));
        if start > end || start >= len {
            return write_response(&mut stream, 416, "text/plain", &extra_headers, b"", true);
        }
        extra_headers.push(format!("Content-Range: bytes {start}-{end}/{len}"));
        let slice = &route.body[start as usize..=end as usize];
        return write_response(
            &mut stream,
            206,
            route.content_type,
            &extra_headers,
            if head_only { &[] } else { slice },
            !head_only,
        );
    }

    if head_only {
        let headers = format!(
            "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\n{}Connection: close\r\n\r\n",
            route.status,
            reason(route.status),
            route.content_type,
            route.body.len(),
            joined_headers(&extra_headers)
        );
        stream.write_all(headers.as_bytes())?;
        return stream.flush();
    }

    write_response(
        &mut stream,
        route.status,
        route.content_type,
        &extra_headers,
        &route.body,
        true,
    )
}

fn joined_headers(headers: &[String]) -> String {
    headers.iter().map(|header| format!("{header}\r\n")).collect()
}

fn write_response(
    stream: &mut TcpStream,
    code: u16,
    content_type: &str,
    extra_headers: &[String],
    body: &[u8],
    with_length: bool,
) -> std::io::Result<()> {
    let length = if with_length {
        format!("Content-Length: {}\r\n", body.len())
    } else {
        String::new()
    };
    let head = format!(
        "HTTP/1.1 {code} {}\r\nContent-Type: {content_type}\r\n{length}{}Cache-Control: no-store\r\nConnection: close\r\n\r\n",
        reason(code),
        joined_headers(extra_headers)
    );
    stream.write_all(head.as_bytes())?;
    stream.write_all(body)?;
    stream.flush()
}

fn reason(code: u16) -> &'static str {
    match code {
        200 => "OK",
        206 => "Partial Content",
        404 => "Not Found",
        416 => "Range Not Satisfiable",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Status",
    }
}

/// Unique scratch directory under the system temp dir.
pub fn temp_root(label: &str) -> std::path::PathBuf {
    let root = std::env::temp_dir().join(format!(
        "patch-launcher-{label}-{}",
        uuid::Uuid::new_v4()
    ));
    std::fs::create_dir_all(&root).expect("create temp root");
    root
}
