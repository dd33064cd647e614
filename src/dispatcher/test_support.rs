//! Minimal HTTP/1.1 responder for dispatcher tests.
//!
//! Serves fixed `(path → status, body)` routes on a loopback port and records
//! each request path, headers, and body. Every response closes its connection.

use std::sync::{Arc, Mutex};

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

#[derive(Debug, Clone)]
pub(crate) struct Route {
    path: String,
    status: u16,
    body: String,
}

impl Route {
    pub(crate) fn new(path: &str, status: u16, body: &str) -> Self {
        Self {
            path: path.to_string(),
            status,
            body: body.to_string(),
        }
    }
}

pub(crate) struct MockServer {
    pub(crate) base_url: String,
    hits: Arc<Mutex<Vec<String>>>,
    bodies: Arc<Mutex<Vec<String>>>,
    headers: Arc<Mutex<Vec<Vec<String>>>>,
}

impl MockServer {
    /// Request paths, in arrival order.
    pub(crate) fn hits(&self) -> Vec<String> {
        self.hits.lock().unwrap().clone()
    }

    /// Request bodies, in arrival order.
    pub(crate) fn bodies(&self) -> Vec<String> {
        self.bodies.lock().unwrap().clone()
    }

    /// Raw header lines of each request, in arrival order.
    pub(crate) fn headers(&self) -> Vec<Vec<String>> {
        self.headers.lock().unwrap().clone()
    }
}

/// Shared per-server request log.
#[derive(Clone)]
struct Recorder {
    hits: Arc<Mutex<Vec<String>>>,
    bodies: Arc<Mutex<Vec<String>>>,
    headers: Arc<Mutex<Vec<Vec<String>>>>,
}

pub(crate) async fn mock_server(routes: Vec<Route>) -> MockServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let routes = Arc::new(routes);
    let recorder = Recorder {
        hits: Arc::new(Mutex::new(Vec::new())),
        bodies: Arc::new(Mutex::new(Vec::new())),
        headers: Arc::new(Mutex::new(Vec::new())),
    };

    let (r, rec) = (routes.clone(), recorder.clone());
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let (r, rec) = (r.clone(), rec.clone());
            tokio::spawn(async move {
                let _ = serve(stream, &r, &rec).await;
            });
        }
    });

    MockServer {
        base_url: format!("http://{addr}"),
        hits: recorder.hits,
        bodies: recorder.bodies,
        headers: recorder.headers,
    }
}

async fn serve(
    mut stream: TcpStream,
    routes: &[Route],
    recorder: &Recorder,
) -> std::io::Result<()> {
    let (read_half, mut write_half) = stream.split();
    let mut reader = BufReader::new(read_half);

    let mut request_line = String::new();
    reader.read_line(&mut request_line).await?;
    let path = request_line
        .split_whitespace()
        .nth(1)
        .unwrap_or("/")
        .to_string();

    let mut content_length = 0usize;
    let mut chunked = false;
    let mut header_lines = Vec::new();
    loop {
        let mut header = String::new();
        if reader.read_line(&mut header).await? == 0 {
            break;
        }
        let header = header.trim_end();
        if header.is_empty() {
            break;
        }
        header_lines.push(header.to_string());
        let lower = header.to_ascii_lowercase();
        if let Some(v) = lower.strip_prefix("content-length:") {
            content_length = v.trim().parse().unwrap_or(0);
        }
        if lower.starts_with("transfer-encoding:") && lower.contains("chunked") {
            chunked = true;
        }
    }

    let mut body = Vec::new();
    if chunked {
        loop {
            let mut size_line = String::new();
            reader.read_line(&mut size_line).await?;
            let size = usize::from_str_radix(size_line.trim(), 16).unwrap_or(0);
            if size == 0 {
                let mut end = String::new();
                reader.read_line(&mut end).await?;
                break;
            }
            let mut chunk = vec![0u8; size + 2];
            reader.read_exact(&mut chunk).await?;
            body.extend_from_slice(&chunk[..size]);
        }
    } else if content_length > 0 {
        body = vec![0u8; content_length];
        reader.read_exact(&mut body).await?;
    }

    recorder.hits.lock().unwrap().push(path.clone());
    recorder.headers.lock().unwrap().push(header_lines);
    recorder
        .bodies
        .lock()
        .unwrap()
        .push(String::from_utf8_lossy(&body).into_owned());

    let (status, payload) = routes
        .iter()
        .find(|r| r.path == path)
        .map(|r| (r.status, r.body.clone()))
        .unwrap_or((404, "not found".to_string()));
    let content_type = if payload.starts_with('{') {
        "application/json"
    } else {
        "text/plain"
    };
    let response = format!(
        "HTTP/1.1 {status} Mock\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{payload}",
        payload.len()
    );
    write_half.write_all(response.as_bytes()).await?;
    write_half.shutdown().await
}
