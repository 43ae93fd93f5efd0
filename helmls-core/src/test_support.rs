//! Shared fixtures for unit tests.
//!
//! `FakeServer` is a minimal HTTP/1.1 responder on an ephemeral localhost
//! port. Each connection gets exactly one response and is then closed.
//! `FakeFetcher` serves release assets from memory and records requests.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::io::{self, BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use url::Url;

use crate::downloader::Fetch;
use crate::error::{ProvisionError, Result};

/// Canned response for one route.
#[derive(Debug, Clone)]
pub struct FakeResponse {
    status: u16,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
    content_length: Option<usize>,
}

impl FakeResponse {
    pub fn ok(body: Vec<u8>) -> Self {
        Self {
            status: 200,
            headers: Vec::new(),
            body,
            content_length: None,
        }
    }

    /// 200 whose `Content-Length` promises more than `body`; the connection
    /// closes after the short body.
    pub fn truncated(body: Vec<u8>, content_length: usize) -> Self {
        Self {
            content_length: Some(content_length),
            ..Self::ok(body)
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Vec::new(),
            content_length: None,
        }
    }

    pub fn redirect(location: &str) -> Self {
        Self {
            status: 302,
            headers: vec![("Location".to_string(), location.to_string())],
            body: Vec::new(),
            content_length: None,
        }
    }
}

/// Background HTTP server serving fixed routes until dropped.
pub struct FakeServer {
    port: u16,
    requests: Arc<Mutex<Vec<String>>>,
    stop: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl FakeServer {
    pub fn spawn(routes: Vec<(String, FakeResponse)>) -> Self {
        let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind fake server");
        listener
            .set_nonblocking(true)
            .expect("fake server nonblocking");
        let port = listener.local_addr().expect("local addr").port();

        let routes: HashMap<String, FakeResponse> = routes.into_iter().collect();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let stop = Arc::new(AtomicBool::new(false));

        let requests_clone = Arc::clone(&requests);
        let stop_clone = Arc::clone(&stop);
        let handle = thread::spawn(move || {
            while !stop_clone.load(Ordering::SeqCst) {
                match listener.accept() {
                    Ok((stream, _)) => {
                        let _ = serve_one(stream, &routes, &requests_clone);
                    }
                    Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                        thread::sleep(Duration::from_millis(5));
                    }
                    Err(_) => break,
                }
            }
        });

        Self {
            port,
            requests,
            stop,
            handle: Some(handle),
        }
    }

    pub fn url(&self, path: &str) -> Url {
        Url::parse(&format!("http://127.0.0.1:{}{}", self.port, path)).expect("fake url")
    }

    /// Request paths received so far, in arrival order.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().expect("requests lock").clone()
    }
}

impl Drop for FakeServer {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn serve_one(
    stream: TcpStream,
    routes: &HashMap<String, FakeResponse>,
    requests: &Mutex<Vec<String>>,
) -> io::Result<()> {
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(Duration::from_secs(2)))?;

    let mut reader = BufReader::new(stream.try_clone()?);
    let mut request_line = String::new();
    reader.read_line(&mut request_line)?;

    // Drain headers.
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 || line == "\r\n" || line == "\n" {
            break;
        }
    }

    let path = request_line
        .split_whitespace()
        .nth(1)
        .unwrap_or("/")
        .to_string();
    if let Ok(mut guard) = requests.lock() {
        guard.push(path.clone());
    }

    let response = routes
        .get(&path)
        .cloned()
        .unwrap_or_else(|| FakeResponse::status(404));

    let mut out = stream;
    write!(out, "HTTP/1.1 {} Fake\r\n", response.status)?;
    for (name, value) in &response.headers {
        write!(out, "{name}: {value}\r\n")?;
    }
    write!(
        out,
        "Content-Length: {}\r\nConnection: close\r\n\r\n",
        response.content_length.unwrap_or(response.body.len())
    )?;
    out.write_all(&response.body)?;
    out.flush()
}

// ============================================================================
// Fake Fetcher
// ============================================================================

/// In-memory fetcher that records every URL requested.
#[derive(Default)]
pub struct FakeFetcher {
    files: Mutex<HashMap<String, Vec<u8>>>,
    calls: Mutex<Vec<String>>,
}

impl FakeFetcher {
    pub fn serve(&self, url: &str, body: &[u8]) {
        self.files
            .lock()
            .unwrap()
            .insert(url.to_string(), body.to_vec());
    }

    /// Publishes a binary and a matching checksum manifest on the default
    /// release host.
    pub fn publish(&self, version: &str, binary_name: &str, body: &[u8]) {
        let base = format!("https://github.com/mrjosh/helm-ls/releases/download/{version}");
        let digest: String = Sha256::digest(body)
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect();
        self.serve(&format!("{base}/{binary_name}"), body);
        self.serve(
            &format!("{base}/{binary_name}.sha256sum"),
            format!("{digest}  {binary_name}\n").as_bytes(),
        );
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Fetch for FakeFetcher {
    async fn fetch(&self, url: &Url, dest: &Path) -> Result<u64> {
        self.calls.lock().unwrap().push(url.to_string());
        let body = self.files.lock().unwrap().get(url.as_str()).cloned();
        match body {
            Some(body) => {
                tokio::fs::write(dest, &body)
                    .await
                    .map_err(|e| ProvisionError::io("fake write", e))?;
                Ok(body.len() as u64)
            }
            None => Err(ProvisionError::Download {
                url: url.to_string(),
                status: 404,
            }),
        }
    }
}
