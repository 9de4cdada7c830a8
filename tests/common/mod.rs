#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use cfde_kc_fetch::ClientConfig;

#[derive(Debug, Clone)]
struct Reply {
    status: u16,
    body: Vec<u8>,
    content_length: bool,
}

type Script = HashMap<String, VecDeque<Reply>>;

#[derive(Debug, Clone)]
pub struct Recorded {
    pub target: String,
    pub user_agent: Option<String>,
}

/// Minimal HTTP/1.1 server answering scripted responses per request path.
///
/// Each path pops its next response; an exhausted or unknown path gets 404.
pub struct StubServer {
    port: u16,
    script: Arc<Mutex<Script>>,
    requests: Arc<Mutex<Vec<Recorded>>>,
}

impl StubServer {
    pub fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind stub server");
        let port = listener.local_addr().expect("local addr").port();
        let script: Arc<Mutex<Script>> = Arc::default();
        let requests: Arc<Mutex<Vec<Recorded>>> = Arc::default();

        let thread_script = Arc::clone(&script);
        let thread_requests = Arc::clone(&requests);
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { continue };
                handle(stream, &thread_script, &thread_requests);
            }
        });

        Self {
            port,
            script,
            requests,
        }
    }

    pub fn respond(&self, path: &str, status: u16, body: impl Into<Vec<u8>>) -> &Self {
        self.push(path, Reply {
            status,
            body: body.into(),
            content_length: true,
        })
    }

    /// 200 whose body is delimited by connection close only.
    pub fn respond_unsized(&self, path: &str, body: impl Into<Vec<u8>>) -> &Self {
        self.push(path, Reply {
            status: 200,
            body: body.into(),
            content_length: false,
        })
    }

    fn push(&self, path: &str, reply: Reply) -> &Self {
        self.script
            .lock()
            .unwrap()
            .entry(path.to_string())
            .or_default()
            .push_back(reply);
        self
    }

    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    pub fn config(&self) -> ClientConfig {
        ClientConfig::default()
            .with_base_url(self.base_url())
            .with_timeout_secs(5)
            .with_backoff_base(Duration::from_millis(5))
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    pub fn hits(&self, path: &str) -> usize {
        self.requests()
            .iter()
            .filter(|req| req.target.split('?').next() == Some(path))
            .count()
    }
}

fn handle(stream: TcpStream, script: &Mutex<Script>, requests: &Mutex<Vec<Recorded>>) {
    let mut reader = BufReader::new(&stream);
    let mut request_line = String::new();
    if reader.read_line(&mut request_line).is_err() {
        return;
    }
    let target = request_line
        .split_whitespace()
        .nth(1)
        .unwrap_or("/")
        .to_string();

    let mut user_agent = None;
    loop {
        let mut line = String::new();
        match reader.read_line(&mut line) {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            if name.eq_ignore_ascii_case("user-agent") {
                user_agent = Some(value.trim().to_string());
            }
        }
    }

    requests.lock().unwrap().push(Recorded {
        target: target.clone(),
        user_agent,
    });

    let path = target.split('?').next().unwrap_or("/").to_string();
    let reply = script
        .lock()
        .unwrap()
        .get_mut(&path)
        .and_then(|queue| queue.pop_front())
        .unwrap_or_else(|| Reply {
            status: 404,
            body: b"{\"detail\": \"Not Found\"}".to_vec(),
            content_length: true,
        });

    let mut stream = &stream;
    let mut head = format!("HTTP/1.1 {} {}\r\n", reply.status, reason(reply.status));
    if reply.content_length {
        head.push_str(&format!("Content-Length: {}\r\n", reply.body.len()));
    }
    head.push_str("Content-Type: application/octet-stream\r\nConnection: close\r\n\r\n");
    let _ = stream.write_all(head.as_bytes());
    let _ = stream.write_all(&reply.body);
    let _ = stream.flush();
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        _ => "Status",
    }
}

pub fn gzip(bytes: &[u8]) -> Vec<u8> {
    use flate2::Compression;
    use flate2::write::GzEncoder;

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes).unwrap();
    encoder.finish().unwrap()
}

/// Address that refuses connections.
pub fn closed_base_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{port}")
}
