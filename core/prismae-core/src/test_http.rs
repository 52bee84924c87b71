//! Scripted HTTP listener for driving the blocking clients in tests.
//!
//! Each accepted connection gets the next canned `(status, body)` answer and
//! is closed, so the client opens a fresh connection per request.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;

pub struct ScriptedServer {
    url: String,
    requests: Arc<Mutex<Vec<ScriptedRequest>>>,
}

#[derive(Debug, Clone)]
pub struct ScriptedRequest {
    pub line: String,
    pub headers: Vec<(String, String)>,
}

impl ScriptedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

impl ScriptedServer {
    pub fn start(responses: &[(u16, &str)]) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let requests = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&requests);
        let responses: Vec<(u16, String)> = responses
            .iter()
            .map(|(status, body)| (*status, body.to_string()))
            .collect();

        thread::spawn(move || {
            for (status, body) in responses {
                let Ok((stream, _)) = listener.accept() else {
                    return;
                };
                answer(stream, status, &body, &seen);
            }
        });

        Self { url, requests }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Request lines received so far, e.g. `GET /auth/v1/user HTTP/1.1`.
    pub fn requests(&self) -> Vec<String> {
        self.received().into_iter().map(|request| request.line).collect()
    }

    pub fn received(&self) -> Vec<ScriptedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn saw(&self, fragment: &str) -> bool {
        self.requests().iter().any(|line| line.contains(fragment))
    }
}

fn answer(mut stream: TcpStream, status: u16, body: &str, seen: &Mutex<Vec<ScriptedRequest>>) {
    let mut reader = BufReader::new(stream.try_clone().unwrap());
    let mut request_line = String::new();
    reader.read_line(&mut request_line).unwrap();

    let mut headers = Vec::new();
    let mut content_length = 0usize;
    loop {
        let mut header = String::new();
        reader.read_line(&mut header).unwrap();
        let header = header.trim_end();
        if header.is_empty() {
            break;
        }
        if let Some((name, value)) = header.split_once(':') {
            if name.eq_ignore_ascii_case("content-length") {
                content_length = value.trim().parse().unwrap_or(0);
            }
            headers.push((name.trim().to_string(), value.trim().to_string()));
        }
    }
    let mut payload = vec![0u8; content_length];
    reader.read_exact(&mut payload).unwrap();

    // Record before answering so the client never observes a missing entry.
    seen.lock().unwrap().push(ScriptedRequest {
        line: request_line.trim_end().to_string(),
        headers,
    });

    let response = format!(
        "HTTP/1.1 {} Scripted\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        body.len(),
        body
    );
    stream.write_all(response.as_bytes()).unwrap();
    stream.flush().unwrap();
}
