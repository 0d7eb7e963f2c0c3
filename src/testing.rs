//! Scripted HTTP server for exercising fetch, retry and redirect handling

use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

/// Serves a fixed list of responses on 127.0.0.1, one per connection.
/// Once the list is exhausted every further request gets a 500.
pub struct ScriptedServer {
    base: String,
    hits: Arc<AtomicUsize>,
}

impl ScriptedServer {
    /// `script` receives the server's base URL (`http://127.0.0.1:PORT`)
    /// so responses can point back at it.
    pub fn start(script: impl FnOnce(&str) -> Vec<String>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let responses = script(&base);
        let hits = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&hits);
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(mut stream) = stream else { break };
                read_request(&mut stream);
                let index = counter.fetch_add(1, Ordering::SeqCst);
                let reply = responses
                    .get(index)
                    .cloned()
                    .unwrap_or_else(|| response("500 Internal Server Error", &[], ""));
                let _ = stream.write_all(reply.as_bytes());
                let _ = stream.flush();
            }
        });

        Self { base, hits }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    /// Requests answered so far
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

/// A complete HTTP/1.1 response that closes the connection
pub fn response(status: &str, headers: &[(&str, &str)], body: &str) -> String {
    let mut text = format!(
        "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n",
        status,
        body.len()
    );
    for (name, value) in headers {
        text.push_str(&format!("{}: {}\r\n", name, value));
    }
    text.push_str("\r\n");
    text.push_str(body);
    text
}

fn read_request(stream: &mut impl Read) {
    let mut request = Vec::new();
    let mut buf = [0u8; 1024];
    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
        match stream.read(&mut buf) {
            Ok(0) | Err(_) => break,
            Ok(n) => request.extend_from_slice(&buf[..n]),
        }
    }
}
