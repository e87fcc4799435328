//! A minimal HTTP/1.1 file server for download tests.
//!
//! Serves a fixed set of paths from a background thread until dropped.
//! Every request is answered and the connection closed; unknown paths get
//! a 404.

use std::collections::HashMap;
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};

/// Running file server bound to an ephemeral localhost port.
#[derive(Debug)]
pub struct FileServer {
    base: String,
    requests: Arc<AtomicUsize>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl FileServer {
    /// Serve `files` (`"/path"` to body). A path listed in `auth` requires
    /// that exact `Authorization` header value.
    ///
    /// # Panics
    /// Panics if no localhost port can be bound.
    pub fn start(files: Vec<(&str, Vec<u8>)>, auth: Option<&str>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind localhost");
        let base = format!("http://{}", listener.local_addr().expect("local addr"));
        let files: HashMap<String, Vec<u8>> = files
            .into_iter()
            .map(|(path, body)| (path.to_string(), body))
            .collect();
        let auth = auth.map(str::to_string);
        let requests = Arc::new(AtomicUsize::new(0));
        let stop = Arc::new(AtomicBool::new(false));

        let handle = {
            let requests = Arc::clone(&requests);
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                for stream in listener.incoming() {
                    if stop.load(Ordering::SeqCst) {
                        break;
                    }
                    let Ok(stream) = stream else { continue };
                    requests.fetch_add(1, Ordering::SeqCst);
                    respond(stream, &files, auth.as_deref());
                }
            })
        };

        Self {
            base,
            requests,
            stop,
            handle: Some(handle),
        }
    }

    /// Absolute URL of `path` on this server.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    /// Number of requests answered so far.
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

impl Drop for FileServer {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        // Wake the accept loop so it sees the flag
        let _ = TcpStream::connect(self.base.trim_start_matches("http://"));
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn respond(mut stream: TcpStream, files: &HashMap<String, Vec<u8>>, auth: Option<&str>) {
    let mut reader = BufReader::new(match stream.try_clone() {
        Ok(s) => s,
        Err(_) => return,
    });
    let mut request_line = String::new();
    if reader.read_line(&mut request_line).is_err() {
        return;
    }
    let path = request_line
        .split_whitespace()
        .nth(1)
        .unwrap_or("/")
        .split('?')
        .next()
        .unwrap_or("/")
        .to_string();

    let mut authorization = None;
    loop {
        let mut line = String::new();
        match reader.read_line(&mut line) {
            Ok(0) | Err(_) => break,
            Ok(_) if line.trim().is_empty() => break,
            Ok(_) => {
                if let Some((name, value)) = line.split_once(':')
                    && name.eq_ignore_ascii_case("authorization")
                {
                    authorization = Some(value.trim().to_string());
                }
            }
        }
    }

    let (status, body): (&str, &[u8]) = match files.get(&path) {
        _ if auth.is_some() && authorization.as_deref() != auth => ("401 Unauthorized", &[][..]),
        Some(body) => ("200 OK", body.as_slice()),
        None => ("404 Not Found", &[][..]),
    };
    let header = format!(
        "HTTP/1.1 {status}\r\nContent-Length: {}\r\nContent-Type: application/octet-stream\r\nConnection: close\r\n\r\n",
        body.len()
    );
    let _ = stream.write_all(header.as_bytes());
    let _ = stream.write_all(body);
    let _ = stream.flush();
}
