#![allow(dead_code)]

use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::{sleep, Instant};

/// Asks the OS for a currently unused port.
pub fn free_port() -> u16 {
    let socket = std::net::TcpListener::bind("0.0.0.0:0").unwrap();
    socket.local_addr().unwrap().port()
}

/// Connects to a local port, retrying while the listener is still coming up.
pub async fn connect_with_retry(port: u16, within: Duration) -> TcpStream {
    let deadline = Instant::now() + within;
    loop {
        match TcpStream::connect(("127.0.0.1", port)).await {
            Ok(stream) => return stream,
            Err(e) if Instant::now() >= deadline => {
                panic!("could not connect to port {}: {}", port, e)
            }
            Err(_) => sleep(Duration::from_millis(20)).await,
        }
    }
}

/// Plain GET against a local HTTP port. `None` while nothing answers yet.
pub async fn http_get(port: u16, path: &str) -> Option<(hyper::StatusCode, String)> {
    let uri: hyper::Uri = format!("http://127.0.0.1:{}{}", port, path).parse().unwrap();
    let response = hyper::Client::new().get(uri).await.ok()?;
    let status = response.status();
    let body = hyper::body::to_bytes(response.into_body()).await.ok()?;
    Some((status, String::from_utf8_lossy(&body).into_owned()))
}

/// Retries `http_get` until the server answers.
pub async fn http_get_with_retry(
    port: u16,
    path: &str,
    within: Duration,
) -> (hyper::StatusCode, String) {
    let deadline = Instant::now() + within;
    loop {
        if let Some(answer) = http_get(port, path).await {
            return answer;
        }
        if Instant::now() >= deadline {
            panic!("no HTTP answer on port {}{}", port, path);
        }
        sleep(Duration::from_millis(50)).await;
    }
}
