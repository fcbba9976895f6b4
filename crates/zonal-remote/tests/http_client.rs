//! HTTP client tests against a one-shot local server.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::thread::{self, JoinHandle};

use zonal_core::BinConfig;
use zonal_remote::{DatasetRef, HttpStatsClient, RemoteError, StatsClient, StatsRequest};

/// Serve one canned response and hand back the request body.
fn serve_once(status_line: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let mut reader = BufReader::new(stream.try_clone().unwrap());

        let mut content_length = 0usize;
        loop {
            let mut line = String::new();
            reader.read_line(&mut line).unwrap();
            if line == "\r\n" || line.is_empty() {
                break;
            }
            let lower = line.to_ascii_lowercase();
            if let Some(value) = lower.strip_prefix("content-length:") {
                content_length = value.trim().parse().unwrap();
            }
        }
        let mut request_body = vec![0u8; content_length];
        reader.read_exact(&mut request_body).unwrap();

        let mut stream = stream;
        write!(
            stream,
            "{}\r\nContent-Type: text/csv\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status_line,
            body.len(),
            body
        )
        .unwrap();
        stream.flush().unwrap();

        String::from_utf8(request_body).unwrap()
    });

    (format!("http://{}", addr), handle)
}

fn client(endpoint: &str) -> HttpStatsClient {
    let inner = reqwest::blocking::Client::builder().no_proxy().build().unwrap();
    HttpStatsClient::with_client(endpoint, inner).unwrap()
}

fn request() -> StatsRequest {
    StatsRequest::new("users/me/kenya", &DatasetRef::default(), &BinConfig::default(), 100.0).with_multiplier(2)
}

#[test]
fn test_successful_job_writes_artifact() {
    let csv = "label,total,histogram\n41,8,\"[[0, 8]]\"\n";
    let (endpoint, server) = serve_once("HTTP/1.1 200 OK", csv);
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("scratch").join("raw.csv");

    let client = client(&endpoint);
    client.request(&request(), &output).unwrap();

    assert_eq!(std::fs::read_to_string(&output).unwrap(), csv);
    let stats = client.request_stats();
    assert_eq!(stats.jobs_sent, 1);
    assert_eq!(stats.artifacts_received, 1);
    assert_eq!(stats.bytes_received, csv.len() as u64);

    let sent: serde_json::Value = serde_json::from_str(&server.join().unwrap()).unwrap();
    assert_eq!(sent["resource_multiplier"], 2);
    assert_eq!(sent["aoi"], "users/me/kenya");
}

#[test]
fn test_empty_body_leaves_no_artifact() {
    let (endpoint, server) = serve_once("HTTP/1.1 200 OK", "");
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("raw.csv");

    let job = client(&endpoint).request(&request(), &output).unwrap();
    server.join().unwrap();

    assert!(!output.exists());
    assert_eq!(job.messages.len(), 1);
}

#[test]
fn test_rejected_job() {
    let (endpoint, server) = serve_once("HTTP/1.1 500 Internal Server Error", "User memory limit exceeded.");
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("raw.csv");

    let err = client(&endpoint).request(&request(), &output).unwrap_err();
    server.join().unwrap();

    match err {
        RemoteError::JobRejected { status, body } => {
            assert_eq!(status, 500);
            assert_eq!(body, "User memory limit exceeded.");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!output.exists());
}
