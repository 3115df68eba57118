use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::{Ipv4Addr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use super::*;
use crate::config::ConfigError;
use crate::resolver::tests::StubLookup;

const LOCALHOST: Ipv4Addr = Ipv4Addr::LOCALHOST;

fn spawn_mock_server(
    script: Vec<(&'static str, &'static str)>,
) -> (u16, thread::JoinHandle<()>) {
    spawn_server_with_greeting(b"220 mock.smtp.test ESMTP\r\n".to_vec(), script)
}

fn spawn_server_with_greeting(
    greeting: Vec<u8>,
    script: Vec<(&'static str, &'static str)>,
) -> (u16, thread::JoinHandle<()>) {
    spawn_raw_server(move |mut stream| {
        handle_session(&mut stream, &greeting, script).expect("mock session");
    })
}

/// Accepts one connection and hands it to `serve`.
fn spawn_raw_server<F>(serve: F) -> (u16, thread::JoinHandle<()>)
where
    F: FnOnce(TcpStream) + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind mock server");
    let port = listener.local_addr().expect("addr").port();
    let handle = thread::spawn(move || {
        if let Ok((stream, _)) = listener.accept() {
            serve(stream);
        }
    });
    (port, handle)
}

fn handle_session(
    stream: &mut TcpStream,
    greeting: &[u8],
    script: Vec<(&'static str, &'static str)>,
) -> io::Result<()> {
    let mut reader = BufReader::new(stream.try_clone()?);
    stream.write_all(greeting)?;
    stream.flush()?;
    for (expected, response) in script {
        let mut line = String::new();
        reader.read_line(&mut line)?;
        assert!(
            line.starts_with(expected),
            "expected command starting with '{expected}', got '{line}'"
        );
        stream.write_all(response.as_bytes())?;
        stream.flush()?;
    }
    Ok(())
}

fn direct(stub: StubLookup, port: u16) -> DirectTransport {
    DirectTransport::new(Arc::new(stub), DEFAULT_PROBE_IDENTITY)
        .with_port(port)
        .with_timeout(Duration::from_millis(500))
}

fn sent_commands(result: &ProbeResult) -> Vec<&str> {
    result
        .session_log
        .iter()
        .filter(|e| e.step == LogStep::Send)
        .map(|e| e.data.as_str())
        .collect()
}

#[test]
fn recipient_rejection_counts_as_connected() {
    let (port, handle) = spawn_mock_server(vec![
        ("EHLO probe.localdomain", "250-mock.smtp.test\r\n250 SIZE 1000\r\n"),
        ("MAIL FROM:<probe@probe.localdomain>", "250 2.1.0 Sender ok\r\n"),
        ("RCPT TO:<probe@example.com>", "550 5.1.1 No such user\r\n"),
        ("QUIT", "221 2.0.0 Bye\r\n"),
    ]);
    let transport = direct(StubLookup::new().with_a("mx1.example.com", &[LOCALHOST]), port);

    let result = transport.probe("mx1.example.com", "example.com");
    handle.join().expect("server thread");

    assert!(result.connected);
    assert_eq!(result.transport, TransportMode::Direct);
    assert_eq!(result.ips, vec![LOCALHOST]);
    assert_eq!(
        sent_commands(&result),
        vec![
            "EHLO probe.localdomain",
            "MAIL FROM:<probe@probe.localdomain>",
            "RCPT TO:<probe@example.com>",
            "QUIT",
        ]
    );
    let received: Vec<&str> = result
        .session_log
        .iter()
        .filter(|e| e.step == LogStep::Receive)
        .map(|e| e.data.as_str())
        .collect();
    assert_eq!(received[1], "250-mock.smtp.test\n250 SIZE 1000");
    assert_eq!(result.session_log.last().map(|e| e.step), Some(LogStep::Info));
}

#[test]
fn peer_close_after_greeting_keeps_connected_flag() {
    let (port, handle) = spawn_mock_server(vec![("EHLO", "")]);
    let transport = direct(StubLookup::new().with_a("mx.example.com", &[LOCALHOST]), port);

    let result = transport.probe("mx.example.com", "example.com");
    handle.join().expect("server thread");

    assert!(result.connected);
    assert_eq!(sent_commands(&result), vec!["EHLO probe.localdomain"]);
}

#[test]
fn silent_server_times_out() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().expect("addr").port();
    let transport = direct(StubLookup::new().with_a("mx.example.com", &[LOCALHOST]), port)
        .with_timeout(Duration::from_millis(200));

    let result = transport.probe("mx.example.com", "example.com");
    drop(listener);

    assert!(!result.connected);
    let last = result.session_log.last().expect("log entries");
    assert_eq!(last.step, LogStep::Error);
    assert!(last.data.contains("timed out"), "unexpected entry: {last:?}");
    assert_eq!(result.details.as_deref(), Some("Tried IPs: 127.0.0.1"));
}

#[test]
fn latin1_banner_is_decoded_lossily() {
    let (port, handle) = spawn_server_with_greeting(
        b"220 mx.example.com ESMTP caf\xe9 ready\r\n".to_vec(),
        vec![
            ("EHLO", "250 mx.example.com\r\n"),
            ("MAIL FROM", "250 ok\r\n"),
            ("RCPT TO", "550 unknown user\r\n"),
            ("QUIT", "221 bye\r\n"),
        ],
    );
    let transport = direct(StubLookup::new().with_a("mx.example.com", &[LOCALHOST]), port);

    let result = transport.probe("mx.example.com", "example.com");
    handle.join().expect("server thread");

    assert!(result.connected);
    let banner = result
        .session_log
        .iter()
        .find(|e| e.step == LogStep::Receive)
        .expect("banner logged");
    assert_eq!(banner.data, "220 mx.example.com ESMTP caf\u{fffd} ready");
    assert!(result.session_log.iter().all(|e| e.step != LogStep::Error));
}

#[test]
fn banner_without_reply_code_still_counts_as_connected() {
    let (port, handle) = spawn_server_with_greeting(
        b"Welcome to mail\r\n".to_vec(),
        vec![("QUIT", "221 bye\r\n")],
    );
    let transport = direct(StubLookup::new().with_a("mx.example.com", &[LOCALHOST]), port);

    let result = transport.probe("mx.example.com", "example.com");
    handle.join().expect("server thread");

    assert!(result.connected);
    assert_eq!(sent_commands(&result), vec!["QUIT"]);
    let anomaly = result
        .session_log
        .iter()
        .find(|e| e.data.starts_with("Unrecognised reply from 127.0.0.1"))
        .expect("anomaly logged");
    assert_eq!(anomaly.details.as_deref(), Some("Welcome to mail"));
    assert!(result.session_log.iter().all(|e| e.step != LogStep::Error));
}

#[test]
fn endless_continuation_lines_are_cut_off() {
    let (port, handle) = spawn_raw_server(|mut stream| {
        let flood = "220-still greeting\r\n".repeat(200);
        let _ = stream.write_all(flood.as_bytes());
        let mut line = String::new();
        let mut reader = BufReader::new(stream.try_clone().expect("clone"));
        if reader.read_line(&mut line).is_ok() && line.starts_with("QUIT") {
            let _ = stream.write_all(b"221 bye\r\n");
        }
    });
    let transport = direct(StubLookup::new().with_a("mx.example.com", &[LOCALHOST]), port);

    let result = transport.probe("mx.example.com", "example.com");
    handle.join().expect("server thread");

    assert!(result.connected);
    assert_eq!(sent_commands(&result), vec!["QUIT"]);
    assert!(result
        .session_log
        .iter()
        .any(|e| e.details.as_deref() == Some("reply exceeds 64 lines")));
}

#[test]
fn trickling_server_is_bounded_by_the_address_budget() {
    let (port, handle) = spawn_raw_server(|mut stream| {
        for _ in 0..40 {
            if stream.write_all(b"220-still here\r\n").is_err() {
                break;
            }
            thread::sleep(Duration::from_millis(100));
        }
    });
    let transport = direct(StubLookup::new().with_a("mx.example.com", &[LOCALHOST]), port);

    let started = Instant::now();
    let result = transport.probe("mx.example.com", "example.com");
    let elapsed = started.elapsed();

    assert!(elapsed < Duration::from_millis(1500), "took {elapsed:?}");
    assert!(!result.connected);
    let last = result.session_log.last().expect("log entries");
    assert_eq!(last.step, LogStep::Error);
    assert!(last.data.contains("timed out"), "unexpected entry: {last:?}");
    drop(handle);
}

#[test]
fn refused_connection_records_error_code() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        listener.local_addr().expect("addr").port()
    };
    let transport = direct(StubLookup::new().with_a("mx.example.com", &[LOCALHOST]), port);

    let result = transport.probe("mx.example.com", "example.com");

    assert!(!result.connected);
    let last = result.session_log.last().expect("log entries");
    assert_eq!(last.step, LogStep::Error);
    assert!(last.details.is_some());
}

#[test]
fn tries_next_address_after_failure() {
    let (port, handle) = spawn_mock_server(vec![
        ("EHLO", "250 mock\r\n"),
        ("MAIL FROM:", "250 ok\r\n"),
        ("RCPT TO:", "503 5.5.1 Bad sequence\r\n"),
        ("QUIT", "221 Bye\r\n"),
    ]);
    let unreachable = Ipv4Addr::new(127, 0, 0, 2);
    let transport = direct(
        StubLookup::new().with_a("mx.example.com", &[unreachable, LOCALHOST]),
        port,
    );

    let result = transport.probe("mx.example.com", "example.com");
    handle.join().expect("server thread");

    assert!(result.connected);
    assert_eq!(result.ips, vec![unreachable, LOCALHOST]);
    let errors = result
        .session_log
        .iter()
        .filter(|e| e.step == LogStep::Error)
        .count();
    assert_eq!(errors, 1);
}

#[test]
fn unresolvable_host_fails_without_socket() {
    let transport = direct(StubLookup::new(), 25);
    let result = transport.probe("ghost.example.com", "example.com");

    assert!(!result.connected);
    assert!(result.ips.is_empty());
    assert_eq!(result.session_log.len(), 1);
    assert_eq!(result.session_log[0].step, LogStep::Error);
}

fn spawn_mock_http(status: &'static str, body: &'static str) -> (String, mpsc::Receiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind mock http");
    let port = listener.local_addr().expect("addr").port();
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        if let Ok((mut stream, _)) = listener.accept() {
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                match stream.read(&mut buf) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => request.extend_from_slice(&buf[..n]),
                }
            }
            let head = String::from_utf8_lossy(&request);
            let request_line = head.lines().next().unwrap_or_default().to_string();
            tx.send(request_line).ok();
            let response = format!(
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            stream.write_all(response.as_bytes()).ok();
            stream.flush().ok();
        }
    });
    (format!("http://127.0.0.1:{port}/"), rx)
}

#[test]
fn proxy_result_mirrors_remote_payload() {
    let (endpoint, requests) = spawn_mock_http(
        "200 OK",
        r#"{"connected":true,"ip":"203.0.113.9","details":"ok","sessionLog":[
            {"step":"info","data":"Connected to 203.0.113.9:25","timestamp":"10:00:00"},
            {"step":"receive","data":"220 mx ready","timestamp":"10:00:01"}]}"#,
    );
    let transport = ProxyTransport::new(endpoint, Duration::from_secs(5)).expect("transport");

    let result = transport.probe("mx1.example.com", "example.com");

    let request_line = requests.recv().expect("request seen");
    assert!(
        request_line.starts_with("GET /check?domain=example.com "),
        "unexpected request line: {request_line}"
    );
    assert!(result.connected);
    assert_eq!(result.host, "mx1.example.com");
    assert_eq!(result.transport, TransportMode::Proxy);
    assert_eq!(result.ips, vec![Ipv4Addr::new(203, 0, 113, 9)]);
    assert_eq!(result.session_log.len(), 2);
    assert_eq!(result.details.as_deref(), Some("ok"));
}

#[test]
fn proxy_http_failure_is_absorbed() {
    let (endpoint, _requests) = spawn_mock_http("502 Bad Gateway", "{}");
    let transport = ProxyTransport::new(endpoint, Duration::from_secs(5)).expect("transport");

    let result = transport.probe("mx1.example.com", "example.com");

    assert!(!result.connected);
    assert!(result.ips.is_empty());
    assert_eq!(result.session_log.len(), 1);
    assert_eq!(result.session_log[0].step, LogStep::Error);
    assert!(result.session_log[0].data.starts_with("Proxy error:"));
}

#[test]
fn proxy_requires_endpoint() {
    let err = ProxyTransport::new("  ", Duration::from_secs(1)).expect_err("empty endpoint");
    assert!(matches!(err, ConfigError::MissingProxyEndpoint));
}

#[test]
fn disabled_transport_never_connects() {
    let result = DisabledTransport.probe("mx.example.com", "example.com");
    assert!(!result.connected);
    assert_eq!(result.transport, TransportMode::Disabled);
    assert_eq!(result.session_log[0].step, LogStep::Info);
}
