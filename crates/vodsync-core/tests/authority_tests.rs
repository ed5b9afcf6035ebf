//! Timing authority client behavior against a local HTTP stub.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use url::Url;
use vodsync_core::TimingAuthorityClient;

const DETAILS: &str =
    r#"{"entrants":[{"identity":"streamer0"}],"started_at":"2025-04-28T10:44:58Z"}"#;

/// Serve the given responses one connection at a time, counting requests.
async fn spawn_authority(responses: Vec<(u16, &'static str)>) -> (Url, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = Url::parse(&format!("http://{}/", listener.local_addr().unwrap())).unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);
    tokio::spawn(async move {
        for (status, body) in responses {
            let (mut stream, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => return,
            };
            counter.fetch_add(1, Ordering::SeqCst);
            let mut buf = vec![0u8; 4096];
            let mut read = 0;
            loop {
                match stream.read(&mut buf[read..]).await {
                    Ok(0) => break,
                    Ok(n) => {
                        read += n;
                        if buf[..read].windows(4).any(|w| w == b"\r\n\r\n") {
                            break;
                        }
                    }
                    Err(_) => return,
                }
            }
            let reason = match status {
                200 => "OK",
                404 => "Not Found",
                _ => "Internal Server Error",
            };
            let response = format!(
                "HTTP/1.1 {status} {reason}\r\n\
                 content-type: application/json\r\n\
                 content-length: {}\r\n\
                 connection: close\r\n\r\n{body}",
                body.len(),
            );
            let _ = stream.write_all(response.as_bytes()).await;
            let _ = stream.shutdown().await;
        }
    });
    (base, hits)
}

#[tokio::test]
async fn a_transient_server_error_is_retried() {
    let (base, hits) = spawn_authority(vec![(500, "{}"), (200, DETAILS)]).await;
    let client = TimingAuthorityClient::new(base).with_retries(3, Duration::from_millis(10));

    let details = client.event_details("ootr/foo-bar-1").await.unwrap();
    assert_eq!(details.entrants, vec!["streamer0".to_string()]);
    assert_eq!(details.started_at_ms, 1_745_837_098_000);
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn a_client_error_is_not_retried() {
    let (base, hits) = spawn_authority(vec![(404, "{}"), (200, DETAILS)]).await;
    let client = TimingAuthorityClient::new(base).with_retries(3, Duration::from_millis(10));

    let err = client.event_details("ootr/foo-bar-1").await.unwrap_err();
    assert_eq!(err.error_code(), "NETWORK");
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn retries_stop_after_the_configured_attempts() {
    let (base, hits) = spawn_authority(vec![(500, "{}"); 3]).await;
    let client = TimingAuthorityClient::new(base).with_retries(3, Duration::from_millis(10));

    let err = client.event_details("ootr/foo-bar-1").await.unwrap_err();
    assert_eq!(err.error_code(), "NETWORK");
    assert_eq!(hits.load(Ordering::SeqCst), 3);
}
