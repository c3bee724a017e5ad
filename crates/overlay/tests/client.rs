use codemap_overlay::{OverlayClient, OverlayError};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Serves exactly one HTTP request with a canned response, then exits.
async fn one_shot_http(status_line: &'static str, body: &'static str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 4096];
        // Drain the request headers; the tests only issue bodyless GETs.
        let _ = stream.read(&mut buf).await;
        let response = format!(
            "{status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        stream.write_all(response.as_bytes()).await.unwrap();
        stream.shutdown().await.ok();
    });

    format!("http://{addr}")
}

#[tokio::test]
async fn unconfigured_client_returns_empty_without_error() {
    let client = OverlayClient::new(None);
    assert!(!client.available());

    let agents = client.list_agents().await.unwrap();
    assert!(agents.is_empty());

    let reservations = client.list_reservations("proj").await.unwrap();
    assert!(reservations.is_empty());
}

#[tokio::test]
async fn list_agents_decodes_records() {
    let url = one_shot_http(
        "HTTP/1.1 200 OK",
        r#"[{"agent_id":"a1","name":"scout","project":"proj-a","status":"active","session_id":"s1"}]"#,
    )
    .await;

    let client = OverlayClient::new(Some(url));
    let agents = client.list_agents().await.unwrap();
    assert_eq!(agents.len(), 1);
    assert_eq!(agents[0].agent_id, "a1");
    assert_eq!(agents[0].project, "proj-a");
    assert_eq!(agents[0].session_id.as_deref(), Some("s1"));
    assert!(agents[0].last_seen.is_none());
}

#[tokio::test]
async fn list_reservations_decodes_records() {
    let url = one_shot_http(
        "HTTP/1.1 200 OK",
        r#"[{"id":"r1","agent_id":"a1","pattern":"src/**","reason":"edit","project":"proj-a","is_active":true}]"#,
    )
    .await;

    let client = OverlayClient::new(Some(url));
    let reservations = client.list_reservations("proj-a").await.unwrap();
    assert_eq!(reservations.len(), 1);
    assert_eq!(reservations[0].pattern, "src/**");
    assert!(reservations[0].is_active);
}

#[tokio::test]
async fn non_200_is_an_error() {
    let url = one_shot_http("HTTP/1.1 500 Internal Server Error", "{}").await;

    let client = OverlayClient::new(Some(url));
    let err = client.list_agents().await.unwrap_err();
    match err {
        OverlayError::Status { status, .. } => assert_eq!(status, 500),
        other => panic!("expected status error, got {other}"),
    }
}

#[tokio::test]
async fn non_200_success_codes_are_errors_too() {
    // Only 200 counts as success; a 201 must not have its body decoded.
    let url = one_shot_http("HTTP/1.1 201 Created", "[]").await;

    let client = OverlayClient::new(Some(url));
    let err = client.list_agents().await.unwrap_err();
    match err {
        OverlayError::Status { status, .. } => assert_eq!(status, 201),
        other => panic!("expected status error, got {other}"),
    }
}

#[tokio::test]
async fn decode_failure_is_an_error() {
    let url = one_shot_http("HTTP/1.1 200 OK", "not json").await;

    let client = OverlayClient::new(Some(url));
    let err = client.list_agents().await.unwrap_err();
    assert!(matches!(err, OverlayError::Http { .. }));
}

#[tokio::test]
async fn connection_failure_is_an_error() {
    // Bind-then-drop guarantees a port with no listener.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = OverlayClient::new(Some(format!("http://{addr}")));
    assert!(client.list_agents().await.is_err());
}
