// End-to-end tests against a loopback ser2sock server
//
// Each test runs a tiny server on 127.0.0.1 that sends the banner, waits
// until the test has subscribed, then writes its script of lines.

use std::time::Duration;

use ad2sock::{Ad2Error, Client, ClientConfig, Message, TrackerConfig, ZoneTracker, ZoneTransition};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

const BANNER: &str = "!SER2SOCK Connected\r\n";
const FAULT_5: &str = "!KPM:[00000001100000003A--],005,[f70600051008001c28020000000000],\"FAULT 05 FRONT DOOR      \"\r\n";
const FAULT_9: &str = "!KPM:[00000001100000003A--],009,[f70600051008001c28020000000000],\"FAULT 09 KITCHEN WINDOW  \"\r\n";
const READY: &str = "!KPM:[10000001100000003A--],008,[f70600051008001c28020000000000],\" DISARMED CHIME   Ready to Arm  \"\r\n";

/// Start a server that greets with `banner`, then sends `lines` once
/// `go` fires and closes the connection.
async fn serve(
    banner: &'static str,
    lines: Vec<&'static str>,
) -> (u16, oneshot::Sender<()>, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (go_tx, go_rx) = oneshot::channel::<()>();

    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        socket.write_all(banner.as_bytes()).await.unwrap();
        if go_rx.await.is_err() {
            return;
        }
        for line in lines {
            socket.write_all(line.as_bytes()).await.unwrap();
        }
        socket.flush().await.unwrap();
    });

    (port, go_tx, handle)
}

fn config(port: u16) -> ClientConfig {
    ClientConfig::builder()
        .host("127.0.0.1")
        .port(port)
        .banner_timeout_ms(2000)
        .build()
}

#[tokio::test]
async fn test_connect_and_receive_keypad_lines() {
    let (port, go, server) = serve(BANNER, vec![FAULT_5, "garbage\r\n", READY]).await;

    let client = Client::connect(config(port)).await.unwrap();
    assert_eq!(client.banner(), "!SER2SOCK Connected");
    assert_eq!(client.peer(), Some(format!("127.0.0.1:{port}").as_str()));

    let mut sub = client.subscribe();
    go.send(()).unwrap();

    let first = sub.recv().await.unwrap();
    let keypad = first.as_keypad().unwrap();
    assert_eq!(keypad.zone(), 5);
    assert!(keypad.is_fault());
    assert_eq!(keypad.text, "FAULT 05 FRONT DOOR");

    let second = sub.recv().await.unwrap();
    match second.as_ref() {
        Message::Keypad(keypad) => {
            assert!(keypad.fields.ready());
            assert_eq!(keypad.text, "DISARMED CHIME   Ready to Arm");
        }
        other => panic!("unexpected message: {other:?}"),
    }

    // Server closes after its script.
    assert!(sub.recv().await.is_none());
    server.await.unwrap();

    tokio::time::timeout(Duration::from_secs(1), async {
        while !client.is_finished() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .unwrap();
    client.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_wrong_banner_is_rejected() {
    let (port, _go, _server) = serve("HTTP/1.1 400 Bad Request\r\n", vec![]).await;

    match Client::connect(config(port)).await {
        Err(Ad2Error::BannerMismatch { line }) => assert_eq!(line, "HTTP/1.1 400 Bad Request"),
        Err(e) => panic!("unexpected error: {e}"),
        Ok(_) => panic!("handshake should fail"),
    }
}

#[tokio::test]
async fn test_tracker_follows_live_connection() {
    let (port, go, server) = serve(BANNER, vec![FAULT_5, FAULT_9, FAULT_5, READY]).await;

    let client = Client::connect(config(port)).await.unwrap();
    let (tx, mut events) = mpsc::unbounded_channel();
    let restore_tx = tx.clone();
    let tracker = ZoneTracker::with_config(
        &client,
        TrackerConfig {
            fault_timeout_ms: 60_000,
            ..TrackerConfig::default()
        },
        move |zone| {
            let _ = tx.send(ZoneTransition::Fault(zone));
        },
        move |zone| {
            let _ = restore_tx.send(ZoneTransition::Restore(zone));
        },
    );
    go.send(()).unwrap();

    let mut seen = Vec::new();
    while seen.len() < 4 {
        let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .unwrap()
            .unwrap();
        seen.push(event);
    }
    tracker.wait_for_callbacks().await;
    server.await.unwrap();

    let faults = seen.iter().filter(|e| matches!(e, ZoneTransition::Fault(_))).count();
    assert_eq!(faults, 2, "zone 5 should fault once: {seen:?}");
    assert!(seen.contains(&ZoneTransition::Restore(5)));
    assert!(seen.contains(&ZoneTransition::Restore(9)));
    assert!(tracker.faulted_zones().is_empty());

    tracker.stop().await;
    client.shutdown().await.unwrap();
}
