//! Console socket: framed MessagePack request/response and event streaming.

mod common;

use std::time::Duration;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use ppid_core::ipc::{OperatorCommand, OperatorEvent, OperatorResponse};
use ppid_server::server::run_unix_server;
use tokio::net::UnixStream;
use tokio::sync::broadcast;
use tokio_util::codec::{Framed, LengthDelimitedCodec};

use common::harness;

type Client = Framed<UnixStream, LengthDelimitedCodec>;

async fn connect(path: &std::path::Path) -> Client {
    for _ in 0..200 {
        if let Ok(stream) = UnixStream::connect(path).await {
            let codec = LengthDelimitedCodec::builder().little_endian().new_codec();
            return Framed::new(stream, codec);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("socket never came up at {}", path.display());
}

async fn request(client: &mut Client, command: &OperatorCommand) -> OperatorResponse {
    let bytes = rmp_serde::to_vec_named(command).unwrap();
    client.send(Bytes::from(bytes)).await.unwrap();
    let frame = client.next().await.unwrap().unwrap();
    rmp_serde::from_slice(&frame).unwrap()
}

// ===========================================================================
// TEST 1: request/response over the socket, clean shutdown
// ===========================================================================
#[tokio::test]
async fn test_socket_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(dir.path(), "x").await;
    let socket = dir.path().join("console.sock");
    let (shutdown_tx, _) = broadcast::channel(1);

    let server = tokio::spawn(run_unix_server_owned(
        socket.clone(),
        h.app.clone(),
        shutdown_tx.subscribe(),
    ));

    let mut client = connect(&socket).await;
    let pong = request(&mut client, &OperatorCommand::Ping).await;
    assert!(pong.is_ok());

    let status = request(&mut client, &OperatorCommand::Status).await;
    assert_eq!(status.data.unwrap()["running"], true);

    // Garbage frame gets an error reply, the connection survives
    client.send(Bytes::from_static(b"\xc1")).await.unwrap();
    let frame = client.next().await.unwrap().unwrap();
    let resp: OperatorResponse = rmp_serde::from_slice(&frame).unwrap();
    assert!(resp.error.unwrap().starts_with("Deserialization error"));

    shutdown_tx.send(()).unwrap();
    server.await.unwrap().unwrap();
    assert!(!socket.exists(), "socket file removed on shutdown");
}

// ===========================================================================
// TEST 2: subscribe acknowledges, then streams events
// ===========================================================================
#[tokio::test]
async fn test_subscribe_streams_events() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(dir.path(), "x").await;
    let socket = dir.path().join("console.sock");
    let (shutdown_tx, _) = broadcast::channel(1);

    tokio::spawn(run_unix_server_owned(
        socket.clone(),
        h.app.clone(),
        shutdown_tx.subscribe(),
    ));

    let mut client = connect(&socket).await;
    let ack = request(&mut client, &OperatorCommand::Subscribe).await;
    assert_eq!(ack.data.unwrap()["subscribed"], true);

    // The subscription is registered before the ack is written
    h.app.emit(OperatorEvent::Error {
        message: "Gagal mengirim pesan".into(),
    });

    let frame = tokio::time::timeout(Duration::from_secs(2), client.next())
        .await
        .expect("event arrives")
        .unwrap()
        .unwrap();
    let event: OperatorEvent = rmp_serde::from_slice(&frame).unwrap();
    assert_eq!(
        event,
        OperatorEvent::Error {
            message: "Gagal mengirim pesan".into()
        }
    );

    shutdown_tx.send(()).unwrap();
}

async fn run_unix_server_owned(
    path: std::path::PathBuf,
    app: std::sync::Arc<ppid_server::App>,
    shutdown: broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    run_unix_server(&path, app, shutdown).await
}
