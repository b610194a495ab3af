use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use ppid_core::ipc::{OperatorCommand, OperatorEvent, OperatorResponse};
use serde::Serialize;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixListener;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};

use crate::app::App;
use crate::router;

type FrameWriter = FramedWrite<OwnedWriteHalf, LengthDelimitedCodec>;

async fn send_frame<T: Serialize>(write: &mut FrameWriter, value: &T) -> bool {
    match rmp_serde::to_vec_named(value) {
        Ok(bytes) => match write.send(Bytes::from(bytes)).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("Failed to send frame: {}", e);
                false
            }
        },
        Err(e) => {
            tracing::error!("Failed to serialize frame: {}", e);
            false
        }
    }
}

pub async fn run_unix_server(
    socket_path: &Path,
    app: Arc<App>,
    mut shutdown: broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    if socket_path.exists() {
        std::fs::remove_file(socket_path)?;
    }

    let listener = UnixListener::bind(socket_path)?;
    tracing::info!("IPC Server listening on {}", socket_path.display());

    loop {
        tokio::select! {
            res = listener.accept() => {
                let (stream, _) = res?;
                let app = app.clone();
                let mut conn_shutdown = shutdown.resubscribe();
                tokio::spawn(async move {
                    let (read, write) = stream.into_split();
                    // 4-byte little-endian length prefix + MessagePack payload
                    let le_codec = || LengthDelimitedCodec::builder().little_endian().new_codec();
                    let mut framed_read = FramedRead::new(read, le_codec());
                    let mut framed_write = FramedWrite::new(write, le_codec());

                    while let Some(frame) = framed_read.next().await {
                        let bytes_mut = match frame {
                            Ok(b) => b,
                            Err(e) => {
                                tracing::error!("Frame error: {}", e);
                                break;
                            }
                        };

                        let command: OperatorCommand = match rmp_serde::from_slice(&bytes_mut) {
                            Ok(cmd) => cmd,
                            Err(e) => {
                                let resp = OperatorResponse::err(format!("Deserialization error: {}", e));
                                if !send_frame(&mut framed_write, &resp).await {
                                    break;
                                }
                                continue;
                            }
                        };

                        if matches!(command, OperatorCommand::Subscribe) {
                            // Register before acking so no event after the ack is missed
                            let events = app.subscribe();
                            let ack = OperatorResponse::ok(serde_json::json!({ "subscribed": true }));
                            if send_frame(&mut framed_write, &ack).await {
                                stream_events(events, &mut framed_read, &mut framed_write, &mut conn_shutdown).await;
                            }
                            break;
                        }

                        let response = router::handle_command(command, &app).await;
                        if !send_frame(&mut framed_write, &response).await {
                            break;
                        }
                    }
                });
            }
            _ = shutdown.recv() => {
                tracing::info!("Shutting down IPC server...");
                break;
            }
        }
    }

    if socket_path.exists() {
        std::fs::remove_file(socket_path)?;
    }

    Ok(())
}

/// Push every operator event to this connection until the console hangs
/// up or the server stops.
async fn stream_events(
    mut events: broadcast::Receiver<OperatorEvent>,
    framed_read: &mut FramedRead<OwnedReadHalf, LengthDelimitedCodec>,
    framed_write: &mut FrameWriter,
    shutdown: &mut broadcast::Receiver<()>,
) {
    tracing::info!("Operator console subscribed");

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    if !send_frame(framed_write, &event).await {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Operator console lagging, events dropped");
                }
                Err(RecvError::Closed) => break,
            },
            frame = framed_read.next() => {
                // Anything but more frames means the console went away
                if !matches!(frame, Some(Ok(_))) {
                    break;
                }
            }
            _ = shutdown.recv() => break,
        }
    }
    tracing::info!("Operator console unsubscribed");
}
