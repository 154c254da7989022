//! Unix domain socket server mode: each connection is a sequence of
//! length-prefixed, bincode-encoded requests, handled one at a time per
//! connection (concurrency, if requested, happens inside a single
//! playlist's own graph scheduling — not across connections). A
//! connection may additionally open one incremental batch at a time via
//! `StartServer`/`QueueActionDictionary`/`QueueActionLine`/`FinishAndWait`,
//! queuing steps across several messages before running them as a unit.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use replay_core::StepDescriptor;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::ipc::{FrameHeader, FrameType, ServerRequest, ServerResponse};
use crate::playlist_input;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

/// An open incremental batch on one connection, accumulating steps across
/// `QueueAction*` messages until `FinishAndWait`.
struct Batch {
    #[allow(dead_code)]
    name: String,
    env: HashMap<String, String>,
    strict_env: bool,
    concurrent: bool,
    max_concurrency: usize,
    stop_on_error: bool,
    force: bool,
    dry_run: bool,
    ordered_output: bool,
    verbose: bool,
    steps: Vec<StepDescriptor>,
}

pub async fn run(socket_path: &Path) -> anyhow::Result<()> {
    if socket_path.exists() {
        std::fs::remove_file(socket_path)?;
    }
    let listener = UnixListener::bind(socket_path)?;
    info!(socket = %socket_path.display(), "replay server listening");

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    {
        let shutdown_tx = shutdown_tx.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutdown signal received, notifying connections");
                let _ = shutdown_tx.send(());
            }
        });
    }

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, _addr)) => {
                        let shutdown_rx = shutdown_tx.subscribe();
                        tokio::spawn(async move {
                            if let Err(e) = handle_client(stream, shutdown_rx).await {
                                warn!(error = %e, "client handler error");
                            }
                        });
                    }
                    Err(e) => error!(error = %e, "accept failed"),
                }
            }
            _ = shutdown_tx.subscribe().recv() => {
                info!("server shutting down");
                return Ok(());
            }
        }
    }
}

async fn handle_client(mut stream: UnixStream, mut shutdown_rx: broadcast::Receiver<()>) -> anyhow::Result<()> {
    debug!("client connected");
    let seq = AtomicU32::new(0);
    let mut batch: Option<Batch> = None;

    loop {
        let mut header_buf = [0u8; FrameHeader::SIZE];
        tokio::select! {
            read = stream.read_exact(&mut header_buf) => {
                match read {
                    Ok(_) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                        debug!("client disconnected");
                        return Ok(());
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            _ = shutdown_rx.recv() => {
                send(&mut stream, ServerResponse::Exiting, seq.fetch_add(1, Ordering::Relaxed)).await?;
                return Ok(());
            }
        }

        let header = FrameHeader::from_bytes(header_buf).ok_or_else(|| anyhow::anyhow!("bad frame magic"))?;
        if header.frame_type() != Some(FrameType::Request) {
            anyhow::bail!("expected a request frame");
        }
        if header.length as usize > FrameHeader::MAX_LENGTH {
            anyhow::bail!("frame too large: {} bytes", header.length);
        }

        let mut payload = vec![0u8; header.length as usize];
        stream.read_exact(&mut payload).await?;

        let request: ServerRequest = match bincode::deserialize(&payload) {
            Ok(r) => r,
            Err(e) => {
                send(&mut stream, ServerResponse::Error(format!("decode error: {e}")), seq.fetch_add(1, Ordering::Relaxed)).await?;
                continue;
            }
        };

        if matches!(request, ServerRequest::FinishAndWait) {
            let Some(open) = batch.take() else {
                send(&mut stream, ServerResponse::Error("finish-and-wait with no open batch".into()), seq.fetch_add(1, Ordering::Relaxed)).await?;
                continue;
            };
            let response = run_batch_with_heartbeats(&mut stream, &seq, open).await?;
            send(&mut stream, response, seq.fetch_add(1, Ordering::Relaxed)).await?;
            continue;
        }

        let response = handle_request(request, &mut batch).await;
        send(&mut stream, response, seq.fetch_add(1, Ordering::Relaxed)).await?;
    }
}

/// Runs a finished batch to completion, pushing periodic `Heartbeat`
/// frames on the same connection while the blocking run is in progress.
async fn run_batch_with_heartbeats(stream: &mut UnixStream, seq: &AtomicU32, open: Batch) -> anyhow::Result<ServerResponse> {
    let run = tokio::task::spawn_blocking(move || {
        let flags = replay_core::Flags {
            concurrent: open.concurrent,
            verbose: open.verbose,
            dry_run: open.dry_run,
            stop_on_error: open.stop_on_error,
            force: open.force,
            ordered_output: open.ordered_output,
            analyze_dependencies_only: false,
        };
        let policy = if open.concurrent {
            replay_core::ConcurrencyPolicy::Concurrent { max: open.max_concurrency }
        } else {
            replay_core::ConcurrencyPolicy::Serial
        };
        replay_core::run_playlist(open.steps, open.env, flags, policy, open.strict_env)
    });
    tokio::pin!(run);

    loop {
        tokio::select! {
            outcome = &mut run => {
                return Ok(match outcome {
                    Ok(Ok(())) => ServerResponse::Ok,
                    Ok(Err(e)) => ServerResponse::Error(e.to_string()),
                    Err(join_err) => ServerResponse::Error(join_err.to_string()),
                });
            }
            _ = tokio::time::sleep(HEARTBEAT_INTERVAL) => {
                send(stream, ServerResponse::Heartbeat, seq.fetch_add(1, Ordering::Relaxed)).await?;
            }
        }
    }
}

async fn handle_request(request: ServerRequest, batch: &mut Option<Batch>) -> ServerResponse {
    match request {
        ServerRequest::Ping => ServerResponse::Pong,
        ServerRequest::FinishAndWait => unreachable!("handled by the caller before dispatch"),

        ServerRequest::StartServer {
            batch_name,
            env,
            strict_env,
            concurrent,
            max_concurrency,
            stop_on_error,
            force,
            dry_run,
            ordered_output,
            verbose,
        } => {
            *batch = Some(Batch {
                name: batch_name,
                env,
                strict_env,
                concurrent,
                max_concurrency,
                stop_on_error,
                force,
                dry_run,
                ordered_output,
                verbose,
                steps: Vec::new(),
            });
            ServerResponse::Ok
        }

        ServerRequest::QueueActionDictionary { step_json } => match batch.as_mut() {
            None => ServerResponse::Error("queue-action-dictionary with no open batch".into()),
            Some(open) => match replay_core::ingress::read_single_step(&step_json) {
                Ok(step) => {
                    open.steps.push(step);
                    ServerResponse::Ok
                }
                Err(e) => ServerResponse::Error(e.to_string()),
            },
        },

        ServerRequest::QueueActionLine { line } => match batch.as_mut() {
            None => ServerResponse::Error("queue-action-line with no open batch".into()),
            Some(open) => match replay_core::ingress::read_single_step(&line) {
                Ok(step) => {
                    open.steps.push(step);
                    ServerResponse::Ok
                }
                Err(e) => ServerResponse::Error(e.to_string()),
            },
        },

        ServerRequest::RunPlaylist {
            steps_json,
            ndjson,
            env,
            strict_env,
            concurrent,
            max_concurrency,
            stop_on_error,
            force,
            dry_run,
            ordered_output,
            verbose,
        } => {
            let outcome = tokio::task::spawn_blocking(move || {
                let steps = playlist_input::parse_text(&steps_json, ndjson)?;
                let flags = replay_core::Flags {
                    concurrent,
                    verbose,
                    dry_run,
                    stop_on_error,
                    force,
                    ordered_output,
                    analyze_dependencies_only: false,
                };
                let policy = if concurrent {
                    replay_core::ConcurrencyPolicy::Concurrent { max: max_concurrency }
                } else {
                    replay_core::ConcurrencyPolicy::Serial
                };
                replay_core::run_playlist(steps, env, flags, policy, strict_env)
            })
            .await;

            match outcome {
                Ok(Ok(())) => ServerResponse::Ok,
                Ok(Err(e)) => ServerResponse::Error(e.to_string()),
                Err(join_err) => ServerResponse::Error(join_err.to_string()),
            }
        }
    }
}

async fn send(stream: &mut UnixStream, response: ServerResponse, seq_id: u32) -> anyhow::Result<()> {
    let payload = bincode::serialize(&response)?;
    let header = FrameHeader::new(FrameType::Response, payload.len() as u32, seq_id);
    stream.write_all(&header.to_bytes()).await?;
    stream.write_all(&payload).await?;
    Ok(())
}
