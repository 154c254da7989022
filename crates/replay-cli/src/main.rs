mod ipc;
mod logging;
mod playlist_input;
mod server;

use std::collections::HashMap;
use std::fs;
use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use replay_core::{ConcurrencyPolicy, Flags, ReplayError};
use tracing::error;

#[derive(Parser)]
#[command(name = "replay", version, about = "Execute a declarative playlist of filesystem actions as a dependency graph")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Execute a playlist file.
    Run(RunArgs),
    /// Execute a playlist read from stdin as it streams in.
    Stream(RunArgs),
    /// Build the dependency graph and print it without executing anything.
    Analyze(RunArgs),
    /// Listen on a Unix domain socket for `RunPlaylist` requests.
    Serve {
        #[arg(long)]
        socket: PathBuf,
    },
    /// Send one playlist to a running server and print its response.
    Submit {
        #[arg(long)]
        socket: PathBuf,
        playlist: PathBuf,
        #[arg(long)]
        ndjson: bool,
    },
    /// Send one playlist to a running server as an incremental batch:
    /// `start-server`, one `queue-action-*` message per step, then
    /// `finish-and-wait`, instead of one `RunPlaylist` message.
    SubmitBatch {
        #[arg(long)]
        socket: PathBuf,
        playlist: PathBuf,
        #[arg(long)]
        ndjson: bool,
        #[arg(long, default_value = "batch")]
        name: String,
    },
}

#[derive(Args, Clone)]
struct RunArgs {
    /// Playlist file; omitted for `stream`, which reads stdin instead.
    playlist: Option<PathBuf>,
    /// `KEY=VALUE` pairs available for `${VAR}`/`$(VAR)` expansion.
    #[arg(long = "env", value_name = "KEY=VALUE")]
    env: Vec<String>,
    #[arg(long)]
    strict_env: bool,
    #[arg(long)]
    concurrent: bool,
    /// Max concurrent tasks when `--concurrent` is set; 0 means unbounded
    /// (in practice, the number of logical CPUs).
    #[arg(long, default_value_t = 0)]
    max_concurrency: usize,
    #[arg(long)]
    stop_on_error: bool,
    #[arg(long)]
    force: bool,
    #[arg(long)]
    dry_run: bool,
    #[arg(long)]
    no_ordered_output: bool,
    #[arg(long, short = 'v')]
    verbose: bool,
    /// Parse the playlist as newline-delimited JSON steps instead of a
    /// single JSON array.
    #[arg(long)]
    ndjson: bool,
}

impl RunArgs {
    fn parsed_env(&self) -> anyhow::Result<HashMap<String, String>> {
        let mut env: HashMap<String, String> = std::env::vars().collect();
        for pair in &self.env {
            let (k, v) = pair
                .split_once('=')
                .ok_or_else(|| anyhow::anyhow!("--env expects KEY=VALUE, got '{pair}'"))?;
            env.insert(k.to_string(), v.to_string());
        }
        Ok(env)
    }

    fn flags(&self) -> Flags {
        Flags {
            concurrent: self.concurrent,
            verbose: self.verbose,
            dry_run: self.dry_run,
            stop_on_error: self.stop_on_error,
            force: self.force,
            ordered_output: !self.no_ordered_output,
            analyze_dependencies_only: false,
        }
    }

    fn policy(&self) -> ConcurrencyPolicy {
        if self.concurrent {
            ConcurrencyPolicy::Concurrent { max: self.max_concurrency }
        } else {
            ConcurrencyPolicy::Serial
        }
    }

    fn read_text(&self) -> anyhow::Result<String> {
        match &self.playlist {
            Some(path) => Ok(fs::read_to_string(path)?),
            None => {
                let mut buf = String::new();
                std::io::stdin().read_to_string(&mut buf)?;
                Ok(buf)
            }
        }
    }
}

fn main() -> ExitCode {
    logging::init();
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            error!(error = %e, "replay failed");
            eprintln!("error: {e:#}");
            ExitCode::from(1)
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    match cli.command {
        Command::Run(args) | Command::Stream(args) => run_playlist(args),
        Command::Analyze(args) => analyze(args),
        Command::Serve { socket } => {
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(server::run(&socket))?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Submit { socket, playlist, ndjson } => submit(&socket, &playlist, ndjson),
        Command::SubmitBatch { socket, playlist, ndjson, name } => submit_batch(&socket, &playlist, ndjson, &name),
    }
}

fn run_playlist(args: RunArgs) -> anyhow::Result<ExitCode> {
    let text = args.read_text()?;
    let steps = playlist_input::parse_text(&text, args.ndjson)?;
    let env = args.parsed_env()?;
    let result = replay_core::run_playlist(steps, env, args.flags(), args.policy(), args.strict_env);
    Ok(exit_code_for(result))
}

fn analyze(args: RunArgs) -> anyhow::Result<ExitCode> {
    let text = args.read_text()?;
    let steps = playlist_input::parse_text(&text, args.ndjson)?;
    let env = args.parsed_env()?;
    match replay_core::analyze_playlist(steps, env, args.strict_env, args.force) {
        Ok(summary) => {
            println!("{} task(s), {} root(s)", summary.task_count, summary.root_count);
            for (id, desc) in summary.descriptions.iter().enumerate() {
                println!("  [{id}] {desc}");
            }
            for (producer, consumer) in &summary.edges {
                println!("  {producer} -> {consumer}");
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => Ok(exit_code_for(Err(e))),
    }
}

fn submit(socket: &PathBuf, playlist: &PathBuf, ndjson: bool) -> anyhow::Result<ExitCode> {
    use std::os::unix::net::UnixStream;

    let steps_json = fs::read_to_string(playlist)?;
    let request = ipc::ServerRequest::RunPlaylist {
        steps_json,
        ndjson,
        env: std::env::vars().collect(),
        strict_env: false,
        concurrent: true,
        max_concurrency: 0,
        stop_on_error: true,
        force: false,
        dry_run: false,
        ordered_output: true,
        verbose: false,
    };

    let mut stream = UnixStream::connect(socket)?;
    send_frame(&mut stream, &request, 0)?;
    exit_code_for_response(recv_final_response(&mut stream)?)
}

/// Same playlist as `submit`, but queued one step at a time through
/// `StartServer`/`QueueAction*`/`FinishAndWait` instead of one `RunPlaylist`
/// message — printing each intermediate `Heartbeat` the server pushes while
/// the batch runs.
fn submit_batch(socket: &PathBuf, playlist: &PathBuf, ndjson: bool, name: &str) -> anyhow::Result<ExitCode> {
    use std::os::unix::net::UnixStream;

    let text = fs::read_to_string(playlist)?;
    let step_values: Vec<serde_json::Value> = if ndjson {
        text.lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(serde_json::from_str)
            .collect::<Result<_, _>>()?
    } else {
        serde_json::from_str(&text)?
    };

    let mut stream = UnixStream::connect(socket)?;
    let mut seq = 0u32;

    send_frame(
        &mut stream,
        &ipc::ServerRequest::StartServer {
            batch_name: name.to_string(),
            env: std::env::vars().collect(),
            strict_env: false,
            concurrent: true,
            max_concurrency: 0,
            stop_on_error: true,
            force: false,
            dry_run: false,
            ordered_output: true,
            verbose: false,
        },
        seq,
    )?;
    seq += 1;
    expect_ok(recv_response(&mut stream)?)?;

    for value in &step_values {
        let step_json = serde_json::to_string(value)?;
        send_frame(&mut stream, &ipc::ServerRequest::QueueActionDictionary { step_json }, seq)?;
        seq += 1;
        expect_ok(recv_response(&mut stream)?)?;
    }

    send_frame(&mut stream, &ipc::ServerRequest::FinishAndWait, seq)?;
    exit_code_for_response(recv_final_response(&mut stream)?)
}

fn expect_ok(response: ipc::ServerResponse) -> anyhow::Result<()> {
    match response {
        ipc::ServerResponse::Ok => Ok(()),
        ipc::ServerResponse::Error(msg) => Err(anyhow::anyhow!("server rejected request: {msg}")),
        other => Err(anyhow::anyhow!("unexpected response: {other:?}")),
    }
}

fn send_frame(stream: &mut std::os::unix::net::UnixStream, request: &ipc::ServerRequest, seq_id: u32) -> anyhow::Result<()> {
    use std::io::Write as _;

    let payload = bincode::serialize(request)?;
    let header = ipc::FrameHeader::new(ipc::FrameType::Request, payload.len() as u32, seq_id);
    stream.write_all(&header.to_bytes())?;
    stream.write_all(&payload)?;
    Ok(())
}

fn recv_response(stream: &mut std::os::unix::net::UnixStream) -> anyhow::Result<ipc::ServerResponse> {
    use std::io::Read as _;

    let mut header_buf = [0u8; ipc::FrameHeader::SIZE];
    stream.read_exact(&mut header_buf)?;
    let header = ipc::FrameHeader::from_bytes(header_buf)
        .ok_or_else(|| anyhow::anyhow!("bad frame magic in response"))?;
    let mut payload = vec![0u8; header.length as usize];
    stream.read_exact(&mut payload)?;
    Ok(bincode::deserialize(&payload)?)
}

/// Reads responses until a terminal one (`Ok`/`Error`/`Pong`) arrives,
/// printing any `Heartbeat`s along the way and treating an early `Exiting`
/// as the server closing the batch out from under us.
fn recv_final_response(stream: &mut std::os::unix::net::UnixStream) -> anyhow::Result<ipc::ServerResponse> {
    loop {
        match recv_response(stream)? {
            ipc::ServerResponse::Heartbeat => eprintln!("(server still running...)"),
            ipc::ServerResponse::Exiting => anyhow::bail!("server is shutting down"),
            terminal => return Ok(terminal),
        }
    }
}

fn exit_code_for_response(response: ipc::ServerResponse) -> anyhow::Result<ExitCode> {
    match response {
        ipc::ServerResponse::Ok | ipc::ServerResponse::Pong => Ok(ExitCode::SUCCESS),
        ipc::ServerResponse::Error(msg) => {
            eprintln!("error: {msg}");
            Ok(ExitCode::from(3))
        }
        other => anyhow::bail!("unexpected terminal response: {other:?}"),
    }
}

fn exit_code_for(result: replay_core::Result<()>) -> ExitCode {
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "playlist failed");
            eprintln!("error: {e}");
            match e {
                ReplayError::MalformedInput(_)
                | ReplayError::UnbalancedCardinality { .. }
                | ReplayError::UnexpandableVariable(_)
                | ReplayError::Json(_) => ExitCode::from(2),
                ReplayError::DuplicateProducer(_)
                | ReplayError::ExclusiveInputViolation(_)
                | ReplayError::CyclicDependency(_) => ExitCode::from(3),
                ReplayError::Io(_) | ReplayError::Cancellation(_) => ExitCode::from(4),
            }
        }
    }
}
