//! Logging init, gated by `REPLAY_LOG` with a per-crate default directive
//! so a plain `RUST_LOG`-free invocation still gets `replay_core=info`.

use tracing_subscriber::EnvFilter;

pub fn init() {
    let filter = EnvFilter::try_from_env("REPLAY_LOG")
        .unwrap_or_else(|_| EnvFilter::new("replay_core=info,replay_cli=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
