use tracing_subscriber::EnvFilter;

pub fn init() {
    let filter = EnvFilter::try_from_env("FINGERPRINT_LOG")
        .unwrap_or_else(|_| EnvFilter::new("fingerprint_core=info,fingerprint_cli=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
