use tracing_subscriber::EnvFilter;

pub const DEFAULT_FILTER: &str = "blogdesk_client=info,blogdesk_cli=info";

fn env_filter(rust_log: Option<String>) -> EnvFilter {
    match rust_log.filter(|directives| !directives.trim().is_empty()) {
        Some(directives) => EnvFilter::new(directives),
        None => EnvFilter::new(DEFAULT_FILTER),
    }
}

/// Installs a global tracing subscriber driven by `RUST_LOG`. Output is
/// compact and omits module targets, since it shares the terminal with
/// command output. Later calls are no-ops.
pub fn init_tracing() {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter(std::env::var("RUST_LOG").ok()))
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}
