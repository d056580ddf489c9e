use tracing_subscriber::EnvFilter;

/// `RUST_LOG` wins when set; otherwise info for this crate and the provider
/// client.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("archive_service=info,utility_client=info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
