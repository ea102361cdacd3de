use oci::OciProvider;
use tfplug::ServerConfig;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Stdout carries the plugin handshake, so logs go to stderr.
    let filter = EnvFilter::try_from_env("OCI_PROVIDER_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    tfplug::serve(OciProvider::new(), ServerConfig::default()).await?;

    Ok(())
}
