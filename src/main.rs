//! burnbox - entry point for the relay daemon.

use burnbox::App;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!("Starting burnbox");

    if let Err(e) = App::run().await {
        tracing::error!("Application error: {e:#}");
        std::process::exit(1);
    }
}
