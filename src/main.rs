use tfepatch::{init_logging, serve_with_options, ProviderError, ServeOptions, TfeProvider};
use tracing::{error, info};

async fn run() -> Result<(), ProviderError> {
    let options = ServeOptions::from_env()?;
    info!(address = %options.provider_address, "Starting tfepatch provider");

    let provider = TfeProvider::new()?;
    serve_with_options(provider, options).await
}

#[tokio::main]
async fn main() {
    init_logging();

    if let Err(e) = run().await {
        error!(error = %e, "Provider exited with error");
        std::process::exit(1);
    }
}
