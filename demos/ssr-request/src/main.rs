//! SSR request binary
//!
//! Renders one request path through a fresh server store and prints the
//! document, preloaded state included.

use isostate_core::StoreConfig;
use isostate_runtime::HostEnvironment;
use ssr_request::{handle_request, server_factory};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ssr_request=info,isostate_runtime=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = StoreConfig::from_env();
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| config.default_path.clone());

    // a request handler is always a server, whatever the host override says
    let factory = server_factory(HostEnvironment::server(config.profile))
        .with_default_path(config.default_path.clone());

    let html = handle_request(&factory, &path, config.settle_timeout).await?;
    println!("{html}");

    Ok(())
}
