//! One-shot entry point for function-style deployments: each run builds a
//! fresh client, performs a single operation, and prints JSON to stdout.
//! Nothing is assumed to survive between invocations; on a warm container
//! the token cache simply starts empty again.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use moodify_search::config::Config;
use moodify_search::spotify::{SpotifyClient, DEFAULT_LIMIT};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = Config::from_env();
    let spotify = SpotifyClient::new(config.spotify_client_id, config.spotify_client_secret);

    let mut args = std::env::args().skip(1);
    let command = args.next().unwrap_or_else(|| "debug".into());

    match command.as_str() {
        "search" => {
            let q = args.next().unwrap_or_default();
            let limit = args
                .next()
                .and_then(|l| l.parse().ok())
                .unwrap_or(DEFAULT_LIMIT);
            let results = spotify.search(&q, limit).await?;
            println!("{}", serde_json::to_string(&results)?);
        }
        "debug" => {
            println!("{}", serde_json::to_string(&spotify.debug_status().await)?);
        }
        other => anyhow::bail!("unknown command '{}', expected 'search' or 'debug'", other),
    }

    Ok(())
}
