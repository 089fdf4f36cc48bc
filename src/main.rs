//! Chat relay binary
//!
//! Loads configuration from the environment (a `.env` file is honored),
//! initializes logging, and runs the relay until ctrl-c.

use chat_relay_rs::{HttpObjectStorage, RelayServer, ServerConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("chat_relay_rs=info".parse()?),
        )
        .init();

    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let storage =
        HttpObjectStorage::new(config.storage_url.clone(), config.storage_secret.clone());
    let server = RelayServer::new(config, storage);

    server
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    Ok(())
}
