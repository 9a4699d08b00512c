//! Standalone OTLP NDJSON Service
//!
//! Runs as a standalone service that receives OTLP messages via HTTP (and
//! optionally gRPC) and writes them to rotating NDJSON files.

use anyhow::Context;
use otlp_ndjson_library::otlp::http::serve_http;
use otlp_ndjson_library::otlp::{OtlpGrpcServer, OtlpHttpState, otlp_http_router};
use otlp_ndjson_library::{ConfigLoader, OtlpLibrary};
use std::net::SocketAddr;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .json()
        .init();

    // Defaults, then OTLP_CONFIG_FILE, then OTLP_* overrides
    let config = ConfigLoader::load(None).context("Failed to load configuration")?;

    let library = OtlpLibrary::new(config.clone()).await?;
    let cancel = library.cancellation_token();
    let bind_address = &config.protocols.bind_address;

    let http_handle = if config.protocols.http_enabled {
        let http_addr: SocketAddr = format!("{}:{}", bind_address, config.protocols.http_port)
            .parse()
            .with_context(|| format!("Invalid HTTP port {}", config.protocols.http_port))?;

        let state = OtlpHttpState {
            pipeline: library.pipeline(),
            health: library.health(),
            cancel: cancel.clone(),
        };
        let router = otlp_http_router(state, config.protocols.max_body_bytes);
        let cancel = cancel.clone();

        Some(tokio::spawn(async move {
            if let Err(e) = serve_http(router, http_addr, cancel).await {
                error!("OTLP/HTTP server error: {}", e);
            }
        }))
    } else {
        info!("OTLP/HTTP server disabled");
        None
    };

    let grpc_handle = if config.protocols.grpc_enabled {
        let grpc_addr: SocketAddr = format!("{}:{}", bind_address, config.protocols.grpc_port)
            .parse()
            .with_context(|| format!("Invalid gRPC port {}", config.protocols.grpc_port))?;

        let grpc_server = OtlpGrpcServer::new(library.pipeline(), cancel.clone());

        Some(tokio::spawn(async move {
            if let Err(e) = grpc_server.start(grpc_addr).await {
                error!("OTLP/gRPC server error: {}", e);
            }
        }))
    } else {
        info!("OTLP/gRPC server disabled");
        None
    };

    info!(
        output_dir = %config.output_dir.display(),
        "OTLP NDJSON Service started, listening for OTLP messages"
    );

    tokio::signal::ctrl_c().await?;

    info!("Shutting down...");

    // Servers drain through the shared cancellation token
    library.shutdown().await?;

    for handle in [http_handle, grpc_handle].into_iter().flatten() {
        if let Err(e) = handle.await {
            error!("Server task failed to stop cleanly: {}", e);
        }
    }

    Ok(())
}
