use crate::api::routes;
use crate::db::Database;
use crate::errors::Error;
use std::net::SocketAddr;
use tracing::info;

/// Starts and runs the HTTP server using Axum web framework
///
/// # Arguments
/// * `database` - Task store shared with the handlers
/// * `port` - Port number to listen on for incoming HTTP connections
///
/// # Returns
/// * `Result<(), Error>` - Ok once the server stops, Error if it cannot bind or serve
///
/// # Example
/// ```ignore
/// let database = Database::new("data/tasks.db")?;
/// launch_server(database, 8080).await?;
/// ```
pub async fn launch_server(database: Database, port: u16) -> Result<(), Error> {
    let app = routes::app(database);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("API listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down API server");
        })
        .await?;
    Ok(())
}
