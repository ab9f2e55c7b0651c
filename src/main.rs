use axum::routing::get;
use axum::Router;
use pong_server::config::ServerConfig;
use pong_server::game_loop::{run_game_loop, GameBroadcast, GameCommand};
use pong_server::ws::{ws_handler, AppState};
use std::sync::atomic::AtomicU32;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tower_http::cors::CorsLayer;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let config = ServerConfig::from_env();

    // Validate configuration before starting
    if let Err(e) = config.validate() {
        eprintln!("Invalid server configuration: {}", e);
        std::process::exit(1);
    }

    let listen_addr = config.listen_addr.clone();

    let (game_tx, game_rx) = mpsc::channel::<GameCommand>(config.command_buffer);
    let (broadcast_tx, _) = broadcast::channel::<GameBroadcast>(config.broadcast_buffer);

    // Spawn session engine
    let bc_tx = broadcast_tx.clone();
    let engine_tx = game_tx.clone();
    tokio::spawn(async move {
        run_game_loop(engine_tx, game_rx, bc_tx, config).await;
    });

    // Axum app
    let app_state = AppState {
        game_tx,
        broadcast_tx,
        next_client_id: Arc::new(AtomicU32::new(1)),
    };
    let app = Router::new()
        .route("/pong", get(ws_handler))
        .layer(CorsLayer::permissive())
        .with_state(app_state);

    tracing::info!("Starting pong server on {}", listen_addr);
    println!("Pong server listening on {}", listen_addr);

    let listener = tokio::net::TcpListener::bind(&listen_addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
