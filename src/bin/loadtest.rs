//! Load test for the pong server.
//!
//! Spawns fake WebSocket clients that:
//! - Connect to the server and signal ready
//! - Pair up with each other into rooms
//! - Send their paddle to random positions at a fixed rate
//! - Receive and count game state broadcasts and relayed paddle moves
//!
//! Spawn an even number of clients or the last one never leaves the queue.
//!
//! Usage: cargo run --bin loadtest -- [OPTIONS]
//!
//! Options:
//!   --clients N      Number of clients to spawn (default: 100)
//!   --duration S     Test duration in seconds (default: 30)
//!   --paddle-rate R  Paddle updates per second per client (default: 20)
//!   --url URL        Server URL (default: ws://127.0.0.1:3000/pong)

use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_tungstenite::{connect_async, tungstenite::Message};

// === Protocol types (minimal subset) ===

#[derive(Serialize)]
struct ReadyMsg {
    #[serde(rename = "type")]
    msg_type: &'static str,
}

#[derive(Serialize)]
struct PaddleMoveMsg {
    #[serde(rename = "type")]
    msg_type: &'static str,
    #[serde(rename = "xPosition")]
    x_position: f64,
    #[serde(rename = "playerIndex")]
    player_index: usize,
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum ServerMsg {
    #[serde(rename = "playerAssigned")]
    PlayerAssigned {
        #[serde(rename = "playerIndex")]
        player_index: usize,
    },
    #[serde(rename = "startGame")]
    StartGame {
        #[serde(rename = "refereeId")]
        referee_id: u32,
    },
    #[serde(rename = "gameState")]
    GameState { score: [u32; 2] },
    #[serde(rename = "paddleMove")]
    PaddleMove {},
    #[serde(rename = "roomClosed")]
    RoomClosed {},
}

// === Metrics ===

struct Metrics {
    connected: AtomicU64,
    messages_received: AtomicU64,
    matches_started: AtomicU64,
    never_paired: AtomicU64,
    game_states_received: AtomicU64,
    paddle_relays_received: AtomicU64,
    paddle_moves_sent: AtomicU64,
    goals_seen: AtomicU64,
    errors: AtomicU64,
    latency_sum_ms: AtomicU64,
    latency_count: AtomicU64,
}

impl Metrics {
    fn new() -> Self {
        Self {
            connected: AtomicU64::new(0),
            messages_received: AtomicU64::new(0),
            matches_started: AtomicU64::new(0),
            never_paired: AtomicU64::new(0),
            game_states_received: AtomicU64::new(0),
            paddle_relays_received: AtomicU64::new(0),
            paddle_moves_sent: AtomicU64::new(0),
            goals_seen: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            latency_sum_ms: AtomicU64::new(0),
            latency_count: AtomicU64::new(0),
        }
    }
}

// === Client task ===

async fn run_client(
    client_id: u32,
    url: String,
    paddle_rate: f64,
    duration: Duration,
    metrics: Arc<Metrics>,
) {
    let connect_start = Instant::now();

    let ws_result = connect_async(&url).await;
    let (mut ws, _) = match ws_result {
        Ok(conn) => {
            if client_id < 3 {
                eprintln!("Client {} connected", client_id);
            }
            conn
        }
        Err(e) => {
            if client_id < 5 {
                eprintln!("Client {} failed to connect: {}", client_id, e);
            }
            metrics.errors.fetch_add(1, Ordering::Relaxed);
            return;
        }
    };

    let connect_latency = connect_start.elapsed();
    metrics
        .latency_sum_ms
        .fetch_add(connect_latency.as_millis() as u64, Ordering::Relaxed);
    metrics.latency_count.fetch_add(1, Ordering::Relaxed);
    metrics.connected.fetch_add(1, Ordering::Relaxed);

    let ready = serde_json::to_string(&ReadyMsg { msg_type: "ready" }).unwrap();
    if ws.send(Message::Text(ready.into())).await.is_err() {
        metrics.errors.fetch_add(1, Ordering::Relaxed);
        metrics.connected.fetch_sub(1, Ordering::Relaxed);
        return;
    }

    // Wait for the seat assignment and the match start before paddling.
    let mut my_index: usize = 0;
    let start_wait = tokio::time::timeout(Duration::from_secs(10), async {
        while let Some(msg) = ws.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    metrics.messages_received.fetch_add(1, Ordering::Relaxed);
                    match serde_json::from_str::<ServerMsg>(&text) {
                        Ok(ServerMsg::PlayerAssigned { player_index }) => {
                            my_index = player_index;
                        }
                        Ok(ServerMsg::StartGame { .. }) => return true,
                        _ => {}
                    }
                }
                Ok(Message::Close(frame)) => {
                    if client_id < 3 {
                        eprintln!("Client {} closed before start: {:?}", client_id, frame);
                    }
                    return false;
                }
                Err(e) => {
                    if client_id < 3 {
                        eprintln!("Client {} error before start: {}", client_id, e);
                    }
                    return false;
                }
                _ => {}
            }
        }
        false
    })
    .await;

    match start_wait {
        Ok(true) => {
            metrics.matches_started.fetch_add(1, Ordering::Relaxed);
            if client_id < 3 {
                eprintln!("Client {} matched as player {}", client_id, my_index);
            }
        }
        Ok(false) => {
            metrics.errors.fetch_add(1, Ordering::Relaxed);
            metrics.connected.fetch_sub(1, Ordering::Relaxed);
            return;
        }
        Err(_) => {
            // The odd client out when the count is odd, or a slow partner.
            metrics.never_paired.fetch_add(1, Ordering::Relaxed);
            let _ = ws.close(None).await;
            metrics.connected.fetch_sub(1, Ordering::Relaxed);
            return;
        }
    }

    let paddle_interval = if paddle_rate > 0.0 {
        Duration::from_secs_f64(1.0 / paddle_rate)
    } else {
        Duration::from_secs(3600) // Effectively never
    };

    let mut paddle_timer = tokio::time::interval(paddle_interval);
    paddle_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let test_end = Instant::now() + duration;
    let mut rng_state: u64 = client_id as u64 * 12345 + 67890;
    let mut last_score: [u32; 2] = [0, 0];

    loop {
        if Instant::now() >= test_end {
            break;
        }

        tokio::select! {
            _ = paddle_timer.tick() => {
                // Simple LCG for random paddle positions
                rng_state = rng_state.wrapping_mul(6364136223846793005).wrapping_add(1);
                let paddle_x = ((rng_state >> 32) as f64 / u32::MAX as f64) * 450.0;

                let msg = PaddleMoveMsg {
                    msg_type: "paddleMove",
                    x_position: paddle_x,
                    player_index: my_index,
                };
                let json = serde_json::to_string(&msg).unwrap();
                if ws.send(Message::Text(json.into())).await.is_ok() {
                    metrics.paddle_moves_sent.fetch_add(1, Ordering::Relaxed);
                } else {
                    metrics.errors.fetch_add(1, Ordering::Relaxed);
                    break;
                }
            }

            msg = ws.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        metrics.messages_received.fetch_add(1, Ordering::Relaxed);
                        if let Ok(server_msg) = serde_json::from_str::<ServerMsg>(&text) {
                            match server_msg {
                                ServerMsg::GameState { score } => {
                                    metrics.game_states_received.fetch_add(1, Ordering::Relaxed);
                                    if score != last_score {
                                        metrics.goals_seen.fetch_add(1, Ordering::Relaxed);
                                        last_score = score;
                                    }
                                }
                                ServerMsg::PaddleMove {} => {
                                    metrics.paddle_relays_received.fetch_add(1, Ordering::Relaxed);
                                }
                                ServerMsg::RoomClosed {} => {
                                    if client_id < 3 {
                                        eprintln!("Client {} room closed", client_id);
                                    }
                                    break;
                                }
                                _ => {}
                            }
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        if client_id < 3 {
                            eprintln!("Client {} got Close: {:?}", client_id, frame);
                        }
                        break;
                    }
                    None => {
                        if client_id < 3 {
                            eprintln!("Client {} stream ended", client_id);
                        }
                        break;
                    }
                    Some(Err(e)) => {
                        if client_id < 3 {
                            eprintln!("Client {} error: {}", client_id, e);
                        }
                        metrics.errors.fetch_add(1, Ordering::Relaxed);
                        break;
                    }
                    Some(other) => {
                        if client_id < 3 {
                            eprintln!("Client {} got other message: {:?}", client_id, other);
                        }
                    }
                }
            }
        }
    }

    let _ = ws.close(None).await;
    metrics.connected.fetch_sub(1, Ordering::Relaxed);
}

// === Main ===

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().collect();

    let mut num_clients: u32 = 100;
    let mut duration_secs: u64 = 30;
    let mut paddle_rate: f64 = 20.0;
    let mut url = "ws://127.0.0.1:3000/pong".to_string();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--clients" => {
                i += 1;
                num_clients = args.get(i).and_then(|s| s.parse().ok()).unwrap_or(100);
            }
            "--duration" => {
                i += 1;
                duration_secs = args.get(i).and_then(|s| s.parse().ok()).unwrap_or(30);
            }
            "--paddle-rate" => {
                i += 1;
                paddle_rate = args.get(i).and_then(|s| s.parse().ok()).unwrap_or(20.0);
            }
            "--url" => {
                i += 1;
                url = args.get(i).cloned().unwrap_or(url);
            }
            _ => {}
        }
        i += 1;
    }

    println!("=== Pong Server Load Test ===");
    println!("Clients: {}", num_clients);
    println!("Duration: {}s", duration_secs);
    println!("Paddle rate: {}/s per client", paddle_rate);
    println!("URL: {}", url);
    println!();

    let metrics = Arc::new(Metrics::new());
    let duration = Duration::from_secs(duration_secs);

    // Spawn all clients
    let mut handles = Vec::with_capacity(num_clients as usize);

    println!("Spawning {} clients...", num_clients);
    let spawn_start = Instant::now();

    for client_id in 0..num_clients {
        let url = url.clone();
        let metrics = Arc::clone(&metrics);

        handles.push(tokio::spawn(async move {
            run_client(client_id, url, paddle_rate, duration, metrics).await;
        }));

        // Stagger spawns slightly to avoid thundering herd
        if client_id % 50 == 49 {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    println!("All clients spawned in {:?}", spawn_start.elapsed());
    println!();

    // Print stats periodically
    let metrics_clone = Arc::clone(&metrics);
    let stats_handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(5));
        let start = Instant::now();

        loop {
            interval.tick().await;
            let elapsed = start.elapsed().as_secs();
            if elapsed >= duration_secs + 5 {
                break;
            }

            let connected = metrics_clone.connected.load(Ordering::Relaxed);
            let msgs = metrics_clone.messages_received.load(Ordering::Relaxed);
            let states = metrics_clone.game_states_received.load(Ordering::Relaxed);
            let relays = metrics_clone.paddle_relays_received.load(Ordering::Relaxed);
            let sent = metrics_clone.paddle_moves_sent.load(Ordering::Relaxed);
            let goals = metrics_clone.goals_seen.load(Ordering::Relaxed);
            let errors = metrics_clone.errors.load(Ordering::Relaxed);

            println!(
                "[{:3}s] connected={}, msgs={}, game_states={}, relays={}, paddle_moves={}, goals={}, errors={}",
                elapsed, connected, msgs, states, relays, sent, goals, errors
            );
        }
    });

    // Wait for all clients to finish
    for handle in handles {
        let _ = handle.await;
    }

    stats_handle.abort();

    // Final stats
    println!();
    println!("=== Final Results ===");
    let msgs = metrics.messages_received.load(Ordering::Relaxed);
    let matches = metrics.matches_started.load(Ordering::Relaxed);
    let never_paired = metrics.never_paired.load(Ordering::Relaxed);
    let states = metrics.game_states_received.load(Ordering::Relaxed);
    let relays = metrics.paddle_relays_received.load(Ordering::Relaxed);
    let sent = metrics.paddle_moves_sent.load(Ordering::Relaxed);
    let goals = metrics.goals_seen.load(Ordering::Relaxed);
    let errors = metrics.errors.load(Ordering::Relaxed);
    let latency_sum = metrics.latency_sum_ms.load(Ordering::Relaxed);
    let latency_count = metrics.latency_count.load(Ordering::Relaxed);

    println!("Total messages received: {}", msgs);
    println!("Clients that got a match: {}", matches);
    println!("Clients never paired: {}", never_paired);
    println!("Total gameState messages: {}", states);
    println!("Total paddleMove relays: {}", relays);
    println!("Total paddleMove sent: {}", sent);
    println!("Total goals observed: {}", goals);
    println!("Total errors: {}", errors);

    if latency_count > 0 {
        println!("Average connect latency: {}ms", latency_sum / latency_count);
    }

    let msgs_per_sec = msgs as f64 / duration_secs as f64;
    println!();
    println!("Messages/sec (total): {:.0}", msgs_per_sec);

    if matches > 0 {
        let states_per_client = states as f64 / matches as f64;
        println!("Game states per matched client: {:.1}", states_per_client);
        println!(
            "Expected game states per client: {:.1}",
            duration_secs as f64 * 150.0
        ); // 150 Hz tick broadcast

        let delivery_rate = states_per_client / (duration_secs as f64 * 150.0) * 100.0;
        println!("Delivery rate: {:.1}%", delivery_rate);
    }
}
