//! Prometheus-compatible metrics endpoint
//!
//! Default endpoint: http://localhost:9090/metrics
//! The same listener serves /health and /leaderboard?limit=N&offset=M (JSON).

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::Serialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::store::PlayerStore;

const TICK_HISTORY: usize = 1000;
const LEADERBOARD_DEFAULT_LIMIT: usize = 10;
const LEADERBOARD_MAX_LIMIT: usize = 100;

/// Process-wide counters
#[derive(Debug)]
pub struct Metrics {
    pub connections_active: AtomicU64,
    pub players_active: AtomicU64,
    pub spores_active: AtomicU64,

    pub messages_received: AtomicU64,
    pub messages_sent: AtomicU64,
    /// Outbound messages shed because a queue was full
    pub messages_dropped: AtomicU64,
    pub broadcasts: AtomicU64,

    pub claims_accepted: AtomicU64,
    pub claims_rejected: AtomicU64,

    /// Movement ticks across all players
    pub tick_count: AtomicU64,
    pub tick_time_p99_us: AtomicU64,

    start_time: Instant,
    tick_history: RwLock<VecDeque<u64>>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            connections_active: AtomicU64::new(0),
            players_active: AtomicU64::new(0),
            spores_active: AtomicU64::new(0),
            messages_received: AtomicU64::new(0),
            messages_sent: AtomicU64::new(0),
            messages_dropped: AtomicU64::new(0),
            broadcasts: AtomicU64::new(0),
            claims_accepted: AtomicU64::new(0),
            claims_rejected: AtomicU64::new(0),
            tick_count: AtomicU64::new(0),
            tick_time_p99_us: AtomicU64::new(0),
            start_time: Instant::now(),
            tick_history: RwLock::new(VecDeque::with_capacity(TICK_HISTORY)),
        }
    }

    #[inline]
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn decr(counter: &AtomicU64) {
        // Saturates at zero
        let _ = counter.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| v.checked_sub(1));
    }

    /// Record how long one movement tick took
    pub fn record_tick_time(&self, duration: Duration) {
        let us = duration.as_micros() as u64;
        self.tick_count.fetch_add(1, Ordering::Relaxed);

        let mut history = self.tick_history.write();
        history.push_back(us);
        while history.len() > TICK_HISTORY {
            history.pop_front();
        }

        if history.len() >= 10 {
            let mut sorted: Vec<u64> = history.iter().copied().collect();
            sorted.sort_unstable();
            let p99_idx = (sorted.len() as f32 * 0.99) as usize;
            self.tick_time_p99_us
                .store(sorted[p99_idx.min(sorted.len() - 1)], Ordering::Relaxed);
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Generate Prometheus-format metrics output
    pub fn to_prometheus(&self) -> String {
        let mut output = String::with_capacity(2048);

        macro_rules! metric {
            ($name:expr, $help:expr, $type:expr, $value:expr) => {
                output.push_str(&format!(
                    "# HELP {} {}\n# TYPE {} {}\n{} {}\n",
                    $name, $help, $name, $type, $name, $value
                ));
            };
        }

        metric!("spore_arena_connections_active", "Registered connections", "gauge",
            self.connections_active.load(Ordering::Relaxed));
        metric!("spore_arena_players_active", "Players in game", "gauge",
            self.players_active.load(Ordering::Relaxed));
        metric!("spore_arena_spores_active", "Spores in the world", "gauge",
            self.spores_active.load(Ordering::Relaxed));

        metric!("spore_arena_messages_received_total", "Frames decoded from clients", "counter",
            self.messages_received.load(Ordering::Relaxed));
        metric!("spore_arena_messages_sent_total", "Frames written to clients", "counter",
            self.messages_sent.load(Ordering::Relaxed));
        metric!("spore_arena_messages_dropped_total", "Messages dropped on full outbound queues", "counter",
            self.messages_dropped.load(Ordering::Relaxed));
        metric!("spore_arena_broadcasts_total", "Broadcasts fanned out by the hub", "counter",
            self.broadcasts.load(Ordering::Relaxed));

        metric!("spore_arena_claims_accepted_total", "Consumption claims accepted", "counter",
            self.claims_accepted.load(Ordering::Relaxed));
        metric!("spore_arena_claims_rejected_total", "Consumption claims rejected", "counter",
            self.claims_rejected.load(Ordering::Relaxed));

        metric!("spore_arena_tick_count", "Movement ticks processed", "counter",
            self.tick_count.load(Ordering::Relaxed));
        metric!("spore_arena_tick_time_p99_microseconds", "99th percentile movement tick time", "gauge",
            self.tick_time_p99_us.load(Ordering::Relaxed));
        metric!("spore_arena_uptime_seconds", "Server uptime in seconds", "counter",
            self.uptime_seconds());

        output
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Serialize)]
struct LeaderboardEntry {
    rank: usize,
    name: String,
    score: i64,
}

/// Parse `limit` and `offset` from a request path like `/leaderboard?limit=5`
fn leaderboard_params(path: &str) -> (usize, usize) {
    let mut limit = LEADERBOARD_DEFAULT_LIMIT;
    let mut offset = 0;

    let query = path.split_once('?').map(|(_, q)| q).unwrap_or("");
    for pair in query.split('&') {
        match pair.split_once('=') {
            Some(("limit", v)) => limit = v.parse().unwrap_or(limit),
            Some(("offset", v)) => offset = v.parse().unwrap_or(offset),
            _ => {}
        }
    }

    (limit.min(LEADERBOARD_MAX_LIMIT), offset)
}

/// Leaderboard page as a JSON array
pub fn leaderboard_json(store: &dyn PlayerStore, limit: usize, offset: usize) -> anyhow::Result<String> {
    let entries: Vec<LeaderboardEntry> = store
        .leaderboard(limit, offset)?
        .into_iter()
        .enumerate()
        .map(|(i, (name, score))| LeaderboardEntry {
            rank: offset + i + 1,
            name,
            score,
        })
        .collect();

    Ok(serde_json::to_string(&entries)?)
}

fn http_response(status: &str, content_type: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        content_type,
        body.len(),
        body
    )
}

/// Start the metrics HTTP server
pub async fn start_metrics_server(
    metrics: Arc<Metrics>,
    store: Arc<dyn PlayerStore>,
    port: u16,
) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr).await?;

    info!("Metrics server listening on http://{}/metrics", addr);

    loop {
        let (mut socket, peer) = listener.accept().await?;
        let metrics = metrics.clone();
        let store = store.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; 1024];

            match socket.read(&mut buffer).await {
                Ok(n) if n > 0 => {
                    let request = String::from_utf8_lossy(&buffer[..n]);
                    let path = request
                        .strip_prefix("GET ")
                        .and_then(|rest| rest.split_whitespace().next())
                        .unwrap_or("");

                    let response = if path == "/metrics" {
                        http_response("200 OK", "text/plain; version=0.0.4", &metrics.to_prometheus())
                    } else if path == "/health" {
                        http_response("200 OK", "text/plain", "OK")
                    } else if path == "/leaderboard" || path.starts_with("/leaderboard?") {
                        let (limit, offset) = leaderboard_params(path);
                        match leaderboard_json(store.as_ref(), limit, offset) {
                            Ok(body) => http_response("200 OK", "application/json", &body),
                            Err(e) => {
                                warn!("Leaderboard query failed: {}", e);
                                http_response("503 Service Unavailable", "text/plain", "store unavailable")
                            }
                        }
                    } else {
                        http_response("404 Not Found", "text/plain", "")
                    };

                    if let Err(e) = socket.write_all(response.as_bytes()).await {
                        debug!("Failed to write metrics response to {}: {}", peer, e);
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    debug!("Failed to read from metrics socket {}: {}", peer, e);
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn test_metrics_new() {
        let metrics = Metrics::new();
        assert_eq!(metrics.connections_active.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.tick_count.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_decr_saturates() {
        let metrics = Metrics::new();
        Metrics::incr(&metrics.players_active);
        Metrics::decr(&metrics.players_active);
        Metrics::decr(&metrics.players_active);
        assert_eq!(metrics.players_active.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_record_tick_time() {
        let metrics = Metrics::new();
        for i in 0..100 {
            metrics.record_tick_time(Duration::from_micros(100 + i * 10));
        }

        assert_eq!(metrics.tick_count.load(Ordering::Relaxed), 100);
        assert!(metrics.tick_time_p99_us.load(Ordering::Relaxed) >= 1000);
    }

    #[test]
    fn test_prometheus_format() {
        let metrics = Metrics::new();
        metrics.connections_active.store(3, Ordering::Relaxed);
        metrics.claims_rejected.store(7, Ordering::Relaxed);

        let output = metrics.to_prometheus();
        assert!(output.contains("spore_arena_connections_active 3"));
        assert!(output.contains("spore_arena_claims_rejected_total 7"));
        assert!(output.contains("# HELP"));
        assert!(output.contains("# TYPE"));
    }

    #[test]
    fn test_leaderboard_params() {
        assert_eq!(leaderboard_params("/leaderboard"), (10, 0));
        assert_eq!(leaderboard_params("/leaderboard?limit=3&offset=6"), (3, 6));
        assert_eq!(leaderboard_params("/leaderboard?limit=5000"), (100, 0));
        assert_eq!(leaderboard_params("/leaderboard?limit=abc"), (10, 0));
    }

    #[test]
    fn test_leaderboard_json() {
        let store = MemoryStore::new();
        let a = store.create_or_fetch("a", "alice").unwrap();
        let b = store.create_or_fetch("b", "bob").unwrap();
        store.update_best_score(a.id, 100).unwrap();
        store.update_best_score(b.id, 300).unwrap();

        let json = leaderboard_json(&store, 10, 0).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed[0]["name"], "bob");
        assert_eq!(parsed[0]["rank"], 1);
        assert_eq!(parsed[1]["score"], 100);

        let page = leaderboard_json(&store, 1, 1).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&page).unwrap();
        assert_eq!(parsed.as_array().unwrap().len(), 1);
        assert_eq!(parsed[0]["rank"], 2);
    }
}
