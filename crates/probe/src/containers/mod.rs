//! Ephemeral containers backing a harness session.
//!
//! Containers are started with testcontainers and probed explicitly: after
//! the runtime reports the container as started, the mapped port is polled
//! over TCP until it accepts connections or the ready deadline passes.
//! Every container carries a [`SESSION_LABEL`] so leftovers from a crashed
//! run can be found with `docker ps --filter label=helios.probe.session`.

use std::sync::OnceLock;
use std::time::{Duration, Instant};

use tokio::net::TcpStream;
use tokio::time::sleep;
use uuid::Uuid;

use crate::error::{ProbeError, ProbeResult};

pub mod bigquery;
pub mod postgres;

pub use bigquery::BigQueryInstance;
pub use postgres::PostgresInstance;

/// Label attached to every container this process starts.
pub const SESSION_LABEL: &str = "helios.probe.session";

static SESSION_ID: OnceLock<String> = OnceLock::new();

/// Returns the id shared by all containers started in this process.
pub fn session_id() -> &'static str {
    SESSION_ID.get_or_init(short_suffix)
}

fn short_suffix() -> String {
    Uuid::new_v4().simple().to_string()[..10].to_string()
}

/// Polls `host:port` until it accepts a TCP connection.
pub async fn wait_for_endpoint(host: &str, port: u16, timeout: Duration) -> ProbeResult<()> {
    let deadline = Instant::now() + timeout;
    loop {
        match TcpStream::connect((host, port)).await {
            Ok(_) => return Ok(()),
            Err(_) if Instant::now() < deadline => sleep(Duration::from_millis(200)).await,
            Err(_) => {
                return Err(ProbeError::NotReady {
                    host: host.to_string(),
                    port,
                    timeout,
                });
            }
        }
    }
}
