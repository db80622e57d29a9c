//! Test server management.
//!
//! Spawns and manages parleyd instances for integration testing.

use std::process::{Child, Command};
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::sleep;

/// Shared secret every test server signs tokens with.
pub const SECRET: &str = "integration-secret";

/// A test server instance.
pub struct TestServer {
    child: Child,
    port: u16,
    _data_dir: TempDir,
}

impl TestServer {
    /// Spawn a server on a free port over the memory store.
    pub async fn spawn() -> anyhow::Result<Self> {
        Self::spawn_with_origins(&[]).await
    }

    /// Spawn a server that only accepts upgrades from `origins`.
    pub async fn spawn_with_origins(origins: &[&str]) -> anyhow::Result<Self> {
        let port = free_port()?;
        let allow_origins = origins
            .iter()
            .map(|o| format!("\"{o}\""))
            .collect::<Vec<_>>()
            .join(", ");
        let data_dir = tempfile::tempdir()?;
        let config_path = data_dir.path().join("config.toml");
        let config_content = format!(
            r#"
[server]
name = "parley.test"
metrics_port = 0

[listen]
address = "127.0.0.1:{port}"
allow_origins = [{allow_origins}]

[database]
backend = "memory"

[auth]
secret = "{SECRET}"

[rate_limits]
events_per_second = 1000
event_burst = 1000
"#
        );
        std::fs::write(&config_path, config_content)?;

        let child = Command::new(env!("CARGO_BIN_EXE_parleyd"))
            .arg(&config_path)
            .env("RUST_LOG", "warn")
            .spawn()?;

        let server = Self {
            child,
            port,
            _data_dir: data_dir,
        };
        server.wait_until_ready().await?;
        Ok(server)
    }

    /// Wait until the server is accepting connections.
    async fn wait_until_ready(&self) -> anyhow::Result<()> {
        for _ in 0..50 {
            if tokio::net::TcpStream::connect(("127.0.0.1", self.port))
                .await
                .is_ok()
            {
                return Ok(());
            }
            sleep(Duration::from_millis(100)).await;
        }
        anyhow::bail!("Server failed to start within 5 seconds")
    }

    /// WebSocket URL of this server.
    pub fn url(&self) -> String {
        format!("ws://127.0.0.1:{}/", self.port)
    }

    /// Connect as `identity` with a freshly minted token and wait for `ready`.
    pub async fn connect(&self, identity: &str) -> anyhow::Result<super::client::TestClient> {
        super::client::TestClient::connect(&self.url(), identity, SECRET).await
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn free_port() -> anyhow::Result<u16> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}
