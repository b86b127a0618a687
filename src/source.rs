//! Schedule document loading for the command-line host
//!
//! The engine never touches the network or disk; this module fetches the raw
//! bytes (plain or gzip) from a local path or an HTTP(S) URL.

use anyhow::{bail, Context, Result};
use std::io::Read;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

/// Download settings
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub connect_timeout_secs: u64,
    pub read_timeout_secs: u64,
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_ms: 2000,
            connect_timeout_secs: 30,
            read_timeout_secs: 120,
            user_agent: concat!("epg-resolver/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

fn is_url(location: &str) -> bool {
    location.starts_with("http://") || location.starts_with("https://")
}

/// Read a schedule document from a file path or URL.
pub fn load(location: &str, config: &FetchConfig) -> Result<Vec<u8>> {
    if is_url(location) {
        download(location, config)
    } else {
        let path = Path::new(location);
        std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))
    }
}

fn create_agent(config: &FetchConfig) -> ureq::Agent {
    ureq::Agent::config_builder()
        .timeout_global(Some(Duration::from_secs(config.read_timeout_secs)))
        .timeout_connect(Some(Duration::from_secs(config.connect_timeout_secs)))
        .max_idle_connections(4)
        .max_idle_connections_per_host(2)
        .build()
        .new_agent()
}

/// GET `url` into memory, retrying transient failures.
pub fn download(url: &str, config: &FetchConfig) -> Result<Vec<u8>> {
    let agent = create_agent(config);
    let mut attempts = 0;

    loop {
        attempts += 1;

        match try_download(&agent, url, config) {
            Ok(body) => {
                debug!(url, bytes = body.len(), attempts, "schedule downloaded");
                return Ok(body);
            }
            Err(e) => {
                if attempts >= config.max_retries.max(1) {
                    return Err(e.context(format!("download failed after {} attempts", attempts)));
                }
                warn!(url, attempt = attempts, error = %e, "download failed, retrying");
                std::thread::sleep(Duration::from_millis(config.retry_delay_ms));
            }
        }
    }
}

fn try_download(agent: &ureq::Agent, url: &str, config: &FetchConfig) -> Result<Vec<u8>> {
    let response = agent
        .get(url)
        .header("User-Agent", &config.user_agent)
        .call()
        .context("request failed")?;

    let status = response.status();
    if status != 200 {
        bail!("HTTP error: {}", status);
    }

    let mut body = Vec::new();
    response
        .into_body()
        .into_reader()
        .read_to_end(&mut body)
        .context("read failed")?;
    Ok(body)
}
