//! DeviceLocator - Camera Discovery by Hostname
//!
//! ## Responsibilities
//!
//! - Sweep candidate subnets for live hosts (hint subnet first)
//! - Match hosts by cleaned reverse-resolved hostname
//! - Cache the resolved address and revalidate liveness on use
//! - Re-resolve with capped exponential backoff when the device moves

pub mod sweep;

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::{RwLock, Semaphore};

use crate::error::{Error, Result};

/// Discovery parameters.
#[derive(Debug, Clone)]
pub struct DeviceLocatorConfig {
    /// Hostname to match after reverse lookup and suffix cleaning
    pub hostname: String,
    /// Subnet swept before the local interface subnets
    pub subnet_hint: Option<String>,
    /// Per-port probe timeout
    pub probe_timeout_ms: u32,
    /// Parallel probes during a subnet sweep
    pub sweep_concurrency: usize,
    /// Full-sweep attempts in `get_ip` before giving up; None retries forever
    pub max_attempts: Option<u32>,
}

impl Default for DeviceLocatorConfig {
    fn default() -> Self {
        Self {
            hostname: "camera".to_string(),
            subnet_hint: None,
            probe_timeout_ms: 250,
            sweep_concurrency: 64,
            max_attempts: None,
        }
    }
}

/// DeviceLocator instance
pub struct DeviceLocator {
    config: DeviceLocatorConfig,
    cached: RwLock<Option<IpAddr>>,
}

impl DeviceLocator {
    pub fn new(config: DeviceLocatorConfig) -> Self {
        Self {
            config,
            cached: RwLock::new(None),
        }
    }

    pub fn hostname(&self) -> &str {
        &self.config.hostname
    }

    /// Candidate subnets: the hint first, then every local /24.
    async fn candidate_subnets(&self) -> Vec<String> {
        let mut subnets = Vec::new();
        if let Some(hint) = &self.config.subnet_hint {
            subnets.push(hint.clone());
        }
        for subnet in sweep::local_interface_subnets().await {
            if !subnets.contains(&subnet) {
                subnets.push(subnet);
            }
        }
        subnets
    }

    /// One full sweep across candidate subnets. The first live host whose
    /// cleaned reverse name matches wins and is cached.
    pub async fn resolve(&self) -> Option<IpAddr> {
        for subnet in self.candidate_subnets().await {
            tracing::debug!(subnet = %subnet, hostname = %self.config.hostname, "Sweeping subnet");
            let ips = match sweep::parse_cidr(&subnet) {
                Ok(ips) => ips,
                Err(e) => {
                    tracing::warn!(subnet = %subnet, error = %e, "Skipping unparseable subnet");
                    continue;
                }
            };
            if let Some(ip) = self.sweep_subnet(ips).await {
                *self.cached.write().await = Some(ip);
                tracing::info!(hostname = %self.config.hostname, ip = %ip, "Device resolved");
                return Some(ip);
            }
        }
        tracing::warn!(hostname = %self.config.hostname, "Device not found on any subnet");
        None
    }

    async fn sweep_subnet(&self, ips: Vec<IpAddr>) -> Option<IpAddr> {
        let semaphore = Arc::new(Semaphore::new(self.config.sweep_concurrency.max(1)));
        let timeout_ms = self.config.probe_timeout_ms;
        let target = self.config.hostname.clone();

        let mut handles = Vec::with_capacity(ips.len());
        for ip in ips {
            let semaphore = Arc::clone(&semaphore);
            let target = target.clone();
            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire().await.ok()?;
                if !sweep::probe_host(ip, timeout_ms).await {
                    return None;
                }
                let name = sweep::reverse_hostname(ip).await?;
                (sweep::clean_hostname(&name) == target).then_some(ip)
            }));
        }

        let mut found = None;
        for handle in handles {
            if let Ok(Some(ip)) = handle.await {
                // Keep the lowest-address match for deterministic picks.
                found.get_or_insert(ip);
            }
        }
        found
    }

    /// Liveness check on a single address.
    pub async fn is_live(&self, ip: IpAddr) -> bool {
        sweep::probe_host(ip, self.config.probe_timeout_ms).await
    }

    pub async fn cached_ip(&self) -> Option<IpAddr> {
        *self.cached.read().await
    }

    /// Drop the cached address; the next `get_ip` re-resolves from scratch.
    pub async fn invalidate(&self) {
        *self.cached.write().await = None;
    }

    /// Current device address.
    ///
    /// A cached address is revalidated before being returned. Otherwise
    /// full sweeps repeat with capped exponential backoff until the device
    /// is found, or until `max_attempts` sweeps have failed.
    pub async fn get_ip(&self) -> Result<IpAddr> {
        if let Some(ip) = self.cached_ip().await {
            if self.is_live(ip).await {
                return Ok(ip);
            }
            tracing::warn!(ip = %ip, "Cached device address went dark");
            self.invalidate().await;
        }

        let mut attempt: u32 = 0;
        loop {
            if let Some(ip) = self.resolve().await {
                return Ok(ip);
            }
            attempt += 1;
            if let Some(max) = self.config.max_attempts {
                if attempt >= max {
                    return Err(Error::DeviceUnavailable(format!(
                        "{} not found after {} sweeps",
                        self.config.hostname, attempt
                    )));
                }
            }
            let delay = backoff_delay(attempt);
            tracing::debug!(
                attempt,
                delay_ms = delay.as_millis() as u64,
                "Device not found, backing off"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

/// Exponential backoff: 500ms doubling to a 30s cap, with +/-25% jitter.
fn backoff_delay(attempt: u32) -> Duration {
    const BASE_MS: u64 = 500;
    const CAP_MS: u64 = 30_000;
    let exp = BASE_MS.saturating_mul(1u64 << attempt.saturating_sub(1).min(6));
    let capped = exp.min(CAP_MS);
    let jitter = rand::thread_rng().gen_range(0.75..=1.25);
    Duration::from_millis((capped as f64 * jitter) as u64)
}

// ============================================================
// Tests
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_and_caps() {
        for _ in 0..20 {
            let first = backoff_delay(1).as_millis() as u64;
            assert!((375..=625).contains(&first), "first delay {first}ms");

            let late = backoff_delay(30).as_millis() as u64;
            assert!(late <= 37_500, "late delay {late}ms");
            assert!(late >= 22_500, "late delay {late}ms");
        }
    }

    #[tokio::test]
    async fn invalidate_clears_the_cache() {
        let locator = DeviceLocator::new(DeviceLocatorConfig::default());
        *locator.cached.write().await = Some("10.0.0.9".parse().unwrap());
        assert!(locator.cached_ip().await.is_some());
        locator.invalidate().await;
        assert!(locator.cached_ip().await.is_none());
    }

    #[tokio::test]
    async fn hint_subnet_is_swept_first() {
        let locator = DeviceLocator::new(DeviceLocatorConfig {
            subnet_hint: Some("10.11.12.0/24".to_string()),
            ..Default::default()
        });
        let subnets = locator.candidate_subnets().await;
        assert_eq!(subnets.first().map(String::as_str), Some("10.11.12.0/24"));
    }
}
