use crate::config::HealthConfig;
use crate::http::{HttpRequest, HttpTransport};
use crate::skins::mojang::MojangClient;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub const SERVICE_MOJANG_UUID: &str = "mojang-uuid";
pub const SERVICE_MOJANG_PROFILE: &str = "mojang-profile";
pub const SERVICE_MINESKIN: &str = "mineskin";

/// Used for the profile probe when the name lookup itself is down
const FALLBACK_PROBE_UUID: Uuid = Uuid::from_u128(0x069a79f4_44e9_4726_a5be_fca90e38aaf5);

const MINESKIN_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Result of a health check
#[derive(Debug, Clone, Serialize)]
pub struct HealthCheckResult {
    pub service: String,
    pub reachable: bool,
    pub latency_ms: Option<u64>,
    pub error: Option<String>,
}

impl HealthCheckResult {
    fn up(service: &str, latency: u64) -> Self {
        Self {
            service: service.to_string(),
            reachable: true,
            latency_ms: Some(latency),
            error: None,
        }
    }

    fn down(service: &str, error: String) -> Self {
        Self {
            service: service.to_string(),
            reachable: false,
            latency_ms: None,
            error: Some(error),
        }
    }
}

/// Aggregate of one round of probes
#[derive(Debug, Clone, Serialize)]
pub struct ServiceCheckReport {
    pub results: Vec<HealthCheckResult>,
}

impl ServiceCheckReport {
    /// Players can be resolved when both Mojang lookups answer
    pub fn is_online(&self) -> bool {
        self.is_reachable(SERVICE_MOJANG_UUID) && self.is_reachable(SERVICE_MOJANG_PROFILE)
    }

    pub fn is_reachable(&self, service: &str) -> bool {
        self.results
            .iter()
            .any(|r| r.service == service && r.reachable)
    }

    pub fn working_count(&self) -> usize {
        self.results.iter().filter(|r| r.reachable).count()
    }
}

/// Probes the upstream services skins are resolved through
pub struct ServiceChecker {
    mojang: Arc<MojangClient>,
    transport: Arc<dyn HttpTransport>,
    mineskin_endpoint: String,
    user_agent: String,
    probe_name: String,
}

impl ServiceChecker {
    pub fn new(
        mojang: Arc<MojangClient>,
        transport: Arc<dyn HttpTransport>,
        mineskin_endpoint: &str,
        user_agent: &str,
        config: &HealthConfig,
    ) -> Self {
        Self {
            mojang,
            transport,
            mineskin_endpoint: mineskin_endpoint.to_string(),
            user_agent: user_agent.to_string(),
            probe_name: config.probe_name.clone(),
        }
    }

    /// Run every probe once and log the outcome
    pub async fn check_all(&self) -> ServiceCheckReport {
        let mut results = Vec::with_capacity(3);

        let mut probe_uuid = FALLBACK_PROBE_UUID;
        let uuid_result = timed(SERVICE_MOJANG_UUID, async {
            match self.mojang.fetch_uuid(&self.probe_name).await {
                Ok(Some((uuid, _))) => {
                    probe_uuid = uuid;
                    Ok(())
                }
                Ok(None) => Err(format!("Probe account '{}' not found", self.probe_name)),
                Err(e) => Err(e.to_string()),
            }
        })
        .await;
        results.push(uuid_result);

        let profile_result = timed(SERVICE_MOJANG_PROFILE, async {
            match self.mojang.fetch_profile(probe_uuid).await {
                Ok(Some(_)) => Ok(()),
                Ok(None) => Err("Probe profile has no textures".to_string()),
                Err(e) => Err(e.to_string()),
            }
        })
        .await;
        results.push(profile_result);

        results.push(self.check_mineskin().await);

        let report = ServiceCheckReport { results };
        for result in &report.results {
            match (&result.latency_ms, &result.error) {
                (Some(latency), _) => info!("[HEALTH] {} is reachable ({}ms)", result.service, latency),
                (None, Some(e)) => warn!("[HEALTH] {} is unavailable: {}", result.service, e),
                (None, None) => warn!("[HEALTH] {} is unavailable", result.service),
            }
        }

        if !report.is_online() {
            error!("[HEALTH] Mojang lookups are unavailable, player skins cannot be resolved!");
        }

        report
    }

    /// Any HTTP answer counts, the endpoint only accepts POST
    async fn check_mineskin(&self) -> HealthCheckResult {
        debug!("[HEALTH] Checking {}", self.mineskin_endpoint);
        let request = HttpRequest::get(&self.mineskin_endpoint, &self.user_agent, MINESKIN_PROBE_TIMEOUT);
        timed(SERVICE_MINESKIN, async {
            match self.transport.execute(request).await {
                Ok(response) if response.status < 500 => Ok(()),
                Ok(response) => Err(format!("Server error {}", response.status)),
                Err(e) => Err(e.to_string()),
            }
        })
        .await
    }
}

async fn timed<F>(service: &str, probe: F) -> HealthCheckResult
where
    F: Future<Output = Result<(), String>>,
{
    let start = Instant::now();
    match probe.await {
        Ok(()) => HealthCheckResult::up(service, start.elapsed().as_millis() as u64),
        Err(e) => HealthCheckResult::down(service, e),
    }
}
