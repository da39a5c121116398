pub mod credentials;
pub mod faults;
pub mod health;
pub mod jobs;
pub mod metrics;
pub mod ratelimit;

use std::{sync::Arc, time::Instant};

use bastion_control_config::Config;
use bastion_control_core::{
    CredentialAuthority, CredentialAuthorityConfig, FaultInjectingBackend, FaultInjector,
    JobOrchestrator, LeaderElection, OrchestratorConfig, RateLimiter, SecretEncryptor,
    SimulatedBackend,
};
use bastion_control_storage::Backend;
use bastion_control_types::Result;
use bon::Builder;

pub use health::{healthz_handler, livez_handler, readyz_handler, startupz_handler};
pub use metrics::metrics_handler;

/// Shared state of every handler and middleware
#[derive(Clone, Builder)]
pub struct AppState {
    pub storage: Arc<Backend>,
    pub config: Arc<Config>,
    pub rate_limiter: Arc<RateLimiter<Backend>>,
    pub orchestrator: JobOrchestrator<Backend>,
    pub faults: FaultInjector,
    pub credentials: Arc<CredentialAuthority<Backend>>,
    pub leader: Option<Arc<LeaderElection<Backend>>>,
    #[builder(into)]
    pub instance_id: String,
    #[builder(default = Instant::now())]
    pub start_time: Instant,
}

impl AppState {
    /// Wire every component from `config`
    ///
    /// Loads or creates the certificate authority, so this fails when the CA
    /// record cannot be decrypted with `encryptor`.
    pub async fn initialize(
        config: Arc<Config>,
        storage: Backend,
        encryptor: SecretEncryptor,
        leader: Option<Arc<LeaderElection<Backend>>>,
        instance_id: impl Into<String>,
    ) -> Result<Self> {
        let instance_id = instance_id.into();
        let faults = FaultInjector::new(config.fault_window());

        let generation = FaultInjectingBackend::new(
            SimulatedBackend::new(config.simulated_generation(), config.result_base_url.clone()),
            faults.clone(),
        );
        let orchestrator = JobOrchestrator::new(
            storage.clone(),
            Arc::new(generation),
            OrchestratorConfig::builder()
                .instance_id(instance_id.clone())
                .poll_interval(config.job_poll_interval())
                .max_runtime(config.job_max_runtime())
                .backend_call_timeout(config.backend_call_timeout())
                .build(),
        );

        let credentials = CredentialAuthority::initialize(
            storage.clone(),
            encryptor,
            CredentialAuthorityConfig::builder()
                .validity_days(config.credential_validity_days)
                .known_services(config.known_services.clone())
                .build(),
        )
        .await?;

        let rate_limiter = RateLimiter::new(storage.clone(), config.rate_limits());

        Ok(Self::builder()
            .storage(Arc::new(storage))
            .config(config)
            .rate_limiter(Arc::new(rate_limiter))
            .orchestrator(orchestrator)
            .faults(faults)
            .credentials(Arc::new(credentials))
            .maybe_leader(leader)
            .instance_id(instance_id)
            .build())
    }

    pub fn is_leader(&self) -> bool {
        self.leader.as_ref().is_some_and(|leader| leader.is_leader())
    }
}
