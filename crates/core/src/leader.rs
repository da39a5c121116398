use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use bastion_control_const::duration::{LEADER_LEASE_TTL_SECONDS, LEADER_RENEWAL_INTERVAL_SECONDS};
use bastion_control_storage::{StorageBackend, StorageError};
use bastion_control_types::error::{Error, Result};
use tokio::{sync::watch, time};

const LEADER_KEY: &[u8] = b"leader/current";

/// Lease-based leader election over the shared storage backend
///
/// At most one instance holds the `leader/current` lease at a time. The lease
/// is written with a TTL through compare-and-set, so acquiring and renewing
/// are single atomic operations and a crashed leader's lease simply expires.
/// The leader runs background maintenance; everyone else skips it.
///
/// ```rust,no_run
/// use std::sync::Arc;
///
/// use bastion_control_core::LeaderElection;
/// use bastion_control_storage::MemoryBackend;
///
/// # async fn example() {
/// let leader = Arc::new(LeaderElection::new(MemoryBackend::new(), "control-0"));
/// if leader.try_acquire_leadership().await.unwrap() {
///     leader.clone().start_lease_renewal();
/// }
/// leader.shutdown().await;
/// # }
/// ```
pub struct LeaderElection<S: StorageBackend> {
    storage: S,
    instance_id: String,
    lease_ttl: Duration,
    renewal_interval: Duration,
    is_leader: AtomicBool,
    shutdown: watch::Sender<bool>,
}

impl<S: StorageBackend + 'static> LeaderElection<S> {
    pub fn new(storage: S, instance_id: impl Into<String>) -> Self {
        Self::with_timing(
            storage,
            instance_id,
            Duration::from_secs(LEADER_LEASE_TTL_SECONDS),
            Duration::from_secs(LEADER_RENEWAL_INTERVAL_SECONDS),
        )
    }

    /// Election with a custom lease TTL and renewal cadence
    pub fn with_timing(
        storage: S,
        instance_id: impl Into<String>,
        lease_ttl: Duration,
        renewal_interval: Duration,
    ) -> Self {
        Self {
            storage,
            instance_id: instance_id.into(),
            lease_ttl,
            renewal_interval,
            is_leader: AtomicBool::new(false),
            shutdown: watch::Sender::new(false),
        }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn is_leader(&self) -> bool {
        self.is_leader.load(Ordering::SeqCst)
    }

    fn set_leader(&self, value: bool) {
        if self.is_leader.swap(value, Ordering::SeqCst) != value {
            crate::metrics::set_is_leader(value);
        }
    }

    /// Try to take the lease
    ///
    /// Returns `Ok(true)` when this instance holds the lease afterwards,
    /// including when it already held it.
    pub async fn try_acquire_leadership(&self) -> Result<bool> {
        let value = self.instance_id.as_bytes().to_vec();

        match self
            .storage
            .compare_and_set_with_ttl(LEADER_KEY, None, value.clone(), self.lease_ttl)
            .await
        {
            Ok(()) => {
                self.set_leader(true);
                tracing::info!(instance_id = %self.instance_id, "Acquired leadership lease");
                Ok(true)
            },
            Err(StorageError::Conflict { .. }) => {
                let current = self
                    .storage
                    .get(LEADER_KEY)
                    .await
                    .map_err(|e| Error::internal(format!("Failed to check leader status: {e}")))?;

                let ours = current.is_some_and(|holder| holder.as_ref() == value.as_slice());
                self.set_leader(ours);
                Ok(ours)
            },
            Err(e) => Err(Error::internal(format!("Failed to acquire leadership: {e}"))),
        }
    }

    /// Extend the lease if this instance still holds it
    ///
    /// Steps down when the lease now names another instance.
    async fn renew_lease(&self) -> Result<()> {
        if !self.is_leader() {
            return Ok(());
        }

        let value = self.instance_id.as_bytes().to_vec();
        match self
            .storage
            .compare_and_set_with_ttl(LEADER_KEY, Some(value.as_slice()), value.clone(), self.lease_ttl)
            .await
        {
            Ok(()) => {
                tracing::debug!(instance_id = %self.instance_id, "Renewed leadership lease");
                Ok(())
            },
            Err(StorageError::Conflict { .. }) => {
                self.set_leader(false);
                tracing::warn!(instance_id = %self.instance_id, "Leadership lease lost, stepping down");
                Err(Error::conflict("Leadership lease is held by another instance"))
            },
            Err(e) => {
                self.set_leader(false);
                Err(Error::internal(format!("Failed to renew leader lease: {e}")))
            },
        }
    }

    /// Keep the lease alive in the background until [`shutdown`](Self::shutdown)
    ///
    /// While not leader the task keeps trying to acquire, so a follower takes
    /// over once the previous leader's lease expires.
    pub fn start_lease_renewal(self: Arc<Self>) {
        tokio::spawn(async move {
            let mut shutdown = self.shutdown.subscribe();
            let mut interval = time::interval(self.renewal_interval);
            interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = shutdown.wait_for(|stop| *stop) => break,
                    _ = interval.tick() => {},
                }

                let outcome = if self.is_leader() {
                    self.renew_lease().await
                } else {
                    self.try_acquire_leadership().await.map(|_| ())
                };
                if let Err(e) = outcome {
                    tracing::warn!(instance_id = %self.instance_id, error = %e, "Lease maintenance failed");
                }
            }

            tracing::info!(instance_id = %self.instance_id, "Stopped lease renewal");
        });
    }

    /// Give up the lease if this instance still holds it
    pub async fn release_leadership(&self) -> Result<()> {
        if !self.is_leader() {
            return Ok(());
        }

        let value = self.instance_id.as_bytes().to_vec();
        let still_ours = self
            .storage
            .get(LEADER_KEY)
            .await
            .map_err(|e| Error::internal(format!("Failed to check leader status: {e}")))?
            .is_some_and(|holder| holder.as_ref() == value.as_slice());

        if still_ours {
            self.storage
                .delete(LEADER_KEY)
                .await
                .map_err(|e| Error::internal(format!("Failed to release leadership: {e}")))?;
        }

        self.set_leader(false);
        tracing::info!(instance_id = %self.instance_id, "Released leadership");
        Ok(())
    }

    /// Stop lease renewal and release the lease
    pub async fn shutdown(&self) {
        self.shutdown.send_replace(true);
        if let Err(e) = self.release_leadership().await {
            tracing::error!(error = %e, "Failed to release leadership on shutdown");
        }
    }
}
