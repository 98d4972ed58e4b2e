//! NATS client wrapper and connection management.
//!
//! `NatsClient` wraps a single multiplexed `async-nats` connection together
//! with its JetStream context. Clones are cheap and share the connection, so
//! the proxy's concurrent requests and a worker's consumer loop can all use
//! one client.

use std::sync::Arc;
use std::time::Duration;

use async_nats::{Client, ConnectOptions, jetstream};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::time::timeout;

use super::nats_config::NatsConfig;
use crate::kv::{JobKey, JobsBucket, KvBucket, KvKey, KvStore};
use crate::queue::{JobRecord, JobRecords, JobStream, NatsJobConsumer, NatsJobQueue};
use crate::{Error, Result, TRACING_TARGET_CLIENT, TRACING_TARGET_CONNECTION};

/// NATS client wrapper with connection management.
#[derive(Debug, Clone)]
pub struct NatsClient {
    inner: Arc<NatsClientInner>,
}

#[derive(Debug)]
struct NatsClientInner {
    client: Client,
    jetstream: jetstream::Context,
    config: NatsConfig,
}

impl NatsClient {
    /// Validates `config` and connects.
    #[tracing::instrument(skip(config), target = TRACING_TARGET_CONNECTION)]
    pub async fn connect(config: NatsConfig) -> Result<Self> {
        config.validate()?;

        tracing::info!(
            target: TRACING_TARGET_CONNECTION,
            servers = %config.nats_url,
            name = %config.name(),
            "Connecting to NATS"
        );

        let mut connect_opts = ConnectOptions::new()
            .name(config.name())
            .ping_interval(config.ping_interval())
            .connection_timeout(config.connect_timeout())
            .max_reconnects(config.max_reconnects_option())
            .reconnect_delay_callback(NatsConfig::reconnect_delay);

        if let Some(token) = &config.nats_token {
            connect_opts = connect_opts.token(token.clone());
        }

        let connect_timeout = config.connect_timeout();
        let client = timeout(
            connect_timeout,
            async_nats::connect_with_options(config.nats_url.as_str(), connect_opts),
        )
        .await
        .map_err(|_| Error::timeout(connect_timeout))?
        .map_err(|e| Error::Connection(Box::new(e)))?;

        let jetstream = jetstream::new(client.clone());

        let server_info = client.server_info();
        tracing::info!(
            target: TRACING_TARGET_CONNECTION,
            server_host = %server_info.host,
            server_version = %server_info.version,
            max_payload = server_info.max_payload,
            "Connected to NATS"
        );

        Ok(Self {
            inner: Arc::new(NatsClientInner {
                client,
                jetstream,
                config,
            }),
        })
    }

    #[must_use]
    pub fn config(&self) -> &NatsConfig {
        &self.inner.config
    }

    /// Returns the JetStream context.
    pub fn jetstream(&self) -> &jetstream::Context {
        &self.inner.jetstream
    }

    /// Round-trips a flush to the server.
    #[tracing::instrument(skip(self), target = TRACING_TARGET_CONNECTION)]
    pub async fn ping(&self) -> Result<Duration> {
        let start = std::time::Instant::now();
        let ping_timeout = Duration::from_secs(10);

        timeout(ping_timeout, self.inner.client.flush())
            .await
            .map_err(|_| Error::timeout(ping_timeout))?
            .map_err(|e| Error::Connection(Box::new(e)))?;

        let ping_time = start.elapsed();
        tracing::debug!(
            target: TRACING_TARGET_CLIENT,
            duration_ms = ping_time.as_millis(),
            "NATS ping successful"
        );
        Ok(ping_time)
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        matches!(
            self.inner.client.connection_state(),
            async_nats::connection::State::Connected
        )
    }
}

// Key-value store getters
impl NatsClient {
    /// Get or create a KV store for the specified key, value, and bucket types.
    #[tracing::instrument(skip(self), target = TRACING_TARGET_CLIENT)]
    pub async fn kv_store<K, V, B>(&self) -> Result<KvStore<K, V, B>>
    where
        K: KvKey,
        V: Serialize + DeserializeOwned + Send + Sync + 'static,
        B: KvBucket,
    {
        KvStore::new(&self.inner.jetstream).await
    }

    /// Get or create the job record store.
    pub async fn job_store(&self) -> Result<KvStore<JobKey, JobRecord, JobsBucket>> {
        self.kv_store().await
    }
}

// Job queue getters
impl NatsClient {
    /// Get or create the work-queue stream for `queue`.
    #[tracing::instrument(skip(self), target = TRACING_TARGET_CLIENT)]
    pub async fn job_stream(&self, queue: &str) -> Result<JobStream> {
        JobStream::new(&self.inner.jetstream, queue).await
    }

    /// Creates the submitting side of `queue`, used by the proxy.
    #[tracing::instrument(skip(self), target = TRACING_TARGET_CLIENT)]
    pub async fn job_queue(&self, queue: &str) -> Result<NatsJobQueue> {
        let stream = self.job_stream(queue).await?;
        let records = JobRecords::new(self.job_store().await?);
        Ok(NatsJobQueue::new(stream, records))
    }

    /// Creates the consuming side of `queue`, used by workers.
    #[tracing::instrument(skip(self), target = TRACING_TARGET_CLIENT)]
    pub async fn job_consumer(&self, queue: &str, worker: &str) -> Result<NatsJobConsumer> {
        let stream = self.job_stream(queue).await?;
        let records = JobRecords::new(self.job_store().await?);
        NatsJobConsumer::new(&stream, records, worker).await
    }
}
