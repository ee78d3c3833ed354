use crate::backoff::ReconnectSchedule;
use crate::config::{Config, ConsoleFormat};
use crate::console;
use crate::error::PublishError;
use crate::provider::MetricsProvider;
use crate::publisher::{PublishLifecycle, Transport};
use crate::sampler::RateSampler;
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub struct AggregatorConfig {
    pub interval: Duration,
    pub reconnect_initial: Duration,
    pub reconnect_max: Duration,
    pub console: Option<ConsoleFormat>,
}

impl AggregatorConfig {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            reconnect_initial: Duration::from_secs(5),
            reconnect_max: Duration::from_secs(60),
            console: None,
        }
    }
}

impl From<&Config> for AggregatorConfig {
    fn from(cfg: &Config) -> Self {
        Self {
            interval: cfg.interval(),
            reconnect_initial: cfg.reconnect_initial(),
            reconnect_max: cfg.reconnect_max(),
            console: cfg.console,
        }
    }
}

/// Counters for one run of the driver loop.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunStats {
    pub ticks: u64,
    pub published: u64,
    pub collect_failures: u64,
    pub connect_attempts: u64,
}

/// Fixed-cadence driver: sample, then publish, reconnecting on a backoff
/// whenever the link is down.
pub struct Aggregator<P, T> {
    config: AggregatorConfig,
    sampler: RateSampler<P>,
    lifecycle: PublishLifecycle<T>,
    reconnect: ReconnectSchedule,
    stats: RunStats,
}

impl<P: MetricsProvider, T: Transport> Aggregator<P, T> {
    pub fn new(
        config: AggregatorConfig,
        sampler: RateSampler<P>,
        lifecycle: PublishLifecycle<T>,
    ) -> Self {
        let reconnect = ReconnectSchedule::new(config.reconnect_initial, config.reconnect_max);
        Self {
            config,
            sampler,
            lifecycle,
            reconnect,
            stats: RunStats::default(),
        }
    }

    pub fn lifecycle(&self) -> &PublishLifecycle<T> {
        &self.lifecycle
    }

    pub fn stats(&self) -> RunStats {
        self.stats
    }

    /// Runs until `cancel` fires, then closes the broker session.
    ///
    /// The first sample is taken one full interval after start, so it never
    /// averages over the few milliseconds since the sampler primed.
    pub async fn run(mut self, cancel: CancellationToken) -> RunStats {
        info!(
            "Aggregator started with interval {:?}",
            self.config.interval
        );
        info!("Connecting to MQTT broker...");
        self.maintain_connection(Instant::now()).await;

        let start = tokio::time::Instant::now() + self.config.interval;
        let mut ticker = tokio::time::interval_at(start, self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    break;
                }
                _ = ticker.tick() => {}
            }
            self.tick(Instant::now()).await;
        }

        info!("Shutting down...");
        self.lifecycle.disconnect().await;
        info!("Disconnected. Goodbye!");
        self.stats
    }

    /// One pass: maintain the connection, sample, publish.
    pub async fn tick(&mut self, now: Instant) {
        self.stats.ticks += 1;
        self.maintain_connection(now).await;

        let snapshot = match self.sampler.collect() {
            Ok(s) => s,
            Err(e) => {
                self.stats.collect_failures += 1;
                warn!("{}", e);
                return;
            }
        };

        match self.config.console {
            Some(ConsoleFormat::Text) => console::print_status_line(&snapshot),
            Some(ConsoleFormat::Json) => console::print_json_line(&snapshot),
            None => {}
        }

        match self.lifecycle.publish(&snapshot) {
            Ok(count) => {
                self.stats.published += 1;
                debug!("Published {} metrics", count);
            }
            Err(PublishError::NotConnected) => {
                debug!("Skipping publish while disconnected");
            }
            Err(e) => warn!("{}", e),
        }
    }

    async fn maintain_connection(&mut self, now: Instant) {
        if self.lifecycle.link().is_connected() {
            self.reconnect.connected(now);
            return;
        }
        if !self.reconnect.is_due(now) {
            return;
        }
        if self.stats.connect_attempts > 0 {
            info!("Reconnecting to MQTT broker...");
        }
        self.stats.connect_attempts += 1;
        // A failure here is already recorded and logged by the lifecycle.
        let _ = self.lifecycle.connect().await;
        self.reconnect.attempted(now);
        debug!(
            "Next reconnect attempt no sooner than {:?}",
            self.reconnect.next_delay()
        );
    }
}
