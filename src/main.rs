use clap::Parser;
use host_telemetry::aggregator::{Aggregator, AggregatorConfig};
use host_telemetry::config::Config;
use host_telemetry::mqtt::MqttTransport;
use host_telemetry::provider::{platform_summary, SysinfoProvider};
use host_telemetry::publisher::PublishLifecycle;
use host_telemetry::runtime;
use host_telemetry::sampler::RateSampler;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[tokio::main]
async fn main() {
    runtime::init_tracing();
    let config = Config::parse();

    info!("System Monitor starting...");
    info!("Platform: {}", platform_summary());
    info!(
        "Broker: {}:{} | Topic prefix: {} | interval={}ms",
        config.host, config.port, config.topic_prefix, config.interval_ms
    );

    if config.interval() < sysinfo::MINIMUM_CPU_UPDATE_INTERVAL {
        warn!(
            "Interval {:?} is shorter than the {:?} sysinfo needs between CPU readings",
            config.interval(),
            sysinfo::MINIMUM_CPU_UPDATE_INTERVAL
        );
    }

    let sampler = RateSampler::new(SysinfoProvider::new(), config.mount_point.clone());
    let lifecycle = PublishLifecycle::new(MqttTransport::new(config.broker()), &config.topic_prefix);
    let agg = Aggregator::new(AggregatorConfig::from(&config), sampler, lifecycle);

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        runtime::shutdown_signal().await;
        signal_cancel.cancel();
    });

    let stats = agg.run(cancel).await;
    info!(
        "Ran {} ticks, published {}, {} collection failures, {} connect attempts",
        stats.ticks, stats.published, stats.collect_failures, stats.connect_attempts
    );
}
