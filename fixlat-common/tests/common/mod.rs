use fixlat_common::{HarnessConfig, SamplingConfig};
use fixlat_engine::SessionSettings;
use std::net::SocketAddr;
use std::sync::Once;
use std::time::Duration;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

static INIT: Once = Once::new();

pub fn init_test_logging() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        tracing_subscriber::registry()
            .with(fmt::layer().with_test_writer().with_target(true))
            .with(filter)
            .init();
    });
}

fn sampling(sample_size: usize, timeout: Option<Duration>) -> SamplingConfig {
    SamplingConfig {
        sample_size,
        settle_delay: Duration::from_millis(200),
        completion_timeout: timeout,
        completion_rule: None,
    }
}

pub fn acceptor_config(sample_size: usize, timeout: Option<Duration>) -> HarnessConfig {
    let mut session = SessionSettings::new("INBOUND", "OUTBOUND");
    session.socket_accept_address = Some("127.0.0.1:0".parse().unwrap());
    let mut config = HarnessConfig::new(session);
    config.harness = sampling(sample_size, timeout);
    config
}

pub fn initiator_config(
    addr: SocketAddr,
    sample_size: usize,
    timeout: Option<Duration>,
) -> HarnessConfig {
    let mut session = SessionSettings::new("OUTBOUND", "INBOUND");
    session.socket_connect_address = Some(addr.to_string());
    session.reconnect_interval = Duration::from_millis(100);
    let mut config = HarnessConfig::new(session);
    config.harness = sampling(sample_size, timeout);
    config
}

/// An address nothing is listening on.
pub async fn closed_port() -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}
