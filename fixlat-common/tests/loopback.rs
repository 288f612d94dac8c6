mod common;

use common::{acceptor_config, closed_port, init_test_logging, initiator_config};
use fixlat_common::{AcceptorRun, CompletionRule, Role, run_acceptor, run_initiator};
use std::time::{Duration, Instant};

const DEADLINE: Option<Duration> = Some(Duration::from_secs(10));

#[tokio::test]
async fn full_exchange_completes_on_both_sides() {
    init_test_logging();
    let n = 20;

    let acceptor = AcceptorRun::start(&acceptor_config(n, DEADLINE)).await.unwrap();
    let addr = acceptor.local_addr().unwrap();
    let initiator_cfg = initiator_config(addr, n, DEADLINE);

    let (accepted, initiated) = tokio::join!(acceptor.finish(), run_initiator(&initiator_cfg));
    let initiated = initiated.unwrap();

    assert!(accepted.completed);
    assert_eq!(accepted.role, Role::Acceptor);
    assert_eq!(accepted.exit_code(), 0);
    assert_eq!(accepted.summary.samples, n);
    assert_eq!(accepted.summary.message_count, n as u64);
    let stats = accepted.summary.latency.unwrap();
    assert!(stats.mean_us >= 0.0);
    assert!(stats.max_index < n);
    assert!(accepted.summary.throughput > 0.0);

    // The marker MsgSeqNum=N arrives on the (N-1)th reply, because the
    // acceptor's Logon consumed sequence number 1.
    assert!(initiated.completed);
    assert_eq!(initiated.role, Role::Initiator);
    assert!(initiated.summary.samples >= n - 1);
    assert!(initiated.summary.samples <= n);
    assert!(initiated.summary.latency.is_some());
}

#[tokio::test]
async fn zero_sample_resolves_without_traffic() {
    init_test_logging();
    let started = Instant::now();

    let accepted = run_acceptor(&acceptor_config(0, None)).await.unwrap();
    assert!(accepted.completed);
    assert_eq!(accepted.summary.samples, 0);
    assert!(accepted.summary.latency.is_none());

    let initiated = run_initiator(&initiator_config(closed_port().await, 0, None))
        .await
        .unwrap();
    assert!(initiated.completed);
    assert_eq!(initiated.summary.message_count, 0);
    assert_eq!(initiated.summary.throughput, 0.0);

    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn marker_rule_never_sees_seq_consumed_by_logon() {
    init_test_logging();
    let acceptor = AcceptorRun::start(&acceptor_config(1, DEADLINE)).await.unwrap();
    let addr = acceptor.local_addr().unwrap();
    let initiator_cfg = initiator_config(addr, 1, Some(Duration::from_secs(1)));

    let (accepted, initiated) = tokio::join!(acceptor.finish(), run_initiator(&initiator_cfg));
    let initiated = initiated.unwrap();

    assert!(accepted.completed);
    assert_eq!(accepted.summary.message_count, 1);

    // The only reply carries MsgSeqNum=2, so MsgSeqNum=1 never shows up.
    assert!(!initiated.completed);
    assert_eq!(initiated.exit_code(), 2);
    assert_eq!(initiated.summary.message_count, 1);
    assert_eq!(initiated.summary.samples, 1);
}

#[tokio::test]
async fn count_rule_override_completes_initiator() {
    init_test_logging();
    let acceptor = AcceptorRun::start(&acceptor_config(1, DEADLINE)).await.unwrap();
    let addr = acceptor.local_addr().unwrap();
    let mut initiator_cfg = initiator_config(addr, 1, DEADLINE);
    initiator_cfg.harness.completion_rule = Some(CompletionRule::Count);

    let (accepted, initiated) = tokio::join!(acceptor.finish(), run_initiator(&initiator_cfg));
    assert!(accepted.completed);
    let initiated = initiated.unwrap();
    assert!(initiated.completed);
    assert_eq!(initiated.summary.message_count, 1);
}

#[tokio::test]
async fn missing_counterparty_yields_partial_report() {
    init_test_logging();
    let config = initiator_config(closed_port().await, 3, Some(Duration::from_millis(300)));

    let outcome = run_initiator(&config).await.unwrap();
    assert!(!outcome.completed);
    assert_eq!(outcome.exit_code(), 2);
    assert_eq!(outcome.summary.message_count, 0);
    assert!(outcome.summary.latency.is_none());
}

#[tokio::test]
async fn acceptor_timeout_reports_partial_sample() {
    init_test_logging();
    let outcome = run_acceptor(&acceptor_config(5, Some(Duration::from_millis(200))))
        .await
        .unwrap();
    assert!(!outcome.completed);
    assert_eq!(outcome.summary.samples, 0);
}

#[tokio::test]
async fn invalid_config_fails_before_any_session() {
    init_test_logging();
    let mut config = acceptor_config(5, DEADLINE);
    config.session.socket_accept_address = None;
    let err = run_acceptor(&config).await.unwrap_err();
    assert!(err.to_string().contains("socket_accept_address"), "{err:#}");
}
