//! Agent lifecycle: scheduled ticks, shutdown protocol

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use pretty_assertions::assert_eq;
use tokio::sync::oneshot;
use vnstat_agent::TrafficSample;
use vnstat_agent::lifecycle::Agent;
use vnstat_agent::source::SourceError;

use crate::helpers::*;

fn shutdown_pair() -> (oneshot::Sender<()>, impl Future<Output = ()> + Send + 'static) {
    let (tx, rx) = oneshot::channel::<()>();
    (tx, async move {
        let _ = rx.await;
    })
}

#[tokio::test]
async fn test_ticks_publish_derived_metric() {
    let source = Arc::new(MockSource::returning(Ok(TrafficSample::new(
        1_000_000_000,
        1_000_000_000,
    ))));
    let publisher = Arc::new(MockPublisher::new());
    let (stop, shutdown) = shutdown_pair();

    let agent = Agent::new(source.clone(), publisher.clone(), &test_config())
        .with_interval(Duration::from_millis(20));
    let running = tokio::spawn(agent.run_until(shutdown));

    tokio::time::sleep(Duration::from_millis(110)).await;
    stop.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(2), running)
        .await
        .expect("agent did not exit")
        .unwrap();

    let published = publisher.published();
    assert!(published.len() >= 2, "expected several ticks, got {}", published.len());
    for (topic, payload) in published {
        assert_eq!(topic, "t/1");
        assert_eq!(payload, "          0.250000");
    }
}

#[tokio::test]
async fn test_empty_series_skips_publish_and_keeps_running() {
    let source = Arc::new(MockSource::returning(Err(SourceError::MalformedOutput(
        "no month entries".to_string(),
    ))));
    let publisher = Arc::new(MockPublisher::new());
    let (stop, shutdown) = shutdown_pair();

    let agent = Agent::new(source.clone(), publisher.clone(), &test_config())
        .with_interval(Duration::from_millis(20));
    let running = tokio::spawn(agent.run_until(shutdown));

    tokio::time::sleep(Duration::from_millis(110)).await;
    assert!(!running.is_finished(), "agent stopped after a malformed tick");
    assert!(source.calls() >= 2);
    assert_eq!(publisher.publish_attempts.load(Ordering::SeqCst), 0);

    stop.send(()).unwrap();
    running.await.unwrap();
}

#[tokio::test]
async fn test_publish_failures_do_not_stop_ticks() {
    let source = Arc::new(MockSource::returning(Ok(TrafficSample::new(1, 1))));
    let publisher = Arc::new(MockPublisher::failing());
    let (stop, shutdown) = shutdown_pair();

    let agent = Agent::new(source.clone(), publisher.clone(), &test_config())
        .with_interval(Duration::from_millis(20));
    let running = tokio::spawn(agent.run_until(shutdown));

    tokio::time::sleep(Duration::from_millis(110)).await;
    assert!(!running.is_finished());
    assert!(publisher.publish_attempts.load(Ordering::SeqCst) >= 2);

    stop.send(()).unwrap();
    running.await.unwrap();
}

#[tokio::test]
async fn test_shutdown_disconnects_exactly_once() {
    let source = Arc::new(MockSource::returning(Ok(TrafficSample::new(1, 1))));
    let publisher = Arc::new(MockPublisher::new());
    let (stop, shutdown) = shutdown_pair();

    let agent = Agent::new(source, publisher.clone(), &test_config())
        .with_interval(Duration::from_secs(30));
    let running = tokio::spawn(agent.run_until(shutdown));

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(publisher.disconnects(), 0);

    stop.send(()).unwrap();
    running.await.unwrap();

    assert_eq!(publisher.disconnects(), 1);
}

#[tokio::test]
async fn test_signal_mid_tick_still_exits_after_disconnect() {
    let source = Arc::new(
        MockSource::returning(Ok(TrafficSample::new(1, 1))).with_delay(Duration::from_millis(300)),
    );
    let publisher = Arc::new(MockPublisher::new());
    let (stop, shutdown) = shutdown_pair();

    let agent = Agent::new(source.clone(), publisher.clone(), &test_config())
        .with_interval(Duration::from_millis(20));
    let running = tokio::spawn(agent.run_until(shutdown));

    // first tick fires at 20ms and is now blocked inside the source
    tokio::time::sleep(Duration::from_millis(80)).await;
    assert_eq!(source.calls(), 1);
    assert_eq!(source.completed.load(Ordering::SeqCst), 0);

    stop.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(2), running)
        .await
        .expect("agent did not exit")
        .unwrap();

    assert_eq!(publisher.disconnects(), 1);
}

#[tokio::test]
async fn test_tick_after_disconnect_is_not_delivered() {
    let source = Arc::new(
        MockSource::returning(Ok(TrafficSample::new(1, 1))).with_delay(Duration::from_millis(100)),
    );
    let publisher = Arc::new(MockPublisher::new());
    let (stop, shutdown) = shutdown_pair();

    let agent = Agent::new(source.clone(), publisher.clone(), &test_config())
        .with_interval(Duration::from_millis(20));
    let running = tokio::spawn(agent.run_until(shutdown));

    tokio::time::sleep(Duration::from_millis(50)).await;
    stop.send(()).unwrap();
    running.await.unwrap();

    // let the in-flight tick finish against the closed publisher
    tokio::time::sleep(Duration::from_millis(150)).await;

    assert!(publisher.published().is_empty());
    assert_eq!(publisher.disconnects(), 1);
}

#[cfg(unix)]
#[tokio::test]
async fn test_vnstat_output_to_payload() {
    use std::os::unix::fs::PermissionsExt;
    use vnstat_agent::source::VnstatSource;

    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("vnstat");
    std::fs::write(
        &script,
        "#!/bin/sh\necho '{\"interfaces\":[{\"traffic\":{\"month\":[{\"rx\":1000000000,\"tx\":1000000000}]}}]}'\n",
    )
    .unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

    let publisher = Arc::new(MockPublisher::new());
    let (stop, shutdown) = shutdown_pair();

    let agent = Agent::new(
        Arc::new(VnstatSource::new(&script)),
        publisher.clone(),
        &test_config(),
    )
    .with_interval(Duration::from_millis(20));
    let running = tokio::spawn(agent.run_until(shutdown));

    for _ in 0..100 {
        if !publisher.published().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    stop.send(()).unwrap();
    running.await.unwrap();

    assert_eq!(
        publisher.published().first(),
        Some(&("t/1".to_string(), "          0.250000".to_string()))
    );
}
