//! Process-level behavior, exercised through the real binary
//!
//! - Missing configuration
//! - Unreadable TLS trust bundle
//! - Broker that never answers
//! - Clean exit on SIGTERM/SIGINT

use std::collections::HashMap;
use std::process::{Command, Output};
use std::time::{Duration, Instant};

use pretty_assertions::assert_eq;
use vnstat_agent::error::{EXIT_CONFIG, EXIT_CONNECT, EXIT_TLS};

use crate::helpers::test_env;

fn run_agent(env: &HashMap<&'static str, String>) -> Output {
    let workdir = tempfile::tempdir().unwrap();
    Command::new(env!("CARGO_BIN_EXE_vnstat-agent"))
        .env_clear()
        .envs(env.iter().map(|(k, v)| (*k, v.as_str())))
        .current_dir(workdir.path())
        .output()
        .unwrap()
}

#[test]
fn test_missing_interface_exits_with_config_code() {
    let mut env = test_env();
    env.remove("VNSTAT_INTERFACE");
    // a connection attempt would take the full timeout against this address
    env.insert("MQTT_HOST", "192.0.2.1".to_string());

    let started = Instant::now();
    let output = run_agent(&env);

    assert_eq!(output.status.code(), Some(EXIT_CONFIG as i32));
    assert!(started.elapsed() < Duration::from_secs(2));

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("VNSTAT_INTERFACE"),
        "diagnostic should name the variable: {stderr}"
    );
}

#[test]
fn test_missing_broker_password_exits_with_config_code() {
    let mut env = test_env();
    env.remove("MQTT_PASSWORD");

    let output = run_agent(&env);

    assert_eq!(output.status.code(), Some(EXIT_CONFIG as i32));
}

#[test]
fn test_unreadable_ca_bundle_exits_with_tls_code() {
    let mut env = test_env();
    env.insert("MQTT_SSL_PATH", "/nonexistent/ca.pem".to_string());

    let output = run_agent(&env);

    assert_eq!(output.status.code(), Some(EXIT_TLS as i32));
}

#[test]
fn test_silent_broker_exits_after_connect_timeout() {
    // bound but never accepted: the TCP handshake completes, TLS never does
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let mut env = test_env();
    env.insert("MQTT_HOST", "127.0.0.1".to_string());
    env.insert("MQTT_PORT", port.to_string());

    let started = Instant::now();
    let output = run_agent(&env);
    let elapsed = started.elapsed();

    assert_eq!(output.status.code(), Some(EXIT_CONNECT as i32));
    assert!(elapsed >= Duration::from_secs(2), "exited too early: {elapsed:?}");
    assert!(elapsed < Duration::from_secs(10), "exited too late: {elapsed:?}");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("did not acknowledge"), "unexpected output: {stderr}");

    drop(listener);
}

#[cfg(unix)]
async fn assert_signal_exits_cleanly(signal: &str) {
    use std::process::Stdio;

    use crate::broker::{CONNECT, DISCONNECT, FakeBroker};

    let broker = FakeBroker::start(0).await;
    let workdir = tempfile::tempdir().unwrap();

    let mut env = test_env();
    env.insert("MQTT_HOST", "127.0.0.1".to_string());
    env.insert("MQTT_PORT", broker.port.to_string());

    let child = tokio::process::Command::new(env!("CARGO_BIN_EXE_vnstat-agent"))
        .env_clear()
        .envs(env.iter().map(|(k, v)| (*k, v.as_str())))
        .current_dir(workdir.path())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .unwrap();
    let pid = child.id().unwrap();

    assert!(broker.wait_for(CONNECT).await, "agent never connected");
    // give the agent time to start listening for signals after the CONNACK
    tokio::time::sleep(Duration::from_millis(500)).await;

    let sent = Command::new("kill")
        .args([signal, &pid.to_string()])
        .status()
        .unwrap();
    assert!(sent.success());

    let output = tokio::time::timeout(Duration::from_secs(5), child.wait_with_output())
        .await
        .expect("agent did not exit after signal")
        .unwrap();

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert_eq!(output.status.code(), Some(0), "{signal}: {stderr}");
    assert!(broker.wait_for(DISCONNECT).await, "{signal}: no disconnect sent");
    assert_eq!(broker.count(DISCONNECT), 1);
}

#[cfg(unix)]
#[tokio::test]
async fn test_sigterm_disconnects_and_exits_zero() {
    assert_signal_exits_cleanly("-TERM").await;
}

#[cfg(unix)]
#[tokio::test]
async fn test_sigint_disconnects_and_exits_zero() {
    assert_signal_exits_cleanly("-INT").await;
}
