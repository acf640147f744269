//! Connect-timeout tests for the session state machine.
//!
//! Uses a paused Tokio clock: `sleep_until` resolves as soon as the
//! runtime has nothing else to do, so deadlines are deterministic.

use std::time::Duration;

use critcast_session::{Credentials, SessionError, SessionState, SessionStateMachine};
use tokio::time::{self, Instant};

fn creds() -> Credentials {
    Credentials::new("key-1", "table-1")
}

#[tokio::test(start_paused = true)]
async fn test_wait_for_timeout_fires_after_connect_timeout() {
    let mut machine = SessionStateMachine::new(Duration::from_secs(10));
    let start = Instant::now();
    let attempt = machine.connect(creds()).unwrap();

    let fired = machine.wait_for_timeout().await;

    assert_eq!(fired, attempt);
    assert!(start.elapsed() >= Duration::from_secs(10));
}

#[tokio::test(start_paused = true)]
async fn test_wait_for_timeout_pends_when_idle() {
    let machine = SessionStateMachine::default();
    let result = time::timeout(Duration::from_secs(60), machine.wait_for_timeout()).await;
    assert!(result.is_err(), "idle machine should never time out");
}

#[tokio::test(start_paused = true)]
async fn test_timeout_then_late_transport_connected_is_rejected() {
    let mut machine = SessionStateMachine::new(Duration::from_secs(10));
    let attempt = machine.connect(creds()).unwrap();

    let fired = machine.wait_for_timeout().await;
    machine.timed_out(fired).unwrap();
    // The transport completes after the deadline.
    time::advance(Duration::from_secs(1)).await;
    let late = machine.transport_connected(attempt);

    assert_eq!(late, Err(SessionError::StaleAttempt(attempt)));
    assert_eq!(machine.state(), &SessionState::Failed("timeout".into()));
}

#[tokio::test(start_paused = true)]
async fn test_connected_before_deadline_disarms_timeout() {
    let mut machine = SessionStateMachine::new(Duration::from_secs(10));
    let attempt = machine.connect(creds()).unwrap();

    time::advance(Duration::from_secs(3)).await;
    machine.transport_connected(attempt).unwrap();

    let result = time::timeout(Duration::from_secs(30), machine.wait_for_timeout()).await;
    assert!(result.is_err(), "connected session should not time out");
    assert!(machine.state().is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_during_connecting_cancels_timeout() {
    let mut machine = SessionStateMachine::new(Duration::from_secs(10));
    machine.connect(creds()).unwrap();

    assert!(machine.disconnect());

    let result = time::timeout(Duration::from_secs(30), machine.wait_for_timeout()).await;
    assert!(result.is_err());
    assert_eq!(machine.state(), &SessionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn test_stale_deadline_from_previous_attempt_is_ignored() {
    let mut machine = SessionStateMachine::new(Duration::from_secs(10));
    let first = machine.connect(creds()).unwrap();
    machine.transport_failed(first, "refused").unwrap();
    let second = machine.connect(creds()).unwrap();

    // A timeout reported for the first attempt changes nothing.
    assert_eq!(
        machine.timed_out(first),
        Err(SessionError::StaleAttempt(first))
    );
    assert_eq!(machine.state(), &SessionState::Connecting);

    let fired = machine.wait_for_timeout().await;
    assert_eq!(fired, second);
}

#[tokio::test(start_paused = true)]
async fn test_missing_credentials_never_arms_timeout() {
    let mut machine = SessionStateMachine::new(Duration::from_secs(1));

    let result = machine.connect(Credentials::new("", "table"));

    assert_eq!(result, Err(SessionError::MissingCredentials("api key")));
    assert_eq!(machine.state(), &SessionState::Idle);
    let waited = time::timeout(Duration::from_secs(5), machine.wait_for_timeout()).await;
    assert!(waited.is_err());
}
