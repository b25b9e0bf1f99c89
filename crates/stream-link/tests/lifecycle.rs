mod common;

use async_trait::async_trait;
use common::{endpoint, link, next_matching, transitions};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use stream_link::{AuthConfig, AuthError, ConnectionState, CredentialProvider, LinkConfig, LinkError, LinkEvent};
use stream_transport::{Credential, Endpoint, Frame, InMemTransport, Script, TransportError};
use tokio::time::Instant;

use ConnectionState::*;

fn handshake_error() -> Script {
	Script::Reject(TransportError::Handshake("connection refused".into()))
}

#[derive(Default)]
struct RotatingTokens {
	gets: AtomicUsize,
	refreshes: AtomicUsize,
}

#[async_trait]
impl CredentialProvider for RotatingTokens {
	async fn get_credential(&self) -> Result<Credential, AuthError> {
		self.gets.fetch_add(1, Ordering::SeqCst);
		Ok(Credential::bearer("initial"))
	}

	async fn refresh_credential(&self) -> Result<Credential, AuthError> {
		let n = self.refreshes.fetch_add(1, Ordering::SeqCst) + 1;
		Ok(Credential::bearer(format!("refreshed-{n}")))
	}
}

struct BrokenProvider;

#[async_trait]
impl CredentialProvider for BrokenProvider {
	async fn get_credential(&self) -> Result<Credential, AuthError> {
		Err(AuthError::Unavailable("auth service down".into()))
	}
}

struct ExpiredThenFresh {
	refreshes: AtomicUsize,
}

#[async_trait]
impl CredentialProvider for ExpiredThenFresh {
	async fn get_credential(&self) -> Result<Credential, AuthError> {
		Err(AuthError::Expired)
	}

	async fn refresh_credential(&self) -> Result<Credential, AuthError> {
		self.refreshes.fetch_add(1, Ordering::SeqCst);
		Ok(Credential::bearer("fresh"))
	}
}

#[tokio::test(start_paused = true)]
async fn test_two_failures_then_open() {
	let transport = InMemTransport::new();
	transport.script([handshake_error(), handshake_error(), Script::Accept]);

	let link = link(&transport, LinkConfig::default());
	let mut events = link.subscribe();
	let started = Instant::now();

	link.connect(endpoint(), AuthConfig::None).await.unwrap();
	link.wait_for_state(Connected).await.unwrap();

	assert!(started.elapsed() >= Duration::from_millis(3000));
	assert_eq!(transport.open_count(), 3);

	let history = link.reconnect_history().await.unwrap();
	let delays: Vec<_> = history.iter().map(|a| a.delay).collect();
	assert_eq!(delays, vec![Duration::from_millis(1000), Duration::from_millis(2000)]);
	assert!(history.iter().all(|a| a.fired_at.is_some()));

	let info = link.connection_info().await.unwrap();
	assert_eq!(info.state, Connected);
	assert_eq!(info.reconnect_attempts, 0);

	assert_eq!(
		transitions(&mut events),
		vec![
			(Disconnected, Connecting),
			(Connecting, Error),
			(Error, Reconnecting),
			(Reconnecting, Error),
			(Error, Reconnecting),
			(Reconnecting, Connected),
		]
	);
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_attempts_report_connection_lost() {
	let transport = InMemTransport::new();
	transport.script([handshake_error(), handshake_error(), handshake_error()]);

	let link = link(&transport, LinkConfig::default().with_retry(2, 1000, None));
	let mut events = link.subscribe();

	link.connect(endpoint(), AuthConfig::None).await.unwrap();

	let (attempts, reason) = next_matching(&mut events, |event| match event {
		LinkEvent::ConnectionLost { attempts, reason } => Some((attempts, reason)),
		_ => None,
	})
	.await;

	assert_eq!(attempts, 2);
	assert!(reason.contains("connection refused"));
	assert_eq!(link.state(), Disconnected);
	assert_eq!(transport.open_count(), 3);

	// No silent retries after the terminal report.
	tokio::time::sleep(Duration::from_secs(60)).await;
	assert_eq!(transport.open_count(), 3);
	assert_eq!(link.state(), Disconnected);
}

#[tokio::test(start_paused = true)]
async fn test_connect_timeout_enters_reconnect_path() {
	let transport = InMemTransport::new();
	transport.script([Script::Hang, Script::Accept]);

	let link = link(&transport, LinkConfig::default().with_connect_timeout(2000));
	let started = Instant::now();

	link.connect(endpoint(), AuthConfig::None).await.unwrap();
	link.wait_for_state(Connected).await.unwrap();

	assert!(started.elapsed() >= Duration::from_millis(3000));
	let info = link.connection_info().await.unwrap();
	assert!(info.last_error.unwrap().contains("timed out"));
	assert_eq!(link.reconnect_history().await.unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_new_connect_replaces_attempt_in_flight() {
	let transport = InMemTransport::new();
	transport.script([Script::AcceptAfter(Duration::from_secs(5)), Script::Accept]);

	let link = link(&transport, LinkConfig::default());
	let mut events = link.subscribe();

	link.connect(Endpoint::new("mem://first"), AuthConfig::None).await.unwrap();
	link.connect(Endpoint::new("mem://second"), AuthConfig::None).await.unwrap();
	link.wait_for_state(Connected).await.unwrap();

	// Long after the first handshake would have finished.
	tokio::time::sleep(Duration::from_secs(10)).await;

	let info = link.connection_info().await.unwrap();
	assert_eq!(info.state, Connected);
	assert_eq!(info.endpoint, Some(Endpoint::new("mem://second")));

	let peer = transport.next_peer().await.unwrap();
	assert_eq!(peer.request().endpoint.url, "mem://second");

	assert_eq!(
		transitions(&mut events),
		vec![(Disconnected, Connecting), (Connecting, Error), (Error, Disconnected), (Disconnected, Connecting), (Connecting, Connected),]
	);
}

#[tokio::test(start_paused = true)]
async fn test_unauthorized_handshake_refreshes_once() {
	let transport = InMemTransport::new();
	transport.script([Script::Reject(TransportError::Unauthorized("ticket expired".into())), Script::Accept]);

	let provider = Arc::new(RotatingTokens::default());
	let link = link(&transport, LinkConfig::default());

	link.connect(endpoint(), AuthConfig::Provider(provider.clone())).await.unwrap();
	link.wait_for_state(Connected).await.unwrap();

	assert_eq!(provider.gets.load(Ordering::SeqCst), 1);
	assert_eq!(provider.refreshes.load(Ordering::SeqCst), 1);
	assert!(link.reconnect_history().await.unwrap().is_empty());

	let requests = transport.requests();
	assert_eq!(requests[0].credential, Some(Credential::bearer("initial")));
	assert_eq!(requests[1].credential, Some(Credential::bearer("refreshed-1")));
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_uses_refreshed_credential() {
	let transport = InMemTransport::new();
	let provider = Arc::new(RotatingTokens::default());
	let link = link(&transport, LinkConfig::default());

	link.connect(endpoint(), AuthConfig::Provider(provider.clone())).await.unwrap();
	link.wait_for_state(Connected).await.unwrap();

	let peer = transport.next_peer().await.unwrap();
	peer.fail(TransportError::Io("connection reset".into())).await.unwrap();

	link.wait_for_state(Reconnecting).await.unwrap();
	link.wait_for_state(Connected).await.unwrap();

	let requests = transport.requests();
	assert_eq!(requests.len(), 2);
	assert_eq!(requests[1].credential, Some(Credential::bearer("refreshed-1")));
	assert!(peer.is_closed());
}

#[tokio::test(start_paused = true)]
async fn test_credential_failure_is_an_error_transition() {
	let transport = InMemTransport::new();
	let link = link(&transport, LinkConfig::default().with_retry(1, 500, None));
	let mut events = link.subscribe();

	link.connect(endpoint(), AuthConfig::provider(BrokenProvider)).await.unwrap();

	let reason = next_matching(&mut events, |event| match event {
		LinkEvent::ConnectionLost { reason, .. } => Some(reason),
		_ => None,
	})
	.await;

	assert!(reason.contains("auth service down"));
	assert_eq!(transport.open_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_send_is_gated_on_connected() {
	let transport = InMemTransport::new();
	transport.push(Script::AcceptAfter(Duration::from_millis(200)));
	let link = link(&transport, LinkConfig::default());

	assert!(!link.send(Frame::text("too early")).await);

	link.connect(endpoint(), AuthConfig::None).await.unwrap();
	assert_eq!(link.state(), Connecting);
	assert!(!link.send(Frame::text("still connecting")).await);

	link.wait_for_state(Connected).await.unwrap();
	let mut peer = transport.next_peer().await.unwrap();
	assert!(link.send(Frame::text("hello")).await);
	assert_eq!(peer.next_outbound().await, Some(Frame::text("hello")));

	link.close().await.unwrap();
	assert_eq!(link.state(), Disconnected);
	assert!(!link.send(Frame::text("after close")).await);
	assert!(peer.is_closed());
}

#[tokio::test(start_paused = true)]
async fn test_close_stops_reconnecting() {
	let transport = InMemTransport::new();
	transport.push(handshake_error());
	let link = link(&transport, LinkConfig::default());
	let mut events = link.subscribe();

	link.connect(endpoint(), AuthConfig::None).await.unwrap();
	link.wait_for_state(Reconnecting).await.unwrap();
	link.close().await.unwrap();

	tokio::time::sleep(Duration::from_secs(30)).await;
	assert_eq!(link.state(), Disconnected);
	assert_eq!(transport.open_count(), 1);

	let seen = transitions(&mut events);
	assert_eq!(seen.last(), Some(&(Error, Disconnected)));
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_makes_handles_unavailable() {
	let transport = InMemTransport::new();
	let link = link(&transport, LinkConfig::default());
	let other = link.clone();

	link.shutdown().await;

	assert!(matches!(other.metrics().await, Err(LinkError::ActorUnavailable)));
	assert!(!other.send(Frame::text("x")).await);
}

#[tokio::test(start_paused = true)]
async fn test_transition_history_matches_committed_order() {
	let transport = InMemTransport::new();
	let link = link(&transport, LinkConfig::default());

	link.connect(endpoint(), AuthConfig::None).await.unwrap();
	link.wait_for_state(Connected).await.unwrap();
	link.close().await.unwrap();

	let steps: Vec<_> = link.transition_history().await.unwrap().into_iter().map(|r| (r.from, r.to)).collect();
	assert_eq!(steps, vec![(Disconnected, Connecting), (Connecting, Connected), (Connected, Disconnected)]);
}

#[test]
fn test_invalid_config_is_rejected() {
	let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
	runtime.block_on(async {
		let transport = InMemTransport::new();
		let result = stream_link::ConnectionManager::new(Arc::new(transport), LinkConfig::default().with_buffer_capacity(0));
		assert!(matches!(result, Err(LinkError::Config(_))));
	});
}

#[tokio::test(start_paused = true)]
async fn test_failed_credential_is_refreshed_before_giving_up() {
	let transport = InMemTransport::new();
	let provider = Arc::new(ExpiredThenFresh { refreshes: AtomicUsize::new(0) });
	let link = link(&transport, LinkConfig::default().with_retry(0, 1000, None));

	link.connect(endpoint(), AuthConfig::Provider(provider.clone())).await.unwrap();
	link.wait_for_state(Connected).await.unwrap();

	assert_eq!(provider.refreshes.load(Ordering::SeqCst), 1);
	assert_eq!(transport.open_count(), 1);
	assert_eq!(transport.requests()[0].credential, Some(Credential::bearer("fresh")));
	assert!(link.reconnect_history().await.unwrap().is_empty());
	assert_eq!(link.connection_info().await.unwrap().last_error, None);
}
