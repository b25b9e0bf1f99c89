use crate::error::AuthError;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use stream_transport::Credential;

/// Source of credentials for opening a connection.
///
/// `get_credential` is used for a fresh `connect`. `refresh_credential` is
/// used on every reconnect and once after the server rejects a handshake as
/// unauthorized. Ticket providers should hand out a new ticket on each call.
#[async_trait]
pub trait CredentialProvider: Send + Sync + 'static {
	async fn get_credential(&self) -> Result<Credential, AuthError>;

	async fn refresh_credential(&self) -> Result<Credential, AuthError> {
		self.get_credential().await
	}
}

#[derive(Clone, Default)]
pub enum AuthConfig {
	#[default]
	None,
	Provider(Arc<dyn CredentialProvider>),
}

impl AuthConfig {
	pub fn provider<P: CredentialProvider>(provider: P) -> Self {
		Self::Provider(Arc::new(provider))
	}

	pub fn bearer(token: impl Into<String>) -> Self {
		Self::provider(StaticToken::new(token))
	}

	pub(crate) async fn acquire(&self, refresh: bool) -> Result<Option<Credential>, AuthError> {
		match self {
			Self::None => Ok(None),
			Self::Provider(provider) if refresh => provider.refresh_credential().await.map(Some),
			Self::Provider(provider) => provider.get_credential().await.map(Some),
		}
	}
}

impl fmt::Debug for AuthConfig {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::None => f.write_str("AuthConfig::None"),
			Self::Provider(_) => f.write_str("AuthConfig::Provider(..)"),
		}
	}
}

/// A bearer token that never changes.
#[derive(Clone)]
pub struct StaticToken {
	token: String,
}

impl StaticToken {
	pub fn new(token: impl Into<String>) -> Self {
		Self { token: token.into() }
	}
}

#[async_trait]
impl CredentialProvider for StaticToken {
	async fn get_credential(&self) -> Result<Credential, AuthError> {
		if self.token.is_empty() {
			return Err(AuthError::Invalid("empty bearer token".into()));
		}
		Ok(Credential::bearer(self.token.clone()))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::atomic::{AtomicUsize, Ordering};

	#[derive(Default)]
	struct Counting {
		gets: AtomicUsize,
		refreshes: AtomicUsize,
	}

	#[async_trait]
	impl CredentialProvider for Counting {
		async fn get_credential(&self) -> Result<Credential, AuthError> {
			self.gets.fetch_add(1, Ordering::SeqCst);
			Ok(Credential::ticket("t-get"))
		}

		async fn refresh_credential(&self) -> Result<Credential, AuthError> {
			self.refreshes.fetch_add(1, Ordering::SeqCst);
			Ok(Credential::ticket("t-refresh"))
		}
	}

	#[tokio::test]
	async fn test_acquire_routes_to_get_or_refresh() {
		let provider = Arc::new(Counting::default());
		let auth = AuthConfig::Provider(provider.clone());

		auth.acquire(false).await.unwrap();
		auth.acquire(true).await.unwrap();
		auth.acquire(true).await.unwrap();

		assert_eq!(provider.gets.load(Ordering::SeqCst), 1);
		assert_eq!(provider.refreshes.load(Ordering::SeqCst), 2);
	}

	#[tokio::test]
	async fn test_none_yields_no_credential() {
		assert_eq!(AuthConfig::None.acquire(true).await, Ok(None));
	}

	#[tokio::test]
	async fn test_static_token() {
		let credential = AuthConfig::bearer("abc").acquire(false).await.unwrap();
		assert_eq!(credential, Some(Credential::bearer("abc")));

		let err = AuthConfig::bearer("").acquire(true).await.unwrap_err();
		assert!(matches!(err, AuthError::Invalid(_)));
	}
}
