use crate::{
    api::{ApiClient, ApiError},
    session::SessionToken,
};
use std::{future::Future, time::Duration};
use tracing::{error, warn};

pub const DEFAULT_VERIFY_TIMEOUT: Duration = Duration::from_secs(5);

/// Outcome of a single session check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    /// The backend accepted the session.
    Valid,
    /// The backend answered and rejected the session (401, 403, any non-2xx).
    Invalid,
    /// The backend could not be asked: connection refused, DNS failure,
    /// timeout, bad base URL.
    Unreachable,
}

impl Verification {
    #[must_use]
    pub const fn is_valid(self) -> bool {
        matches!(self, Self::Valid)
    }
}

/// Checks whether a session token is currently valid.
///
/// Implementations make at most one attempt per call and never fail: every
/// error is folded into [`Verification`].
pub trait SessionVerifier: Send + Sync {
    fn verify(&self, token: &SessionToken) -> impl Future<Output = Verification> + Send;
}

/// Verifier backed by the auth status endpoint.
#[derive(Debug, Clone)]
pub struct HttpSessionVerifier {
    client: ApiClient,
    timeout: Duration,
}

impl HttpSessionVerifier {
    #[must_use]
    pub const fn new(client: ApiClient, timeout: Duration) -> Self {
        Self { client, timeout }
    }
}

impl SessionVerifier for HttpSessionVerifier {
    async fn verify(&self, token: &SessionToken) -> Verification {
        match self.client.check_status(token, Some(self.timeout)).await {
            Ok(()) => Verification::Valid,
            Err(err @ (ApiError::Unauthorized { .. } | ApiError::Status(_))) => {
                warn!("Session rejected: {}", err);
                Verification::Invalid
            }
            Err(err) => {
                error!(
                    "Session verifier unreachable at {}{}: {}",
                    self.client.base_url(),
                    self.client.status_path(),
                    err
                );
                Verification::Unreachable
            }
        }
    }
}
