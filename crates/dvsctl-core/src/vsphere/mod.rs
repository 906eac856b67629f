//! vSphere collaborator over the VI/JSON API
//!
//! [`VsphereClient`] holds endpoint and credentials, [`Session`] is the
//! authenticated handle that submits and refreshes switch tasks.

pub mod client;
pub mod session;
pub mod types;

pub use client::{
    DEFAULT_API_RELEASE, DEFAULT_PORT, DEFAULT_REQUEST_TIMEOUT, VsphereClient, VsphereClientBuilder,
};
pub use session::Session;

use crate::error::{CoreError, Result};
use std::future::Future;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Log in, run `f` with the session, then log out.
///
/// Logout happens whether `f` succeeds or fails. A failed logout is only
/// logged; the result of `f` is what the caller gets.
pub async fn with_session<T, F, Fut>(client: &VsphereClient, f: F) -> Result<T>
where
    F: FnOnce(Session) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    with_session_until(client, &CancellationToken::new(), f).await
}

/// [`with_session`] that gives up with [`CoreError::Cancelled`] once `cancel` fires.
///
/// Login and the work in `f` are both raced against the token. A session
/// that was established is logged out either way.
pub async fn with_session_until<T, F, Fut>(
    client: &VsphereClient,
    cancel: &CancellationToken,
    f: F,
) -> Result<T>
where
    F: FnOnce(Session) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let session = tokio::select! {
        biased;
        session = client.login() => session?,
        _ = cancel.cancelled() => {
            debug!("Cancelled before login completed");
            return Err(CoreError::Cancelled);
        }
    };

    let work = f(session.clone());
    let result = tokio::select! {
        biased;
        result = work => result,
        _ = cancel.cancelled() => {
            debug!("Cancellation requested, abandoning wait");
            Err(CoreError::Cancelled)
        }
    };

    if let Err(e) = session.logout().await {
        warn!("Logout failed: {}", e);
    }
    result
}
