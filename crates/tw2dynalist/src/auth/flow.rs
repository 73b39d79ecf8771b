//! Interactive token acquisition.

use std::time::Duration;

use notify::{Notifier, NotifyEvent};
use tracing::{info, instrument, warn};

use super::callback::CallbackRegistry;
use super::oauth::{OAuthClient, Token};
use super::pkce::{random_state, PkceChallenge};
use super::AuthError;

/// How long to wait for the user to complete the browser step.
pub const AUTHORIZATION_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Run the authorization-code flow with PKCE.
///
/// Logs (and notifies) the authorization URL, waits for the `/callback`
/// redirect delivered through `callbacks`, and exchanges the code. The HTTP
/// server serving `/callback` must already be running.
#[instrument(skip_all)]
pub async fn authorize(
    client: &OAuthClient,
    callbacks: &CallbackRegistry,
    notifier: &Notifier,
    timeout: Duration,
) -> Result<Token, AuthError> {
    let pkce = PkceChallenge::generate();
    let state = random_state();
    let url = client.authorize_url(&state, &pkce)?;

    let pending = callbacks.register(state);

    warn!("No valid token found, authorization required");
    info!(url = %url, "Open this URL in a browser to authorize the application");
    info!(
        redirect_url = %client.config().redirect_url,
        timeout_secs = timeout.as_secs(),
        "Waiting for OAuth callback"
    );
    notifier.notify(NotifyEvent::authorization_required(url.as_str()));

    let code = pending.wait(timeout).await?;
    client.exchange_code(&code, pkce.verifier()).await
}
