//! oidc provider client.
//!
//! wraps the openidconnect client for the three operations the login
//! bridge needs: building the authorization url, exchanging the code for
//! an id token, and verifying an id token into user claims. the raw id
//! token travels through the tailnet-selection form and is re-verified on
//! submit, so verification here is stateless.

use openidconnect::{
    AuthenticationFlow, AuthorizationCode, ClientId, ClientSecret, CsrfToken, EndpointMaybeSet,
    EndpointNotSet, EndpointSet, IssuerUrl, Nonce, RedirectUrl, Scope, TokenResponse,
    core::{CoreClient, CoreIdToken, CoreIdTokenVerifier, CoreProviderMetadata, CoreResponseType},
};
use thiserror::Error;
use url::Url;

use wirefire_types::{OidcConfig, UserClaims};

/// errors from the oidc bridge.
#[derive(Debug, Error)]
pub enum OidcError {
    /// provider discovery or client construction failed.
    #[error("oidc discovery failed: {0}")]
    Discovery(String),

    /// the code exchange failed or returned no id token.
    #[error("failed to exchange code: {0}")]
    Exchange(String),

    /// the id token failed verification.
    #[error("failed to verify token: {0}")]
    Verify(String),
}

/// client for the configured oidc provider.
pub struct OidcClient {
    provider_metadata: CoreProviderMetadata,
    client_id: ClientId,
    client_secret: ClientSecret,
    redirect_url: RedirectUrl,
    http_client: openidconnect::reqwest::Client,
}

impl OidcClient {
    /// discover the provider and build a client.
    ///
    /// the provider must serve /.well-known/openid-configuration.
    pub async fn discover(config: &OidcConfig, base_url: &Url) -> Result<Self, OidcError> {
        // redirects are disabled to keep the token endpoint exchange pinned
        // to the discovered urls
        let http_client = openidconnect::reqwest::ClientBuilder::new()
            .redirect(openidconnect::reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| OidcError::Discovery(e.to_string()))?;

        let issuer_url = IssuerUrl::new(config.provider.clone())
            .map_err(|e| OidcError::Discovery(e.to_string()))?;

        let redirect_url = base_url
            .join("/oidc/callback")
            .map_err(|e| OidcError::Discovery(e.to_string()))
            .and_then(|u| {
                RedirectUrl::new(u.to_string()).map_err(|e| OidcError::Discovery(e.to_string()))
            })?;

        let provider_metadata = CoreProviderMetadata::discover_async(issuer_url, &http_client)
            .await
            .map_err(|e| OidcError::Discovery(e.to_string()))?;

        Ok(Self {
            provider_metadata,
            client_id: ClientId::new(config.client_id.clone()),
            client_secret: ClientSecret::new(config.client_secret.clone()),
            redirect_url,
            http_client,
        })
    }

    fn client(
        &self,
    ) -> CoreClient<
        EndpointSet,
        EndpointNotSet,
        EndpointNotSet,
        EndpointNotSet,
        EndpointMaybeSet,
        EndpointMaybeSet,
    > {
        CoreClient::from_provider_metadata(
            self.provider_metadata.clone(),
            self.client_id.clone(),
            Some(self.client_secret.clone()),
        )
        .set_redirect_uri(self.redirect_url.clone())
    }

    /// the provider's authorization url carrying `flow` as the oauth state.
    pub fn auth_code_url(&self, flow: &str) -> String {
        let flow = flow.to_string();
        let (url, _state, _nonce) = self
            .client()
            .authorize_url(
                AuthenticationFlow::<CoreResponseType>::AuthorizationCode,
                move || CsrfToken::new(flow),
                Nonce::new_random,
            )
            .add_scope(Scope::new("profile".to_string()))
            .add_scope(Scope::new("email".to_string()))
            .url();
        url.to_string()
    }

    /// exchange an authorization code for the raw id token.
    pub async fn exchange(&self, code: String) -> Result<String, OidcError> {
        let response = self
            .client()
            .exchange_code(AuthorizationCode::new(code))
            .map_err(|e| OidcError::Exchange(e.to_string()))?
            .request_async(&self.http_client)
            .await
            .map_err(|e| OidcError::Exchange(e.to_string()))?;

        let id_token = response
            .id_token()
            .ok_or_else(|| OidcError::Exchange("id_token is empty".to_string()))?;

        raw_jwt(id_token)
    }

    /// verify a raw id token and extract the standard claims.
    pub fn verify(&self, raw: &str) -> Result<UserClaims, OidcError> {
        let id_token: CoreIdToken =
            serde_json::from_value(serde_json::Value::String(raw.to_string()))
                .map_err(|e| OidcError::Verify(e.to_string()))?;

        let verifier = CoreIdTokenVerifier::new_confidential_client(
            self.client_id.clone(),
            self.client_secret.clone(),
            self.provider_metadata.issuer().clone(),
            self.provider_metadata.jwks().clone(),
        );

        // the id token is carried through an html form and re-verified on
        // submit; nonce binding is not part of this flow
        let claims = id_token
            .claims(&verifier, |_: Option<&Nonce>| Ok(()))
            .map_err(|e| OidcError::Verify(e.to_string()))?;

        serde_json::to_value(claims)
            .and_then(serde_json::from_value::<UserClaims>)
            .map_err(|e| OidcError::Verify(e.to_string()))
    }
}

/// serialize an id token back to its compact jwt form.
fn raw_jwt(token: &CoreIdToken) -> Result<String, OidcError> {
    match serde_json::to_value(token) {
        Ok(serde_json::Value::String(raw)) => Ok(raw),
        Ok(_) => Err(OidcError::Exchange("unexpected id_token encoding".to_string())),
        Err(e) => Err(OidcError::Exchange(e.to_string())),
    }
}
