use std::env;
use std::time::Duration;

/// Default ceiling for one call to the identity provider, in milliseconds.
const DEFAULT_UPSTREAM_TIMEOUT_MS: u64 = 2000;

/// AppConfig
///
/// Holds the gate's entire configuration state. Loaded once at startup and immutable
/// afterwards; cloned into the application state and pulled out via FromRef.
#[derive(Clone, Debug)]
pub struct AppConfig {
    // Runtime environment marker. Controls logging format and secret fallbacks.
    pub env: Env,
    // Tenant domain of the identity provider (e.g. "marketplace.eu.auth0.com").
    pub auth0_domain: String,
    // Client credentials used for the hosted login and the Management API.
    pub auth0_client_id: String,
    pub auth0_client_secret: String,
    // Secret used to sign and verify the `appSession` cookie.
    pub session_secret: String,
    // Key that access tokens are verified against.
    pub access_token_key: AccessTokenKey,
    // Expected `aud` of access tokens. When unset, audience is not checked.
    pub auth0_audience: Option<String>,
    // Public origin of the marketplace, used to build the login callback URL.
    pub app_base_url: String,
    // Optional JSON file overriding the built-in route tables.
    pub route_table_path: Option<String>,
    // Upper bound for any single identity-provider call made while serving a request.
    pub upstream_timeout_ms: u64,
    pub port: u16,
}

/// Env
///
/// Runtime context: pretty logs and development secrets locally, JSON logs and
/// mandatory secrets in production.
#[derive(Clone, PartialEq, Debug)]
pub enum Env {
    Local,
    Production,
}

/// AccessTokenKey
///
/// How access tokens are verified: the tenant's RSA public key (PEM) in
/// production, or a shared HMAC secret for local development and tests.
#[derive(Clone, PartialEq, Debug)]
pub enum AccessTokenKey {
    Secret(String),
    RsaPem(String),
}

impl Default for AppConfig {
    /// Safe, non-panicking configuration for tests.
    fn default() -> Self {
        Self {
            env: Env::Local,
            auth0_domain: "marketplace-dev.eu.auth0.com".to_string(),
            auth0_client_id: "local-client-id".to_string(),
            auth0_client_secret: "local-client-secret".to_string(),
            session_secret: "super-secure-test-session-secret-local".to_string(),
            access_token_key: AccessTokenKey::Secret(
                "super-secure-test-token-secret-local".to_string(),
            ),
            auth0_audience: None,
            app_base_url: "http://localhost:3000".to_string(),
            route_table_path: None,
            upstream_timeout_ms: DEFAULT_UPSTREAM_TIMEOUT_MS,
            port: 3000,
        }
    }
}

impl AppConfig {
    /// load
    ///
    /// Reads every parameter from environment variables.
    ///
    /// # Panics
    /// Panics in production when an identity-provider variable is missing, so the
    /// gate never starts with an incomplete or insecure configuration.
    pub fn load() -> Self {
        let env_str = env::var("APP_ENV").unwrap_or_else(|_| "local".to_string());
        let env = match env_str.as_str() {
            "production" => Env::Production,
            _ => Env::Local,
        };

        let port = env::var("PORT")
            .ok()
            .and_then(|p| p.parse::<u16>().ok())
            .unwrap_or(3000);
        let auth0_audience = env::var("AUTH0_AUDIENCE").ok().filter(|a| !a.is_empty());
        let route_table_path = env::var("ROUTE_TABLE_PATH").ok().filter(|p| !p.is_empty());
        let upstream_timeout_ms = env::var("UPSTREAM_TIMEOUT_MS")
            .ok()
            .and_then(|t| t.parse::<u64>().ok())
            .filter(|t| *t > 0)
            .unwrap_or(DEFAULT_UPSTREAM_TIMEOUT_MS);
        let token_public_key = env::var("AUTH0_TOKEN_PUBLIC_KEY")
            .ok()
            .filter(|k| !k.is_empty());

        match env {
            Env::Local => {
                let defaults = Self::default();
                Self {
                    env: Env::Local,
                    auth0_domain: env::var("AUTH0_DOMAIN").unwrap_or(defaults.auth0_domain),
                    auth0_client_id: env::var("AUTH0_CLIENT_ID")
                        .unwrap_or(defaults.auth0_client_id),
                    auth0_client_secret: env::var("AUTH0_CLIENT_SECRET")
                        .unwrap_or(defaults.auth0_client_secret),
                    session_secret: env::var("AUTH0_SECRET").unwrap_or(defaults.session_secret),
                    access_token_key: match token_public_key {
                        Some(pem) => AccessTokenKey::RsaPem(pem),
                        None => env::var("AUTH0_TOKEN_SECRET")
                            .map(AccessTokenKey::Secret)
                            .unwrap_or(defaults.access_token_key),
                    },
                    auth0_audience,
                    app_base_url: env::var("APP_BASE_URL").unwrap_or(defaults.app_base_url),
                    route_table_path,
                    upstream_timeout_ms,
                    port,
                }
            }
            Env::Production => Self {
                env: Env::Production,
                auth0_domain: env::var("AUTH0_DOMAIN")
                    .expect("FATAL: AUTH0_DOMAIN required in prod"),
                auth0_client_id: env::var("AUTH0_CLIENT_ID")
                    .expect("FATAL: AUTH0_CLIENT_ID required in prod"),
                auth0_client_secret: env::var("AUTH0_CLIENT_SECRET")
                    .expect("FATAL: AUTH0_CLIENT_SECRET required in prod"),
                session_secret: env::var("AUTH0_SECRET")
                    .expect("FATAL: AUTH0_SECRET must be set in production."),
                // The tenant signing key is preferred; a shared secret is accepted
                // for tenants that sign API tokens with HS256.
                access_token_key: match token_public_key {
                    Some(pem) => AccessTokenKey::RsaPem(pem),
                    None => AccessTokenKey::Secret(env::var("AUTH0_TOKEN_SECRET").expect(
                        "FATAL: AUTH0_TOKEN_PUBLIC_KEY or AUTH0_TOKEN_SECRET required in prod",
                    )),
                },
                auth0_audience,
                app_base_url: env::var("APP_BASE_URL")
                    .expect("FATAL: APP_BASE_URL required in prod"),
                route_table_path,
                upstream_timeout_ms,
                port,
            },
        }
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_millis(self.upstream_timeout_ms)
    }

    /// Where the hosted login sends the caller back: `{APP_BASE_URL}/auth/callback`.
    pub fn callback_url(&self) -> String {
        format!("{}/auth/callback", self.app_base_url.trim_end_matches('/'))
    }

    /// Cookies carry `Secure` when the marketplace is served over TLS.
    pub fn secure_cookies(&self) -> bool {
        self.app_base_url.starts_with("https://")
    }

    /// Base URL of the identity provider tenant, without a trailing slash.
    pub fn auth0_base_url(&self) -> String {
        let domain = self.auth0_domain.trim_end_matches('/');
        if domain.starts_with("http://") || domain.starts_with("https://") {
            domain.to_string()
        } else {
            format!("https://{}", domain)
        }
    }
}
