//! The client pages talk to
//!
//! `ApiClient` owns the credential store, the refresh coordinator and the
//! dispatcher, and exposes verb helpers plus the session operations (login,
//! register, logout).

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::watch;

use super::dispatcher::Dispatcher;
use super::error::ApiError;
use super::middleware::{BearerAuth, DefaultHeaders, RequestLayer, ResponseLayer};
use super::request::RequestSpec;
use super::response::ApiResponse;
use super::transport::{ReqwestTransport, Transport};
use crate::auth::{
    CredentialPair, CredentialStore, FileBackend, HttpRefresher, KeyringBackend,
    RefreshCoordinator, RefreshOnUnauthorized, RefreshStats, SessionEvent, SessionExpired,
    SessionFailureHandler, TokenRefresher, TokenResponse,
};
use crate::config::{ClientConfig, StorageConfig};
use crate::security::Sanitizer;

#[derive(Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct RegisterRequest<'a> {
    name: &'a str,
    email: &'a str,
    password: &'a str,
}

/// Authenticated client for the PlacePrep backend
///
/// Cloning is cheap; clones share the session.
///
/// # Example
///
/// ```no_run
/// use placeprep_client::{ApiClient, ClientConfig};
///
/// # async fn run() -> Result<(), placeprep_client::ApiError> {
/// let client = ApiClient::from_config(ClientConfig::load())?;
/// client.login("priya@example.com", "hunter2").await?;
///
/// let dashboard: serde_json::Value = client.get_json("/dashboard").await?;
/// println!("{}", dashboard);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ApiClient {
    dispatcher: Dispatcher,
    store: Arc<CredentialStore>,
    session: Arc<SessionFailureHandler>,
    coordinator: Arc<RefreshCoordinator>,
}

impl ApiClient {
    pub fn builder() -> ApiClientBuilder {
        ApiClientBuilder::new()
    }

    /// Builds a client with the storage and transport described by `config`
    pub fn from_config(config: ClientConfig) -> Result<Self, ApiError> {
        ApiClientBuilder::new().config(config).build()
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn store(&self) -> &Arc<CredentialStore> {
        &self.store
    }

    pub fn session(&self) -> &Arc<SessionFailureHandler> {
        &self.session
    }

    /// Sends a request through the full pipeline
    pub async fn send(&self, spec: RequestSpec) -> Result<ApiResponse, ApiError> {
        self.dispatcher.send(spec).await
    }

    pub async fn get(&self, path: &str) -> Result<ApiResponse, ApiError> {
        self.send(RequestSpec::get(path)).await
    }

    pub async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<ApiResponse, ApiError> {
        self.send(RequestSpec::post(path).with_json(body)?).await
    }

    pub async fn put<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<ApiResponse, ApiError> {
        self.send(RequestSpec::put(path).with_json(body)?).await
    }

    pub async fn patch<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<ApiResponse, ApiError> {
        self.send(RequestSpec::patch(path).with_json(body)?).await
    }

    pub async fn delete(&self, path: &str) -> Result<ApiResponse, ApiError> {
        self.send(RequestSpec::delete(path)).await
    }

    /// GET and decode the JSON body
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.get(path).await?.json()
    }

    /// POST a JSON body and decode the JSON answer
    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.post(path, body).await?.json()
    }

    /// Signs in and starts a session
    ///
    /// Bad credentials come back as [`ApiError::Unauthorized`] with the
    /// backend's body; they never touch an existing session.
    pub async fn login(&self, email: &str, password: &str) -> Result<(), ApiError> {
        tracing::info!(email = %Sanitizer::sanitize_email(email), "Signing in");
        let spec = RequestSpec::post("/auth/login")
            .with_json(&LoginRequest { email, password })?
            .without_auth();
        self.authenticate(spec).await
    }

    /// Creates an account and starts a session
    pub async fn register(&self, name: &str, email: &str, password: &str) -> Result<(), ApiError> {
        tracing::info!(email = %Sanitizer::sanitize_email(email), "Registering");
        let spec = RequestSpec::post("/auth/register")
            .with_json(&RegisterRequest { name, email, password })?
            .without_auth();
        self.authenticate(spec).await
    }

    async fn authenticate(&self, spec: RequestSpec) -> Result<(), ApiError> {
        let tokens: TokenResponse = self.send(spec).await?.json()?;
        self.begin_session(tokens.into())
    }

    /// Installs a credential pair obtained elsewhere and opens a new episode
    ///
    /// The pair is usable in-process even if persisting it fails; the error
    /// is still reported.
    pub fn begin_session(&self, pair: CredentialPair) -> Result<(), ApiError> {
        let persisted = self.store.set(pair);
        self.session.begin_session();
        if let Err(e) = &persisted {
            tracing::warn!("Session started but credentials were not persisted: {}", e);
        }
        persisted.map_err(ApiError::from)
    }

    /// Clears credentials without emitting an expiry signal
    pub fn logout(&self) -> Result<(), ApiError> {
        self.session.sign_out().map_err(ApiError::from)
    }

    pub fn is_authenticated(&self) -> bool {
        self.store.is_present()
    }

    /// Watches session transitions
    pub fn session_events(&self) -> watch::Receiver<SessionEvent> {
        self.session.subscribe()
    }

    /// Registers a callback for the re-authentication signal
    pub fn on_session_expired<F>(&self, callback: F)
    where
        F: Fn(&SessionExpired) + Send + Sync + 'static,
    {
        self.session.on_expired(callback);
    }

    pub fn refresh_stats(&self) -> RefreshStats {
        self.coordinator.stats()
    }
}

/// Assembles an [`ApiClient`]
///
/// Anything not supplied is derived from the config: a reqwest transport
/// with the configured timeout, the configured storage backend and an HTTP
/// refresher against `auth/refresh`.
pub struct ApiClientBuilder {
    config: ClientConfig,
    transport: Option<Arc<dyn Transport>>,
    store: Option<Arc<CredentialStore>>,
    refresher: Option<Arc<dyn TokenRefresher>>,
    request_layers: Vec<Arc<dyn RequestLayer>>,
    response_layers: Vec<Arc<dyn ResponseLayer>>,
}

impl Default for ApiClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ApiClientBuilder {
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
            transport: None,
            store: None,
            refresher: None,
            request_layers: Vec::new(),
            response_layers: Vec::new(),
        }
    }

    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn store(mut self, store: Arc<CredentialStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn refresher(mut self, refresher: Arc<dyn TokenRefresher>) -> Self {
        self.refresher = Some(refresher);
        self
    }

    /// Adds a request layer; it runs after the bearer layer
    pub fn request_layer(mut self, layer: Arc<dyn RequestLayer>) -> Self {
        self.request_layers.push(layer);
        self
    }

    /// Adds a response layer; it runs before the refresh layer
    pub fn response_layer(mut self, layer: Arc<dyn ResponseLayer>) -> Self {
        self.response_layers.push(layer);
        self
    }

    pub fn build(self) -> Result<ApiClient, ApiError> {
        let config = self.config;
        let api_base = config.api_base()?;

        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new(config.request_timeout())?),
        };
        let store = match self.store {
            Some(store) => store,
            None => Arc::new(open_store(&config.storage)?),
        };
        let refresher: Arc<dyn TokenRefresher> = match self.refresher {
            Some(refresher) => refresher,
            None => Arc::new(HttpRefresher::new(
                transport.clone(),
                config.endpoint("auth/refresh")?,
            )),
        };

        let session = Arc::new(SessionFailureHandler::new(store.clone(), config.login_path.clone()));
        let coordinator = RefreshCoordinator::new(
            store.clone(),
            refresher,
            session.clone(),
            config.refresh_failure_policy,
        );

        let mut request_layers: Vec<Arc<dyn RequestLayer>> = vec![
            Arc::new(DefaultHeaders::json()),
            Arc::new(BearerAuth::new(store.clone())),
        ];
        request_layers.extend(self.request_layers);

        let mut response_layers = self.response_layers;
        response_layers.push(Arc::new(RefreshOnUnauthorized::new(coordinator.clone())));

        tracing::debug!(
            api_base = %api_base,
            authenticated = store.is_present(),
            policy = ?config.refresh_failure_policy,
            "API client ready"
        );

        Ok(ApiClient {
            dispatcher: Dispatcher::new(api_base, transport, request_layers, response_layers),
            store,
            session,
            coordinator,
        })
    }
}

fn open_store(storage: &StorageConfig) -> Result<CredentialStore, ApiError> {
    let store = match storage {
        StorageConfig::Keyring { namespace } => CredentialStore::open(KeyringBackend::new(namespace.as_str()))?,
        StorageConfig::File { path } => CredentialStore::open(FileBackend::new(path.clone()))?,
        StorageConfig::Memory => CredentialStore::in_memory(),
    };
    Ok(store)
}
