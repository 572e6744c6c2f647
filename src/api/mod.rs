//! HTTP surface for projects and actions.
//!
//! Requests are matched against a `matchit` route table keyed by path, each
//! path holding one handler per method. Handlers validate the body, make
//! their store call and return either a response or an [`ApiError`](crate::core::ApiError), which
//! the dispatcher renders as `{"error": ...}`.

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use async_trait::async_trait;
use http::{header, Method, Response, StatusCode};
use matchit::{Match, Router};
use pingora::{
    apps::http_app::ServeHttp, protocols::http::ServerSession, services::listening::Service,
};
use serde::de::DeserializeOwned;

use crate::{
    config::{Config, Cors, Storage},
    core::ApiResult,
    model::Id,
    store::{ActionStore, EtcdStore, MemoryStore, ProjectStore},
    utils::response::ResponseBuilder,
};

mod actions;
mod cors;
mod projects;


/// Store handles shared by every request.
#[derive(Clone)]
pub struct ApiContext {
    pub projects: Arc<dyn ProjectStore>,
    pub actions: Arc<dyn ActionStore>,
}

impl ApiContext {
    pub fn new(projects: Arc<dyn ProjectStore>, actions: Arc<dyn ActionStore>) -> Self {
        Self { projects, actions }
    }

    /// Serves both collaborators from a single backend.
    pub fn shared<S>(store: S) -> Self
    where
        S: ProjectStore + ActionStore + 'static,
    {
        let store = Arc::new(store);
        Self {
            projects: store.clone(),
            actions: store,
        }
    }

    pub fn from_storage(storage: &Storage) -> Self {
        match storage {
            Storage::Memory => {
                log::info!("Using in-memory storage");
                Self::shared(MemoryStore::new())
            }
            Storage::Etcd(cfg) => {
                log::info!("Using etcd storage at {:?} under {}", cfg.host, cfg.prefix);
                Self::shared(EtcdStore::new(cfg.clone()))
            }
        }
    }
}

/// Path parameters and the JSON body of one request.
#[derive(Debug)]
pub struct ApiRequest {
    params: BTreeMap<String, String>,
    body: serde_json::Value,
}

impl ApiRequest {
    /// An empty or malformed body is kept as `null`, so every required field
    /// reads as missing.
    pub fn new(params: BTreeMap<String, String>, body: &[u8]) -> Self {
        let body = if body.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(body).unwrap_or_else(|e| {
                log::debug!("Ignoring malformed request body: {e}");
                serde_json::Value::Null
            })
        };
        Self { params, body }
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// The `{id}` path segment. Ids that are not integers cannot name a
    /// record and read as `None`.
    pub fn id(&self) -> Option<Id> {
        self.param("id")?.parse().ok()
    }

    /// Decodes the body, falling back to the default (all fields absent)
    /// when it is not a JSON object.
    pub fn payload<T: DeserializeOwned + Default>(&self) -> T {
        serde_json::from_value(self.body.clone()).unwrap_or_default()
    }
}

#[async_trait]
trait Handler {
    async fn handle(&self, ctx: &ApiContext, req: ApiRequest) -> ApiResult<Response<Vec<u8>>>;
}

type MethodHandlers = HashMap<Method, Box<dyn Handler + Send + Sync>>;

pub struct ApiHttpApp {
    context: ApiContext,
    router: Router<MethodHandlers>,
    cors: Cors,
}

impl ApiHttpApp {
    pub fn new(context: ApiContext, cors: Cors) -> Self {
        let mut this = Self {
            context,
            router: Router::new(),
            cors,
        };

        this.route("/api/projects", Method::GET, Box::new(projects::ListProjects))
            .route("/api/projects", Method::POST, Box::new(projects::CreateProject))
            .route("/api/projects/{id}", Method::GET, Box::new(projects::GetProject))
            .route("/api/projects/{id}", Method::PUT, Box::new(projects::UpdateProject))
            .route(
                "/api/projects/{id}",
                Method::DELETE,
                Box::new(projects::DeleteProject),
            )
            .route(
                "/api/projects/{id}/actions",
                Method::GET,
                Box::new(projects::ListProjectActions),
            )
            .route(
                "/api/projects/{id}/actions",
                Method::POST,
                Box::new(actions::CreateAction),
            )
            .route("/api/actions", Method::GET, Box::new(actions::ListActions))
            .route("/api/actions/{id}", Method::GET, Box::new(actions::GetAction))
            .route("/api/actions/{id}", Method::PUT, Box::new(actions::UpdateAction))
            .route(
                "/api/actions/{id}",
                Method::DELETE,
                Box::new(actions::DeleteAction),
            );

        this
    }

    fn route(
        &mut self,
        path: &str,
        method: Method,
        handler: Box<dyn Handler + Send + Sync>,
    ) -> &mut Self {
        if self.router.at(path).is_err() {
            let mut handlers = MethodHandlers::new();
            handlers.insert(method, handler);
            if let Err(e) = self.router.insert(path, handlers) {
                log::error!("Failed to register route {path}: {e}");
            }
        } else if let Ok(routes) = self.router.at_mut(path) {
            routes.value.insert(method, handler);
        }
        self
    }

    pub fn api_http_service(cfg: &Config) -> Service<Self> {
        let context = ApiContext::from_storage(&cfg.storage);
        let app = Self::new(context, cfg.api.cors.clone());
        let addr = cfg.api.address.to_string();
        let mut service = Service::new("API HTTP".to_string(), app);
        service.add_tcp(&addr);
        service
    }

    /// Routes one request and renders the outcome, CORS headers included.
    pub async fn dispatch(
        &self,
        method: &Method,
        path: &str,
        origin: Option<&str>,
        body: &[u8],
    ) -> Response<Vec<u8>> {
        log::debug!("{method} {path}");

        let mut response = if method == Method::OPTIONS {
            cors::preflight(&self.cors)
        } else {
            self.route_request(method, path, body).await
        };

        cors::apply(&self.cors, origin, &mut response);
        response
    }

    async fn route_request(&self, method: &Method, path: &str, body: &[u8]) -> Response<Vec<u8>> {
        match self.router.at(path) {
            Ok(Match { value, params }) => match value.get(method) {
                Some(handler) => {
                    let params: BTreeMap<String, String> = params
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect();
                    let request = ApiRequest::new(params, body);
                    match handler.handle(&self.context, request).await {
                        Ok(resp) => resp,
                        Err(e) => {
                            log::debug!("{method} {path} failed: {e}");
                            ResponseBuilder::from_error(&e)
                        }
                    }
                }
                None => ResponseBuilder::error_json(
                    StatusCode::METHOD_NOT_ALLOWED,
                    "Method Not Allowed",
                ),
            },
            Err(_) => ResponseBuilder::error_json(StatusCode::NOT_FOUND, "Not Found"),
        }
    }
}

#[async_trait]
impl ServeHttp for ApiHttpApp {
    async fn response(&self, http_session: &mut ServerSession) -> Response<Vec<u8>> {
        http_session.set_keepalive(None);

        let (path, method, origin) = {
            let req_header = http_session.req_header();
            let origin = req_header
                .headers
                .get(header::ORIGIN)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string);
            (req_header.uri.path().to_string(), req_header.method.clone(), origin)
        };

        let body = match read_request_body(http_session).await {
            Ok(body) => body,
            Err(e) => {
                log::error!("Failed to read request body for {method} {path}: {e}");
                let mut response =
                    ResponseBuilder::error_json(StatusCode::BAD_REQUEST, "Unreadable request body");
                cors::apply(&self.cors, origin.as_deref(), &mut response);
                return response;
            }
        };

        self.dispatch(&method, &path, origin.as_deref(), &body).await
    }
}

async fn read_request_body(http_session: &mut ServerSession) -> pingora_error::Result<Vec<u8>> {
    let mut body_data = Vec::new();
    while let Some(bytes) = http_session.read_request_body().await? {
        body_data.extend_from_slice(&bytes);
    }
    Ok(body_data)
}
