//! Request dispatcher for the hub service.
//!
//! Every request, whatever its path, lands in [`dispatch`], which decides a
//! [`Route`] from the request target and then branches on the method:
//!
//! | Route         | Method    | Outcome                                      |
//! |---------------|-----------|----------------------------------------------|
//! | `/create`     | `POST`    | `200`, body is the new hub id                |
//! | `/create`     | `OPTIONS` | `200`                                        |
//! | `/create`     | other     | `405`, body `Not handled: <METHOD>`          |
//! | `/<hub>`      | `GET`     | `302` to a selected item, `200` if none      |
//! | `/<hub>`      | `PUT`     | `200`, body is the new item id               |
//! | `/<hub>`      | `DELETE`  | `200`, item taken out of rotation            |
//! | `/<hub>`      | `OPTIONS` | `200`                                        |
//! | `/<hub>`      | other     | `405`, body is the method                    |
//! | anything else | any       | `404`, body `Invalid path`                   |
//!
//! Hub responses always carry permissive CORS headers.
use super::error::ApiError;
use crate::server::telemetry::{
    increment_hubs_created, increment_items_added, increment_items_deactivated,
    increment_items_selected, increment_request_errors, increment_requests,
    record_request_duration,
};
use axum::Router;
use axum::body::{Body, BodyDataStream};
use axum::extract::{Request, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use core::any::Any;
use sortition::{IdAuthority, RequestBody, Store, validate_add, validate_delete};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;
use tracing::instrument;

/// Longest request target (path and query) that is routed at all.
pub const MAX_TARGET_LEN: usize = 1024;

/// Path that creates hubs.
pub const CREATE_PATH: &str = "/create";

pub const INVALID_PATH_BODY: &str = "Invalid path";

const CORS_HEADERS: [(HeaderName, &str); 3] = [
    (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
    (header::ACCESS_CONTROL_ALLOW_METHODS, "OPTIONS, GET, PUT, DELETE"),
    (header::ACCESS_CONTROL_ALLOW_HEADERS, "*"),
];

/// Shared state behind every request: the store and the token that is
/// cancelled once the service can no longer mint or select.
#[derive(Clone)]
pub struct HubService {
    store: Arc<Store>,
    fatal: CancellationToken,
}

impl HubService {
    pub fn new(store: Arc<Store>) -> Self {
        Self {
            store,
            fatal: CancellationToken::new(),
        }
    }

    /// Cancelled after an unrecoverable failure.
    pub fn fatal_token(&self) -> CancellationToken {
        self.fatal.clone()
    }

    pub fn into_router(self) -> Router {
        Router::new()
            .fallback(dispatch)
            .layer(CatchPanicLayer::custom(panic_response))
            .layer(TraceLayer::new_for_http())
            .with_state(self)
    }

    #[instrument(level = "debug", skip(self), err(Display))]
    async fn create(&self, method: &Method) -> Result<Response, ApiError> {
        match *method {
            Method::POST => {
                let hub = self.store.create_hub().await?;
                increment_hubs_created();
                tracing::info!(hub = %hub.id, "hub created");
                Ok((StatusCode::OK, hub.id).into_response())
            }
            Method::OPTIONS => Ok(StatusCode::OK.into_response()),
            _ => Ok((
                StatusCode::METHOD_NOT_ALLOWED,
                format!("Not handled: {method}"),
            )
                .into_response()),
        }
    }

    async fn hub(&self, hub_id: &str, request: Request) -> Result<Response, ApiError> {
        match request.method().clone() {
            Method::GET => self.select(hub_id).await,
            Method::PUT => self.add(hub_id, request).await,
            Method::DELETE => self.delete(request).await,
            Method::OPTIONS => Ok(StatusCode::OK.into_response()),
            other => Ok((StatusCode::METHOD_NOT_ALLOWED, other.to_string()).into_response()),
        }
    }

    #[instrument(level = "debug", skip(self), err(Display))]
    async fn select(&self, hub_id: &str) -> Result<Response, ApiError> {
        let Some(item) = self.store.select_item(hub_id).await? else {
            return Ok(StatusCode::OK.into_response());
        };
        increment_items_selected();
        let location =
            HeaderValue::from_bytes(&item.content).map_err(|_| ApiError::InvalidLocation)?;
        Ok((StatusCode::FOUND, [(header::LOCATION, location)]).into_response())
    }

    #[instrument(level = "debug", skip(self, request), err(Display))]
    async fn add(&self, hub_id: &str, request: Request) -> Result<Response, ApiError> {
        let content = validate_add(request_body(request)).await?;
        let item = self.store.add_item(hub_id, content).await?;
        increment_items_added();
        tracing::info!(hub = %hub_id, item = %item.id, "item added");
        Ok((StatusCode::OK, item.id).into_response())
    }

    #[instrument(level = "debug", skip_all, err(Display))]
    async fn delete(&self, request: Request) -> Result<Response, ApiError> {
        let item_id = validate_delete(request_body(request), self.store.ids()).await?;
        if let Some(item) = self.store.deactivate_item(&item_id).await? {
            increment_items_deactivated();
            tracing::info!(hub = %item.hub_id, item = %item.id, "item deactivated");
        }
        Ok(StatusCode::OK.into_response())
    }

    /// Converts a failed request into its response, stopping the service if
    /// the failure is unrecoverable.
    pub(crate) fn fail(&self, err: ApiError) -> Response {
        if err.is_fatal() {
            tracing::error!(error = %err, "unrecoverable failure, shutting down");
            self.fatal.cancel();
        } else if err.status_code().is_server_error() {
            tracing::error!(error = %err, "request failed");
        } else {
            tracing::debug!(error = %err, "request rejected");
        }
        err.into_response()
    }
}

/// Where a request goes, decided from its target alone.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Route {
    Create,
    Hub(String),
    Invalid,
}

impl Route {
    /// The hub id is the first path segment; anything after it is ignored.
    pub(crate) fn decide(uri: &Uri, ids: &IdAuthority) -> Self {
        let target = uri.path_and_query().map_or("", |target| target.as_str());
        if target.is_empty() || target.len() > MAX_TARGET_LEN {
            return Self::Invalid;
        }
        if uri.path() == CREATE_PATH {
            return Self::Create;
        }
        match uri.path().split('/').nth(1) {
            Some(segment) if ids.validate(segment) => Self::Hub(segment.to_owned()),
            _ => Self::Invalid,
        }
    }
}

async fn dispatch(State(service): State<HubService>, request: Request) -> Response {
    let started = Instant::now();
    increment_requests();

    let response = match Route::decide(request.uri(), service.store.ids()) {
        Route::Invalid => (StatusCode::NOT_FOUND, INVALID_PATH_BODY).into_response(),
        Route::Create => service
            .create(request.method())
            .await
            .unwrap_or_else(|err| service.fail(err)),
        Route::Hub(hub_id) => with_cors(
            service
                .hub(&hub_id, request)
                .await
                .unwrap_or_else(|err| service.fail(err)),
        ),
    };

    let status = response.status();
    if status.is_client_error() || status.is_server_error() {
        increment_request_errors();
    }
    record_request_duration(started.elapsed().as_secs_f64() * 1_000.0);
    response
}

fn request_body(request: Request) -> RequestBody<BodyDataStream> {
    let (parts, body) = request.into_parts();
    RequestBody {
        content_type: header_str(&parts.headers, &header::CONTENT_TYPE).map(str::to_owned),
        declared_length: header_str(&parts.headers, &header::CONTENT_LENGTH)
            .and_then(|len| len.parse().ok()),
        stream: body.into_data_stream(),
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &HeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

fn with_cors(mut response: Response) -> Response {
    let headers = response.headers_mut();
    for (name, value) in CORS_HEADERS {
        headers.insert(name, HeaderValue::from_static(value));
    }
    response
}

fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response<Body> {
    let message = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("internal error");
    tracing::error!(panic = %message, "request handler panicked");
    (StatusCode::INTERNAL_SERVER_ERROR, message.to_owned()).into_response()
}
