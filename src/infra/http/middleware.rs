use std::time::Instant;

use axum::{
    body::Body,
    extract::State,
    http::{Request, Uri, header::HOST},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{error, warn};
use url::Url;

use crate::{
    application::error::{AppError, ErrorReport},
    context::{self, BackgroundTasks, RequestContext},
    infra::error::InfraError,
};

const FORWARDED_PROTO_HEADER: &str = "x-forwarded-proto";
const DEFAULT_HOST: &str = "localhost";

/// Create the request context, run the rest of the stack inside it, and copy
/// any headers set through the context onto the response.
pub async fn request_scope(
    State(background): State<BackgroundTasks>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let url = match request_url(&request) {
        Ok(url) => url,
        Err(err) => return AppError::from(err).into_response(),
    };

    let ctx = RequestContext::new(url, background);
    request.extensions_mut().insert(ctx.clone());

    let mut response = context::scope(ctx.clone(), next.run(request)).await;
    response.headers_mut().extend(ctx.take_response_headers());
    response.extensions_mut().insert(ctx);
    response
}

fn request_url(request: &Request<Body>) -> Result<Url, InfraError> {
    let uri: &Uri = request.uri();
    if uri.scheme().is_some() {
        return Url::parse(&uri.to_string())
            .map_err(|err| InfraError::request_url(format!("`{uri}`: {err}")));
    }

    let headers = request.headers();
    let host = headers
        .get(HOST)
        .and_then(|value| value.to_str().ok())
        .unwrap_or(DEFAULT_HOST);
    let scheme = headers
        .get(FORWARDED_PROTO_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|proto| matches!(*proto, "http" | "https"))
        .unwrap_or("http");
    let target = uri.path_and_query().map_or("/", |value| value.as_str());

    let candidate = format!("{scheme}://{host}{target}");
    Url::parse(&candidate).map_err(|err| InfraError::request_url(format!("`{candidate}`: {err}")))
}

pub async fn log_responses(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let request_id = request
        .extensions()
        .get::<RequestContext>()
        .map(|ctx| ctx.request_id().to_string())
        .unwrap_or_default();

    let mut response = next.run(request).await;
    let status = response.status();

    if status.is_client_error() || status.is_server_error() {
        let elapsed_ms = start.elapsed().as_millis();
        let report = response.extensions_mut().remove::<ErrorReport>();
        let (source, messages) = match report {
            Some(report) => (report.source, report.messages),
            None => ("unknown", Vec::new()),
        };
        let detail = messages
            .first()
            .cloned()
            .unwrap_or_else(|| "no diagnostic available".to_string());

        if status.is_server_error() {
            error!(
                target = "stashkit::http::response",
                status = status.as_u16(),
                method = %method,
                path = %uri.path(),
                query = uri.query().unwrap_or(""),
                elapsed_ms = elapsed_ms,
                source = source,
                detail = %detail,
                chain = ?messages,
                request_id = request_id,
                "request failed",
            );
        } else {
            warn!(
                target = "stashkit::http::response",
                status = status.as_u16(),
                method = %method,
                path = %uri.path(),
                query = uri.query().unwrap_or(""),
                elapsed_ms = elapsed_ms,
                source = source,
                detail = %detail,
                chain = ?messages,
                request_id = request_id,
                "client request error",
            );
        }
    }

    response
}
