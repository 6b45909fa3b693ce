//! Last line of error handling.
//!
//! Errors raised through `AppError` already have the `{code, message}` shape and
//! carry an `ErrorReport`; they are only logged here. Anything else with an
//! error status (extractor rejections, unmatched methods) is rewritten into
//! that shape.

use std::any::Any;

use axum::{
    body::to_bytes,
    extract::Request,
    http::{
        header::{CONTENT_LENGTH, CONTENT_TYPE},
        StatusCode,
    },
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use tracing::{error, warn};

use crate::error::{AppError, ErrorBody, ErrorReport, INTERNAL_MESSAGE};
use crate::middleware::logging::{client_addr, user_agent};

const MAX_REJECTION_BODY: usize = 16 * 1024;

pub async fn normalize_errors(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let client = client_addr(&request);
    let agent = user_agent(request.headers());

    let response = next.run(request).await;
    let status = response.status();
    if !status.is_client_error() && !status.is_server_error() {
        return response;
    }

    if let Some(report) = response.extensions().get::<ErrorReport>() {
        if report.status.is_server_error() {
            error!(%method, %path, %client, user_agent = %agent, status = report.status.as_u16(), detail = %report.detail, "request failed");
        } else {
            warn!(%method, %path, %client, user_agent = %agent, status = report.status.as_u16(), detail = %report.detail, "request rejected");
        }
        return response;
    }

    let rewritten = rewrite(response).await;
    warn!(%method, %path, %client, user_agent = %agent, status = rewritten.status().as_u16(), "framework rejection normalized");
    rewritten
}

async fn rewrite(response: Response) -> Response {
    let (parts, body) = response.into_parts();
    let status = match parts.status {
        StatusCode::UNPROCESSABLE_ENTITY => StatusCode::BAD_REQUEST,
        other => other,
    };

    let message = if status.is_server_error() {
        INTERNAL_MESSAGE.to_string()
    } else {
        let fallback = status.canonical_reason().unwrap_or("Request failed");
        match to_bytes(body, MAX_REJECTION_BODY).await {
            Ok(bytes) if !bytes.is_empty() => String::from_utf8_lossy(&bytes).trim().to_string(),
            _ => fallback.to_string(),
        }
    };

    let mut rewritten = (status, Json(ErrorBody::new(status, message))).into_response();
    for (name, value) in parts.headers.iter() {
        if name != CONTENT_TYPE && name != CONTENT_LENGTH {
            rewritten.headers_mut().append(name.clone(), value.clone());
        }
    }
    rewritten
}

/// Handler for `CatchPanicLayer`: a panic becomes a generic 500.
pub fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic payload".to_string()
    };
    AppError::Internal(anyhow::anyhow!("handler panicked: {detail}")).into_response()
}
