use std::net::SocketAddr;

use axum::{middleware, routing::get, Router};
use tower_http::{catch_panic::CatchPanicLayer, cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::auth::guard::require_auth;
use crate::error::AppError;
use crate::middleware::{
    errors::{normalize_errors, panic_response},
    logging::{log_requests, make_request_span},
};
use crate::state::AppState;
use crate::{auth, products, users};

pub fn build_app(state: AppState) -> Router {
    let protected = Router::new()
        .merge(auth::protected_router())
        .merge(users::router())
        .merge(products::router())
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    let public = Router::new()
        .merge(auth::public_router())
        .route("/health", get(|| async { "ok" }));

    Router::new()
        .merge(protected)
        .merge(public)
        .fallback(route_not_found)
        .with_state(state)
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(middleware::from_fn(normalize_errors))
        .layer(middleware::from_fn(log_requests))
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(make_request_span)
                .on_request(())
                .on_response(())
                .on_failure(()),
        )
}

async fn route_not_found(uri: axum::http::Uri) -> AppError {
    AppError::not_found(format!("Route {} not found", uri.path()))
}

pub async fn serve(app: Router, addr: SocketAddr) -> anyhow::Result<()> {
    info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{header, Method, Request, StatusCode},
    };
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::error::{ErrorBody, INTERNAL_MESSAGE};

    struct TestApp {
        app: Router,
        state: AppState,
    }

    impl TestApp {
        fn new() -> Self {
            let state = AppState::fake();
            Self {
                app: build_app(state.clone()),
                state,
            }
        }

        async fn send(
            &self,
            method: Method,
            uri: &str,
            token: Option<&str>,
            body: Option<Value>,
        ) -> (StatusCode, Value) {
            let mut builder = Request::builder().method(method).uri(uri);
            if let Some(token) = token {
                builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
            }
            let request = match body {
                Some(body) => builder
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
                None => builder.body(Body::empty()).unwrap(),
            };

            let response = self.app.clone().oneshot(request).await.unwrap();
            let status = response.status();
            let bytes = response.into_body().collect().await.unwrap().to_bytes();
            let value = if bytes.is_empty() {
                Value::Null
            } else {
                serde_json::from_slice(&bytes)
                    .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into()))
            };
            (status, value)
        }

        async fn register(&self, username: &str) -> (i64, String) {
            let (status, body) = self
                .send(
                    Method::POST,
                    "/auth/register",
                    None,
                    Some(json!({
                        "username": username,
                        "email": format!("{username}@example.com"),
                        "name": username,
                        "password": "correct-horse",
                    })),
                )
                .await;
            assert_eq!(status, StatusCode::CREATED, "{body}");
            (
                body["user"]["id"].as_i64().unwrap(),
                body["access_token"].as_str().unwrap().to_string(),
            )
        }

        async fn login(&self, username: &str, password: &str) -> (StatusCode, Value) {
            self.send(
                Method::POST,
                "/auth/login",
                None,
                Some(json!({ "username": username, "password": password })),
            )
            .await
        }
    }

    fn error_body(value: Value) -> ErrorBody {
        serde_json::from_value(value).unwrap()
    }

    #[tokio::test]
    async fn health_is_public() {
        let app = TestApp::new();
        let (status, body) = app.send(Method::GET, "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, Value::String("ok".into()));
    }

    #[tokio::test]
    async fn register_hides_password_hash_and_duplicates_conflict() {
        let app = TestApp::new();
        let (status, body) = app
            .send(
                Method::POST,
                "/auth/register",
                None,
                Some(json!({
                    "username": "alice",
                    "email": "alice@example.com",
                    "name": "Alice",
                    "password": "correct-horse",
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert!(body["access_token"].is_string());
        assert_eq!(body["user"]["username"], "alice");
        assert_eq!(body["user"]["status"], "active");
        assert!(body["user"].get("passwordHash").is_none());
        assert!(body["user"].get("password_hash").is_none());

        let (status, body) = app
            .send(
                Method::POST,
                "/auth/register",
                None,
                Some(json!({
                    "username": "alice",
                    "email": "second@example.com",
                    "name": "Alice Again",
                    "password": "correct-horse",
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(error_body(body).code, 409);
    }

    #[tokio::test]
    async fn login_failures_share_one_shape() {
        let app = TestApp::new();
        let (_, admin_token) = app.register("admin").await;
        let (bob_id, _) = app.register("bob").await;
        app.register("carol").await;

        let (status, _) = app
            .send(
                Method::PUT,
                &format!("/users/{bob_id}"),
                Some(&admin_token),
                Some(json!({ "status": "inactive" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);

        let unknown = app.login("nobody", "correct-horse").await;
        let wrong = app.login("carol", "not-her-password").await;
        let inactive = app.login("bob", "correct-horse").await;

        assert_eq!(unknown.0, StatusCode::UNAUTHORIZED);
        assert_eq!(unknown, wrong);
        assert_eq!(unknown, inactive);
        assert_eq!(
            error_body(unknown.1).message,
            "Invalid username or password"
        );
    }

    #[tokio::test]
    async fn deactivated_user_loses_access_with_a_live_token() {
        let app = TestApp::new();
        let (_, admin_token) = app.register("admin").await;
        let (bob_id, bob_token) = app.register("bob").await;

        app.send(
            Method::PUT,
            &format!("/users/{bob_id}"),
            Some(&admin_token),
            Some(json!({ "status": "inactive" })),
        )
        .await;

        let (status, _) = app
            .send(Method::GET, "/auth/profile", Some(&bob_token), None)
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn protected_routes_require_a_token() {
        let app = TestApp::new();
        for uri in ["/users", "/products", "/auth/profile"] {
            let (status, body) = app.send(Method::GET, uri, None, None).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED, "{uri}");
            let body = error_body(body);
            assert_eq!(body.code, 401);
            assert_eq!(body.message, "Missing Authorization header");
        }

        let (status, _) = app
            .send(Method::GET, "/users", Some("garbage"), None)
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn profile_refresh_and_logout() {
        let app = TestApp::new();
        let (id, token) = app.register("alice").await;

        let (status, body) = app
            .send(Method::GET, "/auth/profile", Some(&token), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"], id);
        assert_eq!(body["username"], "alice");
        assert_eq!(body["email"], "alice@example.com");

        let (status, body) = app
            .send(Method::POST, "/auth/refresh", Some(&token), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["access_token"].is_string());

        let (status, body) = app
            .send(Method::POST, "/auth/logout", Some(&token), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Logged out");
    }

    #[tokio::test]
    async fn repeated_login_returns_the_cached_token() {
        let app = TestApp::new();
        app.register("alice").await;
        let (_, first) = app.login("alice", "correct-horse").await;
        let (_, second) = app.login("alice", "correct-horse").await;
        assert!(first["access_token"].is_string());
        assert_eq!(first["access_token"], second["access_token"]);
    }

    #[tokio::test]
    async fn login_after_email_change_issues_a_token_with_the_new_email() {
        let app = TestApp::new();
        let (id, registered_token) = app.register("alice").await;

        let (status, _) = app
            .send(
                Method::PUT,
                &format!("/users/{id}"),
                Some(&registered_token),
                Some(json!({ "email": "alice@new.example.com" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = app.login("alice", "correct-horse").await;
        assert_eq!(status, StatusCode::OK);
        let token = body["access_token"].as_str().unwrap();
        assert_ne!(token, registered_token);

        let claims = app.state.keys.verify(token).unwrap();
        assert_eq!(claims.email, "alice@new.example.com");
        assert_eq!(claims.user_id().unwrap(), id);
    }

    #[tokio::test]
    async fn product_pagination_windows() {
        let app = TestApp::new();
        let (_, token) = app.register("alice").await;
        for (name, price) in [("Laptop", 5999.0), ("Wireless Mouse", 99.0)] {
            let (status, body) = app
                .send(
                    Method::POST,
                    "/products",
                    Some(&token),
                    Some(json!({ "name": name, "price": price, "category": "electronics", "stock": 5 })),
                )
                .await;
            assert_eq!(status, StatusCode::CREATED);
            assert!(body["createdAt"].is_string());
        }

        let (status, body) = app
            .send(Method::GET, "/products?page=2&limit=1", Some(&token), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 2);
        assert_eq!(body["data"].as_array().unwrap().len(), 1);
        assert_eq!(body["data"][0]["name"], "Wireless Mouse");

        let (_, body) = app
            .send(Method::GET, "/products?page=3&limit=1", Some(&token), None)
            .await;
        assert_eq!(body["total"], 2);
        assert!(body["data"].as_array().unwrap().is_empty());

        let (_, body) = app
            .send(Method::GET, "/products?minPrice=100", Some(&token), None)
            .await;
        assert_eq!(body["total"], 1);
        assert_eq!(body["data"][0]["name"], "Laptop");

        let (status, body) = app
            .send(Method::GET, "/products?limit=0", Some(&token), None)
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(error_body(body).code, 400);
    }

    #[tokio::test]
    async fn deleting_missing_ids_names_the_id() {
        let app = TestApp::new();
        let (_, token) = app.register("alice").await;

        let (status, body) = app
            .send(Method::DELETE, "/users/4242", Some(&token), None)
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(error_body(body).message.contains("4242"));

        let (status, body) = app
            .send(Method::DELETE, "/products/31337", Some(&token), None)
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(error_body(body).message.contains("31337"));
    }

    #[tokio::test]
    async fn users_cannot_delete_themselves() {
        let app = TestApp::new();
        let (id, token) = app.register("alice").await;
        let (status, body) = app
            .send(Method::DELETE, &format!("/users/{id}"), Some(&token), None)
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(error_body(body).code, 403);
    }

    #[tokio::test]
    async fn user_crud_through_the_api() {
        let app = TestApp::new();
        let (_, token) = app.register("admin").await;

        let (status, created) = app
            .send(
                Method::POST,
                "/users",
                Some(&token),
                Some(json!({
                    "username": "dave",
                    "email": "Dave@Example.com",
                    "name": "Dave",
                    "password": "dave-password",
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["email"], "dave@example.com");
        let id = created["id"].as_i64().unwrap();

        let (_, listed) = app
            .send(Method::GET, "/users?username=DAV", Some(&token), None)
            .await;
        assert_eq!(listed["total"], 1);

        let (status, updated) = app
            .send(
                Method::PUT,
                &format!("/users/{id}"),
                Some(&token),
                Some(json!({ "name": "David" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["name"], "David");

        let (status, body) = app
            .send(Method::DELETE, &format!("/users/{id}"), Some(&token), None)
            .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert_eq!(body, Value::Null);

        let (status, _) = app
            .send(Method::GET, &format!("/users/{id}"), Some(&token), None)
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn framework_rejections_use_the_error_shape() {
        let app = TestApp::new();
        let (status, body) = app
            .send(
                Method::POST,
                "/auth/login",
                None,
                Some(json!({ "username": "alice" })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(error_body(body).code, 400);

        let (status, body) = app.send(Method::GET, "/nowhere", None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(error_body(body).code, 404);
    }

    #[tokio::test]
    async fn panics_become_generic_500s() {
        async fn boom() -> &'static str {
            panic!("secret internals")
        }

        let app = Router::new()
            .route("/boom", get(boom))
            .layer(CatchPanicLayer::custom(panic_response))
            .layer(middleware::from_fn(normalize_errors));

        let response = app
            .oneshot(Request::builder().uri("/boom").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: ErrorBody = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body.code, 500);
        assert_eq!(body.message, INTERNAL_MESSAGE);
    }
}
