pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::auto_apply::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Auto-Apply API
        .route(
            "/api/v1/auto-apply/config",
            get(handlers::handle_get_config).put(handlers::handle_put_config),
        )
        .route("/api/v1/auto-apply/start", post(handlers::handle_start))
        .route("/api/v1/auto-apply/stop", post(handlers::handle_stop))
        .route("/api/v1/auto-apply/activity", get(handlers::handle_get_activity))
        .route("/api/v1/auto-apply/cycles", get(handlers::handle_list_cycles))
        .route(
            "/api/v1/auto-apply/queue",
            get(handlers::handle_list_queue).post(handlers::handle_enqueue),
        )
        .route(
            "/api/v1/auto-apply/queue/:id/resolve",
            post(handlers::handle_resolve),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auto_apply::testing::{FakeSearch, Harness};
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
        response::Response,
    };
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;
    use uuid::Uuid;

    fn app() -> Router {
        let harness = Harness::new(FakeSearch::default());
        build_router(AppState {
            engine: Arc::new(harness.engine()),
        })
    }

    fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let response = app().oneshot(get("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["service"], "autoapply-api");
    }

    #[tokio::test]
    async fn test_config_put_and_get() {
        let app = app();
        let user = Uuid::new_v4();

        let response = app
            .clone()
            .oneshot(json_request(
                "PUT",
                "/api/v1/auto-apply/config",
                json!({
                    "user_id": user,
                    "keywords": ["rust", "RUST", "backend"],
                    "daily_limit": 4,
                    "is_active": true
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["keywords"], json!(["rust", "backend"]));

        let response = app
            .clone()
            .oneshot(get(&format!("/api/v1/auto-apply/config?user_id={user}")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["daily_limit"], 4);

        let response = app
            .oneshot(json_request(
                "PUT",
                "/api/v1/auto-apply/config",
                json!({ "user_id": user, "daily_limit": 0 }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_missing_config_and_idle_stop_are_not_found() {
        let app = app();
        let user = Uuid::new_v4();

        let response = app
            .clone()
            .oneshot(get(&format!("/api/v1/auto-apply/config?user_id={user}")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["error"]["code"], "NOT_FOUND");

        let response = app
            .clone()
            .oneshot(json_request("POST", "/api/v1/auto-apply/start", json!({ "user_id": user })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app
            .oneshot(json_request("POST", "/api/v1/auto-apply/stop", json!({ "user_id": user })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_start_accepts() {
        let app = app();
        let user = Uuid::new_v4();
        app.clone()
            .oneshot(json_request(
                "PUT",
                "/api/v1/auto-apply/config",
                json!({ "user_id": user, "keywords": ["rust"], "is_active": true }),
            ))
            .await
            .unwrap();

        let response = app
            .oneshot(json_request("POST", "/api/v1/auto-apply/start", json!({ "user_id": user })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let body = body_json(response).await;
        assert_eq!(body["status"], "running");
        assert!(body["cycle_id"].is_string());
    }

    #[tokio::test]
    async fn test_queue_enqueue_list_resolve() {
        let app = app();
        let user = Uuid::new_v4();

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/v1/auto-apply/queue",
                json!({
                    "user_id": user,
                    "candidate": {
                        "platform": "monster",
                        "title": "Designer",
                        "company": "Acme",
                        "url": "https://monster.example.com/1"
                    },
                    "note": "apply by hand"
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let item = body_json(response).await;
        assert_eq!(item["reason"], "manual_review_requested");
        let id = item["id"].as_str().unwrap().to_string();

        let response = app
            .clone()
            .oneshot(get(&format!("/api/v1/auto-apply/queue?user_id={user}")))
            .await
            .unwrap();
        assert_eq!(body_json(response).await.as_array().unwrap().len(), 1);

        let resolve = json!({ "user_id": user, "resolution": "discarded" });
        let uri = format!("/api/v1/auto-apply/queue/{id}/resolve");
        let response = app
            .clone()
            .oneshot(json_request("POST", &uri, resolve.clone()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["resolution"], "discarded");

        let response = app.oneshot(json_request("POST", &uri, resolve)).await.unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_activity_without_cycles_is_not_found() {
        let user = Uuid::new_v4();
        let response = app()
            .oneshot(get(&format!("/api/v1/auto-apply/activity?user_id={user}")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
