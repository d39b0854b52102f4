pub mod api;
pub mod ws;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    middleware,
    routing::{get, put},
    Router,
};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::modules::chat::{ChatEngine, SessionRegistry};
use crate::modules::ideas::IdeaIngestor;
use crate::utils::auth::BasicAuth;

/// Everything the HTTP and socket handlers share.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ChatEngine>,
    pub ingestor: Arc<IdeaIngestor>,
    pub sessions: SessionRegistry,
    /// Credentials checked on the REST routes and the chat socket; `None` leaves them open.
    pub auth: Option<BasicAuth>,
    pub backend: &'static str,
    pub default_language: Arc<str>,
}

pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/api/v1/posts/:post_id", put(api::upsert_post).get(api::get_post))
        .route_layer(middleware::from_fn_with_state(state.clone(), api::require_basic_auth));

    Router::new()
        .merge(api)
        .route("/chat", get(ws::chat_socket))
        .route("/health", get(api::health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(state: AppState, bind: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("binding {}", bind))?;
    info!("🚀 Idea assistant listening on {}", bind);

    axum::serve(
        listener,
        build_router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

    info!("🛑 Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("Shutdown signal received, draining connections...");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use futures_util::{SinkExt, StreamExt};
    use http_body_util::BodyExt;
    use tokio_tungstenite::tungstenite::{client::IntoClientRequest, Message};
    use tower::ServiceExt;

    use crate::config::settings::IndexConfig;
    use crate::config::{DistanceMetric, Settings};
    use crate::modules::brain::prompts::PromptBook;
    use crate::modules::brain::testing::ScriptedModel;
    use crate::modules::brain::MemoryIdeaIndex;
    use crate::modules::chat::ChatResponse;
    use crate::modules::ideas::summarizer::Summarizer;
    use crate::utils::auth::basic_header;

    fn state(auth: Option<BasicAuth>) -> AppState {
        let settings = Settings::default();
        let model = Arc::new(
            ScriptedModel::echo_prefix("Svar: ")
                .reply_when("JSON_ANSWER", r#"{"question_intent":"asking_about_many_ideas","concepts":["dogs"]}"#)
                .reply_when("Chat message to summarize", "short")
                .reply_when("Brief history", "digest")
                .reply_when("follow-up questions", "<<Fleiri hugmyndir?>>"),
        );
        let index = Arc::new(MemoryIdeaIndex::new(DistanceMetric::Cosine));
        let prompts = Arc::new(PromptBook::new(&settings.project).unwrap());
        let summarizer = Summarizer::new(model.clone(), &settings.llm);
        AppState {
            engine: Arc::new(ChatEngine::new(model.clone(), index.clone(), prompts, &settings)),
            ingestor: Arc::new(IdeaIngestor::new(model, index, summarizer, IndexConfig::default())),
            sessions: SessionRegistry::new(),
            auth,
            backend: "memory",
            default_language: Arc::from("is"),
        }
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn put_post(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("PUT")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn health_reports_backend_and_sessions() {
        let app = build_router(state(None));
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["index"], "memory");
        assert_eq!(body["active_sessions"], 0);
        assert!(body["oldest_session_secs"].is_null());
    }

    #[tokio::test]
    async fn put_rejects_mismatched_ids() {
        let app = build_router(state(None));
        let req = put_post("/api/v1/posts/5", serde_json::json!({ "post_id": 6, "name": "x" }));
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "bad_request");
    }

    #[tokio::test]
    async fn put_then_get_returns_the_record() {
        let app = build_router(state(None));
        let req = put_post(
            "/api/v1/posts/42",
            serde_json::json!({
                "post_id": 42,
                "name": "Hundagerði",
                "description": "Afgirt svæði",
                "language": "is",
                "group_name": "Laugardalur"
            }),
        );
        let response = app.clone().oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let report = body_json(response).await;
        assert_eq!(report["post_id"], 42);
        assert_eq!(report["collection"], "posts_is");

        let response = app
            .oneshot(Request::builder().uri("/api/v1/posts/42?language=is").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let record = body_json(response).await;
        assert_eq!(record["name"], "Hundagerði");
        assert_eq!(record["group_name"], "Laugardalur");
    }

    #[tokio::test]
    async fn unknown_idea_is_not_found() {
        let app = build_router(state(None));
        let response = app
            .oneshot(Request::builder().uri("/api/v1/posts/999").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn rest_routes_require_credentials_when_enabled() {
        let app = build_router(state(Some(BasicAuth::new("admin", "secret"))));

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/api/v1/posts/1").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().contains_key(header::WWW_AUTHENTICATE));

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/v1/posts/1")
                    .header(header::AUTHORIZATION, basic_header("admin", "secret"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        // health stays open
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    async fn spawn_server(state: AppState) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, build_router(state).into_make_service_with_connect_info::<SocketAddr>())
                .await
                .unwrap();
        });
        addr
    }

    #[tokio::test]
    async fn chat_socket_streams_a_full_turn() {
        let addr = spawn_server(state(None)).await;
        let (mut socket, _) = tokio_tungstenite::connect_async(format!("ws://{}/chat", addr)).await.unwrap();
        socket.send(Message::Text("Hvað með hunda?".into())).await.unwrap();

        let mut kinds = Vec::new();
        while let Some(Ok(msg)) = socket.next().await {
            let Message::Text(text) = msg else { continue };
            let frame: serde_json::Value = serde_json::from_str(&text).unwrap();
            let kind = frame["type"].as_str().unwrap().to_string();
            kinds.push(kind.clone());
            if kind == "end_followup" {
                break;
            }
        }
        assert_eq!(kinds.first().map(String::as_str), Some("stream"));
        assert!(kinds.contains(&"start".to_string()));
        assert!(kinds.contains(&"end".to_string()));
        assert!(kinds.contains(&"start_followup".to_string()));
        assert_eq!(kinds.last().map(String::as_str), Some("end_followup"));
    }

    #[tokio::test]
    async fn chat_socket_closes_unauthenticated_clients() {
        let addr = spawn_server(state(Some(BasicAuth::new("admin", "secret")))).await;
        let (mut socket, _) = tokio_tungstenite::connect_async(format!("ws://{}/chat", addr)).await.unwrap();
        match socket.next().await {
            Some(Ok(Message::Close(Some(frame)))) => assert_eq!(u16::from(frame.code), 1008),
            other => panic!("expected policy close, got {:?}", other),
        }

        let mut request = format!("ws://{}/chat", addr).into_client_request().unwrap();
        request
            .headers_mut()
            .insert("Authorization", basic_header("admin", "secret").parse().unwrap());
        let (mut socket, _) = tokio_tungstenite::connect_async(request).await.unwrap();
        socket.send(Message::Text("Halló".into())).await.unwrap();
        let first = socket.next().await.unwrap().unwrap();
        let frame: ChatResponse = serde_json::from_str(first.to_text().unwrap()).unwrap();
        assert_eq!(frame.message, "Halló");
    }
}
