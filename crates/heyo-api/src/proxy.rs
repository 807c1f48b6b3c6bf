// Passthrough proxy to Ollama
//
// ANY /api/generate is forwarded verbatim to the backend without the agent
// loop. The response status, content type and body are streamed back as-is.

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use reqwest::Client;

/// App state for proxy routes
#[derive(Clone)]
pub struct AppState {
    client: Client,
    generate_url: String,
}

impl AppState {
    pub fn new(ollama_url: &str) -> Self {
        Self {
            client: Client::new(),
            generate_url: format!("{}/api/generate", ollama_url.trim_end_matches('/')),
        }
    }
}

/// Create proxy routes
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/api/generate", any(generate))
        .with_state(state)
}

/// ANY /api/generate - Forward to the backend's generate endpoint
pub async fn generate(
    State(state): State<AppState>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let mut upstream = state.client.request(method, &state.generate_url).body(body);
    if let Some(content_type) = headers.get(header::CONTENT_TYPE) {
        upstream = upstream.header(header::CONTENT_TYPE, content_type);
    }

    let response = match upstream.send().await {
        Ok(response) => response,
        Err(e) => {
            tracing::error!(
                url = %state.generate_url,
                error = %e,
                "Backend unreachable for proxy request"
            );
            return (StatusCode::BAD_GATEWAY, format!("backend unreachable: {e}")).into_response();
        }
    };

    let mut builder = Response::builder().status(response.status());
    if let Some(content_type) = response.headers().get(header::CONTENT_TYPE) {
        builder = builder.header(header::CONTENT_TYPE, content_type);
    }

    builder
        .body(Body::from_stream(response.bytes_stream()))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;
    use wiremock::matchers::{body_string, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_forwards_request_and_streams_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .and(body_string(r#"{"model":"m","prompt":"hi"}"#))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(
                    "{\"response\":\"hello\",\"done\":true}\n",
                    "application/x-ndjson",
                ),
            )
            .expect(1)
            .mount(&server)
            .await;

        let app = routes(AppState::new(&format!("{}/", server.uri())));
        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/api/generate")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"model":"m","prompt":"hi"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/x-ndjson");
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"{\"response\":\"hello\",\"done\":true}\n");
    }

    #[tokio::test]
    async fn test_passes_through_upstream_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(405))
            .mount(&server)
            .await;

        let app = routes(AppState::new(&server.uri()));
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/generate")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_bad_gateway() {
        let app = routes(AppState::new("http://127.0.0.1:1"));
        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/api/generate")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }
}
