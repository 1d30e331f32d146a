//! Wire-level tests for the Ollama client against a mock HTTP server.
//!
//! These cover the request body contract, the response envelope, and the
//! error mapping for non-success statuses — the parts a fake
//! `GenerateClient` cannot exercise. Real time is used (no paused clock)
//! because mockito serves from a live socket; backoffs are set to 1ms.

use mockito::{Matcher, Server};
use scriptmark::{GenerateClient, GradeOrigin, Grader, GradingConfig, ModelError, OllamaClient};
use serde_json::json;

fn config_for(server: &Server) -> GradingConfig {
    GradingConfig::builder()
        .base_url(format!("{}/api", server.url()))
        .model("deepseek-r1:8b")
        .max_attempts(2)
        .retry_backoff_ms(1)
        .build()
        .expect("valid config")
}

/// A grading payload for the default rubric, wrapped in the `/generate`
/// response envelope (the payload travels as a JSON string field).
fn envelope_with_grade(grade: u32) -> String {
    let payload = json!({
        "grade": grade,
        "feedback": {
            "strengths": ["clear writing"],
            "improvements": ["expand section 2"],
            "details": "Meets expectations."
        },
        "justification": {
            "key_concepts": { "score": 20, "reason": "accurate" },
            "methodology": { "score": 18, "reason": "appropriate" },
            "argumentation": { "score": 20, "reason": "well supported" },
            "presentation": { "score": 20, "reason": "tidy" }
        }
    });
    json!({ "response": payload.to_string() }).to_string()
}

fn essay() -> Vec<u8> {
    b"The water cycle moves moisture between oceans, atmosphere and land \
      through evaporation, condensation and precipitation."
        .to_vec()
}

/// The request body is flat: sampling settings sit beside `model` and
/// `prompt`, not nested under an options object.
#[tokio::test]
async fn generate_posts_the_flat_body() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/api/generate")
        .match_header("content-type", "application/json")
        .match_body(Matcher::PartialJson(json!({
            "model": "deepseek-r1:8b",
            "prompt": "say hi",
            "stream": false,
            "max_tokens": 1024,
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({ "response": "hi there" }).to_string())
        .create_async()
        .await;

    let client = OllamaClient::new(&config_for(&server)).expect("client builds");
    let text = client.generate("say hi").await.expect("generate succeeds");

    assert_eq!(text, "hi there");
    mock.assert_async().await;
}

/// Non-success statuses map to `ModelError::Endpoint` with the status and
/// a detail snippet from the body.
#[tokio::test]
async fn non_success_status_maps_to_endpoint_error() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/api/generate")
        .with_status(404)
        .with_body(r#"{"error":"model 'missing:1b' not found"}"#)
        .create_async()
        .await;

    let client = OllamaClient::new(&config_for(&server)).expect("client builds");
    let err = client.generate("x").await.expect_err("404 must fail");

    match err {
        ModelError::Endpoint { status, detail } => {
            assert_eq!(status, 404);
            assert!(detail.contains("not found"), "got: {detail}");
        }
        other => panic!("expected Endpoint error, got {other:?}"),
    }
}

/// A 200 with a body that is not the response envelope maps to
/// `ModelError::Transport`: the exchange did not complete as a well-formed
/// generate call, so it stays retryable.
#[tokio::test]
async fn invalid_envelope_maps_to_transport_error() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/api/generate")
        .with_status(200)
        .with_body("<html>proxy error page</html>")
        .create_async()
        .await;

    let client = OllamaClient::new(&config_for(&server)).expect("client builds");
    let err = client.generate("x").await.expect_err("bad envelope must fail");

    assert!(matches!(err, ModelError::Transport(_)), "got: {err:?}");
}

/// A connection-level failure (nothing listening) also maps to Transport.
#[tokio::test]
async fn connection_refused_maps_to_transport_error() {
    // Bind-then-drop a server so the port is known-dead.
    let url = {
        let server = Server::new_async().await;
        server.url()
    };

    let config = GradingConfig::builder()
        .base_url(format!("{url}/api"))
        .max_attempts(1)
        .build()
        .expect("valid config");
    let client = OllamaClient::new(&config).expect("client builds");

    let err = client.generate("x").await.expect_err("dead port must fail");
    assert!(matches!(err, ModelError::Transport(_)), "got: {err:?}");
}

/// Full path through `Grader::new` (no injected client): HTTP call, envelope
/// decode, payload parse, final grade.
#[tokio::test]
async fn grader_grades_through_a_live_endpoint() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/api/generate")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(envelope_with_grade(78))
        .create_async()
        .await;

    let grader = Grader::new(config_for(&server)).expect("grader builds");
    let result = grader
        .grade(essay(), "Geography Quiz")
        .await
        .expect("grading should succeed");

    assert_eq!(result.grade, 78.0);
    assert_eq!(result.origin, GradeOrigin::Model);
    mock.assert_async().await;
}

/// A persistently failing endpoint is retried `max_attempts` times and the
/// grade falls back to the estimate.
#[tokio::test]
async fn failing_endpoint_is_retried_then_estimated() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/api/generate")
        .with_status(503)
        .with_body(r#"{"error":"loading model, retry shortly"}"#)
        .expect(2)
        .create_async()
        .await;

    let grader = Grader::new(config_for(&server)).expect("grader builds");
    let result = grader
        .grade(essay(), "Geography Quiz")
        .await
        .expect("fallback must not error");

    assert_eq!(result.origin, GradeOrigin::Heuristic);
    assert_eq!(result.stats.attempts, 2);
    mock.assert_async().await;
}
