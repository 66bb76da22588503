//! Tests for the OpenAI relevance classifier against a mock server

use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::common::{CLIENT_TIMEOUT, SLOW_RESPONSE};
use crate::core::Record;
use crate::services::openai_filter::OpenAiRelevanceFilter;
use crate::traits::{FilterError, Relevance, RelevanceFilter};

fn completion(content: &str) -> serde_json::Value {
    json!({
        "choices": [{ "message": { "role": "assistant", "content": content } }]
    })
}

async fn filter_for(server: &MockServer) -> OpenAiRelevanceFilter {
    OpenAiRelevanceFilter::new("sk-test", CLIENT_TIMEOUT)
        .unwrap()
        .with_base_url(server.uri())
}

fn record() -> Record {
    Record::new("fig-1", "https://img/1.png")
        .with_caption("Proposed signaling pathway of TGF-b in fibrosis")
}

#[tokio::test]
async fn test_keep_decision() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(
            r#"{"is_disease_pathway": true, "confidence": "high", "reasoning": "mechanism"}"#,
        )))
        .mount(&server)
        .await;

    let decision = filter_for(&server).await.classify(&record()).await.unwrap();
    assert_eq!(decision, Relevance::Keep);
}

#[tokio::test]
async fn test_discard_decision_from_fenced_reply() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(
            "```json\n{\"is_disease_pathway\": \"false\"}\n```",
        )))
        .mount(&server)
        .await;

    let decision = filter_for(&server).await.classify(&record()).await.unwrap();
    assert_eq!(decision, Relevance::Discard);
}

#[tokio::test]
async fn test_auth_failure_is_critical() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let err = filter_for(&server).await.classify(&record()).await.unwrap_err();
    assert!(matches!(err, FilterError::Critical { ref reason } if reason.contains("credentials")));
}

#[tokio::test]
async fn test_server_error_is_critical() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let err = filter_for(&server).await.classify(&record()).await.unwrap_err();
    assert!(matches!(err, FilterError::Critical { .. }));
}

#[tokio::test]
async fn test_malformed_reply_is_critical() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("I think it is a pathway")))
        .mount(&server)
        .await;

    let err = filter_for(&server).await.classify(&record()).await.unwrap_err();
    assert!(matches!(err, FilterError::Critical { .. }));
}

#[tokio::test]
async fn test_slow_classifier_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(completion(r#"{"is_disease_pathway": true}"#))
                .set_delay(SLOW_RESPONSE),
        )
        .mount(&server)
        .await;

    let err = filter_for(&server).await.classify(&record()).await.unwrap_err();
    assert_eq!(err, FilterError::Timeout);
}

#[test]
fn test_parse_decision_variants() {
    assert_eq!(
        OpenAiRelevanceFilter::parse_decision(r#"{"is_disease_pathway": "yes"}"#),
        Ok(Relevance::Keep)
    );
    assert_eq!(
        OpenAiRelevanceFilter::parse_decision(r#"Answer: {"is_disease_pathway": false}"#),
        Ok(Relevance::Discard)
    );
    assert!(OpenAiRelevanceFilter::parse_decision(r#"{"confidence": "low"}"#).is_err());
}
