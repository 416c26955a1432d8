// Enrichment task handler
// Decision: Upsert failures fail the task; tagging failures are only logged
// Decision: Every outbound call races the task's cancellation token

use std::future::Future;

use async_trait::async_trait;
use noscope_durable::{HandlerContext, HandlerError, HandlerResult, TaskHandler};
use reqwest::Client;
use serde::Serialize;
use serde_json::{json, Value};

use crate::config::{EnrichmentConfig, TagSink, UpsertSink};

/// Attributes requested from the enrichment service
pub const DATA_MODELS: [&str; 12] = [
    "name",
    "github",
    "labels",
    "caption",
    "summary",
    "linkedin",
    "framework",
    "blockchain",
    "product_category",
    "professional_dev",
    "organisation",
    "organisation_url",
];

#[derive(Debug, Serialize)]
struct UpsertRequest<'a> {
    object_id: &'a str,
    object_type_id: &'a str,
    type_values: &'a Value,
}

#[derive(Debug, Serialize)]
struct TagRequest<'a> {
    object_id: &'a str,
    tags: Vec<String>,
}

/// Split a labels string on `,` `#` `@` `;` `/` into trimmed, non-empty tags
pub fn split_labels(labels: &str) -> Vec<String> {
    labels
        .split([',', '#', '@', ';', '/'])
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(str::to_string)
        .collect()
}

/// Enriches an object through the external enrichment API and stores the result
pub struct EnrichmentHandler {
    client: Client,
    config: EnrichmentConfig,
}

impl EnrichmentHandler {
    pub fn new(config: EnrichmentConfig) -> Self {
        Self::with_client(Client::new(), config)
    }

    pub fn with_client(client: Client, config: EnrichmentConfig) -> Self {
        Self { client, config }
    }

    async fn enrich(&self, input: &Value) -> Result<Value, HandlerError> {
        let body = json!({ "input": input, "data_models": DATA_MODELS });
        let response = self
            .client
            .post(&self.config.enrich_url)
            .header("x-api-key", &self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| HandlerError::failed(format!("execute noscope request: {e}")))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| HandlerError::failed(format!("read noscope response: {e}")))?;
        if status.is_client_error() || status.is_server_error() {
            return Err(HandlerError::failed(format!(
                "noscope API returned status code {}: {}",
                status.as_u16(),
                text
            )));
        }

        serde_json::from_str(&text)
            .map_err(|e| HandlerError::failed(format!("parse noscope response: {e}")))
    }

    async fn upsert(
        &self,
        sink: &UpsertSink,
        object_id: &str,
        result: &Value,
    ) -> Result<(), HandlerError> {
        let body = UpsertRequest {
            object_id,
            object_type_id: &sink.object_type_id,
            type_values: result,
        };
        let response = self
            .client
            .post(&sink.url)
            .bearer_auth(&sink.jwt)
            .json(&body)
            .send()
            .await
            .map_err(|e| HandlerError::failed(format!("execute muninn request: {e}")))?;

        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            let text = response.text().await.unwrap_or_default();
            return Err(HandlerError::failed(format!(
                "muninn API returned status code {}: {}",
                status.as_u16(),
                text
            )));
        }
        Ok(())
    }

    async fn tag(&self, sink: &TagSink, object_id: &str, result: &Value) -> Result<(), HandlerError> {
        let labels = result.get("labels").and_then(Value::as_str).unwrap_or_default();
        let tags = split_labels(labels);
        if tags.is_empty() {
            return Ok(());
        }

        let mut request = self
            .client
            .post(&sink.url)
            .json(&TagRequest { object_id, tags });
        if let Some(jwt) = &sink.jwt {
            request = request.bearer_auth(jwt);
        }

        let response = request
            .send()
            .await
            .map_err(|e| HandlerError::failed(format!("execute tag request: {e}")))?;
        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            let text = response.text().await.unwrap_or_default();
            return Err(HandlerError::failed(format!(
                "muninn tag API returned status code {}: {}",
                status.as_u16(),
                text
            )));
        }
        Ok(())
    }
}

/// Run `call` unless the task is abandoned first
async fn cancellable<T>(
    ctx: &HandlerContext,
    call: impl Future<Output = Result<T, HandlerError>>,
) -> Result<T, HandlerError> {
    tokio::select! {
        biased;
        _ = ctx.cancelled() => Err(HandlerError::Cancelled("enrichment abandoned".into())),
        result = call => result,
    }
}

#[async_trait]
impl TaskHandler for EnrichmentHandler {
    fn name(&self) -> &str {
        "enrichment"
    }

    async fn handle(&self, ctx: &HandlerContext, input: Value) -> HandlerResult {
        let result = cancellable(ctx, self.enrich(&input)).await?;

        if let Some(sink) = &self.config.upsert {
            cancellable(ctx, self.upsert(sink, &ctx.object_id, &result)).await?;
        }

        if let Some(sink) = &self.config.tags {
            if let Err(e) = cancellable(ctx, self.tag(sink, &ctx.object_id, &result)).await {
                tracing::warn!(task_id = %ctx.task_id, "Failed to tag object: {}", e);
            }
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::{extract::State, http::HeaderMap, http::StatusCode, routing::post, Json, Router};
    use chrono::Utc;
    use parking_lot::Mutex;
    use tokio_util::sync::CancellationToken;
    use uuid::Uuid;

    #[derive(Clone, Default)]
    struct Recorded {
        enrich: Arc<Mutex<Vec<(Option<String>, Value)>>>,
        upserts: Arc<Mutex<Vec<(Option<String>, Value)>>>,
        tags: Arc<Mutex<Vec<Value>>>,
    }

    fn header(headers: &HeaderMap, name: &str) -> Option<String> {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    }

    /// Serve fake enrichment, upsert and tag endpoints on a random local port
    async fn fake_services(labels: &'static str) -> (String, Recorded) {
        let recorded = Recorded::default();
        let app = Router::new()
            .route(
                "/enrich",
                post(
                    move |State(rec): State<Recorded>, headers: HeaderMap, Json(body): Json<Value>| async move {
                        rec.enrich.lock().push((header(&headers, "x-api-key"), body));
                        Json(json!({"name": "Acme", "labels": labels}))
                    },
                ),
            )
            .route(
                "/upsert",
                post(
                    |State(rec): State<Recorded>, headers: HeaderMap, Json(body): Json<Value>| async move {
                        rec.upserts
                            .lock()
                            .push((header(&headers, "authorization"), body));
                        StatusCode::OK
                    },
                ),
            )
            .route(
                "/tags",
                post(|State(rec): State<Recorded>, Json(body): Json<Value>| async move {
                    rec.tags.lock().push(body);
                    StatusCode::INTERNAL_SERVER_ERROR
                }),
            )
            .route(
                "/broken",
                post(|| async { (StatusCode::BAD_GATEWAY, "upstream down") }),
            )
            .with_state(recorded.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}"), recorded)
    }

    fn ctx() -> HandlerContext {
        HandlerContext::new(Uuid::now_v7(), "object-1", Utc::now(), CancellationToken::new())
    }

    #[test]
    fn test_split_labels() {
        assert_eq!(
            split_labels("rust, web#ai@ml; data /infra"),
            vec!["rust", "web", "ai", "ml", "data", "infra"]
        );
        assert!(split_labels("").is_empty());
        assert!(split_labels(" , ;# ").is_empty());
    }

    #[tokio::test]
    async fn test_enrich_upsert_and_tag() {
        let (base, recorded) = fake_services("rust, web").await;
        let handler = EnrichmentHandler::new(EnrichmentConfig {
            enrich_url: format!("{base}/enrich"),
            api_key: "secret".into(),
            upsert: Some(UpsertSink {
                url: format!("{base}/upsert"),
                jwt: "jwt-token".into(),
                object_type_id: "type-1".into(),
            }),
            tags: Some(TagSink {
                url: format!("{base}/tags"),
                jwt: Some("jwt-token".into()),
            }),
        });

        // The tag endpoint fails; the task still succeeds
        let output = handler.handle(&ctx(), json!({"url": "https://acme.example"})).await.unwrap();
        assert_eq!(output["name"], "Acme");

        let enrich = recorded.enrich.lock();
        assert_eq!(enrich[0].0.as_deref(), Some("secret"));
        assert_eq!(enrich[0].1["input"], json!({"url": "https://acme.example"}));
        assert_eq!(enrich[0].1["data_models"].as_array().unwrap().len(), 12);

        let upserts = recorded.upserts.lock();
        assert_eq!(upserts[0].0.as_deref(), Some("Bearer jwt-token"));
        assert_eq!(upserts[0].1["object_id"], "object-1");
        assert_eq!(upserts[0].1["object_type_id"], "type-1");
        assert_eq!(upserts[0].1["type_values"]["name"], "Acme");

        let tags = recorded.tags.lock();
        assert_eq!(tags[0], json!({"object_id": "object-1", "tags": ["rust", "web"]}));
    }

    #[tokio::test]
    async fn test_error_status_fails_task() {
        let (base, _) = fake_services("").await;
        let handler = EnrichmentHandler::new(EnrichmentConfig {
            enrich_url: format!("{base}/broken"),
            api_key: "secret".into(),
            upsert: None,
            tags: None,
        });

        let err = handler.handle(&ctx(), json!({})).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "noscope API returned status code 502: upstream down"
        );
    }

    #[tokio::test]
    async fn test_upsert_failure_fails_task() {
        let (base, _) = fake_services("").await;
        let handler = EnrichmentHandler::new(EnrichmentConfig {
            enrich_url: format!("{base}/enrich"),
            api_key: "secret".into(),
            upsert: Some(UpsertSink {
                url: format!("{base}/broken"),
                jwt: "jwt".into(),
                object_type_id: "type-1".into(),
            }),
            tags: None,
        });

        let err = handler.handle(&ctx(), json!({})).await.unwrap_err();
        assert!(err.to_string().starts_with("muninn API returned status code 502"));
    }

    #[tokio::test]
    async fn test_cancelled_call_is_abandoned() {
        let handler = EnrichmentHandler::new(EnrichmentConfig {
            // Unroutable address; the call would hang until cancelled
            enrich_url: "http://10.255.255.1:9/enrich".into(),
            api_key: "secret".into(),
            upsert: None,
            tags: None,
        });

        let ctx = ctx();
        ctx.cancellation_token().cancel();
        let err = handler.handle(&ctx, json!({})).await.unwrap_err();
        assert!(matches!(err, HandlerError::Cancelled(_)));
    }
}
