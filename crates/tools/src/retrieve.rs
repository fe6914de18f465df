//! Knowledge base retrieval tool.
//!
//! Calls the Bedrock knowledge base `Retrieve` API (SigV4-signed for the
//! `bedrock` service) and returns the passages scoring at or above the
//! configured threshold, best first.

use async_trait::async_trait;
use foreman_config::KnowledgeBaseConfig;
use foreman_core::error::ToolError;
use foreman_core::tool::{Tool, ToolResult};
use foreman_security::{Credentials, SigV4Signer};
use serde::{Deserialize, Serialize};
use tracing::debug;

const SIGNING_SERVICE: &str = "bedrock";
const MAX_RESULTS: u64 = 100;

pub struct RetrieveTool {
    knowledge_base_id: Option<String>,
    region: String,
    endpoint: Option<String>,
    top_k: u32,
    min_score: f64,
    credentials: Option<Credentials>,
    client: reqwest::Client,
}

impl RetrieveTool {
    pub fn new(config: &KnowledgeBaseConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            knowledge_base_id: config.id.clone().filter(|id| !id.is_empty()),
            region: config.region.clone(),
            endpoint: config.endpoint.clone(),
            top_k: config.top_k,
            min_score: config.min_score,
            credentials: None,
            client,
        }
    }

    /// Use fixed credentials instead of reading `AWS_*` at call time.
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    fn base_url(&self) -> String {
        self.endpoint
            .as_deref()
            .map(|e| e.trim_end_matches('/').to_string())
            .unwrap_or_else(|| format!("https://bedrock-agent-runtime.{}.amazonaws.com", self.region))
    }

    fn credentials(&self) -> Result<Credentials, ToolError> {
        match &self.credentials {
            Some(credentials) => Ok(credentials.clone()),
            None => Credentials::from_env().map_err(|e| ToolError::NotConfigured(e.to_string())),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RetrieveRequest<'a> {
    retrieval_query: RetrievalQuery<'a>,
    retrieval_configuration: RetrievalConfiguration,
}

#[derive(Debug, Serialize)]
struct RetrievalQuery<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RetrievalConfiguration {
    vector_search_configuration: VectorSearchConfiguration,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VectorSearchConfiguration {
    number_of_results: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RetrieveResponse {
    #[serde(default)]
    retrieval_results: Vec<RetrievalResult>,
}

#[derive(Debug, Deserialize)]
struct RetrievalResult {
    #[serde(default)]
    content: RetrievalContent,
    #[serde(default)]
    location: Option<serde_json::Value>,
    #[serde(default)]
    score: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct RetrievalContent {
    #[serde(default)]
    text: String,
}

/// A passage returned to the model.
#[derive(Debug, Clone, Serialize)]
struct Passage {
    score: f64,
    source: String,
    content: String,
}

/// Best-effort human readable origin of a result.
fn source_of(location: Option<&serde_json::Value>) -> String {
    let Some(location) = location else {
        return "unknown".into();
    };
    [
        "/s3Location/uri",
        "/webLocation/url",
        "/confluenceLocation/url",
        "/sharePointLocation/url",
        "/customDocumentLocation/id",
    ]
    .iter()
    .find_map(|pointer| location.pointer(pointer).and_then(|v| v.as_str()))
    .unwrap_or("unknown")
    .to_string()
}

fn select_passages(results: Vec<RetrievalResult>, min_score: f64) -> Vec<Passage> {
    let mut passages: Vec<Passage> = results
        .into_iter()
        .filter_map(|r| {
            let score = r.score.unwrap_or(0.0);
            (score >= min_score).then(|| Passage {
                score,
                source: source_of(r.location.as_ref()),
                content: r.content.text,
            })
        })
        .collect();
    passages.sort_by(|a, b| b.score.total_cmp(&a.score));
    passages
}

fn render(passages: &[Passage], min_score: f64) -> String {
    if passages.is_empty() {
        return format!("No results found with score >= {min_score}.");
    }
    let mut out = format!(
        "Retrieved {} results with score >= {min_score}:\n",
        passages.len()
    );
    for passage in passages {
        out.push_str(&format!(
            "\nScore: {:.4}\nSource: {}\nContent: {}\n",
            passage.score, passage.source, passage.content
        ));
    }
    out
}

#[async_trait]
impl Tool for RetrieveTool {
    fn name(&self) -> &str {
        "retrieve"
    }

    fn description(&self) -> &str {
        "Retrieve relevant passages from the knowledge base. Use this for documentation, procedures, and reference material."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "text": {
                    "type": "string",
                    "description": "The query to retrieve relevant knowledge"
                },
                "numberOfResults": {
                    "type": "integer",
                    "description": "Maximum number of results to return",
                    "default": self.top_k
                },
                "score": {
                    "type": "number",
                    "description": "Minimum relevance score (0.0-1.0)",
                    "default": self.min_score
                },
                "knowledgeBaseId": {
                    "type": "string",
                    "description": "Knowledge base to search instead of the configured one"
                }
            },
            "required": ["text"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let text = arguments["text"]
            .as_str()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'text' argument".into()))?;

        let kb_id = arguments["knowledgeBaseId"]
            .as_str()
            .filter(|id| !id.is_empty())
            .map(String::from)
            .or_else(|| self.knowledge_base_id.clone())
            .ok_or_else(|| ToolError::NotConfigured("No knowledge base id configured".into()))?;

        let number_of_results = arguments["numberOfResults"]
            .as_u64()
            .unwrap_or(u64::from(self.top_k))
            .clamp(1, MAX_RESULTS);
        let min_score = arguments["score"].as_f64().unwrap_or(self.min_score);

        let url = format!("{}/knowledgebases/{kb_id}/retrieve", self.base_url());
        let body = serde_json::to_vec(&RetrieveRequest {
            retrieval_query: RetrievalQuery { text },
            retrieval_configuration: RetrievalConfiguration {
                vector_search_configuration: VectorSearchConfiguration { number_of_results },
            },
        })
        .map_err(|e| ToolError::InvalidArguments(e.to_string()))?;

        let signer = SigV4Signer::new(&self.region, SIGNING_SERVICE, self.credentials()?);
        let signed = signer
            .sign("POST", &url, &[("content-type", "application/json")], &body)
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "retrieve".into(),
                reason: e.to_string(),
            })?;

        debug!(knowledge_base = %kb_id, number_of_results, "Retrieving from knowledge base");

        let request = signed.into_iter().fold(
            self.client
                .post(&url)
                .header("content-type", "application/json")
                .body(body),
            |request, (name, value)| request.header(name, value),
        );

        let failed = |reason: String| ToolError::ExecutionFailed {
            tool_name: "retrieve".into(),
            reason,
        };

        let response = request.send().await.map_err(|e| failed(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(failed(format!("HTTP {}: {body}", status.as_u16())));
        }

        let parsed: RetrieveResponse = response
            .json()
            .await
            .map_err(|e| failed(format!("invalid response: {e}")))?;

        let passages = select_passages(parsed.retrieval_results, min_score);

        Ok(ToolResult {
            call_id: String::new(),
            success: true,
            output: render(&passages, min_score),
            data: serde_json::to_value(&passages).ok(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Json;
    use axum::http::HeaderMap;
    use axum::routing::post;
    use std::sync::{Arc, Mutex};

    #[derive(Default, Clone)]
    struct Captured {
        path: Arc<Mutex<Option<String>>>,
        body: Arc<Mutex<Option<serde_json::Value>>>,
        authorization: Arc<Mutex<Option<String>>>,
    }

    async fn spawn_kb(captured: Captured) -> String {
        let app = axum::Router::new().route(
            "/knowledgebases/{id}/retrieve",
            post(
                move |axum::extract::Path(id): axum::extract::Path<String>,
                      headers: HeaderMap,
                      Json(body): Json<serde_json::Value>| {
                    let captured = captured.clone();
                    async move {
                        *captured.path.lock().unwrap() = Some(id);
                        *captured.body.lock().unwrap() = Some(body);
                        *captured.authorization.lock().unwrap() = headers
                            .get("authorization")
                            .and_then(|v| v.to_str().ok())
                            .map(String::from);
                        Json(serde_json::json!({
                            "retrievalResults": [
                                { "content": { "text": "Lockout procedure for line 3" },
                                  "location": { "s3Location": { "uri": "s3://docs/loto.pdf" } },
                                  "score": 0.62 },
                                { "content": { "text": "Cafeteria menu" }, "score": 0.12 },
                                { "content": { "text": "Line 3 changeover checklist" },
                                  "location": { "customDocumentLocation": { "id": "doc-9" } },
                                  "score": 0.81 }
                            ]
                        }))
                    }
                },
            ),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn config(endpoint: Option<String>, id: Option<&str>) -> KnowledgeBaseConfig {
        KnowledgeBaseConfig {
            id: id.map(String::from),
            endpoint,
            ..Default::default()
        }
    }

    fn creds() -> Credentials {
        Credentials::new("AKIDTEST", "secret", None)
    }

    #[tokio::test]
    async fn retrieves_filters_and_sorts() {
        let captured = Captured::default();
        let base = spawn_kb(captured.clone()).await;
        let tool = RetrieveTool::new(&config(Some(base), Some("KB123"))).with_credentials(creds());

        let result = tool
            .execute(serde_json::json!({"text": "line 3 procedures"}))
            .await
            .unwrap();

        assert!(result.success);
        assert!(result.output.starts_with("Retrieved 2 results"));
        let checklist = result.output.find("changeover").unwrap();
        let lockout = result.output.find("Lockout").unwrap();
        assert!(checklist < lockout);
        assert!(!result.output.contains("Cafeteria"));
        assert!(result.output.contains("s3://docs/loto.pdf"));
        assert!(result.output.contains("doc-9"));

        assert_eq!(captured.path.lock().unwrap().as_deref(), Some("KB123"));
        let body = captured.body.lock().unwrap().clone().unwrap();
        assert_eq!(body["retrievalQuery"]["text"], "line 3 procedures");
        assert_eq!(
            body["retrievalConfiguration"]["vectorSearchConfiguration"]["numberOfResults"],
            5
        );
        let auth = captured.authorization.lock().unwrap().clone().unwrap();
        assert!(auth.contains("/us-east-1/bedrock/aws4_request"));
    }

    #[tokio::test]
    async fn argument_overrides() {
        let captured = Captured::default();
        let base = spawn_kb(captured.clone()).await;
        let tool = RetrieveTool::new(&config(Some(base), None)).with_credentials(creds());

        let result = tool
            .execute(serde_json::json!({
                "text": "anything",
                "knowledgeBaseId": "OTHER",
                "numberOfResults": 2,
                "score": 0.7
            }))
            .await
            .unwrap();

        assert!(result.output.starts_with("Retrieved 1 results"));
        assert_eq!(captured.path.lock().unwrap().as_deref(), Some("OTHER"));
        let body = captured.body.lock().unwrap().clone().unwrap();
        assert_eq!(
            body["retrievalConfiguration"]["vectorSearchConfiguration"]["numberOfResults"],
            2
        );
    }

    #[tokio::test]
    async fn missing_text_is_invalid() {
        let tool = RetrieveTool::new(&config(None, Some("KB"))).with_credentials(creds());
        let err = tool.execute(serde_json::json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn missing_knowledge_base_is_not_configured() {
        let tool = RetrieveTool::new(&config(None, None)).with_credentials(creds());
        let err = tool
            .execute(serde_json::json!({"text": "oee"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::NotConfigured(_)));
    }

    #[test]
    fn empty_selection_renders_notice() {
        assert_eq!(render(&[], 0.4), "No results found with score >= 0.4.");
    }

    #[test]
    fn default_endpoint_uses_region() {
        let tool = RetrieveTool::new(&KnowledgeBaseConfig {
            region: "eu-central-1".into(),
            ..Default::default()
        });
        assert_eq!(
            tool.base_url(),
            "https://bedrock-agent-runtime.eu-central-1.amazonaws.com"
        );
    }

    #[test]
    fn definition_requires_text() {
        let tool = RetrieveTool::new(&KnowledgeBaseConfig::default());
        let def = tool.to_definition();
        assert_eq!(def.name, "retrieve");
        assert_eq!(def.parameters["required"][0], "text");
    }
}
