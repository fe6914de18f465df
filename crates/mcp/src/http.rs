//! Streamable HTTP client used by the rmcp transport.
//!
//! Requests are optionally SigV4-signed. Responses may be a single JSON-RPC
//! message or an SSE stream; both are handed back to rmcp.

use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;

use foreman_security::SigV4Signer;
use futures::StreamExt;
use futures::stream::BoxStream;
use reqwest::header::{ACCEPT, CONTENT_TYPE, USER_AGENT};
use rmcp::model::{ClientJsonRpcMessage, ServerJsonRpcMessage};
use rmcp::transport::common::http_header::{
    EVENT_STREAM_MIME_TYPE, HEADER_LAST_EVENT_ID, HEADER_SESSION_ID, JSON_MIME_TYPE,
};
use rmcp::transport::streamable_http_client::{
    SseError, StreamableHttpClient, StreamableHttpError, StreamableHttpPostResponse,
};
use sse_stream::{Sse, SseStream};
use tracing::warn;

type HttpResult<T> = Result<T, StreamableHttpError<reqwest::Error>>;

#[derive(Clone)]
pub(crate) struct GatewayHttpClient {
    client: reqwest::Client,
    signer: Option<SigV4Signer>,
}

impl GatewayHttpClient {
    pub(crate) fn new(signer: Option<SigV4Signer>) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Failed to create HTTP client, using default config");
                reqwest::Client::new()
            });
        Self { client, signer }
    }

    /// Attach SigV4 headers when signing is enabled.
    ///
    /// `signed_headers` must be exactly the headers the request will carry
    /// besides `host` and the `x-amz-*` headers added here.
    fn sign(
        &self,
        request: reqwest::RequestBuilder,
        method: &str,
        uri: &str,
        signed_headers: &[(&str, &str)],
        body: &[u8],
    ) -> HttpResult<reqwest::RequestBuilder> {
        let Some(signer) = &self.signer else {
            return Ok(request);
        };
        let headers = signer
            .sign(method, uri, signed_headers, body)
            .map_err(|e| {
                StreamableHttpError::UnexpectedServerResponse(Cow::Owned(format!(
                    "request signing failed: {e}"
                )))
            })?;
        Ok(headers
            .into_iter()
            .fold(request, |request, (name, value)| request.header(name, value)))
    }
}

fn accept_both() -> String {
    [EVENT_STREAM_MIME_TYPE, JSON_MIME_TYPE].join(", ")
}

impl StreamableHttpClient for GatewayHttpClient {
    type Error = reqwest::Error;

    async fn get_stream(
        &self,
        uri: Arc<str>,
        session_id: Arc<str>,
        last_event_id: Option<String>,
        auth_token: Option<String>,
    ) -> HttpResult<BoxStream<'static, Result<Sse, SseError>>> {
        let mut request = self
            .client
            .get(uri.as_ref())
            .header(ACCEPT, accept_both())
            .header(HEADER_SESSION_ID, session_id.as_ref())
            .header(USER_AGENT, user_agent());
        if let Some(last_event_id) = last_event_id {
            request = request.header(HEADER_LAST_EVENT_ID, last_event_id);
        }
        if let Some(token) = auth_token {
            request = request.bearer_auth(token);
        }
        let request = self.sign(request, "GET", &uri, &[], b"")?;

        let response = request.send().await?;
        if response.status() == reqwest::StatusCode::METHOD_NOT_ALLOWED {
            return Err(StreamableHttpError::ServerDoesNotSupportSse);
        }
        let response = response.error_for_status()?;

        match response.headers().get(CONTENT_TYPE) {
            Some(ct)
                if ct.as_bytes().starts_with(EVENT_STREAM_MIME_TYPE.as_bytes())
                    || ct.as_bytes().starts_with(JSON_MIME_TYPE.as_bytes()) => {}
            other => {
                return Err(StreamableHttpError::UnexpectedContentType(
                    other.map(|ct| String::from_utf8_lossy(ct.as_bytes()).to_string()),
                ));
            }
        }

        Ok(SseStream::from_byte_stream(response.bytes_stream()).boxed())
    }

    async fn delete_session(
        &self,
        uri: Arc<str>,
        session: Arc<str>,
        auth_token: Option<String>,
    ) -> HttpResult<()> {
        let mut request = self
            .client
            .delete(uri.as_ref())
            .header(HEADER_SESSION_ID, session.as_ref())
            .header(USER_AGENT, user_agent());
        if let Some(token) = auth_token {
            request = request.bearer_auth(token);
        }
        let request = self.sign(request, "DELETE", &uri, &[], b"")?;

        let response = request.send().await?;
        if response.status() == reqwest::StatusCode::METHOD_NOT_ALLOWED {
            return Ok(());
        }
        response.error_for_status()?;
        Ok(())
    }

    async fn post_message(
        &self,
        uri: Arc<str>,
        message: ClientJsonRpcMessage,
        session_id: Option<Arc<str>>,
        auth_token: Option<String>,
    ) -> HttpResult<StreamableHttpPostResponse> {
        let body = serde_json::to_vec(&message).map_err(|e| {
            StreamableHttpError::UnexpectedServerResponse(Cow::Owned(format!(
                "failed to encode request: {e}"
            )))
        })?;

        let mut request = self
            .client
            .post(uri.as_ref())
            .header(ACCEPT, accept_both())
            .header(CONTENT_TYPE, JSON_MIME_TYPE)
            .header(USER_AGENT, user_agent());
        if let Some(token) = auth_token {
            request = request.bearer_auth(token);
        }
        if let Some(session_id) = session_id {
            request = request.header(HEADER_SESSION_ID, session_id.as_ref());
        }
        let request = self.sign(
            request,
            "POST",
            &uri,
            &[("content-type", JSON_MIME_TYPE)],
            &body,
        )?;

        let response = request.body(body).send().await?;
        let status = response.status();
        let response = response.error_for_status()?;

        if matches!(
            status,
            reqwest::StatusCode::ACCEPTED | reqwest::StatusCode::NO_CONTENT
        ) {
            return Ok(StreamableHttpPostResponse::Accepted);
        }

        let session_id = response
            .headers()
            .get(HEADER_SESSION_ID)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|ct| ct.to_str().ok())
            .map(|s| s.to_string());

        match content_type.as_deref() {
            Some(ct) if ct.starts_with(EVENT_STREAM_MIME_TYPE) => {
                let stream = SseStream::from_byte_stream(response.bytes_stream()).boxed();
                Ok(StreamableHttpPostResponse::Sse(stream, session_id))
            }
            Some(ct) if ct.starts_with(JSON_MIME_TYPE) => {
                let message: ServerJsonRpcMessage = response.json().await?;
                Ok(StreamableHttpPostResponse::Json(message, session_id))
            }
            _ => {
                // Some gateways answer notifications with 200 and an empty,
                // untyped body.
                let bytes = response.bytes().await?;
                if bytes.iter().all(u8::is_ascii_whitespace) {
                    return Ok(StreamableHttpPostResponse::Accepted);
                }
                if let Ok(message) = serde_json::from_slice::<ServerJsonRpcMessage>(&bytes) {
                    return Ok(StreamableHttpPostResponse::Json(message, session_id));
                }
                Err(StreamableHttpError::UnexpectedContentType(content_type))
            }
        }
    }
}

fn user_agent() -> &'static str {
    concat!("foreman/", env!("CARGO_PKG_VERSION"))
}
