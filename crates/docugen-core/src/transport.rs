use crate::error::{DocuGenError, Result};
use crate::request::{BodyEncoding, RequestPlan};
use reqwest::header::CONTENT_TYPE;
use reqwest::multipart::Form;
use serde::Serialize;
use serde_json::{Map, Value};
use std::time::Instant;

/// Response of a successful operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationResponse {
    pub status: u16,
    /// Parsed JSON, the raw text when the body is not JSON, or null when empty.
    pub body: Value,
}

/// Sends request plans over `reqwest`.
///
/// One attempt per plan: no retries, no timeout beyond the client default.
#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Sends `plan`. Non-success statuses become [`DocuGenError::RemoteRequest`]
    /// with the body passed through untouched.
    #[tracing::instrument(skip(self, plan), fields(method = %plan.method, url = %plan.url))]
    pub async fn send(&self, plan: RequestPlan) -> Result<OperationResponse> {
        let start = Instant::now();
        let encoding = plan.encoding();
        let RequestPlan {
            method,
            url,
            mut headers,
            body,
        } = plan;

        let mut request = self.client.request(method, url);
        match encoding {
            BodyEncoding::Multipart => {
                // reqwest writes its own content type carrying the boundary.
                headers.remove(CONTENT_TYPE);
                request = request.headers(headers);
                if let Some(Value::Object(parts)) = body {
                    request = request.multipart(multipart_form(parts));
                }
            }
            BodyEncoding::Json => {
                request = request.headers(headers);
                if let Some(body) = body {
                    request = request.json(&body);
                }
            }
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;
        let elapsed = start.elapsed().as_millis() as u64;

        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), elapsed_ms = elapsed, "Remote request failed");
            return Err(DocuGenError::RemoteRequest {
                status: status.as_u16(),
                body: text,
            });
        }

        tracing::info!(status = status.as_u16(), elapsed_ms = elapsed, "Remote request completed");
        Ok(OperationResponse {
            status: status.as_u16(),
            body: parse_body(&text),
        })
    }
}

fn parse_body(text: &str) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

/// Text parts: strings verbatim, everything else as JSON.
fn multipart_form(parts: Map<String, Value>) -> Form {
    parts.into_iter().fold(Form::new(), |form, (name, value)| {
        let text = match value {
            Value::String(s) => s,
            other => other.to_string(),
        };
        form.text(name, text)
    })
}
