//! Downstream Connect client.
//!
//! Posts JSON unary requests to backend services, forwarding the verified
//! identity via the reserved headers. Transport failures are sanitized here;
//! downstream error bodies are surfaced as-is for the proxy layer to filter.
use std::time::Duration;

use mercata_rpc::{ErrorBody, RequestContext, RpcCode, RpcError, inject_context};
use serde::Serialize;
use serde::de::DeserializeOwned;

#[derive(Debug, Clone)]
pub struct ConnectClient {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl ConnectClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        }
    }

    /// Invoke `procedure` (a `/package.Service/Method` path) with a JSON
    /// body. The request context is copied into the reserved wire headers.
    pub async fn call<Req, Resp>(
        &self,
        ctx: &RequestContext,
        procedure: &str,
        request: &Req,
    ) -> Result<Resp, RpcError>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let mut headers = axum::http::HeaderMap::new();
        inject_context(ctx, &mut headers);

        let url = format!("{}{}", self.base_url, procedure);
        let response = self
            .http
            .post(&url)
            .timeout(self.timeout)
            .headers(headers)
            .json(request)
            .send()
            .await
            .map_err(|err| transport_error(procedure, err))?;

        if response.status().is_success() {
            return response.json::<Resp>().await.map_err(|err| {
                tracing::error!(procedure = %procedure, error = %err, "undecodable downstream response");
                RpcError::internal()
            });
        }

        // Downstream Connect errors arrive as {code, message} JSON.
        match response.json::<ErrorBody>().await {
            Ok(body) => Err(RpcError::new(body.code, body.message)),
            Err(err) => {
                tracing::error!(procedure = %procedure, error = %err, "undecodable downstream error");
                Err(RpcError::internal())
            }
        }
    }
}

fn transport_error(procedure: &str, err: reqwest::Error) -> RpcError {
    if err.is_timeout() {
        tracing::warn!(procedure = %procedure, "downstream request timed out");
        return RpcError::new(RpcCode::DeadlineExceeded, "request timeout");
    }
    tracing::error!(procedure = %procedure, error = %err, "downstream request failed");
    RpcError::internal()
}
