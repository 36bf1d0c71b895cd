use crate::puml_server::config::ServerConfig;
use puml_core::assist::{AssistClient, AssistCredentials, AssistError, Generated};
use puml_core::render::{RenderClient, RenderType};
use puml_core::service::ServiceError;
use puml_core::source;
use reqwest::{header, Client, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::time::{sleep, Duration};
use tracing::{debug, error, info, warn};
use url::Url;

const TARGET: &str = "providers::puml_server";

#[derive(Clone)]
pub struct PumlServerClient {
    http: Client,
    base: Url,
    cfg: ServerConfig,
}

#[derive(Debug, Deserialize)]
struct IdResponse {
    #[serde(default)]
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SourceResponse {
    puml: String,
}

// generate/explain/optimize all answer with some subset of these fields.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssistResponse {
    puml: Option<String>,
    content: Option<String>,
    explanation: Option<String>,
    conversation_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AssistRequest<'a> {
    base_url: &'a str,
    api_key: &'a str,
    model: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    prompt: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    puml: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    language: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    conversation_id: Option<&'a str>,
    stream: bool,
}

impl<'a> AssistRequest<'a> {
    fn new(creds: &'a AssistCredentials) -> Self {
        Self {
            base_url: &creds.base_url,
            api_key: &creds.api_key,
            model: &creds.model,
            prompt: None,
            puml: None,
            language: None,
            conversation_id: None,
            stream: false,
        }
    }
}

impl PumlServerClient {
    pub fn new(cfg: ServerConfig) -> anyhow::Result<Self> {
        let base = Url::parse(&cfg.base_url)?;
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );
        let mut builder = Client::builder()
            .default_headers(headers)
            .use_rustls_tls()
            .pool_idle_timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(2)
            .timeout(cfg.timeout);
        if let Some(p) = &cfg.proxy {
            builder = builder.proxy(reqwest::Proxy::all(p)?);
        }
        let http = builder.build()?;
        Ok(Self { http, base, cfg })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.cfg
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        endpoint(&self.base, segments)
    }

    async fn post_json<B, T>(&self, segments: &[&str], body: &B) -> Result<T, ServiceError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.endpoint(segments);
        debug!(target: TARGET, "POST {}", url);
        let resp = self
            .http
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(map_reqwest_err)?;
        let resp = check_status(resp).await?;
        resp.json::<T>()
            .await
            .map_err(|e| ServiceError::Decode(e.to_string()))
    }

    // GETs are idempotent, so transient failures are retried with backoff.
    async fn get(&self, segments: &[&str]) -> Result<reqwest::Response, ServiceError> {
        let url = self.endpoint(segments);
        let max_attempts = self.cfg.max_retries.max(1);
        let mut attempt = 0u32;
        loop {
            debug!(target: TARGET, "GET {} attempt={}", url, attempt + 1);
            let result = match self.http.get(url.clone()).send().await {
                Ok(resp) => check_status(resp).await,
                Err(e) => Err(map_reqwest_err(e)),
            };
            match result {
                Err(e) if is_transient(&e) && attempt + 1 < max_attempts => {
                    attempt += 1;
                    warn!(target: TARGET, "GET {} failed ({}), retrying", url, e);
                    sleep(Duration::from_millis(300 * attempt as u64)).await;
                }
                other => return other,
            }
        }
    }

    async fn assist(
        &self,
        op: &str,
        body: &AssistRequest<'_>,
    ) -> Result<AssistResponse, AssistError> {
        info!(target: TARGET, "assist {} model={}", op, body.model);
        self.post_json(&["api", "v1", "puml", op], body)
            .await
            .map_err(AssistError::from)
    }
}

#[allow(async_fn_in_trait)]
impl RenderClient for PumlServerClient {
    async fn render(&self, kind: RenderType, source: &str) -> Result<String, ServiceError> {
        info!(target: TARGET, "render type={} bytes={}", kind, source.len());
        let body = serde_json::json!({ "puml": source });
        let resp: IdResponse = self
            .post_json(&["api", "v1", "render", kind.as_str()], &body)
            .await?;
        require_id(resp)
    }

    async fn share(&self, source: &str) -> Result<String, ServiceError> {
        let body = serde_json::json!({ "puml": source });
        let resp: IdResponse = self.post_json(&["api", "v1", "puml"], &body).await?;
        require_id(resp)
    }

    async fn fetch_source(&self, id: &str) -> Result<String, ServiceError> {
        let resp = self.get(&["api", "v1", "puml", id]).await?;
        let body: SourceResponse = resp
            .json()
            .await
            .map_err(|e| ServiceError::Decode(e.to_string()))?;
        Ok(body.puml)
    }

    async fn raw_text(&self, kind: RenderType, id: &str) -> Result<String, ServiceError> {
        let resp = self
            .get(&["api", "v1", "render", kind.as_str(), id, "raw"])
            .await?;
        resp.text().await.map_err(map_reqwest_err)
    }

    async fn raw_bytes(&self, kind: RenderType, id: &str) -> Result<Vec<u8>, ServiceError> {
        let resp = self
            .get(&["api", "v1", "render", kind.as_str(), id, "raw"])
            .await?;
        let bytes = resp.bytes().await.map_err(map_reqwest_err)?;
        Ok(bytes.to_vec())
    }

    fn raw_url(&self, kind: RenderType, id: &str) -> String {
        self.endpoint(&["api", "v1", "render", kind.as_str(), id, "raw"])
            .to_string()
    }
}

#[allow(async_fn_in_trait)]
impl AssistClient for PumlServerClient {
    async fn generate(
        &self,
        creds: &AssistCredentials,
        prompt: &str,
        conversation_id: Option<&str>,
    ) -> Result<Generated, AssistError> {
        let body = AssistRequest {
            prompt: Some(prompt),
            conversation_id,
            ..AssistRequest::new(creds)
        };
        let resp = self.assist("generate", &body).await?;
        Ok(generated_from(resp))
    }

    async fn explain(
        &self,
        creds: &AssistCredentials,
        source: &str,
        language: &str,
    ) -> Result<String, AssistError> {
        let body = AssistRequest {
            puml: Some(source),
            language: Some(language),
            ..AssistRequest::new(creds)
        };
        let resp = self.assist("explain", &body).await?;
        Ok(first_non_empty(&[resp.content, resp.explanation]))
    }

    async fn optimize(
        &self,
        creds: &AssistCredentials,
        source: &str,
    ) -> Result<String, AssistError> {
        let body = AssistRequest {
            puml: Some(source),
            ..AssistRequest::new(creds)
        };
        let resp = self.assist("optimize", &body).await?;
        Ok(first_non_empty(&[resp.puml, resp.content]))
    }
}

fn endpoint(base: &Url, segments: &[&str]) -> Url {
    let mut url = base.clone();
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty().extend(segments);
    }
    url
}

fn require_id(resp: IdResponse) -> Result<String, ServiceError> {
    resp.id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| ServiceError::InvalidResponse("missing id".into()))
}

fn generated_from(resp: AssistResponse) -> Generated {
    let content = first_non_empty(&[resp.puml, resp.content]);
    let puml = source::extract_puml(&content);
    Generated {
        content,
        puml,
        conversation_id: resp.conversation_id.filter(|c| !c.is_empty()),
    }
}

fn first_non_empty(candidates: &[Option<String>]) -> String {
    candidates
        .iter()
        .flatten()
        .find(|s| !s.is_empty())
        .cloned()
        .unwrap_or_default()
}

fn is_transient(e: &ServiceError) -> bool {
    matches!(e, ServiceError::Network(_) | ServiceError::Timeout(_))
}

async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, ServiceError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.ok();
    error!(target: TARGET, "non-200 status={} body={:?}", status, body);
    Err(map_status_err(status, body))
}

fn map_reqwest_err(e: reqwest::Error) -> ServiceError {
    if e.is_timeout() {
        ServiceError::Timeout(e.to_string())
    } else if e.is_request() || e.is_connect() {
        ServiceError::Network(e.to_string())
    } else if e.is_decode() {
        ServiceError::Decode(e.to_string())
    } else {
        ServiceError::Other(e.to_string())
    }
}

fn map_status_err(status: StatusCode, body: Option<String>) -> ServiceError {
    let s = format!("{} {}", status.as_u16(), body.unwrap_or_default());
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ServiceError::Auth(s),
        StatusCode::TOO_MANY_REQUESTS => ServiceError::RateLimit(s),
        StatusCode::NOT_FOUND => ServiceError::NotFound(s),
        StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT => {
            ServiceError::Network(s)
        }
        _ => ServiceError::Other(s),
    }
}
