pub mod history;
pub mod settings;
pub mod source;
pub mod storage;

pub mod service {
    use thiserror::Error;

    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    pub enum ServiceError {
        #[error("auth error: {0}")] Auth(String),
        #[error("rate limit: {0}")] RateLimit(String),
        #[error("timeout: {0}")] Timeout(String),
        #[error("network: {0}")] Network(String),
        #[error("not found: {0}")] NotFound(String),
        #[error("decode: {0}")] Decode(String),
        #[error("invalid response: {0}")] InvalidResponse(String),
        #[error("other: {0}")] Other(String),
    }
}

pub mod render {
    use std::{fmt, str::FromStr};

    use serde::{Deserialize, Serialize};
    use thiserror::Error;

    use crate::service::ServiceError;

    #[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
    #[serde(rename_all = "lowercase")]
    pub enum RenderType {
        Text,
        Svg,
        Png,
    }

    impl RenderType {
        pub const ALL: [RenderType; 3] = [RenderType::Png, RenderType::Svg, RenderType::Text];

        pub fn as_str(&self) -> &'static str {
            match self {
                RenderType::Text => "text",
                RenderType::Svg => "svg",
                RenderType::Png => "png",
            }
        }

        /// Image renders are previewed from a URL; text renders are fetched inline.
        pub fn has_preview_url(&self) -> bool {
            !matches!(self, RenderType::Text)
        }
    }

    impl fmt::Display for RenderType {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(self.as_str())
        }
    }

    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    #[error("unknown render type '{0}' (expected png, svg or text)")]
    pub struct ParseRenderTypeError(pub String);

    impl FromStr for RenderType {
        type Err = ParseRenderTypeError;

        fn from_str(s: &str) -> Result<Self, Self::Err> {
            match s.trim().to_ascii_lowercase().as_str() {
                "text" | "txt" => Ok(RenderType::Text),
                "svg" => Ok(RenderType::Svg),
                "png" => Ok(RenderType::Png),
                other => Err(ParseRenderTypeError(other.to_string())),
            }
        }
    }

    #[allow(async_fn_in_trait)]
    pub trait RenderClient: Send + Sync {
        /// Submit diagram source and return the service's render id.
        async fn render(&self, kind: RenderType, source: &str) -> Result<String, ServiceError>;
        /// Store diagram source for sharing; the returned id renders as png.
        async fn share(&self, source: &str) -> Result<String, ServiceError>;
        async fn fetch_source(&self, id: &str) -> Result<String, ServiceError>;
        async fn raw_text(&self, kind: RenderType, id: &str) -> Result<String, ServiceError>;
        async fn raw_bytes(&self, kind: RenderType, id: &str) -> Result<Vec<u8>, ServiceError>;
        fn raw_url(&self, kind: RenderType, id: &str) -> String;
    }
}

pub mod assist {
    use thiserror::Error;

    use crate::service::ServiceError;

    #[derive(Clone, Debug, PartialEq, Eq)]
    pub struct AssistCredentials {
        pub base_url: String,
        pub api_key: String,
        pub model: String,
    }

    impl AssistCredentials {
        pub fn new(
            base_url: Option<&str>,
            api_key: Option<&str>,
            model: &str,
        ) -> Result<Self, AssistError> {
            let api_key = api_key
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .ok_or(AssistError::MissingApiKey)?;
            let base_url = base_url
                .map(str::trim)
                .filter(|u| !u.is_empty())
                .ok_or(AssistError::MissingBaseUrl)?;
            Ok(Self {
                base_url: base_url.to_string(),
                api_key: api_key.to_string(),
                model: model.trim().to_string(),
            })
        }
    }

    #[derive(Clone, Debug, PartialEq, Eq)]
    pub struct Generated {
        pub content: String,
        pub puml: Option<String>,
        pub conversation_id: Option<String>,
    }

    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    pub enum AssistError {
        #[error("no AI API key configured")] MissingApiKey,
        #[error("no AI API base URL configured")] MissingBaseUrl,
        #[error(transparent)] Service(#[from] ServiceError),
    }

    #[allow(async_fn_in_trait)]
    pub trait AssistClient: Send + Sync {
        async fn generate(
            &self,
            creds: &AssistCredentials,
            prompt: &str,
            conversation_id: Option<&str>,
        ) -> Result<Generated, AssistError>;
        async fn explain(
            &self,
            creds: &AssistCredentials,
            source: &str,
            language: &str,
        ) -> Result<String, AssistError>;
        async fn optimize(
            &self,
            creds: &AssistCredentials,
            source: &str,
        ) -> Result<String, AssistError>;
    }

}
