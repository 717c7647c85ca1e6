use crate::config::FeishuConfig;
use crate::credentials::Credentials;
use crate::notify::MessageSender;
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum FeishuError {
    #[error("failed to build HTTP client: {0}")]
    Client(reqwest::Error),
    #[error("request to {endpoint} failed: {source}")]
    Http {
        endpoint: &'static str,
        source: reqwest::Error,
    },
    #[error("{endpoint} returned HTTP {status}: {body}")]
    Status {
        endpoint: &'static str,
        status: u16,
        body: String,
    },
    #[error("{endpoint} returned code {code}: {msg}")]
    Api {
        endpoint: &'static str,
        code: i64,
        msg: String,
    },
    #[error("token response carried no tenant_access_token")]
    MissingToken,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    code: i64,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    tenant_access_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    code: i64,
    #[serde(default)]
    msg: String,
}

const TOKEN_ENDPOINT: &str = "tenant_access_token";
const MESSAGE_ENDPOINT: &str = "im/v1/messages";
const USER_AGENT: &str = concat!("hostmon/", env!("CARGO_PKG_VERSION"));

/// Sends text messages through the Feishu open platform: a tenant token
/// exchange followed by one message call.
#[derive(Debug, Clone)]
pub struct FeishuClient {
    client: Client,
    api_base: String,
    receive_id: String,
    receive_id_type: String,
}

impl FeishuClient {
    pub fn new(cfg: &FeishuConfig) -> Result<Self, FeishuError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(cfg.request_timeout())
            .build()
            .map_err(FeishuError::Client)?;
        Ok(Self {
            client,
            api_base: cfg.api_base.trim_end_matches('/').to_string(),
            receive_id: cfg.receive_id.clone(),
            receive_id_type: cfg.receive_id_type.clone(),
        })
    }

    pub async fn tenant_access_token(&self, creds: &Credentials) -> Result<String, FeishuError> {
        let url = format!(
            "{}/open-apis/auth/v3/tenant_access_token/internal",
            self.api_base
        );
        let resp = self
            .client
            .post(url)
            .json(&json!({
                "app_id": creds.app_id,
                "app_secret": creds.app_secret,
            }))
            .send()
            .await
            .map_err(|source| FeishuError::Http {
                endpoint: TOKEN_ENDPOINT,
                source,
            })?;

        let body: TokenResponse = read_json(TOKEN_ENDPOINT, resp).await?;
        if body.code != 0 {
            return Err(FeishuError::Api {
                endpoint: TOKEN_ENDPOINT,
                code: body.code,
                msg: body.msg,
            });
        }
        body.tenant_access_token
            .filter(|token| !token.is_empty())
            .ok_or(FeishuError::MissingToken)
    }

    pub async fn send_text(&self, token: &str, text: &str) -> Result<(), FeishuError> {
        let url = format!(
            "{}/open-apis/im/v1/messages?receive_id_type={}",
            self.api_base, self.receive_id_type
        );
        // Feishu expects `content` as a JSON document encoded into a string.
        let content = json!({ "text": text }).to_string();
        let resp = self
            .client
            .post(url)
            .bearer_auth(token)
            .json(&json!({
                "receive_id": self.receive_id,
                "msg_type": "text",
                "content": content,
            }))
            .send()
            .await
            .map_err(|source| FeishuError::Http {
                endpoint: MESSAGE_ENDPOINT,
                source,
            })?;

        let body: MessageResponse = read_json(MESSAGE_ENDPOINT, resp).await?;
        if body.code != 0 {
            return Err(FeishuError::Api {
                endpoint: MESSAGE_ENDPOINT,
                code: body.code,
                msg: body.msg,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl MessageSender for FeishuClient {
    type Error = FeishuError;

    async fn send(&self, credentials: &Credentials, text: &str) -> Result<(), FeishuError> {
        let token = self.tenant_access_token(credentials).await?;
        debug!("tenant access token acquired");
        self.send_text(&token, text).await
    }
}

async fn read_json<T: DeserializeOwned>(
    endpoint: &'static str,
    resp: Response,
) -> Result<T, FeishuError> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(FeishuError::Status {
            endpoint,
            status: status.as_u16(),
            body,
        });
    }
    resp.json::<T>()
        .await
        .map_err(|source| FeishuError::Http { endpoint, source })
}
