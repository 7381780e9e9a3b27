use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{Value, json};
use starscore_core::{
    StarTally,
    config::{SecretString, VisionConfig},
    score::ValidationError,
};
use tracing::{debug, instrument, warn};

use super::{RecognitionClient, VisionError};

const PROMPT: &str = r#"请识别图片中包含的星级评价数据，统计5星、4星、3星、2星和1星各有多少条评价。
如果图片中没有相关信息，请返回各星级数量为0。
请严格按照以下JSON格式返回结果，不要添加任何额外内容，不要添加任何代码标记（如```等）：
{
  "5星": 0,
  "4星": 0,
  "3星": 0,
  "2星": 0,
  "1星": 0
}"#;

const TEMPERATURE: f64 = 0.1;
const MAX_TOKENS: u32 = 200;

/// OpenAI-compatible chat-completions client.
pub struct VisionApiClient {
    http: reqwest::Client,
    api_url: String,
    model: String,
    api_key: SecretString,
}

impl VisionApiClient {
    /// # Errors
    ///
    /// Returns `VisionError::Transport` if the HTTP client cannot be built.
    pub fn new(config: &VisionConfig, api_key: SecretString) -> Result<Self, VisionError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| VisionError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            api_url: config.api_url.clone(),
            model: config.model.clone(),
            api_key,
        })
    }

    fn request_body(&self, image_data: &str) -> Value {
        json!({
            "model": self.model,
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "text", "text": PROMPT },
                    { "type": "image_url", "image_url": { "url": image_data } }
                ]
            }],
            "temperature": TEMPERATURE,
            "max_tokens": MAX_TOKENS
        })
    }
}

fn transport_error(err: &reqwest::Error) -> VisionError {
    if err.is_timeout() {
        VisionError::Timeout
    } else {
        VisionError::Transport(err.to_string())
    }
}

/// Classifies a non-2xx reply. The upstream's own error message is used when
/// the body carries one.
fn status_error(status: StatusCode, body: &str) -> VisionError {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.pointer("/error/message").and_then(Value::as_str).map(String::from))
        .unwrap_or_else(|| format!("request failed with status {}", status.as_u16()));
    let code = status.as_u16();

    match status {
        StatusCode::TOO_MANY_REQUESTS => VisionError::RateLimited,
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => VisionError::Timeout,
        StatusCode::BAD_REQUEST
        | StatusCode::PAYLOAD_TOO_LARGE
        | StatusCode::UNSUPPORTED_MEDIA_TYPE
        | StatusCode::UNPROCESSABLE_ENTITY => VisionError::Rejected {
            status: code,
            message,
        },
        s if s.is_server_error() => VisionError::Server {
            status: code,
            message,
        },
        _ => VisionError::Status {
            status: code,
            message,
        },
    }
}

/// Pulls the tally out of a chat-completions reply body.
fn parse_reply(body: &str) -> Result<StarTally, VisionError> {
    let reply: Value =
        serde_json::from_str(body).map_err(|e| ValidationError::NotJson(e.to_string()))?;
    let content = reply
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .filter(|content| !content.trim().is_empty())
        .ok_or(ValidationError::EmptyReply)?;

    Ok(StarTally::from_recognition_text(content)?)
}

#[async_trait]
impl RecognitionClient for VisionApiClient {
    #[instrument(skip(self, image_data), fields(model = %self.model, image_len = image_data.len()))]
    async fn recognize(&self, image_data: &str) -> Result<StarTally, VisionError> {
        let response = self
            .http
            .post(&self.api_url)
            .bearer_auth(self.api_key.expose())
            .json(&self.request_body(image_data))
            .send()
            .await
            .map_err(|e| transport_error(&e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| transport_error(&e))?;

        if !status.is_success() {
            let err = status_error(status, &body);
            warn!(status = status.as_u16(), error = %err, "Vision API call failed");
            return Err(err);
        }

        let tally = parse_reply(&body)?;
        debug!(total = tally.total(), "Vision API recognized tally");
        Ok(tally)
    }
}
