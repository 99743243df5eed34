use std::time::{Duration, Instant};

use futures::StreamExt;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client as ReqwestClient, Response, StatusCode, redirect};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::completion::{ChatCompletionResult, DeltaSink};
use crate::config::Config;
use crate::endpoint::Endpoint;
use crate::error::{Error, Result};
use crate::message::{Message, encode_messages};
use crate::observability::{
    CLIENT_REQUEST_DURATION, CLIENT_REQUEST_ERRORS, CLIENT_REQUESTS, STREAM_TTFB,
};
use crate::sse::{SseEvent, process_sse};

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(120);

/// Client for an OpenAI-compatible chat completions API.
///
/// The base URL is resolved on every call, so a malformed URL surfaces as a
/// failed [`ChatCompletionResult`] rather than at construction.
#[derive(Debug, Clone)]
pub struct Client {
    api_key: String,
    base_url: String,
    default_model: String,
    client: ReqwestClient,
    connect_timeout: Duration,
    read_timeout: Duration,
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ResponseChoice>,
}

#[derive(Deserialize)]
struct ResponseChoice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

impl Client {
    /// Create a client from the user's configuration.
    pub fn new(config: &Config) -> Result<Self> {
        Self::with_options(
            config.api_key(),
            config.openai_base_url.clone(),
            config.default_model.clone(),
            None,
            None,
        )
    }

    /// Create a new client with custom settings.
    pub fn with_options(
        api_key: String,
        base_url: String,
        default_model: String,
        connect_timeout: Option<Duration>,
        read_timeout: Option<Duration>,
    ) -> Result<Self> {
        let connect_timeout = connect_timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT);
        let read_timeout = read_timeout.unwrap_or(DEFAULT_READ_TIMEOUT);
        let client = ReqwestClient::builder()
            .connect_timeout(connect_timeout)
            .read_timeout(read_timeout)
            .redirect(redirect::Policy::none())
            .build()
            .map_err(|e| {
                Error::http_client(
                    format!("Failed to build HTTP client: {e}"),
                    Some(Box::new(e)),
                )
            })?;

        Ok(Self {
            api_key,
            base_url,
            default_model,
            client,
            connect_timeout,
            read_timeout,
        })
    }

    /// The configured base URL, as given.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Request a completion and wait for the whole reply.
    pub async fn chat_completion(
        &self,
        messages: &[Message],
        model_override: Option<&str>,
    ) -> ChatCompletionResult {
        self.execute(messages, model_override, None).await.into()
    }

    /// Request a streamed completion, handing each delta to `sink` as it arrives.
    pub async fn chat_completion_stream(
        &self,
        messages: &[Message],
        model_override: Option<&str>,
        sink: &mut impl DeltaSink,
    ) -> ChatCompletionResult {
        self.execute(messages, model_override, Some(sink)).await.into()
    }

    async fn execute(
        &self,
        messages: &[Message],
        model_override: Option<&str>,
        sink: Option<&mut dyn DeltaSink>,
    ) -> Result<String> {
        CLIENT_REQUESTS.click();
        let started = Instant::now();
        let result = self.request(messages, model_override, sink, started).await;
        CLIENT_REQUEST_DURATION.add(started.elapsed().as_secs_f64());
        if let Err(err) = &result {
            CLIENT_REQUEST_ERRORS.click();
            log::debug!("chat completion failed: {err}");
        }
        result
    }

    async fn request(
        &self,
        messages: &[Message],
        model_override: Option<&str>,
        sink: Option<&mut dyn DeltaSink>,
        started: Instant,
    ) -> Result<String> {
        let endpoint = Endpoint::resolve(&self.base_url)?;
        let stream = sink.is_some();
        let model = model_override
            .filter(|model| !model.trim().is_empty())
            .unwrap_or(&self.default_model);
        let body = ChatCompletionRequest {
            model,
            messages: encode_messages(messages),
            stream: stream.then_some(true),
        };
        let body = serde_json::to_string(&body)?;

        log::debug!("Request URL: {endpoint}");
        log::debug!("Request body: {body}");

        let response = self
            .client
            .post(endpoint.url())
            .headers(self.headers(stream)?)
            .body(body)
            .send()
            .await
            .map_err(|e| self.send_error(e))?;

        log::debug!("Response status: {}", response.status());
        let response = Self::check_status(response, &endpoint).await?;

        match sink {
            Some(sink) => Self::read_stream(response, sink, started).await,
            None => Self::read_completion(response).await,
        }
    }

    /// Create and return the headers for a request.
    fn headers(&self, stream: bool) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        let mut authorization = HeaderValue::from_str(&format!("Bearer {}", self.api_key))
            .map_err(|_| {
                Error::config(
                    "API key contains characters not allowed in an HTTP header",
                    Some("openai_api_key".to_string()),
                )
            })?;
        authorization.set_sensitive(true);
        headers.insert(header::AUTHORIZATION, authorization);
        if stream {
            headers.insert(
                header::ACCEPT,
                HeaderValue::from_static("text/event-stream"),
            );
        }
        Ok(headers)
    }

    fn send_error(&self, e: reqwest::Error) -> Error {
        if e.is_timeout() {
            let duration = if e.is_connect() {
                self.connect_timeout
            } else {
                self.read_timeout
            };
            Error::timeout(format!("{e}"), Some(duration.as_secs_f64()))
        } else if e.is_connect() {
            Error::connection(format!("{e}"), Some(Box::new(e)))
        } else {
            Error::http_client(format!("{e}"), Some(Box::new(e)))
        }
    }

    /// Pass a 200 response through; turn anything else into an error.
    async fn check_status(response: Response, endpoint: &Endpoint) -> Result<Response> {
        let status = response.status();
        if status == StatusCode::OK {
            return Ok(response);
        }
        if status == StatusCode::PERMANENT_REDIRECT {
            let location = response
                .headers()
                .get(header::LOCATION)
                .and_then(|val| val.to_str().ok())
                .map(String::from);
            if let Some(location) = &location {
                log::debug!("Got 308 redirect to: {location}");
            }
            return Err(Error::permanent_redirect(endpoint.base_url(), location));
        }
        let body = response
            .text()
            .await
            .unwrap_or_else(|e| format!("<failed to read error response: {e}>"));
        log::debug!("Response body: {body}");
        Err(Error::http_status(status.as_u16(), body))
    }

    async fn read_completion(response: Response) -> Result<String> {
        let text = response.text().await.map_err(|e| {
            Error::streaming(format!("Failed to read response: {e}"), Some(Box::new(e)))
        })?;
        log::debug!("Response body: {text}");
        parse_completion(&text)
    }

    async fn read_stream(
        response: Response,
        sink: &mut dyn DeltaSink,
        started: Instant,
    ) -> Result<String> {
        let events = process_sse(response.bytes_stream());
        futures::pin_mut!(events);

        let mut accumulated = String::new();
        let mut first_delta = true;
        while let Some(event) = events.next().await {
            match event? {
                SseEvent::Delta(text) => {
                    if first_delta {
                        STREAM_TTFB.add(started.elapsed().as_secs_f64());
                        first_delta = false;
                    }
                    accumulated.push_str(&text);
                    sink.on_delta(&text, false);
                }
                SseEvent::Done => {
                    sink.on_delta("", true);
                    break;
                }
            }
        }
        Ok(accumulated)
    }
}

/// Extract `choices[0].message.content` from a non-streaming response body.
pub fn parse_completion(body: &str) -> Result<String> {
    let response: ChatCompletionResponse = serde_json::from_str(body).map_err(|e| {
        Error::invalid_response_format(
            format!("Failed to parse API response: {e}"),
            Some(Box::new(e)),
        )
    })?;
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| {
            Error::invalid_response_format("missing choices[0].message.content", None)
        })
}

/// Request a completion using `config`, waiting for the whole reply.
pub async fn chat_completion(
    config: &Config,
    messages: &[Message],
    model_override: Option<&str>,
) -> ChatCompletionResult {
    match Client::new(config) {
        Ok(client) => client.chat_completion(messages, model_override).await,
        Err(err) => ChatCompletionResult::failure(err),
    }
}

/// Request a streamed completion using `config`.
pub async fn chat_completion_stream(
    config: &Config,
    messages: &[Message],
    model_override: Option<&str>,
    sink: &mut impl DeltaSink,
) -> ChatCompletionResult {
    match Client::new(config) {
        Ok(client) => {
            client
                .chat_completion_stream(messages, model_override, sink)
                .await
        }
        Err(err) => ChatCompletionResult::failure(err),
    }
}
