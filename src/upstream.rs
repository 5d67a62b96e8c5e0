use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_stream::stream;
use bytes::Bytes;
use futures::stream::{BoxStream, Stream, StreamExt};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;

use crate::error::UpstreamError;
use crate::models::ChatMessage;

// ============================================================================
// Normalized chunk record
// ============================================================================

/// One streaming chunk after decoding. The rest of the pipeline only ever
/// sees this shape, never the wire JSON.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamChunk {
    pub content: Option<String>,
    pub reasoning: Option<String>,
}

impl StreamChunk {
    pub fn content(text: impl Into<String>) -> Self {
        Self {
            content: Some(text.into()),
            reasoning: None,
        }
    }

    /// Final-answer text, if this chunk carries any.
    pub fn fragment(&self) -> Option<&str> {
        self.content.as_deref().filter(|text| !text.is_empty())
    }
}

pub type ChunkStream = BoxStream<'static, Result<StreamChunk, UpstreamError>>;

// ============================================================================
// Request
// ============================================================================

#[derive(Debug, Clone)]
pub struct GenerationParams {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            model: "GLM-4-Flash-250414".to_string(),
            max_tokens: 600,
            temperature: 0.1,
            top_p: 0.8,
        }
    }
}

impl GenerationParams {
    pub fn request(&self, messages: Vec<ChatMessage>) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages,
            stream: true,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            top_p: self.top_p,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub stream: bool,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
}

// ============================================================================
// Backend seam
// ============================================================================

pub trait ChatBackend: Send + Sync + 'static {
    fn stream_chat(
        &self,
        request: ChatRequest,
    ) -> impl Future<Output = Result<ChunkStream, UpstreamError>> + Send;
}

pub trait BackendFactory: Send + Sync + 'static {
    type Backend: ChatBackend;

    fn build(&self, api_key: &str) -> Result<Self::Backend, UpstreamError>;
}

/// Process-wide client slot. The backend is built on first use and shared
/// read-only afterwards; concurrent first callers wait for a single build.
pub struct UpstreamHandle<F: BackendFactory> {
    factory: F,
    client: OnceCell<Arc<F::Backend>>,
}

impl<F: BackendFactory> UpstreamHandle<F> {
    pub fn new(factory: F) -> Self {
        Self {
            factory,
            client: OnceCell::new(),
        }
    }

    pub async fn client(&self, api_key: &str) -> Result<Arc<F::Backend>, UpstreamError> {
        self.client
            .get_or_try_init(|| async { self.factory.build(api_key).map(Arc::new) })
            .await
            .map(Arc::clone)
    }

    pub fn is_initialized(&self) -> bool {
        self.client.initialized()
    }
}

// ============================================================================
// Zhipu (OpenAI-compatible) client
// ============================================================================

#[derive(Debug, Clone)]
pub struct ZhipuClient {
    http: reqwest::Client,
    endpoint: String,
}

impl ZhipuClient {
    pub fn new(
        base_url: &str,
        api_key: &str,
        timeout: Option<Duration>,
    ) -> Result<Self, UpstreamError> {
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", api_key))
            .map_err(|e| UpstreamError::Build(format!("invalid credential header: {}", e)))?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);

        let mut builder = reqwest::Client::builder().default_headers(headers);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder
            .build()
            .map_err(|e| UpstreamError::Build(e.to_string()))?;

        Ok(Self {
            http,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
        })
    }
}

impl ChatBackend for ZhipuClient {
    fn stream_chat(
        &self,
        request: ChatRequest,
    ) -> impl Future<Output = Result<ChunkStream, UpstreamError>> + Send {
        let http = self.http.clone();
        let endpoint = self.endpoint.clone();

        async move {
            let response = http.post(&endpoint).json(&request).send().await?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(UpstreamError::Status {
                    status: status.as_u16(),
                    body,
                });
            }

            Ok(decode_event_stream(response.bytes_stream()))
        }
    }
}

#[derive(Debug, Clone)]
pub struct ZhipuFactory {
    pub base_url: String,
    pub timeout: Option<Duration>,
}

impl BackendFactory for ZhipuFactory {
    type Backend = ZhipuClient;

    fn build(&self, api_key: &str) -> Result<ZhipuClient, UpstreamError> {
        ZhipuClient::new(&self.base_url, api_key, self.timeout)
    }
}

// ============================================================================
// SSE decoding
// ============================================================================

#[derive(Debug, Deserialize)]
struct WireChunk {
    #[serde(default)]
    choices: Vec<WireChoice>,
    #[serde(default)]
    error: Option<WireError>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    #[serde(default)]
    delta: WireDelta,
}

#[derive(Debug, Default, Deserialize)]
struct WireDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    reasoning_content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireError {
    #[serde(default)]
    code: Option<serde_json::Value>,
    #[serde(default)]
    message: Option<String>,
}

/// Decodes one `data:` payload. `Ok(None)` for chunks without choices
/// (usage trailers and the like).
pub fn decode_payload(data: &str) -> Result<Option<StreamChunk>, UpstreamError> {
    let chunk: WireChunk = serde_json::from_str(data)?;

    if let Some(error) = chunk.error {
        return Err(UpstreamError::Api {
            code: error
                .code
                .map(|code| match code {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                })
                .unwrap_or_else(|| "unknown".to_string()),
            message: error.message.unwrap_or_default(),
        });
    }

    Ok(chunk.choices.into_iter().next().map(|choice| StreamChunk {
        content: choice.delta.content,
        reasoning: choice.delta.reasoning_content,
    }))
}

#[derive(Debug, PartialEq)]
enum SseLine {
    Chunk(StreamChunk),
    Done,
    Skip,
}

fn parse_line(line: &str) -> Result<SseLine, UpstreamError> {
    let Some(data) = line.strip_prefix("data:") else {
        return Ok(SseLine::Skip);
    };
    let data = data.trim();

    if data.is_empty() {
        return Ok(SseLine::Skip);
    }
    if data == "[DONE]" {
        return Ok(SseLine::Done);
    }

    Ok(decode_payload(data)?.map_or(SseLine::Skip, SseLine::Chunk))
}

/// Splits a byte stream into lines. Network chunks can end anywhere,
/// including inside a multi-byte character, so bytes are held until a
/// newline arrives.
#[derive(Debug, Default)]
struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    fn push(&mut self, bytes: &[u8]) -> Result<Vec<String>, UpstreamError> {
        self.pending.extend_from_slice(bytes);

        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            lines.push(Self::decode(line)?);
        }
        Ok(lines)
    }

    fn finish(&mut self) -> Result<Vec<String>, UpstreamError> {
        if self.pending.is_empty() {
            return Ok(Vec::new());
        }
        let line = std::mem::take(&mut self.pending);
        Ok(vec![Self::decode(line)?])
    }

    fn decode(mut line: Vec<u8>) -> Result<String, UpstreamError> {
        while matches!(line.last(), Some(b'\n' | b'\r')) {
            line.pop();
        }
        Ok(String::from_utf8(line)?)
    }
}

/// Turns the raw response body into decoded chunks, ending at `[DONE]` or
/// at the end of the body. The first error ends the stream.
pub fn decode_event_stream<S, E>(body: S) -> ChunkStream
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Into<UpstreamError> + Send + 'static,
{
    Box::pin(stream! {
        let mut body = Box::pin(body);
        let mut buffer = LineBuffer::default();
        let mut done = false;

        while !done {
            let lines = match body.next().await {
                Some(Ok(bytes)) => buffer.push(&bytes),
                Some(Err(e)) => Err(e.into()),
                None => {
                    done = true;
                    buffer.finish()
                }
            };
            let lines = match lines {
                Ok(lines) => lines,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };

            for line in lines {
                match parse_line(&line) {
                    Ok(SseLine::Chunk(chunk)) => yield Ok(chunk),
                    Ok(SseLine::Done) => {
                        done = true;
                        break;
                    }
                    Ok(SseLine::Skip) => {}
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use std::convert::Infallible;

    impl From<Infallible> for UpstreamError {
        fn from(never: Infallible) -> Self {
            match never {}
        }
    }

    fn body(parts: &[&[u8]]) -> impl Stream<Item = Result<Bytes, Infallible>> + Send + 'static {
        let parts: Vec<Result<Bytes, Infallible>> =
            parts.iter().map(|p| Ok(Bytes::copy_from_slice(p))).collect();
        stream::iter(parts)
    }

    async fn collect(stream: ChunkStream) -> Vec<Result<StreamChunk, UpstreamError>> {
        stream.collect().await
    }

    #[test]
    fn test_decode_content_and_reasoning() {
        let chunk = decode_payload(
            r#"{"id":"1","choices":[{"index":0,"delta":{"role":"assistant","content":"低","reasoning_content":"想一想"}}]}"#,
        )
        .unwrap()
        .unwrap();
        assert_eq!(chunk.content.as_deref(), Some("低"));
        assert_eq!(chunk.reasoning.as_deref(), Some("想一想"));
        assert_eq!(chunk.fragment(), Some("低"));
    }

    #[test]
    fn test_reasoning_only_chunk_has_no_fragment() {
        let chunk = decode_payload(r#"{"choices":[{"delta":{"reasoning_content":"..."}}]}"#)
            .unwrap()
            .unwrap();
        assert_eq!(chunk.fragment(), None);

        let chunk = decode_payload(r#"{"choices":[{"delta":{"content":""}}]}"#)
            .unwrap()
            .unwrap();
        assert_eq!(chunk.fragment(), None);
    }

    #[test]
    fn test_decode_usage_trailer() {
        let chunk = decode_payload(r#"{"choices":[],"usage":{"total_tokens":42}}"#).unwrap();
        assert_eq!(chunk, None);
    }

    #[test]
    fn test_decode_error_payload() {
        let err = decode_payload(r#"{"error":{"code":"1113","message":"余额不足"}}"#).unwrap_err();
        match err {
            UpstreamError::Api { code, message } => {
                assert_eq!(code, "1113");
                assert_eq!(message, "余额不足");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_decode_malformed_payload() {
        assert!(matches!(
            decode_payload("{not json"),
            Err(UpstreamError::Decode(_))
        ));
    }

    #[test]
    fn test_parse_line_kinds() {
        assert_eq!(parse_line("").unwrap(), SseLine::Skip);
        assert_eq!(parse_line(": keep-alive").unwrap(), SseLine::Skip);
        assert_eq!(parse_line("event: message").unwrap(), SseLine::Skip);
        assert_eq!(parse_line("data: [DONE]").unwrap(), SseLine::Done);
        assert_eq!(
            parse_line(r#"data:{"choices":[{"delta":{"content":"a"}}]}"#).unwrap(),
            SseLine::Chunk(StreamChunk::content("a"))
        );
    }

    #[test]
    fn test_line_buffer_holds_split_utf8() {
        let text = "data: 巧克力\n".as_bytes();
        let mut buffer = LineBuffer::default();
        // Cut in the middle of the first multi-byte character.
        assert!(buffer.push(&text[..7]).unwrap().is_empty());
        let lines = buffer.push(&text[7..]).unwrap();
        assert_eq!(lines, vec!["data: 巧克力".to_string()]);
        assert!(buffer.finish().unwrap().is_empty());
    }

    #[test]
    fn test_line_buffer_crlf_and_trailing_line() {
        let mut buffer = LineBuffer::default();
        let lines = buffer.push(b"a\r\nb\n\nc").unwrap();
        assert_eq!(lines, vec!["a", "b", ""]);
        assert_eq!(buffer.finish().unwrap(), vec!["c"]);
    }

    #[tokio::test]
    async fn test_event_stream_across_network_chunks() {
        let stream = decode_event_stream(body(&[
            b"data: {\"choices\":[{\"delta\":{\"content\":\"\xe3\x80\x90\xe9\xa3\x8e",
            b"\xe9\x99\xa9\"}}]}\n\n",
            b"data: {\"choices\":[{\"delta\":{\"reasoning_content\":\"x\"}}]}\n\ndata: {\"choices\":[{\"delta\":{\"content\":\"\xe7\xad\x89\xe7\xba\xa7\xe3\x80\x91\"}}]}\n\n",
            b"data: [DONE]\n\n",
            b"data: {\"choices\":[{\"delta\":{\"content\":\"after done\"}}]}\n\n",
        ]));

        let chunks: Vec<StreamChunk> = collect(stream)
            .await
            .into_iter()
            .map(Result::unwrap)
            .collect();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].fragment(), Some("【风险"));
        assert_eq!(chunks[1].fragment(), None);
        assert_eq!(chunks[1].reasoning.as_deref(), Some("x"));
        assert_eq!(chunks[2].fragment(), Some("等级】"));
    }

    #[tokio::test]
    async fn test_event_stream_without_done_marker() {
        let stream = decode_event_stream(body(&[b"data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}"]));
        let chunks = collect(stream).await;
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].as_ref().unwrap().fragment(), Some("a"));
    }

    #[tokio::test]
    async fn test_event_stream_stops_at_first_error() {
        let stream = decode_event_stream(body(&[
            b"data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n",
            b"data: {\"error\":{\"code\":500,\"message\":\"boom\"}}\n",
            b"data: {\"choices\":[{\"delta\":{\"content\":\"b\"}}]}\n",
        ]));
        let chunks = collect(stream).await;
        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].is_ok());
        match &chunks[1] {
            Err(UpstreamError::Api { code, message }) => {
                assert_eq!(code, "500");
                assert_eq!(message, "boom");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_generation_request_body() {
        let request = GenerationParams::default().request(vec![
            ChatMessage::system("sys"),
            ChatMessage::user("q"),
        ]);
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "GLM-4-Flash-250414");
        assert_eq!(json["stream"], true);
        assert_eq!(json["max_tokens"], 600);
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "q");
    }

    #[test]
    fn test_client_rejects_unusable_credential() {
        let err = ZhipuClient::new("https://example.invalid/v4", "bad\nkey", None).unwrap_err();
        assert!(matches!(err, UpstreamError::Build(_)));

        let client = ZhipuClient::new("https://example.invalid/v4/", "key", None).unwrap();
        assert_eq!(client.endpoint, "https://example.invalid/v4/chat/completions");
    }
}
