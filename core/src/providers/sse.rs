use crate::traits::{Choice, Delta, Fragment, InvocationFunction, ToolInvocation, Usage};
use anyhow::{Context, Result, anyhow, bail};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::debug;

pub const DONE_SENTINEL: &str = "[DONE]";

/// Longest SSE line accepted before the stream is treated as broken.
pub const MAX_LINE_BYTES: usize = 64 * 1024;

/// Only the first choice drives a turn; other choices' tool calls are dropped.
const PRIMARY_CHOICE: u32 = 0;

#[derive(Debug, Deserialize)]
struct StreamResponse {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    index: u32,
    #[serde(default)]
    delta: StreamDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default, alias = "reasoning_content")]
    reasoning: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<StreamToolCall>>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamToolCall {
    #[serde(default)]
    index: u32,
    #[serde(default)]
    id: Option<String>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    function: Option<StreamFunction>,
}

#[derive(Debug, Deserialize)]
struct StreamFunction {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

/// One SSE line, classified.
#[derive(Debug, PartialEq)]
pub enum SseLine<'a> {
    Skip,
    Done,
    Data(&'a str),
}

pub fn classify_line(line: &str) -> SseLine<'_> {
    let line = line.strip_suffix('\r').unwrap_or(line);

    if line.trim().is_empty() || line.starts_with(':') {
        return SseLine::Skip;
    }

    match line.strip_prefix("data:") {
        Some(payload) => {
            let payload = payload.strip_prefix(' ').unwrap_or(payload);
            if payload.trim() == DONE_SENTINEL {
                SseLine::Done
            } else {
                SseLine::Data(payload)
            }
        }
        None => SseLine::Skip,
    }
}

/// Decodes tool-call `arguments` text into an object. Blank text means no
/// arguments; anything that is not a JSON object is rejected.
pub fn parse_arguments(raw: &str) -> Result<Map<String, Value>> {
    if raw.trim().is_empty() {
        return Ok(Map::new());
    }

    match serde_json::from_str::<Value>(raw).context("tool arguments are not valid JSON")? {
        Value::Object(map) => Ok(map),
        other => Err(anyhow!("tool arguments must be a JSON object, got {}", other)),
    }
}

#[derive(Debug, Default)]
struct PendingCall {
    index: u32,
    id: String,
    kind: String,
    name: String,
    arguments: String,
}

impl PendingCall {
    fn finish(self) -> Result<ToolInvocation> {
        let arguments = parse_arguments(&self.arguments)
            .with_context(|| format!("bad arguments for tool call '{}'", self.name))?;
        let id = if self.id.is_empty() {
            format!("call_{}", uuid::Uuid::new_v4().simple())
        } else {
            self.id
        };
        let kind = if self.kind.is_empty() {
            "function".to_string()
        } else {
            self.kind
        };

        Ok(ToolInvocation {
            index: self.index,
            id,
            kind,
            function: InvocationFunction {
                name: self.name,
                arguments,
            },
        })
    }
}

/// Stitches tool calls that arrive split across fragments.
///
/// Shards are keyed by `(choice index, tool-call index)`. `arguments` shards
/// are concatenated verbatim and only parsed once the call is complete, which
/// is when its choice reports a finish reason or the stream ends.
#[derive(Debug, Default)]
pub struct ToolCallAssembler {
    pending: BTreeMap<(u32, u32), PendingCall>,
    completed: BTreeMap<u32, Vec<PendingCall>>,
    last_id: Option<String>,
}

impl ToolCallAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty() || !self.completed.is_empty()
    }

    /// Decodes one `data:` payload. Returns the fragments to forward, in
    /// order: the payload minus its tool-call shards (if anything remains),
    /// followed by any tool calls that became complete.
    pub fn push_data(&mut self, payload: &str) -> Result<Vec<Fragment>> {
        let response: StreamResponse =
            serde_json::from_str(payload).context("malformed stream fragment")?;
        if response.id.is_some() {
            self.last_id.clone_from(&response.id);
        }

        let mut finished_choices = Vec::new();
        let mut choices = Vec::with_capacity(response.choices.len());
        let mut had_shards = false;

        for choice in response.choices {
            let StreamDelta {
                role,
                content,
                reasoning,
                tool_calls,
                finish_reason,
            } = choice.delta;

            if let Some(shards) = tool_calls {
                had_shards |= !shards.is_empty();
                if choice.index == PRIMARY_CHOICE {
                    for shard in shards {
                        self.absorb(choice.index, shard);
                    }
                } else if !shards.is_empty() {
                    debug!(choice = choice.index, "Ignoring tool calls on secondary choice");
                }
            }

            let choice = Choice {
                index: choice.index,
                delta: Delta {
                    role,
                    content,
                    reasoning,
                    tool_calls: Vec::new(),
                    finish_reason,
                },
                finish_reason: choice.finish_reason,
            };
            if choice.finish_reason().is_some() {
                finished_choices.push(choice.index);
            }
            choices.push(choice);
        }

        let mut out = Vec::new();
        let only_shards = had_shards
            && response.usage.is_none()
            && choices
                .iter()
                .all(|c| c.delta.is_empty() && c.finish_reason.is_none());
        if !only_shards {
            out.push(Fragment {
                id: response.id,
                choices,
                usage: response.usage,
            });
        }

        for choice_index in finished_choices {
            if let Some(fragment) = self.take_choice(choice_index)? {
                out.push(fragment);
            }
        }

        Ok(out)
    }

    /// Completes everything still buffered; called at `[DONE]` or EOF.
    pub fn flush(&mut self) -> Result<Vec<Fragment>> {
        let mut choice_indices: Vec<u32> = self
            .pending
            .keys()
            .map(|(choice, _)| *choice)
            .chain(self.completed.keys().copied())
            .collect();
        choice_indices.sort_unstable();
        choice_indices.dedup();

        let mut out = Vec::new();
        for choice_index in choice_indices {
            if let Some(fragment) = self.take_choice(choice_index)? {
                out.push(fragment);
            }
        }
        Ok(out)
    }

    fn absorb(&mut self, choice_index: u32, shard: StreamToolCall) {
        let key = (choice_index, shard.index);
        let new_id = shard.id.filter(|id| !id.is_empty());

        // A fresh id on an occupied slot means the server sent whole calls
        // that reuse the same index; close out the previous one.
        let superseded = match (&new_id, self.pending.get(&key)) {
            (Some(id), Some(existing)) => !existing.id.is_empty() && existing.id != *id,
            _ => false,
        };
        if superseded && let Some(previous) = self.pending.remove(&key) {
            self.completed.entry(choice_index).or_default().push(previous);
        }

        let entry = self.pending.entry(key).or_insert_with(|| PendingCall {
            index: shard.index,
            ..PendingCall::default()
        });

        if let Some(id) = new_id
            && entry.id.is_empty()
        {
            entry.id = id;
        }
        if let Some(kind) = shard.kind.filter(|k| !k.is_empty())
            && entry.kind.is_empty()
        {
            entry.kind = kind;
        }
        if let Some(function) = shard.function {
            if let Some(name) = function.name.filter(|n| !n.is_empty())
                && entry.name.is_empty()
            {
                entry.name = name;
            }
            if let Some(arguments) = function.arguments {
                entry.arguments.push_str(&arguments);
            }
        }
    }

    fn take_choice(&mut self, choice_index: u32) -> Result<Option<Fragment>> {
        let mut calls = self.completed.remove(&choice_index).unwrap_or_default();

        let keys: Vec<(u32, u32)> = self
            .pending
            .range((choice_index, 0)..=(choice_index, u32::MAX))
            .map(|(k, _)| *k)
            .collect();
        for key in keys {
            if let Some(call) = self.pending.remove(&key) {
                calls.push(call);
            }
        }

        if calls.is_empty() {
            return Ok(None);
        }

        let invocations = calls
            .into_iter()
            .map(PendingCall::finish)
            .collect::<Result<Vec<_>>>()?;

        Ok(Some(Fragment {
            id: self.last_id.clone(),
            choices: vec![Choice {
                index: choice_index,
                delta: Delta {
                    tool_calls: invocations,
                    ..Delta::default()
                },
                finish_reason: None,
            }],
            usage: None,
        }))
    }
}

/// Turns raw body bytes into fragments. Bytes are held until a full line
/// is available, so chunk boundaries may fall anywhere.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    assembler: ToolCallAssembler,
    done: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// True once `[DONE]` has been seen; later input is ignored.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Decodes every complete line in `bytes`, pushing fragments to `out`.
    /// On error, `out` still holds whatever decoded before the bad line.
    pub fn feed(&mut self, bytes: &[u8], out: &mut Vec<Fragment>) -> Result<()> {
        if self.done {
            return Ok(());
        }
        self.buffer.extend_from_slice(bytes);

        while let Some(pos) = memchr::memchr(b'\n', &self.buffer) {
            if pos > MAX_LINE_BYTES {
                bail!("stream line exceeds {} bytes", MAX_LINE_BYTES);
            }
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            self.process_line(&line[..pos], out)?;
            if self.done {
                self.buffer.clear();
                break;
            }
        }
        if self.buffer.len() > MAX_LINE_BYTES {
            bail!("stream line exceeds {} bytes", MAX_LINE_BYTES);
        }
        Ok(())
    }

    /// End of body: decodes a trailing unterminated line and completes any
    /// buffered tool calls.
    pub fn finish(&mut self, out: &mut Vec<Fragment>) -> Result<()> {
        if !self.done && !self.buffer.is_empty() {
            let line = std::mem::take(&mut self.buffer);
            self.process_line(&line, out)?;
        }
        if !self.done {
            self.done = true;
            out.extend(self.assembler.flush()?);
        }
        Ok(())
    }

    fn process_line(&mut self, line: &[u8], out: &mut Vec<Fragment>) -> Result<()> {
        let line = std::str::from_utf8(line).context("stream line is not valid UTF-8")?;

        match classify_line(line) {
            SseLine::Skip => Ok(()),
            SseLine::Done => {
                self.done = true;
                out.extend(self.assembler.flush()?);
                Ok(())
            }
            SseLine::Data(payload) => {
                out.extend(self.assembler.push_data(payload)?);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::DeltaKind;
    use serde_json::json;

    #[test]
    fn decoder_handles_lines_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        let mut out = Vec::new();

        decoder
            .feed(b"data: {\"choices\":[{\"delta\":{\"content\":\"Hi", &mut out)
            .unwrap();
        assert!(out.is_empty());
        decoder.feed(b" \"}}]}\r\n\r\ndata: [DONE]\n", &mut out).unwrap();

        assert!(decoder.is_done());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].first_delta().unwrap().kind(), DeltaKind::Content("Hi "));
    }

    #[test]
    fn decoder_splits_multibyte_characters_safely() {
        let line = "data: {\"choices\":[{\"delta\":{\"content\":\"héllo\"}}]}\n".as_bytes();
        let split = line.iter().position(|&b| b == 0xC3).unwrap() + 1;
        let mut decoder = SseDecoder::new();
        let mut out = Vec::new();

        decoder.feed(&line[..split], &mut out).unwrap();
        decoder.feed(&line[split..], &mut out).unwrap();
        assert_eq!(out[0].first_delta().unwrap().content.as_deref(), Some("héllo"));
    }

    #[test]
    fn decoder_keeps_fragments_before_a_bad_line() {
        let mut decoder = SseDecoder::new();
        let mut out = Vec::new();
        let body = b"data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\ndata: {bad-json}\ndata: {\"choices\":[{\"delta\":{\"content\":\"lost\"}}]}\n";

        assert!(decoder.feed(body, &mut out).is_err());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].first_delta().unwrap().content.as_deref(), Some("Hi"));
    }

    #[test]
    fn decoder_only_done_yields_nothing() {
        let mut decoder = SseDecoder::new();
        let mut out = Vec::new();
        decoder.feed(b"data: [DONE]\n", &mut out).unwrap();
        decoder.finish(&mut out).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn decoder_flushes_tool_calls_at_eof() {
        let mut decoder = SseDecoder::new();
        let mut out = Vec::new();
        decoder
            .feed(b"data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"id\":\"t1\",\"function\":{\"name\":\"list_file\",\"arguments\":\"{}\"}}]}}]}", &mut out)
            .unwrap();
        assert!(out.is_empty());

        decoder.finish(&mut out).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].choices[0].delta.tool_calls[0].id, "t1");
    }

    #[test]
    fn decoder_rejects_overlong_lines() {
        let mut decoder = SseDecoder::new();
        let mut out = Vec::new();
        let mut line = b"data: ".to_vec();
        line.resize(MAX_LINE_BYTES + 16, b'x');

        decoder.feed(&line[..MAX_LINE_BYTES / 2], &mut out).unwrap();
        let err = decoder.feed(&line[MAX_LINE_BYTES / 2..], &mut out).unwrap_err();
        assert!(err.to_string().contains("exceeds"));
        assert!(out.is_empty());
    }

    #[test]
    fn decoder_rejects_overlong_terminated_line() {
        let mut decoder = SseDecoder::new();
        let mut out = Vec::new();
        let mut body = b"data: ".to_vec();
        body.resize(MAX_LINE_BYTES + 16, b'x');
        body.push(b'\n');

        assert!(decoder.feed(&body, &mut out).is_err());
    }

    #[test]
    fn classify_lines() {
        assert_eq!(classify_line(""), SseLine::Skip);
        assert_eq!(classify_line("\r"), SseLine::Skip);
        assert_eq!(classify_line(": keep-alive"), SseLine::Skip);
        assert_eq!(classify_line("event: message"), SseLine::Skip);
        assert_eq!(classify_line("data: [DONE]"), SseLine::Done);
        assert_eq!(classify_line("data: [DONE]\r"), SseLine::Done);
        assert_eq!(classify_line("data: {\"a\":1}"), SseLine::Data("{\"a\":1}"));
        assert_eq!(classify_line("data:{\"a\":1}"), SseLine::Data("{\"a\":1}"));
    }

    #[test]
    fn arguments_must_be_an_object() {
        assert_eq!(parse_arguments("").unwrap(), Map::new());
        assert_eq!(
            parse_arguments(r#"{"location":"Paris"}"#).unwrap()["location"],
            "Paris"
        );
        assert!(parse_arguments("[1,2]").is_err());
        assert!(parse_arguments("\"text\"").is_err());
        assert!(parse_arguments("{bad").is_err());
    }

    #[test]
    fn content_fragment_passes_through() {
        let mut asm = ToolCallAssembler::new();
        let out = asm
            .push_data(r#"{"id":"c1","choices":[{"index":0,"delta":{"content":"Hi "}}]}"#)
            .unwrap();

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id.as_deref(), Some("c1"));
        assert_eq!(out[0].first_delta().unwrap().kind(), DeltaKind::Content("Hi "));
    }

    #[test]
    fn reasoning_content_alias() {
        let mut asm = ToolCallAssembler::new();
        let out = asm
            .push_data(r#"{"choices":[{"delta":{"reasoning_content":"hmm"}}]}"#)
            .unwrap();
        assert_eq!(out[0].first_delta().unwrap().kind(), DeltaKind::Reasoning("hmm"));
    }

    #[test]
    fn empty_choices_keep_usage() {
        let mut asm = ToolCallAssembler::new();
        let out = asm
            .push_data(
                r#"{"choices":[],"usage":{"prompt_tokens":3,"completion_tokens":4,"total_tokens":7}}"#,
            )
            .unwrap();

        assert_eq!(out.len(), 1);
        assert!(out[0].choices.is_empty());
        assert_eq!(out[0].usage.unwrap().total_tokens, 7);
    }

    #[test]
    fn split_arguments_are_joined_before_parsing() {
        let mut asm = ToolCallAssembler::new();
        let first = asm
            .push_data(r#"{"choices":[{"index":0,"delta":{"tool_calls":[{"index":0,"id":"t1","type":"function","function":{"name":"get_current_weather","arguments":"{\"loc"}}]}}]}"#)
            .unwrap();
        assert!(first.is_empty());
        assert!(asm.has_pending());

        asm.push_data(r#"{"choices":[{"index":0,"delta":{"tool_calls":[{"index":0,"function":{"arguments":"ation\":"}}]}}]}"#)
            .unwrap();
        asm.push_data(r#"{"choices":[{"index":0,"delta":{"tool_calls":[{"index":0,"function":{"arguments":"\"Paris\"}"}}]}}]}"#)
            .unwrap();

        let out = asm
            .push_data(r#"{"choices":[{"index":0,"delta":{},"finish_reason":"tool_calls"}]}"#)
            .unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].choices[0].finish_reason(), Some("tool_calls"));

        let calls = &out[1].choices[0].delta.tool_calls;
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "t1");
        assert_eq!(calls[0].name(), "get_current_weather");
        assert_eq!(calls[0].arguments()["location"], "Paris");
        assert!(!asm.has_pending());
    }

    #[test]
    fn interleaved_indices_assemble_independently() {
        let mut asm = ToolCallAssembler::new();
        asm.push_data(r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"a","function":{"name":"read_file","arguments":"{\"path\":"}},{"index":1,"id":"b","function":{"name":"list_file","arguments":"{}"}}]}}]}"#)
            .unwrap();
        asm.push_data(r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"\"a.txt\"}"}}]}}]}"#)
            .unwrap();

        let out = asm.flush().unwrap();
        assert_eq!(out.len(), 1);
        let calls = &out[0].choices[0].delta.tool_calls;
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].id, "a");
        assert_eq!(calls[0].arguments()["path"], "a.txt");
        assert_eq!(calls[1].id, "b");
        assert!(calls[1].arguments().is_empty());
    }

    #[test]
    fn whole_calls_reusing_an_index_stay_separate() {
        let mut asm = ToolCallAssembler::new();
        asm.push_data(r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"x1","function":{"name":"get_current_weather","arguments":"{\"location\":\"Paris\"}"}}]}}]}"#)
            .unwrap();
        asm.push_data(r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"x2","function":{"name":"get_current_weather","arguments":"{\"location\":\"Rome\"}"}}]}}]}"#)
            .unwrap();

        let out = asm.flush().unwrap();
        let calls = &out[0].choices[0].delta.tool_calls;
        let ids: Vec<&str> = calls.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["x1", "x2"]);
        assert_eq!(calls[1].arguments(), json!({"location": "Rome"}).as_object().unwrap());
    }

    #[test]
    fn secondary_choice_tool_calls_are_dropped() {
        let mut asm = ToolCallAssembler::new();
        let out = asm
            .push_data(r#"{"choices":[{"index":0,"delta":{"content":"A"}},{"index":1,"delta":{"tool_calls":[{"index":0,"id":"c1","function":{"name":"list_file","arguments":"{}"}}]},"finish_reason":"tool_calls"}]}"#)
            .unwrap();

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].first_delta().unwrap().kind(), DeltaKind::Content("A"));
        assert!(!asm.has_pending());
        assert!(asm.flush().unwrap().is_empty());
    }

    #[test]
    fn missing_id_is_generated() {
        let mut asm = ToolCallAssembler::new();
        asm.push_data(r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"name":"list_file","arguments":""}}]}}]}"#)
            .unwrap();

        let out = asm.flush().unwrap();
        let call = &out[0].choices[0].delta.tool_calls[0];
        assert!(call.id.starts_with("call_"));
        assert_eq!(call.kind, "function");
    }

    #[test]
    fn malformed_arguments_error_at_completion() {
        let mut asm = ToolCallAssembler::new();
        asm.push_data(r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"t1","function":{"name":"read_file","arguments":"not json"}}]}}]}"#)
            .unwrap();
        assert!(asm.flush().is_err());
    }

    #[test]
    fn malformed_payload_errors() {
        let mut asm = ToolCallAssembler::new();
        assert!(asm.push_data("{bad-json}").is_err());
    }
}
