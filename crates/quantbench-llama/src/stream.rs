//! Server-sent event stream of a `/completion` request

use quantbench_core::{backend::StreamIncrement, BenchError, Result};
use serde::Deserialize;
use std::io::BufRead;

/// One `data:` event of llama-server's streaming completion
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct CompletionChunk {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub stop: bool,
}

/// Lazily parses streamed completion events into increments.
///
/// Each event with non-empty content becomes one increment. The stream ends
/// at the first event flagged `stop`, at a `[DONE]` sentinel or at EOF.
pub struct CompletionStream<R> {
    reader: R,
    line: String,
    next_index: usize,
    done: bool,
}

impl<R: BufRead> CompletionStream<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: String::new(),
            next_index: 0,
            done: false,
        }
    }

    fn fail(&mut self, message: String) -> Option<Result<StreamIncrement>> {
        self.done = true;
        Some(Err(BenchError::generation(
            "GENERATION_STREAM_FAILED",
            message,
            "Reading llama-server completion events",
            "Check that the server is still running and reachable",
        )))
    }
}

impl<R: BufRead> Iterator for CompletionStream<R> {
    type Item = Result<StreamIncrement>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            self.line.clear();
            match self.reader.read_line(&mut self.line) {
                Ok(0) => {
                    self.done = true;
                    return None;
                }
                Ok(_) => {}
                Err(e) => return self.fail(format!("Stream read failed: {}", e)),
            }

            let Some(data) = self.line.trim_end().strip_prefix("data:") else {
                continue;
            };
            let data = data.trim_start();
            if data == "[DONE]" {
                self.done = true;
                return None;
            }

            let chunk: CompletionChunk = match serde_json::from_str(data) {
                Ok(chunk) => chunk,
                Err(e) => return self.fail(format!("Malformed completion event: {}", e)),
            };
            if chunk.stop {
                self.done = true;
            }
            if chunk.content.is_empty() {
                continue;
            }

            let index = self.next_index;
            self.next_index += 1;
            return Some(Ok(StreamIncrement {
                index,
                text: chunk.content,
            }));
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn collect(body: &str) -> Vec<Result<StreamIncrement>> {
        CompletionStream::new(Cursor::new(body.to_string())).collect()
    }

    #[test]
    fn test_events_become_numbered_increments() {
        let body = concat!(
            "data: {\"content\":\"Hello\",\"stop\":false}\n\n",
            "data: {\"content\":\" world\",\"stop\":false}\n\n",
            "data: {\"content\":\"\",\"stop\":true,\"tokens_predicted\":2}\n\n",
        );
        let increments: Vec<StreamIncrement> =
            collect(body).into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(increments.len(), 2);
        assert_eq!(increments[0].index, 0);
        assert_eq!(increments[1].index, 1);
        assert_eq!(increments[1].text, " world");
    }

    #[test]
    fn test_stop_event_with_content_is_last() {
        let body = concat!(
            "data: {\"content\":\"B\",\"stop\":true}\n\n",
            "data: {\"content\":\"ignored\",\"stop\":false}\n\n",
        );
        let items = collect(body);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].as_ref().unwrap().text, "B");
    }

    #[test]
    fn test_comments_and_done_sentinel() {
        let body = ": keep-alive\n\ndata: {\"content\":\"x\"}\n\ndata: [DONE]\n\ndata: {\"content\":\"y\"}\n";
        let items = collect(body);
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn test_empty_body_is_zero_length_generation() {
        assert!(collect("").is_empty());
    }

    #[test]
    fn test_malformed_event_fails_once() {
        let items = collect("data: {not json}\n\ndata: {\"content\":\"x\"}\n");
        assert_eq!(items.len(), 1);
        assert_eq!(
            items[0].as_ref().unwrap_err().code(),
            "GENERATION_STREAM_FAILED"
        );
    }
}
