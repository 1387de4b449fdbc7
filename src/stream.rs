//! Streamed chat completions
//!
//! [`CompletionStream`] yields the non-empty text fragments of a `stream: true`
//! completion as they arrive. It is finite and cannot be restarted.
//! [`write_stream`] and [`print_stream`] drain it into a writer.

use std::{
    fmt,
    io::{self, Write},
    pin::Pin,
    task::{Context, Poll},
};

use eventsource_stream::Eventsource;
use futures::{stream, Stream, StreamExt};
use tracing::debug;

use crate::{
    chat::ChatCompletionChunk,
    error::{Error, Result},
};

const DONE: &str = "[DONE]";

pub struct CompletionStream {
    inner: Pin<Box<dyn Stream<Item = Result<String>> + Send>>,
}

impl CompletionStream {
    pub(crate) fn from_response(response: reqwest::Response) -> Self {
        Self::from_sse(response.bytes_stream())
    }

    /**
    Decodes a server-sent event byte stream of completion chunks

    Ends at the `[DONE]` sentinel or when the bytes run out, and after the first error
    */
    pub(crate) fn from_sse<S, B, E>(bytes: S) -> Self
    where
        S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
        B: AsRef<[u8]> + Send + 'static,
        E: fmt::Display + Send + 'static,
    {
        let events = Box::pin(bytes.eventsource());

        let fragments = stream::unfold(Some(events), |state| async move {
            let mut events = state?;
            loop {
                let event = match events.next().await? {
                    Ok(event) => event,
                    Err(e) => return Some((Err(Error::Streaming(e.to_string())), None)),
                };

                let data = event.data.trim();
                if data == DONE {
                    debug!(target: "azure_openai", "completion stream finished");
                    return None;
                }
                if data.is_empty() {
                    continue;
                }

                match serde_json::from_str::<ChatCompletionChunk>(data) {
                    Ok(chunk) => {
                        if let Some(fragment) = chunk.into_fragment() {
                            return Some((Ok(fragment), Some(events)));
                        }
                    }
                    Err(e) => {
                        let err = Error::Streaming(format!("invalid chunk {data:?}: {e}"));
                        return Some((Err(err), None));
                    }
                }
            }
        });

        Self {
            inner: Box::pin(fragments),
        }
    }

    /// Buffers the whole answer instead of printing it
    pub async fn collect_text(mut self) -> Result<String> {
        let mut text = String::new();
        while let Some(fragment) = self.next().await {
            text.push_str(&fragment?);
        }
        Ok(text)
    }
}

impl Stream for CompletionStream {
    type Item = Result<String>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

impl fmt::Debug for CompletionStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionStream").finish_non_exhaustive()
    }
}

/**
Writes every fragment as soon as it arrives, then a single newline

Fails with [`Error::Streaming`] if the stream or the writer fails
*/
pub async fn write_stream<W: Write>(mut stream: CompletionStream, out: &mut W) -> Result<()> {
    while let Some(fragment) = stream.next().await {
        let fragment = fragment?;
        out.write_all(fragment.as_bytes()).map_err(streaming)?;
        out.flush().map_err(streaming)?;
    }
    out.write_all(b"\n").map_err(streaming)?;
    out.flush().map_err(streaming)
}

/// [`write_stream`] to standard output
pub async fn print_stream(stream: CompletionStream) -> Result<()> {
    write_stream(stream, &mut io::stdout()).await
}

fn streaming(e: io::Error) -> Error {
    Error::Streaming(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn sse(parts: &[&'static str]) -> CompletionStream {
        let chunks: Vec<std::result::Result<&'static str, io::Error>> =
            parts.iter().map(|part| Ok(*part)).collect();
        CompletionStream::from_sse(stream::iter(chunks))
    }

    #[tokio::test]
    async fn yields_non_empty_fragments_until_done() {
        let stream = sse(&[
            "data: {\"choices\":[],\"prompt_filter_results\":[]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\",\"content\":\"\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n",
            "data: [DONE]\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"ignored\"}}]}\n\n",
        ]);

        let fragments: Vec<String> = stream.map(|f| f.unwrap()).collect().await;
        assert_eq!(fragments, vec!["Hel", "lo"]);
    }

    #[tokio::test]
    async fn events_split_across_byte_chunks() {
        let stream = sse(&[
            "data: {\"choices\":[{\"delta\":",
            "{\"content\":\"split\"}}]}\n",
            "\ndata: [DONE]\n\n",
        ]);

        assert_eq!(stream.collect_text().await.unwrap(), "split");
    }

    #[tokio::test]
    async fn transport_failure_ends_the_stream_with_a_streaming_error() {
        let chunks: Vec<std::result::Result<&'static str, io::Error>> = vec![
            Ok("data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n\n"),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "connection reset")),
            Ok("data: {\"choices\":[{\"delta\":{\"content\":\"b\"}}]}\n\n"),
        ];
        let mut stream = CompletionStream::from_sse(stream::iter(chunks));

        assert_eq!(stream.next().await.unwrap().unwrap(), "a");
        let err = stream.next().await.unwrap().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Streaming);
        assert!(err.to_string().contains("connection reset"));
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn malformed_chunk_is_a_streaming_error() {
        let err = sse(&["data: {not json}\n\n"]).collect_text().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Streaming);
        assert!(err.to_string().starts_with("Error during streaming: "));
    }

    #[tokio::test]
    async fn write_stream_appends_one_trailing_newline() {
        let stream = sse(&[
            "data: {\"choices\":[{\"delta\":{\"content\":\"one \"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"two\"}}]}\n\n",
            "data: [DONE]\n\n",
        ]);

        let mut out = Vec::new();
        write_stream(stream, &mut out).await.unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "one two\n");
    }

    #[tokio::test]
    async fn empty_stream_prints_just_a_newline() {
        let mut out = Vec::new();
        write_stream(sse(&["data: [DONE]\n\n"]), &mut out).await.unwrap();
        assert_eq!(out, b"\n");
    }

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "broken pipe"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn writer_failure_is_a_streaming_error() {
        let stream = sse(&["data: {\"choices\":[{\"delta\":{\"content\":\"x\"}}]}\n\n"]);
        let err = write_stream(stream, &mut BrokenPipe).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Streaming);
    }
}
