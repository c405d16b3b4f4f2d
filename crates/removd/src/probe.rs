//! Adaptive probing over files, buffers and HTTP streams.
//!
//! The window schedule comes from [`ProbePlan`]; this module only supplies
//! the bytes. Each reader keeps what it has already read, so a larger window
//! only reads the missing tail. A remote response is consumed until the
//! window is filled and then left open for the next attempt.

use std::path::Path;
use std::pin::Pin;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use removd_core::probe::{ProbePlan, ProbeStep};
use removd_core::{ProbeError, ProbeResult, ProbeSettings};
use tokio::io::AsyncReadExt;

use crate::source::ImageSource;

type ByteStream = Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>;

enum Input<'a> {
    Buffer(&'a [u8]),
    File(tokio::fs::File),
    Remote { stream: ByteStream, ended: bool },
}

/// Incrementally filled prefix of a source.
pub struct PrefixReader<'a> {
    input: Input<'a>,
    buf: Vec<u8>,
    total: Option<u64>,
}

impl<'a> PrefixReader<'a> {
    pub fn from_buffer(bytes: &'a [u8]) -> Self {
        Self {
            input: Input::Buffer(bytes),
            buf: Vec::new(),
            total: Some(bytes.len() as u64),
        }
    }

    /// Open a local file. A missing or unreadable path fails here, before
    /// any probing starts.
    pub async fn open_file(path: &Path) -> Result<PrefixReader<'static>, ProbeError> {
        let file = tokio::fs::File::open(path)
            .await
            .map_err(|e| ProbeError::Io(format!("{}: {e}", path.display())))?;
        let total = file
            .metadata()
            .await
            .map_err(|e| ProbeError::Io(e.to_string()))?
            .len();

        Ok(PrefixReader {
            input: Input::File(file),
            buf: Vec::new(),
            total: Some(total),
        })
    }

    /// Start a GET request. Non-success statuses fail here.
    pub async fn open_url(
        client: &reqwest::Client,
        url: &str,
    ) -> Result<PrefixReader<'static>, ProbeError> {
        let response = client
            .get(url)
            .send()
            .await
            .map_err(|e| ProbeError::Fetch(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProbeError::Fetch(status.to_string()));
        }

        let total = response.content_length().filter(|len| *len > 0);
        Ok(PrefixReader::from_stream(response.bytes_stream(), total))
    }

    /// Read from a body stream. Chunks are pulled only until the requested
    /// window is covered.
    pub fn from_stream<St>(stream: St, total: Option<u64>) -> PrefixReader<'static>
    where
        St: Stream<Item = reqwest::Result<Bytes>> + Send + 'static,
    {
        PrefixReader {
            input: Input::Remote {
                stream: Box::pin(stream),
                ended: false,
            },
            buf: Vec::new(),
            total,
        }
    }

    pub fn total(&self) -> Option<u64> {
        self.total
    }

    /// Bytes read so far.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Make sure the first `len` bytes (or the whole source, if shorter) are
    /// buffered and return them.
    pub async fn fill(&mut self, len: u64) -> Result<&[u8], ProbeError> {
        let want = usize::try_from(len).unwrap_or(usize::MAX);

        match &mut self.input {
            Input::Buffer(bytes) => {
                return Ok(&bytes[..bytes.len().min(want)]);
            }
            Input::File(file) => {
                if self.buf.len() < want {
                    let missing = (want - self.buf.len()) as u64;
                    file.take(missing)
                        .read_to_end(&mut self.buf)
                        .await
                        .map_err(|e| ProbeError::Io(e.to_string()))?;
                }
            }
            Input::Remote { stream, ended } => {
                while !*ended && self.buf.len() < want {
                    match stream.next().await {
                        Some(Ok(chunk)) => self.buf.extend_from_slice(&chunk),
                        Some(Err(e)) => return Err(ProbeError::Fetch(e.to_string())),
                        None => *ended = true,
                    }
                }
            }
        }

        Ok(&self.buf[..self.buf.len().min(want)])
    }
}

/// Run the adaptive probe loop over a reader.
pub async fn probe_reader(
    reader: &mut PrefixReader<'_>,
    settings: ProbeSettings,
) -> Result<ProbeResult, ProbeError> {
    let mut plan = ProbePlan::new(settings, reader.total());
    let mut last = ProbeError::Empty;

    while let Some(window) = plan.next_window() {
        let prefix = reader.fill(window.len).await?;
        if prefix.is_empty() {
            return Err(ProbeError::Empty);
        }

        match plan.evaluate(&window, prefix) {
            ProbeStep::Done(result) => {
                tracing::debug!(
                    attempts = window.attempt,
                    bytes = prefix.len(),
                    format = %result.format,
                    width = result.width,
                    height = result.height,
                    "probe complete"
                );
                return Ok(result);
            }
            ProbeStep::Grow(err) => {
                tracing::debug!(
                    attempt = window.attempt,
                    window = window.len,
                    error = %err,
                    "header incomplete, growing window"
                );
                last = err;
            }
            ProbeStep::Fail(err) => return Err(err),
        }
    }

    Err(last)
}

/// Probe a local file.
pub async fn probe_path(path: &Path, settings: ProbeSettings) -> Result<ProbeResult, ProbeError> {
    let mut reader = PrefixReader::open_file(path).await?;
    probe_reader(&mut reader, settings).await
}

/// Probe a remote image, reading only as much of the body as needed.
pub async fn probe_url(
    client: &reqwest::Client,
    url: &str,
    settings: ProbeSettings,
) -> Result<ProbeResult, ProbeError> {
    let mut reader = PrefixReader::open_url(client, url).await?;
    probe_reader(&mut reader, settings).await
}

/// Probe any source.
pub async fn probe_source(
    client: &reqwest::Client,
    source: &ImageSource,
    settings: ProbeSettings,
) -> Result<ProbeResult, ProbeError> {
    match source {
        ImageSource::Path(path) => probe_path(path, settings).await,
        ImageSource::Buffer(bytes) => {
            let mut reader = PrefixReader::from_buffer(bytes);
            probe_reader(&mut reader, settings).await
        }
        ImageSource::Url(url) => probe_url(client, url, settings).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{png_fixture, png_with_text_chunk};
    use std::io::Write;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_probe_file_single_attempt() {
        let mut file = tempfile::Builder::new().suffix(".png").tempfile().unwrap();
        file.write_all(&png_fixture(120, 80, false)).unwrap();

        let result = probe_path(file.path(), ProbeSettings::default()).await.unwrap();
        assert_eq!(result.dimensions(), (120, 80));
        assert_eq!(result.metadata.attempts, 1);
    }

    #[tokio::test]
    async fn test_probe_file_grows_window() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&png_with_text_chunk(20, 10, 50 * 1024)).unwrap();

        let result = probe_path(file.path(), ProbeSettings::default()).await.unwrap();
        assert_eq!(result.dimensions(), (20, 10));
        assert!(result.metadata.attempts >= 2);
    }

    #[tokio::test]
    async fn test_file_reader_reads_only_the_missing_tail() {
        let bytes = png_with_text_chunk(4, 4, 40 * 1024);
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&bytes).unwrap();

        let mut reader = PrefixReader::open_file(file.path()).await.unwrap();
        assert_eq!(reader.fill(1024).await.unwrap(), &bytes[..1024]);
        assert_eq!(reader.fill(4096).await.unwrap(), &bytes[..4096]);
        assert_eq!(reader.buffered(), 4096);
        // A smaller window reuses the buffer
        assert_eq!(reader.fill(100).await.unwrap(), &bytes[..100]);
        // Past the end returns the whole file
        assert_eq!(reader.fill(1 << 20).await.unwrap().len(), bytes.len());
    }

    /// Body stream that counts the bytes pulled from it.
    fn chunked(
        bytes: &[u8],
        chunk: usize,
        pulled: Arc<AtomicUsize>,
    ) -> impl Stream<Item = reqwest::Result<Bytes>> + Send + 'static {
        let chunks: Vec<Bytes> = bytes.chunks(chunk).map(Bytes::copy_from_slice).collect();
        futures::stream::iter(chunks).map(move |c| {
            pulled.fetch_add(c.len(), Ordering::SeqCst);
            Ok(c)
        })
    }

    /// PNG whose header ends past 15 KiB, followed by unrelated trailing bytes.
    fn deep_header_body() -> Vec<u8> {
        let mut body = png_with_text_chunk(20, 10, 15 * 1024);
        body.resize(body.len() + 100 * 1024, 0);
        body
    }

    #[tokio::test]
    async fn test_stream_reader_stops_at_window() {
        let body = deep_header_body();
        let pulled = Arc::new(AtomicUsize::new(0));
        let mut reader = PrefixReader::from_stream(chunked(&body, 1024, pulled.clone()), None);

        assert_eq!(reader.fill(10 * 1024).await.unwrap(), &body[..10 * 1024]);
        assert_eq!(pulled.load(Ordering::SeqCst), 10 * 1024);

        // Growing keeps the buffered prefix and pulls only the tail
        assert_eq!(reader.fill(20 * 1024).await.unwrap(), &body[..20 * 1024]);
        assert_eq!(pulled.load(Ordering::SeqCst), 20 * 1024);
        assert_eq!(reader.buffered(), 20 * 1024);

        assert_eq!(reader.fill(100).await.unwrap(), &body[..100]);
        assert_eq!(pulled.load(Ordering::SeqCst), 20 * 1024);
    }

    #[tokio::test]
    async fn test_stream_reader_uneven_chunks() {
        let body = deep_header_body();
        let pulled = Arc::new(AtomicUsize::new(0));
        let mut reader = PrefixReader::from_stream(chunked(&body, 3000, pulled.clone()), None);

        let prefix = reader.fill(10 * 1024).await.unwrap();
        assert_eq!(prefix, &body[..10 * 1024]);
        // The last chunk may overshoot the window, never a whole extra chunk
        assert_eq!(pulled.load(Ordering::SeqCst), 12_000);
        assert_eq!(reader.buffered(), 12_000);

        // Past the end returns everything and marks the stream ended
        assert_eq!(reader.fill(1 << 20).await.unwrap().len(), body.len());
        assert_eq!(pulled.load(Ordering::SeqCst), body.len());
    }

    #[tokio::test]
    async fn test_probe_stream_grows_without_refetching() {
        let body = deep_header_body();
        let pulled = Arc::new(AtomicUsize::new(0));
        let mut reader = PrefixReader::from_stream(chunked(&body, 1024, pulled.clone()), None);

        let result = probe_reader(&mut reader, ProbeSettings::default()).await.unwrap();

        assert_eq!(result.dimensions(), (20, 10));
        assert_eq!(result.metadata.attempts, 2);
        assert_eq!(result.metadata.bytes_read, 20 * 1024);
        assert_eq!(pulled.load(Ordering::SeqCst), 20 * 1024);
    }

    #[tokio::test]
    async fn test_missing_path_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = probe_path(&dir.path().join("nope.png"), ProbeSettings::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ProbeError::Io(_)));
    }

    #[tokio::test]
    async fn test_non_image_buffer_fails() {
        let source = ImageSource::buffer(vec![0xABu8; 4096]);
        let err = probe_source(&reqwest::Client::new(), &source, ProbeSettings::default())
            .await
            .unwrap_err();
        assert_eq!(err, ProbeError::NotAnImage);
    }

    #[tokio::test]
    async fn test_empty_file_is_empty() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let err = probe_path(file.path(), ProbeSettings::default()).await.unwrap_err();
        assert_eq!(err, ProbeError::Empty);
    }
}
