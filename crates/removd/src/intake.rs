//! Per-request validation and preparation.
//!
//! Intake turns an [`ItemRequest`] into a [`Prepared`] item: it checks the
//! request against the allow-lists, probes the source, picks the size tier
//! and loads the upload payload. Anything that fails here is rejected before
//! the transform service is called.

use std::path::{Path, PathBuf};

use bytes::Bytes;
use futures::StreamExt;
use removd_core::probe::unwrap_payload;
use removd_core::{
    shrink_to_fit, source_extension, Classification, ProbeResult, TierError, TierTable,
};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::probe::probe_source;
use crate::scheduler::{Failure, Prepared, WorkItem};
use crate::source::ImageSource;

/// How the result file is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextOutput {
    /// Raw image bytes.
    Image,
    /// Base64 text.
    Base64,
    /// Base64 text behind a `data:<mime>;base64,` prefix.
    DataUrl,
}

/// Per-item options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ItemOptions {
    /// Size tier name; the classified tier is used when unset.
    pub size: Option<String>,
    /// Upload a copy shrunk into the tier box and scale the result back to
    /// the source dimensions.
    pub preserve_resolution: bool,
    /// Output file, or directory when it has no extension.
    pub destination: Option<PathBuf>,
    /// Output encoding; text sources default to text output.
    pub output_text: Option<TextOutput>,
    /// Remove a local source file once its result is written.
    pub delete_original: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemRequest {
    pub source: ImageSource,
    pub options: ItemOptions,
}

impl ItemRequest {
    pub fn new(source: ImageSource) -> Self {
        Self {
            source,
            options: ItemOptions::default(),
        }
    }

    pub fn with_options(source: ImageSource, options: ItemOptions) -> Self {
        Self { source, options }
    }
}

/// What gets uploaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Bytes(Bytes),
    /// The service fetches the image itself.
    Url(String),
}

/// A validated request, ready for the transform service.
#[derive(Debug, Clone)]
pub struct TransformRequest {
    /// Position in the request list.
    pub index: usize,
    pub source: ImageSource,
    pub probe: ProbeResult,
    pub classification: Classification,
    pub payload: Payload,
    /// The payload is smaller than the source and the result must be scaled
    /// back up.
    pub downscaled: bool,
    pub options: ItemOptions,
}

impl TransformRequest {
    /// Output encoding after applying the text-source default.
    pub fn output(&self) -> TextOutput {
        self.options.output_text.unwrap_or(
            match (self.probe.metadata.encoding.is_text(), self.probe.is_data_url) {
                (true, true) => TextOutput::DataUrl,
                (true, false) => TextOutput::Base64,
                (false, _) => TextOutput::Image,
            },
        )
    }
}

/// Request preparation against one configuration.
pub struct Intake<'a> {
    config: &'a Config,
    client: &'a reqwest::Client,
    tiers: TierTable<'static>,
}

impl<'a> Intake<'a> {
    pub fn new(config: &'a Config, client: &'a reqwest::Client) -> Self {
        Self {
            config,
            client,
            tiers: TierTable::standard(),
        }
    }

    /// Prepare every request, `concurrency` at a time, keeping input order.
    pub async fn prepare_all(&self, requests: Vec<ItemRequest>) -> Vec<Prepared<TransformRequest>> {
        futures::stream::iter(requests.into_iter().enumerate())
            .map(|(index, request)| self.prepare(index, request))
            .buffered(self.config.concurrency.max(1))
            .collect()
            .await
    }

    pub async fn prepare(&self, index: usize, request: ItemRequest) -> Prepared<TransformRequest> {
        let source = request.source.id(index);
        match self.try_prepare(index, request).await {
            Ok(input) => Prepared::Ready(WorkItem { source, input }),
            Err(err) => {
                tracing::warn!(source = %source, error = %err, "request rejected");
                Prepared::Rejected(Failure::new(source, err))
            }
        }
    }

    async fn try_prepare(&self, index: usize, request: ItemRequest) -> Result<TransformRequest> {
        let ItemRequest { source, options } = request;

        if let Some(size) = &options.size {
            if self.tiers.find(size).is_none() {
                return Err(TierError::UnsupportedSize(size.clone()).into());
            }
        }

        match &source {
            ImageSource::Path(path) => check_path(path).await?,
            ImageSource::Url(url) => {
                reqwest::Url::parse(url).map_err(|e| Error::validation(format!("{e}: {url}")))?;
            }
            ImageSource::Buffer(bytes) if bytes.is_empty() => {
                return Err(Error::validation("Empty buffer"));
            }
            ImageSource::Buffer(_) => {}
        }

        let probe = probe_source(self.client, &source, self.config.probe).await?;
        let classification =
            self.tiers
                .resolve(options.size.as_deref(), probe.width, probe.height)?;
        let shrink = options.preserve_resolution
            && classification.tier.is_bounded()
            && !classification.fit.preserved_without_resize;

        tracing::debug!(
            source = index,
            tier = classification.tier_name(),
            megapixels = %classification.megapixels,
            shrink,
            "classified"
        );

        let (payload, downscaled) = match &source {
            ImageSource::Url(url) => (Payload::Url(url.clone()), shrink),
            ImageSource::Path(path) => {
                let raw = tokio::fs::read(path).await?;
                self.load_payload(Bytes::from(raw), &probe, &classification, shrink)
                    .await?
            }
            ImageSource::Buffer(bytes) => {
                self.load_payload(bytes.clone(), &probe, &classification, shrink)
                    .await?
            }
        };

        Ok(TransformRequest {
            index,
            source,
            probe,
            classification,
            payload,
            downscaled,
            options,
        })
    }

    /// Decode a text payload to image bytes and shrink it when asked.
    async fn load_payload(
        &self,
        raw: Bytes,
        probe: &ProbeResult,
        classification: &Classification,
        shrink: bool,
    ) -> Result<(Payload, bool)> {
        let image = if probe.metadata.encoding.is_text() {
            Bytes::from(unwrap_payload(&raw)?.bytes.into_owned())
        } else {
            raw
        };

        if !shrink {
            return Ok((Payload::Bytes(image), false));
        }

        let target = classification.tier.max_box;
        let options = self.config.shrink;
        let outcome =
            tokio::task::spawn_blocking(move || shrink_to_fit(&image, target, &options)).await??;

        tracing::debug!(
            width = outcome.width,
            height = outcome.height,
            quality = outcome.quality,
            bytes = outcome.bytes.len(),
            "payload downscaled"
        );
        Ok((Payload::Bytes(Bytes::from(outcome.bytes)), true))
    }
}

async fn check_path(path: &Path) -> Result<()> {
    if source_extension(path).is_none() {
        return Err(Error::validation(format!(
            "Unsupported file format: {}",
            path.display()
        )));
    }

    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => Ok(()),
        Ok(_) => Err(not_a_file(path)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Err(not_a_file(path)),
        Err(err) => Err(err.into()),
    }
}

fn not_a_file(path: &Path) -> Error {
    Error::validation(format!("Not a valid file: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{jpeg_fixture, jpeg_with_orientation, png_fixture};
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use removd_core::PayloadEncoding;

    fn write(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, bytes).unwrap();
        path
    }

    fn ready(prepared: Prepared<TransformRequest>) -> TransformRequest {
        match prepared {
            Prepared::Ready(item) => item.input,
            Prepared::Rejected(failure) => panic!("rejected: {}", failure.error),
        }
    }

    fn rejection(prepared: Prepared<TransformRequest>) -> Failure {
        match prepared {
            Prepared::Rejected(failure) => failure,
            Prepared::Ready(item) => panic!("unexpectedly ready: {}", item.source),
        }
    }

    #[tokio::test]
    async fn test_prepare_png_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "cat.png", &png_fixture(700, 400, false));
        let config = Config::default();
        let client = reqwest::Client::new();

        let request = ready(
            Intake::new(&config, &client)
                .prepare(0, ItemRequest::new(ImageSource::path(&path)))
                .await,
        );

        assert_eq!(request.probe.dimensions(), (700, 400));
        assert_eq!(request.classification.tier_name(), "medium");
        assert!(!request.downscaled);
        assert_eq!(request.output(), TextOutput::Image);
        assert!(matches!(request.payload, Payload::Bytes(ref b) if b.len() == std::fs::metadata(&path).unwrap().len() as usize));
    }

    #[tokio::test]
    async fn test_rejections_happen_before_probing() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        let client = reqwest::Client::new();
        let intake = Intake::new(&config, &client);

        let gif = write(dir.path(), "anim.gif", b"GIF89a");
        let failure = rejection(intake.prepare(0, ItemRequest::new(ImageSource::path(&gif))).await);
        assert!(failure.error.starts_with("Unsupported file format"));
        assert_eq!(failure.source.as_str(), gif.display().to_string());

        let missing = dir.path().join("missing.png");
        let failure = rejection(intake.prepare(1, ItemRequest::new(ImageSource::path(missing))).await);
        assert!(failure.error.starts_with("Not a valid file"));

        let png = write(dir.path(), "ok.png", &png_fixture(10, 10, false));
        let options = ItemOptions {
            size: Some("huge".into()),
            ..Default::default()
        };
        let failure = rejection(
            intake
                .prepare(2, ItemRequest::with_options(ImageSource::path(png), options))
                .await,
        );
        assert_eq!(failure.error, "Unsupported size: huge");

        let failure = rejection(intake.prepare(3, ItemRequest::new(ImageSource::url("not a url"))).await);
        assert_eq!(failure.source.as_str(), "not a url");
    }

    #[tokio::test]
    async fn test_unreadable_path_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let file = write(dir.path(), "plain.png", &png_fixture(4, 4, false));

        // A regular file used as a directory fails with ENOTDIR, not NotFound
        let err = check_path(&file.join("inner.png")).await.unwrap_err();
        assert!(matches!(err, Error::Io(_)), "got {err:?}");

        let folder = dir.path().join("folder.png");
        std::fs::create_dir(&folder).unwrap();
        let err = check_path(&folder).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn test_text_file_payload_is_decoded() {
        let dir = tempfile::tempdir().unwrap();
        let jpeg = jpeg_fixture(64, 32);
        let text = format!("data:image/jpeg;base64,{}\n", STANDARD.encode(&jpeg));
        let path = write(dir.path(), "photo.txt", text.as_bytes());
        let config = Config::default();
        let client = reqwest::Client::new();

        let request = ready(
            Intake::new(&config, &client)
                .prepare(0, ItemRequest::new(ImageSource::path(path)))
                .await,
        );

        assert!(request.probe.is_data_url);
        assert_eq!(request.probe.metadata.encoding, PayloadEncoding::Base64);
        assert_eq!(request.output(), TextOutput::DataUrl);
        assert_eq!(request.payload, Payload::Bytes(Bytes::from(jpeg)));
    }

    #[tokio::test]
    async fn test_preserve_resolution_shrinks_payload() {
        let config = Config::default();
        let client = reqwest::Client::new();
        let options = ItemOptions {
            size: Some("small".into()),
            preserve_resolution: true,
            ..Default::default()
        };
        let source = ImageSource::buffer(png_fixture(1250, 800, false));

        let request = ready(
            Intake::new(&config, &client)
                .prepare(0, ItemRequest::with_options(source, options))
                .await,
        );

        assert!(request.downscaled);
        let Payload::Bytes(bytes) = &request.payload else {
            panic!("expected bytes payload");
        };
        let uploaded = image::load_from_memory(bytes).unwrap();
        assert_eq!((uploaded.width(), uploaded.height()), (625, 400));
    }

    #[tokio::test]
    async fn test_rotated_jpeg_upload_matches_fit() {
        let config = Config::default();
        let client = reqwest::Client::new();
        let options = ItemOptions {
            size: Some("small".into()),
            preserve_resolution: true,
            ..Default::default()
        };
        // Stored landscape, displayed portrait
        let source = ImageSource::buffer(jpeg_with_orientation(1250, 800, 6));

        let request = ready(
            Intake::new(&config, &client)
                .prepare(0, ItemRequest::with_options(source, options))
                .await,
        );

        assert_eq!(request.probe.dimensions(), (800, 1250));
        let fit = request.classification.fit;
        assert_eq!((fit.target_width, fit.target_height), (400, 625));
        assert!(request.downscaled);

        let Payload::Bytes(bytes) = &request.payload else {
            panic!("expected bytes payload");
        };
        let uploaded = image::load_from_memory(bytes).unwrap();
        assert_eq!((uploaded.width(), uploaded.height()), (fit.target_width, fit.target_height));
    }

    #[tokio::test]
    async fn test_url_payload_is_not_downloaded() {
        let config = Config::default();
        let client = reqwest::Client::new();
        let intake = Intake::new(&config, &client);

        // Unroutable port: the probe fails, but validation passed first
        let failure = rejection(
            intake
                .prepare(0, ItemRequest::new(ImageSource::url("http://127.0.0.1:9/cat.png")))
                .await,
        );
        assert_eq!(failure.source.as_str(), "http://127.0.0.1:9/cat.png");
        assert!(!failure.error.is_empty());
    }

    #[tokio::test]
    async fn test_prepare_all_keeps_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.concurrency = 2;
        let client = reqwest::Client::new();

        let requests = vec![
            ItemRequest::new(ImageSource::path(write(dir.path(), "a.png", &png_fixture(20, 20, false)))),
            ItemRequest::new(ImageSource::path(dir.path().join("b.bmp"))),
            ItemRequest::new(ImageSource::buffer(jpeg_fixture(30, 10))),
        ];

        let prepared = Intake::new(&config, &client).prepare_all(requests).await;
        let ids: Vec<&str> = prepared.iter().map(|p| p.source().as_str()).collect();
        assert_eq!(ids[2], "buffer-2");
        assert!(ids[0].ends_with("a.png"));
        assert!(matches!(prepared[1], Prepared::Rejected(_)));
    }
}
