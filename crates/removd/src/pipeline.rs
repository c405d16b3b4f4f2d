//! End-to-end runs: intake, the transform call and writing the result.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use removd_core::decode::{decode_image, resize, FilterType};
use removd_core::encode::{encode_png, shrink_image};
use removd_core::{ImageKind, ShrinkOptions};
use serde::Serialize;

use crate::config::{ApiKey, Config};
use crate::error::Result;
use crate::intake::{Intake, ItemRequest, Payload, TextOutput, TransformRequest};
use crate::scheduler::{
    progress_channel, run_batch, Failure, Prepared, ProgressSender, ProgressStream, WorkItem,
    WorkResult,
};
use crate::source::{ImageSource, SourceId};
use crate::transformer::{Account, HttpTransformer, RemoteImage, TransformPayload, Transformer};

/// Summary of one transformed image.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransformOutcome {
    pub credits_charged: Option<f64>,
    /// Size tier the request was billed at.
    pub tier: &'static str,
    /// Dimensions reported by the service.
    pub dimensions: Option<(u32, u32)>,
    /// Foreground type detected by the service.
    pub detected: Option<String>,
    pub destination: PathBuf,
    /// The service returned fewer pixels than the source has.
    pub resized: bool,
    /// The result was scaled back to the source dimensions.
    pub restored: bool,
    pub duration: Duration,
}

/// Batch with a progress stream, returned before any item is resolved.
pub struct ProgressBatch<'a, T> {
    /// Sources in request order.
    pub sources: Vec<SourceId>,
    pub progress: ProgressStream<TransformOutcome>,
    pub runner: BatchRunner<'a, T>,
}

/// Drives a [`ProgressBatch`]. The progress stream ends when `run` returns.
pub struct BatchRunner<'a, T> {
    pipeline: &'a Pipeline<T>,
    prepared: Vec<Prepared<TransformRequest>>,
    sender: ProgressSender<TransformOutcome>,
}

impl<T: Transformer> BatchRunner<'_, T> {
    pub async fn run(self) -> Vec<WorkResult<TransformOutcome>> {
        let pipeline = self.pipeline;
        run_batch(
            self.prepared,
            |item| pipeline.resolve(item),
            pipeline.config.concurrency,
            Some(self.sender),
        )
        .await
    }
}

/// Intake plus transform, configured once and reused across runs.
pub struct Pipeline<T = HttpTransformer> {
    config: Config,
    api_key: ApiKey,
    client: reqwest::Client,
    transformer: T,
}

impl Pipeline<HttpTransformer> {
    /// Pipeline that talks to `config.endpoint` over HTTP.
    pub fn from_config(config: Config, api_key: ApiKey) -> Result<Self> {
        config.validate()?;
        let client = reqwest::Client::builder()
            .user_agent(concat!("removd/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(120))
            .build()?;
        let transformer = HttpTransformer::new(client.clone(), config.endpoint.clone());
        Ok(Self {
            config,
            api_key,
            client,
            transformer,
        })
    }
}

impl<T: Transformer> Pipeline<T> {
    pub fn with_transformer(config: Config, api_key: ApiKey, transformer: T) -> Self {
        Self {
            config,
            api_key,
            client: reqwest::Client::new(),
            transformer,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn intake(&self) -> Intake<'_> {
        Intake::new(&self.config, &self.client)
    }

    /// Credit balance and allowance of the configured key.
    pub async fn account(&self) -> Result<Account> {
        self.transformer.account(&self.api_key).await
    }

    /// Run a single request.
    pub async fn once(&self, request: ItemRequest) -> WorkResult<TransformOutcome> {
        let prepared = self.intake().prepare(0, request).await;
        let source = prepared.source().clone();
        run_batch(vec![prepared], |item| self.resolve(item), 1, None)
            .await
            .pop()
            .unwrap_or_else(|| WorkResult::Failure(Failure::new(source, "no result produced")))
    }

    /// Run every request; one result per request.
    pub async fn batch(&self, requests: Vec<ItemRequest>) -> Vec<WorkResult<TransformOutcome>> {
        let prepared = self.intake().prepare_all(requests).await;
        run_batch(
            prepared,
            |item| self.resolve(item),
            self.config.concurrency,
            None,
        )
        .await
    }

    /// Prepare a batch and hand back its manifest, progress stream and
    /// runner. Poll the stream while the runner runs.
    pub async fn batch_with_progress(&self, requests: Vec<ItemRequest>) -> ProgressBatch<'_, T> {
        let sources = requests
            .iter()
            .enumerate()
            .map(|(index, request)| request.source.id(index))
            .collect();
        let prepared = self.intake().prepare_all(requests).await;
        let (sender, progress) = progress_channel();

        ProgressBatch {
            sources,
            progress,
            runner: BatchRunner {
                pipeline: self,
                prepared,
                sender,
            },
        }
    }

    async fn resolve(&self, item: WorkItem<TransformRequest>) -> Result<TransformOutcome> {
        let started = Instant::now();
        let request = item.input;

        let image = match &request.payload {
            Payload::Bytes(bytes) => RemoteImage::Bytes(bytes),
            Payload::Url(url) => RemoteImage::Url(url),
        };
        let remote = self
            .transformer
            .transform(
                &self.api_key,
                TransformPayload {
                    source: item.source.as_str(),
                    image,
                    size: request.classification.tier_name(),
                    target: request.classification.fit.target(),
                },
            )
            .await?;

        let (source_width, source_height) = request.probe.dimensions();
        let dimensions = remote.dimensions();
        let resized = dimensions.is_some_and(|(w, h)| w < source_width || h < source_height);

        let mut kind = remote
            .content_type
            .as_deref()
            .and_then(ImageKind::from_mime)
            .unwrap_or(ImageKind::Png);
        let mut bytes = remote.bytes;
        let mut restored = false;

        if request.downscaled {
            let options = self.config.shrink;
            let (restored_bytes, restored_kind) = tokio::task::spawn_blocking(move || {
                restore(&bytes, source_width, source_height, &options)
            })
            .await??;
            bytes = restored_bytes;
            kind = restored_kind;
            restored = true;
        }

        let output = request.output();
        let destination = spare_source(self.destination(&request, output, kind), &request.source).await;
        write_output(&destination, &bytes, output, kind).await?;

        if request.options.delete_original {
            if let ImageSource::Path(path) = &request.source {
                if let Err(err) = tokio::fs::remove_file(path).await {
                    tracing::warn!(source = %item.source, error = %err, "could not delete original");
                }
            }
        }

        let outcome = TransformOutcome {
            credits_charged: remote.credits_charged,
            tier: request.classification.tier_name(),
            dimensions,
            detected: remote.detected,
            destination,
            resized,
            restored,
            duration: started.elapsed(),
        };

        tracing::info!(
            source = %item.source,
            tier = outcome.tier,
            destination = %outcome.destination.display(),
            elapsed_ms = outcome.duration.as_millis() as u64,
            "item done"
        );
        Ok(outcome)
    }

    fn destination(&self, request: &TransformRequest, output: TextOutput, kind: ImageKind) -> PathBuf {
        let ext = match output {
            TextOutput::Image => kind.extension(),
            TextOutput::Base64 | TextOutput::DataUrl => "txt",
        };

        match &request.options.destination {
            Some(file) if file.extension().is_some() => match output {
                TextOutput::Image => file.with_extension(ext),
                TextOutput::Base64 | TextOutput::DataUrl => file.clone(),
            },
            Some(dir) => dir.join(format!("{}.{ext}", request.source.stem(request.index))),
            None => {
                let dir = match &request.source {
                    ImageSource::Path(path) => path
                        .parent()
                        .map(Path::to_path_buf)
                        .unwrap_or_default(),
                    ImageSource::Buffer(_) | ImageSource::Url(_) => self.config.output_dir.clone(),
                };
                dir.join(format!("{}.{ext}", request.source.stem(request.index)))
            }
        }
    }
}

/// Keep a result from landing on its own source file: such a destination
/// gets a `-cutout` suffix on its stem.
async fn spare_source(destination: PathBuf, source: &ImageSource) -> PathBuf {
    let ImageSource::Path(path) = source else {
        return destination;
    };

    let same = destination == *path
        || match (
            tokio::fs::canonicalize(path).await,
            tokio::fs::canonicalize(&destination).await,
        ) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        };
    if !same {
        return destination;
    }

    let stem = destination
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match destination.extension() {
        Some(ext) => format!("{stem}-cutout.{}", ext.to_string_lossy()),
        None => format!("{stem}-cutout"),
    };
    destination.with_file_name(name)
}

/// Scale a result back to the source dimensions. Transparent results stay
/// PNG; opaque ones go through the JPEG quality search.
fn restore(
    bytes: &[u8],
    width: u32,
    height: u32,
    options: &ShrinkOptions,
) -> Result<(Bytes, ImageKind)> {
    let decoded = decode_image(bytes)?;
    let scaled = resize(&decoded, width, height, FilterType::Lanczos3)?;

    if scaled.has_alpha {
        Ok((Bytes::from(encode_png(&scaled)?), ImageKind::Png))
    } else {
        let outcome = shrink_image(&scaled, options)?;
        Ok((Bytes::from(outcome.bytes), ImageKind::Jpeg))
    }
}

async fn write_output(path: &Path, bytes: &[u8], output: TextOutput, kind: ImageKind) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }

    let contents = match output {
        TextOutput::Image => bytes.to_vec(),
        TextOutput::Base64 => STANDARD.encode(bytes).into_bytes(),
        TextOutput::DataUrl => {
            format!("data:{};base64,{}", kind.mime_type(), STANDARD.encode(bytes)).into_bytes()
        }
    };
    tokio::fs::write(path, contents).await?;
    Ok(())
}
