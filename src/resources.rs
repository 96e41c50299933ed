//! Waits for every image a document references before anything is measured.
//!
//! Layout reads intrinsic image sizes from [`ReadyResources`], and only the
//! gate can build one, so measuring before images have settled does not
//! type-check. A broken or slow image degrades to "no image"; it never
//! fails the pipeline.

use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use image::{DynamicImage, ImageReader};
use log::{debug, warn};
use tokio::task::JoinSet;

use crate::error::ResourceError;
use crate::layout::JsonNode;
use crate::layout_box::ImageSizes;

/// Outcome of loading one image source.
#[derive(Debug, Clone)]
pub enum Resource {
    Ready(Arc<DynamicImage>),
    Unavailable(ResourceError),
}

/// Every image source of a document, settled.
#[derive(Debug, Clone)]
pub struct ReadyResources {
    entries: HashMap<String, Resource>,
}

impl ReadyResources {
    /// For trees that reference no images.
    pub fn none() -> Self {
        ReadyResources {
            entries: HashMap::new(),
        }
    }

    pub fn get(&self, src: &str) -> Option<&Resource> {
        self.entries.get(src)
    }

    pub fn image(&self, src: &str) -> Option<&Arc<DynamicImage>> {
        match self.entries.get(src) {
            Some(Resource::Ready(img)) => Some(img),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn ready_count(&self) -> usize {
        self.entries
            .values()
            .filter(|r| matches!(r, Resource::Ready(_)))
            .count()
    }
}

impl ImageSizes for ReadyResources {
    fn intrinsic_size(&self, src: &str) -> Option<(f32, f32)> {
        self.image(src)
            .map(|img| (img.width() as f32, img.height() as f32))
    }
}

#[derive(Debug, Clone)]
pub struct ResourceGate {
    timeout: Duration,
    asset_dir: Option<Arc<PathBuf>>,
}

impl ResourceGate {
    /// A gate that loads data URLs and http(s) only.
    pub fn new(timeout: Duration) -> Self {
        ResourceGate {
            timeout,
            asset_dir: None,
        }
    }

    /// Also load local paths that resolve inside `dir`.
    pub fn with_asset_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.asset_dir = dir.map(Arc::new);
        self
    }

    /// Load every distinct image source under `root` concurrently. Returns
    /// once each has loaded, failed, or hit the timeout.
    pub async fn wait(&self, root: &JsonNode) -> ReadyResources {
        let mut sources = Vec::new();
        root.image_sources(&mut sources);
        sources.sort_unstable();
        sources.dedup();

        if sources.is_empty() {
            return ReadyResources::none();
        }

        let started = Instant::now();
        let mut tasks = JoinSet::new();
        for src in sources {
            let src = src.to_string();
            let timeout = self.timeout;
            let asset_dir = self.asset_dir.clone();
            tasks.spawn(async move {
                let resource = load(&src, timeout, asset_dir.as_deref().map(PathBuf::as_path)).await;
                (src, resource)
            });
        }

        let mut entries = HashMap::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((src, resource)) => {
                    match &resource {
                        Resource::Ready(img) => {
                            debug!("image ready: {} ({}x{})", preview(&src), img.width(), img.height())
                        }
                        Resource::Unavailable(e) => warn!("image unavailable, continuing without it: {e}"),
                    }
                    entries.insert(src, resource);
                }
                // The source is lost with the task; layout treats it as missing.
                Err(e) => warn!("image loader task failed: {e}"),
            }
        }

        debug!(
            "resource gate settled {} source(s) in {:?}",
            entries.len(),
            started.elapsed()
        );
        ReadyResources { entries }
    }
}

async fn load(src: &str, timeout: Duration, asset_dir: Option<&Path>) -> Resource {
    match tokio::time::timeout(timeout, fetch_and_decode(src, timeout, asset_dir)).await {
        Ok(Ok(img)) => Resource::Ready(Arc::new(img)),
        Ok(Err(e)) => Resource::Unavailable(e),
        Err(_) => Resource::Unavailable(ResourceError::Timeout {
            src: preview(src),
            after_ms: timeout.as_millis(),
        }),
    }
}

async fn fetch_and_decode(
    src: &str,
    timeout: Duration,
    asset_dir: Option<&Path>,
) -> Result<DynamicImage, ResourceError> {
    let bytes = fetch(src, timeout, asset_dir).await?;
    let name = preview(src);
    tokio::task::spawn_blocking(move || decode(&name, &bytes))
        .await
        .map_err(|e| ResourceError::Decode {
            src: preview(src),
            message: e.to_string(),
        })?
}

async fn fetch(src: &str, timeout: Duration, asset_dir: Option<&Path>) -> Result<Vec<u8>, ResourceError> {
    if src.starts_with("data:") {
        decode_data_url(src)
    } else if src.starts_with("http://") || src.starts_with("https://") {
        let url = src.to_string();
        tokio::task::spawn_blocking(move || fetch_remote(&url, timeout))
            .await
            .map_err(|e| ResourceError::Fetch {
                src: preview(src),
                message: e.to_string(),
            })?
    } else if src.contains("://") && !src.starts_with("file://") {
        Err(ResourceError::Unsupported(preview(src)))
    } else {
        let root = asset_dir.ok_or_else(|| ResourceError::Unsupported(preview(src)))?;
        let path = resolve_local(root, src).await?;
        tokio::fs::read(path).await.map_err(|e| ResourceError::Fetch {
            src: preview(src),
            message: e.to_string(),
        })
    }
}

/// Canonical path of a local source, refused unless it lies under `root`.
/// Relative paths are taken from `root`.
async fn resolve_local(root: &Path, src: &str) -> Result<PathBuf, ResourceError> {
    let fetch_error = |e: std::io::Error| ResourceError::Fetch {
        src: preview(src),
        message: e.to_string(),
    };
    let root = tokio::fs::canonicalize(root).await.map_err(fetch_error)?;
    let path = src.strip_prefix("file://").unwrap_or(src);
    let path = tokio::fs::canonicalize(root.join(path))
        .await
        .map_err(fetch_error)?;
    if path.starts_with(&root) {
        Ok(path)
    } else {
        Err(ResourceError::Unsupported(preview(src)))
    }
}

/// `data:[<mediatype>][;base64],<payload>`
fn decode_data_url(src: &str) -> Result<Vec<u8>, ResourceError> {
    let (header, payload) = src
        .split_once(',')
        .ok_or_else(|| ResourceError::Decode {
            src: preview(src),
            message: "data URL has no payload".to_string(),
        })?;

    if header.ends_with(";base64") {
        let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
        base64::Engine::decode(&base64::engine::general_purpose::STANDARD, compact).map_err(|e| {
            ResourceError::Decode {
                src: preview(src),
                message: format!("base64: {e}"),
            }
        })
    } else {
        Ok(urlencoding::decode_binary(payload.as_bytes()).into_owned())
    }
}

/// Blocking; runs on the blocking pool. The agent timeout releases the
/// thread even after the async side has given up.
fn fetch_remote(url: &str, timeout: Duration) -> Result<Vec<u8>, ResourceError> {
    let agent = ureq::AgentBuilder::new().timeout(timeout).build();
    let response = agent.get(url).call().map_err(|e| ResourceError::Fetch {
        src: url.to_string(),
        message: e.to_string(),
    })?;

    let mut bytes = Vec::new();
    response
        .into_reader()
        .read_to_end(&mut bytes)
        .map_err(|e| ResourceError::Fetch {
            src: url.to_string(),
            message: e.to_string(),
        })?;
    Ok(bytes)
}

fn decode(src: &str, bytes: &[u8]) -> Result<DynamicImage, ResourceError> {
    if bytes.is_empty() {
        return Err(ResourceError::Decode {
            src: src.to_string(),
            message: "empty image data".to_string(),
        });
    }
    ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| ResourceError::Decode {
            src: src.to_string(),
            message: e.to_string(),
        })?
        .decode()
        .map_err(|e| ResourceError::Decode {
            src: src.to_string(),
            message: e.to_string(),
        })
}

/// Data URLs can be megabytes long; keep log lines and errors readable.
fn preview(src: &str) -> String {
    const MAX: usize = 64;
    match src.char_indices().nth(MAX) {
        Some((cut, _)) => format!("{}...", &src[..cut]),
        None => src.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{Dimension, Style};
    use crate::layout_box::layout_tree;
    use base64::Engine;
    use image::{ImageFormat, Rgb, RgbImage};

    fn png_data_url(width: u32, height: u32) -> String {
        let img = RgbImage::from_pixel(width, height, Rgb([200, 40, 40]));
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png).unwrap();
        format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(bytes)
        )
    }

    fn photo(src: &str) -> JsonNode {
        JsonNode::image(
            src,
            Style {
                width: Some(Dimension::Px(60.0)),
                ..Style::default()
            },
        )
    }

    #[tokio::test]
    async fn measuring_after_the_gate_sees_real_image_heights() {
        let src = png_data_url(30, 45);
        let tree = JsonNode::view(Style::default(), vec![photo(&src)]);

        let before = layout_tree(&tree, 400.0, &ReadyResources::none());
        assert_eq!(before.height, 0.0);

        let ready = ResourceGate::new(Duration::from_secs(2)).wait(&tree).await;
        assert_eq!(ready.ready_count(), 1);
        let after = layout_tree(&tree, 400.0, &ready);
        assert_eq!(after.height, 90.0);
    }

    #[tokio::test]
    async fn broken_sources_degrade_to_unavailable() {
        let tree = JsonNode::view(
            Style::default(),
            vec![
                photo("data:image/png;base64,!!!not-base64!!!"),
                photo("/definitely/not/here.png"),
                photo("ftp://example.com/a.png"),
            ],
        );
        let ready = ResourceGate::new(Duration::from_secs(2)).wait(&tree).await;
        assert_eq!(ready.len(), 3);
        assert_eq!(ready.ready_count(), 0);
        assert!(matches!(
            ready.get("ftp://example.com/a.png"),
            Some(Resource::Unavailable(ResourceError::Unsupported(_)))
        ));
    }

    fn asset_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("cvpress-{name}-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        RgbImage::from_pixel(8, 8, Rgb([0, 0, 0]))
            .save(dir.join("logo.png"))
            .unwrap();
        dir
    }

    #[tokio::test]
    async fn local_paths_are_refused_without_an_asset_dir() {
        let dir = asset_dir("refused");
        let absolute = dir.join("logo.png").display().to_string();
        let url = format!("file://{absolute}");
        let tree = JsonNode::view(Style::default(), vec![photo(&absolute), photo(&url)]);

        let ready = ResourceGate::new(Duration::from_secs(2)).wait(&tree).await;
        assert_eq!(ready.ready_count(), 0);
        for src in [&absolute, &url] {
            assert!(matches!(
                ready.get(src),
                Some(Resource::Unavailable(ResourceError::Unsupported(_)))
            ));
        }
    }

    #[tokio::test]
    async fn local_paths_load_only_inside_the_asset_dir() {
        let dir = asset_dir("allowed");
        let outside = asset_dir("outside").join("logo.png").display().to_string();
        let escape = "../etc/passwd".to_string();
        let tree = JsonNode::view(
            Style::default(),
            vec![photo("logo.png"), photo(&outside), photo(&escape)],
        );

        let ready = ResourceGate::new(Duration::from_secs(2))
            .with_asset_dir(Some(dir))
            .wait(&tree)
            .await;
        assert!(ready.image("logo.png").is_some());
        assert!(matches!(
            ready.get(&outside),
            Some(Resource::Unavailable(ResourceError::Unsupported(_)))
        ));
        assert!(ready.image(&escape).is_none());
    }

    #[tokio::test]
    async fn duplicate_sources_load_once() {
        let src = png_data_url(4, 4);
        let tree = JsonNode::view(Style::default(), vec![photo(&src), photo(&src)]);
        let ready = ResourceGate::new(Duration::from_secs(2)).wait(&tree).await;
        assert_eq!(ready.len(), 1);
    }

    #[test]
    fn percent_encoded_data_urls_decode() {
        let bytes = decode_data_url("data:text/plain,a%20b").unwrap();
        assert_eq!(bytes, b"a b");
    }

    #[test]
    fn previews_truncate_long_sources() {
        let long = "x".repeat(500);
        assert_eq!(preview(&long).len(), 67);
        assert_eq!(preview("short.png"), "short.png");
    }
}
