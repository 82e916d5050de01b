use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::thread;

use anyhow::{anyhow, Context, Result};
use crossbeam_channel::{unbounded, Receiver, Sender};
use image::RgbaImage;

use crate::pixels::{ImageSource, PixelView};

#[derive(Debug)]
struct AssetSlot {
    label: String,
    state: OnceLock<Result<RgbaImage, String>>,
}

/// Shared slot filled exactly once by a background decode.
#[derive(Debug, Clone)]
pub struct AssetHandle(Arc<AssetSlot>);

impl AssetHandle {
    pub fn pending(label: impl Into<String>) -> Self {
        Self(Arc::new(AssetSlot {
            label: label.into(),
            state: OnceLock::new(),
        }))
    }

    pub fn ready(label: impl Into<String>, image: RgbaImage) -> Self {
        let handle = Self::pending(label);
        handle.resolve(Ok(image));
        handle
    }

    pub fn label(&self) -> &str {
        &self.0.label
    }

    /// True once the decode finished, successfully or not.
    pub fn is_settled(&self) -> bool {
        self.0.state.get().is_some()
    }

    pub fn image(&self) -> Option<&RgbaImage> {
        self.0.state.get().and_then(|state| state.as_ref().ok())
    }

    pub fn error(&self) -> Option<&str> {
        self.0
            .state
            .get()
            .and_then(|state| state.as_ref().err())
            .map(String::as_str)
    }

    pub(crate) fn resolve(&self, outcome: Result<RgbaImage, String>) {
        // First writer wins; a second resolve is ignored.
        let _ = self.0.state.set(outcome);
    }
}

impl ImageSource for AssetHandle {
    fn pixels(&self) -> Option<PixelView<'_>> {
        self.image().and_then(ImageSource::pixels)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetEvent {
    Loaded { label: String },
    Failed { label: String, reason: String },
}

/// Decodes images off the main thread and reports completions.
pub struct AssetLoader {
    tx: Sender<AssetEvent>,
    rx: Receiver<AssetEvent>,
}

impl Default for AssetLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl AssetLoader {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    pub fn spawn(&self, label: &str, path: &Path) -> Result<AssetHandle> {
        let handle = AssetHandle::pending(label);
        let slot = handle.clone();
        let tx = self.tx.clone();
        let path: PathBuf = path.to_path_buf();
        thread::Builder::new()
            .name(format!("rainglass-decode-{label}"))
            .spawn(move || {
                let outcome = decode(&path).map_err(|err| format!("{err:#}"));
                let event = match &outcome {
                    Ok(image) => {
                        tracing::debug!(
                            label = slot.label(),
                            width = image.width(),
                            height = image.height(),
                            "decoded image asset"
                        );
                        AssetEvent::Loaded {
                            label: slot.label().to_string(),
                        }
                    }
                    Err(reason) => AssetEvent::Failed {
                        label: slot.label().to_string(),
                        reason: reason.clone(),
                    },
                };
                slot.resolve(outcome);
                let _ = tx.send(event);
            })
            .map_err(|err| anyhow!("failed to spawn decoder thread: {err}"))?;
        Ok(handle)
    }

    /// Completions received since the last drain, without blocking.
    pub fn drain(&self) -> Vec<AssetEvent> {
        self.rx.try_iter().collect()
    }
}

fn decode(path: &Path) -> Result<RgbaImage> {
    let image = image::open(path)
        .with_context(|| format!("failed to decode image {}", path.display()))?;
    Ok(image.to_rgba8())
}
