//! Secondary artifacts derived from downloaded videos.

use crate::models::Category;
use crate::{Error, Result};
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// Kind of secondary artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DerivationKind {
    /// Audio track as MP3.
    AudioTrack,
    /// Representative still frame as JPEG.
    StillFrame,
}

impl DerivationKind {
    /// Every kind, in derivation order.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::AudioTrack, Self::StillFrame]
    }

    /// Output file extension.
    #[must_use]
    pub const fn extension(&self) -> &'static str {
        match self {
            Self::AudioTrack => "mp3",
            Self::StillFrame => "jpg",
        }
    }

    /// Bucket the artifact is placed in.
    #[must_use]
    pub const fn category(&self) -> Category {
        match self {
            Self::AudioTrack => Category::Audio,
            Self::StillFrame => Category::Photo,
        }
    }
}

/// Produces secondary artifacts from a primary media file.
#[async_trait]
pub trait MediaDeriver: Send + Sync {
    /// Writes the derived artifact of `kind` from `source` into `dest`.
    ///
    /// # Errors
    ///
    /// Returns an error if the artifact cannot be produced.
    async fn derive(&self, source: &Path, kind: DerivationKind, dest: &Path) -> Result<()>;
}

/// Deriver backed by the `ffmpeg` executable.
#[derive(Debug, Clone)]
pub struct FfmpegDeriver {
    binary: PathBuf,
}

impl Default for FfmpegDeriver {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl FfmpegDeriver {
    /// Creates a deriver using the given executable.
    #[must_use]
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn arguments(source: &Path, kind: DerivationKind, dest: &Path) -> Vec<OsString> {
        let flags: &[&str] = match kind {
            DerivationKind::AudioTrack => &["-vn", "-acodec", "libmp3lame", "-q:a", "2"],
            DerivationKind::StillFrame => &["-frames:v", "1", "-q:v", "2"],
        };
        let mut args: Vec<OsString> = ["-y", "-loglevel", "error"].map(OsString::from).to_vec();
        if kind == DerivationKind::StillFrame {
            args.extend(["-ss", "1"].map(OsString::from));
        }
        args.push(OsString::from("-i"));
        args.push(source.as_os_str().to_owned());
        args.extend(flags.iter().map(OsString::from));
        args.push(dest.as_os_str().to_owned());
        args
    }
}

#[async_trait]
impl MediaDeriver for FfmpegDeriver {
    async fn derive(&self, source: &Path, kind: DerivationKind, dest: &Path) -> Result<()> {
        let output = Command::new(&self.binary)
            .args(Self::arguments(source, kind, dest))
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| Error::operation("ffmpeg_spawn", e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::operation(
                "ffmpeg_derive",
                format!("{kind:?} exited with {}: {}", output.status, stderr.trim()),
            ));
        }
        debug!(dest = %dest.display(), ?kind, "Derived artifact written");
        Ok(())
    }
}
