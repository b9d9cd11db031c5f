//! Built-in analysis capabilities.
//!
//! `metadata` is computed natively. `qr`, `ocr`, `objects` and `safety`
//! shell out to external tools whose standard output becomes the payload.

use super::task::AnalysisCapability;
use crate::models::{Category, OwnerId};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use exif::{Exif, In, Tag, Value};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::process::{Command, Stdio};

/// Leading bytes read for format detection.
const HEADER_LEN: u64 = 8192;

/// Size, extension, modification time and detected format of a file, plus
/// camera and GPS details for images carrying EXIF data.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetadataCapability;

impl MetadataCapability {
    /// Identifies a media type from the leading bytes of a file.
    #[must_use]
    pub fn sniff(header: &[u8]) -> Option<&'static str> {
        infer::get(header).map(|kind| kind.mime_type())
    }

    /// Camera and location details from an image's EXIF block.
    ///
    /// Files without readable EXIF data yield nothing.
    #[must_use]
    pub fn exif_details(artifact: &Path) -> Vec<String> {
        let Ok(file) = File::open(artifact) else {
            return Vec::new();
        };
        let Ok(exif) = exif::Reader::new().read_from_container(&mut BufReader::new(file)) else {
            return Vec::new();
        };

        let mut details = Vec::new();
        let camera: Vec<String> = [Tag::Make, Tag::Model]
            .into_iter()
            .filter_map(|tag| ascii_field(&exif, tag))
            .collect();
        if !camera.is_empty() {
            details.push(format!("camera {}", camera.join(" ")));
        }
        if let Some(taken) = ascii_field(&exif, Tag::DateTimeOriginal) {
            details.push(format!("taken {taken}"));
        }
        if let (Some(lat), Some(lon)) = (
            coordinate(&exif, Tag::GPSLatitude, Tag::GPSLatitudeRef),
            coordinate(&exif, Tag::GPSLongitude, Tag::GPSLongitudeRef),
        ) {
            details.push(format!("GPS {lat:.5}, {lon:.5}"));
        }
        details
    }
}

impl AnalysisCapability for MetadataCapability {
    fn analyze(&self, artifact: &Path, _owner: OwnerId) -> Result<String> {
        let metadata =
            std::fs::metadata(artifact).map_err(|e| Error::operation("read_metadata", e))?;
        let mut header = Vec::new();
        File::open(artifact)
            .and_then(|file| file.take(HEADER_LEN).read_to_end(&mut header))
            .map_err(|e| Error::operation("read_header", e))?;

        let media_type = Self::sniff(&header);
        let extension = artifact
            .extension()
            .and_then(|e| e.to_str())
            .map_or_else(|| "none".to_string(), str::to_lowercase);
        let category = Category::from_extension(&extension);

        let mut parts = vec![
            media_type.unwrap_or("unknown format").to_string(),
            human_size(metadata.len()),
            format!(".{extension} ({category})"),
        ];
        if let Ok(modified) = metadata.modified() {
            let modified: DateTime<Utc> = modified.into();
            parts.push(format!("modified {}", modified.format("%Y-%m-%d %H:%M UTC")));
        }
        if media_type.is_some_and(|t| t.starts_with("image/")) {
            parts.extend(Self::exif_details(artifact));
        }
        Ok(parts.join(", "))
    }
}

/// First string of an ASCII field, trimmed.
fn ascii_field(exif: &Exif, tag: Tag) -> Option<String> {
    let field = exif.get_field(tag, In::PRIMARY)?;
    match &field.value {
        Value::Ascii(values) => values
            .first()
            .map(|bytes| String::from_utf8_lossy(bytes).trim().to_string())
            .filter(|text| !text.is_empty()),
        _ => None,
    }
}

/// Signed decimal degrees from a degrees/minutes/seconds field and its
/// hemisphere reference.
fn coordinate(exif: &Exif, tag: Tag, reference: Tag) -> Option<f64> {
    let Value::Rational(parts) = &exif.get_field(tag, In::PRIMARY)?.value else {
        return None;
    };
    let [degrees, minutes, seconds] = parts.as_slice() else {
        return None;
    };
    let value = degrees.to_f64() + minutes.to_f64() / 60.0 + seconds.to_f64() / 3600.0;
    match ascii_field(exif, reference).as_deref() {
        Some("S" | "W") => Some(-value),
        _ => Some(value),
    }
}

/// How a successful command result is judged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WarningRule {
    Never,
    /// Any label other than a known safe one is a warning.
    UnlessSafe,
}

/// Capability backed by an external command.
///
/// `{path}` in the argument list is replaced with the artifact path.
#[derive(Debug, Clone)]
pub struct CommandCapability {
    program: String,
    args: Vec<String>,
    empty_exit_codes: Vec<i32>,
    warning: WarningRule,
}

impl CommandCapability {
    /// Creates a capability running `program` with `args`.
    #[must_use]
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            empty_exit_codes: Vec::new(),
            warning: WarningRule::Never,
        }
    }

    /// Parses a whitespace-separated command line. A missing `{path}` is
    /// appended as the last argument.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for an empty command line.
    pub fn from_command_line(line: &str) -> Result<Self> {
        let mut words = line.split_whitespace().map(str::to_string);
        let program = words
            .next()
            .ok_or_else(|| Error::InvalidInput("empty analysis command".to_string()))?;
        let mut args: Vec<String> = words.collect();
        if !args.iter().any(|a| a.contains("{path}")) {
            args.push("{path}".to_string());
        }
        Ok(Self::new(program, args))
    }

    /// QR/barcode decoding through `zbarimg`.
    #[must_use]
    pub fn qr() -> Self {
        let mut capability = Self::new(
            "zbarimg",
            vec!["--quiet".into(), "--raw".into(), "{path}".into()],
        );
        // zbarimg exits 4 when no symbol was found.
        capability.empty_exit_codes = vec![4];
        capability
    }

    /// Text recognition through `tesseract`.
    #[must_use]
    pub fn ocr() -> Self {
        Self::new("tesseract", vec!["{path}".into(), "stdout".into()])
    }

    /// Object detection through a configured command that prints the
    /// labels it found.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for an empty command line.
    pub fn objects(command_line: &str) -> Result<Self> {
        Self::from_command_line(command_line)
    }

    /// Safety classification through a configured command whose output is
    /// a label such as `safe` or `nsfw`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for an empty command line.
    pub fn safety(command_line: &str) -> Result<Self> {
        let mut capability = Self::from_command_line(command_line)?;
        capability.warning = WarningRule::UnlessSafe;
        Ok(capability)
    }

    fn arguments(&self, artifact: &Path) -> Vec<String> {
        let path = artifact.to_string_lossy();
        self.args
            .iter()
            .map(|arg| arg.replace("{path}", &path))
            .collect()
    }
}

impl AnalysisCapability for CommandCapability {
    fn analyze(&self, artifact: &Path, _owner: OwnerId) -> Result<String> {
        let output = Command::new(&self.program)
            .args(self.arguments(artifact))
            .stdin(Stdio::null())
            .output()
            .map_err(|e| Error::operation("spawn_analysis_command", format!("{}: {e}", self.program)))?;

        let code = output.status.code();
        if code.is_some_and(|c| self.empty_exit_codes.contains(&c)) {
            return Ok(String::new());
        }
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::operation(
                "analysis_command",
                format!("{} exited with {}: {}", self.program, output.status, stderr.trim()),
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn is_warning(&self, payload: &str) -> bool {
        match self.warning {
            WarningRule::Never => false,
            WarningRule::UnlessSafe => {
                let label = payload.trim().to_lowercase();
                !label.is_empty() && !matches!(label.as_str(), "safe" | "clean" | "ok" | "sfw")
            },
        }
    }
}

#[allow(clippy::cast_precision_loss)]
fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}
