//! Filesystem-safe names derived from locators.

use unicode_normalization::UnicodeNormalization;

/// Name used when nothing usable survives sanitization.
pub const FALLBACK_NAME: &str = "download";

/// Derives a safe file name from a locator.
///
/// Query string and fragment are dropped, the final path segment is kept
/// and passed through [`sanitize`].
///
/// ```
/// use mediaflow::transfer::filename_from_locator;
///
/// assert_eq!(filename_from_locator("https://example.com/video.mp4?x=1"), "video.mp4");
/// ```
#[must_use]
pub fn filename_from_locator(locator: &str) -> String {
    let without_query = locator
        .split(['?', '#'])
        .next()
        .unwrap_or_default()
        .trim_end_matches('/');
    let after_scheme = without_query
        .split_once("://")
        .map_or(without_query, |(_, rest)| rest);
    // A bare host has no path segment to name the file after.
    let segment = after_scheme
        .split_once('/')
        .and_then(|(_, path)| path.rsplit('/').next())
        .unwrap_or_default();
    sanitize(segment)
}

/// Folds accents to ASCII and replaces anything outside `[A-Za-z0-9._-]`
/// with `_`.
///
/// Characters with no ASCII decomposition are dropped. Names that end up
/// empty or made only of dots become [`FALLBACK_NAME`]; a name whose stem
/// vanished keeps its extension on [`FALLBACK_NAME`].
#[must_use]
pub fn sanitize(name: &str) -> String {
    let folded: String = name
        .nfkd()
        .filter(|c| !is_combining_mark(*c))
        .filter_map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                Some(c)
            } else if c.is_ascii() {
                Some('_')
            } else {
                None
            }
        })
        .collect();

    if folded.chars().all(|c| c == '.') {
        return FALLBACK_NAME.to_string();
    }
    // Nothing survived before the extension: keep the extension.
    match folded.rsplit_once('.') {
        Some((stem, ext)) if stem.chars().all(|c| c == '.') => format!("{FALLBACK_NAME}.{ext}"),
        _ => folded,
    }
}

/// Appends `extension` when `name` has none.
#[must_use]
pub fn with_default_extension(name: &str, extension: Option<&str>) -> String {
    let has_extension = std::path::Path::new(name).extension().is_some();
    match extension.map(|ext| ext.trim_start_matches('.')) {
        Some(ext) if !has_extension && !ext.is_empty() => format!("{name}.{}", sanitize(ext)),
        _ => name.to_string(),
    }
}

/// Extensions picked when a media type registers several.
const PREFERRED_EXTENSIONS: &[&str] = &["jpg", "mp4", "mp3", "mov", "mkv", "m4a", "ogg", "wav", "webm"];

/// Maps a declared media type to a file extension.
#[must_use]
pub fn extension_for_media_type(media_type: &str) -> Option<&'static str> {
    let essence = media_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_lowercase();
    let extensions = mime_guess::get_mime_extensions_str(&essence)?;
    extensions
        .iter()
        .copied()
        .find(|ext| PREFERRED_EXTENSIONS.contains(ext))
        .or_else(|| extensions.first().copied())
}

/// Combining diacritical marks left over after NFKD decomposition.
const fn is_combining_mark(c: char) -> bool {
    matches!(c, '\u{0300}'..='\u{036f}' | '\u{1ab0}'..='\u{1aff}' | '\u{1dc0}'..='\u{1dff}' | '\u{20d0}'..='\u{20ff}' | '\u{fe20}'..='\u{fe2f}')
}
