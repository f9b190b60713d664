use reqwest::Url;

const FALLBACK_EXTENSION: &str = "img";

/// Lower-case, filesystem-safe stem for a manufacturer name.
///
/// Non-ASCII text is transliterated first; every other run of
/// non-alphanumeric characters becomes a single `-`.
#[must_use]
pub fn slugify(name: &str) -> String {
    slug::slugify(name)
}

/// Extension of the last path segment of `url`, without the dot.
#[must_use]
pub fn file_extension(url: &Url) -> String {
    url.path_segments()
        .and_then(|segments| segments.last())
        .and_then(|file| file.rsplit_once('.'))
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or_else(|| FALLBACK_EXTENSION.to_owned())
}

/// Render names for a single diagnostic log line.
#[must_use]
pub fn format_names<S: AsRef<str>>(names: &[S]) -> String {
    names
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(", ")
}
