use std::path::{Path, PathBuf};

pub const DEFAULT_TARGET_DIR: &str = "logos";
pub const IMAGES_SUBDIR: &str = "images";
pub const MANIFEST_FILE: &str = "logos.json";

/// On-disk layout under the target directory.
#[derive(Clone, Debug)]
pub struct TargetLayout {
    root: PathBuf,
}

impl TargetLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn images_dir(&self) -> PathBuf {
        self.root.join(IMAGES_SUBDIR)
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.root.join(MANIFEST_FILE)
    }

    pub fn image_path(&self, slug: &str, extension: &str) -> PathBuf {
        self.images_dir().join(format!("{slug}.{extension}"))
    }

    /// Sibling of the canonical image path that embeds a content tag,
    /// e.g. `images/audi.1a2b3c4d.png`.
    pub fn versioned_image_path(&self, slug: &str, tag: &str, extension: &str) -> PathBuf {
        self.images_dir().join(format!("{slug}.{tag}.{extension}"))
    }
}
