//! Where derived artifacts live on disk
//!
//! | Destination | Artifact path |
//! |-------------|---------------|
//! | original | `<source dir>/<name>.wm-<tag>.<ext>` |
//! | temporary | `<derived root>/mirror/<rel dir>/<name>.wm-<tag>.<ext>` |
//!
//! When a foreign file already holds the name, the tag is prefixed with a
//! namespace derived from the relative path: `<name>.wm-<ns>-<tag>.<ext>`.

use super::key::CacheKey;
use crate::config::Destination;
use std::path::{Component, Path, PathBuf};
use uuid::Uuid;

/// Marker separating the source name from the derivation tag
pub const DERIVED_MARKER: &str = ".wm-";

/// Suffix of in-progress writes
pub const PART_SUFFIX: &str = ".part";

#[derive(Debug, Clone)]
pub struct Layout {
    destination: Destination,
    derived_root: PathBuf,
}

impl Layout {
    pub fn new(destination: Destination, derived_root: PathBuf) -> Self {
        Self {
            destination,
            derived_root,
        }
    }

    pub fn destination(&self) -> Destination {
        self.destination
    }

    pub fn derived_root(&self) -> &Path {
        &self.derived_root
    }

    /// Mirror of the served tree used by the temporary destination
    pub fn mirror_root(&self) -> PathBuf {
        self.derived_root.join("mirror")
    }

    /// Directory of manifest records
    pub fn manifest_dir(&self) -> PathBuf {
        self.derived_root.join("manifest")
    }

    fn output_dir(&self, key: &CacheKey) -> PathBuf {
        match self.destination {
            Destination::Original => key
                .source
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(".")),
            Destination::Temporary => {
                let mut dir = self.mirror_root();
                let rel_dir = Path::new(&key.rel).parent().unwrap_or(Path::new(""));
                for component in rel_dir.components() {
                    if let Component::Normal(part) = component {
                        dir.push(part);
                    }
                }
                dir
            }
        }
    }

    fn file_name(key: &CacheKey, namespace: Option<&str>) -> String {
        let name = key
            .source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "source".to_string());
        let tag = match namespace {
            Some(ns) => format!("{ns}-{}", key.kind.tag()),
            None => key.kind.tag(),
        };
        format!("{name}{DERIVED_MARKER}{tag}.{}", key.kind.extension())
    }

    /// Preferred artifact path
    pub fn output_path(&self, key: &CacheKey) -> PathBuf {
        self.output_dir(key).join(Self::file_name(key, None))
    }

    /// Artifact path used when the preferred name is taken by a foreign file
    pub fn namespaced_path(&self, key: &CacheKey) -> PathBuf {
        let ns = key.rel_namespace();
        self.output_dir(key).join(Self::file_name(key, Some(&ns)))
    }

    /// Temporary sibling an artifact is written to before publishing
    pub fn part_path(output: &Path, generation: &Uuid) -> PathBuf {
        let mut name = output
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(format!(".{}{PART_SUFFIX}", generation.simple()));
        output.with_file_name(name)
    }

    /// Whether a file name belongs to the pipeline rather than the user
    pub fn is_derived_name(name: &str) -> bool {
        name.contains(DERIVED_MARKER)
    }

    /// Whether artifacts can end up inside `root`
    pub fn writes_under(&self, root: &Path) -> bool {
        self.destination.writes_into_source_tree() || self.derived_root.starts_with(root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::derivation::DerivationKind;
    use crate::media::SourceStamp;
    use chrono::Utc;

    fn key(kind: DerivationKind) -> CacheKey {
        CacheKey {
            source: PathBuf::from("/srv/media/2024/photo.jpg"),
            rel: "2024/photo.jpg".into(),
            stamp: SourceStamp {
                size: 1,
                modified: Utc::now(),
            },
            kind,
        }
    }

    #[test]
    fn original_destination_writes_siblings() {
        let layout = Layout::new(Destination::Original, PathBuf::from("/var/cache/wm"));
        assert_eq!(
            layout.output_path(&key(DerivationKind::ThumbnailJpeg(256))),
            PathBuf::from("/srv/media/2024/photo.jpg.wm-thumb256.jpg")
        );
    }

    #[test]
    fn temporary_destination_mirrors_the_tree() {
        let layout = Layout::new(Destination::Temporary, PathBuf::from("/var/cache/wm"));
        let path = layout.output_path(&key(DerivationKind::ThumbnailJpeg(256)));
        assert_eq!(
            path,
            PathBuf::from("/var/cache/wm/mirror/2024/photo.jpg.wm-thumb256.jpg")
        );
        assert!(!path.starts_with("/srv/media"));
    }

    #[test]
    fn namespaced_name_inserts_rel_digest() {
        let layout = Layout::new(Destination::Original, PathBuf::from("/var/cache/wm"));
        let key = key(DerivationKind::FullJpeg(2048));
        let ns = key.rel_namespace();
        assert_eq!(
            layout.namespaced_path(&key),
            PathBuf::from(format!("/srv/media/2024/photo.jpg.wm-{ns}-full2048.jpg"))
        );
    }

    #[test]
    fn part_path_is_a_sibling() {
        let output = PathBuf::from("/a/b/photo.jpg.wm-thumb256.jpg");
        let generation = Uuid::new_v4();
        let part = Layout::part_path(&output, &generation);
        assert_eq!(part.parent(), output.parent());
        assert!(part.to_string_lossy().ends_with(PART_SUFFIX));
        assert!(Layout::is_derived_name(
            &part.file_name().unwrap().to_string_lossy()
        ));
    }

    #[test]
    fn writes_under_root() {
        let root = Path::new("/srv/media");
        assert!(Layout::new(Destination::Original, "/tmp/x".into()).writes_under(root));
        assert!(!Layout::new(Destination::Temporary, "/tmp/x".into()).writes_under(root));
        assert!(Layout::new(Destination::Temporary, "/srv/media/.wm".into()).writes_under(root));
    }
}
