use std::fs;
use std::path::Path;

/// Decides whether a previously materialized artifact can be reused.
///
/// The production implementation only checks presence (and non-emptiness for
/// directories); it never inspects content or freshness. The trait exists so
/// tests can simulate prior runs, including partial ones, without a real
/// filesystem.
pub trait ArtifactGate {
    fn file_is_materialized(&self, path: &Path) -> bool;
    fn dir_is_materialized(&self, path: &Path) -> bool;

    /// Reuse is allowed when the artifact is present and the caller is not
    /// forcing reprocessing.
    fn reuse_file(&self, path: &Path, force: bool) -> bool {
        !force && self.file_is_materialized(path)
    }

    fn reuse_dir(&self, path: &Path, force: bool) -> bool {
        !force && self.dir_is_materialized(path)
    }
}

/// Presence checks against the real filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsGate;

impl ArtifactGate for FsGate {
    fn file_is_materialized(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn dir_is_materialized(&self, path: &Path) -> bool {
        match fs::read_dir(path) {
            Ok(mut entries) => entries.next().is_some(),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;

    #[test]
    fn missing_file_is_not_reusable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.geojson");
        assert!(!FsGate.reuse_file(&path, false));
    }

    #[test]
    fn existing_file_is_reusable_unless_forced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.geojson");
        File::create(&path).unwrap();
        assert!(FsGate.reuse_file(&path, false));
        assert!(!FsGate.reuse_file(&path, true));
    }

    #[test]
    fn empty_dir_is_not_reusable() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("tiles");
        std::fs::create_dir(&out).unwrap();
        assert!(!FsGate.reuse_dir(&out, false));

        File::create(out.join("0.pbf")).unwrap();
        assert!(FsGate.reuse_dir(&out, false));
        assert!(!FsGate.reuse_dir(&out, true));
    }
}
