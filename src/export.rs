//! Copy the filtered rated images into a folder.

use crate::collection::{ImageId, Rating};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Filesystem collaborator used by export.
pub trait FileCopier {
    /// Copy `src` into `dst_dir`, returning the number of bytes written.
    fn copy_file(&self, src: &Path, dst_dir: &Path) -> io::Result<u64>;
}

impl<F> FileCopier for F
where
    F: Fn(&Path, &Path) -> io::Result<u64>,
{
    fn copy_file(&self, src: &Path, dst_dir: &Path) -> io::Result<u64> {
        self(src, dst_dir)
    }
}

/// Copies to `dst_dir/<file name>`, replacing a file of the same name.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsCopier;

impl FileCopier for FsCopier {
    fn copy_file(&self, src: &Path, dst_dir: &Path) -> io::Result<u64> {
        let name = src.file_name().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} has no file name", src.display()),
            )
        })?;
        fs::copy(src, dst_dir.join(name))
    }
}

#[derive(Debug)]
pub struct ExportFailure {
    pub path: PathBuf,
    pub error: io::Error,
}

/// Result of one export batch. Never aborted early: every entry is tried.
#[derive(Debug, Default)]
pub struct ExportReport {
    pub copied: usize,
    pub bytes: u64,
    pub failures: Vec<ExportFailure>,
}

impl ExportReport {
    pub fn failure_count(&self) -> usize {
        self.failures.len()
    }

    pub fn attempted(&self) -> usize {
        self.copied + self.failures.len()
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Copy every entry into `dst_dir` with `copier`, tallying failures.
pub fn export_entries(
    entries: &[(ImageId, Rating)],
    dst_dir: &Path,
    copier: &dyn FileCopier,
) -> ExportReport {
    let mut report = ExportReport::default();

    for (id, _) in entries {
        match copier.copy_file(id.path(), dst_dir) {
            Ok(bytes) => {
                report.copied += 1;
                report.bytes += bytes;
            }
            Err(error) => {
                warn!("export: failed to copy {}: {}", id, error);
                report.failures.push(ExportFailure {
                    path: id.path().to_path_buf(),
                    error,
                });
            }
        }
    }

    info!(
        "export to {}: {} copied, {} failed",
        dst_dir.display(),
        report.copied,
        report.failure_count()
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::CollectionStore;
    use crate::filter::{visible, FilterPredicate};
    use std::cell::RefCell;

    fn r(n: u8) -> Rating {
        Rating::new(n).unwrap()
    }

    #[test]
    fn test_export_min_rating_copies_exactly_matching_files() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();

        let mut store = CollectionStore::new();
        let mut ids = Vec::new();
        for name in ["a.jpg", "b.jpg", "c.jpg"] {
            let path = src.path().join(name);
            fs::write(&path, name.as_bytes()).unwrap();
            ids.push(ImageId::canonical(&path).unwrap());
        }
        store.replace_all(ids.clone());
        store.rate(&ids[0], r(5)).unwrap();
        store.rate(&ids[1], r(3)).unwrap();
        store.rate(&ids[2], r(4)).unwrap();

        let entries = visible(&store, FilterPredicate::MinRating(r(4)));
        let report = export_entries(&entries, dst.path(), &FsCopier);

        assert_eq!(report.copied, 2);
        assert_eq!(report.failure_count(), 0);

        let mut exported: Vec<String> = fs::read_dir(dst.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        exported.sort();
        assert_eq!(exported, ["a.jpg", "c.jpg"]);
        assert_eq!(fs::read(dst.path().join("c.jpg")).unwrap(), b"c.jpg");
    }

    #[test]
    fn test_export_overwrites_same_name() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        let path = src.path().join("x.png");
        fs::write(&path, b"new").unwrap();
        fs::write(dst.path().join("x.png"), b"old contents").unwrap();

        let entries = vec![(ImageId::new(&path), r(5))];
        let report = export_entries(&entries, dst.path(), &FsCopier);

        assert!(report.is_complete());
        assert_eq!(fs::read(dst.path().join("x.png")).unwrap(), b"new");
    }

    #[test]
    fn test_failures_are_tallied_and_batch_continues() {
        let attempted = RefCell::new(Vec::new());
        let copier = |src: &Path, _: &Path| -> io::Result<u64> {
            attempted.borrow_mut().push(src.to_path_buf());
            if src.ends_with("locked.jpg") {
                Err(io::Error::new(io::ErrorKind::PermissionDenied, "locked"))
            } else {
                Ok(10)
            }
        };

        let entries = vec![
            (ImageId::new("/p/a.jpg"), r(5)),
            (ImageId::new("/p/locked.jpg"), r(5)),
            (ImageId::new("/p/z.jpg"), r(4)),
        ];
        let report = export_entries(&entries, Path::new("/out"), &copier);

        assert_eq!(attempted.borrow().len(), 3, "a failure must not abort the batch");
        assert_eq!(report.copied, 2);
        assert_eq!(report.bytes, 20);
        assert_eq!(report.failure_count(), 1);
        assert_eq!(report.failures[0].path, PathBuf::from("/p/locked.jpg"));
        assert_eq!(report.attempted(), 3);
    }

    #[test]
    fn test_missing_destination_fails_every_file() {
        let src = tempfile::tempdir().unwrap();
        let path = src.path().join("a.jpg");
        fs::write(&path, b"a").unwrap();

        let entries = vec![(ImageId::new(&path), r(3))];
        let report = export_entries(&entries, &src.path().join("does/not/exist"), &FsCopier);

        assert_eq!(report.copied, 0);
        assert_eq!(report.failure_count(), 1);
    }
}
