// pgsqlbackup/src/backup/archive.rs
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::write::GzEncoder;
use tar::Builder;
use tracing::info;

use crate::errors::BackupError;

/// Bundles the listed dump files from `working_dir` into a gzipped tar at
/// `dest`. Entry names are exactly the given file names, with no directory
/// prefix, so the archive extracts flat.
///
/// Every listed file must exist: a file reported as dumped but missing on disk
/// is a consistency bug and is surfaced, never skipped. The archive is written
/// to a `.part` sibling and renamed on success, so `dest` either holds a
/// complete archive or nothing.
pub fn create_archive(
    working_dir: &Path,
    files: &[String],
    dest: &Path,
) -> Result<PathBuf, BackupError> {
    for name in files {
        let src = working_dir.join(name);
        if !src.is_file() {
            return Err(BackupError::MissingDump { file: src });
        }
    }

    let part = PathBuf::from(format!("{}.part", dest.display()));
    let written = write_archive(working_dir, files, &part)
        .and_then(|()| fs::rename(&part, dest));
    match written {
        Ok(()) => {
            info!(archive = %dest.display(), files = files.len(), "archive created");
            Ok(dest.to_path_buf())
        }
        Err(source) => {
            let _ = fs::remove_file(&part);
            Err(BackupError::Archive { path: dest.to_path_buf(), source })
        }
    }
}

fn write_archive(working_dir: &Path, files: &[String], part: &Path) -> io::Result<()> {
    let file = File::create(part)?;
    let mut builder = Builder::new(GzEncoder::new(file, Compression::default()));
    for name in files {
        builder.append_path_with_name(working_dir.join(name), name)?;
    }
    let encoder = builder.into_inner()?;
    encoder.finish()?.sync_all()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn seed_dumps(dir: &Path, names: &[&str]) -> Vec<String> {
        for name in names {
            fs::write(dir.join(name), format!("-- dump {name}\n")).unwrap();
        }
        names.iter().map(|s| s.to_string()).collect()
    }

    fn archive_entries(path: &Path) -> BTreeSet<String> {
        let file = File::open(path).unwrap();
        let mut archive = tar::Archive::new(flate2::read::GzDecoder::new(file));
        archive
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn archive_contains_exactly_the_listed_files() {
        let dir = tempfile::tempdir().unwrap();
        let files = seed_dumps(dir.path(), &["accounts.sql", "shop.sql"]);
        // An extra file in the working directory must not leak in.
        fs::write(dir.path().join("stray.sql"), "-- stray\n").unwrap();

        let dest = dir.path().join("2026-08-30.tar.gz");
        let created = create_archive(dir.path(), &files, &dest).unwrap();
        assert_eq!(created, dest);

        let entries = archive_entries(&dest);
        let expected: BTreeSet<String> =
            ["accounts.sql", "shop.sql"].iter().map(|s| s.to_string()).collect();
        assert_eq!(entries, expected);
    }

    #[test]
    fn missing_listed_file_is_surfaced_and_nothing_is_written() {
        let dir = tempfile::tempdir().unwrap();
        let mut files = seed_dumps(dir.path(), &["accounts.sql"]);
        files.push("ghost.sql".into());

        let dest = dir.path().join("2026-08-30.tar.gz");
        let err = create_archive(dir.path(), &files, &dest).unwrap_err();
        assert!(matches!(err, BackupError::MissingDump { .. }), "got {err:?}");
        assert!(!dest.exists());
        assert!(!dir.path().join("2026-08-30.tar.gz.part").exists());
    }

    #[test]
    fn unwritable_destination_leaves_no_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let files = seed_dumps(dir.path(), &["accounts.sql"]);

        let dest = dir.path().join("no-such-subdir").join("run.tar.gz");
        let err = create_archive(dir.path(), &files, &dest).unwrap_err();
        assert!(matches!(err, BackupError::Archive { .. }), "got {err:?}");
        assert!(!dest.exists());
    }

    #[test]
    fn failed_rename_removes_the_partial_archive() {
        let dir = tempfile::tempdir().unwrap();
        let files = seed_dumps(dir.path(), &["accounts.sql"]);

        // Occupy the final path with a directory so the rename itself fails
        // after the archive bytes were written successfully.
        let dest = dir.path().join("run.tar.gz");
        fs::create_dir(&dest).unwrap();

        let err = create_archive(dir.path(), &files, &dest).unwrap_err();
        assert!(matches!(err, BackupError::Archive { .. }), "got {err:?}");
        assert!(!dir.path().join("run.tar.gz.part").exists());
    }

    #[test]
    fn archived_content_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let files = seed_dumps(dir.path(), &["wiki.sql"]);
        let dest = dir.path().join("run.tar.gz");
        create_archive(dir.path(), &files, &dest).unwrap();

        let file = File::open(&dest).unwrap();
        let mut archive = tar::Archive::new(flate2::read::GzDecoder::new(file));
        let mut entry = archive.entries().unwrap().next().unwrap().unwrap();
        let mut content = String::new();
        io::Read::read_to_string(&mut entry, &mut content).unwrap();
        assert_eq!(content, "-- dump wiki.sql\n");
    }
}
