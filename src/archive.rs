// This file's job is to create backup archives and extract release
// archives. Both sides use the same tarball-style format (tar.gz).

use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

use anyhow::Context;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use log::debug;
use tar::{Archive, Builder};

/// Directory under the work dir where backup artifacts accumulate. Backups
/// are never pruned automatically; they are the only recovery mechanism
/// for a failed install.
pub const BACKUP_DIR: &str = "backups";

/// The deterministic backup archive name for a package, version and date.
pub fn backup_file_name(package_name: &str, version: &str, date: &str) -> String {
    format!("{package_name}-{version}-{date}.tar.gz")
}

/// Archives the entire install directory (with its own basename as the
/// top-level entry) into `<work_dir>/backups/`, stamped with today's date.
///
/// The archive is fully written and synced before this returns, so no
/// destructive install step can begin against a partial backup.
pub fn backup(
    install_dir: &Path,
    work_dir: &Path,
    package_name: &str,
    current_version: &str,
) -> anyhow::Result<PathBuf> {
    let backup_dir = work_dir.join(BACKUP_DIR);
    fs::create_dir_all(&backup_dir)
        .with_context(|| format!("Failed to create dir {:?}", backup_dir))?;

    let name = backup_file_name(package_name, current_version, &crate::time::today_string());
    let backup_path = backup_dir.join(name);

    let top_level = install_dir
        .file_name()
        .with_context(|| format!("Install dir {:?} has no basename", install_dir))?;

    debug!("Writing backup to {:?}", backup_path);
    let file = File::create(&backup_path)
        .with_context(|| format!("File::create for {}", backup_path.display()))?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = Builder::new(encoder);
    builder.follow_symlinks(false);
    builder
        .append_dir_all(top_level, install_dir)
        .with_context(|| format!("Failed to archive {:?}", install_dir))?;

    // Finish the tar trailer and the gzip stream, then sync, so the backup
    // is complete on disk before the caller moves on.
    let encoder = builder
        .into_inner()
        .context("Failed to finish backup archive")?;
    let file = encoder
        .finish()
        .context("Failed to finish backup compression")?;
    file.sync_all()
        .with_context(|| format!("Failed to sync {}", backup_path.display()))?;
    Ok(backup_path)
}

/// Extracts a downloaded release archive into `work_dir` and returns the
/// root of the extracted tree.
///
/// The root is the archive's first top-level entry name: release tarballs
/// wrap all files in a single directory, by upstream convention.
pub fn unpack(archive_path: &Path, work_dir: &Path) -> anyhow::Result<PathBuf> {
    debug!("Extracting {:?} into {:?}", archive_path, work_dir);
    let file = File::open(archive_path)
        .with_context(|| format!("Failed to open archive {}", archive_path.display()))?;
    let mut archive = Archive::new(GzDecoder::new(BufReader::new(file)));
    archive.set_preserve_permissions(true);

    let mut root: Option<PathBuf> = None;
    for entry in archive.entries()? {
        let mut entry = entry?;
        if root.is_none() {
            let path = entry.path()?;
            let first = path
                .components()
                .next()
                .context("Archive entry with an empty path")?;
            root = Some(PathBuf::from(first.as_os_str()));
        }
        // unpack_in refuses paths that would escape work_dir.
        entry
            .unpack_in(work_dir)
            .with_context(|| format!("Failed to extract into {:?}", work_dir))?;
    }
    let root = root.context("Archive has no entries")?;
    Ok(work_dir.join(root))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempdir::TempDir;

    use super::{backup, backup_file_name, unpack, BACKUP_DIR};

    fn write_tree(root: &std::path::Path) {
        fs::create_dir_all(root.join("sub/inner")).unwrap();
        fs::write(root.join("top.txt"), "top contents").unwrap();
        fs::write(root.join("sub/nested.txt"), "nested contents").unwrap();
        fs::write(root.join("sub/inner/deep.bin"), [0u8, 1, 2, 255]).unwrap();
    }

    #[test]
    fn backup_name_is_deterministic() {
        assert_eq!(
            backup_file_name("mypkg", "1.0.0", "2024-02-29"),
            "mypkg-1.0.0-2024-02-29.tar.gz"
        );
    }

    #[test]
    fn backup_lands_in_backups_dir_with_dated_name() {
        let tmp_dir = TempDir::new("backup").unwrap();
        let install_dir = tmp_dir.path().join("install");
        write_tree(&install_dir);

        let path = backup(&install_dir, tmp_dir.path(), "mypkg", "1.0.0").unwrap();
        assert_eq!(path.parent().unwrap(), tmp_dir.path().join(BACKUP_DIR));
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("mypkg-1.0.0-"));
        assert!(name.ends_with(".tar.gz"));
        assert!(path.metadata().unwrap().len() > 0);
    }

    #[test]
    fn backup_then_unpack_reproduces_tree_exactly() {
        let tmp_dir = TempDir::new("roundtrip").unwrap();
        let install_dir = tmp_dir.path().join("install");
        write_tree(&install_dir);

        let backup_path = backup(&install_dir, tmp_dir.path(), "mypkg", "1.0.0").unwrap();

        let out_dir = TempDir::new("restored").unwrap();
        let root = unpack(&backup_path, out_dir.path()).unwrap();
        // The install dir's own basename is the top-level entry.
        assert_eq!(root, out_dir.path().join("install"));

        assert_eq!(fs::read(root.join("top.txt")).unwrap(), b"top contents");
        assert_eq!(
            fs::read(root.join("sub/nested.txt")).unwrap(),
            b"nested contents"
        );
        assert_eq!(
            fs::read(root.join("sub/inner/deep.bin")).unwrap(),
            [0u8, 1, 2, 255]
        );
    }

    #[test]
    fn unpack_roots_tree_at_first_top_level_entry() {
        let tmp_dir = TempDir::new("unpack").unwrap();
        let staging = tmp_dir.path().join("myrelease-1.2.3");
        fs::create_dir_all(staging.join("src")).unwrap();
        fs::write(staging.join("README"), "hello").unwrap();
        fs::write(staging.join("src/lib.rs"), "// nothing").unwrap();

        // Build a release-shaped tarball: one wrapping directory.
        let tarball = tmp_dir.path().join("myrelease-1.2.3.tar.gz");
        let file = fs::File::create(&tarball).unwrap();
        let encoder =
            flate2::write::GzEncoder::new(file, flate2::Compression::default());
        let mut builder = tar::Builder::new(encoder);
        builder.append_dir_all("myrelease-1.2.3", &staging).unwrap();
        builder.into_inner().unwrap().finish().unwrap();

        let out_dir = TempDir::new("extracted").unwrap();
        let root = unpack(&tarball, out_dir.path()).unwrap();
        assert_eq!(root, out_dir.path().join("myrelease-1.2.3"));
        assert_eq!(fs::read(root.join("README")).unwrap(), b"hello");
        assert_eq!(fs::read(root.join("src/lib.rs")).unwrap(), b"// nothing");
    }

    #[test]
    fn unpack_errs_on_missing_archive() {
        let tmp_dir = TempDir::new("unpack").unwrap();
        assert!(unpack(&tmp_dir.path().join("nope.tar.gz"), tmp_dir.path()).is_err());
    }
}
