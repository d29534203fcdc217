// This file's job is the install step: merging an extracted release tree
// over the existing install directory, in place.

use std::ffi::OsString;
use std::fs;
use std::path::Path;

use anyhow::Context;

/// Exclusion predicate for [`copy_tree`]: given a source directory and the
/// entry names inside it, returns the names to skip at that level. Applied
/// at every recursion level, not just the top.
pub type IgnoreFn<'a> = &'a dyn Fn(&Path, &[OsString]) -> Vec<OsString>;

/// Recursively merges `src` into `dst`.
///
/// Directories missing from the destination are created (with the source
/// directory's permissions) and recursed into. Regular files are copied
/// over the destination, overwriting any existing file at the same
/// relative path; the copy carries permissions but not modification times.
/// When `preserve_symlinks` is set, symlinks in `src` are recreated at the
/// destination, replacing whatever entry was there.
///
/// The merge only overwrites and adds. Entries present in `dst` but absent
/// from `src` are never deleted, so files dropped from a release survive
/// locally.
///
/// There is no transactional guarantee: an interrupted merge leaves `dst`
/// in a mixed old/new state, recoverable only from a prior backup.
pub fn copy_tree(
    src: &Path,
    dst: &Path,
    preserve_symlinks: bool,
    ignore: Option<IgnoreFn>,
) -> anyhow::Result<()> {
    if !dst.exists() {
        fs::create_dir_all(dst).with_context(|| format!("Failed to create dir {:?}", dst))?;
        let perms = fs::metadata(src)
            .with_context(|| format!("Failed to stat {:?}", src))?
            .permissions();
        fs::set_permissions(dst, perms)
            .with_context(|| format!("Failed to set permissions on {:?}", dst))?;
    }

    let mut names: Vec<OsString> = Vec::new();
    for entry in fs::read_dir(src).with_context(|| format!("Failed to read dir {:?}", src))? {
        names.push(entry?.file_name());
    }
    if let Some(ignore) = ignore {
        let excluded = ignore(src, &names);
        names.retain(|name| !excluded.contains(name));
    }

    for name in names {
        let s = src.join(&name);
        let d = dst.join(&name);
        if preserve_symlinks && s.symlink_metadata()?.file_type().is_symlink() {
            replace_symlink(&s, &d)?;
        } else if s.is_dir() {
            copy_tree(&s, &d, preserve_symlinks, ignore)?;
        } else {
            fs::copy(&s, &d)
                .with_context(|| format!("Failed to copy {:?} to {:?}", s, d))?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn replace_symlink(src: &Path, dst: &Path) -> anyhow::Result<()> {
    let target = fs::read_link(src)?;
    if dst.symlink_metadata().is_ok() {
        fs::remove_file(dst).with_context(|| format!("Failed to remove {:?}", dst))?;
    }
    std::os::unix::fs::symlink(&target, dst)
        .with_context(|| format!("Failed to link {:?} -> {:?}", dst, target))?;
    Ok(())
}

#[cfg(not(unix))]
fn replace_symlink(src: &Path, _dst: &Path) -> anyhow::Result<()> {
    log::warn!("Symlink {:?} not recreated on this platform", src);
    Ok(())
}
