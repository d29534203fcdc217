// This file's job is to be the Rust API for the updater.

use std::fmt::{Display, Formatter};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use log::{error, info};

use crate::archive;
use crate::console::{self, MessageKind};
use crate::install;
use crate::logging::init_logging;
use crate::network::{download_to_path, send_release_check_request};

/// Reported in the welcome banner.
const UPDATER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, PartialEq)]
pub enum UpdateStatus {
    /// The current version is already >= the remote tag. A successful
    /// outcome, not an error.
    UpToDate,
    UpdateInstalled,
    UpdateHadError,
}

impl Display for UpdateStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            UpdateStatus::UpToDate => write!(f, "Up to date"),
            UpdateStatus::UpdateInstalled => write!(f, "Update installed"),
            UpdateStatus::UpdateHadError => write!(f, "Update had error"),
        }
    }
}

#[derive(Debug, PartialEq)]
pub enum UpdateError {
    /// The install directory could not be resolved to a usable path.
    /// Raised before any network activity.
    PathResolution(String),
    /// Transport-level failure at either endpoint.
    Connection(String),
    /// Non-success status from either endpoint.
    Http(String),
    /// The metadata body was missing or unparseable.
    BadServerResponse,
}

impl std::error::Error for UpdateError {}

impl Display for UpdateError {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            UpdateError::PathResolution(msg) => write!(f, "Path resolution failed: {}", msg),
            UpdateError::Connection(msg) => write!(f, "Connection failed: {}", msg),
            UpdateError::Http(status) => write!(f, "Request failed with status: {}", status),
            UpdateError::BadServerResponse => write!(f, "Bad server response"),
        }
    }
}

/// Identity of the installed package and where one update run operates.
/// Immutable for the lifetime of a run.
#[derive(Debug, Clone)]
pub struct UpdateConfig {
    pub package_name: String,
    pub current_version: String,
    /// Root of the currently installed package, mutated in place.
    pub install_dir: PathBuf,
    /// Release metadata endpoint; expects a JSON body with `tag_name` and
    /// `tarball_url` fields.
    pub release_url: String,
    /// Where `backups/` and the transient download/extraction artifacts
    /// live.
    pub work_dir: PathBuf,
}

impl UpdateConfig {
    /// Config with the conventional layout: `backups/` and temporary files
    /// relative to the current working directory.
    pub fn new(
        package_name: impl Into<String>,
        current_version: impl Into<String>,
        install_dir: impl Into<PathBuf>,
        release_url: impl Into<String>,
    ) -> Self {
        Self {
            package_name: package_name.into(),
            current_version: current_version.into(),
            install_dir: install_dir.into(),
            release_url: release_url.into(),
            work_dir: PathBuf::from("."),
        }
    }
}

/// Whether `remote_tag` is strictly newer than `current` under plain
/// lexicographic string comparison.
///
/// Known limitation: this misorders purely numeric tags ("v9" sorts after
/// "v10"). Kept as-is to match the release sources this has always been
/// pointed at; fixing it would change which updates are offered.
fn is_newer(remote_tag: &str, current: &str) -> bool {
    remote_tag > current
}

/// Runs the update pipeline for one package. The pipeline is strictly
/// sequential; no stage begins until the previous one completes, and the
/// design assumes at most one updater process per install directory
/// (nothing enforces this).
pub struct Updater {
    config: UpdateConfig,
}

impl Updater {
    /// Validates the config and builds an updater for one run.
    ///
    /// Fails with [`UpdateError::PathResolution`] (before any network
    /// activity) when the install directory does not exist.
    pub fn new(config: UpdateConfig) -> Result<Self, UpdateError> {
        init_logging();
        if !config.install_dir.is_dir() {
            let message = format!(
                "Install directory {} not found, unable to find package path.",
                config.install_dir.display()
            );
            console::say(MessageKind::Error, &message);
            return Err(UpdateError::PathResolution(message));
        }
        Ok(Updater { config })
    }

    /// Synchronously checks the release source and returns true if a newer
    /// version is available. Network failures are logged and reported as
    /// "no update"; no side effects either way.
    pub fn check_for_update(&self) -> bool {
        match send_release_check_request(&self.config.release_url) {
            Err(err) => {
                error!("Failed update check: {err}");
                false
            }
            Ok(response) => is_newer(&response.tag_name, &self.config.current_version),
        }
    }

    /// Synchronously checks for an update and downloads and installs it if
    /// available.
    ///
    /// All fatal conditions are caught here, converted to a single
    /// user-facing console message, and returned as
    /// [`UpdateStatus::UpdateHadError`]; nothing escapes as a panic. The
    /// embedding binary decides the process exit code from the status.
    pub fn update(&self) -> UpdateStatus {
        match self.update_internal() {
            Ok(status) => status,
            Err(err) => {
                error!("Problem updating: {err}");
                let message = match err.downcast_ref::<UpdateError>() {
                    Some(UpdateError::Connection(_)) => {
                        "Failed to connect, please check the connection and try again.".to_string()
                    }
                    Some(UpdateError::Http(_)) | Some(UpdateError::BadServerResponse) => {
                        "Error in HTTP request, please check the connection and try again."
                            .to_string()
                    }
                    _ => format!("Update failed: {err}"),
                };
                console::say(MessageKind::Error, &message);
                UpdateStatus::UpdateHadError
            }
        }
    }

    // The ordered pipeline: version check, backup, fetch, unpack, install,
    // cleanup. The backup must be fully on disk before the first
    // destructive install write; cleanup only runs after a successful
    // install so a failed one leaves the temp files for inspection.
    fn update_internal(&self) -> anyhow::Result<UpdateStatus> {
        let config = &self.config;
        console::say(
            MessageKind::Info,
            &format!("Welcome to package updater (version {UPDATER_VERSION})."),
        );
        console::say(
            MessageKind::Progress,
            &format!(
                "Current version {}, looking for update at {}",
                config.current_version, config.release_url
            ),
        );

        let response = send_release_check_request(&config.release_url)?;
        let tag_name = response.tag_name;
        let tarball_url = response.tarball_url;
        if !is_newer(&tag_name, &config.current_version) {
            console::say(
                MessageKind::Success,
                &format!("{} is already up to date", config.package_name),
            );
            return Ok(UpdateStatus::UpToDate);
        }
        console::say(
            MessageKind::Success,
            &format!("New version {tag_name} is available at {tarball_url} !"),
        );

        console::say(MessageKind::Progress, "Backing up current version to tar file..");
        let backup_path = archive::backup(
            &config.install_dir,
            &config.work_dir,
            &config.package_name,
            &config.current_version,
        )?;
        console::say(
            MessageKind::Success,
            &format!(
                "{} has been backed up to {}",
                config.package_name,
                backup_path.display()
            ),
        );

        console::say(MessageKind::Progress, "Downloading new version..");
        let archive_path = config.work_dir.join(format!("{tag_name}.tar.gz"));
        download_to_path(&tarball_url, &archive_path)?;
        console::say(
            MessageKind::Success,
            &format!("Release downloaded <{tag_name}.tar.gz>"),
        );

        console::say_inline(MessageKind::Progress, "Decompressing..");
        let extracted_root = archive::unpack(&archive_path, &config.work_dir)?;
        console::finish_line(" Done.");

        console::say_inline(MessageKind::Progress, "Installing new version..");
        install::copy_tree(&extracted_root, &config.install_dir, false, None)?;
        console::finish_line(" Done.");

        console::say_inline(MessageKind::Progress, "Deleting temporary files..");
        cleanup(&archive_path, &extracted_root)?;
        console::finish_line(" Done.");

        console::say(
            MessageKind::Success,
            &format!("New version {tag_name} has been installed !"),
        );
        info!("Updated {} to {}", config.package_name, tag_name);
        Ok(UpdateStatus::UpdateInstalled)
    }
}

/// Removes the transient download and extraction artifacts. The backup
/// artifact is deliberately kept as a safety net.
fn cleanup(archive_path: &Path, extracted_root: &Path) -> anyhow::Result<()> {
    fs::remove_file(archive_path)
        .with_context(|| format!("Failed to remove {}", archive_path.display()))?;
    fs::remove_dir_all(extracted_root)
        .with_context(|| format!("Failed to remove {}", extracted_root.display()))?;
    Ok(())
}
