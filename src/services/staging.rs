//! Staged run artifacts on the night-batch share.
//!
//! Layout:
//! - `{staging_root}/{host}/{pdc}/{run_id}/{output_folder}/` holds the result documents
//! - `{staging_root}/{host}/{pdc}/{run_id}/*.zip` may hold bundled documents
//! - `{archive_root}/{host}/{pdc}/{run_id}.zip` receives the run once ingested

use std::fs::File;
use std::io;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::config::StagingSettings;
use crate::error::{AppError, AppResult};
use crate::models::{RawRunData, RunKey};

use super::ensure_active;

/// Access to staged run artifacts.
#[async_trait]
pub trait RunStaging: Send + Sync {
    /// Whether the share holds anything that can be ingested for `key`.
    async fn exists(&self, key: &RunKey, cancel: &CancellationToken) -> AppResult<bool>;

    /// Extract bundles and read the run's documents.
    async fn load_raw(&self, key: &RunKey, cancel: &CancellationToken) -> AppResult<RawRunData>;

    /// Compress the run directory into the archive root, then remove it.
    /// Returns the archive file path.
    async fn archive(&self, key: &RunKey, cancel: &CancellationToken) -> AppResult<PathBuf>;
}

/// [`RunStaging`] over the local (or mounted) filesystem.
#[derive(Debug, Clone)]
pub struct StagingFileSystem {
    settings: StagingSettings,
}

impl StagingFileSystem {
    pub fn new(settings: StagingSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &StagingSettings {
        &self.settings
    }

    /// `{staging_root}/{host}/{pdc}/{run_id}`
    pub fn run_dir(&self, key: &RunKey) -> AppResult<PathBuf> {
        Ok(self
            .settings
            .staging_root
            .join(path_segment(&key.host)?)
            .join(path_segment(&key.pdc)?)
            .join(path_segment(&key.run_id)?))
    }

    /// `{run_dir}/{output_folder}`
    pub fn output_dir(&self, key: &RunKey) -> AppResult<PathBuf> {
        Ok(self.run_dir(key)?.join(&self.settings.output_folder))
    }

    /// `{archive_root}/{host}/{pdc}/{run_id}.zip`
    pub fn archive_path(&self, key: &RunKey) -> AppResult<PathBuf> {
        Ok(self
            .settings
            .archive_root
            .join(path_segment(&key.host)?)
            .join(path_segment(&key.pdc)?)
            .join(format!("{}.zip", path_segment(&key.run_id)?)))
    }
}

#[async_trait]
impl RunStaging for StagingFileSystem {
    async fn exists(&self, key: &RunKey, cancel: &CancellationToken) -> AppResult<bool> {
        ensure_active(cancel)?;

        let run_dir = self.run_dir(key)?;
        let output_dir = self.output_dir(key)?;

        let has_result = is_file(&output_dir.join(&self.settings.result_file)).await;
        let has_any_xml = !files_with_extension(&output_dir, "xml").await?.is_empty();
        let has_zip = !files_with_extension(&run_dir, "zip").await?.is_empty();

        debug!(
            output_dir = %output_dir.display(),
            has_result,
            has_any_xml,
            has_zip,
            "Staging existence check"
        );

        Ok(has_result || has_any_xml || has_zip)
    }

    async fn load_raw(&self, key: &RunKey, cancel: &CancellationToken) -> AppResult<RawRunData> {
        let run_dir = self.run_dir(key)?;
        let output_dir = self.output_dir(key)?;

        for bundle in files_with_extension(&run_dir, "zip").await? {
            ensure_active(cancel)?;
            info!(bundle = %bundle.display(), "Extracting bundle into run directory");

            let target = run_dir.clone();
            let source = bundle.clone();
            tokio::task::spawn_blocking(move || extract_bundle(&source, &target)).await??;
        }

        ensure_active(cancel)?;

        let canonical = output_dir.join(&self.settings.result_file);
        let result_path = if is_file(&canonical).await {
            canonical
        } else {
            let fallback = files_with_extension(&output_dir, "xml")
                .await?
                .into_iter()
                .next()
                .ok_or_else(|| {
                    AppError::FileSystem(format!(
                        "No XML files found in {}. Expected '{}'.",
                        output_dir.display(),
                        self.settings.result_file
                    ))
                })?;
            info!(path = %fallback.display(), "Result document not found, falling back");
            fallback
        };

        info!(path = %result_path.display(), "Loading result document");
        let test_result_xml = read_document(&result_path).await?;

        let system_info_xml =
            read_optional(&output_dir.join(&self.settings.system_info_file)).await;
        let fingerprint_xml =
            read_optional(&output_dir.join(&self.settings.fingerprint_file)).await;

        let specflow_name = &self.settings.specflow_log_file;
        let specflow_log = match read_optional(&output_dir.join(specflow_name)).await {
            Some(log) => Some(log),
            None => read_optional(&run_dir.join(specflow_name)).await,
        };

        Ok(RawRunData {
            test_result_xml,
            system_info_xml,
            fingerprint_xml,
            specflow_log,
        })
    }

    async fn archive(&self, key: &RunKey, cancel: &CancellationToken) -> AppResult<PathBuf> {
        ensure_active(cancel)?;

        let source = self.run_dir(key)?;
        let target = self.archive_path(key)?;

        if !tokio::fs::metadata(&source)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
        {
            return Err(AppError::Archive(format!(
                "Run directory {} does not exist",
                source.display()
            )));
        }

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                AppError::Archive(format!("Failed to create archive directory: {}", e))
            })?;
        }

        if is_file(&target).await {
            debug!(archive = %target.display(), "Archive exists, overwriting");
            tokio::fs::remove_file(&target).await.map_err(|e| {
                AppError::Archive(format!("Failed to remove previous archive: {}", e))
            })?;
        }

        info!(source = %source.display(), archive = %target.display(), "Archiving run directory");

        let (src, dst) = (source.clone(), target.clone());
        tokio::task::spawn_blocking(move || compress_directory(&src, &dst))
            .await
            .map_err(|e| AppError::Archive(format!("Archive task failed: {}", e)))?
            .map_err(|e| AppError::Archive(e.to_string()))?;

        // Source is removed only once the archive is complete
        tokio::fs::remove_dir_all(&source).await.map_err(|e| {
            AppError::Archive(format!("Failed to remove run directory: {}", e))
        })?;

        info!(source = %source.display(), "Run directory removed after archive");
        Ok(target)
    }
}

/// Reject key parts that would escape their directory level.
fn path_segment(value: &str) -> AppResult<&str> {
    let mut components = Path::new(value).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(value),
        _ => Err(AppError::InvalidInput(format!(
            "'{}' is not a valid path segment",
            value
        ))),
    }
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}

/// Files directly under `dir` with the given extension, sorted by name.
/// A missing directory yields an empty list.
async fn files_with_extension(dir: &Path, extension: &str) -> AppResult<Vec<PathBuf>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let matches = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(extension));

        if matches && entry.file_type().await?.is_file() {
            files.push(path);
        }
    }

    files.sort();
    Ok(files)
}

/// Read the primary document. Bytes that decode neither as UTF-8 nor as
/// BOM-marked UTF-16 make the document unparseable.
async fn read_document(path: &Path) -> AppResult<String> {
    let bytes = tokio::fs::read(path).await.map_err(|e| {
        AppError::FileSystem(format!("Failed to read {}: {}", path.display(), e))
    })?;

    decode_document(&bytes).map_err(|e| {
        AppError::Parse(format!("Failed to decode {}: {}", path.display(), e))
    })
}

/// Read a companion document. Companions never fail the run: read errors drop
/// the document and undecodable bytes are replaced.
async fn read_optional(path: &Path) -> Option<String> {
    if !is_file(path).await {
        debug!(path = %path.display(), "Companion document not found");
        return None;
    }

    debug!(path = %path.display(), "Loading companion document");
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) => {
            error!(path = %path.display(), error = %e, "Failed to read companion document");
            return None;
        }
    };

    match decode_document(&bytes) {
        Ok(text) => Some(text),
        Err(e) => {
            warn!(
                path = %path.display(),
                error = %e,
                "Companion document could not be decoded, replacing invalid bytes"
            );
            let text = String::from_utf8_lossy(&bytes);
            Some(text.trim_start_matches('\u{feff}').to_string())
        }
    }
}

/// UTF-8 with or without a byte-order mark, or UTF-16 introduced by one.
fn decode_document(bytes: &[u8]) -> Result<String, String> {
    if let Some(rest) = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]) {
        return String::from_utf8(rest.to_vec()).map_err(|e| e.to_string());
    }
    if let Some(rest) = bytes.strip_prefix(&[0xFF, 0xFE]) {
        return decode_utf16(rest, u16::from_le_bytes);
    }
    if let Some(rest) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        return decode_utf16(rest, u16::from_be_bytes);
    }

    std::str::from_utf8(bytes)
        .map(str::to_string)
        .map_err(|e| e.to_string())
}

fn decode_utf16(bytes: &[u8], unit: fn([u8; 2]) -> u16) -> Result<String, String> {
    if bytes.len() % 2 != 0 {
        return Err("truncated UTF-16 code unit".to_string());
    }

    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| unit([pair[0], pair[1]]))
        .collect();
    String::from_utf16(&units).map_err(|e| e.to_string())
}

/// Unpack `bundle` into `target`, overwriting files that already exist.
fn extract_bundle(bundle: &Path, target: &Path) -> AppResult<()> {
    let mut archive = ZipArchive::new(File::open(bundle)?)?;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let Some(relative) = entry.enclosed_name() else {
            debug!(name = entry.name(), "Skipping bundle entry outside the run directory");
            continue;
        };
        let out_path = target.join(relative);

        if entry.is_dir() {
            std::fs::create_dir_all(&out_path)?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&out_path)?;
        io::copy(&mut entry, &mut out)?;
    }

    Ok(())
}

/// Write every file under `source` into a new zip at `target`, paths relative to `source`.
fn compress_directory(source: &Path, target: &Path) -> AppResult<()> {
    let mut writer = ZipWriter::new(File::create(target)?);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for entry in WalkDir::new(source).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| AppError::FileSystem(e.to_string()))?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(|e| AppError::FileSystem(e.to_string()))?;
        let name = relative.to_string_lossy().replace('\\', "/");

        if entry.file_type().is_dir() {
            writer.add_directory(name, options)?;
        } else if entry.file_type().is_file() {
            writer.start_file(name, options)?;
            let mut file = File::open(entry.path())?;
            io::copy(&mut file, &mut writer)?;
        }
    }

    writer.finish()?;
    Ok(())
}
