//! Package file selection, source copying, and deployable zip creation

use crate::{Error, Result};
use async_zip::base::write::ZipFileWriter;
use async_zip::{Compression, ZipEntryBuilder};
use ignore::WalkBuilder;
use ignore::overrides::OverrideBuilder;
use std::path::{Path, PathBuf};
use tracing::debug;

impl From<ignore::Error> for Error {
    fn from(error: ignore::Error) -> Self {
        Error::Package(error.to_string())
    }
}

impl From<async_zip::error::ZipError> for Error {
    fn from(error: async_zip::error::ZipError) -> Self {
        Error::Package(error.to_string())
    }
}

/// Select the files of a service directory that belong in a package.
///
/// Ignore rules come from `.zipignore` or `.dotignore` at the source root;
/// when `.zipignore` exists it is authoritative and `default_excludes` are
/// not applied. The `.azure` directory is always excluded, as is any
/// directory `skip_dir` rejects. Returned paths are relative to `source`,
/// sorted for deterministic packaging.
pub fn package_files(
    source: &Path,
    default_excludes: &[&str],
    skip_dir: &(dyn Fn(&Path) -> bool + Sync),
) -> Result<Vec<PathBuf>> {
    let mut builder = WalkBuilder::new(source);
    builder
        .standard_filters(false)
        .hidden(false)
        .follow_links(false);

    let has_zipignore = source.join(".zipignore").is_file();
    if has_zipignore {
        builder.add_custom_ignore_filename(".zipignore");
    } else {
        if source.join(".dotignore").is_file() {
            builder.add_custom_ignore_filename(".dotignore");
        }
        if !default_excludes.is_empty() {
            let mut overrides = OverrideBuilder::new(source);
            for pattern in default_excludes {
                overrides.add(&format!("!{}", pattern))?;
            }
            builder.overrides(overrides.build()?);
        }
    }

    let mut files = Vec::new();
    for entry in builder.build() {
        let entry = entry?;
        if entry.file_type().is_some_and(|t| t.is_dir()) {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(|e| Error::Package(e.to_string()))?;
        if relative.components().any(|c| c.as_os_str() == ".azure") {
            continue;
        }
        if skip_dir_applies(source, relative, skip_dir) {
            continue;
        }
        files.push(relative.to_path_buf());
    }

    files.sort();
    Ok(files)
}

/// Whether any ancestor directory of `relative` is rejected by `skip_dir`
fn skip_dir_applies(
    source: &Path,
    relative: &Path,
    skip_dir: &(dyn Fn(&Path) -> bool + Sync),
) -> bool {
    let mut dir = source.to_path_buf();
    let components: Vec<_> = relative.components().collect();
    for component in components.iter().take(components.len().saturating_sub(1)) {
        dir = dir.join(component);
        if skip_dir(&dir) {
            return true;
        }
    }
    false
}

/// Copy the packageable files of `source` into `dest`
pub fn copy_package_dir(
    source: &Path,
    dest: &Path,
    default_excludes: &[&str],
    skip_dir: &(dyn Fn(&Path) -> bool + Sync),
) -> Result<()> {
    let files = package_files(source, default_excludes, skip_dir)?;
    debug!("Copying {} files to {}", files.len(), dest.display());

    for relative in files {
        let target = dest.join(&relative);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(source.join(&relative), target)?;
    }
    Ok(())
}

/// Create the deployable zip for a service.
///
/// The archive lands in the OS temp directory as
/// `<project>-<service>-azddeploy-<unix-seconds>.zip`, honours
/// `.zipignore`/`.dotignore`, and always excludes `.azure`.
pub async fn create_deployable_zip(
    project: &str,
    service: &str,
    source: &Path,
    default_excludes: &[&str],
) -> Result<PathBuf> {
    let files = package_files(source, default_excludes, &|_| false)?;
    let zip_path = std::env::temp_dir().join(format!(
        "{}-{}-azddeploy-{}.zip",
        project,
        service,
        chrono::Utc::now().timestamp()
    ));

    debug!(
        "Creating deployable zip {} ({} entries)",
        zip_path.display(),
        files.len()
    );

    let file = async_fs::File::create(&zip_path).await?;
    let mut writer = ZipFileWriter::new(file);

    let result: Result<()> = async {
        for relative in &files {
            let data = async_fs::read(source.join(relative)).await?;
            let name = relative
                .to_string_lossy()
                .replace(std::path::MAIN_SEPARATOR, "/");
            let entry = ZipEntryBuilder::new(name.into(), Compression::Deflate);
            writer.write_entry_whole(entry, &data).await?;
        }
        writer.close().await?;
        Ok(())
    }
    .await;

    if let Err(e) = result {
        // Do not leave a half-written archive in the temp directory
        let _ = std::fs::remove_file(&zip_path);
        return Err(e);
    }

    Ok(zip_path)
}
