use anyhow::{bail, Context, Result};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// A file found under one of the requested sources
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredFile {
    pub source: PathBuf,
    /// Destination path relative to the destination root
    pub relative_path: PathBuf,
    pub size: u64,
}

/// Flat result of expanding the requested sources
#[derive(Debug, Default)]
pub struct Discovery {
    pub files: Vec<DiscoveredFile>,
    /// Requested sources that no longer existed
    pub missing: Vec<PathBuf>,
}

impl Discovery {
    pub fn total_files(&self) -> u64 {
        self.files.len() as u64
    }

    pub fn total_bytes(&self) -> u64 {
        self.files.iter().map(|f| f.size).sum()
    }
}

/// Expand files and directories into a flat list of files to copy.
///
/// A file keeps only its name; files under a directory keep their path
/// relative to that directory's parent, so the directory itself is
/// recreated at the destination. Sources that vanished are logged and
/// skipped, any other I/O failure aborts discovery.
pub async fn discover(sources: &[PathBuf]) -> Result<Discovery> {
    let mut discovery = Discovery::default();

    for source in sources {
        let metadata = match tokio::fs::metadata(source).await {
            Ok(m) => m,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!("Source path does not exist: {}", source.display());
                discovery.missing.push(source.clone());
                continue;
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Cannot access source {}", source.display()));
            }
        };

        if metadata.is_dir() {
            let base = source.parent().unwrap_or(source.as_path());
            walk_directory(source, base, &mut discovery.files).await?;
        } else if metadata.is_file() {
            let Some(name) = source.file_name() else {
                bail!("Source file has no name: {}", source.display());
            };
            discovery.files.push(DiscoveredFile {
                source: source.clone(),
                relative_path: PathBuf::from(name),
                size: metadata.len(),
            });
        } else {
            warn!("Skipping unsupported source: {}", source.display());
        }
    }

    debug!(
        "Discovered {} files ({} bytes), {} missing sources",
        discovery.total_files(),
        discovery.total_bytes(),
        discovery.missing.len()
    );

    Ok(discovery)
}

/// Depth-first walk with entries visited in name order
async fn walk_directory(root: &Path, base: &Path, files: &mut Vec<DiscoveredFile>) -> Result<()> {
    let mut stack = vec![root.to_path_buf()];

    while let Some(current) = stack.pop() {
        let mut entries = tokio::fs::read_dir(&current).await
            .with_context(|| format!("Failed to read directory {}", current.display()))?;

        let mut children = Vec::new();
        while let Some(entry) = entries.next_entry().await
            .with_context(|| format!("Failed to read directory {}", current.display()))?
        {
            children.push(entry.path());
        }
        children.sort();

        let mut subdirs = Vec::new();
        for path in children {
            // Follows symlinks to files; symlinked directories are not descended
            let metadata = match tokio::fs::metadata(&path).await {
                Ok(m) => m,
                // Dangling link, or removed while walking
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    warn!("Skipping unreadable entry: {}", path.display());
                    continue;
                }
                Err(e) => {
                    return Err(e).with_context(|| format!("Cannot access {}", path.display()));
                }
            };
            let is_link = tokio::fs::symlink_metadata(&path).await
                .map(|m| m.file_type().is_symlink())
                .unwrap_or(false);

            if metadata.is_dir() {
                if is_link {
                    debug!("Not following directory link {}", path.display());
                } else {
                    subdirs.push(path);
                }
            } else if metadata.is_file() {
                let relative_path = path.strip_prefix(base)
                    .context("Failed to calculate relative path")?
                    .to_path_buf();
                files.push(DiscoveredFile {
                    source: path,
                    relative_path,
                    size: metadata.len(),
                });
            }
        }

        stack.extend(subdirs.into_iter().rev());
    }

    Ok(())
}
