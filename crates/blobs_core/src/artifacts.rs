//! Fetching and unpacking the firmware blobs.
//!
//! Both steps are best effort per file, like the flash sweep: a failed
//! download or a corrupt archive is reported and the loop moves on. The
//! flasher later records the missing image as skipped.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::debug;
use uuid::Uuid;

use crate::config::ArtifactSource;
use crate::constants::{COMPRESSED_SUFFIX, WORK_DIR_PREFIX};
use crate::error::{FlashError, Result};
use crate::reporter::StatusReporter;

/// Creates a fresh `oplus_download_<uuid>` directory under the system temp dir.
pub fn create_work_dir() -> Result<PathBuf> {
    let dir = std::env::temp_dir().join(format!("{}{}", WORK_DIR_PREFIX, Uuid::new_v4()));
    fs::create_dir_all(&dir)?;
    Ok(dir)
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FetchSummary {
    pub downloaded: Vec<String>,
    pub cached: Vec<String>,
    pub failed: Vec<(String, String)>,
}

pub struct ArtifactFetcher {
    client: reqwest::Client,
    source: ArtifactSource,
    reporter: Arc<dyn StatusReporter>,
}

impl ArtifactFetcher {
    pub fn new(source: ArtifactSource, reporter: Arc<dyn StatusReporter>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("blobs_core/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, source, reporter })
    }

    /// Downloads every configured file into `dir`, skipping files already there.
    pub async fn download_all(&self, dir: &Path) -> FetchSummary {
        let mut summary = FetchSummary::default();
        for file in &self.source.files {
            let dest = dir.join(file);
            if dest.exists() {
                debug!(%file, "already downloaded");
                summary.cached.push(file.clone());
                continue;
            }

            self.reporter.step(&format!("Downloading {}...", file));
            let url = self.source.url_for(file);
            match self.download_one(&url, &dest).await {
                Ok(bytes) => {
                    debug!(%file, bytes, "downloaded");
                    self.reporter.ok(&format!("Downloaded {}", file));
                    summary.downloaded.push(file.clone());
                }
                Err(e) => {
                    self.reporter.err(&format!("Failed to download {}: {}", file, e));
                    summary.failed.push((file.clone(), e.to_string()));
                }
            }
        }
        summary
    }

    async fn download_one(&self, url: &str, dest: &Path) -> Result<u64> {
        let mut response = self.client.get(url).send().await?.error_for_status()?;

        // Stream into a side file so an interrupted transfer never looks complete.
        let partial = partial_path(dest);
        let result = async {
            let mut file = tokio::fs::File::create(&partial).await?;
            let mut total = 0u64;
            while let Some(chunk) = response.chunk().await? {
                file.write_all(&chunk).await?;
                total += chunk.len() as u64;
            }
            file.flush().await?;
            Ok::<u64, FlashError>(total)
        }
        .await;

        match result {
            Ok(total) => {
                tokio::fs::rename(&partial, dest).await?;
                Ok(total)
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(&partial).await;
                Err(e)
            }
        }
    }
}

fn partial_path(dest: &Path) -> PathBuf {
    let name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    dest.with_file_name(format!("{}.part", name))
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ExtractSummary {
    pub extracted: Vec<PathBuf>,
    pub failed: Vec<(String, String)>,
}

/// Decompresses every `*.zst` file in `dir` next to itself, overwriting any
/// previous output. A file that fails to decode leaves no output behind.
pub async fn extract_all(dir: &Path, reporter: Arc<dyn StatusReporter>) -> Result<ExtractSummary> {
    let dir = dir.to_path_buf();
    tokio::task::spawn_blocking(move || extract_dir(&dir, reporter.as_ref()))
        .await
        .map_err(|e| FlashError::Anyhow(anyhow::anyhow!("extraction task failed: {}", e)))?
}

fn extract_dir(dir: &Path, reporter: &dyn StatusReporter) -> Result<ExtractSummary> {
    let mut archives: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && path.to_string_lossy().ends_with(COMPRESSED_SUFFIX))
        .collect();
    archives.sort();

    let mut summary = ExtractSummary::default();
    for archive in archives {
        let name = archive
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let out_path = archive.with_file_name(&name[..name.len() - COMPRESSED_SUFFIX.len()]);

        reporter.step(&format!("Extracting {} -> {}", name, out_path.display()));
        match decode_file(&archive, &out_path) {
            Ok(()) => {
                reporter.ok(&format!("Extracted {}", name));
                summary.extracted.push(out_path);
            }
            Err(e) => {
                let _ = fs::remove_file(&out_path);
                reporter.err(&format!("Failed to extract {}: {}", name, e));
                summary.failed.push((name, e.to_string()));
            }
        }
    }
    Ok(summary)
}

fn decode_file(src: &Path, dst: &Path) -> Result<()> {
    let input = BufReader::new(File::open(src)?);
    let mut output = BufWriter::new(File::create(dst)?);
    zstd::stream::copy_decode(input, &mut output).map_err(|e| FlashError::Extract {
        file: src.display().to_string(),
        reason: e.to_string(),
    })?;
    output.into_inner().map_err(|e| e.into_error())?.sync_all()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reporter::SilentReporter;
    use httpmock::prelude::*;

    fn reporter() -> Arc<dyn StatusReporter> {
        Arc::new(SilentReporter)
    }

    #[test]
    fn work_dir_is_unique() {
        let a = create_work_dir().unwrap();
        let b = create_work_dir().unwrap();
        assert_ne!(a, b);
        assert!(a.file_name().unwrap().to_string_lossy().starts_with(WORK_DIR_PREFIX));
        fs::remove_dir_all(a).unwrap();
        fs::remove_dir_all(b).unwrap();
    }

    #[tokio::test]
    async fn extracts_zst_files_and_reports_corrupt_ones() {
        let dir = tempfile::tempdir().unwrap();
        let payload = vec![0x5au8; 64 * 1024];
        fs::write(dir.path().join("abl.img.zst"), zstd::encode_all(&payload[..], 3).unwrap()).unwrap();
        fs::write(dir.path().join("tz.img.zst"), b"definitely not zstd").unwrap();
        fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();

        let summary = extract_all(dir.path(), reporter()).await.unwrap();
        assert_eq!(summary.extracted, vec![dir.path().join("abl.img")]);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].0, "tz.img.zst");
        assert_eq!(fs::read(dir.path().join("abl.img")).unwrap(), payload);
        assert!(!dir.path().join("tz.img").exists());
    }

    #[tokio::test]
    async fn extraction_overwrites_stale_output() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("logo.img"), b"stale").unwrap();
        fs::write(dir.path().join("logo.img.zst"), zstd::encode_all(&b"fresh"[..], 0).unwrap()).unwrap();

        extract_all(dir.path(), reporter()).await.unwrap();
        assert_eq!(fs::read(dir.path().join("logo.img")).unwrap(), b"fresh");
    }

    #[tokio::test]
    async fn downloads_skip_cached_and_survive_http_errors() {
        let server = MockServer::start_async().await;
        let abl = server
            .mock_async(|when, then| {
                when.method(GET).path("/blobs/abl.img.zst");
                then.status(200).body("abl-bytes");
            })
            .await;
        let tz = server
            .mock_async(|when, then| {
                when.method(GET).path("/blobs/tz.img.zst");
                then.status(404);
            })
            .await;

        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("xbl.img.zst"), b"cached").unwrap();

        let source = ArtifactSource {
            base_url: server.url("/blobs/"),
            files: vec!["abl.img.zst".into(), "tz.img.zst".into(), "xbl.img.zst".into()],
        };
        let fetcher = ArtifactFetcher::new(source, reporter()).unwrap();
        let summary = fetcher.download_all(dir.path()).await;

        abl.assert_async().await;
        tz.assert_async().await;
        assert_eq!(summary.downloaded, vec!["abl.img.zst".to_string()]);
        assert_eq!(summary.cached, vec!["xbl.img.zst".to_string()]);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].0, "tz.img.zst");
        assert_eq!(fs::read(dir.path().join("abl.img.zst")).unwrap(), b"abl-bytes");
        assert!(!dir.path().join("tz.img.zst").exists());
        assert!(!dir.path().join("tz.img.zst.part").exists());
        assert_eq!(fs::read(dir.path().join("xbl.img.zst")).unwrap(), b"cached");
    }
}
