//! Agent download and installation
//!
//! Resolves the latest release tag, downloads the platform archive into the
//! resource directory, replaces the previous binary with the archive's
//! contents and marks it executable. Every step reports through the
//! injected logger; the caller gets an [`InstallReport`] whatever happens.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use serde::Deserialize;

use crate::config::AgentSettings;
use crate::error::{Error, Result};
use crate::logger::SharedLogger;
use crate::version;

use super::platform::{Platform, AGENT_NAME};

/// Fields of the release index we read
#[derive(Debug, Deserialize)]
struct ReleaseInfo {
    tag_name: String,
}

/// Result of one install attempt
#[derive(Debug)]
pub struct InstallReport {
    /// Release tag resolved during the attempt, if any
    pub version: Option<String>,

    /// Installed binary path, or why the attempt failed
    pub result: Result<PathBuf>,
}

/// Downloads and unpacks the agent for one platform into one directory
#[derive(Clone)]
pub struct Installer {
    client: reqwest::Client,
    releases_url: String,
    download_prefix: String,
    resource_dir: PathBuf,
    platform: Platform,
    logger: SharedLogger,
}

impl Installer {
    pub fn new(
        settings: &AgentSettings,
        resource_dir: PathBuf,
        platform: Platform,
        logger: SharedLogger,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.download_timeout_secs))
            .user_agent(version::build_info().plugin_tag())
            .build()
            .map_err(|e| Error::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            releases_url: settings.releases_url.clone(),
            download_prefix: settings.download_prefix.clone(),
            resource_dir,
            platform,
            logger,
        })
    }

    pub fn resource_dir(&self) -> &Path {
        &self.resource_dir
    }

    /// Where the agent binary lives once installed
    pub fn binary_path(&self) -> PathBuf {
        self.resource_dir.join(self.platform.binary_name())
    }

    /// Transient location of the downloaded archive
    pub fn archive_path(&self) -> PathBuf {
        self.resource_dir.join(format!("{}.zip", AGENT_NAME))
    }

    /// `<prefix>/<tag>/wakatime-cli-<os>-<arch>.zip`
    ///
    /// Unlisted platform combinations are logged but still get a URL.
    pub fn download_url(&self, version: &str) -> String {
        if !self.platform.is_supported() {
            self.logger.warn(&format!(
                "Missing OS and architecture combination: {} {}",
                self.platform.os, self.platform.arch
            ));
        }
        format!(
            "{}/{}/{}.zip",
            self.download_prefix.trim_end_matches('/'),
            version,
            self.platform.artifact_stem()
        )
    }

    /// Latest release tag; a non-empty `cached` tag is returned without a request
    pub async fn latest_version(&self, cached: Option<&str>) -> Result<String> {
        if let Some(version) = cached.filter(|v| !v.is_empty()) {
            return Ok(version.to_string());
        }

        let response = self
            .client
            .get(&self.releases_url)
            .header(CONTENT_TYPE, "application/json")
            .send()
            .await
            .map_err(|e| Error::http_request(&self.releases_url, e))?;

        let status = response.status();
        if status != StatusCode::OK && status != StatusCode::NOT_MODIFIED {
            return Err(Error::HttpStatus {
                url: self.releases_url.clone(),
                status: status.as_u16(),
            });
        }
        self.logger
            .debug(&format!("Release index response {}", status.as_u16()));

        let release: ReleaseInfo = response
            .json()
            .await
            .map_err(|e| Error::http_request(&self.releases_url, e))?;

        let tag = release.tag_name.trim().to_string();
        if tag.is_empty() {
            return Err(Error::ReleaseUnavailable(
                "release index returned an empty tag".to_string(),
            ));
        }
        self.logger
            .debug(&format!("Latest {} version: {}", AGENT_NAME, tag));
        Ok(tag)
    }

    /// Run one install attempt
    pub async fn install(self, cached_version: Option<String>) -> InstallReport {
        let version = match self.latest_version(cached_version.as_deref()).await {
            Ok(version) => version,
            Err(e) => {
                self.logger
                    .warn_with_cause(&format!("Could not resolve latest {} version", AGENT_NAME), &e);
                return InstallReport {
                    version: None,
                    result: Err(e),
                };
            }
        };

        let result = self.install_version(&version).await;
        InstallReport {
            version: Some(version),
            result,
        }
    }

    async fn install_version(&self, version: &str) -> Result<PathBuf> {
        self.logger
            .debug(&format!("Downloading {} {}...", AGENT_NAME, version));
        let url = self.download_url(version);
        self.logger.debug(&format!("Using download url {}", url));

        let archive = self.archive_path();
        self.download(&url, &archive).await?;
        self.extract(&archive).await
    }

    async fn download(&self, url: &str, dest: &Path) -> Result<()> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::http_request(url, e))?;

        if !response.status().is_success() {
            return Err(Error::HttpStatus {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::http_request(url, e))?;

        self.logger.debug(&format!("Writing to {}", dest.display()));
        tokio::fs::write(dest, &bytes).await.map_err(|e| Error::IoWrite {
            path: dest.to_path_buf(),
            source: e,
        })
    }

    /// Replace the binary with the archive contents and drop the archive
    async fn extract(&self, archive: &Path) -> Result<PathBuf> {
        self.logger.debug(&format!(
            "Extracting {} into \"{}\"...",
            AGENT_NAME,
            self.resource_dir.display()
        ));

        let binary = self.binary_path();
        if binary.exists() {
            tokio::fs::remove_file(&binary)
                .await
                .map_err(|e| Error::IoWrite {
                    path: binary.clone(),
                    source: e,
                })?;
        }

        let archive_path = archive.to_path_buf();
        let out_dir = self.resource_dir.clone();
        let written = tokio::task::spawn_blocking(move || unzip(&archive_path, &out_dir))
            .await
            .map_err(|e| Error::Internal(format!("Extraction task failed: {}", e)))??;
        self.logger.debug(&format!(
            "Finished extracting {} ({} files)",
            AGENT_NAME,
            written.len()
        ));

        if let Err(e) = tokio::fs::remove_file(archive).await {
            self.logger
                .warn_with_cause(&format!("Failed to remove {}", archive.display()), &e);
        }

        if !binary.exists() {
            return Err(Error::archive(
                archive,
                format!("archive did not contain {}", self.platform.binary_name()),
            ));
        }

        if !self.platform.is_windows() {
            self.logger
                .debug(&format!("Chmod 755 {}...", binary.display()));
            if let Err(e) = make_executable(&binary) {
                self.logger
                    .warn_with_cause(&format!("Failed to chmod {}", binary.display()), &e);
            }
        }

        Ok(binary)
    }
}

/// Unpack every entry of a zip archive into `out_dir`, returning the files written
pub fn unzip(archive: &Path, out_dir: &Path) -> Result<Vec<PathBuf>> {
    let file = File::open(archive).map_err(|e| Error::IoRead {
        path: archive.to_path_buf(),
        source: e,
    })?;
    let mut zip = zip::ZipArchive::new(file).map_err(|e| Error::archive(archive, e.to_string()))?;

    let write_err = |path: &Path, e: io::Error| Error::IoWrite {
        path: path.to_path_buf(),
        source: e,
    };

    fs::create_dir_all(out_dir).map_err(|e| write_err(out_dir, e))?;

    let mut written = Vec::with_capacity(zip.len());
    for index in 0..zip.len() {
        let mut entry = zip
            .by_index(index)
            .map_err(|e| Error::archive(archive, e.to_string()))?;

        let relative = match entry.enclosed_name() {
            Some(path) => path.to_path_buf(),
            None => {
                return Err(Error::archive(
                    archive,
                    format!("entry '{}' escapes the target directory", entry.name()),
                ))
            }
        };
        let target = out_dir.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&target).map_err(|e| write_err(&target, e))?;
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| write_err(parent, e))?;
        }

        let mut out = File::create(&target).map_err(|e| write_err(&target, e))?;
        io::copy(&mut entry, &mut out).map_err(|e| write_err(&target, e))?;
        written.push(target);
    }

    Ok(written)
}

#[cfg(unix)]
fn make_executable(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> io::Result<()> {
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::logger::{MemoryLogger, Severity};
    use std::io::Write;
    use std::sync::Arc;
    use tempfile::TempDir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Build a zip archive in memory from `(name, contents)` pairs
    pub(crate) fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut cursor = io::Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut cursor);
            let options = zip::write::FileOptions::default()
                .compression_method(zip::CompressionMethod::Stored);
            for (name, contents) in entries {
                writer.start_file(*name, options).unwrap();
                writer.write_all(contents).unwrap();
            }
            writer.finish().unwrap();
        }
        cursor.into_inner()
    }

    /// Serve fixed responses over HTTP/1.1 until the test ends; returns the base URL
    pub(crate) async fn serve(routes: Vec<(String, u16, Vec<u8>)>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let (mut socket, _) = match listener.accept().await {
                    Ok(conn) => conn,
                    Err(_) => return,
                };
                let routes = routes.clone();
                tokio::spawn(async move {
                    let mut request = Vec::new();
                    let mut buf = [0u8; 1024];
                    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                        match socket.read(&mut buf).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => request.extend_from_slice(&buf[..n]),
                        }
                    }
                    let head = String::from_utf8_lossy(&request).to_string();
                    let path = head.split_whitespace().nth(1).unwrap_or("/").to_string();
                    let (status, body) = routes
                        .iter()
                        .find(|(p, _, _)| *p == path)
                        .map(|(_, s, b)| (*s, b.clone()))
                        .unwrap_or((404, b"not found".to_vec()));
                    let header = format!(
                        "HTTP/1.1 {} X\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                        status,
                        body.len()
                    );
                    let _ = socket.write_all(header.as_bytes()).await;
                    let _ = socket.write_all(&body).await;
                    let _ = socket.shutdown().await;
                });
            }
        });
        format!("http://{}", addr)
    }

    fn installer(dir: &Path, base_url: &str, logger: Arc<MemoryLogger>) -> Installer {
        let settings = AgentSettings {
            resource_dir: Some(dir.to_string_lossy().into_owned()),
            auto_install: true,
            releases_url: format!("{}/latest", base_url),
            download_prefix: format!("{}/download", base_url),
            download_timeout_secs: 5,
        };
        Installer::new(
            &settings,
            dir.to_path_buf(),
            Platform::new("linux", "x86_64"),
            logger,
        )
        .unwrap()
    }

    #[test]
    fn test_download_url() {
        let dir = TempDir::new().unwrap();
        let logger = MemoryLogger::new();
        let installer = installer(dir.path(), "https://example.com/", logger.clone());

        assert_eq!(
            installer.download_url("v1.90.0"),
            "https://example.com//download/v1.90.0/wakatime-cli-linux-amd64.zip"
        );
        assert!(logger.entries().is_empty());
    }

    #[test]
    fn test_download_url_unlisted_combination_still_built() {
        let dir = TempDir::new().unwrap();
        let logger = MemoryLogger::new();
        let mut installer = installer(dir.path(), "https://example.com", logger.clone());
        installer.platform = Platform::new("linux", "riscv64");

        let url = installer.download_url("v1.0.0");
        assert!(url.ends_with("/v1.0.0/wakatime-cli-linux-riscv64.zip"));
        assert!(logger.contains(Severity::Warn, "linux riscv64"));
    }

    #[test]
    fn test_unzip_writes_entries() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("agent.zip");
        fs::write(
            &archive,
            zip_bytes(&[("wakatime-cli-linux-amd64", b"binary"), ("LICENSE", b"text")]),
        )
        .unwrap();

        let out = dir.path().join("out");
        let written = unzip(&archive, &out).unwrap();
        assert_eq!(written.len(), 2);
        assert_eq!(fs::read(out.join("wakatime-cli-linux-amd64")).unwrap(), b"binary");
        assert_eq!(fs::read(out.join("LICENSE")).unwrap(), b"text");
    }

    #[test]
    fn test_unzip_rejects_corrupt_archive() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("agent.zip");
        fs::write(&archive, b"this is not a zip").unwrap();

        let err = unzip(&archive, dir.path()).unwrap_err();
        assert!(matches!(err, Error::AgentArchive { .. }));
    }

    #[test]
    fn test_latest_version_uses_cache() {
        let dir = TempDir::new().unwrap();
        // nothing listens here; a request would fail
        let installer = installer(dir.path(), "http://127.0.0.1:9", MemoryLogger::new());
        let version = tokio_test::block_on(installer.latest_version(Some("v1.2.3")));
        assert_eq!(version.unwrap(), "v1.2.3");
    }

    #[tokio::test]
    async fn test_latest_version_rejects_bad_status() {
        let base = serve(vec![("/latest".to_string(), 500, b"{}".to_vec())]).await;
        let dir = TempDir::new().unwrap();
        let installer = installer(dir.path(), &base, MemoryLogger::new());

        let err = installer.latest_version(None).await.unwrap_err();
        assert!(matches!(err, Error::HttpStatus { status: 500, .. }));
    }

    #[tokio::test]
    async fn test_install_end_to_end() {
        let archive = zip_bytes(&[("wakatime-cli-linux-amd64", b"#!/bin/sh\nexit 0\n")]);
        let base = serve(vec![
            ("/latest".to_string(), 200, br#"{"tag_name":"v1.90.0"}"#.to_vec()),
            (
                "/download/v1.90.0/wakatime-cli-linux-amd64.zip".to_string(),
                200,
                archive,
            ),
        ])
        .await;

        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("wakatime-cli-linux-amd64"), b"old").unwrap();
        let installer = installer(dir.path(), &base, MemoryLogger::new());

        let report = installer.clone().install(None).await;
        assert_eq!(report.version.as_deref(), Some("v1.90.0"));
        let binary = report.result.unwrap();
        assert_eq!(binary, dir.path().join("wakatime-cli-linux-amd64"));
        assert_eq!(fs::read(&binary).unwrap(), b"#!/bin/sh\nexit 0\n");
        assert!(!installer.archive_path().exists());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&binary).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o755);
        }
    }

    #[tokio::test]
    async fn test_install_without_release_reports_failure() {
        let base = serve(vec![]).await;
        let dir = TempDir::new().unwrap();
        let logger = MemoryLogger::new();
        let installer = installer(dir.path(), &base, logger.clone());

        let report = installer.install(None).await;
        assert!(report.version.is_none());
        assert!(report.result.is_err());
        assert!(logger.contains(Severity::Warn, "Could not resolve latest wakatime-cli version"));
    }

    #[tokio::test]
    async fn test_install_archive_missing_binary() {
        let archive = zip_bytes(&[("README.md", b"nothing useful")]);
        let base = serve(vec![
            ("/latest".to_string(), 200, br#"{"tag_name":"v2.0.0"}"#.to_vec()),
            (
                "/download/v2.0.0/wakatime-cli-linux-amd64.zip".to_string(),
                200,
                archive,
            ),
        ])
        .await;

        let dir = TempDir::new().unwrap();
        let installer = installer(dir.path(), &base, MemoryLogger::new());
        let report = installer.install(None).await;

        assert_eq!(report.version.as_deref(), Some("v2.0.0"));
        assert!(matches!(report.result, Err(Error::AgentArchive { .. })));
    }
}
