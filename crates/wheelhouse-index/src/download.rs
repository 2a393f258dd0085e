//! HTTP downloads for index metadata and distribution files.

use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::Client;

use wheelhouse_core::{DistributionFile, FileLocation};
use wheelhouse_util::errors::WheelhouseError;

const MAX_RETRIES: u32 = 3;
const RETRY_DELAY: Duration = Duration::from_secs(2);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Build the shared reqwest client used for index queries and downloads.
pub fn build_client() -> Result<Client, WheelhouseError> {
    Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .user_agent(concat!("wheelhouse/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| WheelhouseError::Network {
            message: format!("Failed to create HTTP client: {e}"),
        })
}

/// GET `url` with retries on timeouts, connection failures and 5xx answers.
///
/// Returns `Ok(None)` for 404.
pub async fn download_bytes(
    client: &Client,
    url: &str,
) -> Result<Option<Vec<u8>>, WheelhouseError> {
    let mut last_err = String::new();

    for attempt in 0..MAX_RETRIES {
        if attempt > 0 {
            tracing::debug!("retrying {url} (attempt {})", attempt + 1);
            tokio::time::sleep(RETRY_DELAY * attempt).await;
        }

        match client.get(url).send().await {
            Ok(resp) => {
                let status = resp.status();
                if status == reqwest::StatusCode::NOT_FOUND {
                    return Ok(None);
                }
                if status.is_server_error() {
                    last_err = format!("HTTP {status} from {url}");
                    continue;
                }
                if !status.is_success() {
                    return Err(WheelhouseError::Network {
                        message: format!("HTTP {status} fetching {url}"),
                    });
                }
                let bytes = resp.bytes().await.map_err(|e| WheelhouseError::Network {
                    message: format!("Failed to read response from {url}: {e}"),
                })?;
                return Ok(Some(bytes.to_vec()));
            }
            Err(e) if e.is_timeout() || e.is_connect() => {
                last_err = format!("{e}");
            }
            Err(e) => {
                return Err(WheelhouseError::Network {
                    message: format!("Request to {url} failed: {e}"),
                });
            }
        }
    }

    Err(WheelhouseError::Network {
        message: format!("Failed after {MAX_RETRIES} retries for {url}: {last_err}"),
    })
}

/// Download a large file with a progress bar. No retries.
async fn download_with_progress(
    client: &Client,
    url: &str,
    label: &str,
) -> Result<Vec<u8>, WheelhouseError> {
    let mut resp = client.get(url).send().await.map_err(|e| WheelhouseError::Network {
        message: format!("Request to {url} failed: {e}"),
    })?;
    if !resp.status().is_success() {
        return Err(WheelhouseError::Network {
            message: format!("HTTP {} fetching {url}", resp.status()),
        });
    }

    let total = resp.content_length().unwrap_or(0);
    let pb = wheelhouse_util::progress::byte_bar(total, label);

    let mut data = Vec::with_capacity(total as usize);
    while let Some(chunk) = resp.chunk().await.map_err(|e| WheelhouseError::Network {
        message: format!("Failed to read {url}: {e}"),
    })? {
        data.extend_from_slice(&chunk);
        pb.set_position(data.len() as u64);
    }
    pb.finish_and_clear();
    Ok(data)
}

const PROGRESS_THRESHOLD: u64 = 1_000_000;

/// Materialize `file` into `dest_dir`, verifying its SHA-256 when one is known.
///
/// Local files are copied; remote files are downloaded. Returns the written path.
pub async fn fetch_file(
    client: &Client,
    file: &DistributionFile,
    dest_dir: &Path,
) -> Result<PathBuf, WheelhouseError> {
    let dest = dest_dir.join(&file.filename);
    if file.sha256.is_none() {
        tracing::warn!("no checksum known for {}", file.filename);
    }
    match &file.location {
        FileLocation::Path(path) => {
            if let Some(expected) = &file.sha256 {
                wheelhouse_util::hash::verify_file_sha256(path, expected)?;
            }
            wheelhouse_util::fs::ensure_dir(dest_dir)?;
            if *path != dest {
                std::fs::copy(path, &dest)?;
            }
        }
        FileLocation::Url(url) => {
            if let Some(expected) = &file.sha256 {
                if dest.is_file()
                    && wheelhouse_util::hash::sha256_file(&dest)?.eq_ignore_ascii_case(expected)
                {
                    tracing::debug!("{} already present", file.filename);
                    return Ok(dest);
                }
            }
            let large = client
                .head(url)
                .send()
                .await
                .ok()
                .and_then(|r| r.content_length())
                .is_some_and(|len| len > PROGRESS_THRESHOLD);
            let data = if large {
                download_with_progress(client, url, &file.filename).await?
            } else {
                download_bytes(client, url).await?.ok_or_else(|| WheelhouseError::Network {
                    message: format!("{url} not found"),
                })?
            };
            if let Some(expected) = &file.sha256 {
                wheelhouse_util::hash::verify_sha256(&data, expected, &file.filename)?;
            }
            wheelhouse_util::fs::write_atomic(&dest, &data)?;
        }
    }
    Ok(dest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn local_file_is_copied_and_verified() {
        let src = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        let path = src.path().join("pkg-1.0-py3-none-any.whl");
        std::fs::write(&path, b"wheel bytes").unwrap();

        let client = build_client().unwrap();
        let mut file = DistributionFile {
            filename: "pkg-1.0-py3-none-any.whl".into(),
            location: FileLocation::Path(path.clone()),
            sha256: Some(wheelhouse_util::hash::sha256_bytes(b"wheel bytes")),
        };
        let written = fetch_file(&client, &file, dest.path()).await.unwrap();
        assert_eq!(std::fs::read(written).unwrap(), b"wheel bytes");

        file.sha256 = Some("00".repeat(32));
        assert!(matches!(
            fetch_file(&client, &file, dest.path()).await,
            Err(WheelhouseError::Network { .. })
        ));
    }
}
