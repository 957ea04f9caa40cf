// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::path::PathBuf;

use futures_util::future::BoxFuture;
use tracing::debug;

use super::{AssetFetcher, FetchError};

/// Fetches assets from the local filesystem. Accepts plain paths and file:// URLs.
#[derive(Default)]
pub struct FileFetcher {}

impl FileFetcher {
    pub fn new() -> FileFetcher {
        FileFetcher {}
    }

    /// Converts a URL to a path, undoing the key encoding applied to melodic URLs.
    fn path(url: &str) -> PathBuf {
        PathBuf::from(url.strip_prefix("file://").unwrap_or(url).replace("%23", "#"))
    }

    async fn read(url: &str) -> Result<Vec<u8>, FetchError> {
        let path = Self::path(url);
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                debug!(path = ?path, bytes = bytes.len(), "Read asset");
                Ok(bytes)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(FetchError::NotFound(url.to_string()))
            }
            Err(e) => Err(FetchError::Io {
                url: url.to_string(),
                source: e,
            }),
        }
    }

    async fn is_file(url: &str) -> Result<bool, FetchError> {
        match tokio::fs::metadata(Self::path(url)).await {
            Ok(metadata) => Ok(metadata.is_file()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(FetchError::Io {
                url: url.to_string(),
                source: e,
            }),
        }
    }
}

impl AssetFetcher for FileFetcher {
    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Vec<u8>, FetchError>> {
        Box::pin(Self::read(url))
    }

    fn exists<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<bool, FetchError>> {
        Box::pin(Self::is_file(url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_and_exists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tanpura_C#.wav");
        std::fs::write(&path, b"RIFF").unwrap();

        let fetcher = FileFetcher::new();
        let encoded = format!("file://{}/tanpura_C%23.wav", dir.path().display());

        assert!(fetcher.exists(&encoded).await.unwrap());
        assert_eq!(fetcher.fetch(&encoded).await.unwrap(), b"RIFF".to_vec());

        let missing = format!("{}/missing.wav", dir.path().display());
        assert!(!fetcher.exists(&missing).await.unwrap());
        assert!(matches!(
            fetcher.fetch(&missing).await,
            Err(FetchError::NotFound(_))
        ));
    }
}
