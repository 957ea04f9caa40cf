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
use std::time::Duration;

use futures_util::future::BoxFuture;
use reqwest::StatusCode;
use tracing::debug;

use super::{AssetFetcher, FetchError};

/// Fetches assets over HTTP(S).
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<HttpFetcher, FetchError> {
        Ok(HttpFetcher {
            client: reqwest::Client::builder().timeout(timeout).build()?,
        })
    }

    async fn get(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound(url.to_string()));
        }
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let bytes = response.bytes().await?;
        debug!(url, bytes = bytes.len(), "Fetched asset");
        Ok(bytes.to_vec())
    }

    async fn head(&self, url: &str) -> Result<bool, FetchError> {
        let status = self.client.head(url).send().await?.status();
        debug!(url, status = status.as_u16(), "Probed asset");
        Ok(status.is_success())
    }
}

impl AssetFetcher for HttpFetcher {
    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Vec<u8>, FetchError>> {
        Box::pin(self.get(url))
    }

    fn exists<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<bool, FetchError>> {
        Box::pin(self.head(url))
    }
}
