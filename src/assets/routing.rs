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

use super::{AssetFetcher, FetchError, FileFetcher, HttpFetcher};

/// Sends each URL to the fetcher for its scheme, so loops and melodic samples
/// can be published in different places.
pub struct RoutingFetcher {
    http: HttpFetcher,
    file: FileFetcher,
}

impl RoutingFetcher {
    pub fn new(timeout: Duration) -> Result<RoutingFetcher, FetchError> {
        Ok(RoutingFetcher {
            http: HttpFetcher::new(timeout)?,
            file: FileFetcher::new(),
        })
    }

    fn route(&self, url: &str) -> &dyn AssetFetcher {
        if is_http(url) {
            &self.http
        } else {
            &self.file
        }
    }
}

impl AssetFetcher for RoutingFetcher {
    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Vec<u8>, FetchError>> {
        self.route(url).fetch(url)
    }

    fn exists<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<bool, FetchError>> {
        self.route(url).exists(url)
    }
}

/// True for http:// and https:// URLs, in any case.
pub fn is_http(url: &str) -> bool {
    url.split_once("://").is_some_and(|(scheme, _)| {
        scheme.eq_ignore_ascii_case("http") || scheme.eq_ignore_ascii_case("https")
    })
}
