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
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures_util::future::BoxFuture;
use parking_lot::Mutex;

use super::{AssetFetcher, FetchError};

#[derive(Default)]
struct State {
    files: HashMap<String, Vec<u8>>,
    failing: HashSet<String>,
    fetches: Vec<String>,
    probes: Vec<String>,
}

/// An in-memory fetcher. Clones share state so tests can inspect traffic after
/// handing the fetcher to a loader.
#[derive(Clone, Default)]
pub struct Fetcher {
    state: Arc<Mutex<State>>,
}

impl Fetcher {
    pub fn new() -> Fetcher {
        Fetcher::default()
    }

    /// Publishes the bytes at the given URL.
    pub fn insert(&self, url: &str, bytes: Vec<u8>) {
        self.state.lock().files.insert(url.to_string(), bytes);
    }

    /// Makes every request to the URL fail with a server error.
    pub fn fail(&self, url: &str) {
        self.state.lock().failing.insert(url.to_string());
    }

    /// Number of full fetches of the URL.
    pub fn fetch_count(&self, url: &str) -> usize {
        self.state.lock().fetches.iter().filter(|u| *u == url).count()
    }

    /// Number of existence probes of the URL.
    pub fn probe_count(&self, url: &str) -> usize {
        self.state.lock().probes.iter().filter(|u| *u == url).count()
    }

    /// Every URL fetched so far, in order.
    pub fn fetched(&self) -> Vec<String> {
        self.state.lock().fetches.clone()
    }
}

impl AssetFetcher for Fetcher {
    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Vec<u8>, FetchError>> {
        let result = {
            let mut state = self.state.lock();
            state.fetches.push(url.to_string());
            if state.failing.contains(url) {
                Err(FetchError::Status {
                    url: url.to_string(),
                    status: 500,
                })
            } else {
                state
                    .files
                    .get(url)
                    .cloned()
                    .ok_or_else(|| FetchError::NotFound(url.to_string()))
            }
        };
        Box::pin(async move { result })
    }

    fn exists<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<bool, FetchError>> {
        let result = {
            let mut state = self.state.lock();
            state.probes.push(url.to_string());
            state.files.contains_key(url) && !state.failing.contains(url)
        };
        Box::pin(async move { Ok(result) })
    }
}
