use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use serde_json::Value;

use crate::{
    adapter::RegistryHandle,
    ecosystem::Ecosystem,
    error::{RegistryError, Result},
    http::{Fetcher, JsonPage},
};

enum Canned {
    Page(JsonPage),
    Fails,
}

/// Serves canned JSON by exact URL and records every request.
/// Unknown URLs answer 404.
#[derive(Default)]
pub struct CannedFetcher {
    responses: Mutex<HashMap<String, Canned>>,
    calls: Mutex<Vec<String>>,
}

impl CannedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn json(self, url: &str, body: Value) -> Self {
        self.insert(url, Canned::Page(JsonPage::new(body)))
    }

    /// Serves `body` with a `rel="next"` link to `next`.
    pub fn page(self, url: &str, body: Value, next: &str) -> Self {
        self.insert(
            url,
            Canned::Page(JsonPage {
                body,
                next: Some(next.to_string()),
            }),
        )
    }

    pub fn failing(self, url: &str) -> Self {
        self.insert(url, Canned::Fails)
    }

    fn insert(self, url: &str, canned: Canned) -> Self {
        self.responses.lock().unwrap().insert(url.to_string(), canned);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, url: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| *c == url).count()
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}

impl Fetcher for CannedFetcher {
    fn fetch_json(&self, url: &str) -> Result<Option<JsonPage>> {
        self.calls.lock().unwrap().push(url.to_string());
        match self.responses.lock().unwrap().get(url) {
            Some(Canned::Page(page)) => Ok(Some(page.clone())),
            Some(Canned::Fails) => Err(RegistryError::FailedToFetchRemote(format!(
                "{url} [500 Internal Server Error]"
            ))),
            None => Ok(None),
        }
    }
}

pub fn handle(ecosystem: Ecosystem, url: &str) -> RegistryHandle {
    RegistryHandle {
        id: 1,
        name: "test".into(),
        url: url.into(),
        ecosystem,
    }
}
