//! Blocking JSON access to upstream registries.
//!
//! Requests share one process-wide `ureq` agent that the CLI reconfigures at
//! startup. Adapters reach it through the [`Fetcher`] trait, so a canned
//! fetcher can stand in for the network.

use std::{
    sync::{LazyLock, RwLock},
    time::Duration,
};

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, trace};
use ureq::{
    http::{
        header::{ACCEPT, LINK},
        StatusCode,
    },
    Agent,
};
use url::Url;

use crate::error::{RegistryError, Result};

pub const DEFAULT_USER_AGENT: &str = concat!("pkgsync/", env!("CARGO_PKG_VERSION"));

#[derive(Clone, Debug, PartialEq)]
pub struct ClientConfig {
    pub user_agent: Option<String>,
    pub timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            user_agent: Some(DEFAULT_USER_AGENT.into()),
            timeout: None,
        }
    }
}

impl ClientConfig {
    /// Non-2xx statuses come back as responses so 404 can be told apart.
    fn agent(&self) -> Agent {
        let mut builder = Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(self.timeout);
        if let Some(user_agent) = &self.user_agent {
            builder = builder.user_agent(user_agent);
        }
        builder.build().into()
    }
}

struct Client {
    config: ClientConfig,
    agent: Agent,
}

static CLIENT: LazyLock<RwLock<Client>> = LazyLock::new(|| {
    let config = ClientConfig::default();
    RwLock::new(Client {
        agent: config.agent(),
        config,
    })
});

/// Edits the shared client configuration and rebuilds the agent.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use pkgsync_registry::http::configure_http_client;
///
/// configure_http_client(|cfg| {
///     cfg.timeout = Some(Duration::from_secs(30));
/// });
/// ```
pub fn configure_http_client<F>(updater: F)
where
    F: FnOnce(&mut ClientConfig),
{
    let mut client = CLIENT.write().unwrap_or_else(|poisoned| poisoned.into_inner());
    updater(&mut client.config);
    client.agent = client.config.agent();
}

pub fn client_config() -> ClientConfig {
    CLIENT
        .read()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .config
        .clone()
}

fn shared_agent() -> Agent {
    CLIENT
        .read()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .agent
        .clone()
}

/// A decoded JSON body and the `rel="next"` target sent alongside it.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonPage {
    pub body: Value,
    pub next: Option<String>,
}

impl JsonPage {
    pub fn new(body: Value) -> Self {
        Self { body, next: None }
    }

    pub fn decode<T: DeserializeOwned>(self) -> Result<T> {
        Ok(serde_json::from_value(self.body)?)
    }
}

/// Source of JSON documents for adapters.
pub trait Fetcher: Send + Sync {
    /// Fetches `url`. `Ok(None)` means the server answered 404.
    fn fetch_json(&self, url: &str) -> Result<Option<JsonPage>>;

    /// Like [`Fetcher::fetch_json`], with 404 reported as an error.
    fn fetch_required(&self, url: &str) -> Result<JsonPage> {
        self.fetch_json(url)?
            .ok_or_else(|| RegistryError::FailedToFetchRemote(format!("{url} [404 Not Found]")))
    }
}

/// [`Fetcher`] backed by the shared agent.
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpFetcher;

impl Fetcher for HttpFetcher {
    fn fetch_json(&self, url: &str) -> Result<Option<JsonPage>> {
        debug!(url, "fetching");
        let mut resp = shared_agent()
            .get(url)
            .header(ACCEPT, "application/json")
            .call()
            .map_err(|err| RegistryError::FailedToFetchRemote(format!("{url}: {err}")))?;

        let status = resp.status();
        trace!(url, status = status.as_u16(), "response received");
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(RegistryError::FailedToFetchRemote(format!("{url} [{status}]")));
        }

        let next = resp
            .headers()
            .get_all(LINK)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .find_map(|value| next_link(url, value));
        let bytes = resp.body_mut().read_to_vec()?;
        Ok(Some(JsonPage {
            body: serde_json::from_slice(&bytes)?,
            next,
        }))
    }
}

/// Fetches `url` over HTTP and decodes it, mapping 404 to `None`.
pub fn get_json_optional<T: DeserializeOwned>(url: &str) -> Result<Option<T>> {
    HttpFetcher.fetch_json(url)?.map(JsonPage::decode).transpose()
}

/// Picks the `rel="next"` target out of a `Link` header value, resolved
/// against the URL the header came from.
pub fn next_link(request_url: &str, header: &str) -> Option<String> {
    let base = Url::parse(request_url).ok()?;
    header.split(',').find_map(|link| {
        let (target, params) = link.split_once(';')?;
        let is_next = params.split(';').any(|param| {
            param
                .trim()
                .strip_prefix("rel=")
                .is_some_and(|rel| {
                    rel.trim_matches('"')
                        .split_whitespace()
                        .any(|r| r.eq_ignore_ascii_case("next"))
                })
        });
        if !is_next {
            return None;
        }
        let target = target.trim().strip_prefix('<')?.strip_suffix('>')?;
        base.join(target).ok().map(String::from)
    })
}
