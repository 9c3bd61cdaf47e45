use std::{
    collections::BTreeMap,
    sync::{Arc, LazyLock},
};

use once_cell::sync::OnceCell;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, trace};

use crate::{
    adapter::{DependencyMetadata, EcosystemAdapter, PackageMetadata, RegistryHandle, VersionMetadata},
    error::Result,
    http::{Fetcher, HttpFetcher},
};

static GITHUB_REPO_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"github\.com[/:]([A-Za-z0-9_.-]+)/([A-Za-z0-9_.-]+?)(?:\.git)?/?$")
        .expect("github repository pattern is valid")
});

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BowerEntry {
    pub name: String,
    #[serde(default)]
    pub url: Option<String>,
}

/// Adapter for a bower-style static index: one JSON array of `{name, url}`.
pub struct BowerAdapter {
    registry: RegistryHandle,
    fetcher: Arc<dyn Fetcher>,
    index: OnceCell<BTreeMap<String, BowerEntry>>,
}

impl BowerAdapter {
    pub fn new(registry: RegistryHandle) -> Self {
        Self::with_fetcher(registry, Arc::new(HttpFetcher))
    }

    pub fn with_fetcher(registry: RegistryHandle, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            registry,
            fetcher,
            index: OnceCell::new(),
        }
    }

    fn packages(&self) -> Result<&BTreeMap<String, BowerEntry>> {
        self.index.get_or_try_init(|| {
            let url = format!("{}/packages", self.registry.base_url());
            let entries: Vec<BowerEntry> = self.fetcher.fetch_required(&url)?.decode()?;
            debug!(
                registry = self.registry.name,
                count = entries.len(),
                "loaded bower package index"
            );
            Ok(build_index(entries))
        })
    }

    /// A missing or unreadable `bower.json` degrades to an empty document.
    fn load_bower_json(&self, entry: &BowerEntry) -> Option<Value> {
        let owner_repo = entry.url.as_deref().and_then(github_name_with_owner)?;
        let url = format!("https://raw.githubusercontent.com/{owner_repo}/master/bower.json");
        match self.fetcher.fetch_required(&url) {
            Ok(page) => Some(page.body),
            Err(err) => {
                trace!(package = entry.name, "no bower.json: {err}");
                Some(Value::Object(Default::default()))
            }
        }
    }
}

impl EcosystemAdapter for BowerAdapter {
    fn registry(&self) -> &RegistryHandle {
        &self.registry
    }

    fn all_package_names(&self) -> Result<Vec<String>> {
        Ok(self.packages()?.values().map(|e| e.name.clone()).collect())
    }

    fn recently_updated_package_names(&self) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    fn package_metadata(&self, name: &str) -> Result<Option<PackageMetadata>> {
        let Some(entry) = self.packages()?.get(&name.to_lowercase()) else {
            return Ok(None);
        };
        let bower_json = self.load_bower_json(entry);
        Ok(Some(map_package_metadata(entry, bower_json.as_ref())))
    }

    fn versions_metadata(&self, _package: &PackageMetadata) -> Result<Vec<VersionMetadata>> {
        Ok(Vec::new())
    }

    fn dependencies_metadata(
        &self,
        _name: &str,
        _version: &str,
        _package: &PackageMetadata,
    ) -> Vec<DependencyMetadata> {
        Vec::new()
    }
}

/// Keys index entries by lowercased name. Later duplicates win.
pub fn build_index(entries: Vec<BowerEntry>) -> BTreeMap<String, BowerEntry> {
    entries
        .into_iter()
        .map(|entry| (entry.name.to_lowercase(), entry))
        .collect()
}

/// Extracts `owner/repo` from the common GitHub URL shapes.
pub fn github_name_with_owner(url: &str) -> Option<String> {
    let caps = GITHUB_REPO_RE.captures(url.trim())?;
    Some(format!("{}/{}", &caps[1], &caps[2]))
}

/// Maps an index entry, enriched by its `bower.json` when available.
pub fn map_package_metadata(entry: &BowerEntry, bower_json: Option<&Value>) -> PackageMetadata {
    let field = |key: &str| {
        bower_json
            .and_then(|json| json.get(key))
            .and_then(Value::as_str)
            .map(String::from)
    };

    let licenses = bower_json.and_then(|json| json.get("license")).and_then(|v| {
        match v {
            Value::String(s) => Some(s.clone()),
            Value::Array(items) => {
                let joined = items
                    .iter()
                    .filter_map(Value::as_str)
                    .collect::<Vec<_>>()
                    .join(",");
                (!joined.is_empty()).then_some(joined)
            }
            _ => None,
        }
    });

    let keywords = bower_json
        .and_then(|json| json.get("keywords"))
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(String::from)
                .collect()
        })
        .unwrap_or_default();

    PackageMetadata {
        name: entry.name.clone(),
        repository_url: entry.url.clone(),
        licenses,
        keywords,
        homepage: field("homepage"),
        description: field("description"),
        namespace: None,
        metadata: Value::Object(Default::default()),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{
        ecosystem::Ecosystem,
        test_utils::{handle, CannedFetcher},
    };

    const INDEX_URL: &str = "https://registry.bower.example/packages";
    const JQUERY_BOWER_JSON: &str =
        "https://raw.githubusercontent.com/jquery/jquery/master/bower.json";

    fn adapter_with(fetcher: Arc<CannedFetcher>) -> BowerAdapter {
        BowerAdapter::with_fetcher(
            handle(Ecosystem::Bower, "https://registry.bower.example"),
            fetcher,
        )
    }

    fn index() -> Value {
        json!([
            {"name": "jQuery", "url": "https://github.com/jquery/jquery.git"},
            {"name": "nourl"}
        ])
    }

    fn entry(name: &str, url: Option<&str>) -> BowerEntry {
        BowerEntry {
            name: name.to_string(),
            url: url.map(String::from),
        }
    }

    #[test]
    fn test_build_index_is_case_insensitive() {
        let index = build_index(vec![
            entry("jQuery", Some("https://github.com/jquery/jquery.git")),
            entry("lodash", None),
        ]);
        assert_eq!(index.len(), 2);
        assert_eq!(index["jquery"].name, "jQuery");
        assert!(index.contains_key("lodash"));
    }

    #[test]
    fn test_index_deserializes_from_registry_payload() {
        let payload = r#"[{"name":"angular","url":"https://github.com/angular/bower-angular.git"},{"name":"nourl"}]"#;
        let entries: Vec<BowerEntry> = serde_json::from_str(payload).unwrap();
        assert_eq!(entries[0].url.as_deref(), Some("https://github.com/angular/bower-angular.git"));
        assert!(entries[1].url.is_none());
    }

    #[test]
    fn test_github_name_with_owner() {
        assert_eq!(
            github_name_with_owner("https://github.com/jquery/jquery.git").as_deref(),
            Some("jquery/jquery")
        );
        assert_eq!(
            github_name_with_owner("git://github.com/angular/bower-angular.git").as_deref(),
            Some("angular/bower-angular")
        );
        assert_eq!(
            github_name_with_owner("git@github.com:twbs/bootstrap").as_deref(),
            Some("twbs/bootstrap")
        );
        assert_eq!(github_name_with_owner("https://gitlab.com/a/b"), None);
    }

    #[test]
    fn test_map_package_metadata_with_bower_json() {
        let bower_json = json!({
            "license": ["MIT", "Apache-2.0"],
            "keywords": ["dom", "ajax"],
            "homepage": "https://jquery.com",
            "description": "JavaScript library"
        });
        let meta = map_package_metadata(
            &entry("jquery", Some("https://github.com/jquery/jquery.git")),
            Some(&bower_json),
        );
        assert_eq!(meta.name, "jquery");
        assert_eq!(meta.licenses.as_deref(), Some("MIT,Apache-2.0"));
        assert_eq!(meta.keywords, vec!["dom", "ajax"]);
        assert_eq!(meta.homepage.as_deref(), Some("https://jquery.com"));
        assert_eq!(meta.description.as_deref(), Some("JavaScript library"));
        assert_eq!(
            meta.repository_url.as_deref(),
            Some("https://github.com/jquery/jquery.git")
        );
    }

    #[test]
    fn test_map_package_metadata_without_bower_json() {
        let meta = map_package_metadata(&entry("thing", None), None);
        assert_eq!(meta.name, "thing");
        assert!(meta.licenses.is_none());
        assert!(meta.keywords.is_empty());
        assert!(meta.description.is_none());

        let meta = map_package_metadata(&entry("thing", None), Some(&json!({"license": "ISC"})));
        assert_eq!(meta.licenses.as_deref(), Some("ISC"));
    }

    #[test]
    fn test_package_lookup_ignores_case() {
        let fetcher = CannedFetcher::new()
            .json(INDEX_URL, index())
            .json(JQUERY_BOWER_JSON, json!({"license": "MIT"}))
            .shared();
        let adapter = adapter_with(fetcher.clone());

        for name in ["jquery", "JQUERY", "jQuery"] {
            let meta = adapter.package_metadata(name).unwrap().unwrap();
            assert_eq!(meta.name, "jQuery");
            assert_eq!(meta.licenses.as_deref(), Some("MIT"));
        }
        assert!(adapter.package_metadata("zepto").unwrap().is_none());
        assert_eq!(fetcher.call_count(INDEX_URL), 1);
        assert_eq!(adapter.all_package_names().unwrap(), ["jQuery", "nourl"]);
    }

    #[test]
    fn test_unreachable_bower_json_keeps_index_fields() {
        let fetcher = CannedFetcher::new()
            .json(INDEX_URL, index())
            .failing(JQUERY_BOWER_JSON)
            .shared();
        let adapter = adapter_with(fetcher);

        let meta = adapter.package_metadata("jquery").unwrap().unwrap();
        assert_eq!(meta.name, "jQuery");
        assert_eq!(
            meta.repository_url.as_deref(),
            Some("https://github.com/jquery/jquery.git")
        );
        assert!(meta.licenses.is_none());
        assert!(meta.description.is_none());
    }

    #[test]
    fn test_entry_without_github_url_skips_bower_json() {
        let fetcher = CannedFetcher::new().json(INDEX_URL, index()).shared();
        let adapter = adapter_with(fetcher.clone());

        let meta = adapter.package_metadata("nourl").unwrap().unwrap();
        assert!(meta.repository_url.is_none());
        assert_eq!(fetcher.calls(), [INDEX_URL]);
    }

    #[test]
    fn test_missing_index_is_an_error() {
        let adapter = adapter_with(CannedFetcher::new().shared());
        assert!(adapter.all_package_names().is_err());
        assert!(adapter.package_metadata("jquery").is_err());
    }
}
