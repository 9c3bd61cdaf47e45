use std::sync::Arc;

use once_cell::sync::OnceCell;
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::{
    adapter::{DependencyMetadata, EcosystemAdapter, PackageMetadata, RegistryHandle, VersionMetadata},
    error::Result,
    http::{Fetcher, HttpFetcher, JsonPage},
};

const CATALOG_PAGE_SIZE: usize = 1000;

#[derive(Debug, Deserialize)]
struct CatalogPage {
    #[serde(default)]
    repositories: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct TagList {
    pub name: String,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

/// Adapter for an OCI distribution registry.
///
/// The catalog is walked page by page once per instance. Tags become versions;
/// images carry no dependency edges.
pub struct DockerAdapter {
    registry: RegistryHandle,
    fetcher: Arc<dyn Fetcher>,
    catalog: OnceCell<Vec<String>>,
}

impl DockerAdapter {
    pub fn new(registry: RegistryHandle) -> Self {
        Self::with_fetcher(registry, Arc::new(HttpFetcher))
    }

    pub fn with_fetcher(registry: RegistryHandle, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            registry,
            fetcher,
            catalog: OnceCell::new(),
        }
    }

    fn catalog_url(&self, last: Option<&str>) -> String {
        let mut url = format!(
            "{}/v2/_catalog?n={CATALOG_PAGE_SIZE}",
            self.registry.base_url()
        );
        if let Some(last) = last {
            url.push_str("&last=");
            url.extend(utf8_percent_encode(last, NON_ALPHANUMERIC));
        }
        url
    }

    fn tags(&self, name: &str) -> Result<Option<TagList>> {
        let url = format!("{}/v2/{name}/tags/list", self.registry.base_url());
        self.fetcher
            .fetch_json(&url)?
            .map(JsonPage::decode)
            .transpose()
    }

    /// Where the catalog continues after a page ending in `page_last`.
    ///
    /// A `rel="next"` link wins, and once a registry has sent one its absence
    /// ends the walk. Registries that never send one are walked with a `last`
    /// cursor until a page comes back empty. Servers may cap `n` below the
    /// requested size, so a short page alone does not end the walk.
    fn next_catalog_url(
        &self,
        current: &str,
        link: Option<String>,
        page_last: Option<&str>,
        follows_links: bool,
    ) -> Option<String> {
        let page_last = page_last?;
        match link {
            Some(link) => (link != current).then_some(link),
            None if follows_links => None,
            None => Some(self.catalog_url(Some(page_last))),
        }
    }

    fn load_catalog(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = Vec::new();
        let mut url = self.catalog_url(None);
        let mut follows_links = false;

        loop {
            let page = self.fetcher.fetch_required(&url)?;
            let link = page.next.clone();
            follows_links |= link.is_some();
            let repositories = page.decode::<CatalogPage>()?.repositories;

            // a server ignoring the cursor repeats its first page
            if repositories.last().is_some() && repositories.last() == names.last() {
                break;
            }
            let next = self.next_catalog_url(
                &url,
                link,
                repositories.last().map(String::as_str),
                follows_links,
            );
            names.extend(repositories);

            match next {
                Some(next) => url = next,
                None => break,
            }
        }

        debug!(
            registry = self.registry.name,
            count = names.len(),
            "loaded docker catalog"
        );
        Ok(names)
    }
}

impl EcosystemAdapter for DockerAdapter {
    fn registry(&self) -> &RegistryHandle {
        &self.registry
    }

    fn all_package_names(&self) -> Result<Vec<String>> {
        self.catalog
            .get_or_try_init(|| self.load_catalog())
            .cloned()
    }

    fn recently_updated_package_names(&self) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    fn package_metadata(&self, name: &str) -> Result<Option<PackageMetadata>> {
        let name = self.ecosystem().canonical_name(name);
        Ok(self.tags(&name)?.map(|list| map_package_metadata(&name, &list)))
    }

    /// Reads the tag list carried in `package.metadata`, fetching it only
    /// when the record did not come from [`Self::package_metadata`].
    fn versions_metadata(&self, package: &PackageMetadata) -> Result<Vec<VersionMetadata>> {
        let tags = match package.metadata.get("tags").and_then(Value::as_array) {
            Some(tags) => tags
                .iter()
                .filter_map(Value::as_str)
                .map(String::from)
                .collect(),
            None => self
                .tags(&package.name)?
                .and_then(|list| list.tags)
                .unwrap_or_default(),
        };
        Ok(tags.into_iter().map(VersionMetadata::new).collect())
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

pub fn map_package_metadata(name: &str, tags: &TagList) -> PackageMetadata {
    let namespace = name.rsplit_once('/').map(|(ns, _)| ns.to_string());
    let tags = tags.tags.clone().unwrap_or_default();
    PackageMetadata {
        name: name.to_string(),
        namespace,
        metadata: json!({
            "tags_count": tags.len(),
            "tags": tags,
        }),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ecosystem::Ecosystem,
        test_utils::{handle, CannedFetcher},
    };

    const BASE: &str = "https://registry.example.com/";

    fn adapter() -> DockerAdapter {
        DockerAdapter::new(handle(Ecosystem::Docker, BASE))
    }

    fn adapter_with(fetcher: Arc<CannedFetcher>) -> DockerAdapter {
        DockerAdapter::with_fetcher(handle(Ecosystem::Docker, BASE), fetcher)
    }

    fn catalog(names: &[&str]) -> Value {
        json!({ "repositories": names })
    }

    #[test]
    fn test_catalog_url_paging() {
        let adapter = adapter();
        assert_eq!(
            adapter.catalog_url(None),
            "https://registry.example.com/v2/_catalog?n=1000"
        );
        assert_eq!(
            adapter.catalog_url(Some("library/redis")),
            "https://registry.example.com/v2/_catalog?n=1000&last=library%2Fredis"
        );
    }

    #[test]
    fn test_map_package_metadata() {
        let tags: TagList =
            serde_json::from_str(r#"{"name":"library/redis","tags":["7.0","7.2"]}"#).unwrap();
        let meta = map_package_metadata("library/redis", &tags);
        assert_eq!(meta.name, "library/redis");
        assert_eq!(meta.namespace.as_deref(), Some("library"));
        assert_eq!(meta.metadata["tags_count"], 2);
        assert_eq!(meta.metadata["tags"], json!(["7.0", "7.2"]));
    }

    #[test]
    fn test_tag_list_allows_null_tags() {
        let tags: TagList = serde_json::from_str(r#"{"name":"x/y","tags":null}"#).unwrap();
        assert!(tags.tags.is_none());
        assert_eq!(map_package_metadata("x/y", &tags).metadata["tags_count"], 0);
    }

    #[test]
    fn test_catalog_follows_link_header_across_short_pages() {
        let first = "https://registry.example.com/v2/_catalog?n=1000";
        let second = "https://registry.example.com/v2/_catalog?last=b&n=2";
        let third = "https://registry.example.com/v2/_catalog?last=d&n=2";
        let fetcher = CannedFetcher::new()
            .page(first, catalog(&["a", "b"]), second)
            .page(second, catalog(&["c", "d"]), third)
            .json(third, catalog(&["e"]))
            .shared();
        let adapter = adapter_with(fetcher.clone());

        assert_eq!(adapter.all_package_names().unwrap(), ["a", "b", "c", "d", "e"]);
        assert_eq!(fetcher.calls(), [first, second, third]);

        // the walk happens once per adapter
        adapter.all_package_names().unwrap();
        assert_eq!(fetcher.calls().len(), 3);
    }

    #[test]
    fn test_catalog_without_link_header_walks_until_empty_page() {
        let fetcher = CannedFetcher::new()
            .json(&adapter().catalog_url(None), catalog(&["library/a", "library/b"]))
            .json(&adapter().catalog_url(Some("library/b")), catalog(&["library/c"]))
            .json(&adapter().catalog_url(Some("library/c")), catalog(&[]))
            .shared();
        let adapter = adapter_with(fetcher.clone());

        assert_eq!(
            adapter.all_package_names().unwrap(),
            ["library/a", "library/b", "library/c"]
        );
        assert_eq!(fetcher.calls().len(), 3);
    }

    #[test]
    fn test_catalog_stops_when_cursor_is_ignored() {
        let first = adapter().catalog_url(None);
        let fetcher = CannedFetcher::new()
            .json(&first, catalog(&["a", "b"]))
            .json(&adapter().catalog_url(Some("b")), catalog(&["a", "b"]))
            .shared();

        assert_eq!(adapter_with(fetcher).all_package_names().unwrap(), ["a", "b"]);
    }

    #[test]
    fn test_catalog_failure_is_an_error() {
        let fetcher = CannedFetcher::new()
            .failing(&adapter().catalog_url(None))
            .shared();
        assert!(adapter_with(fetcher).all_package_names().is_err());
    }

    #[test]
    fn test_versions_reuse_tags_from_package_metadata() {
        let tags_url = "https://registry.example.com/v2/library/redis/tags/list";
        let fetcher = CannedFetcher::new()
            .json(tags_url, json!({"name": "library/redis", "tags": ["7.0", "7.2"]}))
            .shared();
        let adapter = adapter_with(fetcher.clone());

        let meta = adapter.package_metadata("redis").unwrap().unwrap();
        assert_eq!(meta.name, "library/redis");
        let versions = adapter.versions_metadata(&meta).unwrap();

        let numbers: Vec<_> = versions.iter().map(|v| v.number.as_str()).collect();
        assert_eq!(numbers, ["7.0", "7.2"]);
        assert_eq!(fetcher.call_count(tags_url), 1);
    }

    #[test]
    fn test_unknown_image_has_no_metadata() {
        let fetcher = CannedFetcher::new().shared();
        assert!(adapter_with(fetcher).package_metadata("nope").unwrap().is_none());
    }
}
