use anyhow::{Context, Result};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::tokenizer::tokenize;
use super::types::{SearchResult, SearchResultType};
use crate::catalog::CatalogSource;

/// A corpus row with its searchable fields tokenized once at build time
#[derive(Debug, Clone)]
pub struct IndexedEntry {
    pub result: SearchResult,
    pub name_tokens: Vec<String>,
    pub brand_tokens: Vec<String>,
    pub material_type_tokens: Vec<String>,
    pub slug_tokens: Vec<String>,
}

impl IndexedEntry {
    pub fn new(result: SearchResult) -> Self {
        let name_tokens = tokenize(&result.name);
        let brand_tokens = match result.result_type {
            SearchResultType::Brand => Vec::new(),
            _ => result.brand_name.as_deref().map(tokenize).unwrap_or_default(),
        };
        let material_type_tokens = match result.result_type {
            SearchResultType::Material => {
                result.material_type.as_deref().map(tokenize).unwrap_or_default()
            }
            _ => Vec::new(),
        };
        let slug_tokens = match result.result_type {
            SearchResultType::Brand => tokenize(&result.slug),
            _ => Vec::new(),
        };

        Self {
            result,
            name_tokens,
            brand_tokens,
            material_type_tokens,
            slug_tokens,
        }
    }
}

/// The full flattened corpus
#[derive(Debug, Clone, Default)]
pub struct SearchIndex {
    entries: Vec<IndexedEntry>,
}

impl SearchIndex {
    pub fn new(results: Vec<SearchResult>) -> Self {
        Self {
            entries: results.into_iter().map(IndexedEntry::new).collect(),
        }
    }

    pub fn entries(&self) -> &[IndexedEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn count_of(&self, result_type: SearchResultType) -> usize {
        self.entries
            .iter()
            .filter(|e| e.result.result_type == result_type)
            .count()
    }
}

impl FromIterator<SearchResult> for SearchIndex {
    fn from_iter<T: IntoIterator<Item = SearchResult>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// Log a failed source and carry on with nothing from it
fn or_empty<T>(source: &str, listing: Result<Vec<T>>) -> Vec<T> {
    match listing {
        Ok(items) => items,
        Err(e) => {
            warn!("Search index: skipping {} ({:#})", source, e);
            Vec::new()
        }
    }
}

/// Pulls every entity out of a catalog and flattens it into a `SearchIndex`
#[derive(Debug, Clone)]
pub struct CorpusBuilder {
    source: Arc<dyn CatalogSource>,
}

impl CorpusBuilder {
    pub fn new(source: Arc<dyn CatalogSource>) -> Self {
        Self { source }
    }

    /// Build the corpus.
    ///
    /// Fails only when the catalog is unreachable. A failing listing
    /// contributes zero items.
    pub async fn build(&self) -> Result<SearchIndex> {
        let started = Instant::now();

        self.source
            .check_available()
            .await
            .context("Catalog is not available")?;

        let (brands, materials, packages, containers) = tokio::join!(
            self.source.list_brands(),
            self.source.list_materials(),
            self.source.list_packages(),
            self.source.list_containers(),
        );
        let brands = or_empty("brands", brands);
        let materials = or_empty("materials", materials);
        let packages = or_empty("packages", packages);
        let containers = or_empty("containers", containers);

        let mut brand_names: HashMap<String, String> = HashMap::with_capacity(brands.len() * 2);
        for brand in &brands {
            brand_names
                .entry(brand.slug.clone())
                .or_insert_with(|| brand.name.clone());
            brand_names
                .entry(brand.slug.to_lowercase())
                .or_insert_with(|| brand.name.clone());
        }
        // Unknown owners still get a display name so slug and name stay paired
        let brand_name_for = |slug: &str| -> String {
            brand_names
                .get(slug)
                .or_else(|| brand_names.get(&slug.to_lowercase()))
                .cloned()
                .unwrap_or_else(|| {
                    debug!("No brand record for '{}', using slug as brand name", slug);
                    slug.to_string()
                })
        };

        let mut results =
            Vec::with_capacity(brands.len() + materials.len() + packages.len() + containers.len());

        for brand in &brands {
            results.push(SearchResult::brand(&brand.slug, &brand.name));
        }

        for material in materials {
            let brand_name = brand_name_for(&material.brand_slug);
            let mut result = SearchResult::material(material.slug, material.name)
                .with_brand(material.brand_slug, brand_name);
            result.material_type = material.material_type;
            result.color = material.color;
            results.push(result);
        }

        for package in packages {
            let brand_name = brand_name_for(&package.brand_slug);
            results.push(
                SearchResult::package(package.slug, package.name)
                    .with_brand(package.brand_slug, brand_name),
            );
        }

        for container in containers {
            results.push(SearchResult::container(container.slug, container.name));
        }

        let index = SearchIndex::new(results);

        info!(
            "Search index built: {} items ({} brands, {} materials, {} packages, {} containers) in {}ms",
            index.len(),
            index.count_of(SearchResultType::Brand),
            index.count_of(SearchResultType::Material),
            index.count_of(SearchResultType::Package),
            index.count_of(SearchResultType::Container),
            started.elapsed().as_millis()
        );

        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Brand, Container, Material, Package};
    use async_trait::async_trait;

    #[derive(Debug, Default)]
    struct StaticCatalog {
        fail_materials: bool,
        unavailable: bool,
    }

    #[async_trait]
    impl CatalogSource for StaticCatalog {
        async fn check_available(&self) -> Result<()> {
            if self.unavailable {
                anyhow::bail!("catalog root missing");
            }
            Ok(())
        }

        async fn list_brands(&self) -> Result<Vec<Brand>> {
            Ok(vec![Brand {
                slug: "prusament".to_string(),
                name: "Prusament".to_string(),
                uuid: None,
            }])
        }

        async fn list_materials(&self) -> Result<Vec<Material>> {
            if self.fail_materials {
                anyhow::bail!("materials directory unreadable");
            }
            Ok(vec![
                Material {
                    slug: "galaxy-black".to_string(),
                    name: "Prusament PLA Galaxy Black".to_string(),
                    brand_slug: "prusament".to_string(),
                    material_type: Some("PLA".to_string()),
                    color: Some("#000000ff".to_string()),
                },
                Material {
                    slug: "mystery".to_string(),
                    name: "Mystery PETG".to_string(),
                    brand_slug: "ghost".to_string(),
                    material_type: Some("PETG".to_string()),
                    color: None,
                },
            ])
        }

        async fn list_packages(&self) -> Result<Vec<Package>> {
            Ok(vec![Package {
                slug: "prusament-pla-1kg".to_string(),
                name: "prusament pla 1kg".to_string(),
                brand_slug: "Prusament".to_string(),
                gtin: None,
            }])
        }

        async fn list_containers(&self) -> Result<Vec<Container>> {
            Ok(vec![Container {
                slug: "spool-750g".to_string(),
                name: "Spool 750g".to_string(),
            }])
        }
    }

    #[tokio::test]
    async fn test_build_flattens_all_sources() {
        let builder = CorpusBuilder::new(Arc::new(StaticCatalog::default()));
        let index = builder.build().await.unwrap();

        assert_eq!(index.len(), 5);
        assert_eq!(index.count_of(SearchResultType::Material), 2);

        let galaxy = index
            .entries()
            .iter()
            .find(|e| e.result.slug == "galaxy-black")
            .unwrap();
        assert_eq!(galaxy.result.brand_name.as_deref(), Some("Prusament"));
        assert_eq!(galaxy.result.color.as_deref(), Some("#000000ff"));
        assert_eq!(galaxy.material_type_tokens, vec!["pla"]);
        assert_eq!(galaxy.brand_tokens, vec!["prusament"]);

        // Brand lookup is case-insensitive
        let package = index
            .entries()
            .iter()
            .find(|e| e.result.result_type == SearchResultType::Package)
            .unwrap();
        assert_eq!(package.result.brand_name.as_deref(), Some("Prusament"));
    }

    #[tokio::test]
    async fn test_unknown_brand_keeps_pairing() {
        let builder = CorpusBuilder::new(Arc::new(StaticCatalog::default()));
        let index = builder.build().await.unwrap();

        let mystery = index
            .entries()
            .iter()
            .find(|e| e.result.slug == "mystery")
            .unwrap();
        assert_eq!(mystery.result.brand_slug.as_deref(), Some("ghost"));
        assert_eq!(mystery.result.brand_name.as_deref(), Some("ghost"));
    }

    #[tokio::test]
    async fn test_failed_source_is_omitted() {
        let catalog = StaticCatalog {
            fail_materials: true,
            ..Default::default()
        };
        let index = CorpusBuilder::new(Arc::new(catalog)).build().await.unwrap();

        assert_eq!(index.len(), 3);
        assert_eq!(index.count_of(SearchResultType::Material), 0);
    }

    #[tokio::test]
    async fn test_unavailable_catalog_fails_build() {
        let catalog = StaticCatalog {
            unavailable: true,
            ..Default::default()
        };
        let result = CorpusBuilder::new(Arc::new(catalog)).build().await;
        assert!(result.is_err());
    }

    #[test]
    fn test_indexed_entry_fields_by_type() {
        let brand = IndexedEntry::new(SearchResult::brand("bambulab", "Bambu Lab"));
        assert_eq!(brand.name_tokens, vec!["bambu", "lab"]);
        assert_eq!(brand.slug_tokens, vec!["bambulab"]);
        assert!(brand.brand_tokens.is_empty());

        // Material type is only searchable on materials
        let mut package = SearchResult::package("p", "Pack").with_brand("x", "X");
        package.material_type = Some("PLA".to_string());
        let package = IndexedEntry::new(package);
        assert!(package.material_type_tokens.is_empty());
        assert_eq!(package.brand_tokens, vec!["x"]);
    }
}
