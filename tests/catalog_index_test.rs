use catalog_search::catalog::{CatalogSource, EntityKind, FsCatalog, WriteOutcome};
use catalog_search::search::{DEFAULT_TTL, IndexCache, SearchFilters, SearchResultType};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

fn setup() -> (TempDir, Arc<FsCatalog>) {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();

    write(root, "brands/prusament.yaml", "uuid: b-1\nslug: prusament\nname: Prusament\n");
    write(root, "brands/bambulab.yaml", "slug: bambulab\nname: Bambu Lab\n");
    write(
        root,
        "materials/prusament/galaxy-black.yaml",
        "slug: prusament-pla-galaxy-black\nname: Prusament PLA Galaxy Black\ntype: PLA\n",
    );
    write(
        root,
        "materials/bambulab/basic-black.yaml",
        "name: Bambu PLA Basic Black\ntype: PLA\nprimary_color:\n  color_rgba: '#000000ff'\n",
    );
    write(root, "materials/bambulab/broken.yaml", "name: [oops\n");
    write(root, "material-packages/prusament/pla-1kg.yaml", "slug: prusament-pla-1kg\n");
    write(root, "material-containers/spool-750g.yaml", "name: Spool 750g\n");

    let catalog = Arc::new(FsCatalog::new(root));
    (temp_dir, catalog)
}

#[tokio::test]
async fn test_index_built_from_yaml_tree() {
    let (_temp, catalog) = setup();
    let cache = IndexCache::new(catalog, DEFAULT_TTL);

    let index = cache.get_index().await.unwrap();
    assert_eq!(index.count_of(SearchResultType::Brand), 2);
    assert_eq!(index.count_of(SearchResultType::Material), 2);
    assert_eq!(index.count_of(SearchResultType::Package), 1);
    assert_eq!(index.count_of(SearchResultType::Container), 1);

    let results = cache.search("basic black", &SearchFilters::default(), 10).await.unwrap();
    assert_eq!(results[0].slug, "basic-black");
    assert_eq!(results[0].brand_name.as_deref(), Some("Bambu Lab"));
    assert_eq!(results[0].color.as_deref(), Some("#000000ff"));

    // Package names come from their slug
    let results = cache.search("1kg", &SearchFilters::default(), 10).await.unwrap();
    assert_eq!(results[0].name, "prusament pla 1kg");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_cold_searches_build_once() {
    let (_temp, catalog) = setup();
    let cache = IndexCache::new(catalog, DEFAULT_TTL);

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let cache = cache.clone();
            tokio::spawn(async move {
                let query = if i % 2 == 0 { "prusament" } else { "black" };
                cache.search(query, &SearchFilters::default(), 10).await
            })
        })
        .collect();

    for handle in handles {
        assert!(!handle.await.unwrap().unwrap().is_empty());
    }

    assert_eq!(cache.status().build_count, 1);
}

#[tokio::test]
async fn test_write_then_invalidate_shows_new_record() {
    let (_temp, catalog) = setup();
    let cache = IndexCache::new(catalog.clone(), DEFAULT_TTL);

    assert!(cache.search("silk", &SearchFilters::default(), 10).await.unwrap().is_empty());

    let outcome = catalog
        .write(
            EntityKind::Material,
            Some("prusament"),
            "prusament-pla-silk-gold",
            &json!({ "name": "Prusament PLA Silk Gold", "type": "PLA" }),
            true,
        )
        .await
        .unwrap();
    assert!(matches!(outcome, WriteOutcome::Created(_)));

    // Still served from the fresh cache until invalidated
    assert!(cache.search("silk", &SearchFilters::default(), 10).await.unwrap().is_empty());

    cache.invalidate();
    let results = cache.search("silk", &SearchFilters::default(), 10).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].brand_slug.as_deref(), Some("prusament"));

    assert!(catalog
        .delete(EntityKind::Material, Some("prusament"), "prusament-pla-silk-gold")
        .await
        .unwrap());
    cache.invalidate();
    assert!(cache.search("silk", &SearchFilters::default(), 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_missing_root_fails_then_recovers() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().join("data");
    let catalog = Arc::new(FsCatalog::new(&root));
    assert!(catalog.check_available().await.is_err());

    let cache = IndexCache::new(catalog, DEFAULT_TTL);
    assert!(cache.get_index().await.is_err());
    assert!(cache.status().last_error.is_some());

    write(&root, "brands/prusament.yaml", "slug: prusament\nname: Prusament\n");
    let index = cache.get_index().await.unwrap();
    assert_eq!(index.count_of(SearchResultType::Brand), 1);
    assert_eq!(cache.status().build_count, 2);
}
