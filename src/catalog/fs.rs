use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_yaml::Value as YamlValue;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

use super::alias::{AliasIndex, slugify_name};
use super::{Brand, CatalogSource, Container, EntityKind, Material, Package};

/// Result of a write against the catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    Updated(PathBuf),
    Created(PathBuf),
    NotFound,
}

impl WriteOutcome {
    pub fn is_written(&self) -> bool {
        !matches!(self, WriteOutcome::NotFound)
    }
}

/// One parsed YAML file
#[derive(Debug, Clone)]
struct Record {
    path: PathBuf,
    stem: String,
    brand_folder: Option<String>,
    value: YamlValue,
}

impl Record {
    fn field(&self, key: &str) -> Option<String> {
        self.value.get(key).and_then(scalar_string)
    }

    fn nested_field(&self, outer: &str, inner: &str) -> Option<String> {
        self.value
            .get(outer)
            .and_then(|v| v.get(inner))
            .and_then(scalar_string)
    }

    /// Declared slug, falling back to the file stem
    fn slug(&self) -> String {
        self.field("slug").unwrap_or_else(|| self.stem.clone())
    }

    fn aliases(&self) -> Vec<String> {
        let mut aliases = Vec::with_capacity(4);
        aliases.extend(self.field("uuid"));
        aliases.extend(self.field("slug"));
        aliases.push(self.stem.clone());
        aliases.extend(self.field("name").as_deref().and_then(slugify_name));
        aliases
    }

    fn to_json(&self) -> Result<serde_json::Value> {
        serde_json::to_value(&self.value)
            .with_context(|| format!("Failed to convert {:?} to JSON", self.path))
    }
}

fn scalar_string(value: &YamlValue) -> Option<String> {
    match value {
        YamlValue::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        YamlValue::Number(n) => Some(n.to_string()),
        YamlValue::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn yaml_stem(file_name: &str) -> Option<&str> {
    let lower = file_name.to_ascii_lowercase();
    if lower.ends_with(".yaml") {
        Some(&file_name[..file_name.len() - 5])
    } else if lower.ends_with(".yml") {
        Some(&file_name[..file_name.len() - 4])
    } else {
        None
    }
}

fn index_records(records: &[Record]) -> AliasIndex {
    let mut index = AliasIndex::new();
    for (position, record) in records.iter().enumerate() {
        index.insert(position, record.aliases());
    }
    index
}

/// Catalog backed by a directory tree of YAML files
///
/// ```text
/// <root>/brands/*.yaml
/// <root>/materials/<brand>/*.yaml
/// <root>/material-packages/<brand>/*.yaml
/// <root>/material-containers/*.yaml
/// ```
#[derive(Debug, Clone)]
pub struct FsCatalog {
    root: PathBuf,
}

impl FsCatalog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Locate `data/` next to or one level above the working directory
    pub fn discover() -> Result<Self> {
        let cwd = std::env::current_dir().context("Failed to get current directory")?;

        for candidate in [cwd.join("data"), cwd.join("..").join("data")] {
            if candidate.is_dir() {
                info!("Using catalog data directory: {:?}", candidate);
                return Ok(Self::new(candidate));
            }
        }

        anyhow::bail!(
            "No catalog data directory found next to {:?}. Pass --data-dir or set data_dir in the config.",
            cwd
        )
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn kind_dir(&self, kind: EntityKind) -> PathBuf {
        self.root.join(kind.dir_name())
    }

    /// Parse every YAML file in a directory, skipping files that fail
    async fn read_records(&self, dir: &Path, brand_folder: Option<&str>) -> Result<Vec<Record>> {
        let mut entries = fs::read_dir(dir)
            .await
            .with_context(|| format!("Failed to read directory {dir:?}"))?;

        let mut file_names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .with_context(|| format!("Failed to list directory {dir:?}"))?
        {
            if let Some(name) = entry.file_name().to_str() {
                if yaml_stem(name).is_some() {
                    file_names.push(name.to_string());
                }
            }
        }
        file_names.sort();

        let mut records = Vec::with_capacity(file_names.len());
        for file_name in file_names {
            let path = dir.join(&file_name);
            match Self::parse_file(&path).await {
                Ok(value) => records.push(Record {
                    stem: yaml_stem(&file_name).unwrap_or(&file_name).to_string(),
                    path,
                    brand_folder: brand_folder.map(str::to_string),
                    value,
                }),
                Err(e) => warn!("Skipping unreadable catalog file {:?}: {:#}", path, e),
            }
        }

        Ok(records)
    }

    async fn parse_file(path: &Path) -> Result<YamlValue> {
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {path:?}"))?;
        let value: YamlValue =
            serde_yaml::from_str(&content).with_context(|| format!("Failed to parse {path:?}"))?;

        if !value.is_mapping() {
            anyhow::bail!("{path:?} does not contain a YAML mapping");
        }
        Ok(value)
    }

    /// Sub-directories of a nested entity root, one per brand
    async fn brand_folders(&self, kind: EntityKind) -> Result<Vec<String>> {
        let root = self.kind_dir(kind);
        let mut entries = fs::read_dir(&root)
            .await
            .with_context(|| format!("Failed to read {} directory {root:?}", kind.dir_name()))?;

        let mut folders = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
            if !is_dir {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                folders.push(name.to_string());
            }
        }
        folders.sort();

        Ok(folders)
    }

    /// All records of a nested kind; an unreadable brand folder is skipped
    async fn read_nested_records(&self, kind: EntityKind) -> Result<Vec<Record>> {
        let root = self.kind_dir(kind);
        let mut all = Vec::new();

        for folder in self.brand_folders(kind).await? {
            match self.read_records(&root.join(&folder), Some(&folder)).await {
                Ok(records) => all.extend(records),
                Err(e) => warn!(
                    "Skipping {} for brand folder '{}': {:#}",
                    kind.dir_name(),
                    folder,
                    e
                ),
            }
        }

        Ok(all)
    }

    /// Find the folder holding a brand's nested records.
    ///
    /// Tries the id as given, then the slugified name and slug of the brand
    /// it resolves to.
    pub async fn resolve_brand_dir(&self, kind: EntityKind, brand_id: &str) -> Result<Option<PathBuf>> {
        let root = self.kind_dir(kind);
        let mut candidates = vec![brand_id.to_string()];

        match self.read_records(&self.kind_dir(EntityKind::Brand), None).await {
            Ok(brands) => {
                let index = index_records(&brands);
                if let Some(brand) = index.resolve(brand_id).map(|i| &brands[i]) {
                    let extra = brand
                        .field("name")
                        .as_deref()
                        .and_then(slugify_name)
                        .into_iter()
                        .chain(brand.field("slug"));
                    for candidate in extra {
                        if !candidates.contains(&candidate) {
                            candidates.push(candidate);
                        }
                    }
                }
            }
            Err(e) => debug!("Brand lookup for '{}' failed: {:#}", brand_id, e),
        }

        for candidate in candidates {
            if !super::is_safe_id(&candidate) {
                continue;
            }
            let path = root.join(&candidate);
            if fs::metadata(&path).await.map(|m| m.is_dir()).unwrap_or(false) {
                return Ok(Some(path));
            }
        }

        Ok(None)
    }

    /// Directory holding records of `kind`, `None` when a nested brand is unknown
    async fn records_dir(&self, kind: EntityKind, brand: Option<&str>) -> Result<Option<PathBuf>> {
        if !kind.is_nested() {
            return Ok(Some(self.kind_dir(kind)));
        }
        match brand {
            Some(brand_id) => self.resolve_brand_dir(kind, brand_id).await,
            None => Ok(None),
        }
    }

    /// List raw records; `None` when the brand folder does not exist
    pub async fn list(&self, kind: EntityKind, brand: Option<&str>) -> Result<Option<Vec<serde_json::Value>>> {
        let Some(dir) = self.records_dir(kind, brand).await? else {
            return Ok(None);
        };

        let records = self.read_records(&dir, brand).await?;
        let values = records
            .iter()
            .map(Record::to_json)
            .collect::<Result<Vec<_>>>()?;
        Ok(Some(values))
    }

    /// Read one record by uuid, slug, file stem or slugified name
    pub async fn read(&self, kind: EntityKind, brand: Option<&str>, id: &str) -> Result<Option<serde_json::Value>> {
        let Some(dir) = self.records_dir(kind, brand).await? else {
            return Ok(None);
        };

        let records = self.read_records(&dir, brand).await?;
        match index_records(&records).resolve(id) {
            Some(position) => records[position].to_json().map(Some),
            None => Ok(None),
        }
    }

    /// Replace the record matching `id`, or create `<id>.yaml` when allowed
    pub async fn write(
        &self,
        kind: EntityKind,
        brand: Option<&str>,
        id: &str,
        value: &serde_json::Value,
        create_if_missing: bool,
    ) -> Result<WriteOutcome> {
        if !super::is_safe_id(id) {
            anyhow::bail!("Refusing to write {kind} with unsafe id '{id}'");
        }

        let dir = match self.records_dir(kind, brand).await? {
            Some(dir) => dir,
            None if create_if_missing && kind.is_nested() => match brand {
                Some(brand_id) => match self.create_brand_dir(kind, brand_id).await? {
                    Some(dir) => dir,
                    None => return Ok(WriteOutcome::NotFound),
                },
                None => return Ok(WriteOutcome::NotFound),
            },
            None => return Ok(WriteOutcome::NotFound),
        };

        let existing = match fs::metadata(&dir).await {
            Ok(_) => {
                let records = self.read_records(&dir, brand).await?;
                index_records(&records)
                    .resolve(id)
                    .map(|position| records[position].path.clone())
            }
            Err(_) if create_if_missing => {
                fs::create_dir_all(&dir)
                    .await
                    .with_context(|| format!("Failed to create {dir:?}"))?;
                None
            }
            Err(_) => return Ok(WriteOutcome::NotFound),
        };

        let content = serde_yaml::to_string(value).context("Failed to serialize record as YAML")?;

        match existing {
            Some(path) => {
                Self::write_atomic(&path, &content).await?;
                info!("Updated {} '{}' at {:?}", kind, id, path);
                Ok(WriteOutcome::Updated(path))
            }
            None if create_if_missing => {
                let path = dir.join(format!("{id}.yaml"));
                Self::write_atomic(&path, &content).await?;
                info!("Created {} '{}' at {:?}", kind, id, path);
                Ok(WriteOutcome::Created(path))
            }
            None => Ok(WriteOutcome::NotFound),
        }
    }

    /// Create the folder for a brand that exists in `brands/`
    async fn create_brand_dir(&self, kind: EntityKind, brand_id: &str) -> Result<Option<PathBuf>> {
        let brands = self.read_records(&self.kind_dir(EntityKind::Brand), None).await?;
        let Some(brand) = index_records(&brands).resolve(brand_id).map(|i| &brands[i]) else {
            return Ok(None);
        };

        let folder = brand.slug();
        if !super::is_safe_id(&folder) {
            return Ok(None);
        }

        let dir = self.kind_dir(kind).join(folder);
        fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to create {dir:?}"))?;
        Ok(Some(dir))
    }

    async fn write_atomic(path: &Path, content: &str) -> Result<()> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .context("Record path has no file name")?;
        let tmp = path.with_file_name(format!(".{file_name}.tmp"));

        fs::write(&tmp, content)
            .await
            .with_context(|| format!("Failed to write {tmp:?}"))?;
        fs::rename(&tmp, path)
            .await
            .with_context(|| format!("Failed to move {tmp:?} into place"))?;
        Ok(())
    }

    /// Delete the record matching `id`; returns false when nothing matched
    pub async fn delete(&self, kind: EntityKind, brand: Option<&str>, id: &str) -> Result<bool> {
        let Some(dir) = self.records_dir(kind, brand).await? else {
            return Ok(false);
        };

        let records = self.read_records(&dir, brand).await?;
        let Some(position) = index_records(&records).resolve(id) else {
            return Ok(false);
        };

        let path = &records[position].path;
        fs::remove_file(path)
            .await
            .with_context(|| format!("Failed to delete {path:?}"))?;
        info!("Deleted {} '{}' ({:?})", kind, id, path);
        Ok(true)
    }
}

#[async_trait]
impl CatalogSource for FsCatalog {
    async fn check_available(&self) -> Result<()> {
        let metadata = fs::metadata(&self.root)
            .await
            .with_context(|| format!("Catalog root {:?} is not accessible", self.root))?;
        if !metadata.is_dir() {
            anyhow::bail!("Catalog root {:?} is not a directory", self.root);
        }
        Ok(())
    }

    async fn list_brands(&self) -> Result<Vec<Brand>> {
        let records = self
            .read_records(&self.kind_dir(EntityKind::Brand), None)
            .await?;

        Ok(records
            .iter()
            .filter(|r| r.field("name").is_some() || r.field("slug").is_some())
            .map(|r| {
                let slug = r.slug();
                Brand {
                    name: r.field("name").unwrap_or_else(|| slug.clone()),
                    uuid: r.field("uuid"),
                    slug,
                }
            })
            .collect())
    }

    async fn list_materials(&self) -> Result<Vec<Material>> {
        let records = self.read_nested_records(EntityKind::Material).await?;

        Ok(records
            .iter()
            .filter(|r| r.field("name").is_some() || r.field("slug").is_some())
            .filter_map(|r| {
                let brand_slug = r
                    .brand_folder
                    .clone()
                    .or_else(|| r.nested_field("brand", "slug"))?;
                let slug = r.slug();
                Some(Material {
                    name: r.field("name").unwrap_or_else(|| slug.clone()),
                    slug,
                    brand_slug,
                    material_type: r.field("type"),
                    color: r.nested_field("primary_color", "color_rgba"),
                })
            })
            .collect())
    }

    async fn list_packages(&self) -> Result<Vec<Package>> {
        let records = self.read_nested_records(EntityKind::Package).await?;

        Ok(records
            .iter()
            .filter(|r| r.field("slug").is_some() || r.field("gtin").is_some())
            .filter_map(|r| {
                let brand_slug = r.brand_folder.clone()?;
                let gtin = r.field("gtin");
                let name = r
                    .field("slug")
                    .map(|s| s.replace('-', " "))
                    .or_else(|| gtin.clone())
                    .unwrap_or_else(|| "Unknown Package".to_string());
                Some(Package {
                    slug: r.slug(),
                    name,
                    brand_slug,
                    gtin,
                })
            })
            .collect())
    }

    async fn list_containers(&self) -> Result<Vec<Container>> {
        let records = self
            .read_records(&self.kind_dir(EntityKind::Container), None)
            .await?;

        Ok(records
            .iter()
            .filter(|r| r.field("name").is_some() || r.field("slug").is_some())
            .map(|r| {
                let slug = r.slug();
                Container {
                    name: r.field("name").unwrap_or_else(|| slug.clone()),
                    slug,
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn setup_catalog() -> (TempDir, FsCatalog) {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();

        write(root, "brands/prusament.yaml", "uuid: b-1\nslug: prusament\nname: Prusament\n");
        write(root, "brands/bambu.yml", "name: Bambu Lab\nslug: bambulab\n");
        write(root, "brands/broken.yaml", "name: [unclosed\n");
        write(
            root,
            "materials/prusament/galaxy-black.yaml",
            "slug: prusament-pla-galaxy-black\nname: Prusament PLA Galaxy Black\ntype: PLA\nprimary_color:\n  color_rgba: '#1a1a1aff'\n",
        );
        write(root, "materials/bambulab/basic-black.yaml", "name: Bambu PLA Basic Black\ntype: PLA\n");
        write(root, "materials/bambulab/notes.txt", "not yaml");
        write(root, "material-packages/prusament/pla-1kg.yaml", "slug: prusament-pla-1kg\ngtin: 8594173675001\n");
        write(root, "material-packages/prusament/gtin-only.yaml", "gtin: 8594173675002\n");
        write(root, "material-containers/spool-750g.yaml", "name: Spool 750g\n");

        let catalog = FsCatalog::new(root);
        (temp_dir, catalog)
    }

    #[tokio::test]
    async fn test_list_brands_skips_broken_files() {
        let (_temp, catalog) = setup_catalog();

        let brands = catalog.list_brands().await.unwrap();
        assert_eq!(brands.len(), 2);
        assert!(brands.iter().any(|b| b.slug == "bambulab" && b.name == "Bambu Lab"));
        assert!(brands.iter().any(|b| b.slug == "prusament" && b.uuid.as_deref() == Some("b-1")));
    }

    #[tokio::test]
    async fn test_list_materials_uses_folder_as_brand() {
        let (_temp, catalog) = setup_catalog();

        let materials = catalog.list_materials().await.unwrap();
        assert_eq!(materials.len(), 2);

        let galaxy = materials
            .iter()
            .find(|m| m.slug == "prusament-pla-galaxy-black")
            .unwrap();
        assert_eq!(galaxy.brand_slug, "prusament");
        assert_eq!(galaxy.material_type.as_deref(), Some("PLA"));
        assert_eq!(galaxy.color.as_deref(), Some("#1a1a1aff"));

        // Slug falls back to the file stem
        let basic = materials.iter().find(|m| m.brand_slug == "bambulab").unwrap();
        assert_eq!(basic.slug, "basic-black");
    }

    #[tokio::test]
    async fn test_package_names() {
        let (_temp, catalog) = setup_catalog();

        let packages = catalog.list_packages().await.unwrap();
        assert_eq!(packages.len(), 2);
        assert!(packages.iter().any(|p| p.name == "prusament pla 1kg"));
        assert!(packages.iter().any(|p| p.name == "8594173675002" && p.slug == "gtin-only"));
    }

    #[tokio::test]
    async fn test_missing_root_is_unavailable() {
        let temp_dir = TempDir::new().unwrap();
        let catalog = FsCatalog::new(temp_dir.path().join("missing"));

        assert!(catalog.check_available().await.is_err());
        assert!(catalog.list_containers().await.is_err());
    }

    #[tokio::test]
    async fn test_read_by_any_alias() {
        let (_temp, catalog) = setup_catalog();

        for id in ["b-1", "prusament"] {
            let brand = catalog.read(EntityKind::Brand, None, id).await.unwrap().unwrap();
            assert_eq!(brand["name"], "Prusament");
        }

        // Slugified name and file stem both resolve
        let bambu = catalog.read(EntityKind::Brand, None, "bambu-lab").await.unwrap();
        assert!(bambu.is_some());
        let bambu = catalog.read(EntityKind::Brand, None, "bambu").await.unwrap();
        assert!(bambu.is_some());

        assert!(catalog.read(EntityKind::Brand, None, "nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_brand_dir_resolves_through_brand_record() {
        let (_temp, catalog) = setup_catalog();

        // "bambu-lab" is the slugified brand name, the folder is the slug
        let dir = catalog
            .resolve_brand_dir(EntityKind::Material, "bambu-lab")
            .await
            .unwrap()
            .unwrap();
        assert!(dir.ends_with("materials/bambulab"));

        let material = catalog
            .read(EntityKind::Material, Some("bambu-lab"), "basic-black")
            .await
            .unwrap();
        assert!(material.is_some());
    }

    #[tokio::test]
    async fn test_write_update_create_delete() {
        let (_temp, catalog) = setup_catalog();

        let updated = catalog
            .write(
                EntityKind::Container,
                None,
                "spool-750g",
                &json!({ "name": "Spool 750 g", "slug": "spool-750g" }),
                false,
            )
            .await
            .unwrap();
        assert!(matches!(updated, WriteOutcome::Updated(_)));

        let missing = catalog
            .write(EntityKind::Container, None, "box", &json!({ "name": "Box" }), false)
            .await
            .unwrap();
        assert_eq!(missing, WriteOutcome::NotFound);

        let created = catalog
            .write(EntityKind::Container, None, "box", &json!({ "name": "Box" }), true)
            .await
            .unwrap();
        assert!(matches!(created, WriteOutcome::Created(_)));

        let containers = catalog.list_containers().await.unwrap();
        assert_eq!(containers.len(), 2);
        assert!(containers.iter().any(|c| c.name == "Spool 750 g"));

        assert!(catalog.delete(EntityKind::Container, None, "box").await.unwrap());
        assert!(!catalog.delete(EntityKind::Container, None, "box").await.unwrap());
    }

    #[tokio::test]
    async fn test_create_nested_for_new_brand_folder() {
        let (_temp, catalog) = setup_catalog();

        // bambulab has no package folder yet
        let created = catalog
            .write(
                EntityKind::Package,
                Some("bambulab"),
                "bambu-refill",
                &json!({ "slug": "bambu-refill" }),
                true,
            )
            .await
            .unwrap();
        assert!(created.is_written());

        let packages = catalog.list_packages().await.unwrap();
        assert!(packages.iter().any(|p| p.brand_slug == "bambulab" && p.slug == "bambu-refill"));

        // Unknown brands never get a folder
        let unknown = catalog
            .write(EntityKind::Package, Some("nobody"), "x", &json!({ "slug": "x" }), true)
            .await
            .unwrap();
        assert_eq!(unknown, WriteOutcome::NotFound);
    }

    #[tokio::test]
    async fn test_write_rejects_unsafe_ids() {
        let (_temp, catalog) = setup_catalog();

        let result = catalog
            .write(EntityKind::Brand, None, "../escape", &json!({ "name": "x" }), true)
            .await;
        assert!(result.is_err());
    }
}
