// Module declarations
pub mod alias;
pub mod fs;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug};

// Re-export public APIs
pub use alias::{AliasIndex, is_safe_id, slugify_name};
pub use fs::{FsCatalog, WriteOutcome};

/// Catalog entity kinds and their on-disk layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Brand,
    Material,
    Package,
    Container,
}

impl EntityKind {
    /// Directory name under the catalog root
    pub fn dir_name(&self) -> &'static str {
        match self {
            EntityKind::Brand => "brands",
            EntityKind::Material => "materials",
            EntityKind::Package => "material-packages",
            EntityKind::Container => "material-containers",
        }
    }

    /// Whether records live in per-brand sub-folders
    pub fn is_nested(&self) -> bool {
        matches!(self, EntityKind::Material | EntityKind::Package)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityKind::Brand => "brand",
            EntityKind::Material => "material",
            EntityKind::Package => "package",
            EntityKind::Container => "container",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Brand {
    pub slug: String,
    pub name: String,
    pub uuid: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Material {
    pub slug: String,
    pub name: String,
    pub brand_slug: String,
    pub material_type: Option<String>,
    pub color: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Package {
    pub slug: String,
    pub name: String,
    pub brand_slug: String,
    pub gtin: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Container {
    pub slug: String,
    pub name: String,
}

/// Read side of the catalog, as consumed by the search index
///
/// Listing calls return `Err` only when a whole source is unreadable.
/// Individual broken records are skipped by the implementation.
#[async_trait]
pub trait CatalogSource: Send + Sync + Debug {
    /// Fail when the catalog itself cannot be reached
    async fn check_available(&self) -> Result<()>;

    async fn list_brands(&self) -> Result<Vec<Brand>>;

    /// Materials across all brands
    async fn list_materials(&self) -> Result<Vec<Material>>;

    /// Packages across all brands
    async fn list_packages(&self) -> Result<Vec<Package>>;

    async fn list_containers(&self) -> Result<Vec<Container>>;
}
