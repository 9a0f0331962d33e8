use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of catalog entity a search result points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchResultType {
    Brand,
    Material,
    Package,
    Container,
}

impl SearchResultType {
    pub const ALL: [SearchResultType; 4] = [
        SearchResultType::Brand,
        SearchResultType::Material,
        SearchResultType::Package,
        SearchResultType::Container,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SearchResultType::Brand => "brand",
            SearchResultType::Material => "material",
            SearchResultType::Package => "package",
            SearchResultType::Container => "container",
        }
    }

    /// Parse a comma-separated list, dropping unknown entries
    pub fn parse_list(list: &str) -> Vec<SearchResultType> {
        list.split(',')
            .filter_map(|part| part.trim().parse().ok())
            .collect()
    }
}

impl fmt::Display for SearchResultType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SearchResultType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "brand" => Ok(SearchResultType::Brand),
            "material" => Ok(SearchResultType::Material),
            "package" => Ok(SearchResultType::Package),
            "container" => Ok(SearchResultType::Container),
            other => Err(anyhow::anyhow!("unknown result type '{other}'")),
        }
    }
}

/// One row of the search corpus
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    #[serde(rename = "type")]
    pub result_type: SearchResultType,
    pub slug: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand_slug: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub material_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default)]
    pub score: f64,
}

impl SearchResult {
    pub fn brand(slug: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(SearchResultType::Brand, slug, name)
    }

    pub fn container(slug: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(SearchResultType::Container, slug, name)
    }

    pub fn material(slug: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(SearchResultType::Material, slug, name)
    }

    pub fn package(slug: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(SearchResultType::Package, slug, name)
    }

    fn new(result_type: SearchResultType, slug: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            result_type,
            slug: slug.into(),
            name: name.into(),
            brand_slug: None,
            brand_name: None,
            material_type: None,
            color: None,
            score: 0.0,
        }
    }

    /// Attach the owning brand; slug and name always travel together
    pub fn with_brand(mut self, slug: impl Into<String>, name: impl Into<String>) -> Self {
        self.brand_slug = Some(slug.into());
        self.brand_name = Some(name.into());
        self
    }

    pub fn with_material_type(mut self, material_type: impl Into<String>) -> Self {
        self.material_type = Some(material_type.into());
        self
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }
}

/// Query-time filters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchFilters {
    /// Allowed result types. `None` allows everything, an empty list nothing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub types: Option<Vec<SearchResultType>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub material_type: Option<String>,
    /// Brand slug, compared case-insensitively
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
}

impl SearchFilters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_types(mut self, types: Vec<SearchResultType>) -> Self {
        self.types = Some(types);
        self
    }

    pub fn with_brand(mut self, brand: impl Into<String>) -> Self {
        self.brand = Some(brand.into());
        self
    }

    pub fn with_material_type(mut self, material_type: impl Into<String>) -> Self {
        self.material_type = Some(material_type.into());
        self
    }

    /// Build filters from raw request strings.
    ///
    /// Values are trimmed and blanks count as absent. `types` is a comma
    /// separated list; unknown entries are dropped.
    pub fn from_raw(types: Option<&str>, brand: Option<&str>, material_type: Option<&str>) -> Self {
        fn present<'a>(value: Option<&'a str>) -> Option<&'a str> {
            value.map(str::trim).filter(|v| !v.is_empty())
        }

        Self {
            types: present(types).map(SearchResultType::parse_list),
            material_type: present(material_type).map(str::to_string),
            brand: present(brand).map(str::to_string),
        }
    }

    /// Active brand filter, ignoring blank values
    pub fn brand_filter(&self) -> Option<&str> {
        self.brand.as_deref().map(str::trim).filter(|b| !b.is_empty())
    }

    /// Active material type filter, ignoring blank values
    pub fn material_type_filter(&self) -> Option<&str> {
        self.material_type
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
    }

    /// Check whether a result passes every active filter
    pub fn matches(&self, item: &SearchResult) -> bool {
        if let Some(types) = &self.types {
            if !types.contains(&item.result_type) {
                return false;
            }
        }

        // Non-material rows are not subject to the material type filter
        if let Some(material_type) = self.material_type_filter() {
            if item.result_type == SearchResultType::Material {
                let matches = item
                    .material_type
                    .as_deref()
                    .is_some_and(|mt| same_ignoring_case(mt, material_type));
                if !matches {
                    return false;
                }
            }
        }

        if let Some(brand) = self.brand_filter() {
            let owner = match item.result_type {
                SearchResultType::Brand => Some(item.slug.as_str()),
                _ => item.brand_slug.as_deref(),
            };
            return owner.is_some_and(|slug| same_ignoring_case(slug, brand));
        }

        true
    }
}

/// Unicode case-insensitive equality; accents still count
fn same_ignoring_case(a: &str, b: &str) -> bool {
    a == b || a.to_lowercase() == b.to_lowercase()
}
