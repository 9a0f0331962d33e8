use std::collections::HashMap;

use crate::search::tokenizer::fold;

/// Turn a display name into a kebab-case slug.
///
/// Returns `None` when nothing slug-worthy is left.
pub fn slugify_name(input: &str) -> Option<String> {
    let folded = fold(input);

    let mut slug = String::with_capacity(folded.len());
    let mut pending_dash = false;
    for c in folded.trim().chars() {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c);
        } else if c.is_whitespace() || c == '-' {
            pending_dash = true;
        }
    }

    if slug.is_empty() { None } else { Some(slug) }
}

/// Ids become file names, so they may not escape their directory
pub fn is_safe_id(id: &str) -> bool {
    !id.is_empty()
        && id != "."
        && !id.contains("..")
        && !id.contains(['/', '\\', '\0'])
}

/// Multi-key lookup built from one directory scan.
///
/// Every record registers all of its aliases (uuid, slug, file stem,
/// slugified name). The first record to claim an alias keeps it.
#[derive(Debug, Default, Clone)]
pub struct AliasIndex {
    aliases: HashMap<String, usize>,
}

impl AliasIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register aliases for the record at `position`
    pub fn insert<I, S>(&mut self, position: usize, aliases: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for alias in aliases {
            let alias = alias.into();
            if alias.is_empty() {
                continue;
            }
            self.aliases.entry(alias).or_insert(position);
        }
    }

    pub fn resolve(&self, id: &str) -> Option<usize> {
        self.aliases.get(id).copied()
    }

    pub fn len(&self) -> usize {
        self.aliases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify_name() {
        assert_eq!(
            slugify_name("Prusament PLA Galaxy Black"),
            Some("prusament-pla-galaxy-black".to_string())
        );
        assert_eq!(slugify_name("Žlutá  --  barva"), Some("zluta-barva".to_string()));
        assert_eq!(slugify_name("PLA+ (Pro)"), Some("pla-pro".to_string()));
        assert_eq!(slugify_name("  Bambu_Lab "), Some("bambulab".to_string()));
        assert_eq!(slugify_name("!!!"), None);
        assert_eq!(slugify_name(""), None);
    }

    #[test]
    fn test_safe_ids() {
        assert!(is_safe_id("prusament"));
        assert!(is_safe_id("pla-basic-black"));
        assert!(!is_safe_id(""));
        assert!(!is_safe_id("../brands"));
        assert!(!is_safe_id("a/b"));
        assert!(!is_safe_id("a\\b"));
    }

    #[test]
    fn test_first_record_keeps_alias() {
        let mut index = AliasIndex::new();
        index.insert(0, ["uuid-1", "prusament", "prusament"]);
        index.insert(1, ["uuid-2", "prusament", "prusa-research"]);

        assert_eq!(index.resolve("prusament"), Some(0));
        assert_eq!(index.resolve("uuid-2"), Some(1));
        assert_eq!(index.resolve("prusa-research"), Some(1));
        assert_eq!(index.resolve("unknown"), None);
        assert_eq!(index.len(), 4);
    }
}
