/// File categorization by extension.
///
/// This module maps file extensions to category names (e.g., "Images", "Documents").
/// Each category name doubles as the name of the subfolder files are moved into.
///
/// # Examples
///
/// ```
/// use tidywatch::file_category::CategoryMap;
///
/// let map = CategoryMap::default();
/// assert_eq!(map.category_for("png"), "Images");
/// assert_eq!(map.category_for(".PDF"), "Documents");
/// assert_eq!(map.category_for("nope"), "Other");
/// ```
use crate::config::ConfigError;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::warn;

/// Category assigned to files whose extension is not mapped.
pub const DEFAULT_CATEGORY: &str = "Other";

/// Built-in category table, used when no configuration file provides one.
const BUILTIN_CATEGORIES: &[(&str, &[&str])] = &[
    ("Images", &["jpg", "jpeg", "png", "gif", "bmp", "tiff", "webp"]),
    ("Documents", &["pdf", "docx", "txt", "doc", "rtf", "odt"]),
    ("Videos", &["mp4", "mkv", "avi", "mov", "wmv", "flv", "webm"]),
    ("Audio", &["mp3", "wav", "flac", "aac", "ogg", "wma"]),
    ("Executables", &["exe", "msi", "deb", "dmg"]),
    ("Archives", &["zip", "rar", "7z", "tar", "gz", "bz2"]),
    ("Code", &["py", "js", "html", "css", "cpp", "java", "c"]),
    ("Spreadsheets", &["xlsx", "xls", "csv", "ods"]),
];

/// Returns the built-in category table as configuration rules.
pub fn builtin_rules() -> BTreeMap<String, Vec<String>> {
    BUILTIN_CATEGORIES
        .iter()
        .map(|(name, exts)| {
            (
                name.to_string(),
                exts.iter().map(|e| format!(".{}", e)).collect(),
            )
        })
        .collect()
}

/// Normalizes an extension for lookup: trims whitespace, strips leading dots
/// and lowercases.
///
/// ```
/// use tidywatch::file_category::normalize_extension;
///
/// assert_eq!(normalize_extension(" .JPG "), "jpg");
/// assert_eq!(normalize_extension("tar.gz"), "tar.gz");
/// ```
pub fn normalize_extension(ext: &str) -> String {
    ext.trim().trim_start_matches('.').to_lowercase()
}

/// Maps file extensions to category names.
///
/// Lookups are case-insensitive and accept extensions with or without
/// a leading dot. The map is read-only once built and is shared between
/// threads behind an `Arc`.
#[derive(Debug, Clone)]
pub struct CategoryMap {
    extension_map: HashMap<String, String>,
    categories: BTreeMap<String, Vec<String>>,
}

impl CategoryMap {
    /// Creates an empty map. Every lookup yields [`DEFAULT_CATEGORY`].
    pub fn empty() -> Self {
        Self {
            extension_map: HashMap::new(),
            categories: BTreeMap::new(),
        }
    }

    /// Builds a map from `category name -> extensions` rules.
    ///
    /// Categories are processed in name order; if an extension is listed under
    /// more than one category the first one keeps it.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ConfigInvalid` if a category name cannot be used
    /// as a directory name.
    pub fn from_rules(rules: &BTreeMap<String, Vec<String>>) -> Result<Self, ConfigError> {
        let mut map = Self::empty();
        for (category, extensions) in rules {
            validate_category_name(category)?;
            map.categories.entry(category.clone()).or_default();
            for ext in extensions {
                map.add_extension_mapping(ext, category);
            }
        }
        Ok(map)
    }

    /// Adds a file extension to category mapping.
    ///
    /// Returns `false` (and leaves the map unchanged) if the extension is empty
    /// or already mapped to another category.
    pub fn add_extension_mapping(&mut self, ext: &str, category: &str) -> bool {
        let key = normalize_extension(ext);
        if key.is_empty() {
            return false;
        }
        if let Some(existing) = self.extension_map.get(&key) {
            if existing != category {
                warn!(
                    extension = %key,
                    kept = %existing,
                    ignored = %category,
                    "extension listed under two categories"
                );
            }
            return false;
        }
        self.extension_map.insert(key.clone(), category.to_string());
        self.categories
            .entry(category.to_string())
            .or_default()
            .push(key);
        true
    }

    /// Maps a file extension to its category name.
    ///
    /// Never fails: unknown and empty extensions map to [`DEFAULT_CATEGORY`].
    ///
    /// ```
    /// use tidywatch::file_category::CategoryMap;
    ///
    /// let map = CategoryMap::default();
    /// assert_eq!(map.category_for("mp3"), "Audio");
    /// assert_eq!(map.category_for("MP3"), "Audio");
    /// assert_eq!(map.category_for(""), "Other");
    /// ```
    pub fn category_for(&self, ext: &str) -> &str {
        self.extension_map
            .get(&normalize_extension(ext))
            .map(String::as_str)
            .unwrap_or(DEFAULT_CATEGORY)
    }

    /// Maps a path to its category using the final extension of its file name.
    ///
    /// Files without an extension (including dotfiles such as `.bashrc`)
    /// map to [`DEFAULT_CATEGORY`].
    pub fn category_for_path(&self, path: &Path) -> &str {
        match path.extension() {
            Some(ext) => self.category_for(&ext.to_string_lossy()),
            None => DEFAULT_CATEGORY,
        }
    }

    /// Returns the configured category names in sorted order.
    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.categories.keys().map(String::as_str)
    }

    /// Returns the normalized extensions mapped to a category.
    pub fn extensions_for(&self, category: &str) -> &[String] {
        self.categories
            .get(category)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

impl Default for CategoryMap {
    fn default() -> Self {
        let mut map = Self::empty();
        for (category, extensions) in BUILTIN_CATEGORIES {
            for ext in *extensions {
                map.add_extension_mapping(ext, category);
            }
        }
        map
    }
}

/// Rejects names that cannot be used as a single directory component.
fn validate_category_name(name: &str) -> Result<(), ConfigError> {
    let trimmed = name.trim();
    if trimmed.is_empty()
        || trimmed == "."
        || trimmed == ".."
        || trimmed != name
        || name.contains(['/', '\\'])
    {
        return Err(ConfigError::ConfigInvalid(format!(
            "'{}' is not a valid category name",
            name
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_builtin_categories() {
        let map = CategoryMap::default();
        let names: Vec<_> = map.categories().collect();
        assert_eq!(
            names,
            vec![
                "Archives",
                "Audio",
                "Code",
                "Documents",
                "Executables",
                "Images",
                "Spreadsheets",
                "Videos"
            ]
        );
    }

    #[test]
    fn test_category_for_is_case_insensitive() {
        let map = CategoryMap::default();
        for category in map.categories().collect::<Vec<_>>() {
            for ext in map.extensions_for(category) {
                assert_eq!(map.category_for(ext), map.category_for(&ext.to_uppercase()));
                assert_eq!(map.category_for(ext), category);
            }
        }
    }

    #[test]
    fn test_leading_dot_is_ignored() {
        let map = CategoryMap::default();
        assert_eq!(map.category_for(".pdf"), "Documents");
        assert_eq!(map.category_for("pdf"), "Documents");
        assert_eq!(map.category_for("..pdf"), "Documents");
    }

    #[test]
    fn test_unmapped_extensions_default_to_other() {
        let map = CategoryMap::default();
        assert_eq!(map.category_for("xyz"), DEFAULT_CATEGORY);
        assert_eq!(map.category_for(""), DEFAULT_CATEGORY);
        assert_eq!(map.category_for("."), DEFAULT_CATEGORY);
        assert_eq!(map.category_for("   "), DEFAULT_CATEGORY);
    }

    #[test]
    fn test_category_for_path() {
        let map = CategoryMap::default();
        assert_eq!(map.category_for_path(&PathBuf::from("/x/report.PDF")), "Documents");
        assert_eq!(map.category_for_path(&PathBuf::from("backup.tar.gz")), "Archives");
        assert_eq!(map.category_for_path(&PathBuf::from("README")), DEFAULT_CATEGORY);
        assert_eq!(map.category_for_path(&PathBuf::from(".bashrc")), DEFAULT_CATEGORY);
    }

    #[test]
    fn test_from_rules_normalizes_extensions() {
        let mut rules = BTreeMap::new();
        rules.insert("Books".to_string(), vec![".EPUB".to_string(), "mobi".to_string()]);
        let map = CategoryMap::from_rules(&rules).unwrap();

        assert_eq!(map.category_for("epub"), "Books");
        assert_eq!(map.category_for(".Mobi"), "Books");
        assert_eq!(map.extensions_for("Books"), ["epub", "mobi"]);
        assert_eq!(map.category_for("pdf"), DEFAULT_CATEGORY);
    }

    #[test]
    fn test_duplicate_extension_first_category_wins() {
        let mut rules = BTreeMap::new();
        rules.insert("Zeta".to_string(), vec!["dat".to_string()]);
        rules.insert("Alpha".to_string(), vec![".DAT".to_string()]);
        let map = CategoryMap::from_rules(&rules).unwrap();

        assert_eq!(map.category_for("dat"), "Alpha");
        assert!(map.extensions_for("Zeta").is_empty());
    }

    #[test]
    fn test_invalid_category_names_rejected() {
        for bad in ["", "..", ".", "a/b", "a\\b", " padded "] {
            let mut rules = BTreeMap::new();
            rules.insert(bad.to_string(), vec!["x".to_string()]);
            assert!(CategoryMap::from_rules(&rules).is_err(), "accepted {:?}", bad);
        }
    }

    #[test]
    fn test_custom_mapping() {
        let mut map = CategoryMap::default();
        assert!(map.add_extension_mapping("custom", "Code"));
        assert!(!map.add_extension_mapping("CUSTOM", "Images"));
        assert!(!map.add_extension_mapping("", "Images"));
        assert_eq!(map.category_for("custom"), "Code");
    }

    #[test]
    fn test_builtin_rules_match_default_map() {
        let map = CategoryMap::from_rules(&builtin_rules()).unwrap();
        assert_eq!(map.category_for("docx"), "Documents");
        assert_eq!(map.category_for("7z"), "Archives");
        assert!(map.categories().any(|c| c == "Videos"));
        assert!(!map.categories().any(|c| c == "Fonts"));
    }
}
