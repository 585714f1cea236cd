//! 类别目录 - class id 到可读名称的映射

use crate::core::error::{ExtractError, Result};
use std::collections::BTreeMap;

pub type ClassId = u32;

/// COCO ids the extractor labels out of the box.
const SUPPORTED_CLASSES: &[(ClassId, &str)] = &[
    (28, "suitcase"),
    (39, "bottle"),
    (62, "tv"),
    (63, "laptop"),
    (64, "mouse"),
    (66, "keyboard"),
    (67, "cell phone"),
    (72, "refrigerator"),
    (73, "book"),
];

/// Fixed mapping from class id to name. Read-only once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassCatalog {
    entries: BTreeMap<ClassId, String>,
}

impl ClassCatalog {
    /// Build a catalog from explicit entries. An empty catalog has no
    /// default target set, so it is rejected.
    pub fn from_entries<I, S>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (ClassId, S)>,
        S: Into<String>,
    {
        let entries: BTreeMap<ClassId, String> =
            entries.into_iter().map(|(id, name)| (id, name.into())).collect();
        if entries.is_empty() {
            return Err(ExtractError::Validation(
                "class catalog must not be empty".into(),
            ));
        }
        Ok(Self { entries })
    }

    pub fn name(&self, class_id: ClassId) -> Option<&str> {
        self.entries.get(&class_id).map(String::as_str)
    }

    pub fn contains(&self, class_id: ClassId) -> bool {
        self.entries.contains_key(&class_id)
    }

    /// All known ids, ascending.
    pub fn ids(&self) -> impl Iterator<Item = ClassId> + '_ {
        self.entries.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_map(&self) -> BTreeMap<ClassId, String> {
        self.entries.clone()
    }
}

impl Default for ClassCatalog {
    fn default() -> Self {
        Self {
            entries: SUPPORTED_CLASSES
                .iter()
                .map(|&(id, name)| (id, name.to_string()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_catalog() {
        let catalog = ClassCatalog::default();
        assert_eq!(catalog.len(), SUPPORTED_CLASSES.len());
        assert_eq!(catalog.name(67), Some("cell phone"));
        assert_eq!(catalog.name(99), None);
        assert!(catalog.contains(39));
    }

    #[test]
    fn test_ids_sorted_and_stable() {
        let a: Vec<_> = ClassCatalog::default().ids().collect();
        let b: Vec<_> = ClassCatalog::default().ids().collect();
        assert_eq!(a, b);
        assert!(a.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_empty_catalog_rejected() {
        let result = ClassCatalog::from_entries(Vec::<(ClassId, String)>::new());
        assert!(matches!(result, Err(ExtractError::Validation(_))));
    }

    #[test]
    fn test_custom_catalog() {
        let catalog = ClassCatalog::from_entries([(0, "person"), (2, "car")]).unwrap();
        assert_eq!(catalog.ids().collect::<Vec<_>>(), vec![0, 2]);
        assert_eq!(catalog.name(2), Some("car"));
    }
}
