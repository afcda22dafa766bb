//! Per-run category table.
//!
//! The table maps category names to [`CategoryId`]s and back, and refuses any
//! insertion that would make the mapping non-bijective. Readers that discover
//! category names as they go (VOC) and writers that need a dense class index
//! (YOLO) both go through it.

use std::collections::BTreeMap;

use super::ids::CategoryId;
use super::model::Category;

/// Why a category could not be added to a [`CategoryTable`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CategoryConflict {
    /// The name is already bound to a different id.
    NameTaken { name: String, existing: CategoryId },
    /// The id is already bound to a different name.
    IdTaken { id: CategoryId, existing: String },
}

impl std::fmt::Display for CategoryConflict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CategoryConflict::NameTaken { name, existing } => {
                write!(f, "category '{name}' is already bound to id {existing}")
            }
            CategoryConflict::IdTaken { id, existing } => {
                write!(f, "category id {id} is already bound to '{existing}'")
            }
        }
    }
}

/// Bijective name <-> id mapping, kept in insertion order.
#[derive(Clone, Debug, Default)]
pub struct CategoryTable {
    entries: Vec<Category>,
    by_name: BTreeMap<String, CategoryId>,
    by_id: BTreeMap<CategoryId, usize>,
}

impl CategoryTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a table from an ordered class list; ids start at 1.
    pub fn from_names<I, S>(names: I) -> Result<Self, CategoryConflict>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut table = Self::new();
        for name in names {
            let name = name.into();
            if let Some(existing) = table.id_of(&name) {
                return Err(CategoryConflict::NameTaken { name, existing });
            }
            table.intern(name);
        }
        Ok(table)
    }

    /// Builds a table from existing categories, keeping their ids.
    pub fn from_categories(categories: &[Category]) -> Result<Self, CategoryConflict> {
        let mut table = Self::new();
        for category in categories {
            table.insert(category.clone())?;
        }
        Ok(table)
    }

    /// Returns the id bound to `name`, assigning the next free id if the name
    /// is new.
    pub fn intern(&mut self, name: impl Into<String>) -> CategoryId {
        let name = name.into();
        if let Some(id) = self.by_name.get(&name) {
            return *id;
        }

        let next = self
            .by_id
            .keys()
            .next_back()
            .map(|id| id.as_u64() + 1)
            .unwrap_or(1);
        let id = CategoryId::new(next);
        self.push(Category::new(id, name));
        id
    }

    /// Adds a category with a fixed id.
    ///
    /// Re-inserting an identical (id, name) pair is a no-op.
    pub fn insert(&mut self, category: Category) -> Result<CategoryId, CategoryConflict> {
        if let Some(&existing) = self.by_name.get(&category.name) {
            if existing == category.id {
                return Ok(existing);
            }
            return Err(CategoryConflict::NameTaken {
                name: category.name,
                existing,
            });
        }

        if let Some(&index) = self.by_id.get(&category.id) {
            return Err(CategoryConflict::IdTaken {
                id: category.id,
                existing: self.entries[index].name.clone(),
            });
        }

        let id = category.id;
        self.push(category);
        Ok(id)
    }

    fn push(&mut self, category: Category) {
        self.by_name.insert(category.name.clone(), category.id);
        self.by_id.insert(category.id, self.entries.len());
        self.entries.push(category);
    }

    pub fn id_of(&self, name: &str) -> Option<CategoryId> {
        self.by_name.get(name).copied()
    }

    pub fn name_of(&self, id: CategoryId) -> Option<&str> {
        self.by_id
            .get(&id)
            .map(|&index| self.entries[index].name.as_str())
    }

    /// Zero-based class index: the position of `id` in ascending id order.
    pub fn class_index(&self, id: CategoryId) -> Option<usize> {
        self.by_id.keys().position(|candidate| *candidate == id)
    }

    /// Categories in ascending id order.
    pub fn sorted_by_id(&self) -> Vec<&Category> {
        self.by_id
            .values()
            .map(|&index| &self.entries[index])
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_categories(self) -> Vec<Category> {
        self.entries
    }
}
