//! Entity records as they appear in the input file

use serde::{Deserialize, Serialize};

/// Categorical preferences attached to an entity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityOptions {
    #[serde(default)]
    pub languages: Vec<String>,

    #[serde(default)]
    pub specialization: Vec<String>,
}

/// A single student record. Immutable once loaded into an `EntityStore`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,

    /// Ids of the entities this one asked to be grouped with, in declaration order
    #[serde(default)]
    pub friends: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,

    #[serde(default)]
    pub options: EntityOptions,
}

impl Entity {
    /// Convenience constructor used by tests and fixtures
    pub fn new(id: impl Into<String>, languages: &[&str], specialization: &[&str]) -> Self {
        Self {
            id: id.into(),
            friends: Vec::new(),
            gender: None,
            options: EntityOptions {
                languages: languages.iter().map(|s| s.to_string()).collect(),
                specialization: specialization.iter().map(|s| s.to_string()).collect(),
            },
        }
    }

    pub fn with_friends(mut self, friends: &[&str]) -> Self {
        self.friends = friends.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_gender(mut self, gender: &str) -> Self {
        self.gender = Some(gender.to_string());
        self
    }

    pub fn is_female(&self) -> bool {
        self.gender.as_deref() == Some("Female")
    }
}

/// Attribute groups that carry tag sets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AttributeGroup {
    Languages,
    Specializations,
}

impl AttributeGroup {
    /// Fixed group order used for vector layout and iteration
    pub const ALL: [AttributeGroup; 2] = [AttributeGroup::Languages, AttributeGroup::Specializations];

    pub fn tags<'a>(&self, entity: &'a Entity) -> &'a [String] {
        match self {
            AttributeGroup::Languages => &entity.options.languages,
            AttributeGroup::Specializations => &entity.options.specialization,
        }
    }

    fn slot(&self) -> usize {
        match self {
            AttributeGroup::Languages => 0,
            AttributeGroup::Specializations => 1,
        }
    }
}

/// Interned tag ids of one entity, sorted and deduplicated per group
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagSets {
    groups: [Vec<u32>; 2],
}

impl TagSets {
    pub fn get(&self, group: AttributeGroup) -> &[u32] {
        &self.groups[group.slot()]
    }

    pub(crate) fn set(&mut self, group: AttributeGroup, mut ids: Vec<u32>) {
        ids.sort_unstable();
        ids.dedup();
        self.groups[group.slot()] = ids;
    }
}

/// Size of the intersection of two sorted id lists
pub fn intersection_size(a: &[u32], b: &[u32]) -> usize {
    let (mut i, mut j, mut count) = (0, 0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                count += 1;
                i += 1;
                j += 1;
            }
        }
    }
    count
}
