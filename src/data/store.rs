//! Entity loading and the per-run entity store

use crate::data::entity::{Entity, TagSets};
use crate::data::tags::TagUniverse;
use anyhow::{Context, Result};
use memmap2::Mmap;
use std::collections::HashMap;
use std::fs::File;
use std::path::Path;
use thiserror::Error;

/// Problems found in individual records. These are reported and the offending
/// record or reference is skipped; they never abort a run.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DataError {
    #[error("record {index} has an empty id")]
    EmptyId { index: usize },

    #[error("record {index} reuses id {id:?}; keeping the first occurrence")]
    DuplicateId { id: String, index: usize },

    #[error("entity {entity:?} lists unknown friend {friend:?}")]
    UnknownFriend { entity: String, friend: String },

    #[error("node {index} has no entity in the store")]
    MissingNode { index: usize },
}

/// Owns every entity for the lifetime of a run
#[derive(Debug, Clone)]
pub struct EntityStore {
    entities: Vec<Entity>,
    universe: TagUniverse,
    tag_sets: Vec<TagSets>,

    /// Resolved friend indices per entity, unknown ids dropped
    friends: Vec<Vec<usize>>,

    issues: Vec<DataError>,
}

impl EntityStore {
    /// Load a JSON array of entity records from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        log::info!("Reading entity file: {}", path.display());

        if !path.exists() {
            return Err(anyhow::anyhow!("File not found: {}", path.display()));
        }

        let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
        let len = file.metadata()?.len();
        if len == 0 {
            return Err(anyhow::anyhow!("Input file is empty: {}", path.display()));
        }

        // SAFETY: the input is opened read-only and only read for the duration of parsing
        let mmap = unsafe { Mmap::map(&file) }
            .with_context(|| format!("mapping {}", path.display()))?;
        let records: Vec<Entity> = serde_json::from_slice(&mmap)
            .with_context(|| format!("parsing entity records in {}", path.display()))?;

        log::info!("Loaded {} entity records", records.len());

        Ok(Self::from_entities(records))
    }

    /// Build a store from already parsed records
    pub fn from_entities(records: Vec<Entity>) -> Self {
        let mut issues = Vec::new();
        let mut entities = Vec::with_capacity(records.len());
        let mut id_to_index = HashMap::with_capacity(records.len());

        for (index, entity) in records.into_iter().enumerate() {
            if entity.id.is_empty() {
                issues.push(DataError::EmptyId { index });
                continue;
            }
            if id_to_index.contains_key(&entity.id) {
                issues.push(DataError::DuplicateId { id: entity.id, index });
                continue;
            }
            id_to_index.insert(entity.id.clone(), entities.len());
            entities.push(entity);
        }

        let mut friends = Vec::with_capacity(entities.len());
        for entity in &entities {
            let mut resolved = Vec::with_capacity(entity.friends.len());
            for friend in &entity.friends {
                match id_to_index.get(friend) {
                    Some(&idx) => resolved.push(idx),
                    None => issues.push(DataError::UnknownFriend {
                        entity: entity.id.clone(),
                        friend: friend.clone(),
                    }),
                }
            }
            friends.push(resolved);
        }

        for issue in &issues {
            log::warn!("Data error: {}", issue);
        }

        let (universe, tag_sets) = TagUniverse::build(&entities);

        Self {
            entities,
            universe,
            tag_sets,
            friends,
            issues,
        }
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn universe(&self) -> &TagUniverse {
        &self.universe
    }

    pub fn tag_sets(&self, index: usize) -> &TagSets {
        &self.tag_sets[index]
    }

    /// Known friends of an entity, in declaration order
    pub fn friends_of(&self, index: usize) -> &[usize] {
        &self.friends[index]
    }

    pub fn issues(&self) -> &[DataError] {
        &self.issues
    }

    /// Look up the entity behind a graph node or cluster member
    pub fn resolve(&self, index: usize) -> Result<&Entity, DataError> {
        self.entities.get(index).ok_or(DataError::MissingNode { index })
    }

    /// Borrow the records for a list of member indices; unknown indices are reported and skipped
    pub fn members(&self, indices: &[usize]) -> Vec<&Entity> {
        indices
            .iter()
            .filter_map(|&index| match self.resolve(index) {
                Ok(entity) => Some(entity),
                Err(err) => {
                    log::warn!("Data error: {}", err);
                    None
                }
            })
            .collect()
    }
}
