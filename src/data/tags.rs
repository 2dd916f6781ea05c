//! Frozen tag universe shared by the graph builder and the vectorizer

use crate::data::entity::{AttributeGroup, Entity, TagSets};
use serde::Serialize;
use std::collections::HashMap;

/// Distinct tags of one attribute group in first-seen order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
struct GroupTags {
    tags: Vec<String>,

    #[serde(skip)]
    index: HashMap<String, u32>,
}

impl GroupTags {
    fn intern(&mut self, tag: &str) -> u32 {
        if let Some(&idx) = self.index.get(tag) {
            return idx;
        }
        let idx = self.tags.len() as u32;
        self.index.insert(tag.to_string(), idx);
        self.tags.push(tag.to_string());
        idx
    }
}

/// Ordered tag lists for every attribute group.
///
/// Built once from the whole population and never mutated afterwards, so every
/// vector and every edge computed in a run shares the same coordinate space.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TagUniverse {
    languages: GroupTags,
    specializations: GroupTags,
}

impl TagUniverse {
    /// Scan the population and intern every tag, returning per-entity tag sets
    pub fn build(entities: &[Entity]) -> (Self, Vec<TagSets>) {
        let mut universe = TagUniverse::default();
        let mut tag_sets = Vec::with_capacity(entities.len());

        for entity in entities {
            let mut sets = TagSets::default();
            for group in AttributeGroup::ALL {
                let ids = group
                    .tags(entity)
                    .iter()
                    .map(|tag| universe.group_mut(group).intern(tag))
                    .collect();
                sets.set(group, ids);
            }
            tag_sets.push(sets);
        }

        log::debug!(
            "Tag universe: {} languages, {} specializations",
            universe.languages.tags.len(),
            universe.specializations.tags.len()
        );

        (universe, tag_sets)
    }

    fn group(&self, group: AttributeGroup) -> &GroupTags {
        match group {
            AttributeGroup::Languages => &self.languages,
            AttributeGroup::Specializations => &self.specializations,
        }
    }

    fn group_mut(&mut self, group: AttributeGroup) -> &mut GroupTags {
        match group {
            AttributeGroup::Languages => &mut self.languages,
            AttributeGroup::Specializations => &mut self.specializations,
        }
    }

    pub fn tags(&self, group: AttributeGroup) -> &[String] {
        &self.group(group).tags
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_keep_first_seen_order() {
        let entities = vec![
            Entity::new("a", &["FR", "EN"], &["AI"]),
            Entity::new("b", &["DE", "FR"], &["Web", "AI"]),
        ];
        let (universe, sets) = TagUniverse::build(&entities);

        assert_eq!(universe.tags(AttributeGroup::Languages), ["FR", "EN", "DE"]);
        assert_eq!(universe.tags(AttributeGroup::Specializations), ["AI", "Web"]);

        assert_eq!(sets[0].get(AttributeGroup::Languages), &[0, 1]);
        assert_eq!(sets[1].get(AttributeGroup::Languages), &[0, 2]);
    }

    #[test]
    fn duplicate_tags_collapse() {
        let entities = vec![Entity::new("a", &["EN", "EN"], &[])];
        let (universe, sets) = TagUniverse::build(&entities);
        assert_eq!(universe.tags(AttributeGroup::Languages), ["EN"]);
        assert_eq!(sets[0].get(AttributeGroup::Languages), &[0]);
    }
}
