//! One-hot feature vectors built from categorical attributes

use crate::config::FeatureConfig;
use crate::data::{AttributeGroup, EntityStore};
use ndarray::Array2;
use rayon::prelude::*;
use serde::Serialize;

/// Frozen coordinate layout shared by every vector in a run.
///
/// Coordinates are laid out as `[friend buckets] + languages + specializations + [gender]`,
/// with the optional blocks present only when enabled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeatureSchema {
    pub friend_buckets: Option<usize>,
    pub languages: Vec<String>,
    pub specializations: Vec<String>,
    pub gender: bool,
}

impl FeatureSchema {
    /// Freeze the layout from the store's tag universe
    pub fn from_store(store: &EntityStore, config: &FeatureConfig) -> Self {
        let universe = store.universe();
        Self {
            friend_buckets: config.friend_buckets,
            languages: universe.tags(AttributeGroup::Languages).to_vec(),
            specializations: universe.tags(AttributeGroup::Specializations).to_vec(),
            gender: config.gender,
        }
    }

    pub fn dimension(&self) -> usize {
        self.friend_buckets.unwrap_or(0)
            + self.languages.len()
            + self.specializations.len()
            + usize::from(self.gender)
    }

    fn group_offset(&self, group: AttributeGroup) -> usize {
        let base = self.friend_buckets.unwrap_or(0);
        match group {
            AttributeGroup::Languages => base,
            AttributeGroup::Specializations => base + self.languages.len(),
        }
    }

    /// Human-readable name of every coordinate
    pub fn labels(&self) -> Vec<String> {
        let mut labels = Vec::with_capacity(self.dimension());
        if let Some(buckets) = self.friend_buckets {
            labels.extend((0..buckets).map(|b| format!("friends:{}", b)));
        }
        labels.extend(self.languages.iter().map(|l| format!("language:{}", l)));
        labels.extend(self.specializations.iter().map(|s| format!("specialization:{}", s)));
        if self.gender {
            labels.push("gender:female".to_string());
        }
        labels
    }
}

/// 32-bit polynomial string hash (base 31 over UTF-16 code units)
pub fn string_hash(value: &str) -> i32 {
    value
        .encode_utf16()
        .fold(0i32, |hash, unit| hash.wrapping_mul(31).wrapping_add(unit as i32))
}

/// Bucket a friend id into one of `buckets` slots
pub fn friend_bucket(friend: &str, buckets: usize) -> usize {
    (string_hash(friend).unsigned_abs() as usize) % buckets
}

/// Encodes entities against a frozen schema
pub struct FeatureVectorizer {
    schema: FeatureSchema,
}

impl FeatureVectorizer {
    pub fn new(schema: FeatureSchema) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    /// Vector of one entity
    pub fn encode(&self, store: &EntityStore, index: usize) -> Vec<f64> {
        let mut vector = vec![0.0; self.schema.dimension()];
        let entity = &store.entities()[index];

        if let Some(buckets) = self.schema.friend_buckets {
            for friend in &entity.friends {
                vector[friend_bucket(friend, buckets)] = 1.0;
            }
        }

        let sets = store.tag_sets(index);
        for group in AttributeGroup::ALL {
            let offset = self.schema.group_offset(group);
            for &tag in sets.get(group) {
                vector[offset + tag as usize] = 1.0;
            }
        }

        if self.schema.gender && entity.is_female() {
            if let Some(last) = vector.last_mut() {
                *last = 1.0;
            }
        }

        vector
    }

    /// Encode every entity into the rows of a matrix
    pub fn vectorize(&self, store: &EntityStore) -> Array2<f64> {
        let dimension = self.schema.dimension();
        log::info!(
            "Vectorizing {} entities into {} dimensions",
            store.len(),
            dimension
        );

        let rows: Vec<Vec<f64>> = (0..store.len())
            .into_par_iter()
            .map(|index| self.encode(store, index))
            .collect();

        let mut matrix = Array2::zeros((rows.len(), dimension));
        for (mut target, row) in matrix.outer_iter_mut().zip(rows) {
            for (slot, value) in target.iter_mut().zip(row) {
                *slot = value;
            }
        }
        matrix
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Entity;
    use proptest::prelude::*;

    fn store() -> EntityStore {
        EntityStore::from_entities(vec![
            Entity::new("a", &["EN", "FR"], &["AI"]).with_gender("Female"),
            Entity::new("b", &["DE"], &["Web", "AI"]).with_friends(&["a"]),
            Entity::new("c", &[], &[]),
        ])
    }

    #[test]
    fn one_hot_layout() {
        let store = store();
        let schema = FeatureSchema::from_store(&store, &FeatureConfig::default());
        assert_eq!(schema.dimension(), 5);
        assert_eq!(
            schema.labels(),
            vec!["language:EN", "language:FR", "language:DE", "specialization:AI", "specialization:Web"]
        );

        let matrix = FeatureVectorizer::new(schema).vectorize(&store);
        assert_eq!(matrix.shape(), &[3, 5]);
        assert_eq!(matrix.row(0).to_vec(), vec![1.0, 1.0, 0.0, 1.0, 0.0]);
        assert_eq!(matrix.row(1).to_vec(), vec![0.0, 0.0, 1.0, 1.0, 1.0]);
        assert_eq!(matrix.row(2).to_vec(), vec![0.0; 5]);
    }

    #[test]
    fn optional_blocks_wrap_the_tag_blocks() {
        let store = store();
        let config = FeatureConfig { friend_buckets: Some(5), gender: true };
        let schema = FeatureSchema::from_store(&store, &config);
        assert_eq!(schema.dimension(), 11);

        let vectorizer = FeatureVectorizer::new(schema);
        let a = vectorizer.encode(&store, 0);
        assert_eq!(a[10], 1.0);
        assert_eq!(&a[..5], &[0.0; 5]);

        let b = vectorizer.encode(&store, 1);
        assert_eq!(b[10], 0.0);
        assert_eq!(b[..5].iter().sum::<f64>(), 1.0);
        assert_eq!(b[friend_bucket("a", 5)], 1.0);
    }

    #[test]
    fn string_hash_matches_polynomial_hash() {
        assert_eq!(string_hash(""), 0);
        assert_eq!(string_hash("a"), 97);
        assert_eq!(string_hash("ab"), 97 * 31 + 98);
        // Overflow wraps like 32-bit integer arithmetic
        assert_eq!(string_hash("polygenelubricants"), i32::MIN);
        assert_eq!(friend_bucket("polygenelubricants", 5), (2147483648usize) % 5);
    }

    proptest! {
        #[test]
        fn every_vector_has_the_schema_dimension(
            tags in prop::collection::vec(
                (prop::collection::vec("[a-e]", 0..4), prop::collection::vec("[v-z]", 0..3)),
                1..20,
            )
        ) {
            let entities: Vec<Entity> = tags
                .iter()
                .enumerate()
                .map(|(i, (langs, specs))| {
                    let langs: Vec<&str> = langs.iter().map(String::as_str).collect();
                    let specs: Vec<&str> = specs.iter().map(String::as_str).collect();
                    Entity::new(format!("s{}", i), &langs, &specs)
                })
                .collect();
            let store = EntityStore::from_entities(entities);
            let schema = FeatureSchema::from_store(&store, &FeatureConfig::default());
            let dimension = schema.dimension();
            let vectorizer = FeatureVectorizer::new(schema);
            let matrix = vectorizer.vectorize(&store);

            prop_assert_eq!(matrix.ncols(), dimension);
            for index in 0..store.len() {
                let row = matrix.row(index).to_vec();
                prop_assert_eq!(&row, &vectorizer.encode(&store, index));
                let expected = store.tag_sets(index).get(AttributeGroup::Languages).len()
                    + store.tag_sets(index).get(AttributeGroup::Specializations).len();
                prop_assert_eq!(row.iter().sum::<f64>() as usize, expected);
            }
        }
    }
}
