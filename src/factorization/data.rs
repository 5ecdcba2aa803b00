use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::config::{ImplicitConfig, RatingScale};
use crate::models::{FeedbackEvent, InteractionEvent};

/// Dense index over external ids, in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<i64>", into = "Vec<i64>")]
pub struct IdIndex {
    ids: Vec<i64>,
    positions: HashMap<i64, usize>,
}

impl IdIndex {
    pub fn insert(&mut self, id: i64) -> usize {
        if let Some(&pos) = self.positions.get(&id) {
            return pos;
        }
        let pos = self.ids.len();
        self.ids.push(id);
        self.positions.insert(id, pos);
        pos
    }

    pub fn get(&self, id: i64) -> Option<usize> {
        self.positions.get(&id).copied()
    }

    pub fn id(&self, pos: usize) -> i64 {
        self.ids[pos]
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl From<Vec<i64>> for IdIndex {
    fn from(ids: Vec<i64>) -> Self {
        let mut index = IdIndex::default();
        for id in ids {
            index.insert(id);
        }
        index
    }
}

impl From<IdIndex> for Vec<i64> {
    fn from(index: IdIndex) -> Self {
        index.ids
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rating {
    pub user_id: i64,
    pub article_id: i64,
    pub value: f64,
}

/// One explicit rating per (user, article): the highest any event implies.
pub fn build_ratings(
    interactions: &[InteractionEvent],
    feedback: &[FeedbackEvent],
    scale: &RatingScale,
) -> Vec<Rating> {
    let mut best: BTreeMap<(i64, i64), f64> = BTreeMap::new();
    let observed = interactions
        .iter()
        .map(|e| (e.user_id, e.article_id, scale.interaction(e.kind)))
        .chain(
            feedback
                .iter()
                .map(|f| (f.user_id, f.article_id, scale.feedback(f.feedback_type))),
        );
    for (user_id, article_id, value) in observed {
        best.entry((user_id, article_id))
            .and_modify(|v| *v = v.max(value))
            .or_insert(value);
    }

    best.into_iter()
        .map(|((user_id, article_id), value)| Rating {
            user_id,
            article_id,
            value,
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImplicitEntry {
    pub user_id: i64,
    pub article_id: i64,
    pub weight: f64,
}

/// Summed implicit weight per (user, article): event counts for the
/// configured actions plus signed feedback weights.
pub fn build_implicit(
    interactions: &[InteractionEvent],
    feedback: &[FeedbackEvent],
    config: &ImplicitConfig,
) -> Vec<ImplicitEntry> {
    let mut weights: BTreeMap<(i64, i64), f64> = BTreeMap::new();
    for event in interactions.iter().filter(|e| config.actions.contains(&e.kind)) {
        *weights.entry((event.user_id, event.article_id)).or_default() += config.interaction;
    }
    for event in feedback {
        *weights.entry((event.user_id, event.article_id)).or_default() +=
            config.feedback(event.feedback_type);
    }

    weights
        .into_iter()
        .map(|((user_id, article_id), weight)| ImplicitEntry {
            user_id,
            article_id,
            weight,
        })
        .collect()
}
