use std::collections::HashMap;

use crate::limits::*;
use crate::model::*;

use super::EngineError;

/// Configured unit counts for one venue, kept in configuration order.
#[derive(Debug, Clone, Default)]
pub struct Inventory {
    categories: Vec<StationCategory>,
    index: HashMap<String, usize>,
}

impl Inventory {
    pub fn new(categories: Vec<StationCategory>) -> Result<Self, EngineError> {
        if categories.len() > MAX_CATEGORIES_PER_VENUE {
            return Err(EngineError::LimitExceeded("too many categories"));
        }
        let mut index = HashMap::with_capacity(categories.len());
        for (pos, category) in categories.iter().enumerate() {
            if category.total_units > MAX_UNITS_PER_CATEGORY {
                return Err(EngineError::LimitExceeded("too many units in category"));
            }
            if index.insert(category.id.clone(), pos).is_some() {
                return Err(EngineError::DuplicateCategory(category.id.clone()));
            }
        }
        Ok(Self { categories, index })
    }

    pub fn get(&self, category_id: &str) -> Option<&StationCategory> {
        self.index.get(category_id).map(|&pos| &self.categories[pos])
    }

    pub fn total_units(&self, category_id: &str) -> Option<u32> {
        self.get(category_id).map(|c| c.total_units)
    }

    pub fn categories(&self) -> &[StationCategory] {
        &self.categories
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }
}
