use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// The canonical stored representation of one food product, keyed by its
/// barcode (EAN/UPC). This is the shape every source record is transformed
/// into before it is written to the database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    /// Natural external identifier. Unique-constrained in the target table.
    pub barcode: String,
    pub name: String,
    pub brand: Option<String>,
    pub lang: String,
    /// Upstream modification time, when the source provides one.
    pub last_modified: Option<DateTime<Utc>>,
    pub nutriscore_grade: Option<String>,
    pub nutriscore_score: Option<i32>,
    /// Raw quantity text as published (e.g. "330 ml").
    pub quantity_raw: Option<String>,
    pub nutrition: Option<Nutrition>,
    /// Taxonomy tags (e.g. "en:palm-oil"), in declared order. The order is
    /// the ingredient rank on the label.
    pub ingredient_tags: Vec<String>,
    /// Allergens the product contains.
    pub allergen_tags: Vec<String>,
    /// Allergens the product may contain (cross-contamination traces).
    pub trace_tags: Vec<String>,
}

impl ProductRecord {
    /// Checks the fields the target schema requires to be present.
    ///
    /// Source records are untrusted; a record that fails here is counted as
    /// skipped by the import engine rather than aborting the batch.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.barcode.trim().is_empty() {
            return Err(CoreError::InvalidInput(
                "barcode".to_string(),
                "must not be empty".to_string(),
            ));
        }
        if self.name.trim().is_empty() {
            return Err(CoreError::InvalidInput(
                "name".to_string(),
                "must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Per-100g/ml nutrition values, as published by the source feed.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Nutrition {
    pub fat_100g: Option<Decimal>,
    pub saturated_fat_100g: Option<Decimal>,
    pub carbohydrates_100g: Option<Decimal>,
    pub sugars_100g: Option<Decimal>,
    pub fiber_100g: Option<Decimal>,
    pub proteins_100g: Option<Decimal>,
    pub salt_100g: Option<Decimal>,
}

impl Nutrition {
    /// True when no value is present at all. The importer stores no nutrition
    /// row for such records.
    pub fn is_empty(&self) -> bool {
        self.fat_100g.is_none()
            && self.saturated_fat_100g.is_none()
            && self.carbohydrates_100g.is_none()
            && self.sugars_100g.is_none()
            && self.fiber_100g.is_none()
            && self.proteins_100g.is_none()
            && self.salt_100g.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(barcode: &str, name: &str) -> ProductRecord {
        ProductRecord {
            barcode: barcode.to_string(),
            name: name.to_string(),
            brand: None,
            lang: "en".to_string(),
            last_modified: None,
            nutriscore_grade: None,
            nutriscore_score: None,
            quantity_raw: None,
            nutrition: None,
            ingredient_tags: Vec::new(),
            allergen_tags: Vec::new(),
            trace_tags: Vec::new(),
        }
    }

    #[test]
    fn validate_accepts_complete_record() {
        assert!(record("3017620422003", "Nutella").validate().is_ok());
    }

    #[test]
    fn validate_rejects_empty_barcode() {
        assert!(record("", "Nutella").validate().is_err());
        assert!(record("   ", "Nutella").validate().is_err());
    }

    #[test]
    fn validate_rejects_empty_name() {
        assert!(record("3017620422003", "").validate().is_err());
    }

    #[test]
    fn nutrition_emptiness() {
        assert!(Nutrition::default().is_empty());
        let n = Nutrition {
            fat_100g: Some(Decimal::new(107, 1)),
            ..Nutrition::default()
        };
        assert!(!n.is_empty());
    }
}
