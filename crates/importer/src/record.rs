use chrono::{DateTime, TimeZone, Utc};
use core_types::{CoreError, Nutrition, ProductRecord};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde_json::Value;
use thiserror::Error;

/// Why a single source line was skipped. Never fatal to the run; the engine
/// counts these and moves on.
#[derive(Error, Debug)]
pub enum RecordError {
    #[error("malformed JSON: {0}")]
    Malformed(String),

    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("invalid record: {0}")]
    Invalid(#[from] CoreError),
}

/// Transforms one JSONL line from the product dump into the canonical record.
///
/// Field names follow the Open Food Facts export: `code`, `product_name`,
/// `brands`, `lang`, `last_modified_t`, `quantity`, `nutriments` and the
/// nutri-score pair, preferring the 2023 recomputation when present.
pub fn parse_line(line: &str) -> Result<ProductRecord, RecordError> {
    let value: Value =
        serde_json::from_str(line).map_err(|e| RecordError::Malformed(e.to_string()))?;

    let barcode = str_field(&value, "code").ok_or(RecordError::MissingField("code"))?;
    let name =
        str_field(&value, "product_name").ok_or(RecordError::MissingField("product_name"))?;

    let record = ProductRecord {
        barcode,
        name,
        brand: opt_str_field(&value, "brands"),
        lang: str_field(&value, "lang").unwrap_or_else(|| "en".to_string()),
        last_modified: value
            .get("last_modified_t")
            .and_then(Value::as_i64)
            .and_then(unix_timestamp),
        nutriscore_grade: opt_str_field(&value, "nutriscore_2023_grade")
            .or_else(|| opt_str_field(&value, "nutriscore_grade")),
        nutriscore_score: value
            .get("nutriscore_2023_score")
            .or_else(|| value.get("nutriscore_score"))
            .and_then(Value::as_i64)
            .and_then(|n| i32::try_from(n).ok()),
        quantity_raw: opt_str_field(&value, "quantity"),
        nutrition: parse_nutriments(value.get("nutriments")),
        ingredient_tags: tag_list(&value, "ingredients_tags"),
        allergen_tags: tag_list(&value, "allergens_tags"),
        trace_tags: tag_list(&value, "traces_tags"),
    };

    record.validate()?;
    Ok(record)
}

fn parse_nutriments(nutriments: Option<&Value>) -> Option<Nutrition> {
    let n = nutriments?;
    let nutrition = Nutrition {
        fat_100g: decimal_field(n, "fat_100g"),
        saturated_fat_100g: decimal_field(n, "saturated-fat_100g"),
        carbohydrates_100g: decimal_field(n, "carbohydrates_100g"),
        sugars_100g: decimal_field(n, "sugars_100g"),
        fiber_100g: decimal_field(n, "fiber_100g"),
        proteins_100g: decimal_field(n, "proteins_100g"),
        salt_100g: decimal_field(n, "salt_100g"),
    };
    if nutrition.is_empty() {
        None
    } else {
        Some(nutrition)
    }
}

/// String field, trimmed; present-but-empty is kept so `validate` can reject
/// it with a precise reason.
fn str_field(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
}

/// String field that treats empty as absent (optional columns).
fn opt_str_field(value: &Value, key: &str) -> Option<String> {
    str_field(value, key).filter(|s| !s.is_empty())
}

/// Taxonomy tag array, in source order; non-string and empty entries are
/// dropped.
fn tag_list(value: &Value, key: &str) -> Vec<String> {
    value
        .get(key)
        .and_then(Value::as_array)
        .map(|tags| {
            tags.iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn decimal_field(value: &Value, key: &str) -> Option<Decimal> {
    value
        .get(key)
        .and_then(Value::as_f64)
        .and_then(Decimal::from_f64)
}

fn unix_timestamp(secs: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(secs, 0).single()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_complete_product_line() {
        let line = r#"{
            "code": "3017620422003",
            "product_name": "Nutella",
            "brands": "Ferrero",
            "lang": "fr",
            "last_modified_t": 1700000000,
            "quantity": "400 g",
            "nutriscore_grade": "e",
            "nutriscore_score": 26,
            "nutriments": {
                "fat_100g": 30.9,
                "saturated-fat_100g": 10.6,
                "carbohydrates_100g": 57.5,
                "sugars_100g": 56.3,
                "proteins_100g": 6.3,
                "salt_100g": 0.107
            }
        }"#;

        let record = parse_line(line).unwrap();
        assert_eq!(record.barcode, "3017620422003");
        assert_eq!(record.name, "Nutella");
        assert_eq!(record.brand.as_deref(), Some("Ferrero"));
        assert_eq!(record.lang, "fr");
        assert_eq!(record.nutriscore_grade.as_deref(), Some("e"));
        assert_eq!(record.nutriscore_score, Some(26));
        assert_eq!(record.quantity_raw.as_deref(), Some("400 g"));
        assert_eq!(
            record.last_modified,
            Utc.timestamp_opt(1_700_000_000, 0).single()
        );

        let nutrition = record.nutrition.unwrap();
        assert_eq!(nutrition.fat_100g, Decimal::from_f64(30.9));
        assert_eq!(nutrition.salt_100g, Decimal::from_f64(0.107));
        assert!(nutrition.fiber_100g.is_none());
    }

    #[test]
    fn extracts_taxonomy_tags_in_source_order() {
        let line = r#"{
            "code": "1", "product_name": "Spread",
            "ingredients_tags": ["en:sugar", "en:palm-oil", "", "en:hazelnut"],
            "allergens_tags": ["en:nuts", "en:milk"],
            "traces_tags": ["en:gluten", 42]
        }"#;
        let record = parse_line(line).unwrap();
        assert_eq!(
            record.ingredient_tags,
            vec!["en:sugar", "en:palm-oil", "en:hazelnut"]
        );
        assert_eq!(record.allergen_tags, vec!["en:nuts", "en:milk"]);
        assert_eq!(record.trace_tags, vec!["en:gluten"]);
    }

    #[test]
    fn absent_tag_arrays_yield_empty_lists() {
        let record = parse_line(r#"{"code": "1", "product_name": "Thing"}"#).unwrap();
        assert!(record.ingredient_tags.is_empty());
        assert!(record.allergen_tags.is_empty());
        assert!(record.trace_tags.is_empty());
    }

    #[test]
    fn prefers_2023_nutriscore_when_present() {
        let line = r#"{
            "code": "1", "product_name": "Thing",
            "nutriscore_grade": "c", "nutriscore_score": 5,
            "nutriscore_2023_grade": "b", "nutriscore_2023_score": 2
        }"#;
        let record = parse_line(line).unwrap();
        assert_eq!(record.nutriscore_grade.as_deref(), Some("b"));
        assert_eq!(record.nutriscore_score, Some(2));
    }

    #[test]
    fn malformed_json_is_rejected() {
        assert!(matches!(
            parse_line("{not json"),
            Err(RecordError::Malformed(_))
        ));
    }

    #[test]
    fn missing_barcode_is_rejected() {
        assert!(matches!(
            parse_line(r#"{"product_name": "Thing"}"#),
            Err(RecordError::MissingField("code"))
        ));
    }

    #[test]
    fn missing_name_is_rejected() {
        assert!(matches!(
            parse_line(r#"{"code": "123"}"#),
            Err(RecordError::MissingField("product_name"))
        ));
    }

    #[test]
    fn empty_name_is_rejected_by_validation() {
        assert!(matches!(
            parse_line(r#"{"code": "123", "product_name": "  "}"#),
            Err(RecordError::Invalid(_))
        ));
    }

    #[test]
    fn lang_defaults_to_english() {
        let record = parse_line(r#"{"code": "123", "product_name": "Thing"}"#).unwrap();
        assert_eq!(record.lang, "en");
        assert!(record.nutrition.is_none());
        assert!(record.last_modified.is_none());
    }

    #[test]
    fn empty_nutriments_object_yields_no_nutrition_row() {
        let record =
            parse_line(r#"{"code": "123", "product_name": "Thing", "nutriments": {}}"#).unwrap();
        assert!(record.nutrition.is_none());
    }
}
