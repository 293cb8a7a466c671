use std::collections::hash_map::Entry;
use std::collections::HashMap;

use async_trait::async_trait;
use core_types::ProductRecord;
use sqlx::{PgPool, Postgres, Row, Transaction};

/// Result of writing one batch.
#[derive(Debug, Clone, Copy, Default)]
pub struct BatchOutcome {
    /// Rows that did not exist before.
    pub inserted: u64,
    /// Rows that replaced an existing row with the same barcode.
    pub overwritten: u64,
}

/// Where transformed records land. One transaction per batch; a failure rolls
/// the whole batch back so the checkpoint-to-committed-data correspondence
/// stays exact.
#[async_trait]
pub trait ProductSink: Send {
    async fn write_batch(&mut self, records: &[ProductRecord]) -> Result<BatchOutcome, sqlx::Error>;
}

/// PostgreSQL sink. Every write is an upsert keyed by barcode, never a blind
/// insert, which is what makes a from-scratch re-run converge on the same end
/// state. Duplicates within a batch are last-write-wins by source order.
pub struct PgProductSink {
    pool: PgPool,
    /// Taxonomy tag to row id, filled lazily. Tags repeat heavily across
    /// products, so most links skip the upsert round-trip.
    ingredient_ids: HashMap<String, i64>,
    allergen_ids: HashMap<String, i64>,
}

impl PgProductSink {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            ingredient_ids: HashMap::new(),
            allergen_ids: HashMap::new(),
        }
    }

    async fn write_product(
        tx: &mut Transaction<'_, Postgres>,
        record: &ProductRecord,
    ) -> Result<(i64, bool), sqlx::Error> {
        let row = sqlx::query(
            r#"
            INSERT INTO products
                (barcode, name, brand, lang, nutriscore_grade, nutriscore_score,
                 quantity_raw, last_modified)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (barcode) DO UPDATE SET
                name = EXCLUDED.name,
                brand = EXCLUDED.brand,
                lang = EXCLUDED.lang,
                nutriscore_grade = EXCLUDED.nutriscore_grade,
                nutriscore_score = EXCLUDED.nutriscore_score,
                quantity_raw = EXCLUDED.quantity_raw,
                last_modified = EXCLUDED.last_modified
            RETURNING id, (xmax = 0) AS inserted
            "#,
        )
        .bind(&record.barcode)
        .bind(&record.name)
        .bind(&record.brand)
        .bind(&record.lang)
        .bind(&record.nutriscore_grade)
        .bind(record.nutriscore_score)
        .bind(&record.quantity_raw)
        .bind(record.last_modified)
        .fetch_one(&mut **tx)
        .await?;

        Ok((row.get("id"), row.get("inserted")))
    }

    async fn write_nutrition(
        tx: &mut Transaction<'_, Postgres>,
        product_id: i64,
        record: &ProductRecord,
    ) -> Result<(), sqlx::Error> {
        if let Some(n) = &record.nutrition {
            sqlx::query(
                r#"
                INSERT INTO product_nutrition
                    (product_id, fat_100g, saturated_fat_100g, carbohydrates_100g,
                     sugars_100g, fiber_100g, proteins_100g, salt_100g)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                ON CONFLICT (product_id) DO UPDATE SET
                    fat_100g = EXCLUDED.fat_100g,
                    saturated_fat_100g = EXCLUDED.saturated_fat_100g,
                    carbohydrates_100g = EXCLUDED.carbohydrates_100g,
                    sugars_100g = EXCLUDED.sugars_100g,
                    fiber_100g = EXCLUDED.fiber_100g,
                    proteins_100g = EXCLUDED.proteins_100g,
                    salt_100g = EXCLUDED.salt_100g
                "#,
            )
            .bind(product_id)
            .bind(n.fat_100g)
            .bind(n.saturated_fat_100g)
            .bind(n.carbohydrates_100g)
            .bind(n.sugars_100g)
            .bind(n.fiber_100g)
            .bind(n.proteins_100g)
            .bind(n.salt_100g)
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }

    async fn ingredient_id(
        &mut self,
        tx: &mut Transaction<'_, Postgres>,
        tag: &str,
    ) -> Result<i64, sqlx::Error> {
        if let Some(&id) = self.ingredient_ids.get(tag) {
            return Ok(id);
        }
        let id = upsert_tag(tx, "ingredients", tag).await?;
        self.ingredient_ids.insert(tag.to_string(), id);
        Ok(id)
    }

    async fn allergen_id(
        &mut self,
        tx: &mut Transaction<'_, Postgres>,
        tag: &str,
    ) -> Result<i64, sqlx::Error> {
        if let Some(&id) = self.allergen_ids.get(tag) {
            return Ok(id);
        }
        let id = upsert_tag(tx, "allergens", tag).await?;
        self.allergen_ids.insert(tag.to_string(), id);
        Ok(id)
    }

    /// Replaces the product's taxonomy links with the ones on the incoming
    /// record. Delete-then-insert so tags removed upstream disappear here too.
    async fn write_links(
        &mut self,
        tx: &mut Transaction<'_, Postgres>,
        product_id: i64,
        record: &ProductRecord,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM product_ingredients WHERE product_id = $1")
            .bind(product_id)
            .execute(&mut **tx)
            .await?;
        for (position, tag) in record.ingredient_tags.iter().enumerate() {
            let ingredient_id = self.ingredient_id(tx, tag).await?;
            sqlx::query(
                r#"
                INSERT INTO product_ingredients (product_id, ingredient_id, rank)
                VALUES ($1, $2, $3)
                ON CONFLICT (product_id, ingredient_id) DO NOTHING
                "#,
            )
            .bind(product_id)
            .bind(ingredient_id)
            .bind((position + 1) as i32)
            .execute(&mut **tx)
            .await?;
        }

        sqlx::query("DELETE FROM product_allergens WHERE product_id = $1")
            .bind(product_id)
            .execute(&mut **tx)
            .await?;
        // Declared allergens win over traces when a tag appears in both.
        for (tag, relation) in record
            .trace_tags
            .iter()
            .map(|t| (t, "may_contain"))
            .chain(record.allergen_tags.iter().map(|t| (t, "contains")))
        {
            let allergen_id = self.allergen_id(tx, tag).await?;
            sqlx::query(
                r#"
                INSERT INTO product_allergens (product_id, allergen_id, relation)
                VALUES ($1, $2, $3)
                ON CONFLICT (product_id, allergen_id) DO UPDATE SET
                    relation = EXCLUDED.relation
                "#,
            )
            .bind(product_id)
            .bind(allergen_id)
            .bind(relation)
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }
}

async fn upsert_tag(
    tx: &mut Transaction<'_, Postgres>,
    table: &str,
    tag: &str,
) -> Result<i64, sqlx::Error> {
    // DO UPDATE instead of DO NOTHING so RETURNING yields the id on the
    // conflict path as well.
    let sql = format!(
        r#"
        INSERT INTO {table} (tag, name)
        VALUES ($1, $2)
        ON CONFLICT (tag) DO UPDATE SET tag = EXCLUDED.tag
        RETURNING id
        "#
    );
    let row = sqlx::query(&sql)
        .bind(tag)
        .bind(display_name(tag))
        .fetch_one(&mut **tx)
        .await?;
    Ok(row.get("id"))
}

/// Human-readable name derived from a taxonomy tag: the language prefix is
/// dropped and hyphens become spaces ("en:palm-oil" to "Palm oil").
fn display_name(tag: &str) -> String {
    let bare = tag.split_once(':').map_or(tag, |(_, rest)| rest);
    let spaced = bare.replace('-', " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => spaced,
    }
}

/// Collapses repeated barcodes within one batch, keeping the last occurrence
/// at the position of the first. Returns the collapsed duplicate count, which
/// the outcome reports as overwrites.
fn dedupe_last_wins(records: &[ProductRecord]) -> (Vec<&ProductRecord>, u64) {
    let mut position: HashMap<&str, usize> = HashMap::new();
    let mut distinct: Vec<&ProductRecord> = Vec::new();
    let mut collapsed = 0;

    for record in records {
        match position.entry(record.barcode.as_str()) {
            Entry::Occupied(slot) => {
                distinct[*slot.get()] = record;
                collapsed += 1;
            }
            Entry::Vacant(slot) => {
                slot.insert(distinct.len());
                distinct.push(record);
            }
        }
    }
    (distinct, collapsed)
}

#[async_trait]
impl ProductSink for PgProductSink {
    async fn write_batch(&mut self, records: &[ProductRecord]) -> Result<BatchOutcome, sqlx::Error> {
        // Write each barcode once per transaction. A repeated barcode would
        // otherwise update a row inserted moments earlier in the same
        // transaction, and the xmax probe would miscount it as an insert.
        let (distinct, collapsed) = dedupe_last_wins(records);
        let mut outcome = BatchOutcome {
            inserted: 0,
            overwritten: collapsed,
        };

        let mut tx = self.pool.begin().await?;
        for record in distinct {
            let (product_id, inserted) = Self::write_product(&mut tx, record).await?;
            if inserted {
                outcome.inserted += 1;
            } else {
                outcome.overwritten += 1;
            }
            Self::write_nutrition(&mut tx, product_id, record).await?;
            self.write_links(&mut tx, product_id, record).await?;
        }
        tx.commit().await?;
        Ok(outcome)
    }
}
