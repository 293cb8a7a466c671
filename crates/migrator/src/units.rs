/// A single versioned schema change. Units are defined at build time and are
/// immutable once a release has applied them.
#[derive(Debug, Clone)]
pub struct MigrationUnit {
    /// Monotonically increasing version token.
    pub version: i64,
    pub name: &'static str,
    /// Schema change, applied inside one transaction with the ledger entry.
    pub up: &'static str,
    /// Optional rollback. `None` marks the unit as irreversible.
    pub down: Option<&'static str>,
}

/// The full, version-ordered set of schema changes for the product database.
pub fn builtin_units() -> Vec<MigrationUnit> {
    vec![
        MigrationUnit {
            version: 1,
            name: "create_products",
            up: r#"
                CREATE TABLE products (
                    id BIGSERIAL PRIMARY KEY,
                    barcode VARCHAR(64) NOT NULL,
                    name TEXT NOT NULL,
                    brand TEXT,
                    lang VARCHAR(8) NOT NULL DEFAULT 'en',
                    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                    CONSTRAINT products_barcode_key UNIQUE (barcode)
                );
                CREATE INDEX products_name_idx ON products (name);
            "#,
            down: Some("DROP TABLE products;"),
        },
        MigrationUnit {
            version: 2,
            name: "add_nutrition",
            up: r#"
                ALTER TABLE products
                    ADD COLUMN nutriscore_grade VARCHAR(10),
                    ADD COLUMN nutriscore_score INTEGER,
                    ADD COLUMN quantity_raw VARCHAR(100);
                CREATE TABLE product_nutrition (
                    product_id BIGINT PRIMARY KEY
                        REFERENCES products (id) ON DELETE CASCADE,
                    fat_100g NUMERIC(10, 3),
                    saturated_fat_100g NUMERIC(10, 3),
                    carbohydrates_100g NUMERIC(10, 3),
                    sugars_100g NUMERIC(10, 3),
                    fiber_100g NUMERIC(10, 3),
                    proteins_100g NUMERIC(10, 3),
                    salt_100g NUMERIC(10, 3)
                );
            "#,
            down: Some(
                r#"
                DROP TABLE product_nutrition;
                ALTER TABLE products
                    DROP COLUMN nutriscore_grade,
                    DROP COLUMN nutriscore_score,
                    DROP COLUMN quantity_raw;
            "#,
            ),
        },
        MigrationUnit {
            version: 3,
            name: "add_product_last_modified",
            up: "ALTER TABLE products ADD COLUMN last_modified TIMESTAMPTZ;",
            down: Some("ALTER TABLE products DROP COLUMN last_modified;"),
        },
        MigrationUnit {
            version: 4,
            name: "add_taxonomy_links",
            up: r#"
                CREATE TABLE ingredients (
                    id BIGSERIAL PRIMARY KEY,
                    tag VARCHAR(255) NOT NULL,
                    name TEXT NOT NULL,
                    CONSTRAINT ingredients_tag_key UNIQUE (tag)
                );
                CREATE TABLE allergens (
                    id BIGSERIAL PRIMARY KEY,
                    tag VARCHAR(255) NOT NULL,
                    name TEXT NOT NULL,
                    CONSTRAINT allergens_tag_key UNIQUE (tag)
                );
                CREATE TABLE product_ingredients (
                    product_id BIGINT NOT NULL
                        REFERENCES products (id) ON DELETE CASCADE,
                    ingredient_id BIGINT NOT NULL
                        REFERENCES ingredients (id) ON DELETE CASCADE,
                    rank INTEGER NOT NULL,
                    PRIMARY KEY (product_id, ingredient_id)
                );
                CREATE TABLE product_allergens (
                    product_id BIGINT NOT NULL
                        REFERENCES products (id) ON DELETE CASCADE,
                    allergen_id BIGINT NOT NULL
                        REFERENCES allergens (id) ON DELETE CASCADE,
                    relation VARCHAR(16) NOT NULL,
                    PRIMARY KEY (product_id, allergen_id)
                );
            "#,
            down: Some(
                r#"
                DROP TABLE product_allergens;
                DROP TABLE product_ingredients;
                DROP TABLE allergens;
                DROP TABLE ingredients;
            "#,
            ),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_units_are_strictly_ascending() {
        let units = builtin_units();
        assert!(!units.is_empty());
        for pair in units.windows(2) {
            assert!(
                pair[0].version < pair[1].version,
                "versions must be strictly ascending: {} then {}",
                pair[0].version,
                pair[1].version
            );
        }
    }

    #[test]
    fn builtin_units_all_have_rollbacks() {
        for unit in builtin_units() {
            assert!(unit.down.is_some(), "unit {} has no down SQL", unit.name);
        }
    }
}
