//! Spatial metadata catalog lookups (`geometry_columns`)

use serde::Serialize;
use sqlx::postgres::PgPool;

/// Schema that holds every layer
pub const LAYER_SCHEMA: &str = "public";

/// Entry of `GET /api/layers`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct LayerSummary {
    pub name: String,
    #[serde(rename = "type")]
    pub geometry_type: String,
}

/// A registered layer, used as the allowlist entry for table-scoped operations
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct LayerInfo {
    pub name: String,
    pub geometry_column: String,
    pub geometry_type: String,
    pub srid: i32,
}

/// All geometry-bearing tables in the public schema
pub async fn list_layers(pool: &PgPool) -> Result<Vec<LayerSummary>, sqlx::Error> {
    sqlx::query_as::<_, LayerSummary>(
        r"SELECT f_table_name::text AS name, type::text AS geometry_type
          FROM geometry_columns
          WHERE f_table_schema = $1
          ORDER BY f_table_name",
    )
    .bind(LAYER_SCHEMA)
    .fetch_all(pool)
    .await
}

/// Look up one layer by exact table name
///
/// Tables with several geometry columns resolve to the first one by name.
pub async fn find_layer(pool: &PgPool, table: &str) -> Result<Option<LayerInfo>, sqlx::Error> {
    sqlx::query_as::<_, LayerInfo>(
        r"SELECT f_table_name::text AS name,
                 f_geometry_column::text AS geometry_column,
                 type::text AS geometry_type,
                 srid
          FROM geometry_columns
          WHERE f_table_schema = $1 AND f_table_name = $2
          ORDER BY f_geometry_column
          LIMIT 1",
    )
    .bind(LAYER_SCHEMA)
    .bind(table)
    .fetch_optional(pool)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layer_summary_serializes_type_key() {
        let summary = LayerSummary {
            name: "roads".to_string(),
            geometry_type: "MULTILINESTRING".to_string(),
        };
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json, serde_json::json!({"name": "roads", "type": "MULTILINESTRING"}));
    }

    #[tokio::test]
    async fn test_unknown_layer_is_none() {
        let Some(db) = crate::db::test_database().await else {
            return;
        };
        let found = find_layer(db.pool(), "no_such_layer_for_tests").await.unwrap();
        assert!(found.is_none());
    }
}
