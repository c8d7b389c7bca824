//! Table-scoped layer operations
//!
//! Callers resolve the table through [`super::catalog::find_layer`] first;
//! functions here take the resulting [`LayerInfo`].

use serde_json::Value;
use sqlx::postgres::PgPool;

use super::catalog::{LayerInfo, LAYER_SCHEMA};
use super::ident::quote_ident;

/// `{"type":"FeatureCollection","features":[]}`
pub fn empty_feature_collection() -> Value {
    serde_json::json!({"type": "FeatureCollection", "features": []})
}

/// Aggregate every row of the layer into a GeoJSON FeatureCollection
pub async fn feature_collection(pool: &PgPool, layer: &LayerInfo) -> Result<Value, sqlx::Error> {
    let sql = format!(
        r"SELECT json_build_object(
              'type', 'FeatureCollection',
              'features', COALESCE(json_agg(ST_AsGeoJSON(t.*)::json), '[]'::json)
          )
          FROM {} AS t",
        quote_ident(&layer.name)
    );
    let result: Option<Value> = sqlx::query_scalar(&sql).fetch_one(pool).await?;
    Ok(result.unwrap_or_else(empty_feature_collection))
}

/// One row read for export: geometry as GeoJSON text plus the remaining columns
///
/// `properties` is keyed by column name; [`attribute_columns`] gives the order.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ExportRow {
    pub geometry: Option<String>,
    pub properties: Value,
}

/// Read every row with its geometry split from the attribute columns
pub async fn export_rows(pool: &PgPool, layer: &LayerInfo) -> Result<Vec<ExportRow>, sqlx::Error> {
    let column = format!("t.{}", quote_ident(&layer.geometry_column));
    // SRID 0 has no transform path; such layers are exported as stored
    let geom = if layer.srid == 0 || layer.srid == 4326 {
        column
    } else {
        format!("ST_Transform({column}, 4326)")
    };
    let sql = format!(
        r"SELECT ST_AsGeoJSON({geom}) AS geometry,
                 (to_jsonb(t) - $1)::json AS properties
          FROM {table} AS t",
        table = quote_ident(&layer.name),
    );
    sqlx::query_as::<_, ExportRow>(&sql)
        .bind(&layer.geometry_column)
        .fetch_all(pool)
        .await
}

/// Attribute column of a layer, in table order
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct AttributeColumn {
    pub name: String,
    pub data_type: String,
}

/// Every column except the layer's geometry column, ordered as in the table
pub async fn attribute_columns(
    pool: &PgPool,
    layer: &LayerInfo,
) -> Result<Vec<AttributeColumn>, sqlx::Error> {
    sqlx::query_as::<_, AttributeColumn>(
        r"SELECT column_name::text AS name, data_type::text AS data_type
          FROM information_schema.columns
          WHERE table_schema = $1 AND table_name = $2 AND column_name <> $3
          ORDER BY ordinal_position",
    )
    .bind(LAYER_SCHEMA)
    .bind(&layer.name)
    .bind(&layer.geometry_column)
    .fetch_all(pool)
    .await
}

/// Column types accepted by `addfield`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Text,
    Float,
    Int,
    Date,
    /// Unrecognized tag
    Unconstrained,
}

impl FieldType {
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim().to_lowercase().as_str() {
            "text" => Self::Text,
            "float" => Self::Float,
            "int" => Self::Int,
            "date" => Self::Date,
            _ => Self::Unconstrained,
        }
    }

    pub const fn sql_type(self) -> &'static str {
        match self {
            Self::Text => "TEXT",
            Self::Float => "DOUBLE PRECISION",
            Self::Int => "INTEGER",
            Self::Date => "DATE",
            Self::Unconstrained => "VARCHAR",
        }
    }
}

/// `ALTER TABLE ... ADD COLUMN`
///
/// `field` must already be validated with [`super::ident::validate_field_name`].
pub async fn add_column(
    pool: &PgPool,
    layer: &LayerInfo,
    field: &str,
    field_type: FieldType,
) -> Result<(), sqlx::Error> {
    let sql = add_column_sql(&layer.name, field, field_type);
    sqlx::query(&sql).execute(pool).await?;
    Ok(())
}

fn add_column_sql(table: &str, field: &str, field_type: FieldType) -> String {
    format!(
        "ALTER TABLE {} ADD COLUMN {} {}",
        quote_ident(table),
        quote_ident(field),
        field_type.sql_type()
    )
}

/// `DROP TABLE IF EXISTS`
pub async fn drop_layer(pool: &PgPool, layer: &LayerInfo) -> Result<(), sqlx::Error> {
    let sql = format!("DROP TABLE IF EXISTS {}", quote_ident(&layer.name));
    sqlx::query(&sql).execute(pool).await?;
    Ok(())
}

/// Number of rows in a layer
#[cfg(test)]
pub(crate) async fn count_rows(pool: &PgPool, layer: &LayerInfo) -> Result<i64, sqlx::Error> {
    let sql = format!("SELECT count(*) FROM {}", quote_ident(&layer.name));
    sqlx::query_scalar(&sql).fetch_one(pool).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_type_mapping() {
        assert_eq!(FieldType::from_tag("text").sql_type(), "TEXT");
        assert_eq!(FieldType::from_tag("float").sql_type(), "DOUBLE PRECISION");
        assert_eq!(FieldType::from_tag("INT").sql_type(), "INTEGER");
        assert_eq!(FieldType::from_tag("date").sql_type(), "DATE");
        assert_eq!(FieldType::from_tag("geometry").sql_type(), "VARCHAR");
        assert_eq!(FieldType::from_tag(""), FieldType::Unconstrained);
    }

    #[test]
    fn test_add_column_sql_quotes_identifiers() {
        assert_eq!(
            add_column_sql("Roads", "surface", FieldType::Text),
            "ALTER TABLE \"Roads\" ADD COLUMN \"surface\" TEXT"
        );
    }

    #[test]
    fn test_empty_feature_collection() {
        let fc = empty_feature_collection();
        assert_eq!(fc["type"], "FeatureCollection");
        assert_eq!(fc["features"].as_array().map(Vec::len), Some(0));
    }
}
