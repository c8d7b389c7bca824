//! Bulk write of an imported dataset into a fresh table
//!
//! The table is replaced inside a single transaction: concurrent readers see
//! either the previous table or the complete new one.

use chrono::NaiveDate;
use sqlx::postgres::{PgPool, Postgres};
use sqlx::QueryBuilder;

use super::ident::quote_ident;
use crate::spatial::dataset::{AttributeValue, ColumnKind, Dataset};
use crate::spatial::WGS84_SRID;

/// PostgreSQL's bind parameter limit per statement
const MAX_BIND_PARAMS: usize = 65_535;

/// Geometry column of imported tables
pub const GEOMETRY_COLUMN: &str = "geom";

/// `CREATE TABLE` for the import layout
fn create_table_sql(table: &str, dataset: &Dataset) -> String {
    let mut columns = vec!["gid SERIAL PRIMARY KEY".to_string()];
    columns.extend(
        dataset
            .columns
            .iter()
            .map(|c| format!("{} {}", quote_ident(&c.name), c.kind.sql_type())),
    );
    columns.push(format!(
        "{} geometry(Geometry, {WGS84_SRID})",
        quote_ident(GEOMETRY_COLUMN)
    ));
    format!("CREATE TABLE {} ({})", quote_ident(table), columns.join(", "))
}

/// Rows per `INSERT`, bounded by the configured batch size and the bind limit
fn rows_per_batch(column_count: usize, batch_size: usize) -> usize {
    let params_per_row = column_count + 1;
    batch_size.clamp(1, (MAX_BIND_PARAMS / params_per_row).max(1))
}

/// SQL around the bound GeoJSON text: reprojected to 4326 unless already there
fn geometry_expr(source_srid: i32) -> (&'static str, String) {
    if source_srid == WGS84_SRID {
        ("ST_SetSRID(ST_GeomFromGeoJSON(", format!("), {WGS84_SRID})"))
    } else {
        (
            "ST_Transform(ST_SetSRID(ST_GeomFromGeoJSON(",
            format!("), {source_srid}), {WGS84_SRID})"),
        )
    }
}

/// Replace `table` with the contents of `dataset`
///
/// Returns the number of inserted rows.
pub async fn write_dataset(
    pool: &PgPool,
    table: &str,
    dataset: &Dataset,
    batch_size: usize,
) -> Result<u64, sqlx::Error> {
    let source_srid = dataset.source_srid();
    let geometries: Vec<Option<String>> = dataset
        .features
        .iter()
        .map(|f| {
            f.geometry
                .as_ref()
                .map(|g| geojson::Geometry::new(geojson::Value::from(g)).to_string())
        })
        .collect();

    let mut tx = pool.begin().await?;

    sqlx::query(&format!("DROP TABLE IF EXISTS {}", quote_ident(table)))
        .execute(&mut *tx)
        .await?;
    sqlx::query(&create_table_sql(table, dataset))
        .execute(&mut *tx)
        .await?;

    let column_list = dataset
        .columns
        .iter()
        .map(|c| quote_ident(&c.name))
        .chain(std::iter::once(quote_ident(GEOMETRY_COLUMN)))
        .collect::<Vec<_>>()
        .join(", ");
    let (geom_open, geom_close) = geometry_expr(source_srid);

    let chunk = rows_per_batch(dataset.columns.len(), batch_size);
    let mut inserted = 0;
    for (features, geometries) in dataset.features.chunks(chunk).zip(geometries.chunks(chunk)) {
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("INSERT INTO {} ({column_list}) ", quote_ident(table)));
        builder.push_values(features.iter().zip(geometries), |mut row, (feature, geometry)| {
            for (column, value) in dataset.columns.iter().zip(&feature.values) {
                match column.kind {
                    ColumnKind::Text => row.push_bind(match value {
                        AttributeValue::Text(s) => Some(s.clone()),
                        _ => None,
                    }),
                    ColumnKind::Integer => row.push_bind(match value {
                        AttributeValue::Integer(i) => Some(*i),
                        _ => None,
                    }),
                    ColumnKind::Float => row.push_bind(match value {
                        AttributeValue::Float(f) => Some(*f),
                        _ => None,
                    }),
                    ColumnKind::Boolean => row.push_bind(match value {
                        AttributeValue::Boolean(b) => Some(*b),
                        _ => None,
                    }),
                    ColumnKind::Date => row.push_bind(match value {
                        AttributeValue::Date(d) => Some(*d),
                        _ => None::<NaiveDate>,
                    }),
                };
            }
            row.push(geom_open)
                .push_bind_unseparated(geometry.clone())
                .push_unseparated(&geom_close);
        });
        inserted += builder.build().execute(&mut *tx).await?.rows_affected();
    }

    tx.commit().await?;
    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::dataset::Feature;

    fn dataset() -> Dataset {
        let mut ds = Dataset::default();
        ds.add_column("name", ColumnKind::Text);
        ds.add_column("pop", ColumnKind::Integer);
        ds.add_column("opened", ColumnKind::Date);
        ds.features.push(Feature {
            geometry: Some(geo_types::point!(x: 100.5, y: 13.7).into()),
            values: vec![
                AttributeValue::Text("Hua Lamphong".into()),
                AttributeValue::Integer(1200),
                AttributeValue::Date(NaiveDate::from_ymd_opt(1916, 6, 25).unwrap()),
            ],
        });
        ds.features.push(Feature {
            geometry: None,
            values: vec![AttributeValue::Null, AttributeValue::Null, AttributeValue::Null],
        });
        ds
    }

    #[test]
    fn test_create_table_sql() {
        assert_eq!(
            create_table_sql("stations", &dataset()),
            "CREATE TABLE \"stations\" (gid SERIAL PRIMARY KEY, \"name\" TEXT, \"pop\" BIGINT, \
             \"opened\" DATE, \"geom\" geometry(Geometry, 4326))"
        );
    }

    #[test]
    fn test_rows_per_batch() {
        assert_eq!(rows_per_batch(3, 500), 500);
        assert_eq!(rows_per_batch(3, 0), 1);
        assert_eq!(rows_per_batch(999, 500), 65);
        assert_eq!(rows_per_batch(100_000, 500), 1);
    }

    #[test]
    fn test_geometry_expr() {
        let (open, close) = geometry_expr(4326);
        assert_eq!(format!("{open}$1{close}"), "ST_SetSRID(ST_GeomFromGeoJSON($1), 4326)");

        let (open, close) = geometry_expr(32647);
        assert_eq!(
            format!("{open}$1{close}"),
            "ST_Transform(ST_SetSRID(ST_GeomFromGeoJSON($1), 32647), 4326)"
        );
    }

    #[tokio::test]
    async fn test_write_dataset_replaces_table() {
        let Some(db) = crate::db::test_database().await else {
            return;
        };
        let table = "webgis_writer_test";
        let ds = dataset();

        assert_eq!(write_dataset(db.pool(), table, &ds, 1).await.unwrap(), 2);
        // Second import replaces rather than appends
        assert_eq!(write_dataset(db.pool(), table, &ds, 500).await.unwrap(), 2);

        let layer = crate::db::catalog::find_layer(db.pool(), table)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(layer.geometry_column, "geom");
        assert_eq!(layer.srid, 4326);
        assert_eq!(crate::db::layers::count_rows(db.pool(), &layer).await.unwrap(), 2);

        let fc = crate::db::layers::feature_collection(db.pool(), &layer).await.unwrap();
        assert_eq!(fc["features"].as_array().map(Vec::len), Some(2));

        crate::db::layers::drop_layer(db.pool(), &layer).await.unwrap();
    }
}
