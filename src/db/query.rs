//! Ad-hoc SQL and computed geometry queries

use serde::Serialize;
use serde_json::Value;
use sqlx::postgres::PgPool;

use super::layers::empty_feature_collection;

/// Outcome of an ad-hoc statement
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    /// Read statement wrapped into a FeatureCollection
    Features(Value),
    /// Any other statement
    Executed { rows_affected: u64 },
}

/// Body returned for non-read statements
#[derive(Debug, Serialize)]
pub struct ExecutedStatus {
    pub status: &'static str,
    pub rows_affected: u64,
}

/// True when the statement's first keyword is `SELECT` or `WITH`
pub fn is_read_statement(sql: &str) -> bool {
    let keyword: String = sql
        .trim_start()
        .trim_start_matches('(')
        .chars()
        .take_while(char::is_ascii_alphabetic)
        .collect();
    keyword.eq_ignore_ascii_case("select") || keyword.eq_ignore_ascii_case("with")
}

/// Wrap a read statement so PostGIS aggregates its rows into GeoJSON features
pub fn wrap_as_feature_collection(sql: &str) -> String {
    let inner = sql.trim().trim_end_matches(';');
    format!(
        r"SELECT json_build_object(
              'type', 'FeatureCollection',
              'features', COALESCE(json_agg(ST_AsGeoJSON(t.*)::json), '[]'::json)
          )
          FROM ({inner}) AS t"
    )
}

/// Run client-supplied SQL verbatim
pub async fn run_query(pool: &PgPool, sql: &str) -> Result<QueryOutcome, sqlx::Error> {
    if is_read_statement(sql) {
        let wrapped = wrap_as_feature_collection(sql);
        let result: Option<Value> = sqlx::query_scalar(&wrapped).fetch_one(pool).await?;
        return Ok(QueryOutcome::Features(
            result.unwrap_or_else(empty_feature_collection),
        ));
    }

    let result = sqlx::raw_sql(sql).execute(pool).await?;
    Ok(QueryOutcome::Executed {
        rows_affected: result.rows_affected(),
    })
}

/// Buffer a GeoJSON geometry by `distance` metres in the given projected SRID
///
/// The input is taken as EPSG:4326 and the result is returned in EPSG:4326.
pub async fn buffer_geometry(
    pool: &PgPool,
    geometry_json: &str,
    projected_srid: i32,
    distance: f64,
) -> Result<Value, sqlx::Error> {
    sqlx::query_scalar(
        r"SELECT ST_AsGeoJSON(
              ST_Transform(
                  ST_Buffer(ST_Transform(ST_SetSRID(ST_GeomFromGeoJSON($1), 4326), $2), $3),
                  4326
              )
          )::json",
    )
    .bind(geometry_json)
    .bind(projected_srid)
    .bind(distance)
    .fetch_one(pool)
    .await
}

/// Area of a GeoJSON geometry measured in a projected SRID (square metres)
#[cfg(test)]
pub(crate) async fn projected_area(
    pool: &PgPool,
    geometry: &Value,
    projected_srid: i32,
) -> Result<f64, sqlx::Error> {
    sqlx::query_scalar(
        r"SELECT ST_Area(ST_Transform(ST_SetSRID(ST_GeomFromGeoJSON($1), 4326), $2))",
    )
    .bind(geometry.to_string())
    .bind(projected_srid)
    .fetch_one(pool)
    .await
}
