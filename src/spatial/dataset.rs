//! In-memory tabular dataset shared by the file readers, the database writer
//! and the shapefile exporter.

use chrono::NaiveDate;
use geo_types::Geometry;
use serde_json::{Map, Value};

use crate::db::ident::sanitize_column_name;

/// Columns owned by the import table layout
const RESERVED_COLUMNS: [&str; 2] = ["gid", "geom"];

/// Attribute column type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Text,
    Integer,
    Float,
    Boolean,
    Date,
}

impl ColumnKind {
    pub const fn sql_type(self) -> &'static str {
        match self {
            Self::Text => "TEXT",
            Self::Integer => "BIGINT",
            Self::Float => "DOUBLE PRECISION",
            Self::Boolean => "BOOLEAN",
            Self::Date => "DATE",
        }
    }

    /// Kind for a column reported by `information_schema.columns.data_type`
    pub fn from_sql_type(data_type: &str) -> Self {
        match data_type {
            "smallint" | "integer" | "bigint" => Self::Integer,
            "real" | "double precision" | "numeric" => Self::Float,
            "boolean" => Self::Boolean,
            "date" => Self::Date,
            _ => Self::Text,
        }
    }

    /// Narrowest kind that holds values of both kinds
    fn widen(self, other: Self) -> Self {
        match (self, other) {
            (a, b) if a == b => a,
            (Self::Integer, Self::Float) | (Self::Float, Self::Integer) => Self::Float,
            _ => Self::Text,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub kind: ColumnKind,
}

/// One attribute value
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Null,
    Text(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Date(NaiveDate),
}

impl AttributeValue {
    /// Convert into the representation of `kind`; unconvertible values become `Null`
    pub fn coerce(self, kind: ColumnKind) -> Self {
        match (kind, self) {
            (_, Self::Null) => Self::Null,
            (ColumnKind::Text, v) => v.into_text(),
            (ColumnKind::Integer, Self::Integer(i)) => Self::Integer(i),
            #[allow(clippy::cast_possible_truncation)]
            (ColumnKind::Integer, Self::Float(f)) if f.fract() == 0.0 && f.is_finite() => {
                Self::Integer(f as i64)
            }
            (ColumnKind::Integer, Self::Text(s)) => s.trim().parse().map_or(Self::Null, Self::Integer),
            #[allow(clippy::cast_precision_loss)]
            (ColumnKind::Float, Self::Integer(i)) => Self::Float(i as f64),
            (ColumnKind::Float, Self::Float(f)) => Self::Float(f),
            (ColumnKind::Float, Self::Text(s)) => s.trim().parse().map_or(Self::Null, Self::Float),
            (ColumnKind::Boolean, Self::Boolean(b)) => Self::Boolean(b),
            (ColumnKind::Date, Self::Date(d)) => Self::Date(d),
            (ColumnKind::Date, Self::Text(s)) => {
                NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map_or(Self::Null, Self::Date)
            }
            _ => Self::Null,
        }
    }

    fn into_text(self) -> Self {
        match self {
            Self::Null => Self::Null,
            Self::Text(s) => Self::Text(s),
            Self::Integer(i) => Self::Text(i.to_string()),
            Self::Float(f) => Self::Text(f.to_string()),
            Self::Boolean(b) => Self::Text(b.to_string()),
            Self::Date(d) => Self::Text(d.format("%Y-%m-%d").to_string()),
        }
    }

    /// Value read from a JSON property, with the kind it suggests
    pub fn from_json(value: &Value) -> (Self, Option<ColumnKind>) {
        match value {
            Value::Null => (Self::Null, None),
            Value::Bool(b) => (Self::Boolean(*b), Some(ColumnKind::Boolean)),
            Value::Number(n) => n.as_i64().map_or_else(
                || {
                    n.as_f64()
                        .map_or((Self::Null, None), |f| (Self::Float(f), Some(ColumnKind::Float)))
                },
                |i| (Self::Integer(i), Some(ColumnKind::Integer)),
            ),
            Value::String(s) => (Self::Text(s.clone()), Some(ColumnKind::Text)),
            other => (Self::Text(other.to_string()), Some(ColumnKind::Text)),
        }
    }
}

/// One row
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub geometry: Option<Geometry<f64>>,
    /// One value per dataset column, in column order
    pub values: Vec<AttributeValue>,
}

/// Typed features plus the reference system they are expressed in
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    pub columns: Vec<Column>,
    pub features: Vec<Feature>,
    /// EPSG code of the coordinates; `None` means unknown (treated as 4326)
    pub srid: Option<i32>,
}

impl Dataset {
    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Effective source SRID
    pub fn source_srid(&self) -> i32 {
        self.srid.unwrap_or(crate::spatial::WGS84_SRID)
    }

    /// Append a column under a sanitized, unique name and return that name
    pub fn add_column(&mut self, raw_name: &str, kind: ColumnKind) -> String {
        let base = sanitize_column_name(raw_name);
        let mut name = base.clone();
        let mut suffix = 1;
        while RESERVED_COLUMNS.contains(&name.as_str())
            || self.columns.iter().any(|c| c.name == name)
        {
            name = format!("{base}_{suffix}");
            suffix += 1;
        }
        self.columns.push(Column {
            name: name.clone(),
            kind,
        });
        name
    }

    /// Build a dataset from JSON property maps, inferring one kind per key
    ///
    /// Keys keep first-seen order across rows.
    pub fn from_json_rows(rows: Vec<(Option<Geometry<f64>>, Map<String, Value>)>, srid: Option<i32>) -> Self {
        let mut keys: Vec<String> = Vec::new();
        let mut kinds: Vec<Option<ColumnKind>> = Vec::new();
        for (_, props) in &rows {
            for (key, value) in props {
                let (_, kind) = AttributeValue::from_json(value);
                match keys.iter().position(|k| k == key) {
                    Some(idx) => {
                        kinds[idx] = match (kinds[idx], kind) {
                            (Some(a), Some(b)) => Some(a.widen(b)),
                            (a, b) => a.or(b),
                        };
                    }
                    None => {
                        keys.push(key.clone());
                        kinds.push(kind);
                    }
                }
            }
        }

        let mut dataset = Self {
            srid,
            ..Self::default()
        };
        for (key, kind) in keys.iter().zip(&kinds) {
            dataset.add_column(key, kind.unwrap_or(ColumnKind::Text));
        }

        for (geometry, props) in rows {
            let values = keys
                .iter()
                .zip(&dataset.columns)
                .map(|(key, column)| {
                    props.get(key).map_or(AttributeValue::Null, |v| {
                        AttributeValue::from_json(v).0.coerce(column.kind)
                    })
                })
                .collect();
            dataset.features.push(Feature { geometry, values });
        }
        dataset
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::{point, Geometry};
    use serde_json::json;

    fn props(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_add_column_dedupes_and_avoids_reserved() {
        let mut ds = Dataset::default();
        assert_eq!(ds.add_column("Name", ColumnKind::Text), "name");
        assert_eq!(ds.add_column("NAME", ColumnKind::Text), "name_1");
        assert_eq!(ds.add_column("geom", ColumnKind::Text), "geom_1");
        assert_eq!(ds.add_column("gid", ColumnKind::Integer), "gid_1");
        assert_eq!(ds.columns.len(), 4);
    }

    #[test]
    fn test_from_json_rows_infers_kinds() {
        let p: Geometry<f64> = point!(x: 100.5, y: 13.7).into();
        let rows = vec![
            (Some(p.clone()), props(json!({"name": "a", "pop": 10, "area": 1, "ok": true}))),
            (Some(p), props(json!({"name": "b", "pop": 20, "area": 2.5, "ok": null, "extra": "x"}))),
        ];
        let ds = Dataset::from_json_rows(rows, None);

        let kinds: Vec<_> = ds.columns.iter().map(|c| (c.name.as_str(), c.kind)).collect();
        assert_eq!(
            kinds,
            vec![
                ("name", ColumnKind::Text),
                ("pop", ColumnKind::Integer),
                ("area", ColumnKind::Float),
                ("ok", ColumnKind::Boolean),
                ("extra", ColumnKind::Text),
            ]
        );
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.features[0].values[2], AttributeValue::Float(1.0));
        assert_eq!(ds.features[0].values[4], AttributeValue::Null);
        assert_eq!(ds.features[1].values[3], AttributeValue::Null);
        assert_eq!(ds.source_srid(), 4326);
    }

    #[test]
    fn test_mixed_kinds_widen_to_text() {
        let rows = vec![
            (None, props(json!({"code": 7}))),
            (None, props(json!({"code": "A7"}))),
        ];
        let ds = Dataset::from_json_rows(rows, Some(32647));
        assert_eq!(ds.columns[0].kind, ColumnKind::Text);
        assert_eq!(ds.features[0].values[0], AttributeValue::Text("7".to_string()));
        assert_eq!(ds.source_srid(), 32647);
    }

    #[test]
    fn test_kind_from_sql_type() {
        assert_eq!(ColumnKind::from_sql_type("bigint"), ColumnKind::Integer);
        assert_eq!(ColumnKind::from_sql_type("double precision"), ColumnKind::Float);
        assert_eq!(ColumnKind::from_sql_type("date"), ColumnKind::Date);
        assert_eq!(ColumnKind::from_sql_type("character varying"), ColumnKind::Text);
        assert_eq!(ColumnKind::from_sql_type("USER-DEFINED"), ColumnKind::Text);
    }

    #[test]
    fn test_coerce() {
        assert_eq!(
            AttributeValue::Text(" 42 ".into()).coerce(ColumnKind::Integer),
            AttributeValue::Integer(42)
        );
        assert_eq!(
            AttributeValue::Text("2024-02-29".into()).coerce(ColumnKind::Date),
            AttributeValue::Date(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap())
        );
        assert_eq!(AttributeValue::Float(1.5).coerce(ColumnKind::Integer), AttributeValue::Null);
        assert_eq!(AttributeValue::Boolean(true).coerce(ColumnKind::Text), AttributeValue::Text("true".into()));
    }
}
