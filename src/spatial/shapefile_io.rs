//! Shapefile reading and writing
//!
//! Geometries go through `geo_types`; attributes through the `dbase` crate
//! re-exported by `shapefile`.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use geo_types::{Geometry, LineString, MultiPolygon, Polygon as GeoPolygon};
use shapefile::dbase::{self, FieldName, FieldValue, TableWriterBuilder};
use shapefile::record::{EsriShape, WritableShape};
use shapefile::{HasShapeType, Multipoint, Point, Polygon, PolygonRing, Polyline, Shape, ShapeType};

use super::dataset::{AttributeValue, ColumnKind, Dataset, Feature};
use super::{prj, SpatialError, WGS84_SRID};

/// DBF field names are limited to 10 bytes
const DBF_NAME_LEN: usize = 10;
/// Longest DBF character field
const DBF_MAX_CHAR_LEN: usize = 254;

const WGS84_PRJ: &str = r#"GEOGCS["GCS_WGS_1984",DATUM["D_WGS_1984",SPHEROID["WGS_1984",6378137.0,298.257223563]],PRIMEM["Greenwich",0.0],UNIT["Degree",0.0174532925199433]]"#;

/// Locate a sibling file such as `roads.dbf`, accepting either extension case
fn sibling(shp_path: &Path, ext: &str) -> Option<PathBuf> {
    [ext.to_lowercase(), ext.to_uppercase()]
        .into_iter()
        .map(|e| shp_path.with_extension(e))
        .find(|p| p.is_file())
}

/// Read a `.shp` plus its optional `.dbf` and `.prj` siblings
pub fn read_shapefile(shp_path: &Path) -> Result<Dataset, SpatialError> {
    let shapes = shapefile::read_shapes(shp_path)?;

    let mut dataset = Dataset {
        srid: prj::detect_srid_for(shp_path)?,
        ..Dataset::default()
    };

    let (field_names, records, numeric) = match sibling(shp_path, "dbf") {
        Some(dbf_path) => {
            let mut reader = dbase::Reader::from_path(&dbf_path)?;
            let fields: Vec<(String, dbase::FieldType)> = reader
                .fields()
                .iter()
                .filter(|f| f.name() != "DeletionFlag")
                .map(|f| (f.name().to_string(), f.field_type()))
                .collect();
            let records = reader.read()?;

            let mut numeric = Vec::new();
            for (idx, (name, field_type)) in fields.iter().enumerate() {
                let kind = column_kind(*field_type);
                dataset.add_column(name, kind);
                if matches!(field_type, dbase::FieldType::Numeric) {
                    numeric.push(idx);
                }
            }
            let names: Vec<String> = fields.into_iter().map(|(name, _)| name).collect();
            (names, records, numeric)
        }
        None => {
            tracing::warn!(path = %shp_path.display(), "No .dbf found; importing geometry only");
            (Vec::new(), Vec::new(), Vec::new())
        }
    };

    for (idx, shape) in shapes.into_iter().enumerate() {
        let geometry = match shape {
            Shape::NullShape => None,
            other => Some(
                Geometry::<f64>::try_from(other)
                    .map_err(|e| SpatialError::InvalidGeometry(e.to_string()))?,
            ),
        };
        let values = match records.get(idx) {
            Some(record) => field_names
                .iter()
                .zip(&dataset.columns)
                .map(|(name, column)| {
                    record
                        .get(name)
                        .map_or(AttributeValue::Null, attribute_from_dbf)
                        .coerce(column.kind)
                })
                .collect(),
            None => vec![AttributeValue::Null; dataset.columns.len()],
        };
        dataset.features.push(Feature { geometry, values });
    }

    for idx in numeric {
        narrow_integral_column(&mut dataset, idx);
    }

    Ok(dataset)
}

fn column_kind(field_type: dbase::FieldType) -> ColumnKind {
    match field_type {
        dbase::FieldType::Numeric
        | dbase::FieldType::Float
        | dbase::FieldType::Double
        | dbase::FieldType::Currency => ColumnKind::Float,
        dbase::FieldType::Integer => ColumnKind::Integer,
        dbase::FieldType::Logical => ColumnKind::Boolean,
        dbase::FieldType::Date => ColumnKind::Date,
        _ => ColumnKind::Text,
    }
}

fn attribute_from_dbf(value: &FieldValue) -> AttributeValue {
    match value {
        FieldValue::Character(Some(s)) => AttributeValue::Text(s.trim_end().to_string()),
        FieldValue::Memo(s) => AttributeValue::Text(s.clone()),
        FieldValue::Numeric(Some(n)) => AttributeValue::Float(*n),
        FieldValue::Float(Some(f)) => AttributeValue::Float(f64::from(*f)),
        FieldValue::Double(d) | FieldValue::Currency(d) => AttributeValue::Float(*d),
        FieldValue::Integer(i) => AttributeValue::Integer(i64::from(*i)),
        FieldValue::Logical(Some(b)) => AttributeValue::Boolean(*b),
        #[allow(clippy::cast_possible_wrap)]
        FieldValue::Date(Some(d)) => NaiveDate::from_ymd_opt(d.year() as i32, d.month(), d.day())
            .map_or(AttributeValue::Null, AttributeValue::Date),
        _ => AttributeValue::Null,
    }
}

/// DBF `N` fields carry no integer/float distinction we can rely on, so a
/// column whose values are all whole numbers is imported as an integer.
fn narrow_integral_column(dataset: &mut Dataset, idx: usize) {
    const MAX_EXACT: f64 = 9_007_199_254_740_992.0;
    let integral = dataset.features.iter().all(|f| match &f.values[idx] {
        AttributeValue::Float(v) => v.fract() == 0.0 && v.abs() < MAX_EXACT,
        _ => true,
    });
    let any_value = dataset
        .features
        .iter()
        .any(|f| !matches!(f.values[idx], AttributeValue::Null));
    if !integral || !any_value {
        return;
    }
    dataset.columns[idx].kind = ColumnKind::Integer;
    for feature in &mut dataset.features {
        let value = std::mem::replace(&mut feature.values[idx], AttributeValue::Null);
        feature.values[idx] = value.coerce(ColumnKind::Integer);
    }
}

/// Shapefile geometry family; a shapefile holds exactly one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ShapeFamily {
    Point,
    Multipoint,
    Polyline,
    Polygon,
}

impl ShapeFamily {
    fn of(geometry: &Geometry<f64>) -> Result<Self, SpatialError> {
        match geometry {
            Geometry::Point(_) => Ok(Self::Point),
            Geometry::MultiPoint(_) => Ok(Self::Multipoint),
            Geometry::Line(_) | Geometry::LineString(_) | Geometry::MultiLineString(_) => {
                Ok(Self::Polyline)
            }
            Geometry::Polygon(_)
            | Geometry::MultiPolygon(_)
            | Geometry::Rect(_)
            | Geometry::Triangle(_) => Ok(Self::Polygon),
            Geometry::GeometryCollection(_) => Err(SpatialError::InvalidGeometry(
                "geometry collections cannot be written to a shapefile".to_string(),
            )),
        }
    }

    /// Family able to hold both; points widen to multipoints
    fn merge(self, other: Self) -> Option<Self> {
        match (self, other) {
            (a, b) if a == b => Some(a),
            (Self::Point, Self::Multipoint) | (Self::Multipoint, Self::Point) => {
                Some(Self::Multipoint)
            }
            _ => None,
        }
    }
}

fn layer_family(dataset: &Dataset) -> Result<Option<ShapeFamily>, SpatialError> {
    let mut family: Option<ShapeFamily> = None;
    for geometry in dataset.features.iter().filter_map(|f| f.geometry.as_ref()) {
        let next = ShapeFamily::of(geometry)?;
        family = match family {
            None => Some(next),
            Some(current) => Some(current.merge(next).ok_or_else(|| {
                SpatialError::MixedGeometry(format!("{current:?}, {next:?}"))
            })?),
        };
    }
    Ok(family)
}

fn shp_point(c: geo_types::Coord<f64>) -> Point {
    Point::new(c.x, c.y)
}

fn line_part(line: &LineString<f64>) -> Option<Vec<Point>> {
    (line.0.len() >= 2).then(|| line.coords().copied().map(shp_point).collect())
}

fn polygon_rings(polygon: &GeoPolygon<f64>, rings: &mut Vec<PolygonRing<Point>>) {
    let ring = |line: &LineString<f64>| -> Option<Vec<Point>> {
        (line.0.len() >= 4).then(|| line.coords().copied().map(shp_point).collect())
    };
    if let Some(outer) = ring(polygon.exterior()) {
        rings.push(PolygonRing::Outer(outer));
        rings.extend(polygon.interiors().iter().filter_map(ring).map(PolygonRing::Inner));
    }
}

enum ShapeOut {
    Point(Point),
    Multipoint(Multipoint),
    Polyline(Polyline),
    Polygon(Polygon),
}

fn to_shape(geometry: &Geometry<f64>, family: ShapeFamily) -> Result<ShapeOut, SpatialError> {
    let degenerate = || SpatialError::InvalidGeometry(format!("degenerate {family:?} geometry"));
    match (family, geometry) {
        (ShapeFamily::Point, Geometry::Point(p)) => Ok(ShapeOut::Point(shp_point(p.0))),
        (ShapeFamily::Multipoint, Geometry::Point(p)) => {
            Ok(ShapeOut::Multipoint(Multipoint::new(vec![shp_point(p.0)])))
        }
        (ShapeFamily::Multipoint, Geometry::MultiPoint(mp)) if !mp.0.is_empty() => Ok(
            ShapeOut::Multipoint(Multipoint::new(mp.iter().map(|p| shp_point(p.0)).collect())),
        ),
        (ShapeFamily::Polyline, geometry) => {
            let parts: Vec<Vec<Point>> = match geometry {
                Geometry::Line(l) => vec![vec![shp_point(l.start), shp_point(l.end)]],
                Geometry::LineString(ls) => line_part(ls).into_iter().collect(),
                Geometry::MultiLineString(mls) => mls.iter().filter_map(line_part).collect(),
                _ => Vec::new(),
            };
            if parts.is_empty() {
                return Err(degenerate());
            }
            Ok(ShapeOut::Polyline(Polyline::with_parts(parts)))
        }
        (ShapeFamily::Polygon, geometry) => {
            let polygons: MultiPolygon<f64> = match geometry {
                Geometry::Polygon(p) => MultiPolygon(vec![p.clone()]),
                Geometry::MultiPolygon(mp) => mp.clone(),
                Geometry::Rect(r) => MultiPolygon(vec![r.to_polygon()]),
                Geometry::Triangle(t) => MultiPolygon(vec![t.to_polygon()]),
                _ => MultiPolygon(Vec::new()),
            };
            let mut rings = Vec::new();
            for polygon in &polygons {
                polygon_rings(polygon, &mut rings);
            }
            if rings.is_empty() {
                return Err(degenerate());
            }
            Ok(ShapeOut::Polygon(Polygon::with_rings(rings)))
        }
        _ => Err(degenerate()),
    }
}

/// Planned DBF column: truncated name, output encoding, width
struct DbfColumn {
    name: String,
    kind: ColumnKind,
    width: usize,
}

/// Truncate to 10 bytes and de-duplicate with a numeric suffix
fn dbf_field_names<'a>(names: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut used: Vec<String> = Vec::new();
    for name in names {
        let base = truncate_bytes(name, DBF_NAME_LEN).to_string();
        let mut candidate = base.clone();
        let mut suffix = 1;
        while used.iter().any(|u| u.eq_ignore_ascii_case(&candidate)) {
            let tag = format!("_{suffix}");
            candidate = format!("{}{tag}", truncate_bytes(&base, DBF_NAME_LEN - tag.len()));
            suffix += 1;
        }
        used.push(candidate);
    }
    used
}

fn truncate_bytes(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

fn plan_columns(dataset: &Dataset) -> Vec<DbfColumn> {
    let names = dbf_field_names(dataset.columns.iter().map(|c| c.name.as_str()));
    dataset
        .columns
        .iter()
        .zip(names)
        .enumerate()
        .map(|(idx, (column, name))| {
            let width = match column.kind {
                ColumnKind::Text => dataset
                    .features
                    .iter()
                    .map(|f| match &f.values[idx] {
                        AttributeValue::Text(s) => s.len(),
                        _ => 0,
                    })
                    .max()
                    .unwrap_or(0)
                    .clamp(1, DBF_MAX_CHAR_LEN),
                ColumnKind::Date => 10,
                _ => 0,
            };
            DbfColumn {
                name,
                kind: column.kind,
                width,
            }
        })
        .collect()
}

fn table_builder(columns: &[DbfColumn]) -> Result<TableWriterBuilder, SpatialError> {
    let mut builder = TableWriterBuilder::new();
    for column in columns {
        let name = FieldName::try_from(column.name.as_str())
            .map_err(|e| SpatialError::InvalidGeometry(format!("field {}: {e}", column.name)))?;
        #[allow(clippy::cast_possible_truncation)]
        let width = column.width as u8;
        builder = match column.kind {
            ColumnKind::Text | ColumnKind::Date => builder.add_character_field(name, width),
            ColumnKind::Integer => builder.add_numeric_field(name, 20, 0),
            ColumnKind::Float => builder.add_numeric_field(name, 24, 8),
            ColumnKind::Boolean => builder.add_logical_field(name),
        };
    }
    Ok(builder)
}

#[allow(clippy::cast_precision_loss)]
fn dbf_value(value: &AttributeValue, column: &DbfColumn) -> FieldValue {
    match (column.kind, value) {
        (ColumnKind::Text, AttributeValue::Text(s)) => {
            FieldValue::Character(Some(truncate_bytes(s, column.width).to_string()))
        }
        (ColumnKind::Text | ColumnKind::Date, _) => match value {
            AttributeValue::Date(d) => FieldValue::Character(Some(d.format("%Y-%m-%d").to_string())),
            _ => FieldValue::Character(None),
        },
        (ColumnKind::Integer, AttributeValue::Integer(i)) => FieldValue::Numeric(Some(*i as f64)),
        (ColumnKind::Float, AttributeValue::Float(f)) if f.is_finite() => {
            FieldValue::Numeric(Some(*f))
        }
        (ColumnKind::Integer | ColumnKind::Float, _) => FieldValue::Numeric(None),
        (ColumnKind::Boolean, AttributeValue::Boolean(b)) => FieldValue::Logical(Some(*b)),
        (ColumnKind::Boolean, _) => FieldValue::Logical(None),
    }
}

/// `.shp` main header length
const SHP_HEADER_LEN: u64 = 100;
/// Record number plus content length
const RECORD_HEADER_LEN: u64 = 8;
/// Byte range of the Xmin/Ymin/Xmax/Ymax box in the `.shp` and `.shx` headers
const HEADER_BBOX: (u64, usize) = (36, 32);
const NULL_SHAPE_TYPE: i32 = 0;

/// Empty record body for a feature without geometry
///
/// The writer stamps every record with the layer's shape type; the type of
/// these records is rewritten to null once the file is closed.
struct NullRecord<S>(PhantomData<S>);

impl<S> NullRecord<S> {
    const fn new() -> Self {
        Self(PhantomData)
    }
}

impl<S: HasShapeType> HasShapeType for NullRecord<S> {
    fn shapetype() -> ShapeType {
        S::shapetype()
    }
}

impl<S> WritableShape for NullRecord<S> {
    fn size_in_bytes(&self) -> usize {
        0
    }

    fn write_to<T: Write>(&self, _dest: &mut T) -> Result<(), shapefile::Error> {
        Ok(())
    }
}

impl<S: HasShapeType> EsriShape for NullRecord<S> {
    // inverted ranges leave the header bounding box untouched
    fn x_range(&self) -> [f64; 2] {
        [f64::MAX, f64::MIN]
    }

    fn y_range(&self) -> [f64; 2] {
        [f64::MAX, f64::MIN]
    }
}

/// Shapefile writer that tracks where each record's shape type lands
struct RecordWriter {
    writer: shapefile::Writer<BufWriter<File>>,
    offset: u64,
}

impl RecordWriter {
    /// Write one record, returning the file offset of its shape type
    fn write<S: EsriShape>(&mut self, shape: &S, record: &dbase::Record) -> Result<u64, SpatialError> {
        self.writer.write_shape_and_record(shape, record)?;
        let type_offset = self.offset + RECORD_HEADER_LEN;
        self.offset = type_offset + 4 + shape.size_in_bytes() as u64;
        Ok(type_offset)
    }

    fn write_null(&mut self, family: ShapeFamily, record: &dbase::Record) -> Result<u64, SpatialError> {
        match family {
            ShapeFamily::Point => self.write(&NullRecord::<Point>::new(), record),
            ShapeFamily::Multipoint => self.write(&NullRecord::<Multipoint>::new(), record),
            ShapeFamily::Polyline => self.write(&NullRecord::<Polyline>::new(), record),
            ShapeFamily::Polygon => self.write(&NullRecord::<Polygon>::new(), record),
        }
    }
}

/// Stamp the null shape type on the records written by [`RecordWriter::write_null`]
fn mark_null_records(shp_path: &Path, type_offsets: &[u64]) -> Result<(), SpatialError> {
    if type_offsets.is_empty() {
        return Ok(());
    }
    let mut file = OpenOptions::new().write(true).open(shp_path)?;
    for &offset in type_offsets {
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(&NULL_SHAPE_TYPE.to_le_bytes())?;
    }
    Ok(())
}

/// Zero the header bounding box of a layer holding only null records
fn clear_header_bbox(path: &Path) -> Result<(), SpatialError> {
    let (start, len) = HEADER_BBOX;
    let mut file = OpenOptions::new().write(true).open(path)?;
    file.seek(SeekFrom::Start(start))?;
    file.write_all(&vec![0u8; len])?;
    Ok(())
}

/// Write `dataset` as `.shp/.shx/.dbf` (plus `.prj`/`.cpg`) at `shp_path`
///
/// Features without geometry are written as null shapes so every row keeps
/// its attributes. Returns the number of features written.
pub fn write_shapefile(dataset: &Dataset, shp_path: &Path) -> Result<usize, SpatialError> {
    let family = layer_family(dataset)?.unwrap_or(ShapeFamily::Point);
    let columns = plan_columns(dataset);
    let mut out = RecordWriter {
        writer: shapefile::Writer::from_path(shp_path, table_builder(&columns)?)?,
        offset: SHP_HEADER_LEN,
    };

    let mut null_records = Vec::new();
    for feature in &dataset.features {
        let mut record = dbase::Record::default();
        for (column, value) in columns.iter().zip(&feature.values) {
            record.insert(column.name.clone(), dbf_value(value, column));
        }
        let Some(geometry) = &feature.geometry else {
            null_records.push(out.write_null(family, &record)?);
            continue;
        };
        match to_shape(geometry, family)? {
            ShapeOut::Point(s) => out.write(&s, &record)?,
            ShapeOut::Multipoint(s) => out.write(&s, &record)?,
            ShapeOut::Polyline(s) => out.write(&s, &record)?,
            ShapeOut::Polygon(s) => out.write(&s, &record)?,
        };
    }
    drop(out);

    mark_null_records(shp_path, &null_records)?;
    if !dataset.is_empty() && null_records.len() == dataset.len() {
        clear_header_bbox(shp_path)?;
        clear_header_bbox(&shp_path.with_extension("shx"))?;
    }

    if dataset.srid == Some(WGS84_SRID) {
        fs::write(shp_path.with_extension("prj"), WGS84_PRJ)?;
    }
    fs::write(shp_path.with_extension("cpg"), "UTF-8")?;

    Ok(dataset.len())
}
