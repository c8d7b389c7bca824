//! SQL identifier handling
//!
//! Identifiers can't be bound as query parameters, so every name that ends up
//! in SQL text passes through this module.

/// PostgreSQL truncates identifiers beyond this many bytes
pub const MAX_IDENT_LEN: usize = 63;

/// Identifier rejected before reaching SQL
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentError {
    #[error("identifier is empty")]
    Empty,
    #[error("identifier '{0}' is longer than 63 bytes")]
    TooLong(String),
    #[error("identifier '{0}' contains invalid characters")]
    InvalidCharacters(String),
}

/// Double-quote an identifier, doubling embedded quotes
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Derive a table name from an uploaded file name
///
/// The extension is dropped, the stem lowercased and spaces replaced with
/// underscores; anything left outside `[a-z0-9_]` also becomes `_`.
pub fn sanitize_table_name(file_name: &str) -> Result<String, IdentError> {
    let base = file_name.rsplit(['/', '\\']).next().unwrap_or(file_name);
    let stem = base.rfind('.').map_or(base, |idx| &base[..idx]);

    let mut name: String = stem
        .trim()
        .replace(' ', "_")
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' { c } else { '_' })
        .collect();

    if name.trim_matches('_').is_empty() {
        return Err(IdentError::Empty);
    }
    if name.starts_with(|c: char| c.is_ascii_digit()) {
        name.insert_str(0, "layer_");
    }
    name.truncate(MAX_IDENT_LEN);
    Ok(name)
}

/// Validate a user-supplied column name: `[A-Za-z_][A-Za-z0-9_]*`
pub fn validate_field_name(name: &str) -> Result<&str, IdentError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(IdentError::Empty);
    }
    if name.len() > MAX_IDENT_LEN {
        return Err(IdentError::TooLong(name.to_string()));
    }
    let mut chars = name.chars();
    let first_ok = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if !first_ok || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(IdentError::InvalidCharacters(name.to_string()));
    }
    Ok(name)
}

/// Column name derived from a dataset attribute (shapefile or GeoJSON key)
///
/// Always yields something usable; collisions are resolved by the caller.
pub fn sanitize_column_name(raw: &str) -> String {
    let mut name: String = raw
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if name.is_empty() {
        name.push_str("field");
    }
    if name.starts_with(|c: char| c.is_ascii_digit()) {
        name.insert(0, '_');
    }
    name.truncate(MAX_IDENT_LEN);
    name
}
