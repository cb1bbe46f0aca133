use rusqlite::Statement;
use rusqlite::types::Value;

use crate::driver::DbParameter;
use crate::error::DriverError;
use crate::types::DbValue;

/// Convert a bound value to its `SQLite` storage form.
#[must_use]
pub fn db_value_to_sqlite(value: &DbValue) -> Value {
    match value {
        DbValue::Null => Value::Null,
        DbValue::Bool(b) => Value::Integer(i64::from(*b)),
        DbValue::Int(i) => Value::Integer(i64::from(*i)),
        DbValue::BigInt(i) => Value::Integer(*i),
        DbValue::Float(f) => Value::Real(*f),
        DbValue::Text(s) => Value::Text(s.clone()),
        DbValue::Timestamp(dt) => Value::Text(dt.format("%F %T%.f").to_string()),
        DbValue::Json(json) => Value::Text(json.to_string()),
        DbValue::Blob(bytes) => Value::Blob(bytes.clone()),
    }
}

/// Convert a column value read from `SQLite`. Integers always widen to `BigInt`.
#[must_use]
pub fn sqlite_to_db_value(value: Value) -> DbValue {
    match value {
        Value::Null => DbValue::Null,
        Value::Integer(i) => DbValue::BigInt(i),
        Value::Real(f) => DbValue::Float(f),
        Value::Text(s) => DbValue::Text(s),
        Value::Blob(b) => DbValue::Blob(b),
    }
}

/// Bind native parameters to a prepared statement.
///
/// Named parameters are matched with or without their `@`, `:` or `$` prefix; unnamed ones
/// bind positionally.
///
/// # Errors
/// Returns `DriverError` if a named parameter does not occur in the statement.
pub fn bind_statement(
    stmt: &mut Statement<'_>,
    parameters: &[DbParameter],
) -> Result<(), DriverError> {
    for (position, parameter) in parameters.iter().enumerate() {
        let index = if parameter.name.is_empty() {
            position + 1
        } else {
            parameter_index(stmt, &parameter.name)?.ok_or_else(|| {
                DriverError::invalid_operation(format!(
                    "parameter '{}' does not occur in the statement",
                    parameter.name
                ))
            })?
        };
        stmt.raw_bind_parameter(index, db_value_to_sqlite(&parameter.value))?;
    }
    Ok(())
}

fn parameter_index(stmt: &Statement<'_>, name: &str) -> Result<Option<usize>, DriverError> {
    if name.starts_with(['@', ':', '$']) {
        return Ok(stmt.parameter_index(name)?);
    }
    for prefix in ['@', ':', '$'] {
        if let Some(index) = stmt.parameter_index(&format!("{prefix}{name}"))? {
            return Ok(Some(index));
        }
    }
    Ok(None)
}
