use std::fmt;

use crate::driver::DbParameter;
use crate::types::{DbType, DbValue};

/// Mapping between a value kind and a store type, used to build native parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeMapping {
    pub store_type: String,
    pub db_type: Option<DbType>,
    pub size: Option<usize>,
}

impl TypeMapping {
    #[must_use]
    pub fn new(store_type: impl Into<String>, db_type: Option<DbType>) -> Self {
        Self {
            store_type: store_type.into(),
            db_type,
            size: None,
        }
    }

    /// Mapping used for values that are statically known to be NULL.
    #[must_use]
    pub fn null() -> Self {
        Self::new("NULL", None)
    }

    #[must_use]
    pub fn int() -> Self {
        Self::new("int", Some(DbType::Int32))
    }

    #[must_use]
    pub fn bigint() -> Self {
        Self::new("bigint", Some(DbType::Int64))
    }

    #[must_use]
    pub fn with_size(mut self, size: usize) -> Self {
        self.size = Some(size);
        self
    }

    /// Build the native parameter for `value`.
    ///
    /// `nullable` of `None` leaves the driver default in place, as does a mapping
    /// without a `db_type`.
    #[must_use]
    pub fn create_parameter(
        &self,
        name: &str,
        value: DbValue,
        nullable: Option<bool>,
    ) -> DbParameter {
        let mut parameter = DbParameter::new(name, value);
        if let Some(is_nullable) = nullable {
            parameter.is_nullable = is_nullable;
        }
        if let Some(db_type) = self.db_type {
            parameter.db_type = Some(db_type);
        }
        if let Some(size) = self.size {
            parameter.size = Some(size);
        }
        parameter
    }
}

/// Lookup of type mappings for values whose store type is only known at bind time.
pub trait TypeMappingSource: Send + Sync + fmt::Debug {
    fn find_mapping(&self, value: &DbValue) -> Option<TypeMapping>;
}

/// General-purpose mappings keyed by the value variant.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultTypeMappingSource;

impl TypeMappingSource for DefaultTypeMappingSource {
    fn find_mapping(&self, value: &DbValue) -> Option<TypeMapping> {
        let mapping = match value {
            DbValue::Null => return None,
            DbValue::Bool(_) => TypeMapping::new("bit", Some(DbType::Boolean)),
            DbValue::Int(_) => TypeMapping::int(),
            DbValue::BigInt(_) => TypeMapping::bigint(),
            DbValue::Float(_) => TypeMapping::new("float", Some(DbType::Double)),
            DbValue::Text(_) | DbValue::Json(_) => {
                TypeMapping::new("nvarchar(max)", Some(DbType::String))
            }
            DbValue::Timestamp(_) => TypeMapping::new("datetime2", Some(DbType::DateTime)),
            DbValue::Blob(_) => TypeMapping::new("varbinary(max)", Some(DbType::Binary)),
        };
        Some(mapping)
    }
}
