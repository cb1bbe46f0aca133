use crate::types::{DbType, DbValue, ParameterDirection};

/// Parameter object handed to a native command.
#[derive(Debug, Clone, PartialEq)]
pub struct DbParameter {
    pub name: String,
    pub value: DbValue,
    pub direction: ParameterDirection,
    /// `None` leaves the driver's default store type in place.
    pub db_type: Option<DbType>,
    pub is_nullable: bool,
    pub size: Option<usize>,
}

impl DbParameter {
    #[must_use]
    pub fn new(name: impl Into<String>, value: DbValue) -> Self {
        Self {
            name: name.into(),
            value,
            direction: ParameterDirection::Input,
            db_type: None,
            is_nullable: false,
            size: None,
        }
    }

    #[must_use]
    pub fn with_db_type(mut self, db_type: DbType) -> Self {
        self.db_type = Some(db_type);
        self
    }

    #[must_use]
    pub fn nullable(mut self, is_nullable: bool) -> Self {
        self.is_nullable = is_nullable;
        self
    }

    #[must_use]
    pub fn with_size(mut self, size: usize) -> Self {
        self.size = Some(size);
        self
    }
}

impl Default for DbParameter {
    fn default() -> Self {
        Self::new(String::new(), DbValue::Null)
    }
}
