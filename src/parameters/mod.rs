//! Logical command parameters and their binding to native parameters.

pub mod type_mapping;

use std::collections::HashMap;

use crate::driver::DbParameter;
use crate::error::RelationalDbError;
use crate::types::DbValue;

pub use type_mapping::{DefaultTypeMappingSource, TypeMapping, TypeMappingSource};

/// A value supplied for a logical parameter at execution time.
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterValue {
    /// A single value.
    Value(DbValue),
    /// Ordered values for a composite parameter.
    Array(Vec<DbValue>),
    /// A ready-made native parameter, passed through by dynamic parameters.
    Native(DbParameter),
}

macro_rules! parameter_value_from {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for ParameterValue {
                fn from(value: $ty) -> Self {
                    ParameterValue::Value(value.into())
                }
            }
        )*
    };
}

parameter_value_from!(DbValue, i32, i64, bool, f64, &str, String);

impl From<Vec<DbValue>> for ParameterValue {
    fn from(values: Vec<DbValue>) -> Self {
        ParameterValue::Array(values)
    }
}

impl From<DbParameter> for ParameterValue {
    fn from(parameter: DbParameter) -> Self {
        ParameterValue::Native(parameter)
    }
}

/// Values keyed by parameter invariant name.
pub type ParameterValues = HashMap<String, ParameterValue>;

/// A parameter declared on a command.
#[derive(Debug, Clone, PartialEq)]
pub enum RelationalParameter {
    /// Store type known up front.
    TypeMapped {
        invariant_name: String,
        name: String,
        type_mapping: TypeMapping,
        nullable: Option<bool>,
    },
    /// Store type inferred from the bound value.
    Dynamic {
        invariant_name: String,
        name: String,
    },
    /// One logical value expanding into several native parameters.
    Composite {
        invariant_name: String,
        parameters: Vec<RelationalParameter>,
    },
    /// A fixed native parameter that needs no value lookup.
    Raw {
        invariant_name: String,
        parameter: DbParameter,
    },
}

impl RelationalParameter {
    #[must_use]
    pub fn type_mapped(
        invariant_name: impl Into<String>,
        name: impl Into<String>,
        type_mapping: TypeMapping,
        nullable: Option<bool>,
    ) -> Self {
        RelationalParameter::TypeMapped {
            invariant_name: invariant_name.into(),
            name: name.into(),
            type_mapping,
            nullable,
        }
    }

    #[must_use]
    pub fn dynamic(invariant_name: impl Into<String>, name: impl Into<String>) -> Self {
        RelationalParameter::Dynamic {
            invariant_name: invariant_name.into(),
            name: name.into(),
        }
    }

    #[must_use]
    pub fn composite(
        invariant_name: impl Into<String>,
        parameters: Vec<RelationalParameter>,
    ) -> Self {
        RelationalParameter::Composite {
            invariant_name: invariant_name.into(),
            parameters,
        }
    }

    #[must_use]
    pub fn raw(invariant_name: impl Into<String>, parameter: DbParameter) -> Self {
        RelationalParameter::Raw {
            invariant_name: invariant_name.into(),
            parameter,
        }
    }

    #[must_use]
    pub fn invariant_name(&self) -> &str {
        match self {
            RelationalParameter::TypeMapped { invariant_name, .. }
            | RelationalParameter::Dynamic { invariant_name, .. }
            | RelationalParameter::Composite { invariant_name, .. }
            | RelationalParameter::Raw { invariant_name, .. } => invariant_name,
        }
    }

    /// Resolve this parameter from the value dictionary and append the resulting native
    /// parameters to `out`.
    ///
    /// # Errors
    /// Returns `MissingParameterValue` when no value is supplied, `ParameterNotArray` when a
    /// composite parameter receives a single value.
    pub fn bind(
        &self,
        values: Option<&ParameterValues>,
        type_mappings: &dyn TypeMappingSource,
        out: &mut Vec<DbParameter>,
    ) -> Result<(), RelationalDbError> {
        if let RelationalParameter::Raw { parameter, .. } = self {
            out.push(parameter.clone());
            return Ok(());
        }
        let value = values
            .and_then(|v| v.get(self.invariant_name()))
            .ok_or_else(|| RelationalDbError::MissingParameterValue(self.invariant_name().into()))?;
        self.bind_value(value, type_mappings, out)
    }

    /// Bind an already resolved value.
    ///
    /// # Errors
    /// See [`RelationalParameter::bind`].
    pub fn bind_value(
        &self,
        value: &ParameterValue,
        type_mappings: &dyn TypeMappingSource,
        out: &mut Vec<DbParameter>,
    ) -> Result<(), RelationalDbError> {
        match self {
            RelationalParameter::TypeMapped {
                invariant_name,
                name,
                type_mapping,
                nullable,
            } => match value {
                ParameterValue::Value(v) => {
                    out.push(type_mapping.create_parameter(name, v.clone(), *nullable));
                    Ok(())
                }
                ParameterValue::Array(_) | ParameterValue::Native(_) => {
                    Err(RelationalDbError::ParameterError(format!(
                        "parameter '{invariant_name}' expects a single value"
                    )))
                }
            },
            RelationalParameter::Dynamic { invariant_name, name } => match value {
                ParameterValue::Native(parameter) => {
                    out.push(parameter.clone());
                    Ok(())
                }
                ParameterValue::Value(v) => {
                    let mapping = type_mappings
                        .find_mapping(v)
                        .unwrap_or_else(TypeMapping::null);
                    out.push(mapping.create_parameter(name, v.clone(), None));
                    Ok(())
                }
                ParameterValue::Array(_) => Err(RelationalDbError::ParameterError(format!(
                    "parameter '{invariant_name}' expects a single value"
                ))),
            },
            RelationalParameter::Composite {
                invariant_name,
                parameters,
            } => {
                let ParameterValue::Array(inner) = value else {
                    return Err(RelationalDbError::ParameterNotArray(invariant_name.clone()));
                };
                if let Some(missing) = parameters.get(inner.len()) {
                    return Err(RelationalDbError::MissingParameterValue(
                        missing.invariant_name().to_owned(),
                    ));
                }
                for (parameter, v) in parameters.iter().zip(inner) {
                    parameter.bind_value(&ParameterValue::Value(v.clone()), type_mappings, out)?;
                }
                Ok(())
            }
            RelationalParameter::Raw { parameter, .. } => {
                out.push(parameter.clone());
                Ok(())
            }
        }
    }
}

/// Bind every declared parameter in order.
///
/// # Errors
/// Returns the first binding failure; nothing is returned partially bound.
pub fn bind_parameters(
    parameters: &[RelationalParameter],
    values: Option<&ParameterValues>,
    type_mappings: &dyn TypeMappingSource,
) -> Result<Vec<DbParameter>, RelationalDbError> {
    let mut bound = Vec::with_capacity(parameters.len());
    for parameter in parameters {
        parameter.bind(values, type_mappings, &mut bound)?;
    }
    Ok(bound)
}
