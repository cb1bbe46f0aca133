use super::RelationalCommand;
use crate::driver::DbParameter;
use crate::parameters::{RelationalParameter, TypeMapping};

/// Accumulates SQL text and parameter declarations into a [`RelationalCommand`].
#[derive(Debug, Clone, Default)]
pub struct RelationalCommandBuilder {
    command_text: String,
    parameters: Vec<RelationalParameter>,
}

impl RelationalCommandBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn append(mut self, sql: &str) -> Self {
        self.command_text.push_str(sql);
        self
    }

    #[must_use]
    pub fn append_line(mut self, sql: &str) -> Self {
        self.command_text.push_str(sql);
        self.command_text.push('\n');
        self
    }

    /// Declare a parameter with a known type mapping. `nullable` of `None` leaves the driver
    /// default.
    #[must_use]
    pub fn add_parameter(
        mut self,
        invariant_name: &str,
        name: &str,
        type_mapping: TypeMapping,
        nullable: Option<bool>,
    ) -> Self {
        self.parameters.push(RelationalParameter::type_mapped(
            invariant_name,
            name,
            type_mapping,
            nullable,
        ));
        self
    }

    /// Declare a parameter bound from an array value, one sub-parameter per element.
    #[must_use]
    pub fn add_composite_parameter(
        mut self,
        invariant_name: &str,
        parameters: Vec<RelationalParameter>,
    ) -> Self {
        self.parameters
            .push(RelationalParameter::composite(invariant_name, parameters));
        self
    }

    /// Declare a parameter whose mapping is chosen from the bound value.
    #[must_use]
    pub fn add_dynamic_parameter(mut self, invariant_name: &str, name: &str) -> Self {
        self.parameters
            .push(RelationalParameter::dynamic(invariant_name, name));
        self
    }

    /// Add a ready-made native parameter.
    #[must_use]
    pub fn add_raw_parameter(mut self, invariant_name: &str, parameter: DbParameter) -> Self {
        self.parameters
            .push(RelationalParameter::raw(invariant_name, parameter));
        self
    }

    #[must_use]
    pub fn parameters(&self) -> &[RelationalParameter] {
        &self.parameters
    }

    #[must_use]
    pub fn build(self) -> RelationalCommand {
        RelationalCommand::new(self.command_text, self.parameters)
    }
}
