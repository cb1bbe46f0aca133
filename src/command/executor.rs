use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::{CommandParameterObject, RelationalCommand, RelationalDataReader};
use crate::connection::RelationalConnection;
use crate::diagnostics::{
    CommandCorrelation, CommandEventData, CommandResult, DiagnosticEvent, DiagnosticsLogger,
};
use crate::driver::{DbCommand, DbParameter};
use crate::error::{DriverError, RelationalDbError};
use crate::parameters::bind_parameters;
use crate::types::DbCommandMethod;

/// A successful native execution whose command and lease have not been released yet.
pub(super) struct Executed<'c> {
    connection: &'c mut RelationalConnection,
    command: Box<dyn DbCommand>,
    result: CommandResult,
    data: CommandEventData,
    logger: DiagnosticsLogger,
}

impl<'c> Executed<'c> {
    /// Release the command and the lease, keeping the result.
    pub(super) fn finish(mut self) -> Result<CommandResult, RelationalDbError> {
        release_command(self.command.as_mut());
        self.connection.close()?;
        Ok(self.result)
    }

    pub(super) async fn finish_async(mut self) -> Result<CommandResult, RelationalDbError> {
        release_command(self.command.as_mut());
        self.connection.close_async().await?;
        Ok(self.result)
    }

    /// Hand the command, cursor and lease over to a data reader.
    pub(super) fn into_reader(self) -> Result<RelationalDataReader<'c>, RelationalDbError> {
        let Executed {
            connection,
            mut command,
            result,
            data,
            logger,
        } = self;
        match result {
            CommandResult::Reader(reader) => Ok(RelationalDataReader::new(
                connection, command, reader, &data, logger,
            )),
            other => {
                release_command(command.as_mut());
                connection.close()?;
                Err(super::unexpected(DbCommandMethod::ExecuteReader, &other))
            }
        }
    }
}

impl RelationalCommand {
    pub(super) fn execute_native<'c>(
        &self,
        method: DbCommandMethod,
        parameter_object: CommandParameterObject<'c>,
    ) -> Result<Executed<'c>, RelationalDbError> {
        let CommandParameterObject {
            connection,
            parameter_values,
            logger,
        } = parameter_object;
        let logger = logger.cloned().unwrap_or_else(|| connection.logger().clone());
        let parameters = bind_parameters(
            &self.parameters,
            parameter_values,
            connection.type_mappings().as_ref(),
        )?;

        connection.open(false)?;
        let (mut command, data) =
            match self.create_command(connection, &logger, method, false, parameters) {
                Ok(created) => created,
                Err(err) => {
                    release_lease(connection);
                    return Err(err);
                }
            };

        logger.emit(DiagnosticEvent::CommandExecuting(data.clone()));
        let start = Instant::now();
        let result = match intercept_executing(&logger, command.as_mut(), &data) {
            Some(result) => Ok(result),
            None => match method {
                DbCommandMethod::ExecuteNonQuery => {
                    command.execute_non_query().map(CommandResult::RowsAffected)
                }
                DbCommandMethod::ExecuteScalar => {
                    command.execute_scalar().map(CommandResult::Scalar)
                }
                DbCommandMethod::ExecuteReader => {
                    command.execute_reader().map(CommandResult::Reader)
                }
            },
        };

        match result {
            Ok(result) => {
                let result = intercept_executed(&logger, command.as_ref(), &data, result);
                logger.emit(DiagnosticEvent::CommandExecuted {
                    command: data.clone(),
                    result: result.summary(),
                    duration: start.elapsed(),
                });
                Ok(Executed {
                    connection,
                    command,
                    result,
                    data,
                    logger,
                })
            }
            Err(err) => {
                let err = fail_execution(&logger, data, command.as_mut(), err, false, start);
                release_lease(connection);
                Err(err)
            }
        }
    }

    pub(super) async fn execute_native_async<'c>(
        &self,
        method: DbCommandMethod,
        parameter_object: CommandParameterObject<'c>,
        cancel: &CancellationToken,
    ) -> Result<Executed<'c>, RelationalDbError> {
        let CommandParameterObject {
            connection,
            parameter_values,
            logger,
        } = parameter_object;
        let logger = logger.cloned().unwrap_or_else(|| connection.logger().clone());
        let parameters = bind_parameters(
            &self.parameters,
            parameter_values,
            connection.type_mappings().as_ref(),
        )?;

        connection.open_async(cancel, false).await?;
        let (mut command, data) =
            match self.create_command(connection, &logger, method, true, parameters) {
                Ok(created) => created,
                Err(err) => {
                    release_lease_async(connection).await;
                    return Err(err);
                }
            };

        logger.emit(DiagnosticEvent::CommandExecuting(data.clone()));
        let start = Instant::now();
        let result = match intercept_executing(&logger, command.as_mut(), &data) {
            Some(result) => Ok(result),
            None => match method {
                DbCommandMethod::ExecuteNonQuery => command
                    .execute_non_query_async(cancel)
                    .await
                    .map(CommandResult::RowsAffected),
                DbCommandMethod::ExecuteScalar => command
                    .execute_scalar_async(cancel)
                    .await
                    .map(CommandResult::Scalar),
                DbCommandMethod::ExecuteReader => command
                    .execute_reader_async(cancel)
                    .await
                    .map(CommandResult::Reader),
            },
        };

        match result {
            Ok(result) => {
                let result = intercept_executed(&logger, command.as_ref(), &data, result);
                logger.emit(DiagnosticEvent::CommandExecuted {
                    command: data.clone(),
                    result: result.summary(),
                    duration: start.elapsed(),
                });
                Ok(Executed {
                    connection,
                    command,
                    result,
                    data,
                    logger,
                })
            }
            Err(err) => {
                let err = fail_execution(
                    &logger,
                    data,
                    command.as_mut(),
                    err,
                    cancel.is_cancelled(),
                    start,
                );
                release_lease_async(connection).await;
                Err(err)
            }
        }
    }

    /// Create the native command and apply text, transaction, timeout and parameters.
    fn create_command(
        &self,
        connection: &mut RelationalConnection,
        logger: &DiagnosticsLogger,
        method: DbCommandMethod,
        is_async: bool,
        parameters: Vec<DbParameter>,
    ) -> Result<(Box<dyn DbCommand>, CommandEventData), RelationalDbError> {
        let connection_id = connection.connection_id();
        let command_id = Uuid::new_v4();
        logger.emit(DiagnosticEvent::CommandCreating {
            connection_id,
            command_id,
            method,
            is_async,
        });

        let start = Instant::now();
        let transaction = connection
            .current_transaction()
            .map(|transaction| Arc::clone(transaction.db_transaction()));
        let timeout = connection.command_timeout();
        let correlation = CommandCorrelation {
            connection_id,
            command_id,
            method,
            is_async,
        };
        let mut supplied = None;
        for interceptor in logger.interceptors() {
            supplied = interceptor.command_creating(&correlation, supplied);
        }
        let mut command = match supplied {
            Some(command) => command,
            None => connection.db_connection()?.create_command(),
        };
        logger.emit(DiagnosticEvent::CommandCreated {
            connection_id,
            command_id,
            method,
            is_async,
            duration: start.elapsed(),
        });

        command.set_command_text(&self.command_text);
        command.set_transaction(transaction);
        if let Some(timeout) = timeout {
            command.set_command_timeout(timeout);
        }
        for parameter in parameters {
            command.add_parameter(parameter);
        }

        let data = CommandEventData {
            connection_id,
            command_id,
            method,
            is_async,
            command_text: self.command_text.clone(),
            parameters: command.parameters(),
            command_timeout: command.command_timeout(),
        };
        logger.emit(DiagnosticEvent::CommandInitialized(data.clone()));
        Ok((command, data))
    }
}

fn intercept_executing(
    logger: &DiagnosticsLogger,
    command: &mut dyn DbCommand,
    data: &CommandEventData,
) -> Option<CommandResult> {
    let mut result = None;
    for interceptor in logger.interceptors() {
        result = interceptor.command_executing(&mut *command, data, result);
    }
    result
}

fn intercept_executed(
    logger: &DiagnosticsLogger,
    command: &dyn DbCommand,
    data: &CommandEventData,
    mut result: CommandResult,
) -> CommandResult {
    for interceptor in logger.interceptors() {
        result = interceptor.command_executed(command, data, result);
    }
    result
}

/// Report a failed execution and release the native command.
fn fail_execution(
    logger: &DiagnosticsLogger,
    data: CommandEventData,
    command: &mut dyn DbCommand,
    err: DriverError,
    token_canceled: bool,
    start: Instant,
) -> RelationalDbError {
    let duration = start.elapsed();
    let err = RelationalDbError::from_driver(err, token_canceled);
    for interceptor in logger.interceptors() {
        if err.is_canceled() {
            interceptor.command_canceled(&*command, &data);
        } else {
            interceptor.command_failed(&*command, &data, &err);
        }
    }
    if err.is_canceled() {
        logger.emit(DiagnosticEvent::CommandCanceled {
            command: data,
            duration,
        });
    } else {
        logger.emit(DiagnosticEvent::CommandError {
            command: data,
            error: err.to_string(),
            duration,
        });
    }
    release_command(command);
    err
}

pub(super) fn release_command(command: &mut dyn DbCommand) {
    command.clear_parameters();
    command.dispose();
}

// The execution error wins over a failure to return the lease.
fn release_lease(connection: &mut RelationalConnection) {
    if let Err(err) = connection.close() {
        tracing::warn!("closing the connection after a failed execution failed: {err}");
    }
}

async fn release_lease_async(connection: &mut RelationalConnection) {
    if let Err(err) = connection.close_async().await {
        tracing::warn!("closing the connection after a failed execution failed: {err}");
    }
}
