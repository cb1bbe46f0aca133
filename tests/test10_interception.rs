#![cfg(feature = "test-utils")]

use std::sync::{Arc, Mutex};

use relational_command::diagnostics::{CommandCorrelation, CommandEventData, ExecutionSummary};
use relational_command::prelude::*;
use relational_command::test_utils::{
    FakeCommandExecutor, FakeDbCommand, FakeDbConnection, FakeDbDataReader, FakeProvider,
};

fn connection_with(
    executor: FakeCommandExecutor,
    interceptor: Arc<dyn CommandInterceptor>,
    sink: Arc<MemorySink>,
) -> (FakeDbConnection, RelationalConnection) {
    let native = FakeDbConnection::with_executor("Database=Intercepted", executor);
    let options = RelationalOptions::builder()
        .use_provider(Arc::new(FakeProvider::new()))
        .diagnostics(sink)
        .add_interceptor(interceptor)
        .build()
        .expect("options");
    let connection =
        RelationalConnection::with_connection(&options, Box::new(native.clone()), true);
    (native, connection)
}

fn select() -> RelationalCommand {
    RelationalCommand::new("SELECT 1", Vec::new())
}

fn cursor(value: i32) -> FakeDbDataReader {
    FakeDbDataReader::new(vec!["n".into()], vec![vec![DbValue::Int(value)]])
}

fn executed_results(sink: &MemorySink) -> Vec<ExecutionSummary> {
    sink.events()
        .into_iter()
        .filter_map(|event| match event {
            DiagnosticEvent::CommandExecuted { result, .. } => Some(result),
            _ => None,
        })
        .collect()
}

/// Answers every execution without reaching the driver.
struct Suppressing {
    rows: FakeDbDataReader,
}

impl CommandInterceptor for Suppressing {
    fn command_executing(
        &self,
        _command: &mut dyn DbCommand,
        data: &CommandEventData,
        _result: Option<CommandResult>,
    ) -> Option<CommandResult> {
        Some(match data.method {
            DbCommandMethod::ExecuteNonQuery => CommandResult::RowsAffected(7),
            DbCommandMethod::ExecuteScalar => {
                CommandResult::Scalar(DbValue::Text("suppressed".into()))
            }
            DbCommandMethod::ExecuteReader => CommandResult::Reader(Box::new(self.rows.clone())),
        })
    }
}

/// Swaps whatever the driver returned.
struct Replacing {
    rows: FakeDbDataReader,
}

impl CommandInterceptor for Replacing {
    fn command_executed(
        &self,
        _command: &dyn DbCommand,
        _data: &CommandEventData,
        result: CommandResult,
    ) -> CommandResult {
        match result {
            CommandResult::RowsAffected(rows) => CommandResult::RowsAffected(rows + 100),
            CommandResult::Scalar(_) => CommandResult::Scalar(DbValue::Text("replaced".into())),
            CommandResult::Reader(mut original) => {
                original.close();
                original.dispose();
                CommandResult::Reader(Box::new(self.rows.clone()))
            }
        }
    }
}

#[derive(Default)]
struct Recording {
    calls: Mutex<Vec<String>>,
}

impl Recording {
    fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls lock").clone()
    }
}

impl CommandInterceptor for Recording {
    fn command_failed(
        &self,
        _command: &dyn DbCommand,
        data: &CommandEventData,
        error: &RelationalDbError,
    ) {
        self.calls
            .lock()
            .expect("calls lock")
            .push(format!("failed {} {error}", data.method));
    }

    fn command_canceled(&self, _command: &dyn DbCommand, data: &CommandEventData) {
        self.calls
            .lock()
            .expect("calls lock")
            .push(format!("canceled {}", data.method));
    }
}

#[test]
fn suppressed_executions_never_reach_the_driver() -> Result<(), RelationalDbError> {
    let rows = cursor(9);
    let sink = Arc::new(MemorySink::new());
    let (native, mut connection) = connection_with(
        FakeCommandExecutor::failing(DriverError::other("driver was called")),
        Arc::new(Suppressing { rows: rows.clone() }),
        sink.clone(),
    );
    let command = select();

    let affected =
        command.execute_non_query(CommandParameterObject::new(&mut connection, None, None))?;
    assert_eq!(affected, 7);
    let scalar = command.execute_scalar(CommandParameterObject::new(&mut connection, None, None))?;
    assert_eq!(scalar, DbValue::Text("suppressed".into()));
    let mut reader =
        command.execute_reader(CommandParameterObject::new(&mut connection, None, None))?;
    assert!(reader.read()?);
    assert_eq!(reader.get_value(0)?, DbValue::Int(9));
    reader.dispose()?;
    drop(reader);

    let created = native.db_commands();
    assert_eq!(created.len(), 3);
    assert!(created.iter().all(|c| c.execute_count() == 0 && c.dispose_count() == 1));
    assert_eq!(rows.dispose_count(), 1);
    assert_eq!(native.close_count(), 3);
    assert_eq!(connection.open_count(), 0);
    assert_eq!(
        executed_results(&sink),
        [
            ExecutionSummary::RowsAffected(7),
            ExecutionSummary::Scalar(DbValue::Text("suppressed".into())),
            ExecutionSummary::Reader,
        ]
    );
    assert!(!sink.event_ids().contains(&EventId::CommandError));
    Ok(())
}

#[tokio::test]
async fn suppression_applies_to_async_executions() -> Result<(), RelationalDbError> {
    let rows = cursor(9);
    let sink = Arc::new(MemorySink::new());
    let (native, mut connection) = connection_with(
        FakeCommandExecutor::failing(DriverError::other("driver was called")),
        Arc::new(Suppressing { rows: rows.clone() }),
        sink.clone(),
    );
    let command = select();
    let cancel = CancellationToken::new();

    let affected = command
        .execute_non_query_async(CommandParameterObject::new(&mut connection, None, None), &cancel)
        .await?;
    assert_eq!(affected, 7);
    let scalar = command
        .execute_scalar_async(CommandParameterObject::new(&mut connection, None, None), &cancel)
        .await?;
    assert_eq!(scalar, DbValue::Text("suppressed".into()));
    let mut reader = command
        .execute_reader_async(CommandParameterObject::new(&mut connection, None, None), &cancel)
        .await?;
    assert!(reader.read_async(&cancel).await?);
    reader.dispose_async().await?;
    drop(reader);

    assert!(native.db_commands().iter().all(|c| c.execute_count() == 0));
    assert_eq!(connection.open_count(), 0);
    assert_eq!(executed_results(&sink).len(), 3);
    Ok(())
}

#[test]
fn executed_results_can_be_replaced() -> Result<(), RelationalDbError> {
    let original = cursor(1);
    let replacement = cursor(2);
    let driver_rows = original.clone();
    let executor = FakeCommandExecutor::new()
        .with_execute_non_query(|_| Ok(3))
        .with_execute_scalar(|_| Ok(DbValue::Int(1)))
        .with_execute_reader(move |_| Ok(driver_rows.clone()));
    let sink = Arc::new(MemorySink::new());
    let (native, mut connection) = connection_with(
        executor,
        Arc::new(Replacing {
            rows: replacement.clone(),
        }),
        sink.clone(),
    );
    let command = select();

    let affected =
        command.execute_non_query(CommandParameterObject::new(&mut connection, None, None))?;
    assert_eq!(affected, 103);
    let scalar = command.execute_scalar(CommandParameterObject::new(&mut connection, None, None))?;
    assert_eq!(scalar, DbValue::Text("replaced".into()));
    let mut reader =
        command.execute_reader(CommandParameterObject::new(&mut connection, None, None))?;
    assert!(reader.read()?);
    assert_eq!(reader.get_value(0)?, DbValue::Int(2));
    reader.dispose()?;
    drop(reader);

    assert!(native.db_commands().iter().all(|c| c.execute_count() == 1));
    assert_eq!(original.close_count(), 1);
    assert_eq!(replacement.dispose_count(), 1);
    assert_eq!(
        executed_results(&sink)[..2],
        [
            ExecutionSummary::RowsAffected(103),
            ExecutionSummary::Scalar(DbValue::Text("replaced".into())),
        ]
    );
    Ok(())
}

#[tokio::test]
async fn async_results_can_be_replaced() -> Result<(), RelationalDbError> {
    let executor = FakeCommandExecutor::new()
        .with_execute_non_query_async(|_, _| Ok(4))
        .with_execute_scalar_async(|_, _| Ok(DbValue::Int(1)));
    let (_native, mut connection) = connection_with(
        executor,
        Arc::new(Replacing { rows: cursor(5) }),
        Arc::new(MemorySink::new()),
    );
    let command = select();
    let cancel = CancellationToken::new();

    let affected = command
        .execute_non_query_async(CommandParameterObject::new(&mut connection, None, None), &cancel)
        .await?;
    assert_eq!(affected, 104);
    let scalar = command
        .execute_scalar_async(CommandParameterObject::new(&mut connection, None, None), &cancel)
        .await?;
    assert_eq!(scalar, DbValue::Text("replaced".into()));
    let mut reader = command
        .execute_reader_async(CommandParameterObject::new(&mut connection, None, None), &cancel)
        .await?;
    assert!(reader.read_async(&cancel).await?);
    assert_eq!(reader.get_value(0)?, DbValue::Int(5));
    reader.dispose_async().await?;
    Ok(())
}

#[test]
fn the_command_can_be_changed_before_it_runs() -> Result<(), RelationalDbError> {
    struct Tagging;

    impl CommandInterceptor for Tagging {
        fn command_executing(
            &self,
            command: &mut dyn DbCommand,
            _data: &CommandEventData,
            result: Option<CommandResult>,
        ) -> Option<CommandResult> {
            let text = command.command_text();
            command.set_command_text(&format!("{text} -- tagged"));
            result
        }
    }

    let (native, mut connection) = connection_with(
        FakeCommandExecutor::new(),
        Arc::new(Tagging),
        Arc::new(MemorySink::new()),
    );
    select().execute_non_query(CommandParameterObject::new(&mut connection, None, None))?;

    let created = native.db_commands();
    assert_eq!(created[0].command_text(), "SELECT 1 -- tagged");
    assert_eq!(created[0].execute_count(), 1);
    Ok(())
}

#[test]
fn an_interceptor_can_supply_the_command() -> Result<(), RelationalDbError> {
    struct Supplying {
        command: FakeDbCommand,
    }

    impl CommandInterceptor for Supplying {
        fn command_creating(
            &self,
            correlation: &CommandCorrelation,
            _result: Option<Box<dyn DbCommand>>,
        ) -> Option<Box<dyn DbCommand>> {
            assert_eq!(correlation.method, DbCommandMethod::ExecuteScalar);
            Some(Box::new(self.command.clone()))
        }
    }

    let supplied = FakeDbCommand::new(
        FakeCommandExecutor::new().with_execute_scalar(|_| Ok(DbValue::Int(11))),
    );
    let (native, mut connection) = connection_with(
        FakeCommandExecutor::new(),
        Arc::new(Supplying {
            command: supplied.clone(),
        }),
        Arc::new(MemorySink::new()),
    );

    let value = select().execute_scalar(CommandParameterObject::new(&mut connection, None, None))?;

    assert_eq!(value, DbValue::Int(11));
    assert!(native.db_commands().is_empty());
    assert_eq!(supplied.command_text(), "SELECT 1");
    assert_eq!(supplied.execute_count(), 1);
    assert_eq!(supplied.dispose_count(), 1);
    assert_eq!(connection.open_count(), 0);
    Ok(())
}

#[tokio::test]
async fn failures_and_cancellations_are_reported() {
    let recording = Arc::new(Recording::default());
    let executor = FakeCommandExecutor::failing(DriverError::other("bang"))
        .with_execute_scalar_async(|_, _| Err(DriverError::canceled()));
    let (_native, mut connection) =
        connection_with(executor, recording.clone(), Arc::new(MemorySink::new()));
    let command = select();
    let cancel = CancellationToken::new();

    assert!(
        command
            .execute_non_query(CommandParameterObject::new(&mut connection, None, None))
            .is_err()
    );
    let err = command
        .execute_scalar_async(CommandParameterObject::new(&mut connection, None, None), &cancel)
        .await
        .expect_err("canceled");
    assert!(err.is_canceled());

    let calls = recording.calls();
    assert_eq!(calls.len(), 2);
    assert!(calls[0].starts_with("failed ExecuteNonQuery"));
    assert!(calls[0].contains("bang"));
    assert_eq!(calls[1], "canceled ExecuteScalar");
    assert_eq!(connection.open_count(), 0);
}
