#![cfg(feature = "test-utils")]

use std::sync::Arc;

use relational_command::prelude::*;
use relational_command::test_utils::{
    FakeCommandExecutor, FakeDbConnection, FakeDbDataReader, FakeProvider,
};

fn rows() -> FakeDbDataReader {
    FakeDbDataReader::new(
        vec!["id".into(), "name".into()],
        vec![
            vec![DbValue::Int(1), DbValue::Text("alpha".into())],
            vec![DbValue::Int(2), DbValue::Text("beta".into())],
        ],
    )
}

fn setup(
    cursor: &FakeDbDataReader,
    state: ConnectionState,
) -> (FakeDbConnection, Arc<MemorySink>, RelationalConnection) {
    let sync_cursor = cursor.clone();
    let async_cursor = cursor.clone();
    let executor = FakeCommandExecutor::new()
        .with_execute_reader(move |_| Ok(sync_cursor.clone()))
        .with_execute_reader_async(move |_, _| Ok(async_cursor.clone()));
    let native = FakeDbConnection::with_executor("Database=Rows", executor).in_state(state);
    let sink = Arc::new(MemorySink::new());
    let options = RelationalOptions::builder()
        .use_provider(Arc::new(FakeProvider::new()))
        .diagnostics(sink.clone())
        .build()
        .expect("options");
    let connection =
        RelationalConnection::with_connection(&options, Box::new(native.clone()), true);
    (native, sink, connection)
}

fn query() -> RelationalCommand {
    RelationalCommand::new("SELECT id, name FROM items", Vec::new())
}

#[test]
fn reads_rows_then_releases_on_dispose() -> Result<(), RelationalDbError> {
    let cursor = rows();
    let (native, sink, mut connection) = setup(&cursor, ConnectionState::Closed);
    let command = query();

    let mut reader =
        command.execute_reader(CommandParameterObject::new(&mut connection, None, None))?;
    assert_eq!(reader.field_count()?, 2);
    assert_eq!(reader.column_name(1)?.as_deref(), Some("name"));

    let mut names = Vec::new();
    while reader.read()? {
        names.push(reader.get_value(1)?);
    }
    assert_eq!(
        names,
        [DbValue::Text("alpha".into()), DbValue::Text("beta".into())]
    );
    assert_eq!(reader.read_count(), 2);
    assert!(reader.db_command().is_some());
    // The lease is still held while the reader is alive.
    assert_eq!(native.close_count(), 0);

    reader.dispose()?;
    assert!(reader.is_disposed());
    assert!(reader.db_data_reader().is_none());
    drop(reader);

    assert_eq!(cursor.close_count(), 1);
    assert_eq!(cursor.dispose_count(), 1);
    assert_eq!(native.db_commands()[0].dispose_count(), 1);
    assert_eq!(native.close_count(), 1);
    assert_eq!(connection.open_count(), 0);

    let events = sink.events();
    let closing = events
        .iter()
        .position(|e| e.event_id() == EventId::DataReaderClosing)
        .expect("closing event");
    assert_eq!(events[closing + 1].event_id(), EventId::DataReaderDisposing);
    assert!(matches!(
        events[closing + 1],
        DiagnosticEvent::DataReaderDisposing { read_count: 2, records_affected: -1, .. }
    ));
    assert_eq!(
        events.last().map(DiagnosticEvent::event_id),
        Some(EventId::ConnectionClosed)
    );
    Ok(())
}

#[test]
fn disposed_reader_refuses_reads() -> Result<(), RelationalDbError> {
    let cursor = rows();
    let (_native, _sink, mut connection) = setup(&cursor, ConnectionState::Closed);
    let command = query();

    let mut reader =
        command.execute_reader(CommandParameterObject::new(&mut connection, None, None))?;
    reader.dispose()?;
    reader.dispose()?;

    assert!(matches!(reader.read(), Err(RelationalDbError::ReaderDisposed)));
    assert!(matches!(reader.get_value(0), Err(RelationalDbError::ReaderDisposed)));
    assert!(matches!(reader.field_count(), Err(RelationalDbError::ReaderDisposed)));
    drop(reader);
    assert_eq!(cursor.dispose_count(), 1);
    Ok(())
}

#[test]
fn dropping_a_reader_disposes_it() -> Result<(), RelationalDbError> {
    let cursor = rows();
    let (native, _sink, mut connection) = setup(&cursor, ConnectionState::Closed);

    {
        let mut reader =
            query().execute_reader(CommandParameterObject::new(&mut connection, None, None))?;
        assert!(reader.read()?);
    }

    assert_eq!(cursor.close_count(), 1);
    assert_eq!(native.db_commands()[0].dispose_count(), 1);
    assert_eq!(native.close_count(), 1);
    assert_eq!(connection.open_count(), 0);
    Ok(())
}

#[test]
fn reader_on_a_pre_opened_connection_leaves_it_open() -> Result<(), RelationalDbError> {
    let cursor = rows();
    let (native, _sink, mut connection) = setup(&cursor, ConnectionState::Open);

    let mut reader =
        query().execute_reader(CommandParameterObject::new(&mut connection, None, None))?;
    while reader.read()? {}
    reader.dispose()?;
    drop(reader);

    assert_eq!(native.close_count(), 0);
    assert_eq!(native.state_now(), ConnectionState::Open);
    assert_eq!(cursor.dispose_count(), 1);
    Ok(())
}

#[test]
fn reader_inside_a_transaction_keeps_the_transaction_lease() -> Result<(), RelationalDbError> {
    let cursor = rows();
    let (native, _sink, mut connection) = setup(&cursor, ConnectionState::Closed);

    connection.begin_transaction(None)?;
    let mut reader =
        query().execute_reader(CommandParameterObject::new(&mut connection, None, None))?;
    reader.dispose()?;
    drop(reader);

    assert_eq!(connection.open_count(), 1);
    assert_eq!(native.close_count(), 0);
    connection.commit_transaction()?;
    assert_eq!(native.close_count(), 1);
    Ok(())
}

#[tokio::test]
async fn async_reads_honour_cancellation() -> Result<(), RelationalDbError> {
    let cursor = rows();
    let (native, _sink, mut connection) = setup(&cursor, ConnectionState::Closed);
    let cancel = CancellationToken::new();

    let mut reader = query()
        .execute_reader_async(CommandParameterObject::new(&mut connection, None, None), &cancel)
        .await?;
    assert!(reader.read_async(&cancel).await?);
    assert_eq!(reader.get_value(0)?, DbValue::Int(1));

    let stop = CancellationToken::new();
    stop.cancel();
    assert!(reader.read_async(&stop).await.expect_err("canceled").is_canceled());

    reader.dispose_async().await?;
    drop(reader);
    assert_eq!(native.close_count(), 1);
    assert_eq!(cursor.dispose_count(), 1);
    Ok(())
}
