#![cfg(feature = "test-utils")]

use std::sync::Arc;
use std::time::Duration;

use relational_command::prelude::*;
use relational_command::test_utils::{FakeDbConnection, FakeProvider};

fn options(provider: &FakeProvider, sink: Option<Arc<MemorySink>>) -> RelationalOptions {
    let mut builder = RelationalOptions::builder()
        .use_provider(Arc::new(provider.clone()))
        .connection_string("Database=FakeDatabase");
    if let Some(sink) = sink {
        builder = builder.diagnostics(sink);
    }
    builder.build().expect("options")
}

fn created(provider: &FakeProvider) -> FakeDbConnection {
    provider
        .created_connections()
        .into_iter()
        .next()
        .expect("a native connection was created")
}

#[test]
fn leases_open_once_and_close_once() -> Result<(), RelationalDbError> {
    let provider = FakeProvider::new();
    let mut connection = RelationalConnection::new(&options(&provider, None));
    assert!(provider.created_connections().is_empty());

    assert!(connection.open(false)?);
    assert!(!connection.open(false)?);
    assert_eq!(connection.open_count(), 2);
    assert!(connection.is_opened_internally());

    assert!(!connection.close()?);
    assert!(connection.close()?);
    assert!(!connection.close()?);
    assert_eq!(connection.open_count(), 0);

    let native = created(&provider);
    assert_eq!(native.open_count(), 1);
    assert_eq!(native.close_count(), 1);
    assert_eq!(native.connection_string(), "Database=FakeDatabase");
    Ok(())
}

#[test]
fn caller_opened_connection_is_never_closed() -> Result<(), RelationalDbError> {
    let native = FakeDbConnection::new("Database=External").in_state(ConnectionState::Open);
    let options = options(&FakeProvider::new(), None);
    let mut connection =
        RelationalConnection::with_connection(&options, Box::new(native.clone()), false);

    assert!(!connection.open(false)?);
    assert!(!connection.is_opened_internally());
    assert!(!connection.close()?);
    drop(connection);

    assert_eq!(native.open_count(), 0);
    assert_eq!(native.close_count(), 0);
    assert_eq!(native.dispose_count(), 0);
    assert_eq!(native.state_now(), ConnectionState::Open);
    Ok(())
}

#[test]
fn owned_connection_is_disposed_with_the_wrapper() -> Result<(), RelationalDbError> {
    let native = FakeDbConnection::new("Database=Owned");
    let options = options(&FakeProvider::new(), None);
    let mut connection =
        RelationalConnection::with_connection(&options, Box::new(native.clone()), true);

    connection.open(false)?;
    connection.dispose();
    connection.dispose();

    assert!(connection.is_disposed());
    assert_eq!(native.close_count(), 1);
    assert_eq!(native.dispose_count(), 1);
    assert!(matches!(
        connection.open(false),
        Err(RelationalDbError::ConnectionDisposed)
    ));
    Ok(())
}

#[test]
fn missing_connection_string_fails_on_first_use() {
    let options = RelationalOptions::builder()
        .use_provider(Arc::new(FakeProvider::new()))
        .build()
        .expect("options");
    let mut connection = RelationalConnection::new(&options);
    assert_eq!(connection.connection_string(), None);
    assert!(matches!(
        connection.open(false),
        Err(RelationalDbError::NoConnectionOrConnectionString)
    ));
    assert_eq!(connection.open_count(), 0);
}

#[test]
fn connection_string_is_fixed_while_leased() -> Result<(), RelationalDbError> {
    let provider = FakeProvider::new();
    let mut connection = RelationalConnection::new(&options(&provider, None));

    connection.open(false)?;
    assert!(matches!(
        connection.set_connection_string(Some("Database=Other".into())),
        Err(RelationalDbError::CannotChangeWhenOpen)
    ));
    connection.close()?;

    connection.set_connection_string(Some("Database=Other".into()))?;
    assert_eq!(created(&provider).dispose_count(), 1);
    assert_eq!(connection.connection_string().as_deref(), Some("Database=Other"));

    connection.open(false)?;
    let connections = provider.created_connections();
    assert_eq!(connections.len(), 2);
    assert_eq!(connections[1].connection_string(), "Database=Other");
    connection.close()?;
    Ok(())
}

#[test]
fn external_handle_takes_the_new_connection_string() -> Result<(), RelationalDbError> {
    let native = FakeDbConnection::new("Database=Before");
    let options = options(&FakeProvider::new(), None);
    let mut connection =
        RelationalConnection::with_connection(&options, Box::new(native.clone()), false);

    assert_eq!(connection.connection_string().as_deref(), Some("Database=Before"));
    connection.set_connection_string(Some("Database=After".into()))?;
    assert_eq!(native.connection_string(), "Database=After");
    assert_eq!(native.dispose_count(), 0);
    Ok(())
}

#[test]
fn command_timeout_must_not_be_negative() -> Result<(), RelationalDbError> {
    let mut connection = RelationalConnection::new(&options(&FakeProvider::new(), None));
    assert_eq!(connection.command_timeout(), None);

    assert!(matches!(
        connection.set_command_timeout(Some(-1)),
        Err(RelationalDbError::InvalidCommandTimeout(-1))
    ));
    connection.set_command_timeout(Some(45))?;
    assert_eq!(connection.command_timeout(), Some(Duration::from_secs(45)));
    connection.set_command_timeout(None)?;
    assert_eq!(connection.command_timeout(), None);
    Ok(())
}

#[test]
fn failed_open_reports_and_takes_no_lease() {
    let sink = Arc::new(MemorySink::new());
    let native = FakeDbConnection::new("Database=Down").failing_open(DriverError::other("refused"));
    let options = options(&FakeProvider::new(), Some(sink.clone()));
    let mut connection = RelationalConnection::with_connection(&options, Box::new(native), true);

    let err = connection.open(true).expect_err("open fails");
    assert!(matches!(err, RelationalDbError::Driver(ref e) if e.message == "refused"));
    assert_eq!(connection.open_count(), 0);

    let events = sink.events();
    assert_eq!(
        sink.event_ids(),
        [EventId::ConnectionOpening, EventId::ConnectionError]
    );
    assert_eq!(events[1].level(), tracing::Level::DEBUG);
}

#[test]
fn broken_connection_is_closed_before_reopening() -> Result<(), RelationalDbError> {
    let native = FakeDbConnection::new("Database=Flaky").in_state(ConnectionState::Broken);
    let options = options(&FakeProvider::new(), None);
    let mut connection =
        RelationalConnection::with_connection(&options, Box::new(native.clone()), true);

    assert!(connection.open(false)?);
    assert_eq!(native.close_count(), 1);
    assert_eq!(native.open_count(), 1);
    assert_eq!(native.state_now(), ConnectionState::Open);
    connection.close()?;
    Ok(())
}

#[test]
fn lifecycle_events_are_reported_in_order() -> Result<(), RelationalDbError> {
    let sink = Arc::new(MemorySink::new());
    let mut connection =
        RelationalConnection::new(&options(&FakeProvider::new(), Some(sink.clone())));

    connection.open(false)?;
    connection.open(false)?;
    connection.close()?;
    connection.close()?;
    connection.dispose();

    assert_eq!(
        sink.event_ids(),
        [
            EventId::ConnectionOpening,
            EventId::ConnectionOpened,
            EventId::ConnectionClosing,
            EventId::ConnectionClosed,
            EventId::ConnectionDisposing,
            EventId::ConnectionDisposed,
        ]
    );
    Ok(())
}

#[test]
fn ambient_enlistment_waits_for_the_physical_open() -> Result<(), RelationalDbError> {
    let provider = FakeProvider::new();
    let mut connection = RelationalConnection::new(&options(&provider, None));
    let ambient = AmbientTransaction::new();

    connection.enlist_transaction(Some(ambient.clone()))?;
    assert_eq!(connection.enlisted_transaction(), Some(&ambient));

    connection.open(false)?;
    assert_eq!(created(&provider).enlisted(), Some(ambient));
    assert!(matches!(
        connection.begin_transaction(None),
        Err(RelationalDbError::ConflictingEnlistedTransaction)
    ));

    connection.enlist_transaction(None)?;
    assert_eq!(created(&provider).enlisted(), None);
    connection.close()?;
    Ok(())
}

#[tokio::test]
async fn async_leases_use_the_async_driver_calls() -> Result<(), RelationalDbError> {
    let provider = FakeProvider::new();
    let mut connection = RelationalConnection::new(&options(&provider, None));
    let cancel = CancellationToken::new();

    assert!(connection.open_async(&cancel, false).await?);
    assert!(!connection.open_async(&cancel, false).await?);
    assert!(!connection.close_async().await?);
    assert!(connection.close_async().await?);

    let native = created(&provider);
    assert_eq!(native.open_async_count(), 1);
    assert_eq!(native.open_count(), 0);
    assert_eq!(native.close_count(), 1);

    connection.dispose_async().await;
    assert!(connection.is_disposed());
    Ok(())
}

#[tokio::test]
async fn cancelled_open_surfaces_as_canceled() {
    let mut connection = RelationalConnection::new(&options(&FakeProvider::new(), None));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = connection
        .open_async(&cancel, false)
        .await
        .expect_err("canceled");
    assert!(err.is_canceled());
    assert_eq!(connection.open_count(), 0);
}
