#![cfg(feature = "sqlite")]

use std::sync::Arc;

use relational_command::prelude::*;
use tempfile::tempdir;

fn memory_connection() -> RelationalConnection {
    let options = RelationalOptions::builder()
        .use_provider(Arc::new(SqliteProvider::new()))
        .connection_string("Data Source=:memory:")
        .build()
        .expect("options");
    RelationalConnection::new(&options)
}

fn run(connection: &mut RelationalConnection, sql: &str) -> Result<i64, RelationalDbError> {
    RelationalCommand::new(sql, Vec::new())
        .execute_non_query(CommandParameterObject::new(connection, None, None))
}

fn count(connection: &mut RelationalConnection) -> Result<DbValue, RelationalDbError> {
    RelationalCommand::new("SELECT COUNT(*) FROM items", Vec::new())
        .execute_scalar(CommandParameterObject::new(connection, None, None))
}

fn insert_command() -> RelationalCommand {
    RelationalCommandBuilder::new()
        .append("INSERT INTO items (id, name) VALUES (@id, @name)")
        .add_parameter("id", "@id", TypeMapping::int(), Some(false))
        .add_dynamic_parameter("name", "@name")
        .build()
}

fn insert(
    connection: &mut RelationalConnection,
    id: i32,
    name: &str,
) -> Result<i64, RelationalDbError> {
    let values: ParameterValues = [
        ("id".to_owned(), ParameterValue::from(id)),
        ("name".to_owned(), ParameterValue::from(name)),
    ]
    .into_iter()
    .collect();
    insert_command().execute_non_query(CommandParameterObject::new(connection, Some(&values), None))
}

#[test]
fn commands_run_against_an_in_memory_database() -> Result<(), RelationalDbError> {
    let mut connection = memory_connection();
    // An in-memory database lives only as long as its connection, so hold a lease.
    assert!(connection.open(false)?);

    run(&mut connection, "CREATE TABLE items (id INTEGER PRIMARY KEY, name TEXT NOT NULL)")?;
    assert_eq!(insert(&mut connection, 1, "alpha")?, 1);
    assert_eq!(insert(&mut connection, 2, "beta")?, 1);
    assert_eq!(count(&mut connection)?, DbValue::BigInt(2));

    let command = RelationalCommandBuilder::new()
        .append("SELECT id, name FROM items WHERE id >= @min ORDER BY id")
        .add_parameter("min", "@min", TypeMapping::int(), None)
        .build();
    let values: ParameterValues = [("min".to_owned(), ParameterValue::from(1_i32))]
        .into_iter()
        .collect();
    let mut reader =
        command.execute_reader(CommandParameterObject::new(&mut connection, Some(&values), None))?;
    let mut rows = Vec::new();
    while reader.read()? {
        rows.push((reader.get_value(0)?, reader.get_value(1)?));
    }
    reader.dispose()?;
    drop(reader);
    assert_eq!(
        rows,
        [
            (DbValue::BigInt(1), DbValue::Text("alpha".into())),
            (DbValue::BigInt(2), DbValue::Text("beta".into())),
        ]
    );

    assert_eq!(run(&mut connection, "UPDATE items SET name = upper(name)")?, 2);
    assert_eq!(connection.open_count(), 1);
    assert!(connection.close()?);
    Ok(())
}

#[test]
fn transactions_commit_and_roll_back() -> Result<(), RelationalDbError> {
    let mut connection = memory_connection();
    connection.open(false)?;
    run(&mut connection, "CREATE TABLE items (id INTEGER PRIMARY KEY, name TEXT NOT NULL)")?;

    connection.begin_transaction(Some(IsolationLevel::Serializable))?;
    insert(&mut connection, 1, "kept")?;
    connection.commit_transaction()?;

    connection.begin_transaction(None)?;
    insert(&mut connection, 2, "discarded")?;
    assert_eq!(count(&mut connection)?, DbValue::BigInt(2));
    connection.rollback_transaction()?;

    assert_eq!(count(&mut connection)?, DbValue::BigInt(1));
    connection.close()?;
    Ok(())
}

#[test]
fn constraint_violations_surface_as_driver_errors() -> Result<(), RelationalDbError> {
    let mut connection = memory_connection();
    connection.open(false)?;
    run(&mut connection, "CREATE TABLE items (id INTEGER PRIMARY KEY, name TEXT NOT NULL)")?;
    insert(&mut connection, 1, "alpha")?;

    let err = insert(&mut connection, 1, "again").expect_err("duplicate key");
    let RelationalDbError::Driver(driver) = err else {
        panic!("expected a driver error, got {err:?}");
    };
    assert!(driver.code.is_some());
    // The failed command returned its lease.
    assert_eq!(connection.open_count(), 1);
    connection.close()?;
    Ok(())
}

#[tokio::test]
async fn async_execution_runs_on_the_blocking_pool() -> Result<(), RelationalDbError> {
    let mut connection = memory_connection();
    let cancel = CancellationToken::new();
    connection.open_async(&cancel, false).await?;

    RelationalCommand::new(
        "CREATE TABLE items (id INTEGER PRIMARY KEY, name TEXT NOT NULL)",
        Vec::new(),
    )
        .execute_non_query_async(CommandParameterObject::new(&mut connection, None, None), &cancel)
        .await?;
    insert(&mut connection, 7, "seven")?;

    let name = RelationalCommand::new("SELECT name FROM items WHERE id = 7", Vec::new())
        .execute_scalar_async(CommandParameterObject::new(&mut connection, None, None), &cancel)
        .await?;
    assert_eq!(name, DbValue::Text("seven".into()));

    let mut reader = RelationalCommand::new("SELECT id FROM items", Vec::new())
        .execute_reader_async(CommandParameterObject::new(&mut connection, None, None), &cancel)
        .await?;
    assert!(reader.read_async(&cancel).await?);
    assert_eq!(reader.get_value(0)?, DbValue::BigInt(7));
    reader.dispose_async().await?;
    drop(reader);

    connection.close_async().await?;
    Ok(())
}

#[test]
fn file_database_is_reopened_per_command() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let path = dir.path().join("reopened.db");
    let options = RelationalOptions::builder()
        .use_provider(Arc::new(SqliteProvider::new()))
        .connection_string(format!("Data Source={}", path.display()))
        .build()?;
    let mut connection = RelationalConnection::new(&options);

    run(&mut connection, "CREATE TABLE items (id INTEGER PRIMARY KEY, name TEXT NOT NULL)")?;
    insert(&mut connection, 1, "persisted")?;
    assert_eq!(connection.open_count(), 0);
    assert_eq!(count(&mut connection)?, DbValue::BigInt(1));

    connection.dispose();
    assert!(path.exists());
    Ok(())
}

#[test]
fn zero_command_timeout_still_executes() -> Result<(), RelationalDbError> {
    let options = RelationalOptions::builder()
        .use_provider(Arc::new(SqliteProvider::new()))
        .connection_string("Data Source=:memory:")
        .command_timeout(0)
        .build()?;
    let mut connection = RelationalConnection::new(&options);
    connection.open(false)?;

    run(&mut connection, "CREATE TABLE items (id INTEGER PRIMARY KEY, name TEXT NOT NULL)")?;
    insert(&mut connection, 1, "patient")?;
    let waited = RelationalCommand::new("PRAGMA busy_timeout", Vec::new())
        .execute_scalar(CommandParameterObject::new(&mut connection, None, None))?;
    assert_eq!(waited, DbValue::BigInt(2_147_483_647));
    connection.close()?;
    Ok(())
}
