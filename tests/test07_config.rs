#![cfg(feature = "test-utils")]

use std::sync::Arc;
use std::time::Duration;

use relational_command::prelude::*;
use relational_command::test_utils::FakeProvider;

#[test]
fn settings_load_from_json() -> Result<(), RelationalDbError> {
    let settings = RelationalSettings::from_json(
        r#"{
            "connection_string": "Database=FromJson",
            "command_timeout": 15,
            "max_batch_size": 42,
            "sensitive_data_logging": true
        }"#,
    )?;
    assert_eq!(settings.connection_string.as_deref(), Some("Database=FromJson"));
    assert_eq!(settings.command_timeout, Some(15));
    assert_eq!(settings.max_batch_size, Some(42));
    assert!(settings.sensitive_data_logging);
    Ok(())
}

#[test]
fn options_flow_into_new_connections() -> Result<(), RelationalDbError> {
    let settings = RelationalSettings::from_json(
        r#"{
            "connection_string": "Database=Configured",
            "command_timeout": 15,
            "max_batch_size": 42
        }"#,
    )?;
    let options = RelationalOptionsBuilder::from_settings(settings)
        .use_provider(Arc::new(FakeProvider::new()))
        .sensitive_data_logging(true)
        .build()?;

    assert_eq!(options.provider().name(), "Fake");
    assert_eq!(options.connection_string(), Some("Database=Configured"));
    assert_eq!(options.command_timeout(), Some(Duration::from_secs(15)));
    assert_eq!(options.max_batch_size(), Some(42));
    assert!(options.logger().sensitive_data_logging());

    let connection = RelationalConnection::new(&options);
    assert_eq!(connection.connection_string().as_deref(), Some("Database=Configured"));
    assert_eq!(connection.command_timeout(), Some(Duration::from_secs(15)));
    assert_eq!(connection.max_batch_size(), Some(42));
    assert!(connection.logger().sensitive_data_logging());
    Ok(())
}

#[test]
fn exactly_one_provider_is_required() {
    assert!(matches!(
        RelationalOptions::builder().build(),
        Err(RelationalDbError::NoProviderConfigured)
    ));

    let err = RelationalOptions::builder()
        .use_provider(Arc::new(FakeProvider::new()))
        .use_provider(Arc::new(FakeProvider::new().named("Other")))
        .build()
        .expect_err("two providers");
    assert!(matches!(
        err,
        RelationalDbError::MultipleProvidersConfigured(ref names) if names == "Fake, Other"
    ));
    assert!(err.to_string().contains("Fake, Other"));
}

#[test]
fn invalid_numbers_are_rejected_at_build_time() {
    let err = RelationalOptions::builder()
        .use_provider(Arc::new(FakeProvider::new()))
        .command_timeout(-5)
        .build()
        .expect_err("negative timeout");
    assert!(matches!(err, RelationalDbError::InvalidCommandTimeout(-5)));

    let err = RelationalOptions::builder()
        .use_provider(Arc::new(FakeProvider::new()))
        .max_batch_size(0)
        .build()
        .expect_err("empty batches");
    assert!(matches!(err, RelationalDbError::InvalidMaxBatchSize(0)));
}

#[test]
fn zero_timeout_is_allowed() -> Result<(), RelationalDbError> {
    let options = RelationalOptions::builder()
        .use_provider(Arc::new(FakeProvider::new()))
        .command_timeout(0)
        .build()?;
    assert_eq!(options.command_timeout(), Some(Duration::ZERO));
    Ok(())
}

#[test]
fn settings_round_trip_through_serde() -> Result<(), Box<dyn std::error::Error>> {
    let settings = RelationalSettings {
        connection_string: Some("Data Source=:memory:".into()),
        command_timeout: Some(30),
        max_batch_size: None,
        sensitive_data_logging: false,
    };
    let json = serde_json::to_string(&settings)?;
    assert_eq!(RelationalSettings::from_json(&json)?, settings);
    Ok(())
}
