//! Integration tests for the `validate` command.
use std::path::PathBuf;
use tariff_engine::cli::handle_validate_command;
use tariff_engine::log::is_logger_initialised;
use tariff_engine::settings::Settings;

/// Get the path to the demo scenario.
fn get_scenario_dir() -> PathBuf {
    PathBuf::from("demos/simple")
}

/// An integration test for the `validate` command.
///
/// We also check that the logger is initialised after it is run.
#[test]
fn test_handle_validate_command() {
    unsafe { std::env::set_var("TARIFF_ENGINE_LOG_LEVEL", "off") };

    assert!(!is_logger_initialised());

    handle_validate_command(&get_scenario_dir(), Some(Settings::default())).unwrap();

    assert!(is_logger_initialised());
}
