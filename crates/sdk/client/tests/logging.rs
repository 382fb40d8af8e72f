//! The global subscriber can only be installed once per process, so this
//! file holds a single test.

use beam_client::logging::{LOG_FILE, setup_logging};

#[test]
fn test_setup_logging_writes_to_log_dir() {
    let dir = tempfile::tempdir().unwrap();
    let log_dir = dir.path().join("logs");

    let guard = setup_logging(&log_dir).unwrap();
    tracing::info!("hello from test");
    drop(guard);

    let contents = std::fs::read_to_string(log_dir.join(LOG_FILE)).unwrap();
    assert!(contents.contains("hello from test"));
    assert!(setup_logging(&log_dir).is_err());
}
