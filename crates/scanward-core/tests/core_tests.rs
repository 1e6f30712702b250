use scanward_core::{
    EngineKind, ProgressEvent, ScanConfig, ScanOutcome, ScanRequest, ScanResult, ScanTask,
    ScanType, SessionId, Verdict,
};
use std::fs;
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn test_session_id_display_and_order() {
    let a = SessionId::new(1);
    let b = SessionId::new(2);

    assert!(a < b);
    assert_eq!(a.to_string(), "#1");
}

#[test]
fn test_scan_request_builders() {
    let request = ScanRequest::quick("/home/user");
    assert!(request.quick_scan);
    assert!(request.category.is_none());

    let request = ScanRequest::new("/srv")
        .with_quick_scan(true)
        .with_category(ScanType::Integrity);
    assert!(request.quick_scan);
    assert_eq!(request.category, Some(ScanType::Integrity));
}

#[test]
fn test_outcome_serialization() {
    let task = ScanTask::new("/tmp/dropper.exe", EngineKind::Signature).with_size(68);
    let outcome = ScanOutcome::infected(&task, "Win.Trojan.Agent", Duration::from_millis(12));

    let json = serde_json::to_value(&outcome).unwrap();
    assert_eq!(json["verdict"], "infected");
    assert_eq!(json["engine"], "signature");
    assert_eq!(json["threat_name"], "Win.Trojan.Agent");

    let back: ScanOutcome = serde_json::from_value(json).unwrap();
    assert_eq!(back, outcome);
}

#[test]
fn test_result_consistency_check() {
    let task = ScanTask::new("/tmp/a", EngineKind::Signature);
    let mut result = ScanResult::new(SessionId::new(7), ScanType::Full, "/tmp");
    result.total_files = 3;
    result.scanned_count = 1;
    result.skipped_count = 1;
    result
        .errors
        .push(ScanOutcome::error(&task, "engine unavailable", Duration::ZERO));

    assert!(result.is_consistent());

    result.total_files = 4;
    assert!(!result.is_consistent());
}

#[test]
fn test_result_summary() {
    let mut result = ScanResult::new(SessionId::new(3), ScanType::Quick, "/home");
    result.total_files = 10;
    result.scanned_count = 10;

    let summary = result.summary();
    assert!(summary.starts_with("quick scan"));
    assert!(summary.contains("10 of 10"));
}

#[test]
fn test_progress_monotonic_helpers() {
    let halfway = ProgressEvent::from_counts(5, 10, "/tmp/f");
    let done = ProgressEvent::from_counts(10, 10, "/tmp/g");

    assert!(halfway.percent < done.percent);
    assert!(done.is_complete());
    assert_eq!(ProgressEvent::reset("Stopping").percent, 0.0);
}

#[test]
fn test_config_load_from_file() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("config.toml");
    fs::write(
        &path,
        "max_workers = 6\nfile_timeout = 1500\npending_policy = \"reject\"\n",
    )
    .unwrap();

    let config = ScanConfig::load(&path).unwrap();
    assert_eq!(config.max_workers, 6);
    assert_eq!(config.file_timeout, Duration::from_millis(1500));
    assert_eq!(config.pending_policy, scanward_core::PendingPolicy::Reject);
}

#[test]
fn test_config_load_rejects_invalid() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("config.toml");
    fs::write(&path, "max_workers = 0\n").unwrap();

    assert!(matches!(
        ScanConfig::load(&path),
        Err(scanward_core::ConfigError::Invalid { .. })
    ));

    fs::write(&path, "max_workers = \"many\"\n").unwrap();
    assert!(matches!(
        ScanConfig::load(&path),
        Err(scanward_core::ConfigError::Parse { .. })
    ));
}

#[test]
fn test_verdict_parse() {
    use std::str::FromStr;
    assert_eq!(Verdict::from_str("Suspicious").unwrap(), Verdict::Suspicious);
}
