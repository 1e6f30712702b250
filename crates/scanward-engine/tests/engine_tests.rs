use scanward_core::{EngineKind, ScanTask, Verdict};
use scanward_engine::{
    AdapterSet, Baseline, CommandAdapter, CommandSpec, EngineAdapter, IntegrityAdapter,
    SignatureAdapter, SignatureDb,
};
use std::fs;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const TIMEOUT: Duration = Duration::from_secs(5);

fn write_signature_db(dir: &TempDir, entries: &[(&[u8], &str)]) -> std::path::PathBuf {
    let mut content = String::from("# scanward test signatures\n");
    for (payload, name) in entries {
        content.push_str(&format!("{} {}\n", blake3::hash(payload).to_hex(), name));
    }
    let path = dir.path().join("signatures.db");
    fs::write(&path, content).unwrap();
    path
}

#[test]
fn test_signature_adapter_detects_known_payload() {
    let temp = TempDir::new().unwrap();
    let db = write_signature_db(&temp, &[(b"evil payload", "Test.Evil")]);

    let bad = temp.path().join("bad.exe");
    let good = temp.path().join("good.txt");
    fs::write(&bad, b"evil payload").unwrap();
    fs::write(&good, b"harmless").unwrap();

    let adapter = SignatureAdapter::from_file(&db, TIMEOUT).unwrap();
    let token = CancellationToken::new();

    let outcome = adapter
        .invoke(&ScanTask::new(&bad, EngineKind::Signature), &token)
        .unwrap();
    assert_eq!(outcome.verdict, Verdict::Infected);
    assert_eq!(outcome.threat_name.as_deref(), Some("Test.Evil"));

    let outcome = adapter
        .invoke(&ScanTask::new(&good, EngineKind::Signature), &token)
        .unwrap();
    assert_eq!(outcome.verdict, Verdict::Clean);
}

#[test]
fn test_signature_update_reloads_file() {
    let temp = TempDir::new().unwrap();
    let db = write_signature_db(&temp, &[(b"one", "Test.One")]);
    let adapter = SignatureAdapter::from_file(&db, TIMEOUT).unwrap();
    assert_eq!(adapter.signature_count(), 1);

    write_signature_db(&temp, &[(b"one", "Test.One"), (b"two", "Test.Two")]);
    assert!(adapter.update_definitions());
    assert_eq!(adapter.signature_count(), 2);

    let in_memory = SignatureAdapter::new(SignatureDb::new(), TIMEOUT);
    assert!(!in_memory.update_definitions());
}

#[test]
fn test_unreadable_file_is_engine_error() {
    let temp = TempDir::new().unwrap();
    let db = write_signature_db(&temp, &[(b"x", "Test.X")]);
    let adapter = SignatureAdapter::from_file(&db, TIMEOUT).unwrap();

    let task = ScanTask::new(temp.path().join("vanished"), EngineKind::Signature);
    let err = adapter.invoke(&task, &CancellationToken::new()).unwrap_err();
    assert!(matches!(err, scanward_core::EngineError::Io { .. }));
}

#[test]
fn test_integrity_adapter_flags_modified_files() {
    let temp = TempDir::new().unwrap();
    let stable = temp.path().join("ls");
    let tampered = temp.path().join("ps");
    let unknown = temp.path().join("new-tool");
    fs::write(&stable, b"original ls").unwrap();
    fs::write(&tampered, b"original ps").unwrap();

    let (baseline, failures) = Baseline::build(&[stable.clone(), tampered.clone()]);
    assert!(failures.is_empty());

    fs::write(&tampered, b"trojaned ps").unwrap();
    fs::write(&unknown, b"whatever").unwrap();

    let adapter = IntegrityAdapter::new(baseline, TIMEOUT);
    let token = CancellationToken::new();
    let verdict = |path: &std::path::Path| {
        adapter
            .invoke(&ScanTask::new(path, EngineKind::Integrity), &token)
            .unwrap()
    };

    assert_eq!(verdict(&stable).verdict, Verdict::Clean);
    assert_eq!(verdict(&unknown).verdict, Verdict::Clean);

    let outcome = verdict(&tampered);
    assert_eq!(outcome.verdict, Verdict::Suspicious);
    assert_eq!(outcome.threat_name.as_deref(), Some("Integrity.Modified"));
}

#[test]
fn test_adapter_set_routes_by_kind() {
    let temp = TempDir::new().unwrap();
    let db = write_signature_db(&temp, &[(b"x", "Test.X")]);

    let adapters = AdapterSet::new()
        .with(SignatureAdapter::from_file(&db, TIMEOUT).unwrap())
        .with(IntegrityAdapter::new(Baseline::new(), TIMEOUT));

    assert_eq!(adapters.get(EngineKind::Signature).unwrap().name(), "signature");
    assert_eq!(adapters.get(EngineKind::Integrity).unwrap().name(), "integrity");

    let availability = adapters.availability();
    assert_eq!(
        availability,
        vec![("signature".to_string(), true), ("integrity".to_string(), false)]
    );
}

#[cfg(unix)]
fn shell_engine(script: &str) -> CommandAdapter {
    let spec = CommandSpec {
        name: "fake-engine".to_string(),
        program: "sh".into(),
        args: vec!["-c".to_string(), script.to_string(), "{path}".to_string()],
        version_args: vec!["-c".to_string(), "exit 0".to_string()],
        update_command: Some(vec!["sh".to_string(), "-c".to_string(), "exit 0".to_string()]),
        ..CommandSpec::clamscan()
    };
    CommandAdapter::new(spec, EngineKind::Signature, Duration::from_millis(300))
}

#[cfg(unix)]
#[test]
fn test_command_adapter_loose_output() {
    let adapter = shell_engine(r#"echo "$0: Unix.Trojan.Mirai FOUND"; exit 1"#);
    let task = ScanTask::new("/tmp/mirai", EngineKind::Signature);

    let outcome = adapter.invoke(&task, &CancellationToken::new()).unwrap();
    assert_eq!(outcome.verdict, Verdict::Infected);
    assert_eq!(outcome.threat_name.as_deref(), Some("Unix.Trojan.Mirai"));
    assert!(adapter.is_available());
    assert!(adapter.update_definitions());
}

#[cfg(unix)]
#[test]
fn test_command_adapter_structured_output() {
    let adapter = shell_engine(
        r#"echo '{"verdict":"warning","message":"Heuristics.Encrypted.PDF"}'; exit 0"#,
    );
    let task = ScanTask::new("/tmp/report.pdf", EngineKind::Signature);

    let outcome = adapter.invoke(&task, &CancellationToken::new()).unwrap();
    assert_eq!(outcome.verdict, Verdict::Suspicious);
    assert_eq!(outcome.threat_name.as_deref(), Some("Heuristics.Encrypted.PDF"));
}

#[cfg(unix)]
#[test]
fn test_command_adapter_exit_code_fallback() {
    let task = ScanTask::new("/tmp/file", EngineKind::Signature);
    let token = CancellationToken::new();

    let clean = shell_engine("exit 0").invoke(&task, &token).unwrap();
    assert_eq!(clean.verdict, Verdict::Clean);

    let infected = shell_engine("exit 1").invoke(&task, &token).unwrap();
    assert_eq!(infected.verdict, Verdict::Infected);

    let broken = shell_engine("echo 'database corrupt' >&2; exit 2")
        .invoke(&task, &token)
        .unwrap();
    assert_eq!(broken.verdict, Verdict::Error);
    assert!(broken.detail.unwrap().contains("database corrupt"));
}

#[cfg(unix)]
#[test]
fn test_command_adapter_timeout() {
    let adapter = shell_engine("sleep 5");
    let task = ScanTask::new("/tmp/slow", EngineKind::Signature);

    let started = std::time::Instant::now();
    let err = adapter.invoke(&task, &CancellationToken::new()).unwrap_err();
    assert!(matches!(err, scanward_core::EngineError::Timeout { .. }));
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[cfg(unix)]
#[test]
fn test_command_adapter_timeout_covers_inherited_output() {
    let adapter = shell_engine(r#"sleep 3 & echo "$0: OK""#);
    let task = ScanTask::new("/tmp/lingering", EngineKind::Signature);

    let started = std::time::Instant::now();
    let err = adapter.invoke(&task, &CancellationToken::new()).unwrap_err();
    assert!(matches!(err, scanward_core::EngineError::Timeout { .. }));
    assert!(started.elapsed() < Duration::from_secs(1));
}
