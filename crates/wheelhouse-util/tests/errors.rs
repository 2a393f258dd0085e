use wheelhouse_util::errors::WheelhouseError;

#[test]
fn test_io_error_display() {
    let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
    let err = WheelhouseError::from(io_err);
    assert!(err.to_string().contains("I/O error"), "got: {err}");
}

#[test]
fn test_config_error_display() {
    let err = WheelhouseError::Config {
        message: "missing `platforms`".to_string(),
    };
    assert_eq!(err.to_string(), "Configuration error: missing `platforms`");
}

#[test]
fn test_invalid_requirement_display() {
    let err = WheelhouseError::InvalidRequirement {
        requirement: ">=1.0".to_string(),
        reason: "expected a package name".to_string(),
    };
    assert_eq!(
        err.to_string(),
        "Invalid requirement `>=1.0`: expected a package name"
    );
}

#[test]
fn test_unsatisfiable_lists_sources() {
    let err = WheelhouseError::UnsatisfiableConstraint {
        package: "pkg".to_string(),
        target: "x86_64-linux-py3.10".to_string(),
        constraint: "<2.0, >=2.0".to_string(),
        sources: vec!["<top-level> pkg>=2.0".to_string(), "app 1.0 pkg<2.0".to_string()],
    };
    let s = err.to_string();
    assert!(s.contains("`pkg`"), "got: {s}");
    assert!(s.contains("x86_64-linux-py3.10"));
    assert!(s.contains("<top-level> pkg>=2.0; app 1.0 pkg<2.0"));
}

#[test]
fn test_candidate_lookup_display() {
    let err = WheelhouseError::CandidateLookup {
        package: "requests".to_string(),
        message: "HTTP 503".to_string(),
    };
    assert_eq!(err.to_string(), "Lookup of `requests` failed: HTTP 503");
}

#[test]
fn test_network_error_display() {
    let err = WheelhouseError::Network {
        message: "timeout".to_string(),
    };
    assert_eq!(err.to_string(), "Network error: timeout");
}

#[test]
fn test_generic_error_display() {
    let err = WheelhouseError::Generic {
        message: "something broke".to_string(),
    };
    assert_eq!(err.to_string(), "something broke");
}
