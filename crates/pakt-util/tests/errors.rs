use pakt_util::errors::PaktError;

#[test]
fn test_io_error_display() {
    let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
    let err = PaktError::from(io_err);
    assert!(err.to_string().contains("I/O error"), "got: {err}");
}

#[test]
fn test_manifest_error_display() {
    let err = PaktError::Manifest {
        message: "bad syntax".to_string(),
    };
    assert_eq!(err.to_string(), "Manifest error: bad syntax");
}

#[test]
fn test_invalid_constraint_display() {
    let err = PaktError::InvalidConstraint {
        constraint: ">=>1".to_string(),
        reason: "unexpected operator".to_string(),
    };
    assert_eq!(
        err.to_string(),
        "Invalid constraint '>=>1': unexpected operator"
    );
}

#[test]
fn test_resolution_error_display() {
    let err = PaktError::Resolution {
        message: "conflict".to_string(),
    };
    assert_eq!(err.to_string(), "Dependency resolution failed: conflict");
}

#[test]
fn test_plan_error_display() {
    let err = PaktError::Plan {
        message: "cycle".to_string(),
    };
    assert_eq!(err.to_string(), "Planning failed: cycle");
}

#[test]
fn test_cancelled_display() {
    assert_eq!(PaktError::Cancelled.to_string(), "Operation cancelled");
}

#[test]
fn test_generic_error_display() {
    let err = PaktError::Generic {
        message: "something broke".to_string(),
    };
    assert_eq!(err.to_string(), "something broke");
}

#[test]
fn test_io_error_from_conversion() {
    let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
    let pakt_err: PaktError = io_err.into();
    assert!(matches!(pakt_err, PaktError::Io(_)));
}
