use regstrategy::core::strategy::Transformation;
use regstrategy::core::types::{ErrorCategory, TransformationKind};
use std::fs;
use tempfile::TempDir;

const BSPLINE: &str = r#"// Deformable stage
(Registration "MultiResolutionRegistration")
(Transform "BSplineTransform")
(FinalGridSpacingInPhysicalUnits 16.0 16.0 16.0)
(NumberOfResolutions 3)
(ResultImageFormat "nii.gz")
"#;

#[test]
fn test_file_round_trip_preserves_parameters() {
    let dir = TempDir::new().unwrap();
    let original_path = dir.path().join("BSpline.txt");
    fs::write(&original_path, BSPLINE).unwrap();

    let original = Transformation::from_file(&original_path).unwrap();
    assert_eq!(original.name(), "BSpline");
    assert_eq!(original.kind(), TransformationKind::Elastic);

    let copy_path = dir.path().join("copy.txt");
    original.save_to_file(&copy_path).unwrap();
    let reloaded = Transformation::from_file(&copy_path).unwrap();

    assert_eq!(reloaded.parameter_names(), original.parameter_names());
    for key in original.parameter_names() {
        assert_eq!(
            reloaded.get_parameter(key).unwrap(),
            original.get_parameter(key).unwrap()
        );
    }
    assert_eq!(reloaded.fingerprint(), original.fingerprint());
}

#[test]
fn test_saved_file_drops_comments() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("out.txt");
    Transformation::parse(BSPLINE).unwrap().save_to_file(&path).unwrap();

    let written = fs::read_to_string(&path).unwrap();
    assert!(written.starts_with("(Registration \"MultiResolutionRegistration\")\n"));
    assert!(!written.contains("//"));
    assert_eq!(written.lines().count(), 5);
}

#[test]
fn test_missing_file_is_parse_error() {
    let dir = TempDir::new().unwrap();
    let err = Transformation::from_file(&dir.path().join("absent.txt")).unwrap_err();
    assert_eq!(err.category, ErrorCategory::ParseError);
    assert_eq!(err.code, "RS-PARAM-001");
}

#[test]
fn test_failed_load_leaves_existing_parameters() {
    let dir = TempDir::new().unwrap();
    let good = dir.path().join("good.txt");
    let bad = dir.path().join("bad.txt");
    fs::write(&good, BSPLINE).unwrap();
    fs::write(&bad, "(Transform \"AffineTransform\"\n").unwrap();

    let mut transformation = Transformation::from_file(&good).unwrap();
    let before = transformation.clone();
    let err = transformation.load_from_file(&bad).unwrap_err();

    assert_eq!(err.category, ErrorCategory::ParseError);
    assert_eq!(transformation, before);
}

#[test]
fn test_get_unknown_key_is_key_not_found() {
    let transformation = Transformation::parse(BSPLINE).unwrap();
    let err = transformation.get_parameter("Optimizer").unwrap_err();
    assert_eq!(err.category, ErrorCategory::KeyNotFound);
}

#[test]
fn test_set_parameter_changes_fingerprint() {
    let mut transformation = Transformation::parse(BSPLINE).unwrap();
    let before = transformation.fingerprint();
    transformation.set_parameter("NumberOfResolutions", "4").unwrap();
    assert_ne!(transformation.fingerprint(), before);
    assert_eq!(transformation.get_parameter("NumberOfResolutions").unwrap(), "4");
    assert_eq!(transformation.parameter_names()[3], "NumberOfResolutions");
}

#[test]
fn test_result_format_is_read_from_parameters() {
    let transformation = Transformation::parse(BSPLINE).unwrap();
    assert_eq!(transformation.result_image_format().as_deref(), Some("nii.gz"));
}

#[test]
fn test_set_parameter_cannot_inject_entries() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("Rigid.txt");
    let mut transformation = Transformation::parse("(Transform \"EulerTransform\")").unwrap();

    let err = transformation
        .set_parameter(
            "Metric",
            "\"AdvancedMattesMutualInformation\") (MaximumNumberOfIterations 1",
        )
        .unwrap_err();
    assert_eq!(err.category, ErrorCategory::ParseError);
    assert_eq!(err.code, "RS-PARAM-002");

    transformation.save_to_file(&path).unwrap();
    let reloaded = Transformation::from_file(&path).unwrap();
    assert_eq!(reloaded.parameter_names(), vec!["Transform"]);
    assert_eq!(reloaded.fingerprint(), transformation.fingerprint());
}

#[test]
fn test_set_parameter_rejects_empty_values_and_bad_names() {
    let mut transformation = Transformation::parse(BSPLINE).unwrap();
    let before = transformation.clone();

    for (key, value) in [
        ("Metric", ""),
        ("Metric", "1\n(Optimizer 2)"),
        ("Bad Key", "1"),
        ("Bad)", "1"),
        ("\"Quoted\"", "1"),
    ] {
        let err = transformation.set_parameter(key, value).unwrap_err();
        assert_eq!(err.code, "RS-PARAM-002", "{:?} = {:?}", key, value);
    }
    assert_eq!(transformation, before);

    // Parentheses inside a quoted string stay part of the value.
    transformation
        .set_parameter("Comment", "\"stage (2) of 3\"")
        .unwrap();
    let reparsed = Transformation::parse(&transformation.to_parameter_text()).unwrap();
    assert_eq!(reparsed.get_parameter("Comment").unwrap(), "\"stage (2) of 3\"");
}
