#[path = "../common/mod.rs"]
mod common;

use common::{engine_with, write_volume, FakeEngine, RIGID_PARAMETERS};
use regstrategy::core::strategy::{
    CancelToken, LoadedStrategy, RunPolicy, StrategyDocument, StrategyNode, TracingReporter,
    Transformation,
};
use regstrategy::core::types::{ErrorCategory, TransformationKind};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const STRATEGY: &str = r#"version: "1.0"
metadata:
  name: hi-3 onto hi-5
nodes:
  - id: input
    dataset: data/hi-3.mhd
    fixed_data: data/hi-5.mhd
  - id: rigid
    output_folder: out/rigid
  - id: elastic
    output_folder: out/elastic
edges:
  - parent: input
    child: rigid
    transformation: params/Rigid.txt
  - parent: rigid
    child: elastic
    transformation: params/BSpline.txt
"#;

fn workspace() -> (TempDir, PathBuf) {
    let dir = TempDir::new().unwrap();
    write_volume(&dir.path().join("data").join("hi-3.mhd"));
    write_volume(&dir.path().join("data").join("hi-5.mhd"));
    fs::create_dir_all(dir.path().join("params")).unwrap();
    fs::write(dir.path().join("params").join("Rigid.txt"), RIGID_PARAMETERS).unwrap();
    fs::write(
        dir.path().join("params").join("BSpline.txt"),
        "(Transform \"BSplineTransform\")\n",
    )
    .unwrap();
    let path = dir.path().join("strategy.yaml");
    fs::write(&path, STRATEGY).unwrap();
    (dir, path)
}

async fn run_all(strategy: &mut LoadedStrategy) {
    let report = strategy
        .graph
        .run(
            &engine_with(FakeEngine::new()),
            &TracingReporter,
            &CancelToken::never(),
            RunPolicy::StopOnFailure,
        )
        .await
        .unwrap();
    assert!(report.is_success());
}

#[test]
fn test_load_resolves_paths_against_document() {
    let (dir, path) = workspace();
    let strategy = LoadedStrategy::load(&path).unwrap();

    assert_eq!(strategy.base_dir(), dir.path());
    assert_eq!(
        strategy.metadata().and_then(|m| m.name.as_deref()),
        Some("hi-3 onto hi-5")
    );
    let input = strategy.graph.node("input").unwrap();
    assert_eq!(input.dataset, Some(dir.path().join("data").join("hi-3.mhd")));
    assert!(!input.dirty);
    assert!(strategy.graph.node("rigid").unwrap().dirty);

    let rigid = strategy.graph.transformation("rigid").unwrap();
    assert_eq!(rigid.name(), "Rigid");
    assert_eq!(rigid.kind(), TransformationKind::Rigid);
    assert_eq!(
        strategy.graph.transformation("elastic").unwrap().kind(),
        TransformationKind::Elastic
    );
}

#[tokio::test]
async fn test_saved_results_are_clean_after_reload() {
    let (_dir, path) = workspace();
    let mut strategy = LoadedStrategy::load(&path).unwrap();
    run_all(&mut strategy).await;
    strategy.save().unwrap();

    let saved = StrategyDocument::from_yaml(&fs::read_to_string(&path).unwrap()).unwrap();
    let rigid = saved.nodes.iter().find(|node| node.id == "rigid").unwrap();
    assert_eq!(
        rigid.dataset.as_deref(),
        Some(Path::new("out/rigid/result.0.mhd"))
    );
    assert!(saved.edges.iter().all(|edge| edge.fingerprint.is_some()));
    assert_eq!(saved.edges[0].transformation, PathBuf::from("params/Rigid.txt"));

    let reloaded = LoadedStrategy::load(&path).unwrap();
    assert!(!reloaded.graph.node("rigid").unwrap().dirty);
    assert!(!reloaded.graph.node("elastic").unwrap().dirty);
}

#[tokio::test]
async fn test_edited_parameter_file_invalidates_subtree_on_reload() {
    let (dir, path) = workspace();
    let mut strategy = LoadedStrategy::load(&path).unwrap();
    run_all(&mut strategy).await;
    strategy.save().unwrap();

    fs::write(
        dir.path().join("params").join("Rigid.txt"),
        "(Transform \"EulerTransform\")\n(NumberOfResolutions 2)\n",
    )
    .unwrap();

    let reloaded = LoadedStrategy::load(&path).unwrap();
    assert!(!reloaded.graph.node("input").unwrap().dirty);
    assert!(reloaded.graph.node("rigid").unwrap().dirty);
    assert!(reloaded.graph.node("elastic").unwrap().dirty);
}

#[tokio::test]
async fn test_deleted_result_is_dirty_on_reload() {
    let (dir, path) = workspace();
    let mut strategy = LoadedStrategy::load(&path).unwrap();
    run_all(&mut strategy).await;
    strategy.save().unwrap();

    fs::remove_file(dir.path().join("out").join("elastic").join("result.0.mhd")).unwrap();

    let reloaded = LoadedStrategy::load(&path).unwrap();
    assert!(!reloaded.graph.node("rigid").unwrap().dirty);
    assert!(reloaded.graph.node("elastic").unwrap().dirty);
}

#[test]
fn test_missing_parameter_file_names_the_edge() {
    let (dir, path) = workspace();
    fs::remove_file(dir.path().join("params").join("BSpline.txt")).unwrap();

    let err = LoadedStrategy::load(&path).unwrap_err();
    assert_eq!(err.category, ErrorCategory::ParseError);
    assert_eq!(
        err.context.get("edge").map(String::as_str),
        Some("rigid -> elastic")
    );
}

#[test]
fn test_second_parent_is_rejected() {
    let (_dir, path) = workspace();
    fs::write(
        &path,
        format!(
            "{}  - parent: input\n    child: elastic\n    transformation: params/Rigid.txt\n",
            STRATEGY
        ),
    )
    .unwrap();

    let err = LoadedStrategy::load(&path).unwrap_err();
    assert_eq!(err.code, "RS-GRAPH-002");
}

#[test]
fn test_missing_strategy_file() {
    let dir = TempDir::new().unwrap();
    let err = LoadedStrategy::load(&dir.path().join("strategy.yaml")).unwrap_err();
    assert_eq!(err.code, "RS-DOC-001");
}

#[test]
fn test_new_edges_get_their_own_parameter_file() {
    let (dir, path) = workspace();
    let mut strategy = LoadedStrategy::load(&path).unwrap();
    strategy
        .graph
        .add_node(
            "affine",
            StrategyNode::new().with_output_folder(dir.path().join("out").join("affine")),
        )
        .unwrap();
    strategy
        .graph
        .connect(
            "input",
            "affine",
            Transformation::parse("(Transform \"AffineTransform\")\n").unwrap(),
        )
        .unwrap();
    strategy.save().unwrap();

    let written = Transformation::from_file(&dir.path().join("affine.txt")).unwrap();
    assert_eq!(written.kind(), TransformationKind::Affine);

    let reloaded = LoadedStrategy::load(&path).unwrap();
    assert_eq!(reloaded.graph.len(), 4);
    assert_eq!(reloaded.graph.incoming("affine").unwrap().unwrap().0, "input");
    let output_folder = reloaded.graph.node("affine").unwrap().output_folder.clone();
    assert_eq!(output_folder, Some(dir.path().join("out").join("affine")));
}
