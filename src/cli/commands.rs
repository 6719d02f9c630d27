use crate::{
    cli::args::{DotArgs, InvalidateArgs, ParamsArgs, ParamsCommand, RunArgs, StatusArgs},
    core::{
        strategy::{
            strategy_to_dot, CancelSource, LoadedStrategy, RegistrationEngine, RunPolicy,
            RunReport, TracingReporter, Transformation,
        },
        types::{NodeState, TransformationKind},
        AppError, ConfigLoader, ConfigValidator, StrategyConfig,
    },
    utils::atomic_write,
    Result,
};
use anyhow::anyhow;
use serde::Serialize;
use std::path::{Path, PathBuf};

pub async fn run(args: RunArgs) -> Result<()> {
    let mut strategy = LoadedStrategy::load(&args.strategy)?;
    let config = resolve_run_config(&args, strategy.base_dir())?;
    let engine = RegistrationEngine::new(config.engine.clone());
    let reporter = TracingReporter;

    let (source, cancel) = CancelSource::new();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received; stopping after the running engine is killed");
            source.cancel();
        }
    });

    tracing::info!(
        strategy = %args.strategy.display(),
        engine = %config.engine.binary,
        nodes = strategy.graph.len(),
        "starting strategy run"
    );

    let outcome = match &args.node {
        Some(node) => strategy
            .graph
            .execute_edge(node, &engine, &reporter, &cancel)
            .await
            .map(|dataset| {
                println!("{} -> {}", node, dataset.display());
                None
            }),
        None => strategy
            .graph
            .run(&engine, &reporter, &cancel, RunPolicy::from(&config.run))
            .await
            .map(Some),
    };
    interrupt.abort();

    // Persist whatever completed, even when the run failed part way.
    let saved = strategy.save();

    let finished = match outcome {
        Ok(None) => Ok(()),
        Ok(Some(report)) => finish_run(report),
        Err(err) => Err(err.into()),
    };
    settle_run(&args.strategy, finished, saved)
}

/// A run failure outranks a failure to save; the save error is only logged.
fn settle_run(
    strategy: &Path,
    finished: Result<()>,
    saved: std::result::Result<(), AppError>,
) -> Result<()> {
    match (finished, saved) {
        (Err(run_err), Err(save_err)) => {
            tracing::error!(
                strategy = %strategy.display(),
                error = %save_err,
                "failed to save strategy after run"
            );
            Err(run_err)
        }
        (Err(run_err), Ok(())) => Err(run_err),
        (Ok(()), saved) => saved.map_err(Into::into),
    }
}

fn resolve_run_config(args: &RunArgs, workspace: &Path) -> Result<StrategyConfig> {
    let mut config = ConfigLoader::load_from_workspace(workspace)?;
    if let Some(engine) = &args.engine {
        config.engine.binary = engine.clone();
    }
    if let Some(timeout) = args.timeout {
        config.engine.timeout_seconds = timeout;
    }
    if args.continue_independent {
        config.run.continue_independent = true;
    }
    ConfigValidator::validate(&config)?;
    Ok(config)
}

fn finish_run(report: RunReport) -> Result<()> {
    println!(
        "executed {}, failed {}, skipped {}, not run {}",
        report.executed.len(),
        report.failures.len(),
        report.skipped.len(),
        report.not_run.len()
    );
    for node in &report.executed {
        println!("  updated {}", node);
    }
    for node in report.skipped.iter().chain(report.not_run.iter()) {
        println!("  pending {}", node);
    }

    if report.is_success() {
        return Ok(());
    }
    let cancelled = report.cancelled;
    match report.failures.into_iter().next() {
        Some(failure) => {
            let node = failure.node.clone();
            Err(anyhow::Error::new(failure.error).context(format!("node '{}' failed", node)))
        }
        None if cancelled => Err(anyhow!("strategy run cancelled")),
        None => Ok(()),
    }
}

#[derive(Debug, Serialize)]
struct NodeStatus {
    id: String,
    state: NodeState,
    #[serde(skip_serializing_if = "Option::is_none")]
    parent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    transformation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    kind: Option<TransformationKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dataset: Option<PathBuf>,
}

pub async fn status(args: StatusArgs) -> Result<()> {
    let strategy = LoadedStrategy::load(&args.strategy)?;
    let mut rows = Vec::new();
    for (id, node) in strategy.graph.nodes() {
        let incoming = strategy.graph.incoming(id)?;
        rows.push(NodeStatus {
            id: id.to_string(),
            state: node.state(),
            parent: incoming.map(|(parent, _)| parent.to_string()),
            transformation: incoming.map(|(_, t)| t.name().to_string()),
            kind: incoming.map(|(_, t)| t.kind()),
            dataset: node.dataset.clone(),
        });
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    if let Some(name) = strategy.metadata().and_then(|m| m.name.as_deref()) {
        println!("Strategy: {}", name);
    }
    println!("{:<20} {:<13} {:<20} DATASET", "NODE", "STATE", "FROM");
    for row in rows {
        let from = match (&row.parent, &row.transformation) {
            (Some(parent), Some(name)) if !name.is_empty() => format!("{} ({})", parent, name),
            (Some(parent), _) => parent.clone(),
            _ => "-".to_string(),
        };
        let dataset = row
            .dataset
            .as_deref()
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<20} {:<13} {:<20} {}",
            row.id,
            row.state.to_string(),
            from,
            dataset
        );
    }
    Ok(())
}

pub async fn invalidate(args: InvalidateArgs) -> Result<()> {
    let mut strategy = LoadedStrategy::load(&args.strategy)?;
    let marked = strategy.graph.mark_dirty(&args.node)?;
    strategy.save()?;
    println!("marked dirty: {}", marked.join(", "));
    Ok(())
}

pub async fn dot(args: DotArgs) -> Result<()> {
    let strategy = LoadedStrategy::load(&args.strategy)?;
    let rendered = strategy_to_dot(&strategy.graph);
    match args.output {
        Some(path) => {
            atomic_write(&path, rendered.as_bytes())?;
            tracing::info!(path = %path.display(), "wrote DOT graph");
        }
        None => print!("{}", rendered),
    }
    Ok(())
}

pub async fn params(args: ParamsArgs) -> Result<()> {
    match args.command {
        ParamsCommand::Show { file } => {
            let transformation = Transformation::from_file(&file)?;
            println!("# {} ({})", transformation.name(), transformation.kind());
            for (key, value) in transformation.parameters() {
                println!("{} = {}", key, value);
            }
            Ok(())
        }
        ParamsCommand::Set { file, key, value } => {
            let mut transformation = if file.exists() {
                Transformation::from_file(&file)?
            } else {
                Transformation::new(TransformationKind::Custom)
            };
            transformation.set_parameter(key.as_str(), value.as_str())?;
            transformation.save_to_file(&file)?;
            println!("({} {})", key, value);
            Ok(())
        }
        ParamsCommand::Unset { file, key } => {
            let mut transformation = Transformation::from_file(&file)?;
            transformation.remove_parameter(&key)?;
            transformation.save_to_file(&file)?;
            Ok(())
        }
    }
}
