//! Saga demo - main entry point.
//!
//! Starts a counter model with a mounted fetch plugin, drives a few actions
//! through it and prints every snapshot.
//!
//! Usage: `saga-demo [config.toml]`

use std::path::PathBuf;
use std::time::Duration;

use saga_core::{Action, RuntimeConfig, SetupError, State};
use saga_runtime::fetch::{self, fetch_model, FetchState};
use saga_runtime::{Model, Plugin, RoutineOutcome, Runtime};
use serde_json::{json, Value};

// =============================================================================
// Configuration
// =============================================================================

/// Load the runtime config named on the command line, if any.
///
/// A missing or broken file falls back to the defaults.
fn load_config() -> RuntimeConfig {
    let Some(path) = std::env::args_os().nth(1).map(PathBuf::from) else {
        tracing::info!("No config given - using defaults");
        return RuntimeConfig::default();
    };

    tracing::info!("Loading config from: {}", path.display());
    match RuntimeConfig::load(&path) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("{} - continuing with defaults", e);
            RuntimeConfig::default()
        }
    }
}

// =============================================================================
// Model
// =============================================================================

/// Pretend user lookup.
async fn lookup_user(args: Value) -> Result<Value, String> {
    tokio::time::sleep(Duration::from_millis(20)).await;
    match args.as_str() {
        Some("ada") => Ok(json!({ "id": "ada", "name": "Ada Lovelace" })),
        Some(other) => Err(format!("no user named '{}'", other)),
        None => Err("expected a user id".to_string()),
    }
}

fn build_model() -> Result<Model, SetupError> {
    let initial = State::try_from(json!({ "count": 0, "label": "idle" }))?;

    let model = Model::new(initial)
        .reducer("increment", |state, action| {
            let by = action.field::<Option<i64>>("by").ok().flatten().unwrap_or(1);
            let count = state.get_as::<i64>("count").unwrap_or(0);
            state.with("count", count + by)
        })
        .effect("reset", |_, ctx| async move {
            ctx.set_state(json!({ "count": 0, "label": "reset" })).await
        })
        .effect("toOne", |_, ctx| async move {
            ctx.dispatch(Action::new("toTwo")).await?;
            ctx.set_state(json!({ "count": 1 })).await
        })
        .effect("toTwo", |_, ctx| async move {
            ctx.set_state(json!({ "count": 2 })).await
        })
        .plugin(Plugin::new("user", fetch_model(lookup_user)));

    Ok(model)
}

fn describe(state: &State) -> String {
    let user = FetchState::from_state(&state.slice("user")).unwrap_or_default();
    format!(
        "count={} label={} user.loading={} user.data={} user.error={}",
        state.get("count").unwrap_or(&Value::Null),
        state.get("label").unwrap_or(&Value::Null),
        user.loading,
        user.data,
        user.error.as_deref().unwrap_or("-"),
    )
}

// =============================================================================
// Entry Point
// =============================================================================

async fn run(config: RuntimeConfig) -> Result<(), SetupError> {
    let runtime = Runtime::start_with_config(build_model()?, config)?;
    let dispatcher = runtime.dispatcher();
    let mut reports = runtime.subscribe_routines();

    println!("initial   {}", describe(&runtime.state()));

    let script = [
        Action::new("increment"),
        Action::new("increment").with("by", 5),
        Action::new("toOne"),
        Action::new("reset"),
        fetch::start("ada"),
        fetch::start("bob"),
    ];
    for action in script {
        let kind = action.kind().to_string();
        dispatcher.dispatch_settled(action).await;
        println!("{:<9} {}", kind, describe(&runtime.state()));
    }

    while let Ok(report) = reports.try_recv() {
        if let RoutineOutcome::Failed(reason) = &report.outcome {
            tracing::warn!("{} '{}' failed: {}", report.task, report.tag, reason);
        }
    }

    runtime.shutdown().await;
    Ok(())
}

fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!("Saga demo starting...");
    let config = load_config();

    let rt = match tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: failed to create tokio runtime: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = rt.block_on(run(config)) {
        tracing::error!("Failed to start runtime: {}", e);
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
