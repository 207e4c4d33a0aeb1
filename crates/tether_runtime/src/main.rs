//! Tether Runtime
//!
//! Boots an application, hands a host array to script, and feeds the engine
//! thread from worker threads.
//!
//! Usage: `tether [script.js] [--config engine.json] [args...]`

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;
use tether_core::{BoundaryValue, HostArray};
use tether_script::{with_current_engine, Application, EngineConfig};

const DEMO_SCRIPT: &str = r#"
    var positions = Host.toJsArray(Host.positions);
    Host.log("positions: " + positions.length + " entries");

    function step(dt) {
        positions.forEach(function (value, index) {
            positions[index] = value + dt;
        });
        return positions[0];
    }

    try {
        positions.push(0);
    } catch (err) {
        Host.log("push rejected: " + err.name);
    }
"#;

/// Run a script against a demo host array, fed from worker threads.
#[derive(Debug, Parser)]
#[command(name = "tether", version = tether_core::VERSION)]
struct Options {
    /// Script to run instead of the built-in demo
    script: Option<PathBuf>,

    /// Engine configuration (JSON)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Extra arguments exposed to script as `Host.arguments`
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    passthrough: Vec<String>,
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    tracing::info!("Tether v{}", tether_core::VERSION);
    let options = Options::parse();

    let config = match &options.config {
        Some(path) => EngineConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => EngineConfig::default(),
    };

    let app = Application::new(config, options.passthrough.clone())?;
    let positions: HostArray<i32> = (0..8).map(|i| i * 10).collect();

    app.engine()
        .expose("positions", &BoundaryValue::from(positions.handle()))?;
    app.engine().register_function("log", |args| {
        let line = args
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" ");
        tracing::info!(target: "script", "{line}");
        Ok(BoundaryValue::Null)
    })?;

    match &options.script {
        Some(path) => app.engine().execute_file(path)?,
        None => app.engine().execute(DEMO_SCRIPT)?,
    }
    tracing::info!("Script loaded, starting workers");

    let workers: Vec<_> = (1..=3)
        .map(|worker| {
            let handle = app.handle();
            thread::spawn(move || -> Result<()> {
                for tick in 0..2 {
                    thread::sleep(Duration::from_millis(10 * worker));
                    handle.dispatch(move || {
                        let first = with_current_engine(|engine| {
                            engine.call_function("step", &[BoundaryValue::Int(worker as i64)])
                        });
                        match first {
                            Some(Ok(value)) => {
                                tracing::info!(worker, tick, first = %value, "step applied")
                            }
                            Some(Err(err)) => tracing::warn!(worker, %err, "step failed"),
                            None => tracing::warn!(worker, "no engine running"),
                        }
                    })?;
                }
                Ok(())
            })
        })
        .collect();

    let handle = app.handle();
    let waiter = thread::spawn(move || {
        for worker in workers {
            match worker.join() {
                Ok(Err(err)) => tracing::warn!(%err, "worker stopped early"),
                Err(_) => tracing::error!("worker panicked"),
                Ok(Ok(())) => {}
            }
        }
        handle.quit();
    });

    let code = app.exec()?;
    if waiter.join().is_err() {
        tracing::error!("worker supervisor panicked");
    }

    tracing::info!(code, positions = ?positions.to_vec(), "Runtime finished");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_definition_is_consistent() {
        Options::command().debug_assert();
    }

    #[test]
    fn script_config_and_passthrough_arguments() {
        let options =
            Options::try_parse_from(["tether", "game.js", "--config", "engine.json", "--", "--level", "3"])
                .unwrap();
        assert_eq!(options.script, Some(PathBuf::from("game.js")));
        assert_eq!(options.config, Some(PathBuf::from("engine.json")));
        assert_eq!(options.passthrough, vec!["--level", "3"]);
    }

    #[test]
    fn config_flag_requires_a_value() {
        assert!(Options::try_parse_from(["tether", "--config"]).is_err());
    }

    #[test]
    fn no_arguments_runs_the_demo() {
        let options = Options::try_parse_from(["tether"]).unwrap();
        assert!(options.script.is_none());
        assert!(options.passthrough.is_empty());
    }
}
