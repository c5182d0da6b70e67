//! Bridge CLI
//!
//! Runs scripts, optionally under the debugger with protocol traffic on
//! stdin/stdout.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use bridge::{BridgeConfig, DebugContext, DebugError};
use bridge_js_runtime::ScriptContext;
use bridge_types::HostValue;

/// Script bridge runner and debugger
#[derive(Parser, Debug)]
#[command(name = "bridge")]
#[command(about = "Run and debug scripts on the bridge runtime", long_about = None)]
struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Evaluate a script and print its result as JSON
    Run {
        file: PathBuf,
    },

    /// Run a script under the debugger, reading protocol messages from stdin
    Debug {
        file: PathBuf,

        /// Pause before the first statement
        #[arg(long)]
        pause_on_start: bool,
    },
}

fn main() -> Result<()> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main())
}

async fn async_main() -> Result<()> {
    // Logs go to stderr; stdout carries results and protocol traffic
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("bridge=info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => BridgeConfig::load(path).await?,
        None => BridgeConfig::default(),
    };

    match args.command {
        Command::Run { file } => run_script(&file, config).await,
        Command::Debug { file, pause_on_start } => debug_script(&file, pause_on_start, config).await,
    }
}

async fn read_script(path: &Path) -> Result<(String, String)> {
    let source = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read script {}", path.display()))?;
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    Ok((source, name))
}

fn print_value(value: &HostValue) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&value.to_json())?);
    Ok(())
}

async fn run_script(path: &Path, config: BridgeConfig) -> Result<()> {
    let (source, name) = read_script(path).await?;

    let value = tokio::task::spawn_blocking(move || -> Result<HostValue> {
        let context = ScriptContext::with_config(config.runtime)?;
        Ok(context.run_with_name(&source, &name)?)
    })
    .await??;

    print_value(&value)
}

/// Send one protocol request on a blocking thread and print its response.
/// Requests block until answered, so the caller never awaits them inline.
fn spawn_request(debug: Arc<DebugContext>, line: String) -> JoinHandle<Result<String, DebugError>> {
    tokio::task::spawn_blocking(move || {
        let result = debug.send_protocol_message(&line);
        match &result {
            Ok(response) => println!("{response}"),
            Err(e) => warn!("Protocol message failed: {}", e),
        }
        result
    })
}

async fn debug_script(path: &Path, pause_on_start: bool, config: BridgeConfig) -> Result<()> {
    let (source, name) = read_script(path).await?;

    let mut debugger_config = config.debugger;
    if pause_on_start {
        debugger_config.pause_on_start = true;
    }

    let context = ScriptContext::with_config(config.runtime)?;
    let debug = Arc::new(DebugContext::with_config(&context, debugger_config)?);
    info!("Debugging {}", name);

    let (done_tx, mut done_rx) = oneshot::channel();
    let worker = {
        let debug = Arc::clone(&debug);
        thread::spawn(move || {
            let result = debug.debug(&source, Some(&name), |notification| println!("{notification}"));
            let _ = done_tx.send(result);
        })
    };

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    let result = loop {
        tokio::select! {
            result = &mut done_rx => break result.map_err(|_| anyhow!("debug worker exited without a result"))?,
            line = lines.next_line(), if stdin_open => match line? {
                Some(line) if line.trim().is_empty() => {}
                Some(line) => {
                    spawn_request(Arc::clone(&debug), line);
                }
                None => stdin_open = false,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, terminating script...");
                if let Err(e) = debug.terminate_execution() {
                    warn!("Could not terminate: {}", e);
                }
            }
        }
    };

    worker.join().map_err(|_| anyhow!("debug worker panicked"))?;

    match result {
        Ok(value) => print_value(&value),
        Err(DebugError::Terminated) => {
            warn!("Script execution was terminated");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use bridge_types::HostCallable;
    use crossbeam::channel::unbounded;

    #[tokio::test(flavor = "multi_thread")]
    async fn test_terminate_stays_reachable_with_request_outstanding() {
        let context = ScriptContext::new().unwrap();
        let (ready_tx, ready_rx) = unbounded();
        let block = HostCallable::variadic(move |_| {
            let _ = ready_tx.send(());
            thread::sleep(Duration::from_millis(500));
            Ok(HostValue::Null)
        });
        context.set_parameter("block", HostValue::Callable(block)).unwrap();

        let debug = Arc::new(DebugContext::new(&context).unwrap());
        let worker = {
            let debug = Arc::clone(&debug);
            thread::spawn(move || debug.debug("block(); while (true) {}", None, |_| {}))
        };
        ready_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        // The script thread is inside host code, so this request waits
        let id = debug.next_message_id();
        let request = spawn_request(Arc::clone(&debug), format!(r#"{{"id":{id},"method":"Runtime.enable"}}"#));

        debug.terminate_execution().unwrap();
        let outcome = tokio::time::timeout(Duration::from_secs(5), request).await;
        assert!(matches!(outcome, Ok(Ok(_))));
        assert!(matches!(worker.join().unwrap(), Err(DebugError::Terminated)));
    }
}
