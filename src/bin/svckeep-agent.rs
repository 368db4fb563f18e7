//! svckeep-agent: a demonstration agent run through svckeep.
//!
//! # Usage
//!
//! ```bash
//! # Register with startup arguments (stored and replayed at service start)
//! svckeep-agent -register -quiet -description="Example agent" --tick 5s
//!
//! # Remove the service
//! svckeep-agent -unregister
//!
//! # Run in the foreground (Ctrl-C stops)
//! svckeep-agent --tick 1s
//! ```
//!
//! `SVCKEEP_CONFIG` names a TOML service configuration; `SVCKEEP_LOG`
//! sets the log filter (default `info`).

use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use anyhow::Context;
use svckeep::prelude::*;

const DEFAULT_NAME: &str = "svckeep-agent";
const DEFAULT_TICK: Duration = Duration::from_secs(1);

/// Demo workload: counts ticks until asked to stop.
struct TickingAgent {
    stop: Arc<AtomicBool>,
    ticks: AtomicU64,
}

impl TickingAgent {
    fn new() -> Self {
        Self {
            stop: Arc::new(AtomicBool::new(false)),
            ticks: AtomicU64::new(0),
        }
    }

    fn stop_handle(&self) -> Arc<dyn StopHandle> {
        let stop = Arc::clone(&self.stop);
        Arc::new(move || stop.store(true, Ordering::SeqCst))
    }
}

fn tick_interval(args: &[String]) -> Duration {
    args.windows(2)
        .find(|pair| pair[0] == "--tick")
        .and_then(|pair| humantime::parse_duration(&pair[1]).ok())
        .unwrap_or(DEFAULT_TICK)
}

impl ServiceEntry for TickingAgent {
    fn run(&self, ctx: WorkerContext) -> u32 {
        let tick = tick_interval(ctx.args());
        tracing::info!(args = ?ctx.args(), ?tick, "agent started");
        while !self.stop.load(Ordering::SeqCst) {
            ctx.pause_point();
            let n = self.ticks.fetch_add(1, Ordering::SeqCst) + 1;
            tracing::debug!(tick = n, "working");
            std::thread::sleep(tick);
        }
        tracing::info!(ticks = self.ticks.load(Ordering::SeqCst), "agent stopped");
        0
    }
}

fn load_config() -> anyhow::Result<ServiceConfig> {
    let config = match std::env::var_os("SVCKEEP_CONFIG") {
        Some(path) => ServiceConfig::load(&path)
            .with_context(|| format!("loading {}", path.to_string_lossy()))?,
        None => ServiceConfig::new(DEFAULT_NAME),
    };
    config.validate().context("validating service configuration")?;
    Ok(config)
}

fn register(host: Backends, config: &ServiceConfig, cli: CommandLine) -> anyhow::Result<ExitCode> {
    let ServiceAction::Register {
        description,
        startup_args,
    } = cli.action
    else {
        anyhow::bail!("not a register command");
    };
    let registration = Registration::from_config(config, description, startup_args)
        .context("resolving the executable path")?;
    let manager = RegistrationManager::new(host.manager, host.store, host.sink);
    Ok(status_code(manager.register(&registration, cli.quiet)))
}

fn status_code(result: Result<(), RegistrationError>) -> ExitCode {
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::debug!(error = %e, "registration command failed");
            ExitCode::from(u8::try_from(e.exit_status()).unwrap_or(1))
        }
    }
}

fn runtime_for(host: &Backends, config: &ServiceConfig, agent: &Arc<TickingAgent>) -> ServiceRuntime {
    let entry: Arc<dyn ServiceEntry> = agent.clone();
    ServiceRuntime::new(
        config.identity(),
        entry,
        Arc::clone(&host.control_host),
        ParameterStore::new(Arc::clone(&host.store)),
        Arc::clone(&host.sink),
    )
    .with_stop_handle(agent.stop_handle())
    .with_spawner(Arc::clone(&host.spawner))
    .with_wait_hint(config.wait_hint)
}

/// Console mode: the agent runs on this thread; Ctrl-C requests a stop.
fn run_console(runtime: &ServiceRuntime, agent: &TickingAgent, argv: Vec<String>) -> anyhow::Result<ExitCode> {
    let signals = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("building the signal runtime")?;
    let stop = agent.stop_handle();
    std::thread::Builder::new()
        .name("svckeep-signals".to_string())
        .spawn(move || {
            signals.block_on(async {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("interrupt received, stopping");
                    stop.request_stop();
                }
            });
        })
        .context("spawning the signal thread")?;

    let code = runtime.run_console(argv);
    Ok(ExitCode::from(u8::try_from(code).unwrap_or(u8::MAX)))
}

fn run() -> anyhow::Result<ExitCode> {
    let argv: Vec<String> = std::env::args().collect();
    let cli = parse_command_line(&argv);
    let config = load_config()?;
    let host = backends(&config);
    tracing::debug!(host = %host.host, action = ?cli.action, quiet = cli.quiet, "starting");

    match cli.action {
        ServiceAction::Register { .. } => register(host, &config, cli),
        ServiceAction::Unregister => {
            let manager = RegistrationManager::new(host.manager, host.store, host.sink);
            Ok(status_code(manager.unregister(&config.name, cli.quiet)))
        }
        ServiceAction::Service => {
            let agent = Arc::new(TickingAgent::new());
            let runtime = Arc::new(runtime_for(&host, &config, &agent));
            if Arc::clone(&runtime).run_as_service(host.dispatcher.as_ref()) {
                return Ok(ExitCode::SUCCESS);
            }
            tracing::warn!("not started by the service manager, running in console mode");
            run_console(&runtime, &agent, argv)
        }
        ServiceAction::Console => {
            let agent = Arc::new(TickingAgent::new());
            let runtime = runtime_for(&host, &config, &agent);
            run_console(&runtime, &agent, argv)
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("SVCKEEP_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run() {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn tick_interval_from_args() {
        assert_eq!(
            tick_interval(&strings(&["agent", "--tick", "250ms"])),
            Duration::from_millis(250)
        );
        assert_eq!(tick_interval(&strings(&["agent"])), DEFAULT_TICK);
        assert_eq!(tick_interval(&strings(&["agent", "--tick", "soon"])), DEFAULT_TICK);
    }

    #[test]
    fn agent_stops_on_request() {
        let agent = Arc::new(TickingAgent::new());
        let stop = agent.stop_handle();
        let worker = {
            let agent = Arc::clone(&agent);
            std::thread::spawn(move || {
                agent.run(WorkerContext::detached(strings(&["agent", "--tick", "5ms"])))
            })
        };
        std::thread::sleep(Duration::from_millis(30));
        stop.request_stop();

        #[allow(clippy::unwrap_used)]
        let code = worker.join().unwrap();
        assert_eq!(code, 0);
        assert!(agent.ticks.load(Ordering::SeqCst) > 0);
    }
}
