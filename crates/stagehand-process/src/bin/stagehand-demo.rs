//! Demo binary: runs one of a few canned module setups.
//!
//! ```text
//! stagehand-demo --scenario two-modules
//! stagehand-demo --scenario env --config settings.yaml
//! stagehand-demo --scenario chained --once
//! ```

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Context as _;
use clap::{Parser, ValueEnum};
use stagehand::logging::init_tracing;
use stagehand::{
    EnvDeclaration, Environment, ModuleDescriptor, ModuleManager, Settings, Value,
};
use stagehand_process::{run_as_application_core, run_until, TerminationCause};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Scenario {
    /// A single module that logs a greeting.
    Hello,
    /// One module exports a service, a second one imports it.
    TwoModules,
    /// A module with environment requirements.
    Env,
    /// Chained registration; init values are used again in destroy.
    Chained,
}

#[derive(Debug, Parser)]
#[command(name = "stagehand-demo", version, about = "Run a stagehand module manager until a signal arrives")]
struct Args {
    /// Module setup to run.
    #[arg(long, value_enum, default_value = "hello")]
    scenario: Scenario,

    /// YAML settings file (name, logging, env overrides).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Initialize and destroy immediately instead of waiting for a signal.
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let settings = match &args.config {
        Some(path) => Settings::load_from_file(path)
            .with_context(|| format!("Loading {}", path.display()))?,
        None => Settings::default(),
    };
    init_tracing(&settings.logging)?;

    let manager = ModuleManager::new(settings.into_manager_config(Environment::from_process()));
    register_scenario(&manager, args.scenario)?;

    let cause = if args.once {
        run_until(&manager, async { Ok(TerminationCause::Interrupt) }).await?
    } else {
        run_as_application_core(&manager).await?
    };

    std::process::exit(cause.exit_code());
}

fn register_scenario(manager: &ModuleManager, scenario: Scenario) -> stagehand::Result<()> {
    match scenario {
        Scenario::Hello => {
            manager.register(
                ModuleDescriptor::new("hello")
                    .init_sync(|ctx| {
                        ctx.logger().info("Hello world!");
                        Ok(None)
                    })
                    .destroy_sync(|ctx, _| {
                        ctx.logger().info("Goodbye world!");
                        Ok(())
                    }),
            )?;
        }
        Scenario::TwoModules => {
            manager
                .register(
                    ModuleDescriptor::new("one")
                        .export("symbolFromOne")
                        .init_sync(|_ctx| Ok(Some(Value::new("Message from one".to_string())))),
                )?
                .register(
                    ModuleDescriptor::new("two")
                        .imports(["symbolFromOne"])
                        .init_sync(|ctx| {
                            let message = ctx
                                .import_as::<String>("symbolFromOne")
                                .context("symbolFromOne was not provided")?;
                            ctx.logger().info(&format!("Module two received: {}", message));
                            Ok(None)
                        }),
                )?;
        }
        Scenario::Env => {
            manager.register(
                ModuleDescriptor::new("server")
                    .env(EnvDeclaration::new("SERVER_HOST").with_default("127.0.0.1"))
                    .env(
                        EnvDeclaration::new("SERVER_PORT")
                            .with_default(8080)
                            .with_hint("TCP port to listen on")
                            .with_valid(|v| {
                                v.as_f64().or_else(|| v.as_str()?.parse().ok())
                                    .is_some_and(|port| (1.0..=65535.0).contains(&port))
                            }),
                    )
                    .env(
                        EnvDeclaration::new("SERVER_TOKEN")
                            .with_default("change-me")
                            .with_show_value(false),
                    )
                    .init_sync(|ctx| {
                        let env = ctx.env();
                        let host = env.get("SERVER_HOST").context("SERVER_HOST not set")?;
                        let port = env.get("SERVER_PORT").context("SERVER_PORT not set")?;
                        ctx.logger().info(&format!("Would listen on {}:{}", host, port));
                        Ok(None)
                    }),
            )?;
        }
        Scenario::Chained => {
            let started = Arc::new(AtomicUsize::new(0));
            let counter = Arc::clone(&started);
            manager
                .register(
                    ModuleDescriptor::new("counter")
                        .export("counter")
                        .init_sync(move |_ctx| Ok(Some(Value::from_arc(Arc::clone(&counter)))))
                        .destroy_sync(|ctx, value| {
                            let count = value
                                .and_then(|v| v.downcast::<AtomicUsize>())
                                .map(|c| c.load(Ordering::SeqCst))
                                .unwrap_or_default();
                            ctx.logger().info(&format!("{} workers used the counter", count));
                            Ok(())
                        }),
                )?
                .register(worker("worker-a"))?
                .register(worker("worker-b"))?;
        }
    }
    Ok(())
}

/// A module that bumps the shared counter and remembers its ticket number.
fn worker(name: &str) -> ModuleDescriptor {
    ModuleDescriptor::new(name)
        .imports(["counter"])
        .init_sync(|ctx| {
            let counter = ctx
                .import_as::<AtomicUsize>("counter")
                .context("counter was not provided")?;
            let ticket = counter.fetch_add(1, Ordering::SeqCst) + 1;
            ctx.logger().info(&format!("Took ticket {}", ticket));
            Ok(Some(Value::new(ticket)))
        })
        .destroy_sync(|ctx, value| {
            let ticket = value.and_then(|v| v.downcast::<usize>()).map(|t| *t);
            ctx.logger().info(&format!("Returning ticket {:?}", ticket));
            Ok(())
        })
}
