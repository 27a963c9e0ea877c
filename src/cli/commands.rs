//! Subcommand handlers

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use super::args::{Cli, Command, ImportArgs, RunArgs, TargetArgs};
use crate::auth::TokenManager;
use crate::config::{EnvRegistry, Environment};
use crate::dsl::{execution_order, DslEngine, DslSuite, ReportFormat, TagFilter};
use crate::flow::Assertion;
use crate::http::{BlockingTransport, HttpTransport};
use crate::openapi::{self, ImportOptions};
use crate::status::ExitStatus;
use crate::store::SharedDataPool;
use crate::validation::Validation;

pub fn execute(cli: &Cli) -> Result<ExitStatus> {
    match &cli.command {
        Command::Run(args) => run(args),
        Command::Validate { suites } => validate(suites),
        Command::Env(target) => show_env(target),
        Command::Import(args) => import(args),
    }
}

/// An explicit `--config` must load; otherwise fall back to defaults
fn open_registry(target: &TargetArgs) -> Result<EnvRegistry> {
    let active = Environment::select(target.env.as_deref());
    match &target.config {
        Some(path) => EnvRegistry::load(path, active)
            .with_context(|| format!("cannot load environment config {}", path.display())),
        None => Ok(EnvRegistry::load_or_default(None, active)),
    }
}

fn run(args: &RunArgs) -> Result<ExitStatus> {
    let registry = open_registry(&args.target)?;
    let env = registry.current();
    info!(env = %registry.active_env(), root_url = %env.root_url, "Using environment");

    let transport: Arc<dyn HttpTransport> = Arc::new(BlockingTransport::with_timeout(args.timeout)?);

    let tokens = if registry.accounts().is_empty() {
        None
    } else {
        let manager = TokenManager::new(env.root_url.clone(), Arc::clone(&transport))
            .with_accounts(registry.accounts().clone());
        manager.start_scheduler(args.refresh_interval);
        Some(Arc::new(manager))
    };

    let pool = SharedDataPool::from_map(args.vars.iter().cloned());
    let filter = TagFilter::new(args.tags.clone(), args.exclude_tags.clone());
    let format = if args.json {
        ReportFormat::JsonLines
    } else {
        ReportFormat::Text
    };

    let mut all_passed = true;
    let mut interrupted = false;
    for path in &args.suites {
        let suite = DslSuite::load(path)?;
        let mut engine = DslEngine::new(Arc::clone(&env), Arc::clone(&transport))
            .with_pool(pool.clone())
            .with_filter(filter.clone());
        if let Some(tokens) = &tokens {
            engine = engine.with_tokens(Arc::clone(tokens));
        }

        let result = engine.run(&suite)?;
        print!("{}", format.render(&result));
        all_passed &= result.all_passed();
        if result.interrupted {
            interrupted = true;
            break;
        }
    }

    if let Some(tokens) = tokens {
        tokens.log_status();
        tokens.shutdown();
    }
    Ok(ExitStatus::from_outcome(all_passed, interrupted))
}

fn validate(suites: &[PathBuf]) -> Result<ExitStatus> {
    for path in suites {
        let suite = DslSuite::load(path)?;
        execution_order(&suite.cases)?;

        for case in &suite.cases {
            for assertion in &case.to_step().assertions {
                if let Assertion::Expression(expression) = assertion {
                    Validation::parse(expression)
                        .with_context(|| format!("{}: case '{}'", path.display(), case.name))?;
                }
            }
            debug!(case = %case.name, "Case is valid");
        }
        println!("✓ {}: {} cases", path.display(), suite.cases.len());
    }
    Ok(ExitStatus::Success)
}

fn show_env(target: &TargetArgs) -> Result<ExitStatus> {
    let registry = open_registry(target)?;
    println!("{}", registry.describe());
    if let Some(source) = registry.source() {
        println!("Source: {}", source.display());
    }
    Ok(ExitStatus::Success)
}

fn import(args: &ImportArgs) -> Result<ExitStatus> {
    let options = ImportOptions {
        name: args.name.clone(),
        tags: args.tags.clone(),
        include_deprecated: args.include_deprecated,
    };
    let suite = if args.source.starts_with("http://") || args.source.starts_with("https://") {
        let transport = BlockingTransport::with_timeout(args.timeout)?;
        openapi::import_from_url(&args.source, &transport, &options)
    } else {
        openapi::import_from_file(Path::new(&args.source), &options)
    }
    .with_context(|| format!("cannot import {}", args.source))?;

    match &args.output {
        Some(path) => {
            suite.save(path)?;
            println!(
                "✓ Imported {} cases from {} into {}",
                suite.cases.len(),
                args.source,
                path.display()
            );
        }
        None => print!("{}", suite.to_yaml()?),
    }
    Ok(ExitStatus::Success)
}
