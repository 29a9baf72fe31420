use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use ensemble_compiler::{
    CompileOptions, CompileOutput, Compiler, DEFAULT_ENVIRONMENT, NodeCatalog, instances_on,
    reporter::{DotReporter, JsonReporter, PlanReporter, Reporter, TextReporter, plan},
};
use ensemble_manifest::Manifest;
use ensemble_registry::{HttpBackendOptions, MemoryBackend, Registry, RegistrySource};
use ensemble_scenario::{CapabilityRef, ProducerPolicy};
use miette::{Context as _, IntoDiagnostic as _, Result};
use tracing_error::ErrorLayer;
use tracing_subscriber::{EnvFilter, fmt as tracing_fmt, prelude::*};

#[derive(Parser)]
#[command(name = "ensemble")]
#[command(version)]
#[command(about = "Order multi-node application rollouts by the capabilities they exchange")]
struct Cli {
    /// Increase log verbosity (-v, -vv, -vvv, -vvvv).
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compile manifests and emit the node order or a report.
    Compile(CompileArgs),
    /// Compile manifests and report errors only.
    Check(CheckArgs),
    /// Look a capability up in the configured registries.
    Lookup(LookupArgs),
    /// Resolve the capabilities one node consumes.
    Resolve(ResolveArgs),
}

#[derive(Args)]
struct EnvironmentArgs {
    /// Environment the capabilities belong to.
    #[arg(
        long = "environment",
        env = "ENSEMBLE_ENVIRONMENT",
        default_value = DEFAULT_ENVIRONMENT
    )]
    environment: String,
}

#[derive(Args)]
struct PolicyArgs {
    /// What to do when several components produce the same capability.
    #[arg(long = "producer-policy", default_value_t = ProducerPolicy::FirstMatch)]
    producer_policy: ProducerPolicy,
}

#[derive(Args)]
struct RegistryArgs {
    /// Capability registry to consult, in order: an environment report path or an http(s) URL.
    #[arg(long = "registry", value_name = "SOURCE")]
    registry: Vec<RegistrySource>,

    /// Seconds to wait for a registry connection.
    #[arg(long = "connect-timeout", value_name = "SECS", default_value_t = 5)]
    connect_timeout: u64,

    /// Seconds to wait for a whole registry request.
    #[arg(long = "request-timeout", value_name = "SECS", default_value_t = 30)]
    request_timeout: u64,
}

impl RegistryArgs {
    /// `base` followed by the configured sources.
    fn registry(&self, base: Registry) -> Registry {
        let options = HttpBackendOptions {
            connect_timeout: Duration::from_secs(self.connect_timeout),
            request_timeout: Duration::from_secs(self.request_timeout),
            ..Default::default()
        };
        base.with_sources(&self.registry, &options)
    }
}

#[derive(Args)]
struct CompileArgs {
    #[command(flatten)]
    env: EnvironmentArgs,

    #[command(flatten)]
    policy: PolicyArgs,

    /// Select the output written to stdout.
    #[arg(long = "emit", value_enum, default_value_t = EmitKind::Text)]
    emit: EmitKind,

    /// Command template for `--emit plan`; `{node}` and `{environment}` are substituted.
    #[arg(long = "command", value_name = "TEMPLATE", default_value = plan::DEFAULT_COMMAND)]
    command: String,

    /// Also write the JSON environment report to this file.
    #[arg(long = "json", value_name = "FILE")]
    json: Option<PathBuf>,

    /// Manifest files or directories of `*.json5` manifests.
    #[arg(value_name = "INPUT", required = true)]
    inputs: Vec<PathBuf>,
}

#[derive(Args)]
struct CheckArgs {
    #[command(flatten)]
    env: EnvironmentArgs,

    #[command(flatten)]
    policy: PolicyArgs,

    /// Manifest files or directories of `*.json5` manifests.
    #[arg(value_name = "INPUT", required = true)]
    inputs: Vec<PathBuf>,
}

#[derive(Args)]
struct LookupArgs {
    #[command(flatten)]
    env: EnvironmentArgs,

    #[command(flatten)]
    registry: RegistryArgs,

    /// Capability reference, e.g. `Sql[one]`.
    #[arg(value_name = "CAPABILITY")]
    capability: CapabilityRef,
}

#[derive(Args)]
struct ResolveArgs {
    #[command(flatten)]
    env: EnvironmentArgs,

    #[command(flatten)]
    policy: PolicyArgs,

    #[command(flatten)]
    registry: RegistryArgs,

    /// Node whose consumed capabilities are resolved.
    #[arg(long = "node", value_name = "NODE")]
    node: String,

    /// Manifest files or directories of `*.json5` manifests.
    #[arg(value_name = "INPUT", required = true)]
    inputs: Vec<PathBuf>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum EmitKind {
    Text,
    Json,
    Order,
    Dot,
    Plan,
}

#[tokio::main]
async fn main() -> Result<()> {
    miette::set_panic_hook();
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;

    match cli.command {
        Command::Compile(args) => compile(args),
        Command::Check(args) => check(args),
        Command::Lookup(args) => lookup(args).await,
        Command::Resolve(args) => resolve(args).await,
    }
}

fn init_tracing(verbose: u8) -> Result<()> {
    let filter = if std::env::var_os("RUST_LOG").is_some() {
        EnvFilter::try_from_default_env().into_diagnostic()?
    } else {
        let level = match verbose {
            0 => "error",
            1 => "warn",
            2 => "info",
            3 => "debug",
            _ => "trace",
        };
        EnvFilter::new(format!("error,ensemble={level}"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_fmt::layer().with_writer(std::io::stderr))
        .with(ErrorLayer::default())
        .init();

    Ok(())
}

fn compile_inputs(
    inputs: &[PathBuf],
    env: &EnvironmentArgs,
    policy: &PolicyArgs,
) -> Result<CompileOutput> {
    let manifests = load_manifests(inputs)?;
    let options = CompileOptions::builder()
        .environment(env.environment.clone())
        .producer_policy(policy.producer_policy)
        .build();
    let output = Compiler::new(options)
        .compile(&manifests)
        .wrap_err("compile failed")?;
    Ok(output)
}

fn compile(args: CompileArgs) -> Result<()> {
    let output = compile_inputs(&args.inputs, &args.env, &args.policy)?;

    if let Some(path) = &args.json {
        let report = JsonReporter.emit(&output)?;
        fs::write(path, report)
            .into_diagnostic()
            .wrap_err_with(|| format!("failed to write report to `{}`", path.display()))?;
    }

    match args.emit {
        EmitKind::Text => print!("{}", TextReporter.emit(&output)?),
        EmitKind::Json => print!("{}", JsonReporter.emit(&output)?),
        EmitKind::Dot => print!("{}", DotReporter.emit(&output)?),
        EmitKind::Order => {
            for node in &output.order {
                println!("{node}");
            }
        }
        EmitKind::Plan => {
            for command in PlanReporter::new(args.command).emit(&output)? {
                println!("{command}");
            }
        }
    }
    Ok(())
}

fn check(args: CheckArgs) -> Result<()> {
    let output = compile_inputs(&args.inputs, &args.env, &args.policy)?;
    eprintln!(
        "ok: {} instance(s) across {} node(s)",
        output.instances.len(),
        output.graph.len()
    );
    Ok(())
}

async fn lookup(args: LookupArgs) -> Result<()> {
    let registry = args.registry.registry(Registry::new());
    if registry.is_empty() {
        return Err(miette::miette!("no registry configured; pass --registry"));
    }

    let value = registry
        .find(&args.env.environment, &args.capability)
        .await
        .wrap_err_with(|| format!("lookup of {} failed", args.capability))?
        .ok_or_else(|| {
            miette::miette!(
                "{} is not produced in environment `{}`",
                args.capability,
                args.env.environment
            )
        })?;

    println!("{}", serde_json::to_string_pretty(&value).into_diagnostic()?);
    Ok(())
}

async fn resolve(args: ResolveArgs) -> Result<()> {
    let manifests = load_manifests(&args.inputs)?;
    let environment = args.env.environment.as_str();
    let options = CompileOptions::builder()
        .environment(environment)
        .producer_policy(args.policy.producer_policy)
        .build();
    // No node graph here: producers may live in a separately compiled environment.
    let instances = Compiler::new(options)
        .instantiate(&manifests)
        .wrap_err("compile failed")?;

    // Capabilities produced by these manifests answer first, the configured registries after.
    let compiled = MemoryBackend::from_instances(environment, &instances);
    let registry = args
        .registry
        .registry(Registry::new().with_backend("compiled", Arc::new(compiled)));

    let mut catalog = NodeCatalog::new(args.node.as_str(), environment);
    let mut found = false;
    for instance in instances_on(&instances, &args.node) {
        found = true;
        catalog.add_instance(&registry, instance).await?;
    }
    if !found {
        return Err(miette::miette!(
            "node `{}` hosts no components in environment `{environment}`",
            args.node
        ));
    }

    println!("{}", serde_json::to_string_pretty(&catalog).into_diagnostic()?);
    Ok(())
}

/// Recursively collect `*.json5` files under `inputs`, each directory in sorted order, and parse
/// them.
fn load_manifests(inputs: &[PathBuf]) -> Result<Vec<Manifest>> {
    let mut paths = Vec::new();
    for input in inputs {
        if input.is_dir() {
            collect_manifests(input, &mut paths)?;
        } else {
            paths.push(input.clone());
        }
    }

    paths
        .iter()
        .map(|path| {
            tracing::debug!(path = %path.display(), "loading manifest");
            let source = fs::read_to_string(path)
                .into_diagnostic()
                .wrap_err_with(|| format!("failed to read `{}`", path.display()))?;
            Manifest::parse_named(path.display().to_string(), source)
                .wrap_err_with(|| format!("failed to parse `{}`", path.display()))
        })
        .collect()
}

fn collect_manifests(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    let mut entries = fs::read_dir(dir)
        .into_diagnostic()
        .wrap_err_with(|| format!("failed to read directory `{}`", dir.display()))?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<Vec<_>>>()
        .into_diagnostic()?;
    entries.sort();

    for path in entries {
        if path.is_dir() {
            collect_manifests(&path, out)?;
        } else if path.extension().and_then(|ext| ext.to_str()) == Some("json5") {
            out.push(path);
        }
    }
    Ok(())
}
