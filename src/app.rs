//! Command entry point
//!
//! Resolves the configuration, then either writes the template, prints the
//! resolved configuration (`--dry-run`), or runs the preparation pipeline.
//! Every outcome maps to a stable [`ExitCode`].

use std::ffi::OsString;
use std::fmt;
use std::path::Path;

use prep_config::{write_new_document, ConfigError, ConfigNode, OverrideDocument, Schema};
use tracing::{debug, error, warn};

use crate::cli::{prescan_defaults, ArgumentMapper, CliError, ParsedArgs};
use crate::config::{
    builtin_schema, schema_from_file, EffectiveConfig, PrepSettings, OVERRIDE_FILE_NAME,
    TEMPLATE_FILE_NAME,
};
use crate::lock::{LockError, WorkDirLock};
use crate::logging;
use crate::pipeline::{resolve_path, Orchestrator, RunLayout};
use crate::signal::SignalHandler;
use crate::summary::{ExitCode, FailureKind};
use crate::timeout::TimeoutConfig;
use crate::toolchain::ProcessToolchain;

/// Run the command with `args` (program name first) from directory `cwd`
pub fn run<I, T>(args: I, cwd: &Path) -> ExitCode
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let args: Vec<OsString> = args.into_iter().map(Into::into).collect();

    let schema = match load_schema(&args, cwd) {
        Ok(schema) => schema,
        Err(e) => return config_failure(&e),
    };

    let parsed = ArgumentMapper::new(&schema).and_then(|mapper| mapper.parse(args.iter().cloned()));
    let ParsedArgs { cli, fields } = match parsed {
        Ok(parsed) => parsed,
        Err(e) => return cli_failure(&e),
    };

    let log_file = cli.log_file.as_deref().map(|p| resolve_path(cwd, p));
    let _log_guard = match logging::init(cli.verbose, cli.quiet, log_file.as_deref()) {
        Ok(guard) => guard,
        Err(e) => return fail(FailureKind::Usage, &e),
    };

    if cli.generate_yaml_template {
        return write_template(&schema, &cwd.join(TEMPLATE_FILE_NAME));
    }

    let work_dir = resolve_path(cwd, &cli.work_dir);
    let override_path = cli
        .config
        .as_deref()
        .map(|p| resolve_path(cwd, p))
        .unwrap_or_else(|| work_dir.join(OVERRIDE_FILE_NAME));

    let (effective, settings) = match resolve(&schema, &override_path, &fields) {
        Ok(resolved) => resolved,
        Err(e) => return config_failure(&e),
    };

    if cli.dry_run {
        match effective.to_yaml() {
            Ok(text) => print!("{text}"),
            Err(e) => return config_failure(&e),
        }
        println!("# provenance");
        for line in effective.provenance_report().lines() {
            println!("#   {line}");
        }
        return ExitCode::Success;
    }

    let output_dir = resolve_path(cwd, &cli.output_dir);
    let locks = WorkDirLock::acquire(&work_dir).and_then(|work_lock| {
        WorkDirLock::acquire_output(&output_dir, &settings.output_prefix)
            .map(|output_lock| (work_lock, output_lock))
    });
    let _locks = match locks {
        Ok(locks) => locks,
        Err(e @ LockError::Busy { .. }) => return fail(FailureKind::WorkDirBusy, &e),
        Err(e @ LockError::Io { .. }) => return fail(FailureKind::Preflight, &e),
    };

    // The run continues on the in-memory configuration if the record cannot be written
    if let Err(e) = effective.persist(&override_path) {
        error!("{}", e);
        eprintln!("warning: {e}; continuing with the resolved configuration");
    }

    let handler = SignalHandler::new();
    if let Err(e) = handler.install() {
        warn!("Cannot install interrupt handler: {}", e);
    }

    let toolchain = ProcessToolchain::new(resolve_path(cwd, &settings.tinker_path))
        .with_timeout(TimeoutConfig::from_seconds(settings.timeout_seconds))
        .with_signal_state(handler.state());
    let layout = RunLayout::new(cwd, &cli.work_dir, &cli.output_dir);
    let orchestrator =
        Orchestrator::new(settings, layout, toolchain).with_signal_state(handler.state());
    debug!("Run directory {}", orchestrator.run_dir().display());

    match orchestrator.run() {
        Ok(outcome) => {
            println!("{}", outcome.final_structure.display());
            println!("{}", outcome.final_key.display());
            ExitCode::Success
        }
        Err(e) => fail(e.failure_kind(), &e),
    }
}

fn load_schema(args: &[OsString], cwd: &Path) -> Result<Schema, ConfigError> {
    match prescan_defaults(args.iter().cloned()) {
        Some(path) => schema_from_file(&resolve_path(cwd, &path)),
        None => builtin_schema(),
    }
}

fn resolve(
    schema: &Schema,
    override_path: &Path,
    cli: &ConfigNode,
) -> Result<(EffectiveConfig, PrepSettings), ConfigError> {
    let overrides = OverrideDocument::load(override_path)?;
    let effective = EffectiveConfig::build(schema, &overrides, cli)?;
    let settings = effective.settings()?;
    Ok((effective, settings))
}

/// Write the defaults document without merging or running anything
fn write_template(schema: &Schema, path: &Path) -> ExitCode {
    match write_new_document(schema.defaults(), path) {
        Ok(()) => {
            println!("Template written to {}", path.display());
            ExitCode::Success
        }
        Err(e) => config_failure(&e),
    }
}

/// Report `err` on stderr and map it to its exit code
fn fail(kind: FailureKind, err: &dyn fmt::Display) -> ExitCode {
    eprintln!("{}", failure_message(kind, err));
    kind.exit_code()
}

fn failure_message(kind: FailureKind, err: &dyn fmt::Display) -> String {
    format!("error: {}: {}", kind.description(), err)
}

fn config_failure(e: &ConfigError) -> ExitCode {
    fail(FailureKind::from(e), e)
}

fn cli_failure(e: &CliError) -> ExitCode {
    if let CliError::Parse(clap_error) = e {
        // clap formats its own usage, help and version output
        let _ = clap_error.print();
        return if e.is_informational() {
            ExitCode::Success
        } else if e.is_unknown_flag() {
            FailureKind::UnknownField.exit_code()
        } else {
            FailureKind::Usage.exit_code()
        };
    }
    match e {
        CliError::ReservedFlag { .. } => fail(FailureKind::SchemaLoad, e),
        _ => fail(FailureKind::Usage, e),
    }
}
