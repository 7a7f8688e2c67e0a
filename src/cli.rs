//! Command-line surface
//!
//! Fixed flags are declared with clap's derive API. One additional flag per
//! schema field is generated at runtime: the canonical name is the dotted
//! path with `.` replaced by `-` (`--box-size`), and the dotted form is
//! accepted as an alias (`--box.size`). List fields take one or more values.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::PathBuf;

use clap::error::ErrorKind;
use clap::{Arg, ArgAction, ArgMatches, Command, CommandFactory, FromArgMatches, Parser};
use prep_config::{ConfigNode, FieldPath, FieldSpec, FieldType, Scalar, ScalarKind, Schema};
use thiserror::Error;

/// Fixed flags
#[derive(Parser, Debug, Clone, PartialEq)]
#[command(name = "tinker-prep")]
#[command(about = "Prepare solvated, neutralized MD systems with the Tinker toolchain", version)]
pub struct Cli {
    /// Override document to read and rewrite (default: <work-dir>/config.yaml)
    #[arg(long, short = 'c', value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Replacement defaults document (default: built-in)
    #[arg(long, value_name = "PATH")]
    pub defaults: Option<PathBuf>,

    /// Write a defaults-only template to sample_config.yaml and exit
    #[arg(long = "generate-yaml-template")]
    pub generate_yaml_template: bool,

    /// Working area for intermediate files
    #[arg(long = "work-dir", value_name = "DIR", default_value = "temp")]
    pub work_dir: PathBuf,

    /// Directory receiving the final structure and key files
    #[arg(long = "output-dir", value_name = "DIR", default_value = ".")]
    pub output_dir: PathBuf,

    /// Resolve and validate the configuration, print it, and exit
    #[arg(long = "dry-run")]
    pub dry_run: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(long, short = 'v', action = ArgAction::Count)]
    pub verbose: u8,

    /// Only report errors
    #[arg(long, short = 'q', conflicts_with = "verbose")]
    pub quiet: bool,

    /// Also write logs to this file
    #[arg(long = "log-file", value_name = "PATH")]
    pub log_file: Option<PathBuf>,
}

/// Long names owned by the fixed flags
const RESERVED: &[&str] = &[
    "config",
    "defaults",
    "generate-yaml-template",
    "work-dir",
    "output-dir",
    "dry-run",
    "verbose",
    "quiet",
    "log-file",
    "help",
    "version",
];

/// Command-line errors
#[derive(Debug, Error)]
pub enum CliError {
    #[error("field '{path}' maps to --{flag}, which is reserved")]
    ReservedFlag { path: FieldPath, flag: String },

    #[error(transparent)]
    Parse(#[from] clap::Error),

    #[error("cannot place command-line value for '{path}': {reason}")]
    Placement { path: FieldPath, reason: String },
}

impl CliError {
    /// True when the error names a flag that no field or fixed flag declares
    pub fn is_unknown_flag(&self) -> bool {
        matches!(self, CliError::Parse(e) if e.kind() == ErrorKind::UnknownArgument)
    }

    /// True for `--help` and `--version`, which clap reports as errors
    pub fn is_informational(&self) -> bool {
        matches!(
            self,
            CliError::Parse(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion)
        )
    }
}

/// Parsed command line: fixed flags plus the sparse field tier
#[derive(Debug, Clone)]
pub struct ParsedArgs {
    pub cli: Cli,
    pub fields: ConfigNode,
}

/// Maps schema fields to command-line flags and back
#[derive(Debug, Clone)]
pub struct ArgumentMapper {
    /// Flag name (without dashes) to field spec
    flags: BTreeMap<String, FieldSpec>,
}

impl ArgumentMapper {
    pub fn new(schema: &Schema) -> Result<Self, CliError> {
        let mut flags = BTreeMap::new();
        for spec in schema.fields() {
            let flag = spec.path.flag_name();
            if RESERVED.contains(&flag.as_str()) {
                return Err(CliError::ReservedFlag {
                    path: spec.path.clone(),
                    flag,
                });
            }
            flags.insert(flag, spec.clone());
        }
        Ok(Self { flags })
    }

    /// Field addressed by a flag name, with or without leading dashes
    pub fn field_for_flag(&self, flag: &str) -> Option<&FieldPath> {
        let name = flag.trim_start_matches('-');
        if let Some(spec) = self.flags.get(name) {
            return Some(&spec.path);
        }
        // Dotted alias
        let path = FieldPath::parse(name).ok()?;
        self.flags.get(&path.flag_name()).map(|spec| &spec.path)
    }

    /// Canonical flag for a field, e.g. `--ions-salts-names`
    pub fn flag_for_field(&self, path: &FieldPath) -> Option<String> {
        let flag = path.flag_name();
        self.flags.contains_key(&flag).then(|| format!("--{}", flag))
    }

    /// The full clap command: fixed flags followed by one flag per field
    pub fn command(&self) -> Command {
        let mut command = Cli::command().next_help_heading("Configuration fields");
        for (flag, spec) in &self.flags {
            command = command.arg(field_arg(flag, spec));
        }
        command
    }

    /// Parse the process arguments (including the program name)
    pub fn parse<I, T>(&self, args: I) -> Result<ParsedArgs, CliError>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let matches = self.command().try_get_matches_from(args)?;
        let cli = Cli::from_arg_matches(&matches)?;
        let fields = self.extract(&matches)?;
        Ok(ParsedArgs { cli, fields })
    }

    /// Sparse tree holding only the fields given on the command line
    fn extract(&self, matches: &ArgMatches) -> Result<ConfigNode, CliError> {
        let mut node = ConfigNode::empty();
        for spec in self.flags.values() {
            let id = spec.path.dotted();
            let Some(raw) = matches.get_many::<String>(&id) else {
                continue;
            };
            let kind = spec.ty.element_kind();
            let value = match spec.ty {
                FieldType::List(_) => {
                    ConfigNode::List(raw.map(|s| parse_scalar(kind, s)).collect())
                }
                FieldType::Scalar(_) => match raw.last() {
                    Some(s) => ConfigNode::Scalar(parse_scalar(kind, s)),
                    None => continue,
                },
            };
            node.set(&spec.path, value)
                .map_err(|e| CliError::Placement {
                    path: spec.path.clone(),
                    reason: e.to_string(),
                })?;
        }
        Ok(node)
    }
}

fn field_arg(flag: &str, spec: &FieldSpec) -> Arg {
    let dotted = spec.path.dotted();
    let kind = spec.ty.element_kind();
    let mut help = spec.help.clone().unwrap_or_default();
    if !help.is_empty() {
        help.push(' ');
    }
    help.push_str(&format!("[default: {}]", spec.default));

    let mut arg = Arg::new(dotted.clone())
        .long(flag.to_string())
        .value_name(value_name(kind))
        .help(help)
        .value_parser(clap::value_parser!(String))
        .action(ArgAction::Set);
    if dotted != flag {
        arg = arg.alias(dotted);
    }
    if matches!(kind, ScalarKind::Int | ScalarKind::Float) {
        arg = arg.allow_negative_numbers(true);
    }
    if spec.ty.is_list() {
        arg = arg.num_args(1..);
    }
    arg
}

fn value_name(kind: ScalarKind) -> &'static str {
    match kind {
        ScalarKind::Bool => "BOOL",
        ScalarKind::Int => "INT",
        ScalarKind::Float => "NUM",
        ScalarKind::Str => "VALUE",
    }
}

/// Interpret a raw flag value as the field's kind
///
/// Values that do not parse stay strings so the validator reports them with
/// the field path alongside every other violation.
fn parse_scalar(kind: ScalarKind, raw: &str) -> Scalar {
    let parsed = match kind {
        ScalarKind::Bool => match raw.to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" => Some(Scalar::Bool(true)),
            "false" | "no" | "off" => Some(Scalar::Bool(false)),
            _ => None,
        },
        ScalarKind::Int => raw.parse::<i64>().ok().map(Scalar::Int),
        ScalarKind::Float => raw.parse::<f64>().ok().map(Scalar::Float),
        ScalarKind::Str => None,
    };
    parsed.unwrap_or_else(|| Scalar::Str(raw.to_string()))
}

/// Find `--defaults PATH` before the schema (and so the full parser) exists
pub fn prescan_defaults<I, T>(args: I) -> Option<PathBuf>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    let mut iter = args.into_iter().map(Into::into).skip(1);
    while let Some(arg) = iter.next() {
        let Some(text) = arg.to_str() else {
            continue;
        };
        if text == "--" {
            break;
        }
        if text == "--defaults" {
            return iter.next().map(PathBuf::from);
        }
        if let Some(value) = text.strip_prefix("--defaults=") {
            return Some(PathBuf::from(value));
        }
    }
    None
}
