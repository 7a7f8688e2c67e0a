//! Built-in preparation schema
//!
//! The defaults document is embedded in the binary; constraints and help
//! text are attached here so the same rules apply whether the document comes
//! from the binary or from `--defaults`.

use std::path::Path;

use prep_config::{ConfigError, Constraint, FieldPath, Schema};

/// Embedded defaults document
pub const DEFAULTS_YAML: &str = include_str!("defaults.yaml");

/// Origin label used for the embedded document in messages
pub const BUILTIN_ORIGIN: &str = "(built-in defaults)";

/// Allowed solvents
pub const SOLVENTS: &[&str] = &["water"];

/// Allowed periodic box shapes
pub const BOX_TYPES: &[&str] = &["cuboid"];

const HELP: &[(&str, &str)] = &[
    ("tinker_path", "Directory holding the Tinker executables"),
    ("amoeba_prm", "Path to the AMOEBA force-field parameter file"),
    ("output_prefix", "File name stem for generated structure and key files"),
    (
        "timeout_seconds",
        "Per-invocation timeout for Tinker programs in seconds (0 disables)",
    ),
    ("solutes.protein", "Protein PDB files"),
    ("solutes.nucleic_acid", "Nucleic acid PDB files"),
    ("solvent.name", "Solvent name"),
    ("solvent.box_file", "Pre-equilibrated solvent box in Tinker XYZ format"),
    ("ions.neutralizers", "Candidate counter-ions for neutralizing the system"),
    ("ions.salts.names", "Salt ions to add"),
    (
        "ions.salts.concentrations",
        "Concentrations of the salt ions in mol/L, one per name",
    ),
    ("box.type", "Periodic box shape"),
    ("box.size", "Edge length of the periodic box in Å"),
];

/// Schema from the embedded defaults document
pub fn builtin_schema() -> Result<Schema, ConfigError> {
    preparation_rules(Schema::from_yaml_str(DEFAULTS_YAML, BUILTIN_ORIGIN)?)
}

/// Schema from a user-supplied defaults document
pub fn schema_from_file(path: &Path) -> Result<Schema, ConfigError> {
    preparation_rules(Schema::load(path)?)
}

/// Attach constraints and help text for the fields this tool reads
///
/// A replacement defaults document must still declare these fields; rules
/// for a field it lacks surface as a schema error naming that field.
pub fn preparation_rules(schema: Schema) -> Result<Schema, ConfigError> {
    let one_of = |values: &[&str]| Constraint::OneOf(values.iter().map(|s| s.to_string()).collect());
    let concentrations = FieldPath::parse("ions.salts.concentrations").map_err(|e| {
        ConfigError::SchemaLoad {
            origin: BUILTIN_ORIGIN.to_string(),
            reason: e.to_string(),
        }
    })?;

    let mut schema = schema
        .constrain("tinker_path", Constraint::PathLike)?
        .constrain("amoeba_prm", Constraint::PathLike)?
        .constrain("output_prefix", Constraint::FileStem)?
        .constrain("timeout_seconds", Constraint::NonNegative)?
        .constrain("solutes.protein", Constraint::PathLike)?
        .constrain("solutes.nucleic_acid", Constraint::PathLike)?
        .constrain("solvent.name", one_of(SOLVENTS))?
        .constrain("solvent.box_file", Constraint::PathLike)?
        .constrain("ions.salts.concentrations", Constraint::NonNegative)?
        .constrain("ions.salts.names", Constraint::SameLength(concentrations))?
        .constrain("box.type", one_of(BOX_TYPES))?
        .constrain("box.size", Constraint::Positive)?;

    for (path, help) in HELP {
        schema = schema.describe(path, help)?;
    }
    Ok(schema)
}
