//! Atom type and charge lookup in a Tinker parameter file

use std::fs;
use std::io;
use std::path::Path;

/// The `atom` and `multipole` records of a parameter file
#[derive(Debug, Clone, Default)]
pub struct ParameterFile {
    atoms: Vec<String>,
    multipoles: Vec<Vec<String>>,
}

impl ParameterFile {
    pub fn load(path: &Path) -> io::Result<Self> {
        Ok(Self::parse(&fs::read_to_string(path)?))
    }

    pub fn parse(text: &str) -> Self {
        let mut params = Self::default();
        for line in text.lines().map(str::trim) {
            if line.starts_with("atom") {
                params.atoms.push(line.to_string());
            } else if line.starts_with("multipole") {
                params
                    .multipoles
                    .push(line.split_whitespace().map(str::to_string).collect());
            }
        }
        params
    }

    /// Type number of the first atom record whose text contains `description`
    ///
    /// ```text
    /// atom    352  352  Na+   "Sodium Ion Na+"  11  22.990  0
    /// ```
    pub fn find_atom_type(&self, description: &str) -> Option<String> {
        self.atoms.iter().find_map(|line| {
            let parts: Vec<&str> = line.split_whitespace().collect();
            (parts.len() >= 4 && line.contains(description)).then(|| parts[1].to_string())
        })
    }

    /// Monopole charge of an atom type, taken from its first multipole record
    pub fn find_atom_charge(&self, atom_type: &str) -> Option<f64> {
        self.multipoles
            .iter()
            .find(|parts| parts.get(1).map(String::as_str) == Some(atom_type))
            .and_then(|parts| parts.last())
            .and_then(|charge| charge.parse().ok())
    }
}

/// Parameter-file description of an ion name (`Na+` → `Ion Na`, `Mg2+` → `Ion Mg`)
pub fn ion_description(name: &str) -> String {
    let stem = name.trim_matches(|c| matches!(c, '+' | '-' | '1' | '2' | '3'));
    let mut chars = stem.chars();
    let capitalized: String = match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    };
    format!("Ion {capitalized}")
}
