//! Tinker XYZ structure files
//!
//! Line 1 holds the atom count and a title. Periodic structures carry the
//! box dimensions on line 2. Every atom line reads
//! `index name x y z type [bonded...]`.

use std::fs;
use std::io;
use std::path::Path;

/// One atom line: serial number and force-field atom type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Atom {
    pub index: usize,
    pub atom_type: String,
}

/// Atom count from the header line of a Tinker XYZ file
pub fn parse_atom_count(text: &str) -> Option<usize> {
    text.lines().next()?.split_whitespace().next()?.parse().ok()
}

/// Atom lines of a Tinker XYZ file; None when the file is malformed
pub fn parse_atoms(text: &str) -> Option<Vec<Atom>> {
    let count = parse_atom_count(text)?;
    let mut lines = text.lines().skip(1).peekable();

    // A box line has a decimal where an atom line has its name
    let has_box = lines
        .peek()
        .and_then(|line| line.split_whitespace().nth(1))
        .is_some_and(|token| token.contains('.'));
    if has_box {
        lines.next();
    }

    let atoms: Vec<Atom> = lines
        .filter(|line| !line.trim().is_empty())
        .take(count)
        .map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            Some(Atom {
                index: fields.first()?.parse().ok()?,
                atom_type: fields.get(5)?.to_string(),
            })
        })
        .collect::<Option<_>>()?;
    (atoms.len() == count).then_some(atoms)
}

pub fn read_atoms(path: &Path) -> io::Result<Vec<Atom>> {
    let text = fs::read_to_string(path)?;
    parse_atoms(&text).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("{} is not a Tinker XYZ file", path.display()),
        )
    })
}

/// `xyzedit` atom selection of every atom that is not solvent
///
/// Consecutive runs are written as `-first,last`, lone atoms as their index.
/// Ions placed earlier count as solute. None when only solvent remains.
pub fn solute_selection(atoms: &[Atom], solvent_types: &[String]) -> Option<String> {
    let mut indices: Vec<usize> = atoms
        .iter()
        .filter(|atom| !solvent_types.contains(&atom.atom_type))
        .map(|atom| atom.index)
        .collect();
    indices.sort_unstable();

    let mut ranges: Vec<(usize, usize)> = Vec::new();
    for index in indices {
        match ranges.last_mut() {
            Some((_, last)) if index <= *last + 1 => *last = index,
            _ => ranges.push((index, index)),
        }
    }
    if ranges.is_empty() {
        return None;
    }

    let parts: Vec<String> = ranges
        .into_iter()
        .map(|(first, last)| {
            if first == last {
                first.to_string()
            } else {
                format!("-{first},{last}")
            }
        })
        .collect();
    Some(parts.join(","))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOLVATED: &str = "\
     8  Crambin
    30.000000   30.000000   30.000000   90.000000   90.000000   90.000000
     1  N3    16.967  12.784   4.338   207     2
     2  CT    15.685  12.755   5.133   8       1     3
     3  C     15.268  14.155   5.594   9       2
     4  O     14.103  14.155   5.941   10      3
     5  O      1.000   1.000   1.000   349     6     7
     6  H      1.500   1.000   1.000   350     5
     7  H      1.000   1.500   1.000   350     5
     8  Na+    4.000   4.000   4.000   352
";

    fn water() -> Vec<String> {
        vec!["349".to_string(), "350".to_string()]
    }

    #[test]
    fn test_parse_atom_count() {
        assert_eq!(parse_atom_count(SOLVATED), Some(8));
        assert_eq!(parse_atom_count("3\n"), Some(3));
        assert_eq!(parse_atom_count(""), None);
        assert_eq!(parse_atom_count("Crambin\n"), None);
    }

    #[test]
    fn test_parse_atoms_skips_box_line() {
        let atoms = parse_atoms(SOLVATED).unwrap();
        assert_eq!(atoms.len(), 8);
        assert_eq!(atoms[0], Atom { index: 1, atom_type: "207".to_string() });
        assert_eq!(atoms[7].atom_type, "352");
    }

    #[test]
    fn test_parse_atoms_without_box_line() {
        let text = "2  pair\n 1  O  0.0 0.0 0.0  349  2\n 2  H  0.9 0.0 0.0  350  1\n";
        let atoms = parse_atoms(text).unwrap();
        assert_eq!(atoms[1], Atom { index: 2, atom_type: "350".to_string() });
    }

    #[test]
    fn test_parse_atoms_rejects_short_file() {
        assert_eq!(parse_atoms("3  short\n 1  O  0.0 0.0 0.0  349\n"), None);
        assert_eq!(parse_atoms("title only\n"), None);
    }

    #[test]
    fn test_selection_includes_placed_ions() {
        let atoms = parse_atoms(SOLVATED).unwrap();
        assert_eq!(solute_selection(&atoms, &water()).as_deref(), Some("-1,4,8"));
    }

    #[test]
    fn test_selection_of_solvent_only() {
        let text = "1  water\n 1  O  0.0 0.0 0.0  349\n";
        let atoms = parse_atoms(text).unwrap();
        assert_eq!(solute_selection(&atoms, &water()), None);
    }

    #[test]
    fn test_read_atoms_reports_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("bad.xyz");
        fs::write(&path, "title only\n").unwrap();

        let err = read_atoms(&path).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        assert!(err.to_string().contains("bad.xyz"));
    }
}
