//! Tinker file formats and program output

pub mod keyfile;
pub mod output;
pub mod params;
pub mod xyz;

pub use keyfile::KeyFile;
pub use output::{menu_option, total_charge};
pub use params::{ion_description, ParameterFile};
pub use xyz::{read_atoms, solute_selection, Atom};

/// `xyzedit` menu labels
pub mod menu {
    pub const ALIGN: &str = "Translate and Rotate to Inertial Frame";
    pub const REPLACE_TYPE: &str = "Replace Old Atom Type with a New Type";
    pub const TRIM_BOX: &str = "Trim a Periodic Box to a Smaller Size";
    pub const SOAK: &str = "Soak Current Molecule in Box of Solvent";
    pub const PLACE_IONS: &str = "Place Monoatomic Ions around a Solute";
}

/// Parameter-file descriptions of the water atoms
pub const WATER_OXYGEN: &str = "Water O";
pub const WATER_HYDROGEN: &str = "Water H";
