use std::fmt;

use serde::{Deserialize, Serialize};

/// Script languages the generator asks the model to write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dialect {
    /// OpenSCAD solid-modeling script, convertible to a mesh.
    OpenScad,
    /// CATIA V5 macro (VBScript flavour).
    CatScript,
}

/// Marker order shared by the dual-dialect prompt and the reply parser.
pub const DUAL_DIALECT_MARKERS: [Dialect; 2] = [Dialect::OpenScad, Dialect::CatScript];

impl Dialect {
    /// Literal line that introduces this dialect's code in a model reply.
    pub fn marker(self) -> &'static str {
        match self {
            Dialect::OpenScad => "SCAD:",
            Dialect::CatScript => "CATScript:",
        }
    }

    pub fn file_extension(self) -> &'static str {
        match self {
            Dialect::OpenScad => "scad",
            Dialect::CatScript => "CATScript",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Dialect::OpenScad => "OpenSCAD",
            Dialect::CatScript => "CATScript",
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}
