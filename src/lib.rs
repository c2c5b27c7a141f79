//! MADX → Bmad lattice translator.
//!
//! The pipeline: an input-source stack feeds the command assembler, whose
//! statements are classified and dispatched into element, sequence, and
//! expression rewriting; buffered output is finalized with a provenance
//! header and hoisted variable assignments.

pub mod command;
pub mod diagnostic;
pub mod dispatch;
pub mod element;
pub mod emit;
pub mod expr;
pub mod lexeme;
pub mod reader;
pub mod scan;
pub mod sequence;
pub mod tables;

pub use dispatch::{Options, Translator};

/// Derive the Bmad output name from the MADX input name: "madx" in any of
/// its common spellings becomes "bmad", else ".bmad" is appended.
pub fn bmad_file_name(madx_file: &str) -> String {
    for pattern in ["madx", "Madx", "MADX"] {
        if madx_file.contains(pattern) {
            return madx_file.replace(pattern, "bmad");
        }
    }
    format!("{}.bmad", madx_file)
}

/// Translate in-memory MADX source and return the finalized root output.
pub fn translate_string(source: &str, opts: Options) -> String {
    let mut translator = Translator::from_string("lattice.madx", source, opts);
    translator.run();
    translator
        .finish()
        .into_iter()
        .next()
        .map(|(_, contents)| contents)
        .unwrap_or_default()
}
