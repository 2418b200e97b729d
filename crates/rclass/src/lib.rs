//! R-Droid R Classes
//!
//! Produces the bytecode of a package's `R` class and its nested
//! `R$<type>` classes in memory, so a preview class loader can define them
//! without running the Android build:
//! - Class file encoding and decoding
//! - Per-package class synthesis from a layered repository
//! - The registry answering class lookups by binary name

pub mod class_file;
pub mod inspect;
pub mod registry;
pub mod synthesizer;

pub use class_file::SynthesisError;
pub use inspect::{ClassFormatError, ClassSummary, FieldSummary};
pub use registry::{BinaryClassProvider, ClassRegistry, RegistrationState};
pub use synthesizer::RClassGenerator;
