//! Build coordination and incremental rebuild engine for kiln.
//!
//! [`BuildCoordinator`] is the entry point: hosts hand it a source file and
//! get back compiled output whose module references have been rewritten. It
//! runs at most one full compile per generation, fans the result out to
//! every request that waited on it, and routes later requests through the
//! analysis server when incremental rebuilds are enabled.

mod bundle;
mod cache;
mod compiler;
mod coordinator;
mod error;
mod module_index;
mod output;

pub use bundle::bundle_args;
pub use compiler::compile_args;
pub use coordinator::{BuildCoordinator, Messages};
pub use error::{BuildError, IndexError};
pub use module_index::{ModuleIndex, module_name};
pub use output::rewrite_references;
