// src/lib.rs

//! formulary: build and install command-line tools from declarative formulas
//!
//! A formula pins a release archive by digest (or names a head branch), says
//! how to build one binary from it, which shell completion scripts to derive
//! from the installed binary, and how to smoke-test the result.
//!
//! # Architecture
//!
//! - Formulas: immutable TOML records, loaded into a `FormulaRepository`
//! - Kitchen: runs the fetch, verify, build, install and post-verify stages
//!   in order, stopping at the first failure
//! - Runner: every external command goes through `CommandRunner`
//! - Layout: destination directories for binaries and completions

pub mod config;
mod error;
pub mod formula;
pub mod hash;
pub mod kitchen;
pub mod layout;
pub mod runner;

pub use config::FormularyConfig;
pub use error::{
    CompletionFailure, Error, InstallError, Result, SmokeFailure, VerificationError,
};
pub use formula::{
    BuildMode, FormulaRecord, FormulaRepository, ShellKind, parse_formula, parse_formula_file,
    validate_formula,
};
pub use hash::{Hash, HashAlgorithm, Hasher, hash_file};
pub use kitchen::{InstallReport, Kitchen, KitchenConfig, PipelineState, Stage};
pub use layout::InstallLayout;
pub use runner::{CancelToken, CommandRunner, CommandSpec, ExitState, SystemRunner};
