// src/formula/mod.rs

//! Formula records: declarative descriptions of one installable tool
//!
//! A formula says where the source lives and how it is pinned, how to invoke
//! the build, which completion scripts to derive from the installed binary,
//! and how to smoke-test the result. It carries no behavior of its own.
//!
//! # Example Formula
//!
//! ```toml
//! completions = ["bash", "zsh", "fish"]
//!
//! [formula]
//! name = "gwt"
//! license = "MIT"
//!
//! [source]
//! url = "https://github.com/TinsFox/gwt/archive/v1.0.0.tar.gz"
//! checksum = "sha256:b48e46f0..."
//!
//! [head]
//! url = "https://github.com/TinsFox/gwt.git"
//! branch = "main"
//!
//! [[dependencies]]
//! name = "go"
//! stage = "build"
//!
//! [build]
//! command = ["go", "build", "-trimpath", "-o", "%(output)s", "-ldflags", "%(ldflags)s"]
//!
//! [[test]]
//! args = ["--version"]
//! expect = "gwt version"
//! ```

mod format;
mod parser;
mod repository;

pub use format::{
    BuildMode, BuildSection, CompletionEntry, Dependency, DependencyStage, FormulaRecord,
    FormulaSection, HeadSection, ResolvedSource, ShellKind, SmokeTest, SourceSection,
    infer_version_from_url,
};
pub use parser::{parse_formula, parse_formula_file, validate_formula};
pub use repository::FormulaRepository;
