// src/formula/repository.rs

//! A set of formula records keyed by tool name
//!
//! The pipeline never branches on which formula it runs; distributions of
//! the same tool under different names are simply separate records.

use crate::error::{Error, Result};
use crate::formula::format::FormulaRecord;
use crate::formula::parser::{parse_formula, parse_formula_file, validate_formula};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

/// Formulas shipped with formulary
const BUILTIN_FORMULAS: &[(&str, &str)] = &[
    ("gwt.toml", include_str!("../../formulas/gwt.toml")),
    (
        "git-worktree-cli.toml",
        include_str!("../../formulas/git-worktree-cli.toml"),
    ),
];

/// Collection of validated formula records
#[derive(Debug, Default, Clone)]
pub struct FormulaRepository {
    formulas: BTreeMap<String, FormulaRecord>,
}

impl FormulaRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Repository holding the built-in formulas
    pub fn builtin() -> Result<Self> {
        let mut repo = Self::new();
        for (file, content) in BUILTIN_FORMULAS {
            let formula = parse_formula(content)
                .map_err(|e| Error::Parse(format!("built-in formula {}: {}", file, e)))?;
            repo.insert(formula)?;
        }
        Ok(repo)
    }

    /// Load every `*.toml` file in a directory
    pub fn load_dir(dir: &Path) -> Result<Self> {
        let mut repo = Self::new();
        repo.extend_from_dir(dir)?;
        Ok(repo)
    }

    /// Add every `*.toml` file in a directory to this repository
    pub fn extend_from_dir(&mut self, dir: &Path) -> Result<usize> {
        let mut paths: Vec<_> = fs::read_dir(dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "toml"))
            .collect();
        paths.sort();

        for path in &paths {
            debug!("Loading formula {}", path.display());
            let formula = parse_formula_file(path)?;
            self.insert(formula)?;
        }

        Ok(paths.len())
    }

    /// Validate and add a record; names must be unique
    pub fn insert(&mut self, formula: FormulaRecord) -> Result<()> {
        for warning in validate_formula(&formula)? {
            warn!("{}: {}", formula.name(), warning);
        }

        let name = formula.name().to_string();
        if self.formulas.contains_key(&name) {
            return Err(Error::Formula(format!("duplicate formula name: {}", name)));
        }
        self.formulas.insert(name, formula);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&FormulaRecord> {
        self.formulas.get(name)
    }

    /// Look up by name, or load from a path if `reference` is a formula file
    pub fn resolve(&self, reference: &str) -> Result<FormulaRecord> {
        if let Some(formula) = self.get(reference) {
            return Ok(formula.clone());
        }

        let path = Path::new(reference);
        if path.extension().is_some_and(|ext| ext == "toml") && path.is_file() {
            let formula = parse_formula_file(path)?;
            for warning in validate_formula(&formula)? {
                warn!("{}: {}", formula.name(), warning);
            }
            return Ok(formula);
        }

        Err(Error::Formula(format!("no formula named {}", reference)))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.formulas.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FormulaRecord> {
        self.formulas.values()
    }

    pub fn len(&self) -> usize {
        self.formulas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.formulas.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::format::{DependencyStage, ShellKind};

    const TOOL: &str = r#"
[formula]
name = "tool"
version = "2.0.0"
license = "MIT"

[source]
url = "https://example.com/tool-2.0.0.tar.gz"
checksum = "b48e46f0a021f8f2ec7e4a27cd8592d8b4dc43cb5c5cfe7a5eeda6abba5fcc91"
"#;

    #[test]
    fn test_builtin_formulas() {
        let repo = FormulaRepository::builtin().unwrap();
        assert_eq!(repo.len(), 2);

        let gwt = repo.get("gwt").unwrap();
        assert_eq!(gwt.version().as_deref(), Some("1.0.0"));
        assert_eq!(
            gwt.completions.iter().map(|c| c.shell).collect::<Vec<_>>(),
            ShellKind::ALL.to_vec()
        );
        assert_eq!(gwt.smoke_tests.len(), 2);
        assert_eq!(gwt.dependencies[0].stage, DependencyStage::Build);

        let long = repo.get("git-worktree-cli").unwrap();
        assert_eq!(long.version().as_deref(), Some("0.1.1"));
        assert_eq!(long.smoke_tests[0].expect, "git-worktree-cli version");
    }

    #[test]
    fn test_load_dir_and_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("tool.toml"), TOOL).unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let repo = FormulaRepository::load_dir(dir.path()).unwrap();
        assert_eq!(repo.names().collect::<Vec<_>>(), vec!["tool"]);

        fs::write(dir.path().join("tool-copy.toml"), TOOL).unwrap();
        assert!(FormulaRepository::load_dir(dir.path()).is_err());
    }

    #[test]
    fn test_resolve_by_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tool.toml");
        fs::write(&path, TOOL).unwrap();

        let repo = FormulaRepository::new();
        let formula = repo.resolve(path.to_str().unwrap()).unwrap();
        assert_eq!(formula.name(), "tool");
        assert!(repo.resolve("missing").is_err());
    }
}
