// src/formula/parser.rs

//! Formula file parsing and validation

use crate::error::{Error, Result};
use crate::formula::format::FormulaRecord;
use std::collections::HashSet;
use std::path::Path;
use url::Url;

/// Parse a formula from a TOML string
pub fn parse_formula(content: &str) -> Result<FormulaRecord> {
    toml::from_str(content).map_err(|e| Error::Parse(format!("Invalid formula: {}", e)))
}

/// Parse a formula from a file
pub fn parse_formula_file(path: &Path) -> Result<FormulaRecord> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Parse(format!(
            "Failed to read formula file {}: {}",
            path.display(),
            e
        ))
    })?;

    parse_formula(&content)
}

/// Validate a formula for completeness and correctness
///
/// Hard invariant violations are errors; cosmetic gaps come back as warnings.
pub fn validate_formula(formula: &FormulaRecord) -> Result<Vec<String>> {
    let mut warnings = Vec::new();
    let name = &formula.formula.name;

    validate_binary_name(name)?;

    // Release source: versioned archive, must be pinned
    // A bare absolute path names a local archive
    if !Path::new(&formula.source.url).is_absolute() {
        validate_url(name, "source", &formula.source.url, &["http", "https", "file"])?;
    }
    formula.expected_digest()?;

    match formula.version() {
        Some(version) => {
            if semver::Version::parse(&version).is_err() {
                warnings.push(format!("Version {} is not a semantic version", version));
            }
        }
        None => {
            return Err(Error::Formula(format!(
                "{}: no version given and none found in {}",
                name, formula.source.url
            )));
        }
    }

    if let Some(head) = &formula.head {
        validate_url(name, "head", &head.url, &["http", "https", "file", "ssh", "git"])?;
        if head.branch.trim().is_empty() {
            return Err(Error::Formula(format!("{}: head branch cannot be empty", name)));
        }
    }

    // Dependencies are an ordered set
    let mut seen = HashSet::new();
    for dep in &formula.dependencies {
        if dep.name.trim().is_empty() {
            return Err(Error::Formula(format!("{}: dependency with empty name", name)));
        }
        if !seen.insert(dep.name.as_str()) {
            return Err(Error::Formula(format!(
                "{}: dependency {} listed twice",
                name, dep.name
            )));
        }
    }

    // Build command
    let build = &formula.build;
    if build.command.is_empty() || build.command[0].trim().is_empty() {
        return Err(Error::Formula(format!("{}: build command is empty", name)));
    }
    let uses = |placeholder: &str| build.command.iter().any(|arg| arg.contains(placeholder));
    if !uses("%(output)s") {
        warnings.push(
            "Build command has no %(output)s placeholder; the artifact must still land at the output path"
                .to_string(),
        );
    }
    if (build.strip || !build.version_symbol.is_empty()) && !uses("%(ldflags)s") {
        warnings.push(
            "Build command has no %(ldflags)s placeholder; strip and version flags are not passed"
                .to_string(),
        );
    }

    // One completion script per shell
    let mut shells = HashSet::new();
    for entry in &formula.completions {
        if !shells.insert(entry.shell) {
            return Err(Error::Formula(format!(
                "{}: completion for {} listed twice",
                name, entry.shell
            )));
        }
        let file_name = entry.file_name_for(name);
        if file_name.is_empty() || file_name.contains('/') || file_name == ".." {
            return Err(Error::Formula(format!(
                "{}: invalid completion file name {:?}",
                name, file_name
            )));
        }
    }

    for test in &formula.smoke_tests {
        if test.expect.is_empty() {
            warnings.push(format!(
                "Smoke test `{}` expects empty output and always matches",
                test.args.join(" ")
            ));
        }
    }

    // Warn about missing fields
    if formula.formula.description.is_none() {
        warnings.push("Missing formula description".to_string());
    }
    if formula.formula.license.is_none() {
        warnings.push("Missing formula license".to_string());
    }
    if formula.formula.homepage.is_none() {
        warnings.push("Missing formula homepage".to_string());
    }
    if formula.smoke_tests.is_empty() {
        warnings.push("No smoke tests; installs are not verified".to_string());
    }

    Ok(warnings)
}

fn validate_binary_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::Formula("Formula name cannot be empty".to_string()));
    }
    if name == "." || name == ".." || name.contains(['/', '\\']) || name.contains(char::is_whitespace)
    {
        return Err(Error::Formula(format!(
            "Formula name {:?} is not a valid binary name",
            name
        )));
    }
    Ok(())
}

fn validate_url(name: &str, field: &str, url: &str, schemes: &[&str]) -> Result<()> {
    let parsed = Url::parse(url)
        .map_err(|e| Error::Formula(format!("{}: invalid {} URL {}: {}", name, field, url, e)))?;
    if !schemes.contains(&parsed.scheme()) {
        return Err(Error::Formula(format!(
            "{}: unsupported {} URL scheme {} (supported: {})",
            name,
            field,
            parsed.scheme(),
            schemes.join(", ")
        )));
    }
    Ok(())
}
