use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// Package type assigned to ROS 2 packages built with cargo-ros2.
pub const AMENT_CARGO: &str = "ament_cargo";

/// Failure to read or parse a package manifest.
#[derive(Debug, Error)]
pub enum IdentifyError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid Cargo.toml at {path}: {source}")]
    CargoToml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid package.xml at {path}: {reason}")]
    PackageXml { path: PathBuf, reason: String },
}

/// Dependencies declared in `package.xml`, grouped by the phase that needs them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dependencies {
    pub build: BTreeSet<String>,
    pub run: BTreeSet<String>,
    pub test: BTreeSet<String>,
}

/// An `ament_cargo` package identified from its `package.xml` and `Cargo.toml`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageMetadata {
    /// Package name from `<name>` in `package.xml`.
    pub name: String,
    pub version: String,
    /// Package directory containing both manifests.
    pub path: PathBuf,
    /// Always [`AMENT_CARGO`].
    pub package_type: String,
    pub dependencies: Dependencies,
}

#[derive(Deserialize)]
struct CargoManifest {
    package: Option<toml::Table>,
}

/// Identifies `dir` as an `ament_cargo` package.
///
/// Returns `Ok(None)` when `declared_type` names another package type, when either
/// manifest is missing, or when `Cargo.toml` is a virtual workspace manifest.
/// Dependency `condition` attributes are evaluated against the process environment.
pub fn identify(
    dir: &Path,
    declared_type: Option<&str>,
) -> Result<Option<PackageMetadata>, IdentifyError> {
    if declared_type.is_some_and(|t| t != AMENT_CARGO) {
        return Ok(None);
    }

    let package_xml = dir.join("package.xml");
    if !package_xml.is_file() {
        return Ok(None);
    }

    let cargo_toml = dir.join("Cargo.toml");
    if !cargo_toml.is_file() {
        return Ok(None);
    }

    let content = read(&cargo_toml)?;
    let manifest: CargoManifest =
        toml::from_str(&content).map_err(|source| IdentifyError::CargoToml {
            path: cargo_toml.clone(),
            source,
        })?;
    if manifest.package.is_none() {
        tracing::debug!(path = %cargo_toml.display(), "Skipping virtual manifest");
        return Ok(None);
    }

    let env = |var: &str| std::env::var(var).ok();
    let info = parse_package_xml(&read(&package_xml)?, &env).map_err(|reason| {
        IdentifyError::PackageXml {
            path: package_xml.clone(),
            reason,
        }
    })?;

    Ok(Some(PackageMetadata {
        name: info.name,
        version: info.version,
        path: dir.to_path_buf(),
        package_type: AMENT_CARGO.to_string(),
        dependencies: info.dependencies,
    }))
}

fn read(path: &Path) -> Result<String, IdentifyError> {
    std::fs::read_to_string(path).map_err(|source| IdentifyError::Read {
        path: path.to_path_buf(),
        source,
    })
}

/// Scans workspace roots for `ament_cargo` packages, sorted by name.
///
/// The `build`, `install`, `log` and `target` directories directly under a root are
/// skipped, as is any directory containing a `COLCON_IGNORE` marker. Packages whose
/// manifests fail to parse are logged and left out.
#[cfg(feature = "workspace")]
pub fn discover(roots: &[PathBuf]) -> Vec<PackageMetadata> {
    use std::collections::HashSet;

    use ignore::WalkBuilder;

    let mut seen = HashSet::new();
    let roots: Vec<&PathBuf> = roots
        .iter()
        .filter(|r| {
            let canonical = r.canonicalize().unwrap_or_else(|_| r.to_path_buf());
            seen.insert(canonical)
        })
        .collect();

    let Some((first, rest)) = roots.split_first() else {
        return Vec::new();
    };

    let mut builder = WalkBuilder::new(first);
    for root in rest {
        builder.add(root);
    }

    let walker = builder
        .hidden(true)
        .git_ignore(true)
        .git_global(false)
        .git_exclude(true)
        .filter_entry(|entry| {
            if !entry.file_type().is_some_and(|ft| ft.is_dir()) {
                return true;
            }
            if entry.path().join("COLCON_IGNORE").exists() {
                tracing::debug!(path = %entry.path().display(), "Skipping COLCON_IGNORE directory");
                return false;
            }
            let name = entry.file_name().to_string_lossy();
            entry.depth() != 1 || !matches!(name.as_ref(), "target" | "build" | "install" | "log")
        })
        .build();

    let mut packages = Vec::new();
    let mut seen_dirs = HashSet::new();
    for entry in walker.flatten() {
        if !entry.file_type().is_some_and(|ft| ft.is_file()) || entry.file_name() != "package.xml"
        {
            continue;
        }
        let Some(dir) = entry.path().parent() else {
            continue;
        };
        if !seen_dirs.insert(dir.to_path_buf()) {
            continue;
        }
        match identify(dir, None) {
            Ok(Some(pkg)) => packages.push(pkg),
            Ok(None) => {}
            Err(err) => tracing::warn!(%err, "Skipping package"),
        }
    }

    packages.sort_by(|a, b| a.name.cmp(&b.name));
    packages
}

struct PackageXmlInfo {
    name: String,
    version: String,
    dependencies: Dependencies,
}

fn parse_package_xml(
    content: &str,
    lookup: &dyn Fn(&str) -> Option<String>,
) -> Result<PackageXmlInfo, String> {
    use quick_xml::events::Event;
    use quick_xml::reader::Reader;

    let mut reader = Reader::from_str(content);

    let mut name = None;
    let mut version = None;
    let mut dependencies = Dependencies::default();
    let mut current_tag = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                current_tag = String::from_utf8_lossy(e.name().as_ref()).to_string();
                let condition = e
                    .try_get_attribute("condition")
                    .map_err(|err| err.to_string())?;
                if let Some(attr) = condition {
                    let expr = attr.unescape_value().map_err(|err| err.to_string())?;
                    if !evaluate_condition(&expr, lookup) {
                        tracing::debug!(tag = %current_tag, condition = %expr, "Condition is false");
                        current_tag.clear();
                    }
                }
            }
            Ok(Event::End(_)) => current_tag.clear(),
            Ok(Event::Text(e)) => {
                let Ok(text) = e.unescape() else {
                    continue;
                };
                let text = text.trim();
                if text.is_empty() {
                    continue;
                }
                match current_tag.as_str() {
                    "name" if name.is_none() => name = Some(text.to_string()),
                    "version" if version.is_none() => version = Some(text.to_string()),
                    tag => add_dependency(&mut dependencies, tag, text),
                }
            }
            Ok(Event::Eof) => break,
            Err(err) => return Err(err.to_string()),
            _ => {}
        }
    }

    Ok(PackageXmlInfo {
        name: name.ok_or_else(|| "missing <name>".to_string())?,
        version: version.unwrap_or_default(),
        dependencies,
    })
}

/// Evaluates a REP 149 `condition` expression.
///
/// Supports `==` and `!=` comparisons joined by `and`/`or` (`and` binds tighter).
/// `$VAR` expands to the variable's value, or the empty string when unset. A term that
/// is not a comparison is true.
fn evaluate_condition(expr: &str, lookup: &dyn Fn(&str) -> Option<String>) -> bool {
    expr.split(" or ").any(|alternative| {
        alternative
            .split(" and ")
            .all(|term| evaluate_comparison(term, lookup))
    })
}

fn evaluate_comparison(term: &str, lookup: &dyn Fn(&str) -> Option<String>) -> bool {
    let (lhs, rhs, equal) = if let Some((lhs, rhs)) = term.split_once("==") {
        (lhs, rhs, true)
    } else if let Some((lhs, rhs)) = term.split_once("!=") {
        (lhs, rhs, false)
    } else {
        tracing::debug!(term, "Unsupported condition term; treating as true");
        return true;
    };

    let operand = |raw: &str| -> String {
        let raw = raw.trim();
        match raw.strip_prefix('$') {
            Some(var) => lookup(var).unwrap_or_default(),
            None => raw.trim_matches(['"', '\'']).to_string(),
        }
    };

    (operand(lhs) == operand(rhs)) == equal
}

fn add_dependency(deps: &mut Dependencies, tag: &str, dep: &str) {
    let (build, run, test) = match tag {
        "depend" => (true, true, true),
        "build_depend" => (true, false, false),
        "build_export_depend" | "exec_depend" | "run_depend" => (false, true, false),
        "test_depend" => (false, false, true),
        _ => return,
    };
    if build {
        deps.build.insert(dep.to_string());
    }
    if run {
        deps.run.insert(dep.to_string());
    }
    if test {
        deps.test.insert(dep.to_string());
    }
}
