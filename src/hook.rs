//! Environment hooks contributed by a package build.
//!
//! A hook describes one search-path variable update applied when a package's
//! environment is sourced. Tasks only register descriptors; [`write_hooks`] persists
//! them in the `.dsv` and `.sh` formats colcon's setup scripts consume.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Search-path variable downstream packages use to find installed ament packages.
pub const AMENT_PREFIX_PATH: &str = "AMENT_PREFIX_PATH";

/// Whether the hook's value goes in front of or behind the existing variable value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookMode {
    Prepend,
    Append,
}

impl HookMode {
    /// Operation keyword used in `.dsv` files.
    pub fn dsv_operation(&self) -> &'static str {
        match self {
            HookMode::Prepend => "prepend-non-duplicate",
            HookMode::Append => "append-non-duplicate",
        }
    }

    fn verb(&self) -> &'static str {
        match self {
            HookMode::Prepend => "prepend",
            HookMode::Append => "append",
        }
    }
}

/// One search-path update for a package's environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentHook {
    /// File stem of the generated hook files.
    pub name: String,
    /// Environment variable to update.
    pub variable: String,
    pub mode: HookMode,
    /// Path relative to the package prefix; empty for the prefix itself.
    pub subdirectory: String,
    /// Installation prefix of the package.
    pub prefix: PathBuf,
    /// Package owning the hook.
    pub package: String,
}

impl EnvironmentHook {
    /// A hook that prepends the install base itself onto `AMENT_PREFIX_PATH`.
    pub fn ament_prefix_path(install_base: impl Into<PathBuf>, package: impl Into<String>) -> Self {
        Self {
            name: "ament_prefix_path".to_string(),
            variable: AMENT_PREFIX_PATH.to_string(),
            mode: HookMode::Prepend,
            subdirectory: String::new(),
            prefix: install_base.into(),
            package: package.into(),
        }
    }

    /// Directory the hook files are written to: `<prefix>/share/<package>/hook`.
    pub fn hook_dir(&self) -> PathBuf {
        self.prefix.join("share").join(&self.package).join("hook")
    }

    /// Renders the `.dsv` line, e.g. `prepend-non-duplicate;AMENT_PREFIX_PATH;`.
    pub fn to_dsv(&self) -> String {
        format!(
            "{};{};{}\n",
            self.mode.dsv_operation(),
            self.variable,
            self.subdirectory
        )
    }

    /// Renders a POSIX shell fragment performing the same update without duplicates.
    pub fn to_sh(&self) -> String {
        let value = if self.subdirectory.is_empty() {
            "$COLCON_CURRENT_PREFIX".to_string()
        } else {
            format!("$COLCON_CURRENT_PREFIX/{}", self.subdirectory)
        };
        let verb = self.mode.verb();
        let join = match self.mode {
            HookMode::Prepend => "\"$_value:$_values\"",
            HookMode::Append => "\"$_values:$_value\"",
        };

        format!(
            r#"# generated by colcon-ros-cargo

# {verb} a value to a colon-separated variable, skipping duplicates
_colcon_{verb}_unique_value() {{
  _listname="$1"
  eval _values=\"\$$_listname\"
  _value="$2"
  case ":$_values:" in
    *":$_value:"*) ;;
    *)
      if [ -z "$_values" ]; then
        _values="$_value"
      else
        _values={join}
      fi
      ;;
  esac
  eval export $_listname=\"$_values\"
  unset _listname _values _value
}}

_colcon_{verb}_unique_value {variable} "{value}"

unset -f _colcon_{verb}_unique_value
"#,
            variable = self.variable,
        )
    }
}

/// Registers the `AMENT_PREFIX_PATH` hook for a package installed into `install_base`.
pub fn register_ament_prefix_hook(
    install_base: &Path,
    package: &str,
    hooks: &mut Vec<EnvironmentHook>,
) {
    hooks.push(EnvironmentHook::ament_prefix_path(install_base, package));
}

/// Writes every hook's `.dsv` and `.sh` files, returning the paths written.
pub fn write_hooks(hooks: &[EnvironmentHook]) -> Result<Vec<PathBuf>> {
    let mut written = Vec::with_capacity(hooks.len() * 2);

    for hook in hooks {
        let dir = hook.hook_dir();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create hook directory {}", dir.display()))?;

        for (extension, content) in [("dsv", hook.to_dsv()), ("sh", hook.to_sh())] {
            let path = dir.join(format!("{}.{extension}", hook.name));
            std::fs::write(&path, content)
                .with_context(|| format!("Failed to write hook {}", path.display()))?;
            tracing::debug!(package = %hook.package, path = %path.display(), "Wrote environment hook");
            written.push(path);
        }
    }

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_appends_single_prepend_hook() {
        let mut hooks = vec![EnvironmentHook::ament_prefix_path("/other", "other_pkg")];
        register_ament_prefix_hook(Path::new("/ws/install/pkg"), "pkg", &mut hooks);

        assert_eq!(hooks.len(), 2);
        let hook = &hooks[1];
        assert_eq!(hook.variable, "AMENT_PREFIX_PATH");
        assert_eq!(hook.mode, HookMode::Prepend);
        assert_eq!(hook.prefix, PathBuf::from("/ws/install/pkg"));
        assert_eq!(hook.package, "pkg");
        assert!(hook.subdirectory.is_empty());
    }

    #[test]
    fn test_dsv_line() {
        let hook = EnvironmentHook::ament_prefix_path("/ws/install/pkg", "pkg");
        assert_eq!(hook.to_dsv(), "prepend-non-duplicate;AMENT_PREFIX_PATH;\n");
    }

    #[test]
    fn test_sh_fragment_prepends_current_prefix() {
        let hook = EnvironmentHook::ament_prefix_path("/ws/install/pkg", "pkg");
        let sh = hook.to_sh();
        assert!(sh.contains(r#"_colcon_prepend_unique_value AMENT_PREFIX_PATH "$COLCON_CURRENT_PREFIX""#));
        assert!(sh.contains(r#"_values="$_value:$_values""#));
    }

    #[test]
    fn test_sh_fragment_with_subdirectory_and_append() {
        let hook = EnvironmentHook {
            mode: HookMode::Append,
            subdirectory: "lib".to_string(),
            variable: "LD_LIBRARY_PATH".to_string(),
            ..EnvironmentHook::ament_prefix_path("/p", "pkg")
        };
        assert_eq!(hook.to_dsv(), "append-non-duplicate;LD_LIBRARY_PATH;lib\n");
        assert!(hook.to_sh().contains(r#"LD_LIBRARY_PATH "$COLCON_CURRENT_PREFIX/lib""#));
    }

    #[test]
    fn test_write_hooks_creates_files_under_share() {
        let dir = tempfile::tempdir().unwrap();
        let install_base = dir.path().join("install").join("pkg");
        let mut hooks = Vec::new();
        register_ament_prefix_hook(&install_base, "pkg", &mut hooks);

        let written = write_hooks(&hooks).unwrap();

        let hook_dir = install_base.join("share").join("pkg").join("hook");
        assert_eq!(
            written,
            vec![
                hook_dir.join("ament_prefix_path.dsv"),
                hook_dir.join("ament_prefix_path.sh"),
            ]
        );
        assert_eq!(
            std::fs::read_to_string(hook_dir.join("ament_prefix_path.dsv")).unwrap(),
            "prepend-non-duplicate;AMENT_PREFIX_PATH;\n"
        );
    }
}
