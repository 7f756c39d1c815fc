//! Discovery of the PipeWire command-line utilities.

use std::env;
use std::ffi::OsStr;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::cli::ToolPaths;
use crate::error::{PwError, PwResult};

/// Resolve a tool to an executable path.
///
/// Bare names are looked up in `search_path` (the format of `$PATH`); names
/// containing a slash are checked as-is.
#[must_use]
pub fn find_tool(tool: &Path, search_path: Option<&OsStr>) -> Option<PathBuf> {
    if tool.components().count() > 1 {
        return is_executable(tool).then(|| tool.to_path_buf());
    }

    env::split_paths(search_path?)
        .map(|dir| dir.join(tool))
        .find(|candidate| is_executable(candidate))
}

fn is_executable(path: &Path) -> bool {
    path.metadata().is_ok_and(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
}

/// Names of the configured tools that cannot be found.
#[must_use]
pub fn missing_tools(tools: &ToolPaths, search_path: Option<&OsStr>) -> Vec<String> {
    [&tools.pw_cli, &tools.pw_link, &tools.pw_dump]
        .into_iter()
        .filter(|tool| {
            let found = find_tool(tool, search_path);
            debug!(tool = %tool.display(), ?found, "Tool lookup");
            found.is_none()
        })
        .map(|tool| tool.display().to_string())
        .collect()
}

/// Check that `pw-cli`, `pw-link` and `pw-dump` are installed.
///
/// # Errors
/// Returns [`PwError::MissingTools`] listing every tool that is absent.
pub fn ensure_tools(tools: &ToolPaths) -> PwResult<()> {
    let path = env::var_os("PATH");
    let missing = missing_tools(tools, path.as_deref());
    if missing.is_empty() { Ok(()) } else { Err(PwError::MissingTools(missing)) }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    fn touch(dir: &Path, name: &str, mode: u32) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, "").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(mode)).unwrap();
        path
    }

    #[test]
    fn test_find_tool_in_search_path() {
        let empty = TempDir::new().unwrap();
        let bin = TempDir::new().unwrap();
        let expected = touch(bin.path(), "pw-link", 0o755);
        let search = env::join_paths([empty.path(), bin.path()]).unwrap();

        assert_eq!(find_tool(Path::new("pw-link"), Some(&search)), Some(expected));
    }

    #[test]
    fn test_non_executable_is_ignored() {
        let bin = TempDir::new().unwrap();
        touch(bin.path(), "pw-link", 0o644);
        let search = env::join_paths([bin.path()]).unwrap();

        assert_eq!(find_tool(Path::new("pw-link"), Some(&search)), None);
    }

    #[test]
    fn test_explicit_path() {
        let bin = TempDir::new().unwrap();
        let tool = touch(bin.path(), "my-pw-dump", 0o755);

        assert_eq!(find_tool(&tool, None), Some(tool.clone()));
        assert_eq!(find_tool(&bin.path().join("absent"), None), None);
    }

    #[test]
    fn test_missing_tools_lists_every_absent_tool() {
        let bin = TempDir::new().unwrap();
        touch(bin.path(), "pw-link", 0o755);
        let search = env::join_paths([bin.path()]).unwrap();

        let missing = missing_tools(&ToolPaths::default(), Some(&search));
        assert_eq!(missing, vec!["pw-cli".to_string(), "pw-dump".to_string()]);
    }

    #[test]
    fn test_missing_tools_message() {
        let err = PwError::MissingTools(vec!["pw-cli".into(), "pw-dump".into()]);
        assert_eq!(
            err.to_string(),
            "Required PipeWire utilities not found: pw-cli, pw-dump. Please install pipewire-tools package."
        );
    }
}
