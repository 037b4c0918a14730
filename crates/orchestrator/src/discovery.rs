use std::path::{Path, PathBuf};

#[cfg(windows)]
const TOOL_EXECUTABLE: &str = "cmake.exe";
#[cfg(not(windows))]
const TOOL_EXECUTABLE: &str = "cmake";

/// Locate the build tool.
///
/// An explicitly configured path wins when it exists, then the search
/// path, then the conventional install location on Unix.
pub fn find_tool(configured: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = configured {
        if path.is_file() {
            return Some(path.to_path_buf());
        }
    }

    if let Ok(found) = which::which(TOOL_EXECUTABLE) {
        return Some(found);
    }

    #[cfg(unix)]
    {
        let fallback = Path::new("/usr/local/bin/cmake");
        if fallback.is_file() {
            return Some(fallback.to_path_buf());
        }
    }

    None
}
