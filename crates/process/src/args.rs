use std::fmt;
use std::path::Path;

/// Ordered argument vector for a tool invocation.
///
/// Tokens are handed to the spawn call verbatim, one argv entry each -
/// there is no shell anywhere in the pipeline, so spaces or
/// metacharacters inside a token never split or expand.
#[derive(Debug, Clone, Default)]
pub struct ArgumentList {
    tokens: Vec<String>,
}

impl ArgumentList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a raw token, used as-is.
    pub fn add(&mut self, token: impl Into<String>) {
        self.tokens.push(token.into());
    }

    /// Append a filesystem path token.
    ///
    /// Directory separators are normalized for the current platform and
    /// the token is wrapped in quotes when the path contains whitespace.
    pub fn add_path(&mut self, path: impl AsRef<Path>) {
        let token = normalize_separators(&path.as_ref().to_string_lossy());
        if token.contains(char::is_whitespace) {
            self.tokens.push(format!("\"{token}\""));
        } else {
            self.tokens.push(token);
        }
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl fmt::Display for ArgumentList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tokens.join(" "))
    }
}

#[cfg(windows)]
fn normalize_separators(token: &str) -> String {
    token.replace('/', "\\")
}

#[cfg(not(windows))]
fn normalize_separators(token: &str) -> String {
    token.replace('\\', "/")
}

/// Render a path with forward slashes, the form CMake accepts in
/// definition values on every platform.
pub fn cmake_path(path: impl AsRef<Path>) -> String {
    path.as_ref().to_string_lossy().replace('\\', "/")
}
