use std::path::Path;

use async_trait::async_trait;

use process::{ArgumentList, ProcessError, ProcessHandle, ProcessStream};

/// Seam between the session and the operating system.
///
/// The orchestrator only ever starts steps through this trait, so tests
/// can substitute a launcher that replays scripted output without
/// spawning anything.
#[async_trait]
pub trait Launcher: Send + Sync {
    async fn launch(&self, program: &Path, args: &ArgumentList)
        -> process::Result<ProcessStream>;
}

/// Launcher that spawns the real tool.
pub struct ToolLauncher;

#[async_trait]
impl Launcher for ToolLauncher {
    async fn launch(
        &self,
        program: &Path,
        args: &ArgumentList,
    ) -> process::Result<ProcessStream> {
        let handle = ProcessHandle::create(program)
            .ok_or_else(|| ProcessError::NotFound(program.to_path_buf()))?;
        handle.run(args)
    }
}
