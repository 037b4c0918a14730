//! The orchestrator: one session of dependent tool invocations.
//!
//! All state lives on the task that owns the `Orchestrator`; process
//! I/O happens on background tasks inside the process crate and is
//! handed over through a channel, so nothing here needs a lock. Only
//! one step is ever in flight per session.

use std::path::PathBuf;

use tracing::{info, warn};

use events::{Event, EventBus};
use forge_core::{parse_capabilities, CapabilityInfo, ProjectSpec};
use process::{cmake_path, ArgumentList, ProcessEvent};

use crate::error::{OrchestratorError, Result};
use crate::launcher::{Launcher, ToolLauncher};
use crate::state_machine::{SessionState, SessionStateMachine};

pub struct Orchestrator {
    tool: PathBuf,
    launcher: Box<dyn Launcher>,
    bus: Option<EventBus>,
    state: SessionState,
    capabilities: Option<CapabilityInfo>,
    generator: Option<String>,
    log: String,
}

impl Orchestrator {
    pub fn new(tool: impl Into<PathBuf>) -> Self {
        Self {
            tool: tool.into(),
            launcher: Box::new(ToolLauncher),
            bus: None,
            state: SessionState::Idle,
            capabilities: None,
            generator: None,
            log: String::new(),
        }
    }

    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn with_launcher(mut self, launcher: Box<dyn Launcher>) -> Self {
        self.launcher = launcher;
        self
    }

    pub fn is_busy(&self) -> bool {
        self.state != SessionState::Idle
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn capabilities(&self) -> Option<&CapabilityInfo> {
        self.capabilities.as_ref()
    }

    /// Session log: every command line and output chunk so far.
    pub fn log(&self) -> &str {
        &self.log
    }

    /// Choose the generator the configure step will use. Unset means
    /// the first generator the tool reported.
    pub fn select_generator(&mut self, name: impl Into<String>) {
        self.generator = Some(name.into());
    }

    /// Probe the tool for its version and generators.
    ///
    /// Parse failures and non-zero exits are advisory: capabilities
    /// stay unknown, the session returns to idle, and the failure is
    /// published, but `Ok(())` is returned. Only a refused start (busy)
    /// or a spawn failure is an error.
    pub async fn probe_capabilities(&mut self) -> Result<()> {
        if self.is_busy() {
            return Err(OrchestratorError::Busy);
        }

        let mut args = ArgumentList::new();
        args.add("-E");
        args.add("capabilities");

        self.publish(Event::SessionStarted {
            step: SessionState::Probing.as_str().to_string(),
        });

        let (code, output) = match self.run_step(SessionState::Probing, args).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.publish(Event::SessionEnded { success: false });
                return Err(e);
            }
        };
        self.state = SessionState::Idle;

        if code != 0 {
            self.advise(format!("capability probe exited with code {code}"));
            self.publish(Event::SessionEnded { success: false });
            return Ok(());
        }

        match parse_capabilities(&output) {
            Some(info) => {
                info!(
                    version = %info.version_string(),
                    generators = info.generators.len(),
                    "Tool capabilities updated"
                );
                self.publish(Event::CapabilitiesUpdated {
                    version: info.version_string(),
                    generators: info.generators.clone(),
                });
                self.capabilities = Some(info);
                self.publish(Event::SessionEnded { success: true });
            }
            None => {
                self.advise("capability report could not be parsed; capabilities stay unknown");
                self.publish(Event::SessionEnded { success: false });
            }
        }
        Ok(())
    }

    /// Run the full create-project chain: generate, configure, open.
    ///
    /// Refused synchronously - nothing is spawned - when the session is
    /// busy, when capabilities are unknown, or when the spec fails
    /// validation. A non-zero exit in generate or configure halts the
    /// chain; the accumulated log is the diagnostic. The final open
    /// step is best effort and its exit code is not inspected.
    pub async fn create_project(&mut self, spec: &ProjectSpec) -> Result<()> {
        if self.is_busy() {
            return Err(OrchestratorError::Busy);
        }
        let capabilities = match &self.capabilities {
            Some(info) if info.is_known() => info.clone(),
            _ => {
                self.advise("build tool not installed; run a capability probe first");
                return Err(OrchestratorError::ToolNotInstalled);
            }
        };
        spec.validate()?;
        let generator = match self
            .generator
            .clone()
            .or_else(|| capabilities.generators.first().cloned())
        {
            Some(name) => name,
            None => return Err(OrchestratorError::NoGenerator),
        };

        self.log.clear();
        self.publish(Event::SessionStarted {
            step: SessionState::Generating.as_str().to_string(),
        });

        let project_dir = spec.project_dir();
        let build_dir = project_dir.join("build");

        self.checked_step(SessionState::Generating, generate_args(spec))
            .await?;

        let mut configure = ArgumentList::new();
        configure.add(format!("-G{generator}"));
        configure.add("-S");
        configure.add_path(&project_dir);
        configure.add("-B");
        configure.add_path(&build_dir);
        self.checked_step(SessionState::Configuring, configure).await?;

        // Terminal best-effort step: stream output, ignore the code.
        let mut open = ArgumentList::new();
        open.add("--open");
        open.add_path(&build_dir);
        self.checked_step(SessionState::Opening, open).await?;

        self.state = SessionState::Idle;
        self.publish(Event::SessionEnded { success: true });
        info!(project = %project_dir.display(), "Project created");
        Ok(())
    }

    /// Run one step and halt the chain on failure.
    async fn checked_step(
        &mut self,
        step: SessionState,
        args: ArgumentList,
    ) -> Result<(i32, String)> {
        let outcome = match self.run_step(step, args).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.publish(Event::SessionEnded { success: false });
                return Err(e);
            }
        };
        if outcome.0 != 0 && step != SessionState::Opening {
            let code = outcome.0;
            self.state = SessionState::Idle;
            self.advise(format!("{step} failed with exit code {code}"));
            self.publish(Event::SessionEnded { success: false });
            return Err(OrchestratorError::StepFailed { step, code });
        }
        Ok(outcome)
    }

    /// Drive a single tool invocation to its final event.
    ///
    /// Returns the exit code and this step's own output. On spawn
    /// failure the session falls back to idle and no events beyond the
    /// advisory are delivered.
    async fn run_step(
        &mut self,
        step: SessionState,
        args: ArgumentList,
    ) -> Result<(i32, String)> {
        SessionStateMachine::validate_transition(&self.state, &step)?;
        self.state = step;
        self.publish(Event::StepStarted {
            step: step.as_str().to_string(),
        });

        let command_line = format!("{} {}\n", self.tool.display(), args);
        self.log.push_str(&command_line);
        self.publish(Event::OutputChunk { text: command_line });

        let mut stream = match self.launcher.launch(&self.tool, &args).await {
            Ok(stream) => stream,
            Err(e) => {
                self.state = SessionState::Idle;
                self.advise(format!("could not execute {}: {e}", self.tool.display()));
                return Err(e.into());
            }
        };

        let mut step_output = String::new();
        while let Some(event) = stream.recv().await {
            match event {
                ProcessEvent::Output(chunk) => {
                    let text = String::from_utf8_lossy(&chunk).into_owned();
                    self.log.push_str(&text);
                    step_output.push_str(&text);
                    self.publish(Event::OutputChunk { text });
                }
                ProcessEvent::Exited { code } => {
                    self.publish(Event::StepFinished {
                        step: step.as_str().to_string(),
                        code,
                    });
                    return Ok((code, step_output));
                }
            }
        }

        // Stream closed without a final event: the child was torn down
        // out from under us. Report it like a killed process.
        self.publish(Event::StepFinished {
            step: step.as_str().to_string(),
            code: -1,
        });
        Ok((-1, step_output))
    }

    fn publish(&self, event: Event) {
        if let Some(bus) = &self.bus {
            bus.publish(event);
        }
    }

    fn advise(&self, message: impl Into<String>) {
        let message = message.into();
        warn!("{message}");
        self.publish(Event::Advisory { message });
    }

    #[cfg(test)]
    fn force_state(&mut self, state: SessionState) {
        self.state = state;
    }
}

/// Definitions handed to the generation script. Each value is one
/// opaque argv token; nothing is rewritten here beyond the identifier
/// legalization already baked into the derived names.
fn generate_args(spec: &ProjectSpec) -> ArgumentList {
    let mut args = ArgumentList::new();
    define(&mut args, "FORGE_SDK_SOURCE_DIR", &cmake_path(&spec.sdk_dir));
    define(
        &mut args,
        "FORGE_OUTPUT_DIRECTORY",
        &cmake_path(&spec.output_dir),
    );
    define(&mut args, "FORGE_PLUGIN_NAME", &spec.plugin_name);
    define(&mut args, "FORGE_PLUGIN_CATEGORY", spec.kind.as_str());
    define(&mut args, "FORGE_PROJECT_NAME", &spec.project_name());
    define(&mut args, "FORGE_BUNDLE_NAME", &spec.plugin_name);
    define(&mut args, "FORGE_BUNDLE_IDENTIFIER", &spec.bundle_identifier);
    define(&mut args, "FORGE_VENDOR_NAME", &spec.vendor_name);
    define(&mut args, "FORGE_VENDOR_HOMEPAGE", &spec.vendor_homepage);
    define(&mut args, "FORGE_VENDOR_EMAIL", &spec.vendor_email);
    define(&mut args, "FORGE_FILENAME_PREFIX", &spec.filename_prefix);
    if let Some(namespace) = spec.vendor_namespace.as_deref() {
        if !namespace.is_empty() {
            define(&mut args, "FORGE_VENDOR_NAMESPACE", namespace);
        }
    }
    define(
        &mut args,
        "FORGE_PLUGIN_CLASS_NAME",
        &spec.effective_class_name(),
    );
    args.add("-P");
    args.add_path(&spec.script_path);
    args
}

fn define(args: &mut ArgumentList, key: &str, value: &str) {
    args.add(format!("-D{key}={value}"));
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::VecDeque;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use bytes::Bytes;
    use tokio::sync::mpsc;

    use forge_core::ProjectKind;
    use process::{ProcessError, ProcessStream};

    const CAPABILITIES_HEAD: &str = r#"{"version":{"major":3,"minor":28,"#;
    const CAPABILITIES_TAIL: &str =
        r#""patch":1},"generators":[{"name":"Ninja"},{"name":"Unix Makefiles"}]}"#;

    struct ScriptedRun {
        chunks: Vec<&'static str>,
        code: i32,
    }

    struct ScriptedLauncher {
        runs: Mutex<VecDeque<ScriptedRun>>,
        launches: Arc<AtomicUsize>,
        seen_args: Arc<Mutex<Vec<String>>>,
    }

    impl ScriptedLauncher {
        fn new(runs: Vec<ScriptedRun>) -> (Self, Arc<AtomicUsize>, Arc<Mutex<Vec<String>>>) {
            let launches = Arc::new(AtomicUsize::new(0));
            let seen_args = Arc::new(Mutex::new(Vec::new()));
            let launcher = Self {
                runs: Mutex::new(runs.into()),
                launches: launches.clone(),
                seen_args: seen_args.clone(),
            };
            (launcher, launches, seen_args)
        }
    }

    #[async_trait]
    impl Launcher for ScriptedLauncher {
        async fn launch(
            &self,
            _program: &Path,
            args: &ArgumentList,
        ) -> process::Result<ProcessStream> {
            self.launches.fetch_add(1, Ordering::SeqCst);
            self.seen_args.lock().unwrap().push(args.to_string());
            let run = self
                .runs
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| ProcessError::NotFound("script exhausted".into()))?;

            let (tx, rx) = mpsc::channel(16);
            tokio::spawn(async move {
                for chunk in run.chunks {
                    let bytes = Bytes::from_static(chunk.as_bytes());
                    if tx.send(ProcessEvent::Output(bytes)).await.is_err() {
                        return;
                    }
                }
                let _ = tx.send(ProcessEvent::Exited { code: run.code }).await;
            });
            Ok(ProcessStream::scripted(rx))
        }
    }

    fn orchestrator_with(runs: Vec<ScriptedRun>) -> (Orchestrator, Arc<AtomicUsize>) {
        let (launcher, launches, _) = ScriptedLauncher::new(runs);
        let orchestrator =
            Orchestrator::new("/opt/tools/cmake").with_launcher(Box::new(launcher));
        (orchestrator, launches)
    }

    fn probe_run() -> ScriptedRun {
        ScriptedRun {
            chunks: vec![CAPABILITIES_HEAD, CAPABILITIES_TAIL],
            code: 0,
        }
    }

    fn project_spec(sdk_dir: &Path) -> ProjectSpec {
        ProjectSpec {
            vendor_name: "Acme Audio".to_string(),
            vendor_email: "dev@acme.example".to_string(),
            vendor_homepage: "https://acme.example".to_string(),
            vendor_namespace: Some("acme".to_string()),
            plugin_name: "Super Delay".to_string(),
            class_name: None,
            bundle_identifier: "com.acme.superdelay".to_string(),
            filename_prefix: "acme_".to_string(),
            kind: ProjectKind::Effect,
            sdk_dir: sdk_dir.to_path_buf(),
            output_dir: PathBuf::from("/tmp/plugins"),
            script_path: PathBuf::from("/tmp/GeneratePlugin.cmake"),
        }
    }

    fn drain(rx: &mut tokio::sync::broadcast::Receiver<events::EventEnvelope>) -> Vec<Event> {
        let mut out = Vec::new();
        while let Ok(envelope) = rx.try_recv() {
            out.push(envelope.event);
        }
        out
    }

    #[tokio::test]
    async fn test_probe_stores_capabilities() {
        let (mut orchestrator, _) = orchestrator_with(vec![probe_run()]);

        orchestrator.probe_capabilities().await.unwrap();

        let info = orchestrator.capabilities().unwrap();
        assert_eq!(info.version_major, 3);
        assert_eq!(info.generators, vec!["Ninja", "Unix Makefiles"]);
        assert!(!orchestrator.is_busy());
    }

    #[tokio::test]
    async fn test_probe_with_malformed_output_is_advisory() {
        let (launcher, _, _) = ScriptedLauncher::new(vec![ScriptedRun {
            chunks: vec!["cmake: not json at all"],
            code: 0,
        }]);
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let mut orchestrator = Orchestrator::new("/opt/tools/cmake")
            .with_launcher(Box::new(launcher))
            .with_event_bus(bus);

        orchestrator.probe_capabilities().await.unwrap();

        assert!(orchestrator.capabilities().is_none());
        assert!(!orchestrator.is_busy());
        let events = drain(&mut rx);
        assert!(events
            .iter()
            .any(|e| matches!(e, Event::Advisory { .. })));
        assert!(events.contains(&Event::SessionEnded { success: false }));
    }

    #[tokio::test]
    async fn test_probe_nonzero_exit_keeps_capabilities_unset() {
        let (mut orchestrator, _) = orchestrator_with(vec![ScriptedRun {
            chunks: vec![],
            code: 1,
        }]);

        orchestrator.probe_capabilities().await.unwrap();

        assert!(orchestrator.capabilities().is_none());
        assert!(!orchestrator.is_busy());
    }

    #[tokio::test]
    async fn test_create_refused_without_capabilities() {
        let (launcher, launches, _) = ScriptedLauncher::new(vec![]);
        let mut orchestrator =
            Orchestrator::new("/opt/tools/cmake").with_launcher(Box::new(launcher));
        let sdk = tempfile::tempdir().unwrap();

        let result = orchestrator.create_project(&project_spec(sdk.path())).await;

        assert!(matches!(result, Err(OrchestratorError::ToolNotInstalled)));
        assert_eq!(launches.load(Ordering::SeqCst), 0);
        assert!(!orchestrator.is_busy());
    }

    #[tokio::test]
    async fn test_create_runs_full_chain() {
        let (launcher, launches, seen_args) = ScriptedLauncher::new(vec![
            probe_run(),
            ScriptedRun {
                chunks: vec!["ab", "cd"],
                code: 0,
            },
            ScriptedRun {
                chunks: vec!["-- Configuring done\n"],
                code: 0,
            },
            ScriptedRun {
                chunks: vec![],
                code: 0,
            },
        ]);
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let mut orchestrator = Orchestrator::new("/opt/tools/cmake")
            .with_launcher(Box::new(launcher))
            .with_event_bus(bus);
        let sdk = tempfile::tempdir().unwrap();

        orchestrator.probe_capabilities().await.unwrap();
        orchestrator
            .create_project(&project_spec(sdk.path()))
            .await
            .unwrap();

        assert_eq!(launches.load(Ordering::SeqCst), 4);
        assert!(!orchestrator.is_busy());

        // The generate step's chunks arrive in order, then the step
        // finishes cleanly and the chain advances.
        let events = drain(&mut rx);
        let ab = events
            .iter()
            .position(|e| *e == Event::OutputChunk { text: "ab".to_string() })
            .unwrap();
        let cd = events
            .iter()
            .position(|e| *e == Event::OutputChunk { text: "cd".to_string() })
            .unwrap();
        let generate_done = events
            .iter()
            .position(|e| {
                *e == Event::StepFinished {
                    step: "generating".to_string(),
                    code: 0,
                }
            })
            .unwrap();
        let configure_started = events
            .iter()
            .position(|e| {
                *e == Event::StepStarted {
                    step: "configuring".to_string(),
                }
            })
            .unwrap();
        assert!(ab < cd && cd < generate_done && generate_done < configure_started);
        assert_eq!(events.last(), Some(&Event::SessionEnded { success: true }));

        // Invocation shapes: probe, generate, configure, open.
        let seen = seen_args.lock().unwrap();
        assert_eq!(seen[0], "-E capabilities");
        assert!(seen[1].contains("-DFORGE_PLUGIN_NAME=Super Delay"));
        assert!(seen[1].contains("-DFORGE_PROJECT_NAME=Super_Delay"));
        assert!(seen[1].contains("-P /tmp/GeneratePlugin.cmake"));
        assert!(seen[2].starts_with("-GNinja"));
        assert!(seen[2].contains("-S"));
        assert!(seen[2].contains("-B"));
        assert!(seen[3].starts_with("--open"));

        assert!(orchestrator.log().contains("abcd"));
    }

    #[tokio::test]
    async fn test_create_halts_on_generate_failure() {
        let (launcher, launches, _) = ScriptedLauncher::new(vec![
            probe_run(),
            ScriptedRun {
                chunks: vec![],
                code: 1,
            },
        ]);
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let mut orchestrator = Orchestrator::new("/opt/tools/cmake")
            .with_launcher(Box::new(launcher))
            .with_event_bus(bus);
        let sdk = tempfile::tempdir().unwrap();

        orchestrator.probe_capabilities().await.unwrap();
        let result = orchestrator.create_project(&project_spec(sdk.path())).await;

        assert!(matches!(
            result,
            Err(OrchestratorError::StepFailed {
                step: SessionState::Generating,
                code: 1,
            })
        ));
        // Probe plus the failed generate step; configure never ran.
        assert_eq!(launches.load(Ordering::SeqCst), 2);
        assert!(!orchestrator.is_busy());

        let events = drain(&mut rx);
        assert_eq!(events.last(), Some(&Event::SessionEnded { success: false }));
        assert!(!events
            .iter()
            .any(|e| e.step() == Some("configuring")));
    }

    #[tokio::test]
    async fn test_open_step_failure_is_ignored() {
        let (launcher, _, _) = ScriptedLauncher::new(vec![
            probe_run(),
            ScriptedRun { chunks: vec![], code: 0 },
            ScriptedRun { chunks: vec![], code: 0 },
            ScriptedRun { chunks: vec![], code: 3 },
        ]);
        let mut orchestrator =
            Orchestrator::new("/opt/tools/cmake").with_launcher(Box::new(launcher));
        let sdk = tempfile::tempdir().unwrap();

        orchestrator.probe_capabilities().await.unwrap();
        let result = orchestrator.create_project(&project_spec(sdk.path())).await;

        assert!(result.is_ok());
        assert!(!orchestrator.is_busy());
    }

    #[tokio::test]
    async fn test_busy_session_rejects_new_steps() {
        let (mut orchestrator, launches) = orchestrator_with(vec![]);
        orchestrator.force_state(SessionState::Generating);
        let sdk = tempfile::tempdir().unwrap();

        let probe = orchestrator.probe_capabilities().await;
        assert!(matches!(probe, Err(OrchestratorError::Busy)));

        let create = orchestrator.create_project(&project_spec(sdk.path())).await;
        assert!(matches!(create, Err(OrchestratorError::Busy)));

        assert_eq!(launches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_selected_generator_is_used() {
        let (launcher, _, seen_args) = ScriptedLauncher::new(vec![
            probe_run(),
            ScriptedRun { chunks: vec![], code: 0 },
            ScriptedRun { chunks: vec![], code: 0 },
            ScriptedRun { chunks: vec![], code: 0 },
        ]);
        let mut orchestrator =
            Orchestrator::new("/opt/tools/cmake").with_launcher(Box::new(launcher));
        let sdk = tempfile::tempdir().unwrap();

        orchestrator.probe_capabilities().await.unwrap();
        orchestrator.select_generator("Unix Makefiles");
        orchestrator
            .create_project(&project_spec(sdk.path()))
            .await
            .unwrap();

        let seen = seen_args.lock().unwrap();
        assert!(seen[2].starts_with("-GUnix Makefiles"));
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_spec_without_spawning() {
        let (launcher, launches, _) = ScriptedLauncher::new(vec![probe_run()]);
        let mut orchestrator =
            Orchestrator::new("/opt/tools/cmake").with_launcher(Box::new(launcher));
        let sdk = tempfile::tempdir().unwrap();

        orchestrator.probe_capabilities().await.unwrap();

        let mut spec = project_spec(sdk.path());
        spec.plugin_name.clear();
        let result = orchestrator.create_project(&spec).await;

        assert!(matches!(result, Err(OrchestratorError::InvalidSpec(_))));
        assert_eq!(launches.load(Ordering::SeqCst), 1);
    }
}
