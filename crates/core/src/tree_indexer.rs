//! The per-tree, per-plugin build lifecycle.
//!
//! An orchestrator drives each [`TreeIndexer`] through
//! `EnvSetup -> PreBuild -> Build -> PostBuild -> Done`, running the external
//! compilation between the `Build` checkpoint and `PostBuild`.

use crate::error::IndexError;
use crate::file_index::FileIndexerFactory;
use crate::plugins::{Environment, TreePlugin};
use crate::tree::TreeConfig;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    EnvSetup,
    PreBuild,
    Build,
    PostBuild,
    Done,
}

impl Phase {
    fn next(self) -> Phase {
        match self {
            Phase::EnvSetup => Phase::PreBuild,
            Phase::PreBuild => Phase::Build,
            Phase::Build => Phase::PostBuild,
            Phase::PostBuild | Phase::Done => Phase::Done,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::EnvSetup => "env-setup",
            Phase::PreBuild => "pre-build",
            Phase::Build => "build",
            Phase::PostBuild => "post-build",
            Phase::Done => "done",
        };
        f.write_str(name)
    }
}

/// What the orchestrator hands to a phase.
#[derive(Debug, Clone)]
pub enum PhaseInput {
    /// Environment accumulated so far (from the process and earlier plugins).
    EnvSetup(Environment),
    PreBuild,
    Build,
    PostBuild,
}

impl PhaseInput {
    pub fn phase(&self) -> Phase {
        match self {
            PhaseInput::EnvSetup(_) => Phase::EnvSetup,
            PhaseInput::PreBuild => Phase::PreBuild,
            PhaseInput::Build => Phase::Build,
            PhaseInput::PostBuild => Phase::PostBuild,
        }
    }
}

/// What a phase hands back.
pub enum PhaseOutput {
    Environment(Environment),
    /// Nothing to do; resume at the next checkpoint.
    Waiting,
    Ready(Arc<dyn FileIndexerFactory>),
}

impl fmt::Debug for PhaseOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PhaseOutput::Environment(env) => f.debug_tuple("Environment").field(env).finish(),
            PhaseOutput::Waiting => f.write_str("Waiting"),
            PhaseOutput::Ready(_) => f.write_str("Ready(..)"),
        }
    }
}

/// State machine binding one plugin to one tree for one build.
pub struct TreeIndexer {
    plugin: Arc<dyn TreePlugin>,
    tree: Arc<TreeConfig>,
    phase: Phase,
}

impl TreeIndexer {
    pub fn new(plugin: Arc<dyn TreePlugin>, tree: Arc<TreeConfig>) -> Self {
        Self {
            plugin,
            tree,
            phase: Phase::EnvSetup,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn plugin_name(&self) -> &'static str {
        self.plugin.name()
    }

    /// Run the current phase. Inputs for any other phase are rejected, and a
    /// failed phase ends the run.
    pub fn resume(&mut self, input: PhaseInput) -> Result<PhaseOutput, IndexError> {
        if input.phase() != self.phase {
            return Err(IndexError::BuildEnvironment(format!(
                "{} plugin expected {} input but got {}",
                self.plugin.name(),
                self.phase,
                input.phase()
            )));
        }
        debug!("{}: running {} for {}", self.plugin.name(), self.phase, self.tree.name);

        let result = match input {
            PhaseInput::EnvSetup(vars) => self
                .plugin
                .env_setup(&self.tree, vars)
                .map(PhaseOutput::Environment),
            PhaseInput::PreBuild | PhaseInput::Build => Ok(PhaseOutput::Waiting),
            PhaseInput::PostBuild => self.plugin.post_build(&self.tree).map(PhaseOutput::Ready),
        };

        self.phase = match result {
            Ok(_) => self.phase.next(),
            Err(_) => Phase::Done,
        };
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::CorePlugin;
    use std::path::PathBuf;

    fn tree() -> Arc<TreeConfig> {
        Arc::new(TreeConfig {
            name: "t".into(),
            description: String::new(),
            source_folder: PathBuf::from("/src"),
            object_folder: PathBuf::from("/obj"),
            temp_folder: PathBuf::from("/tmp/t"),
            plugin_folder: PathBuf::new(),
            enabled_plugins: vec![],
            build_command: None,
            ignore_patterns: vec![],
        })
    }

    #[test]
    fn test_full_cycle() {
        let mut indexer = TreeIndexer::new(Arc::new(CorePlugin), tree());
        let mut vars = Environment::new();
        vars.insert("A".into(), "1".into());

        match indexer.resume(PhaseInput::EnvSetup(vars)).unwrap() {
            PhaseOutput::Environment(env) => assert_eq!(env["A"], "1"),
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(indexer.resume(PhaseInput::PreBuild).unwrap(), PhaseOutput::Waiting));
        assert!(matches!(indexer.resume(PhaseInput::Build).unwrap(), PhaseOutput::Waiting));
        assert!(matches!(indexer.resume(PhaseInput::PostBuild).unwrap(), PhaseOutput::Ready(_)));
        assert_eq!(indexer.phase(), Phase::Done);
    }

    #[test]
    fn test_phases_cannot_be_skipped() {
        let mut indexer = TreeIndexer::new(Arc::new(CorePlugin), tree());
        let err = indexer.resume(PhaseInput::Build).unwrap_err();
        assert!(err.to_string().contains("expected env-setup"));
        assert_eq!(indexer.phase(), Phase::EnvSetup);
    }

    #[test]
    fn test_phases_cannot_be_repeated() {
        let mut indexer = TreeIndexer::new(Arc::new(CorePlugin), tree());
        indexer.resume(PhaseInput::EnvSetup(Environment::new())).unwrap();
        assert!(indexer.resume(PhaseInput::EnvSetup(Environment::new())).is_err());
    }

    #[test]
    fn test_done_rejects_everything() {
        let mut indexer = TreeIndexer::new(Arc::new(CorePlugin), tree());
        indexer.resume(PhaseInput::EnvSetup(Environment::new())).unwrap();
        indexer.resume(PhaseInput::PreBuild).unwrap();
        indexer.resume(PhaseInput::Build).unwrap();
        indexer.resume(PhaseInput::PostBuild).unwrap();
        assert!(indexer.resume(PhaseInput::PostBuild).is_err());
    }
}
