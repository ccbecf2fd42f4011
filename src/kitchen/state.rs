// src/kitchen/state.rs

//! Pipeline stages and run state

use std::fmt;

/// A pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Fetch,
    Verify,
    Build,
    Install,
    PostVerify,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fetch => "fetch",
            Self::Verify => "verify",
            Self::Build => "build",
            Self::Install => "install",
            Self::PostVerify => "post-verify",
        }
    }

    /// State reached when this stage succeeds
    pub fn completed_state(&self) -> PipelineState {
        match self {
            Self::Fetch => PipelineState::Fetched,
            Self::Verify => PipelineState::Verified,
            Self::Build => PipelineState::Built,
            Self::Install => PipelineState::Installed,
            Self::PostVerify => PipelineState::PostVerified,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a run currently stands
///
/// ```text
/// Pending -> Fetched -> Verified -> Built -> Installed -> PostVerified -> Done
///    \_________\___________\__________\_________\______________\__> Failed
/// ```
///
/// `Done` and `Failed` are terminal. Nothing is retried automatically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineState {
    Pending,
    Fetched,
    Verified,
    Built,
    Installed,
    PostVerified,
    Done,
    Failed { stage: Stage, cause: String },
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed { .. })
    }

    /// The stage that runs next from this state
    pub fn next_stage(&self) -> Option<Stage> {
        match self {
            Self::Pending => Some(Stage::Fetch),
            Self::Fetched => Some(Stage::Verify),
            Self::Verified => Some(Stage::Build),
            Self::Built => Some(Stage::Install),
            Self::Installed => Some(Stage::PostVerify),
            Self::PostVerified | Self::Done | Self::Failed { .. } => None,
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Fetched => write!(f, "fetched"),
            Self::Verified => write!(f, "verified"),
            Self::Built => write!(f, "built"),
            Self::Installed => write!(f, "installed"),
            Self::PostVerified => write!(f, "post-verified"),
            Self::Done => write!(f, "done"),
            Self::Failed { stage, cause } => write!(f, "failed at {stage}: {cause}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_order() {
        let mut state = PipelineState::Pending;
        let mut visited = Vec::new();
        while let Some(stage) = state.next_stage() {
            visited.push(stage);
            state = stage.completed_state();
        }
        assert_eq!(
            visited,
            vec![
                Stage::Fetch,
                Stage::Verify,
                Stage::Build,
                Stage::Install,
                Stage::PostVerify
            ]
        );
        assert_eq!(state, PipelineState::PostVerified);
    }

    #[test]
    fn test_terminal_states() {
        assert!(PipelineState::Done.is_terminal());
        let failed = PipelineState::Failed {
            stage: Stage::Build,
            cause: "exit 1".to_string(),
        };
        assert!(failed.is_terminal());
        assert_eq!(failed.next_stage(), None);
        assert!(!PipelineState::Built.is_terminal());
    }
}
