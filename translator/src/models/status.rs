use super::state::LifecycleState;

/// Observable lifecycle snapshot - computed by the manager, never stored on disk.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LifecycleStatus {
    /// Is the model loaded in the runtime?
    pub loaded: bool,
    /// Is a prepare attempt in flight?
    pub preparing: bool,
    /// Download fraction in [0, 1], `None` when idle or the size is unknown
    pub download_progress: Option<f64>,
    pub state: LifecycleState,
}

impl LifecycleStatus {
    pub fn is_ready(&self) -> bool {
        self.state == LifecycleState::Ready
    }
}
