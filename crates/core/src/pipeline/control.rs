use crossbeam_channel::{Receiver, Sender};

/// User intent delivered to the control loop between frames.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControlCommand {
    /// Fetch the next frame while in single-step mode.
    Advance,
    /// Switch between continuous and single-step mode.
    ToggleMode,
    ToggleOverlay,
    Quit,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunMode {
    Continuous,
    SingleStep,
}

impl RunMode {
    pub fn toggled(self) -> Self {
        match self {
            RunMode::Continuous => RunMode::SingleStep,
            RunMode::SingleStep => RunMode::Continuous,
        }
    }
}

/// Sending half, handed to whatever produces user input (keyboard, tests).
#[derive(Clone, Debug)]
pub struct ControlHandle {
    tx: Sender<ControlCommand>,
}

impl ControlHandle {
    /// Returns `false` once the pipeline has gone away.
    pub fn send(&self, command: ControlCommand) -> bool {
        self.tx.send(command).is_ok()
    }
}

/// Receiving half, owned by the orchestrator.
#[derive(Debug)]
pub struct PipelineControl {
    rx: Receiver<ControlCommand>,
}

impl PipelineControl {
    pub fn channel() -> (ControlHandle, PipelineControl) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (ControlHandle { tx }, PipelineControl { rx })
    }

    /// Commands received so far, oldest first. Never blocks.
    pub fn drain(&self) -> impl Iterator<Item = ControlCommand> + '_ {
        self.rx.try_iter()
    }
}
