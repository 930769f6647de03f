use std::fmt;

use tracing::warn;
use vds_core::ProtocolChecks;

/// Protocol phase, tracked only to validate call order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ProtocolState {
    #[default]
    Idle,
    Begun,
    Prepared,
    Gles,
    GlesDone,
    Hwc,
}

impl ProtocolState {
    pub fn name(self) -> &'static str {
        match self {
            ProtocolState::Idle => "IDLE",
            ProtocolState::Begun => "BEGUN",
            ProtocolState::Prepared => "PREPARED",
            ProtocolState::Gles => "GLES",
            ProtocolState::GlesDone => "GLES_DONE",
            ProtocolState::Hwc => "HWC",
        }
    }
}

impl fmt::Display for ProtocolState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Call-order checker. Upstream drivers do not always call in order (e.g. on sink loss), so
/// under `ProtocolChecks::Warn` a violation is logged and counted and the call proceeds.
#[derive(Debug)]
pub struct ProtocolChecker {
    state: ProtocolState,
    checks: ProtocolChecks,
    violations: u64,
}

impl ProtocolChecker {
    pub fn new(checks: ProtocolChecks) -> Self {
        Self {
            state: ProtocolState::Idle,
            checks,
            violations: 0,
        }
    }

    pub fn state(&self) -> ProtocolState {
        self.state
    }

    pub fn violations(&self) -> u64 {
        self.violations
    }

    /// Checks that `op` is called in `expected`. `detail` is appended to the report.
    pub fn expect(&mut self, name: &str, op: &str, expected: ProtocolState, detail: &str) {
        if self.state == expected {
            return;
        }
        self.violations += 1;
        match self.checks {
            ProtocolChecks::Warn => warn!(
                display = name,
                op,
                state = %self.state,
                expected = %expected,
                "unexpected {op}(){detail} in {} state",
                self.state
            ),
            ProtocolChecks::Abort => panic!(
                "[{name}] unexpected {op}(){detail} in {} state (expected {expected})",
                self.state
            ),
        }
    }

    pub fn enter(&mut self, state: ProtocolState) {
        self.state = state;
    }
}
