//! Exit status codes for the CLI
//!
//! - 0: every executed test case passed
//! - 1: configuration, argument or I/O error before or during a run
//! - 10: the suite ran but at least one case failed
//! - 130: user interrupted (Ctrl+C, standard SIGINT exit code)

use std::process::{ExitCode, Termination};

/// Exit status codes following standard Unix conventions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitStatus {
    Success = 0,
    Error = 1,
    /// One or more test cases failed
    TestsFailed = 10,
    /// User interrupted (Ctrl+C) - standard SIGINT code
    Interrupted = 130,
}

impl From<ExitStatus> for ExitCode {
    fn from(status: ExitStatus) -> Self {
        ExitCode::from(status as u8)
    }
}

impl Termination for ExitStatus {
    fn report(self) -> ExitCode {
        ExitCode::from(self as u8)
    }
}

impl ExitStatus {
    /// Status for a finished suite run
    pub fn from_outcome(all_passed: bool, interrupted: bool) -> Self {
        if interrupted {
            ExitStatus::Interrupted
        } else if all_passed {
            ExitStatus::Success
        } else {
            ExitStatus::TestsFailed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_outcome() {
        assert_eq!(ExitStatus::from_outcome(true, false), ExitStatus::Success);
        assert_eq!(ExitStatus::from_outcome(false, false), ExitStatus::TestsFailed);
        assert_eq!(ExitStatus::from_outcome(true, true), ExitStatus::Interrupted);
        assert_eq!(ExitStatus::TestsFailed as u8, 10);
    }
}
