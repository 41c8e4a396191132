//! Status reported back to the task scheduler.

use crate::mesh_error::MeshError;

/// Result of one task invocation. `Incomplete` means "call me again".
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    Complete,
    Incomplete,
    Fail,
}

impl TaskStatus {
    /// Collapse a fallible step into a scheduler status, logging the error.
    pub fn from_result(res: Result<TaskStatus, MeshError>) -> TaskStatus {
        match res {
            Ok(s) => s,
            Err(e) => {
                log::error!("halo task failed: {e}");
                TaskStatus::Fail
            }
        }
    }

    #[inline]
    pub fn is_complete(self) -> bool {
        self == TaskStatus::Complete
    }

    /// `Complete` only if both are.
    pub fn and(self, other: TaskStatus) -> TaskStatus {
        match (self, other) {
            (TaskStatus::Fail, _) | (_, TaskStatus::Fail) => TaskStatus::Fail,
            (TaskStatus::Complete, TaskStatus::Complete) => TaskStatus::Complete,
            _ => TaskStatus::Incomplete,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_become_fail() {
        let st = TaskStatus::from_result(Err(MeshError::InvariantViolation("x".into())));
        assert_eq!(st, TaskStatus::Fail);
        assert_eq!(TaskStatus::from_result(Ok(TaskStatus::Incomplete)), TaskStatus::Incomplete);
    }

    #[test]
    fn and_combines() {
        use TaskStatus::*;
        assert_eq!(Complete.and(Complete), Complete);
        assert_eq!(Complete.and(Incomplete), Incomplete);
        assert_eq!(Incomplete.and(Fail), Fail);
    }
}
