//! Status mappings between the domain enums and SMALLINT columns.
//!
//! Ids are 1-based and must match the order documented in the `jobs`
//! migration; they are storage identifiers, not wire format (the wire
//! format is the serde snake_case rendering in `restack-core`).

use restack_core::job::JobStatus;
use restack_core::plan::TaskStatus;

/// Status ID type matching SMALLINT in the database.
pub type StatusId = i16;

macro_rules! define_status_map {
    (
        $(#[$meta:meta])*
        $enum_ty:ty, $to_fn:ident, $from_fn:ident {
            $( $variant:path = $val:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        pub fn $to_fn(status: $enum_ty) -> StatusId {
            match status {
                $( $variant => $val ),+
            }
        }

        /// Inverse mapping. Returns `None` for ids outside the seed range.
        pub fn $from_fn(id: StatusId) -> Option<$enum_ty> {
            match id {
                $( $val => Some($variant), )+
                _ => None,
            }
        }
    };
}

define_status_map! {
    /// Job status to its storage id.
    JobStatus, job_status_id, job_status_from_id {
        JobStatus::Pending = 1,
        JobStatus::Running = 2,
        JobStatus::Paused = 3,
        JobStatus::Completed = 4,
        JobStatus::Failed = 5,
        JobStatus::Cancelled = 6,
    }
}

define_status_map! {
    /// Task status to its storage id.
    TaskStatus, task_status_id, task_status_from_id {
        TaskStatus::Pending = 1,
        TaskStatus::Running = 2,
        TaskStatus::Completed = 3,
        TaskStatus::Failed = 4,
        TaskStatus::Skipped = 5,
    }
}
