//! Context propagation across executor and async boundaries.
//!
//! The pieces compose around one flow: at submission the ambient context is
//! captured into a [`TaskState`], associated with the task through the weak
//! identity-keyed [`StateTable`], and the task is wrapped so the context is
//! re-attached on whichever thread eventually runs it. The
//! [`ExecutorRegistry`] decides which executors take part, and the
//! [`CallDepthGuard`] keeps nested submission calls inside an executor from
//! capturing twice.

pub mod call_depth;
pub mod executors;
pub mod state;
pub mod state_table;
pub mod wrap;

pub use call_depth::CallDepthGuard;
pub use executors::ExecutorRegistry;
pub use state::TaskState;
pub use state_table::StateTable;
pub use wrap::{call, task, Call, Task, TaskPropagator, TracedCall, TracedTask};
