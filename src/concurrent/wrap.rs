//! Task wrapping: carrying a context across a submission boundary.
//!
//! A wrapped task captures the submitter's ambient context through its
//! [`TaskState`] and re-attaches it on the executing thread, tearing the
//! scope down on every exit path including unwinding. Wrapping is idempotent
//! both ways: a wrapper is never wrapped again, and wrapping the same task
//! twice yields the same wrapper instance.

use super::call_depth::CallDepthGuard;
use super::executors::ExecutorRegistry;
use super::state::TaskState;
use super::state_table::StateTable;
use crate::context::Context;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

const SUBMIT_SCOPE: &str = "executor.submit";

/// A unit of work handed to an executor.
pub trait Task: Send + Sync + 'static {
    /// Runs the task.
    fn run(&self);

    /// Returns the wrapper view of this task, when it is one.
    fn as_traced(&self) -> Option<&TracedTask> {
        None
    }
}

struct TaskFn<F: Fn() + Send + Sync + 'static>(F);

impl<F: Fn() + Send + Sync + 'static> Task for TaskFn<F> {
    fn run(&self) {
        (self.0)();
    }
}

/// Adapts a closure into a shareable [`Task`].
#[must_use]
pub fn task(run: impl Fn() + Send + Sync + 'static) -> Arc<dyn Task> {
    Arc::new(TaskFn(run))
}

/// A unit of work producing a value.
pub trait Call: Send + Sync + 'static {
    /// The produced value.
    type Output;

    /// Runs the call.
    fn call(&self) -> Self::Output;

    /// Returns true when this call is already a wrapper.
    fn is_traced(&self) -> bool {
        false
    }
}

struct CallFn<F: Fn() -> T + Send + Sync + 'static, T>(F);

impl<F: Fn() -> T + Send + Sync + 'static, T: 'static> Call for CallFn<F, T> {
    type Output = T;

    fn call(&self) -> T {
        (self.0)()
    }
}

/// Adapts a closure into a shareable [`Call`].
#[must_use]
pub fn call<T: 'static>(
    run: impl Fn() -> T + Send + Sync + 'static,
) -> Arc<dyn Call<Output = T>> {
    Arc::new(CallFn(run))
}

/// A task running under its submitter's captured context.
pub struct TracedTask {
    inner: Arc<dyn Task>,
    state: Arc<TaskState>,
}

impl TracedTask {
    /// Returns the wrapped task.
    #[must_use]
    pub fn inner(&self) -> &Arc<dyn Task> {
        &self.inner
    }

    /// Returns the capture state the wrapper consumes from.
    #[must_use]
    pub fn state(&self) -> &Arc<TaskState> {
        &self.state
    }
}

impl Task for TracedTask {
    fn run(&self) {
        match self.state.consume() {
            Some(parent) => {
                let _scope = parent.attach();
                self.inner.run();
            }
            None => self.inner.run(),
        }
    }

    fn as_traced(&self) -> Option<&TracedTask> {
        Some(self)
    }
}

impl fmt::Debug for TracedTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TracedTask")
            .field("state", &self.state)
            .finish()
    }
}

/// A call running under its submitter's captured context.
pub struct TracedCall<T> {
    inner: Arc<dyn Call<Output = T>>,
    state: Arc<TaskState>,
}

impl<T: 'static> Call for TracedCall<T> {
    type Output = T;

    fn call(&self) -> T {
        match self.state.consume() {
            Some(parent) => {
                let _scope = parent.attach();
                self.inner.call()
            }
            None => self.inner.call(),
        }
    }

    fn is_traced(&self) -> bool {
        true
    }
}

impl<T> fmt::Debug for TracedCall<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TracedCall")
            .field("state", &self.state)
            .finish()
    }
}

/// Wires capture, wrapping and cleanup around executor submissions.
pub struct TaskPropagator {
    states: Arc<StateTable<dyn Task>>,
    executors: Arc<ExecutorRegistry>,
    wrappers: Mutex<HashMap<usize, Weak<TracedTask>>>,
}

impl TaskPropagator {
    /// Creates a propagator over the shared state table and executor rules.
    #[must_use]
    pub fn new(states: Arc<StateTable<dyn Task>>, executors: Arc<ExecutorRegistry>) -> Self {
        Self {
            states,
            executors,
            wrappers: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the executor rules this propagator consults.
    #[must_use]
    pub fn executors(&self) -> &Arc<ExecutorRegistry> {
        &self.executors
    }

    /// Returns the shared state table.
    #[must_use]
    pub fn states(&self) -> &Arc<StateTable<dyn Task>> {
        &self.states
    }

    /// Decides whether a submission to the named executor should capture
    /// the ambient context for this task.
    ///
    /// Capture is skipped for tasks that already are wrappers, for denied
    /// executors, and when the ambient context is the root and so carries
    /// nothing worth propagating.
    #[must_use]
    pub fn should_attach_state_to_task(&self, executor_name: &str, task: &Arc<dyn Task>) -> bool {
        if task.as_traced().is_some() {
            return false;
        }
        if !self.executors.permits_name(executor_name) {
            tracing::debug!(executor_name, "executor excluded, not capturing context");
            return false;
        }
        !Context::current().is_root()
    }

    /// Instance-aware variant of [`should_attach_state_to_task`]: an
    /// executor that opted out through
    /// [`ExecutorRegistry::disable_executor_for_wrapped_tasks`] never
    /// captures, whatever its type name permits.
    ///
    /// [`should_attach_state_to_task`]: Self::should_attach_state_to_task
    #[must_use]
    pub fn should_attach_state_to_task_for<E: std::any::Any + Send + Sync>(
        &self,
        executor: &Arc<E>,
        executor_name: &str,
        task: &Arc<dyn Task>,
    ) -> bool {
        if self.executors.is_instance_disabled(executor) {
            tracing::debug!(executor_name, "executor instance opted out, not capturing context");
            return false;
        }
        self.should_attach_state_to_task(executor_name, task)
    }

    /// Returns the task's wrapper, creating it on first use.
    ///
    /// A wrapper passed in is returned unchanged; the same inner task always
    /// yields the same wrapper while that wrapper is alive.
    #[must_use]
    pub fn wrap_if_needed(&self, task: &Arc<dyn Task>) -> Arc<dyn Task> {
        if task.as_traced().is_some() {
            return Arc::clone(task);
        }
        let key = Arc::as_ptr(task).cast::<()>() as usize;
        let mut wrappers = self.wrappers.lock();
        if let Some(existing) = wrappers.get(&key).and_then(Weak::upgrade) {
            if Arc::as_ptr(&existing.inner).cast::<()>() == Arc::as_ptr(task).cast::<()>() {
                return existing;
            }
        }
        let wrapper = Arc::new(TracedTask {
            inner: Arc::clone(task),
            state: self.states.state_of(task),
        });
        wrappers.insert(key, Arc::downgrade(&wrapper));
        wrapper
    }

    /// Cancels the task's pending capture after a failed submission.
    ///
    /// When this submission skipped its own attach because state was already
    /// present, the cancel can hit a concurrent submitter's capture instead;
    /// that submission's work then runs without an attached context.
    pub fn clean_up_on_submit_exit(&self, task: &Arc<dyn Task>) {
        if let Some(state) = self.states.existing_state(task) {
            state.cancel();
        }
    }

    /// Runs one submission end to end: capture, wrap, submit, and cleanup
    /// when the submission itself fails.
    ///
    /// Nested submissions on the same thread, as executors delegating to
    /// themselves produce, skip capture and wrapping.
    pub fn submit_with<R, E>(
        &self,
        executor_name: &str,
        task: &Arc<dyn Task>,
        submit: impl FnOnce(Arc<dyn Task>) -> Result<R, E>,
    ) -> Result<R, E> {
        let depth = CallDepthGuard::enter(SUBMIT_SCOPE);
        let to_submit =
            if depth.is_top_level() && self.should_attach_state_to_task(executor_name, task) {
                self.states.state_of(task).attach_parent(Context::current());
                self.wrap_if_needed(task)
            } else {
                Arc::clone(task)
            };
        let result = submit(to_submit);
        if result.is_err() {
            self.clean_up_on_submit_exit(task);
        }
        result
    }

    /// Wraps a value-producing call, capturing the ambient context now.
    ///
    /// Already-wrapped calls, denied executors and a root ambient context
    /// all leave the call untouched.
    #[must_use]
    pub fn wrap_call_if_needed<T: 'static>(
        &self,
        executor_name: &str,
        call: &Arc<dyn Call<Output = T>>,
    ) -> Arc<dyn Call<Output = T>> {
        if call.is_traced()
            || !self.executors.permits_name(executor_name)
            || Context::current().is_root()
        {
            return Arc::clone(call);
        }
        let state = Arc::new(TaskState::new());
        state.attach_parent(Context::current());
        Arc::new(TracedCall {
            inner: Arc::clone(call),
            state,
        })
    }

    /// Prepares a completion callback.
    ///
    /// A callback on an already-completed stage runs inline under the
    /// caller's ambient context and needs no capture; a pending stage's
    /// callback is wrapped like any other task.
    #[must_use]
    pub fn on_completion_callback(
        &self,
        already_completed: bool,
        callback: &Arc<dyn Task>,
    ) -> Arc<dyn Task> {
        if already_completed || Context::current().is_root() {
            return Arc::clone(callback);
        }
        self.states
            .state_of(callback)
            .attach_parent(Context::current());
        self.wrap_if_needed(callback)
    }
}

impl fmt::Debug for TaskPropagator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskPropagator")
            .field("states", &self.states)
            .field("executors", &self.executors)
            .field("wrappers", &self.wrappers.lock().len())
            .finish()
    }
}
