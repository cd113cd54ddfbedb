//! Structural type matching for instrumentation targets.
//!
//! Types are described structurally before any concrete representation is
//! loaded: a [`TypeDescription`] carries the name, supertype chain, interfaces
//! and declared methods, and a [`MethodDescription`] carries one method's
//! shape. [`Predicate`]s compose over these descriptions with AND/OR/NOT and
//! are evaluated at most once per distinct (loader, type) pair through the
//! [`MatchCache`].
//!
//! Matching is conservative on failure. An unresolvable supertype reference
//! is skipped, never an error, and [`Predicate::fail_safe`] converts a
//! panicking predicate into "no match".

pub mod cache;
pub mod description;
pub mod predicate;

pub use cache::{LoaderId, MatchCache};
pub use description::{MethodDescription, TypeDescription, TypeRef, Visibility};
pub use predicate::{
    declares_method, extends_type, is_interface, name_matches, name_starts_with, named, returns,
    takes_argument, Named, Predicate,
};
