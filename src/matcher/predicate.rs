//! Composable boolean predicates over structural descriptions.
//!
//! Predicates are pure and side-effect-free. Combinators build new predicates
//! without evaluating anything; evaluation happens in [`Predicate::matches`].
//! The hierarchy walk in [`extends_type`] skips subtrees it cannot resolve
//! and keeps searching elsewhere, and [`Predicate::fail_safe`] turns a panic
//! inside a predicate into "no match".

use super::description::{MethodDescription, TypeDescription, TypeRef};
use std::collections::HashSet;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// Anything with a matchable name.
pub trait Named {
    /// Returns the name predicates match against.
    fn name(&self) -> &str;
}

impl Named for TypeDescription {
    fn name(&self) -> &str {
        Self::name(self)
    }
}

impl Named for MethodDescription {
    fn name(&self) -> &str {
        Self::name(self)
    }
}

/// A boolean predicate over a description.
pub struct Predicate<T: ?Sized> {
    label: String,
    test: Arc<dyn Fn(&T) -> bool + Send + Sync>,
}

impl<T: ?Sized> Clone for Predicate<T> {
    fn clone(&self) -> Self {
        Self {
            label: self.label.clone(),
            test: Arc::clone(&self.test),
        }
    }
}

impl<T: ?Sized> fmt::Debug for Predicate<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Predicate({})", self.label)
    }
}

impl<T: ?Sized + 'static> Predicate<T> {
    /// Creates a predicate from a label and a test function.
    pub fn new(
        label: impl Into<String>,
        test: impl Fn(&T) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            label: label.into(),
            test: Arc::new(test),
        }
    }

    /// A predicate that matches everything.
    #[must_use]
    pub fn any() -> Self {
        Self::new("any", |_| true)
    }

    /// A predicate that matches nothing.
    #[must_use]
    pub fn none() -> Self {
        Self::new("none", |_| false)
    }

    /// Evaluates the predicate.
    #[must_use]
    pub fn matches(&self, value: &T) -> bool {
        (self.test)(value)
    }

    /// Returns the diagnostic label.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Both predicates must match.
    #[must_use]
    pub fn and(self, other: Self) -> Self {
        let label = format!("({} && {})", self.label, other.label);
        Self::new(label, move |value| {
            self.matches(value) && other.matches(value)
        })
    }

    /// Either predicate may match.
    #[must_use]
    pub fn or(self, other: Self) -> Self {
        let label = format!("({} || {})", self.label, other.label);
        Self::new(label, move |value| {
            self.matches(value) || other.matches(value)
        })
    }

    /// Inverts the predicate.
    #[must_use]
    pub fn not(self) -> Self {
        let label = format!("!{}", self.label);
        Self::new(label, move |value| !self.matches(value))
    }

    /// Converts a panic inside the predicate into "no match".
    #[must_use]
    pub fn fail_safe(self) -> Self {
        let label = format!("fail_safe({})", self.label);
        let inner_label = self.label.clone();
        Self::new(label, move |value| {
            panic::catch_unwind(AssertUnwindSafe(|| self.matches(value))).unwrap_or_else(|_| {
                tracing::debug!(predicate = %inner_label, "predicate panicked, treating as no match");
                false
            })
        })
    }
}

/// Matches a description whose name equals `name`.
#[must_use]
pub fn named<T: Named + ?Sized + 'static>(name: impl Into<String>) -> Predicate<T> {
    let name = name.into();
    Predicate::new(format!("named({name})"), move |value: &T| {
        value.name() == name
    })
}

/// Matches a description whose name starts with `prefix`.
#[must_use]
pub fn name_starts_with<T: Named + ?Sized + 'static>(prefix: impl Into<String>) -> Predicate<T> {
    let prefix = prefix.into();
    Predicate::new(format!("name_starts_with({prefix})"), move |value: &T| {
        value.name().starts_with(&prefix)
    })
}

/// Matches a description whose name matches a `*` glob pattern.
#[must_use]
pub fn name_matches<T: Named + ?Sized + 'static>(pattern: impl Into<String>) -> Predicate<T> {
    let pattern = pattern.into();
    Predicate::new(format!("name_matches({pattern})"), move |value: &T| {
        glob_match(&pattern, value.name())
    })
}

/// Matches interface descriptions.
#[must_use]
pub fn is_interface() -> Predicate<TypeDescription> {
    Predicate::new("is_interface", TypeDescription::is_interface)
}

/// Matches a type whose supertype hierarchy contains `supertype_name`.
///
/// The walk covers the superclass chain and all transitively implemented
/// interfaces. The starting type itself does not count. A reference that is
/// known by name only still has its name checked; its own hierarchy is
/// skipped and the search continues elsewhere.
#[must_use]
pub fn extends_type(supertype_name: impl Into<String>) -> Predicate<TypeDescription> {
    let supertype_name = supertype_name.into();
    Predicate::new(
        format!("extends_type({supertype_name})"),
        move |description: &TypeDescription| hierarchy_contains(description, &supertype_name),
    )
}

/// Matches a type declaring at least one method matching `method`.
#[must_use]
pub fn declares_method(method: Predicate<MethodDescription>) -> Predicate<TypeDescription> {
    let label = format!("declares_method({})", method.label());
    Predicate::new(label, move |description: &TypeDescription| {
        description.methods().iter().any(|m| method.matches(m))
    })
}

/// Matches a method whose parameter at `index` has type `type_name`.
#[must_use]
pub fn takes_argument(index: usize, type_name: impl Into<String>) -> Predicate<MethodDescription> {
    let type_name = type_name.into();
    Predicate::new(
        format!("takes_argument({index}, {type_name})"),
        move |method: &MethodDescription| {
            method.parameter_types().get(index).map(String::as_str) == Some(type_name.as_str())
        },
    )
}

/// Matches a method whose return type is `type_name`.
#[must_use]
pub fn returns(type_name: impl Into<String>) -> Predicate<MethodDescription> {
    let type_name = type_name.into();
    Predicate::new(
        format!("returns({type_name})"),
        move |method: &MethodDescription| method.return_type() == type_name,
    )
}

fn hierarchy_contains(description: &TypeDescription, target: &str) -> bool {
    let mut checked: HashSet<String> = HashSet::new();
    let mut pending: Vec<TypeRef> = Vec::new();

    if let Some(superclass) = description.superclass() {
        pending.push(superclass.clone());
    }
    pending.extend(description.interfaces().iter().cloned());

    while let Some(type_ref) = pending.pop() {
        let name = type_ref.name();
        if !checked.insert(name.to_string()) {
            continue;
        }
        if name == target {
            return true;
        }
        match type_ref.resolved() {
            Some(resolved) => {
                if let Some(superclass) = resolved.superclass() {
                    pending.push(superclass.clone());
                }
                pending.extend(resolved.interfaces().iter().cloned());
            }
            None => {
                tracing::debug!(name, "supertype not resolvable, skipping its hierarchy");
            }
        }
    }
    false
}

fn glob_match(pattern: &str, input: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let input: Vec<char> = input.chars().collect();
    let (mut p, mut i) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while i < input.len() {
        if p < pattern.len() && (pattern[p] == input[i]) {
            p += 1;
            i += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            star = Some((p, i));
            p += 1;
        } else if let Some((star_p, star_i)) = star {
            p = star_p + 1;
            i = star_i + 1;
            star = Some((star_p, star_i + 1));
        } else {
            return false;
        }
    }
    while p < pattern.len() && pattern[p] == '*' {
        p += 1;
    }
    p == pattern.len()
}
