//! Structural descriptions of types and methods.
//!
//! Descriptions stand in for types that may not be loadable at match time.
//! A supertype reference is either resolved to a full description or known
//! by name only; predicates treat the unresolved form as "cannot inspect"
//! and skip it rather than fail.

use std::fmt;
use std::sync::Arc;

/// A reference to another type from a description.
#[derive(Clone, Debug)]
pub enum TypeRef {
    /// The referenced type's full description is available.
    Resolved(Arc<TypeDescription>),
    /// Only the referenced type's name is known.
    Unresolved(String),
}

impl TypeRef {
    /// Returns the referenced type's name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Resolved(description) => description.name(),
            Self::Unresolved(name) => name,
        }
    }

    /// Returns the full description when resolved.
    #[must_use]
    pub fn resolved(&self) -> Option<&Arc<TypeDescription>> {
        match self {
            Self::Resolved(description) => Some(description),
            Self::Unresolved(_) => None,
        }
    }
}

/// Method visibility.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Visibility {
    /// Callable from anywhere.
    Public,
    /// Callable from subtypes.
    Protected,
    /// Callable within the declaring scope only.
    Private,
}

/// Structural description of one method.
#[derive(Clone, Debug)]
pub struct MethodDescription {
    name: String,
    parameter_types: Vec<String>,
    return_type: String,
    visibility: Visibility,
}

impl MethodDescription {
    /// Creates a public method description with no parameters.
    #[must_use]
    pub fn new(name: impl Into<String>, return_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameter_types: Vec::new(),
            return_type: return_type.into(),
            visibility: Visibility::Public,
        }
    }

    /// Appends a parameter type.
    #[must_use]
    pub fn with_parameter(mut self, parameter_type: impl Into<String>) -> Self {
        self.parameter_types.push(parameter_type.into());
        self
    }

    /// Sets the visibility.
    #[must_use]
    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    /// Returns the method name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the parameter type names in declaration order.
    #[must_use]
    pub fn parameter_types(&self) -> &[String] {
        &self.parameter_types
    }

    /// Returns the return type name.
    #[must_use]
    pub fn return_type(&self) -> &str {
        &self.return_type
    }

    /// Returns the visibility.
    #[must_use]
    pub const fn visibility(&self) -> Visibility {
        self.visibility
    }
}

/// Structural description of one type.
#[derive(Clone)]
pub struct TypeDescription {
    name: String,
    superclass: Option<TypeRef>,
    interfaces: Vec<TypeRef>,
    methods: Vec<MethodDescription>,
    interface: bool,
}

impl TypeDescription {
    /// Creates a class description with no supertype, interfaces or methods.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            superclass: None,
            interfaces: Vec::new(),
            methods: Vec::new(),
            interface: false,
        }
    }

    /// Creates an interface description.
    #[must_use]
    pub fn new_interface(name: impl Into<String>) -> Self {
        Self {
            interface: true,
            ..Self::new(name)
        }
    }

    /// Sets the superclass reference.
    #[must_use]
    pub fn with_superclass(mut self, superclass: TypeRef) -> Self {
        self.superclass = Some(superclass);
        self
    }

    /// Appends an implemented interface reference.
    #[must_use]
    pub fn with_interface(mut self, interface: TypeRef) -> Self {
        self.interfaces.push(interface);
        self
    }

    /// Appends a declared method.
    #[must_use]
    pub fn with_method(mut self, method: MethodDescription) -> Self {
        self.methods.push(method);
        self
    }

    /// Returns the type name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the superclass reference, if any.
    #[must_use]
    pub const fn superclass(&self) -> Option<&TypeRef> {
        self.superclass.as_ref()
    }

    /// Returns the implemented interface references.
    #[must_use]
    pub fn interfaces(&self) -> &[TypeRef] {
        &self.interfaces
    }

    /// Returns the declared methods.
    #[must_use]
    pub fn methods(&self) -> &[MethodDescription] {
        &self.methods
    }

    /// Returns true when this description is an interface.
    #[must_use]
    pub const fn is_interface(&self) -> bool {
        self.interface
    }
}

impl fmt::Debug for TypeDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDescription")
            .field("name", &self.name)
            .field("interface", &self.interface)
            .field("superclass", &self.superclass.as_ref().map(TypeRef::name))
            .field(
                "interfaces",
                &self.interfaces.iter().map(TypeRef::name).collect::<Vec<_>>(),
            )
            .field("methods", &self.methods.len())
            .finish()
    }
}
