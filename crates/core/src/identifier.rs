//! Compound identifiers
//!
//! An [`Identifier`] is an ordered list of key components used as a row's
//! logical address (partition key followed by clustering columns).
//!
//! ## Rules
//!
//! - Components keep insertion order
//! - `Null` components are never added; duplicates of non-null values are kept
//! - Identifiers of different sizes are never equal and the shorter one
//!   always orders first
//! - Same-size identifiers compare component by component, by natural order
//!   when both components are orderable, otherwise by their string renderings
//!
//! Once built an identifier is not modified; there is no removal.

use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

const SEPARATOR: &str = ", ";

/// Ordered, multi-component key
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Identifier {
    components: Vec<Value>,
}

/// Build an [`Identifier`] from a list of values
///
/// ```
/// use docstore_core::identifier;
///
/// let id = identifier!["db", "table", 42i64];
/// assert_eq!(id.len(), 3);
/// assert_eq!(id.to_string(), "(db, table, 42)");
/// ```
#[macro_export]
macro_rules! identifier {
    () => {
        $crate::Identifier::new()
    };
    ($($component:expr),+ $(,)?) => {{
        let mut id = $crate::Identifier::new();
        $(id.push($component);)+
        id
    }};
}

impl Identifier {
    /// Create an empty identifier
    pub fn new() -> Self {
        Self {
            components: Vec::new(),
        }
    }

    /// Create an identifier from the given components, in order
    pub fn from_components<I, V>(components: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let mut id = Self::new();
        id.extend(components);
        id
    }

    /// Append one component
    ///
    /// `Null` is rejected: the identifier is left unchanged.
    pub fn push(&mut self, component: impl Into<Value>) -> &mut Self {
        let component = component.into();
        if !component.is_null() {
            self.components.push(component);
        }
        self
    }

    /// Append several components in order, skipping nulls
    pub fn extend<I, V>(&mut self, components: I) -> &mut Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        for component in components {
            self.push(component);
        }
        self
    }

    /// Read-only view of the components
    pub fn components(&self) -> &[Value] {
        &self.components
    }

    /// Iterate the components in order
    pub fn iter(&self) -> std::slice::Iter<'_, Value> {
        self.components.iter()
    }

    /// Number of components
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// True when there are no components
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// First component, if any
    pub fn primary_key(&self) -> Option<&Value> {
        self.components.first()
    }

    /// Equality against a value of any type
    ///
    /// Only another `Identifier` can be equal; anything else is simply not
    /// equal.
    pub fn same_as(&self, other: &dyn Any) -> bool {
        match other.downcast_ref::<Identifier>() {
            Some(that) => self == that,
            None => false,
        }
    }
}

fn compare_component(a: &Value, b: &Value) -> Ordering {
    match a.natural_cmp(b) {
        Some(ord) => ord,
        None => a.to_string().cmp(&b.to_string()),
    }
}

impl Ord for Identifier {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.len().cmp(&other.len()) {
            Ordering::Equal => {}
            unequal => return unequal,
        }

        self.components
            .iter()
            .zip(other.components.iter())
            .map(|(a, b)| compare_component(a, b))
            .find(|ord| *ord != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    }
}

impl PartialOrd for Identifier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Identifier {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Identifier {}

// Equal components either compare equal by natural order or render to the
// same string, so hashing the rendering keeps Hash consistent with Eq.
// Zero doubles are normalised because -0.0 == 0.0 but renders as "-0".
impl Hash for Identifier {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.components.len().hash(state);
        for component in &self.components {
            match component {
                Value::Double(n) if *n == 0.0 => "0".hash(state),
                other => other.to_string().hash(state),
            }
        }
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.components.as_slice() {
            [] => Ok(()),
            [only] => write!(f, "{}", only),
            many => {
                f.write_str("(")?;
                for (i, component) in many.iter().enumerate() {
                    if i > 0 {
                        f.write_str(SEPARATOR)?;
                    }
                    write!(f, "{}", component)?;
                }
                f.write_str(")")
            }
        }
    }
}

impl<'a> IntoIterator for &'a Identifier {
    type Item = &'a Value;
    type IntoIter = std::slice::Iter<'a, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.components.iter()
    }
}
