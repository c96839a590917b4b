//! # Type Keys
//!
//! Stable identifiers for the message, response and handler types the dispatcher routes on.

use std::any::TypeId;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Identifies a Rust type at runtime.
///
/// Equality and hashing use the [`TypeId`] only; the type name is carried for diagnostics.
#[derive(Clone, Copy)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
}

impl TypeKey {
    /// Key of the type `T`
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    /// Fully qualified type name as reported by the compiler
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Type name with module paths removed, including inside generic arguments
    pub fn friendly_name(&self) -> String {
        friendly_name(self.name)
    }
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeKey {}

impl Hash for TypeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeKey({})", self.name)
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.friendly_name())
    }
}

/// Strips `a::b::` prefixes from every path segment in a type name.
pub(crate) fn friendly_name(type_name: &str) -> String {
    let mut friendly = String::with_capacity(type_name.len());
    let mut segment = String::new();

    for ch in type_name.chars() {
        if ch.is_alphanumeric() || ch == '_' || ch == ':' {
            segment.push(ch);
        } else {
            friendly.push_str(last_path_segment(&segment));
            segment.clear();
            friendly.push(ch);
        }
    }
    friendly.push_str(last_path_segment(&segment));
    friendly
}

fn last_path_segment(path: &str) -> &str {
    path.rsplit("::").next().unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    mod orders {
        pub struct PlaceOrder;
        pub struct Envelope<T>(#[allow(dead_code)] pub T);
    }

    #[test]
    fn test_keys_compare_by_type() {
        assert_eq!(TypeKey::of::<orders::PlaceOrder>(), TypeKey::of::<orders::PlaceOrder>());
        assert_ne!(TypeKey::of::<orders::PlaceOrder>(), TypeKey::of::<String>());

        let keys: HashSet<TypeKey> = [
            TypeKey::of::<u32>(),
            TypeKey::of::<u32>(),
            TypeKey::of::<orders::PlaceOrder>(),
        ]
        .into_iter()
        .collect();
        assert_eq!(keys.len(), 2);
    }

    #[test]
    fn test_friendly_name_strips_module_paths() {
        assert_eq!(TypeKey::of::<orders::PlaceOrder>().friendly_name(), "PlaceOrder");
        assert_eq!(
            TypeKey::of::<orders::Envelope<orders::PlaceOrder>>().friendly_name(),
            "Envelope<PlaceOrder>"
        );
        assert_eq!(
            friendly_name("alloc::vec::Vec<(core::option::Option<u8>, &str)>"),
            "Vec<(Option<u8>, &str)>"
        );
    }

    #[test]
    fn test_friendly_name_keeps_primitive_names() {
        assert_eq!(TypeKey::of::<u64>().friendly_name(), "u64");
        assert_eq!(TypeKey::of::<()>().to_string(), "()");
    }
}
