#![forbid(unsafe_code)]

//! Declarative element schemas.
//!
//! A type describes one XML element through a static [`Schema`]: its
//! namespace-qualified name plus an ordered list of [`Field`]s. Attribute
//! fields come first and are matched by name; content fields follow in
//! document order and are either a single run of character data or child
//! elements. Child fields are typed as `T`, `Option<T>` or `Vec<T>` for a
//! required, optional and repeated (at least once) child respectively.
//!
//! Every parsed element keeps a [`Header`] with its original start tag and
//! the whitespace found between children so that it can be canonicalized
//! later without keeping the source document around.
//!
//! Types are normally declared with [`xml_element!`](crate::xml_element).

use std::collections::BTreeMap;
use std::fmt;

use crate::token::{Name, StartElement};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Attribute,
    CharData,
    Element,
    Repeated,
}

/// One field of an element schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub role: Role,
    pub namespace: &'static str,
    pub local: &'static str,
    pub optional: bool,
    pub unique: bool,
}

impl Field {
    const fn new(role: Role, local: &'static str) -> Self {
        Self {
            role,
            namespace: "",
            local,
            optional: false,
            unique: false,
        }
    }

    pub const fn attr(local: &'static str) -> Self {
        Self::new(Role::Attribute, local)
    }

    pub const fn chardata() -> Self {
        Self::new(Role::CharData, "")
    }

    pub const fn element() -> Self {
        Self::new(Role::Element, "")
    }

    pub const fn repeated() -> Self {
        Self::new(Role::Repeated, "")
    }

    pub const fn namespace(self, namespace: &'static str) -> Self {
        Self { namespace, ..self }
    }

    pub const fn optional(self) -> Self {
        Self {
            optional: true,
            ..self
        }
    }

    /// Attribute values must be unique across the whole document.
    pub const fn unique(self) -> Self {
        Self { unique: true, ..self }
    }

    pub fn is_content(&self) -> bool {
        self.role != Role::Attribute
    }
}

#[derive(Debug)]
pub struct Schema {
    pub namespace: &'static str,
    pub local: &'static str,
    /// Element is canonicalized on its own and records the namespace
    /// bindings in scope when it was parsed.
    pub c14n_root: bool,
    pub fields: &'static [Field],
}

impl Schema {
    pub fn name(&self) -> Name {
        Name::new(self.namespace, self.local)
    }

    pub fn matches(&self, name: &Name) -> bool {
        name.space == self.namespace && name.local == self.local
    }

    /// Panics when the field list breaks the schema contract. These are
    /// programming errors in a type declaration, never input errors.
    pub fn check(&self) {
        let mut content = false;
        for (i, field) in self.fields.iter().enumerate() {
            match field.role {
                Role::Attribute => {
                    assert!(!content, "{self}: attribute {} after content", field.local);
                    assert!(!field.local.is_empty(), "{self}: attribute without name");
                }
                Role::CharData => {
                    assert!(
                        !content && i + 1 == self.fields.len(),
                        "{self}: character data must be the only content field"
                    );
                    assert!(
                        !field.optional && !field.unique,
                        "{self}: character data cannot be optional or unique"
                    );
                }
                Role::Element | Role::Repeated => {
                    assert!(
                        field.local.is_empty() && field.namespace.is_empty(),
                        "{self}: element fields take their name from the element type"
                    );
                    assert!(!field.unique, "{self}: element fields cannot be unique");
                }
            }
            content |= field.is_content();
        }
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.name().fmt(f)
    }
}

/// Source details of a parsed element.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Header {
    /// Namespace bindings in scope at the start tag, set for c14n roots.
    pub ns: Option<BTreeMap<String, String>>,
    pub start: StartElement,
    /// Whitespace before the first child and after each child.
    pub whitespace: Vec<String>,
}

impl Header {
    pub fn is_present(&self) -> bool {
        !self.start.name.local.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    One,
    Optional,
    Many,
}

/// Read view of one field.
pub enum FieldRef<'a> {
    Text(&'a str),
    Nodes(Vec<&'a dyn Node>),
}

/// Write view of one field, used by the parser.
pub enum FieldMut<'a> {
    Text(&'a mut String),
    Slot(&'a mut dyn Slot),
}

/// A parsed element.
pub trait Node {
    fn schema(&self) -> &'static Schema;
    fn header(&self) -> &Header;
    /// Header and field values in schema order.
    fn split(&self) -> (&Header, Vec<FieldRef<'_>>);
    fn split_mut(&mut self) -> (&mut Header, Vec<FieldMut<'_>>);
}

/// Storage for zero or more elements of one type.
pub trait Slot {
    fn element_schema(&self) -> &'static Schema;
    fn cardinality(&self) -> Cardinality;
    /// Makes room for the next element and returns it.
    fn fill(&mut self) -> &mut dyn Node;
}

pub trait FieldValue {
    fn as_field(&self) -> FieldRef<'_>;
    fn as_field_mut(&mut self) -> FieldMut<'_>;
}

pub trait Element: Node + Slot + FieldValue + Default + 'static {
    fn descriptor() -> &'static Schema;
}

impl FieldValue for String {
    fn as_field(&self) -> FieldRef<'_> {
        FieldRef::Text(self)
    }

    fn as_field_mut(&mut self) -> FieldMut<'_> {
        FieldMut::Text(self)
    }
}

impl<T: Element> Slot for Option<T> {
    fn element_schema(&self) -> &'static Schema {
        T::descriptor()
    }

    fn cardinality(&self) -> Cardinality {
        Cardinality::Optional
    }

    fn fill(&mut self) -> &mut dyn Node {
        self.insert(T::default())
    }
}

impl<T: Element> FieldValue for Option<T> {
    fn as_field(&self) -> FieldRef<'_> {
        FieldRef::Nodes(self.iter().map(|n| n as &dyn Node).collect())
    }

    fn as_field_mut(&mut self) -> FieldMut<'_> {
        FieldMut::Slot(self)
    }
}

impl<T: Element> Slot for Vec<T> {
    fn element_schema(&self) -> &'static Schema {
        T::descriptor()
    }

    fn cardinality(&self) -> Cardinality {
        Cardinality::Many
    }

    fn fill(&mut self) -> &mut dyn Node {
        self.push(T::default());
        let last = self.len() - 1;
        &mut self[last]
    }
}

impl<T: Element> FieldValue for Vec<T> {
    fn as_field(&self) -> FieldRef<'_> {
        FieldRef::Nodes(self.iter().map(|n| n as &dyn Node).collect())
    }

    fn as_field_mut(&mut self) -> FieldMut<'_> {
        FieldMut::Slot(self)
    }
}

/// Declares an element type together with its schema.
///
/// ```ignore
/// xml_element! {
///     pub struct Transform(ns::DSIG, "Transform") {
///         algorithm: String = Field::attr("Algorithm"),
///     }
/// }
/// ```
///
/// Append `, c14n_root` after the local name to record namespace bindings
/// for standalone canonicalization.
#[macro_export]
macro_rules! xml_element {
    (@root) => { false };
    (@root c14n_root) => { true };

    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident ($ns:expr, $local:literal $(, $root:ident)?) {
            $( $(#[$fmeta:meta])* $field:ident : $fty:ty = $desc:expr ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Default, Clone, PartialEq, Eq)]
        $vis struct $name {
            pub header: $crate::schema::Header,
            $( $(#[$fmeta])* pub $field: $fty, )*
        }

        impl $crate::schema::Node for $name {
            fn schema(&self) -> &'static $crate::schema::Schema {
                <Self as $crate::schema::Element>::descriptor()
            }

            fn header(&self) -> &$crate::schema::Header {
                &self.header
            }

            fn split(&self) -> (&$crate::schema::Header, Vec<$crate::schema::FieldRef<'_>>) {
                (
                    &self.header,
                    vec![$( $crate::schema::FieldValue::as_field(&self.$field) ),*],
                )
            }

            fn split_mut(
                &mut self,
            ) -> (&mut $crate::schema::Header, Vec<$crate::schema::FieldMut<'_>>) {
                (
                    &mut self.header,
                    vec![$( $crate::schema::FieldValue::as_field_mut(&mut self.$field) ),*],
                )
            }
        }

        impl $crate::schema::Element for $name {
            fn descriptor() -> &'static $crate::schema::Schema {
                #[allow(unused_imports)]
                use $crate::schema::Field;
                static SCHEMA: $crate::schema::Schema = $crate::schema::Schema {
                    namespace: $ns,
                    local: $local,
                    c14n_root: $crate::xml_element!(@root $($root)?),
                    fields: &[$( $desc ),*],
                };
                &SCHEMA
            }
        }

        impl $crate::schema::FieldValue for $name {
            fn as_field(&self) -> $crate::schema::FieldRef<'_> {
                $crate::schema::FieldRef::Nodes(vec![self as &dyn $crate::schema::Node])
            }

            fn as_field_mut(&mut self) -> $crate::schema::FieldMut<'_> {
                $crate::schema::FieldMut::Slot(self)
            }
        }

        impl $crate::schema::Slot for $name {
            fn element_schema(&self) -> &'static $crate::schema::Schema {
                <Self as $crate::schema::Element>::descriptor()
            }

            fn cardinality(&self) -> $crate::schema::Cardinality {
                $crate::schema::Cardinality::One
            }

            fn fill(&mut self) -> &mut dyn $crate::schema::Node {
                *self = Self::default();
                self
            }
        }
    };
}
