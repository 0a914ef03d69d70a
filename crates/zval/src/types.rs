//! Script-level type descriptors.
//!
//! A [`Type`] is what the compiler hands the VM alongside every frame slot. Cells never
//! carry their own type, so these descriptors are the only way to interpret one.

use std::{cell::RefCell, fmt, rc::Rc};

use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, IntoStaticStr};

/// Shared handle to a type descriptor.
///
/// Descriptors are immutable once built, so sharing them with `Rc` keeps slot-type tables
/// cheap to clone and guarantees a descriptor outlives every cell created under it.
pub type TypePtr = Rc<Type>;

/// Tag identifying a script-level type.
///
/// The set is closed: every match over it in this crate is exhaustive, so adding a tag is
/// a compile error everywhere a decision has to be made about it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, IntoStaticStr, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
pub enum TypeTag {
    Void,
    Bool,
    Int,
    Count,
    Double,
    Time,
    Interval,
    String,
    Pattern,
    Enum,
    Port,
    Addr,
    Subnet,
    Any,
    Table,
    Union,
    Timer,
    Record,
    /// Type lists print as `types` at script level.
    #[strum(serialize = "types")]
    List,
    Func,
    File,
    Vector,
    Opaque,
    Type,
    Error,
}

/// Internal representation class of a type.
///
/// Two differently-tagged types with the same internal class (other than `Other`) share a
/// storage layout, which is what allows e.g. an `int` value to be lowered into a `bool`
/// slot without tripping the consistency check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
pub enum InternalType {
    Void,
    Int,
    Unsigned,
    Double,
    String,
    Addr,
    Subnet,
    Other,
    Error,
}

impl TypeTag {
    /// Returns the internal representation class for this tag.
    #[must_use]
    pub const fn internal_type(self) -> InternalType {
        match self {
            Self::Void => InternalType::Void,
            Self::Bool | Self::Int | Self::Enum => InternalType::Int,
            Self::Count | Self::Port => InternalType::Unsigned,
            Self::Double | Self::Time | Self::Interval => InternalType::Double,
            Self::String => InternalType::String,
            Self::Addr => InternalType::Addr,
            Self::Subnet => InternalType::Subnet,
            Self::Error => InternalType::Error,
            Self::Pattern
            | Self::Any
            | Self::Table
            | Self::Union
            | Self::Timer
            | Self::Record
            | Self::List
            | Self::Func
            | Self::File
            | Self::Vector
            | Self::Opaque
            | Self::Type => InternalType::Other,
        }
    }

    /// The script-level name, e.g. `"count"` or `"types"`.
    #[must_use]
    pub fn name(self) -> &'static str {
        self.into()
    }
}

/// A named field of a record type.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordField {
    pub name: String,
    pub ty: TypePtr,
}

/// Extra structure carried by composite types.
#[derive(Debug, Clone, PartialEq)]
enum TypeDetail {
    None,
    Vector {
        yield_type: TypePtr,
    },
    /// Tables with no yield type are sets.
    Table {
        indices: Vec<TypePtr>,
        yield_type: Option<TypePtr>,
    },
    Record {
        fields: Vec<RecordField>,
    },
    Enum {
        name: String,
        labels: Vec<(String, i64)>,
    },
    Opaque {
        name: String,
    },
}

/// A script-level type descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct Type {
    tag: TypeTag,
    detail: TypeDetail,
}

thread_local! {
    /// Per-thread cache backing [`Type::base`].
    static BASE_TYPES: RefCell<AHashMap<TypeTag, TypePtr>> = RefCell::new(AHashMap::new());
}

impl Type {
    /// Returns the shared descriptor for a bare tag.
    ///
    /// Repeated calls on the same thread return the same `Rc`. Composite tags get their
    /// most permissive shape: `vector of any`, `table[any] of any`, an empty record, an
    /// anonymous enum and an anonymous opaque type.
    #[must_use]
    pub fn base(tag: TypeTag) -> TypePtr {
        BASE_TYPES.with(|cache| {
            if let Some(ty) = cache.borrow().get(&tag) {
                return Rc::clone(ty);
            }
            let detail = match tag {
                TypeTag::Vector => TypeDetail::Vector {
                    yield_type: Self::base(TypeTag::Any),
                },
                TypeTag::Table => TypeDetail::Table {
                    indices: vec![Self::base(TypeTag::Any)],
                    yield_type: Some(Self::base(TypeTag::Any)),
                },
                TypeTag::Record => TypeDetail::Record { fields: Vec::new() },
                TypeTag::Enum => TypeDetail::Enum {
                    name: String::new(),
                    labels: Vec::new(),
                },
                TypeTag::Opaque => TypeDetail::Opaque { name: String::new() },
                _ => TypeDetail::None,
            };
            let ty = Rc::new(Self { tag, detail });
            cache.borrow_mut().insert(tag, Rc::clone(&ty));
            ty
        })
    }

    /// Builds `vector of <yield_type>`.
    #[must_use]
    pub fn vector(yield_type: TypePtr) -> TypePtr {
        Rc::new(Self {
            tag: TypeTag::Vector,
            detail: TypeDetail::Vector { yield_type },
        })
    }

    /// Builds `table[<indices>] of <yield_type>`.
    #[must_use]
    pub fn table(indices: Vec<TypePtr>, yield_type: TypePtr) -> TypePtr {
        Rc::new(Self {
            tag: TypeTag::Table,
            detail: TypeDetail::Table {
                indices,
                yield_type: Some(yield_type),
            },
        })
    }

    /// Builds `set[<indices>]`, a table without a yield type.
    #[must_use]
    pub fn set(indices: Vec<TypePtr>) -> TypePtr {
        Rc::new(Self {
            tag: TypeTag::Table,
            detail: TypeDetail::Table {
                indices,
                yield_type: None,
            },
        })
    }

    /// Builds a record type from `(name, type)` pairs.
    #[must_use]
    pub fn record(fields: impl IntoIterator<Item = (String, TypePtr)>) -> TypePtr {
        let fields = fields.into_iter().map(|(name, ty)| RecordField { name, ty }).collect();
        Rc::new(Self {
            tag: TypeTag::Record,
            detail: TypeDetail::Record { fields },
        })
    }

    /// Builds a named enum type with the given `(label, value)` pairs.
    #[must_use]
    pub fn enumeration(name: impl Into<String>, labels: impl IntoIterator<Item = (String, i64)>) -> TypePtr {
        Rc::new(Self {
            tag: TypeTag::Enum,
            detail: TypeDetail::Enum {
                name: name.into(),
                labels: labels.into_iter().collect(),
            },
        })
    }

    /// Builds `opaque of <name>`.
    #[must_use]
    pub fn opaque(name: impl Into<String>) -> TypePtr {
        Rc::new(Self {
            tag: TypeTag::Opaque,
            detail: TypeDetail::Opaque { name: name.into() },
        })
    }

    #[inline]
    #[must_use]
    pub fn tag(&self) -> TypeTag {
        self.tag
    }

    #[inline]
    #[must_use]
    pub fn internal_type(&self) -> InternalType {
        self.tag.internal_type()
    }

    /// Element type of a vector, or value type of a table. `None` for sets and every
    /// other tag.
    #[must_use]
    pub fn yield_type(&self) -> Option<&TypePtr> {
        match &self.detail {
            TypeDetail::Vector { yield_type } => Some(yield_type),
            TypeDetail::Table { yield_type, .. } => yield_type.as_ref(),
            _ => None,
        }
    }

    /// Index types of a table or set; empty for every other tag.
    #[must_use]
    pub fn indices(&self) -> &[TypePtr] {
        match &self.detail {
            TypeDetail::Table { indices, .. } => indices,
            _ => &[],
        }
    }

    /// Fields of a record type; empty for every other tag.
    #[must_use]
    pub fn fields(&self) -> &[RecordField] {
        match &self.detail {
            TypeDetail::Record { fields } => fields,
            _ => &[],
        }
    }

    /// Looks up the label of an enum value.
    #[must_use]
    pub fn enum_label(&self, value: i64) -> Option<&str> {
        match &self.detail {
            TypeDetail::Enum { labels, .. } => labels
                .iter()
                .find(|(_, v)| *v == value)
                .map(|(label, _)| label.as_str()),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_any(&self) -> bool {
        self.tag == TypeTag::Any
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.detail {
            TypeDetail::None => f.write_str(self.tag.name()),
            TypeDetail::Vector { yield_type } => write!(f, "vector of {yield_type}"),
            TypeDetail::Table { indices, yield_type } => {
                f.write_str(if yield_type.is_some() { "table[" } else { "set[" })?;
                for (i, index) in indices.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{index}")?;
                }
                f.write_str("]")?;
                if let Some(yield_type) = yield_type {
                    write!(f, " of {yield_type}")?;
                }
                Ok(())
            }
            TypeDetail::Record { fields } => {
                f.write_str("record {")?;
                for field in fields {
                    write!(f, " {}: {};", field.name, field.ty)?;
                }
                f.write_str(" }")
            }
            TypeDetail::Enum { name, .. } if !name.is_empty() => f.write_str(name),
            TypeDetail::Opaque { name } if !name.is_empty() => write!(f, "opaque of {name}"),
            TypeDetail::Enum { .. } | TypeDetail::Opaque { .. } => f.write_str(self.tag.name()),
        }
    }
}
