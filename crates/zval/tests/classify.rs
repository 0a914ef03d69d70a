//! Tests for the managed/unmanaged classification of type tags.

use pretty_assertions::assert_eq;
use strum::IntoEnumIterator;
use zval::{CellRepr, Type, TypeTag, cell_repr, is_managed, is_managed_tag};

const MANAGED: [TypeTag; 13] = [
    TypeTag::Addr,
    TypeTag::Any,
    TypeTag::File,
    TypeTag::Func,
    TypeTag::List,
    TypeTag::Opaque,
    TypeTag::Pattern,
    TypeTag::Record,
    TypeTag::String,
    TypeTag::Subnet,
    TypeTag::Table,
    TypeTag::Type,
    TypeTag::Vector,
];

/// Every tag in the closed set gets an answer, and exactly the managed ones say yes.
#[test]
fn classification_is_total_and_exact() {
    let managed: Vec<TypeTag> = TypeTag::iter().filter(|tag| is_managed_tag(*tag)).collect();
    let mut expected = MANAGED.to_vec();
    expected.sort_by_key(|tag| TypeTag::iter().position(|t| t == *tag));
    assert_eq!(managed, expected);
}

#[test]
fn descriptor_and_tag_agree() {
    for tag in TypeTag::iter() {
        assert_eq!(is_managed(&Type::base(tag)), is_managed_tag(tag), "{tag}");
    }
}

#[test]
fn numeric_tags_are_inline() {
    for tag in [TypeTag::Bool, TypeTag::Int, TypeTag::Enum] {
        assert_eq!(cell_repr(tag), CellRepr::Int);
    }
    assert_eq!(cell_repr(TypeTag::Count), CellRepr::Unsigned);
    for tag in [TypeTag::Double, TypeTag::Time, TypeTag::Interval] {
        assert_eq!(cell_repr(tag), CellRepr::Double);
    }
}

#[test]
fn unstorable_tags_are_unmanaged() {
    for tag in [TypeTag::Error, TypeTag::Timer, TypeTag::Union, TypeTag::Void] {
        assert_eq!(cell_repr(tag), CellRepr::Unstorable);
        assert!(!is_managed_tag(tag));
    }
}
