//! Integration tests for Value and Operand
//!
//! Tests construction, type tags, display, ownership and cross-type ordering.

use std::cmp::Ordering;

use docvm_foundation::{
    CaseInsensitiveCollator, Collator, Decimal, Operand, TypeMask, TypeTag, Value,
    compare_3way, compare_values, values_equal,
};

// =============================================================================
// Construction and Tags
// =============================================================================

#[test]
fn nothing_is_the_default() {
    let v = Value::default();
    assert!(v.is_nothing());
    assert!(v.is_nullish());
    assert_eq!(v.tag(), TypeTag::Nothing);
}

#[test]
fn null_is_nullish_but_present() {
    assert!(!Value::Null.is_nothing());
    assert!(Value::Null.is_nullish());
}

#[test]
fn numeric_family() {
    for v in [
        Value::Int32(1),
        Value::Int64(1),
        Value::Double(1.0),
        Value::Decimal(Decimal::ONE),
    ] {
        assert!(v.is_number(), "{v:?}");
    }
    assert!(!Value::from("1").is_number());
}

#[test]
fn string_access() {
    let v = Value::from("hello");
    assert!(v.is_string());
    assert_eq!(v.as_str(), Some("hello"));
    assert_eq!(Value::Int32(1).as_str(), None);
}

#[test]
fn array_and_object_helpers() {
    let arr = Value::array([Value::Int32(1), Value::Int32(2)]);
    assert!(arr.is_array());
    assert_eq!(arr.array_len(), Some(2));
    assert_eq!(arr.element(1), Some(Value::Int32(2)));
    assert_eq!(arr.element(2), None);

    let obj = Value::object([("a", Value::Int32(1)), ("b", Value::Null)]);
    assert!(obj.is_object());
    assert_eq!(obj.field("b"), Some(Value::Null));
    assert_eq!(obj.field("c"), None);
    let names: Vec<String> = obj.object_iter().map(|(k, _)| k).collect();
    assert_eq!(names, ["a", "b"]);
}

#[test]
fn type_mask_membership() {
    let mask = TypeMask::of(&[TypeTag::String, TypeTag::NumberInt32]);
    assert!(mask.contains(Value::from("x").tag()));
    assert!(mask.contains(Value::Int32(3).tag()));
    assert!(!mask.contains(Value::Int64(3).tag()));
}

#[test]
fn type_tags_round_trip_through_bytes() {
    for tag in [TypeTag::Nothing, TypeTag::String, TypeTag::Object, TypeTag::Collator] {
        assert_eq!(TypeTag::from_u8(tag as u8), Some(tag));
    }
}

// =============================================================================
// Display
// =============================================================================

#[test]
fn display_formats() {
    assert_eq!(Value::Int32(5).to_string(), "5");
    assert_eq!(Value::Int64(5).to_string(), "5L");
    assert_eq!(Value::Double(2.0).to_string(), "2.0");
    assert_eq!(Value::from("s").to_string(), "\"s\"");
    let doc = Value::object([("a", Value::array([Value::Int32(1), Value::Null]))]);
    assert_eq!(doc.to_string(), "{a: [1, null]}");
}

// =============================================================================
// Operands
// =============================================================================

#[test]
fn operand_views_and_copies() {
    let owned = Operand::Owned(Value::from("x"));
    let view = owned.view();
    assert!(!view.is_owned());
    assert_eq!(view.value(), owned.value());

    let copy = view.copy();
    assert!(copy.is_owned());
    assert_eq!(copy.into_owned(), Value::from("x"));
}

#[test]
fn operand_take_leaves_owned_nothing() {
    let mut slot = Operand::Borrowed(Value::Int32(4));
    let taken = slot.take();
    assert_eq!(taken.value(), &Value::Int32(4));
    assert!(slot.is_owned());
    assert!(slot.value().is_nothing());
}

// =============================================================================
// Comparison
// =============================================================================

#[test]
fn numbers_compare_across_tags() {
    assert!(values_equal(&Value::Int32(1), &Value::Double(1.0), None));
    assert!(values_equal(&Value::Int64(7), &Value::Decimal(Decimal::from(7)), None));
    assert_eq!(
        compare_values(&Value::Int64(2), &Value::Double(2.5), None),
        Ordering::Less
    );
}

#[test]
fn nan_sorts_below_numbers() {
    assert_eq!(
        compare_values(&Value::Double(f64::NAN), &Value::Int32(i32::MIN), None),
        Ordering::Less
    );
    assert!(values_equal(&Value::Double(f64::NAN), &Value::Double(f64::NAN), None));
}

#[test]
fn canonical_cross_type_order() {
    let ordered = [
        Value::MinKey,
        Value::Null,
        Value::Int32(100),
        Value::from("a"),
        Value::object([("a", Value::Int32(1))]),
        Value::array([Value::Int32(1)]),
        Value::Bool(false),
        Value::Date(0),
        Value::MaxKey,
    ];
    for pair in ordered.windows(2) {
        assert_eq!(
            compare_values(&pair[0], &pair[1], None),
            Ordering::Less,
            "{} < {}",
            pair[0],
            pair[1]
        );
    }
}

#[test]
fn collated_string_comparison() {
    let ci = CaseInsensitiveCollator;
    let coll: &dyn Collator = &ci;
    assert!(values_equal(&Value::from("ABC"), &Value::from("abc"), Some(coll)));
    assert!(!values_equal(&Value::from("ABC"), &Value::from("abc"), None));
}

#[test]
fn three_way_comparison() {
    assert_eq!(compare_3way(&Value::Int32(1), &Value::Int32(2), None), Value::Int32(-1));
    assert_eq!(compare_3way(&Value::from("b"), &Value::from("a"), None), Value::Int32(1));
    assert_eq!(compare_3way(&Value::Nothing, &Value::Int32(2), None), Value::Nothing);
}
