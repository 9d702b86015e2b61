//! Integration tests for the compact wire codec
//!
//! Tests encoding heap values, reading fields in place and rejecting
//! malformed buffers.

use docvm_foundation::{Value, WireBuilder, WireDoc};

fn sample() -> Value {
    Value::object([
        ("name", Value::from("widget")),
        ("qty", Value::Int32(3)),
        ("tags", Value::array([Value::from("a"), Value::from("b")])),
        ("price", Value::Double(9.5)),
    ])
}

#[test]
fn encoded_object_reads_back_fields() {
    let doc = WireDoc::from_object(&sample()).unwrap();
    assert_eq!(doc.get_field("qty"), Some(Value::Int32(3)));
    assert_eq!(doc.get_field("missing"), None);
    let names: Vec<&str> = doc.iter().map(|(name, _)| name).collect();
    assert_eq!(names, ["name", "qty", "tags", "price"]);
}

#[test]
fn wire_object_behaves_like_a_heap_object() {
    let heap = sample();
    let wire = Value::BsonObject(WireDoc::from_object(&heap).unwrap());
    assert!(wire.is_object());
    assert_eq!(wire.field("name"), Some(Value::from("widget")));
    let tags = wire.field("tags").unwrap();
    assert!(tags.is_array());
    assert_eq!(tags.element(1), Some(Value::from("b")));
    assert_eq!(wire.to_string(), heap.to_string());
}

#[test]
fn wire_array_elements() {
    let doc = WireDoc::from_array(&Value::array([Value::Int64(10), Value::Null])).unwrap();
    assert_eq!(doc.get_element(0), Some(Value::Int64(10)));
    assert_eq!(doc.get_element(1), Some(Value::Null));
    assert_eq!(doc.get_element(2), None);
}

#[test]
fn builder_and_bytes_round_trip() {
    let mut builder = WireBuilder::new();
    builder.append("x", &Value::Bool(true)).unwrap();
    let doc = builder.finish();
    let copy = WireDoc::from_bytes(doc.as_bytes().to_vec()).unwrap();
    assert_eq!(copy.get_field("x"), Some(Value::Bool(true)));
}

#[test]
fn non_objects_cannot_be_encoded_as_documents() {
    assert!(WireDoc::from_object(&Value::Int32(1)).is_err());
    assert!(WireDoc::from_array(&Value::from("x")).is_err());
}

#[test]
fn truncated_buffers_are_rejected() {
    let doc = WireDoc::from_object(&sample()).unwrap();
    let bytes = doc.as_bytes();
    assert!(WireDoc::from_bytes(bytes[..bytes.len() - 3].to_vec()).is_err());
}
