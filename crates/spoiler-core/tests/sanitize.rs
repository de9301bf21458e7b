use serde_json::Value;
use spoiler_core::{
    AttrPatch, Attrs, ContentValue, Document, Editor, ElementNode, Node, Op, PluginRegistry,
    Point, Selection, Transaction,
};

fn paragraph_with(children: Vec<Node>) -> Node {
    Node::Element(ElementNode {
        kind: "paragraph".to_string(),
        attrs: Attrs::default(),
        children,
    })
}

fn span_with_attrs(attrs: Attrs, text: &str) -> Node {
    Node::inline("span", attrs, vec![Node::text(text)])
}

#[test]
fn marker_keeps_class_and_loses_other_attributes() {
    let mut attrs = Attrs::default();
    attrs.insert(
        "class".to_string(),
        Value::String("cdx-spoiler".to_string()),
    );
    attrs.insert("data-evil".to_string(), Value::String("x".to_string()));

    let doc = Document {
        children: vec![paragraph_with(vec![
            Node::text("a "),
            span_with_attrs(attrs, "secret"),
        ])],
    };
    let registry = PluginRegistry::standard();

    let sanitized = registry.sanitize(&doc);

    let Node::Element(paragraph) = &sanitized.children[0] else {
        panic!("expected paragraph element");
    };
    let Node::Element(span) = &paragraph.children[1] else {
        panic!("expected marker element");
    };
    assert_eq!(span.kind, "span");
    assert_eq!(span.attrs.len(), 1);
    assert_eq!(
        span.attrs.get("class"),
        Some(&Value::String("cdx-spoiler".to_string()))
    );
    assert_eq!(span.children, vec![Node::text("secret")]);
}

#[test]
fn span_without_the_marker_class_is_unwrapped() {
    let doc = Document {
        children: vec![paragraph_with(vec![
            Node::text("a "),
            span_with_attrs(Attrs::default(), "secret"),
        ])],
    };
    let registry = PluginRegistry::standard();

    let sanitized = registry.sanitize(&doc);

    let Node::Element(paragraph) = &sanitized.children[0] else {
        panic!("expected paragraph element");
    };
    assert_eq!(
        paragraph.children,
        vec![Node::text("a "), Node::text("secret")]
    );
}

#[test]
fn unknown_inline_element_is_unwrapped() {
    let doc = Document {
        children: vec![paragraph_with(vec![Node::inline(
            "em",
            Attrs::default(),
            vec![Node::text("hi")],
        )])],
    };
    let registry = PluginRegistry::standard();

    let sanitized = registry.sanitize(&doc);

    let Node::Element(paragraph) = &sanitized.children[0] else {
        panic!("expected paragraph element");
    };
    assert_eq!(paragraph.children, vec![Node::text("hi")]);
}

#[test]
fn extra_class_tokens_are_reduced_to_the_marker_class() {
    let mut attrs = Attrs::default();
    attrs.insert(
        "class".to_string(),
        Value::String("big cdx-spoiler".to_string()),
    );

    let doc = Document {
        children: vec![paragraph_with(vec![span_with_attrs(attrs, "secret")])],
    };
    let registry = PluginRegistry::standard();

    let sanitized = registry.sanitize(&doc);

    let Node::Element(paragraph) = &sanitized.children[0] else {
        panic!("expected paragraph element");
    };
    let Node::Element(span) = &paragraph.children[0] else {
        panic!("expected marker element");
    };
    assert_eq!(
        span.attrs.get("class"),
        Some(&Value::String("cdx-spoiler".to_string()))
    );
}

#[test]
fn attr_added_by_host_ops_is_stripped_on_serialization() {
    let mut attrs = Attrs::default();
    attrs.insert(
        "class".to_string(),
        Value::String("cdx-spoiler".to_string()),
    );
    let doc = Document {
        children: vec![paragraph_with(vec![
            Node::text("a "),
            span_with_attrs(attrs, "secret"),
        ])],
    };
    let selection = Selection::collapsed(Point::new(vec![0, 0], 0));
    let mut editor = Editor::new(doc, selection, PluginRegistry::standard());

    let mut set = Attrs::default();
    set.insert("data-evil".to_string(), Value::String("x".to_string()));
    editor
        .apply(Transaction::new(vec![Op::SetNodeAttrs {
            path: vec![0, 1],
            patch: AttrPatch {
                set,
                remove: Vec::new(),
            },
        }]))
        .unwrap();

    let Node::Element(paragraph) = &editor.doc().children[0] else {
        panic!("expected paragraph element");
    };
    let Node::Element(span) = &paragraph.children[1] else {
        panic!("expected marker element");
    };
    assert!(span.attrs.contains_key("data-evil"));

    let sanitized = editor.registry().sanitize(editor.doc());
    let Node::Element(paragraph) = &sanitized.children[0] else {
        panic!("expected paragraph element");
    };
    let Node::Element(span) = &paragraph.children[1] else {
        panic!("expected marker element");
    };
    assert!(!span.attrs.contains_key("data-evil"));
    assert_eq!(
        span.attrs.get("class"),
        Some(&Value::String("cdx-spoiler".to_string()))
    );
}

#[test]
fn sanitized_content_value_round_trips_through_json() {
    let mut attrs = Attrs::default();
    attrs.insert(
        "class".to_string(),
        Value::String("cdx-spoiler".to_string()),
    );
    attrs.insert("data-evil".to_string(), Value::String("x".to_string()));

    let doc = Document {
        children: vec![paragraph_with(vec![
            Node::text("a "),
            span_with_attrs(attrs, "secret"),
        ])],
    };
    let registry = PluginRegistry::standard();

    let value = ContentValue::from_document_sanitized(&doc, &registry);
    assert_eq!(value.schema, "spoiler-core");
    assert_eq!(value.version, 1);

    let json = value.to_json_pretty().unwrap();
    let parsed = ContentValue::from_json_str(&json).unwrap();
    assert_eq!(parsed, value);
    assert_eq!(parsed.into_document(), registry.sanitize(&doc));
}
