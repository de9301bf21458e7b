use serde_json::Value;
use spoiler_core::{
    Attrs, Document, Editor, ElementNode, Node, Op, PluginRegistry, Point, Selection, Transaction,
};

fn spoiler_attrs() -> Attrs {
    let mut attrs = Attrs::default();
    attrs.insert(
        "class".to_string(),
        Value::String("cdx-spoiler".to_string()),
    );
    attrs
}

fn spoiler_span(text: &str) -> Node {
    Node::inline("span", spoiler_attrs(), vec![Node::text(text)])
}

fn paragraph_with(children: Vec<Node>) -> Node {
    Node::Element(ElementNode {
        kind: "paragraph".to_string(),
        attrs: Attrs::default(),
        children,
    })
}

#[test]
fn empty_marker_is_removed_on_construction() {
    let doc = Document {
        children: vec![paragraph_with(vec![Node::text("a"), spoiler_span("")])],
    };
    let selection = Selection::collapsed(Point::new(vec![0, 0], 0));
    let editor = Editor::new(doc, selection, PluginRegistry::standard());

    let Node::Element(paragraph) = &editor.doc().children[0] else {
        panic!("expected paragraph element");
    };
    assert_eq!(paragraph.children, vec![Node::text("a")]);
}

#[test]
fn host_edit_that_empties_a_marker_drops_it() {
    let doc = Document {
        children: vec![paragraph_with(vec![Node::text("hi "), spoiler_span("x")])],
    };
    let selection = Selection::collapsed(Point::new(vec![0, 0], 0));
    let mut editor = Editor::new(doc, selection, PluginRegistry::standard());

    editor
        .apply(Transaction::new(vec![Op::RemoveText {
            path: vec![0, 1, 0],
            range: 0..1,
        }]))
        .unwrap();

    let Node::Element(paragraph) = &editor.doc().children[0] else {
        panic!("expected paragraph element");
    };
    assert_eq!(paragraph.children, vec![Node::text("hi ")]);
}

#[test]
fn marker_nested_inside_a_marker_is_flattened() {
    let outer = Node::inline(
        "span",
        spoiler_attrs(),
        vec![Node::text("a"), spoiler_span("b"), Node::text("c")],
    );
    let doc = Document {
        children: vec![paragraph_with(vec![outer])],
    };
    let selection = Selection::collapsed(Point::new(vec![0, 0, 0], 0));
    let editor = Editor::new(doc, selection, PluginRegistry::standard());

    let Node::Element(paragraph) = &editor.doc().children[0] else {
        panic!("expected paragraph element");
    };
    assert_eq!(paragraph.children.len(), 2);
    assert_eq!(paragraph.children[0], Node::text(""));

    let Node::Element(span) = &paragraph.children[1] else {
        panic!("expected marker element");
    };
    assert_eq!(span.children, vec![Node::text("abc")]);
}

#[test]
fn adjacent_text_leaves_are_merged() {
    let doc = Document {
        children: vec![paragraph_with(vec![Node::text("ab"), Node::text("cd")])],
    };
    let selection = Selection::collapsed(Point::new(vec![0, 1], 1));
    let editor = Editor::new(doc, selection, PluginRegistry::standard());

    let Node::Element(paragraph) = &editor.doc().children[0] else {
        panic!("expected paragraph element");
    };
    assert_eq!(paragraph.children, vec![Node::text("abcd")]);
    assert_eq!(editor.selection().focus, Point::new(vec![0, 0], 3));
}
