use serde_json::Value;
use spoiler_core::{
    Attrs, Document, Editor, ElementNode, Node, Op, PluginRegistry, Point, Selection,
    ToolbarStyles, Transaction, button_class_list, toolbar_state,
};

fn spoiler_span(text: &str) -> Node {
    let mut attrs = Attrs::default();
    attrs.insert(
        "class".to_string(),
        Value::String("cdx-spoiler".to_string()),
    );
    Node::inline("span", attrs, vec![Node::text(text)])
}

fn doc_with_marker() -> Document {
    Document {
        children: vec![Node::Element(ElementNode {
            kind: "paragraph".to_string(),
            attrs: Attrs::default(),
            children: vec![Node::text("a "), spoiler_span("b")],
        })],
    }
}

#[test]
fn spoiler_tool_declares_inline_metadata() {
    let registry = PluginRegistry::standard();
    let tools = registry.inline_tools();
    assert_eq!(tools.len(), 1);

    let tool = &tools[0];
    assert_eq!(tool.id, "spoiler");
    assert!(tool.is_inline);
    assert_eq!(tool.toggle_command, "spoiler.toggle");
    assert_eq!(tool.active_query, "spoiler.is_active");
    assert!(tool.icon_svg.contains("<svg"));

    assert!(registry.is_known_kind("span"));
    assert!(registry.is_known_kind("paragraph"));
}

#[test]
fn core_registry_carries_no_inline_tools() {
    let mut editor = Editor::with_core_plugins();
    assert!(editor.registry().inline_tools().is_empty());
    assert!(editor.run_command("spoiler.toggle", None).is_err());
}

#[test]
fn button_class_list_derives_from_active_state() {
    let styles = ToolbarStyles::default();
    assert_eq!(
        button_class_list(&styles, false),
        vec!["ce-inline-tool".to_string()]
    );
    assert_eq!(
        button_class_list(&styles, true),
        vec![
            "ce-inline-tool".to_string(),
            "ce-inline-tool--active".to_string()
        ]
    );
}

#[test]
fn toolbar_state_follows_the_selection() {
    let selection = Selection::collapsed(Point::new(vec![0, 0], 0));
    let mut editor = Editor::new(doc_with_marker(), selection, PluginRegistry::standard());

    let states = toolbar_state(&editor).unwrap();
    assert_eq!(states.len(), 1);
    assert_eq!(states[0].id, "spoiler");
    assert!(!states[0].active);

    editor.set_selection(Selection::collapsed(Point::new(vec![0, 1, 0], 1)));
    let states = toolbar_state(&editor).unwrap();
    assert!(states[0].active);
}

#[test]
fn active_state_recomputes_after_marker_removed_by_host_ops() {
    let selection = Selection::collapsed(Point::new(vec![0, 1, 0], 1));
    let mut editor = Editor::new(doc_with_marker(), selection, PluginRegistry::standard());
    assert!(editor.run_query::<bool>("spoiler.is_active", None).unwrap());

    editor
        .apply(Transaction::new(vec![Op::RemoveNode { path: vec![0, 1] }]))
        .unwrap();

    assert!(!editor.run_query::<bool>("spoiler.is_active", None).unwrap());
    let Node::Element(paragraph) = &editor.doc().children[0] else {
        panic!("expected paragraph element");
    };
    assert_eq!(paragraph.children, vec![Node::text("a ")]);
}
