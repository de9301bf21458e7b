use serde_json::Value;

use crate::core::{
    Attrs, Document, Editor, ElementNode, Node, Point, Selection, clamp_to_char_boundary,
    node_at_path,
};
use crate::ops::{Op, Path, Transaction};
use crate::plugin::{
    ChildConstraint, CommandError, CommandSpec, EditorPlugin, InlineToolSpec, NodeRole, NodeSpec,
    NormalizePass, PluginRegistry, QuerySpec, containing_text_block_path,
    ordered_selection_points,
};
use crate::sanitize::{AttrRule, SanitizeRule};

pub const SPOILER_TAG: &str = "span";
pub const SPOILER_CLASS: &str = "cdx-spoiler";

const TOGGLE_SOURCE: &str = "command:spoiler.toggle";

const SPOILER_ICON: &str = r#"<svg xmlns="http://www.w3.org/2000/svg" width="533.333px" height="533.334px" viewBox="0 0 533.333 533.334"><path d="M437.147,171.05c40.439,28.662,73.63,67.235,96.187,112.283C483.791,382.27,382.976,450,266.667,450 c-32.587,0-63.954-5.319-93.322-15.148l40.602-40.602c17.218,3.802,34.881,5.75,52.72,5.75c46.646,0,92.111-13.274,131.482-38.387 c31.334-19.988,57.888-46.761,77.832-78.281c-19.298-30.503-44.801-56.536-74.817-76.299L437.147,171.05z M266.667,380.208 c-11.835,0-23.308-1.55-34.233-4.445l163.116-163.116c2.898,10.923,4.45,22.393,4.45,34.228 C400,320.512,340.304,380.208,266.667,380.208z M500,16.667h-27.988L357.63,131.048c-28.686-9.335-59.247-14.381-90.964-14.381 c-116.312,0-217.126,67.73-266.667,166.667c22.218,44.371,54.754,82.453,94.372,110.974L0,488.678v27.989h27.989L500,44.655V16.667 z M216.667,180.208c25.023,0,45.753,18.382,49.423,42.38l-57.043,57.044c-23.997-3.672-42.379-24.401-42.379-49.424 C166.667,202.594,189.052,180.208,216.667,180.208z M57.352,283.333c19.944-31.522,46.497-58.293,77.83-78.279 c2.041-1.302,4.102-2.563,6.176-3.802c-5.187,14.233-8.025,29.595-8.025,45.623c0,30.48,10.235,58.567,27.447,81.022 l-30.495,30.495C101.081,338.786,76.247,313.198,57.352,283.333z"/></svg>"#;

pub struct SpoilerPlugin;

impl EditorPlugin for SpoilerPlugin {
    fn id(&self) -> &'static str {
        "spoiler"
    }

    fn node_specs(&self) -> Vec<NodeSpec> {
        vec![NodeSpec {
            kind: SPOILER_TAG.to_string(),
            role: NodeRole::Inline,
            children: ChildConstraint::InlineOnly,
        }]
    }

    fn normalize_passes(&self) -> Vec<Box<dyn NormalizePass>> {
        vec![Box::new(RemoveEmptyMarkers), Box::new(FlattenNestedMarkers)]
    }

    fn commands(&self) -> Vec<CommandSpec> {
        vec![
            CommandSpec::new("spoiler.toggle", "Spoiler", |editor, _args| {
                toggle_spoiler(editor)
                    .map_err(CommandError::new)
                    .and_then(|tx| {
                        if tx.ops.is_empty() {
                            return Ok(());
                        }
                        editor.apply(tx).map_err(|e| {
                            CommandError::new(format!("Failed to toggle spoiler: {e:?}"))
                        })
                    })
            })
            .description("Wrap the selection in a spoiler marker, or unwrap the enclosing one.")
            .keywords(["spoiler", "blur", "hide", "inline"]),
        ]
    }

    fn queries(&self) -> Vec<QuerySpec> {
        vec![QuerySpec {
            id: "spoiler.is_active".to_string(),
            handler: std::sync::Arc::new(|editor, _args| {
                Ok(Value::Bool(is_spoiler_active(editor)))
            }),
        }]
    }

    fn inline_tools(&self) -> Vec<InlineToolSpec> {
        vec![InlineToolSpec {
            id: "spoiler".to_string(),
            title: "Spoiler".to_string(),
            icon_svg: SPOILER_ICON.to_string(),
            is_inline: true,
            toggle_command: "spoiler.toggle".to_string(),
            active_query: "spoiler.is_active".to_string(),
        }]
    }

    fn sanitize_rules(&self) -> Vec<SanitizeRule> {
        vec![
            SanitizeRule::new(SPOILER_TAG)
                .keep_attr("class", AttrRule::Equals(SPOILER_CLASS.to_string())),
        ]
    }
}

pub fn element_has_class(el: &ElementNode, class: &str) -> bool {
    el.attrs
        .get("class")
        .and_then(|v| v.as_str())
        .is_some_and(|v| v.split_whitespace().any(|c| c == class))
}

pub fn is_spoiler(el: &ElementNode) -> bool {
    el.kind == SPOILER_TAG && element_has_class(el, SPOILER_CLASS)
}

/// Nearest enclosing spoiler marker, walking from the point's path toward
/// the document root.
pub fn nearest_spoiler_path(doc: &Document, point_path: &[usize]) -> Option<Path> {
    let mut path: Path = point_path.to_vec();
    while !path.is_empty() {
        if let Some(Node::Element(el)) = node_at_path(doc, &path) {
            if is_spoiler(el) {
                return Some(path);
            }
        }
        path.pop();
    }
    None
}

fn active_spoiler_path(doc: &Document, sel: &Selection) -> Option<Path> {
    nearest_spoiler_path(doc, &sel.focus.path)
        .or_else(|| nearest_spoiler_path(doc, &sel.anchor.path))
}

pub fn is_spoiler_active(editor: &Editor) -> bool {
    active_spoiler_path(editor.doc(), editor.selection()).is_some()
}

/// Selection spanning the element's full inline content, from the start of
/// its first text leaf to the end of its last.
pub fn expand_to_element(doc: &Document, path: &[usize]) -> Option<Selection> {
    match node_at_path(doc, path)? {
        Node::Element(el) => {
            let anchor = first_text_leaf_point(path, &el.children)?;
            let focus = last_text_leaf_point(path, &el.children)?;
            Some(Selection { anchor, focus })
        }
        Node::Text(_) => None,
    }
}

fn toggle_spoiler(editor: &Editor) -> Result<Transaction, String> {
    let sel = editor.selection().clone();
    if let Some(marker_path) = active_spoiler_path(editor.doc(), &sel) {
        return unwrap_marker(editor, &marker_path);
    }
    if sel.is_collapsed() {
        return Ok(Transaction::new(Vec::new()).source(TOGGLE_SOURCE));
    }
    wrap_selection(editor, &sel)
}

fn wrap_selection(editor: &Editor, sel: &Selection) -> Result<Transaction, String> {
    let doc = editor.doc();
    let (start, end) = ordered_selection_points(sel);

    let block_path = containing_text_block_path(doc, editor.registry(), &start.path)
        .ok_or_else(|| "Selection start is not in a text block".to_string())?;
    let end_block_path = containing_text_block_path(doc, editor.registry(), &end.path)
        .ok_or_else(|| "Selection end is not in a text block".to_string())?;
    if block_path != end_block_path {
        return Err("Selection must be within a single text block".into());
    }

    let Some(Node::Element(block_el)) = node_at_path(doc, &block_path) else {
        return Err("Text block not found".into());
    };
    let children = block_el.children.as_slice();

    let start_global = point_global_offset(children, &start.path[block_path.len()..], start.offset);
    let end_global = point_global_offset(children, &end.path[block_path.len()..], end.offset);
    let (start_global, end_global) = if start_global <= end_global {
        (start_global, end_global)
    } else {
        (end_global, start_global)
    };

    if start_global == end_global {
        return Ok(Transaction::new(Vec::new()).source(TOGGLE_SOURCE));
    }

    let (before, middle, after) = split_inline_nodes(children, start_global, end_global);
    let marker_ix = before.len();

    let mut marker_path = block_path.clone();
    marker_path.push(marker_ix);
    let anchor = first_text_leaf_point(&marker_path, &middle);
    let focus = last_text_leaf_point(&marker_path, &middle);

    let mut new_children = before;
    new_children.push(marker_element(middle));
    new_children.extend(after);

    let mut ops: Vec<Op> = Vec::new();
    for child_ix in (0..children.len()).rev() {
        let mut remove_path = block_path.clone();
        remove_path.push(child_ix);
        ops.push(Op::RemoveNode { path: remove_path });
    }
    for (child_ix, node) in new_children.into_iter().enumerate() {
        let mut insert_path = block_path.clone();
        insert_path.push(child_ix);
        ops.push(Op::InsertNode {
            path: insert_path,
            node,
        });
    }

    let mut tx = Transaction::new(ops).source(TOGGLE_SOURCE);
    if let (Some(anchor), Some(focus)) = (anchor, focus) {
        tx = tx.selection_after(Selection { anchor, focus });
    }
    Ok(tx)
}

fn unwrap_marker(editor: &Editor, marker_path: &[usize]) -> Result<Transaction, String> {
    let doc = editor.doc();
    let Some(Node::Element(marker_el)) = node_at_path(doc, marker_path) else {
        return Err("Marker element not found".into());
    };
    if !is_spoiler(marker_el) {
        return Ok(Transaction::new(Vec::new()).source(TOGGLE_SOURCE));
    }
    let children = marker_el.children.clone();

    let (marker_ix, parent_path) = marker_path
        .split_last()
        .ok_or_else(|| "Invalid marker path".to_string())?;
    let marker_ix = *marker_ix;

    let mut ops: Vec<Op> = vec![Op::RemoveNode {
        path: marker_path.to_vec(),
    }];
    for (i, node) in children.iter().cloned().enumerate() {
        let mut path = parent_path.to_vec();
        path.push(marker_ix + i);
        ops.push(Op::InsertNode { path, node });
    }

    let mut anchor = None;
    for (i, node) in children.iter().enumerate() {
        let mut base = parent_path.to_vec();
        base.push(marker_ix + i);
        anchor = match node {
            Node::Text(_) => Some(Point::new(base, 0)),
            Node::Element(el) => first_text_leaf_point(&base, &el.children),
        };
        if anchor.is_some() {
            break;
        }
    }

    let mut focus = None;
    for (i, node) in children.iter().enumerate().rev() {
        let mut base = parent_path.to_vec();
        base.push(marker_ix + i);
        focus = match node {
            Node::Text(t) => Some(Point::new(base, t.text.len())),
            Node::Element(el) => last_text_leaf_point(&base, &el.children),
        };
        if focus.is_some() {
            break;
        }
    }

    let mut tx = Transaction::new(ops).source(TOGGLE_SOURCE);
    if let (Some(anchor), Some(focus)) = (anchor, focus) {
        tx = tx.selection_after(Selection { anchor, focus });
    }
    Ok(tx)
}

fn marker_element(children: Vec<Node>) -> Node {
    let mut attrs = Attrs::default();
    attrs.insert(
        "class".to_string(),
        Value::String(SPOILER_CLASS.to_string()),
    );
    Node::Element(ElementNode {
        kind: SPOILER_TAG.to_string(),
        attrs,
        children,
    })
}

fn inline_text_len(node: &Node) -> usize {
    match node {
        Node::Text(t) => t.text.len(),
        Node::Element(el) => total_inline_text_len(&el.children),
    }
}

pub(crate) fn total_inline_text_len(children: &[Node]) -> usize {
    children.iter().map(inline_text_len).sum()
}

fn point_global_offset(children: &[Node], rel_path: &[usize], offset: usize) -> usize {
    let Some((&target_ix, rest)) = rel_path.split_first() else {
        // The point addresses the container itself; its offset counts children.
        return children.iter().take(offset).map(inline_text_len).sum();
    };

    let mut global = 0usize;
    for (ix, node) in children.iter().enumerate() {
        if ix < target_ix {
            global += inline_text_len(node);
            continue;
        }
        match node {
            Node::Text(t) => {
                global += clamp_to_char_boundary(&t.text, offset.min(t.text.len()));
            }
            Node::Element(el) => {
                global += point_global_offset(&el.children, rest, offset);
            }
        }
        break;
    }
    global
}

fn first_text_leaf_point(base_path: &[usize], children: &[Node]) -> Option<Point> {
    for (ix, node) in children.iter().enumerate() {
        let mut path = base_path.to_vec();
        path.push(ix);
        match node {
            Node::Text(_) => return Some(Point::new(path, 0)),
            Node::Element(el) => {
                if let Some(point) = first_text_leaf_point(&path, &el.children) {
                    return Some(point);
                }
            }
        }
    }
    None
}

fn last_text_leaf_point(base_path: &[usize], children: &[Node]) -> Option<Point> {
    for (ix, node) in children.iter().enumerate().rev() {
        let mut path = base_path.to_vec();
        path.push(ix);
        match node {
            Node::Text(t) => return Some(Point::new(path, t.text.len())),
            Node::Element(el) => {
                if let Some(point) = last_text_leaf_point(&path, &el.children) {
                    return Some(point);
                }
            }
        }
    }
    None
}

/// Three-way split of an inline node list at two global offsets. A text leaf
/// straddling a boundary is cut at the offset; an element straddling one is
/// split into clones holding the partitioned children, so asymmetric
/// boundaries never need an atomic wrap primitive.
fn split_inline_nodes(nodes: &[Node], start: usize, end: usize) -> (Vec<Node>, Vec<Node>, Vec<Node>) {
    let mut before: Vec<Node> = Vec::new();
    let mut middle: Vec<Node> = Vec::new();
    let mut after: Vec<Node> = Vec::new();

    let mut cursor = 0usize;
    for node in nodes {
        let len = inline_text_len(node);
        let node_start = cursor;
        let node_end = cursor + len;
        cursor = node_end;

        if node_end <= start {
            before.push(node.clone());
            continue;
        }
        if node_start >= end {
            after.push(node.clone());
            continue;
        }
        if start <= node_start && node_end <= end {
            middle.push(node.clone());
            continue;
        }

        let cut_start = start.saturating_sub(node_start).min(len);
        let cut_end = (end - node_start).min(len);

        match node {
            Node::Text(t) => {
                let cut_start = clamp_to_char_boundary(&t.text, cut_start);
                let cut_end = clamp_to_char_boundary(&t.text, cut_end);
                let prefix = &t.text[..cut_start];
                let covered = &t.text[cut_start..cut_end];
                let suffix = &t.text[cut_end..];

                if !prefix.is_empty() {
                    before.push(Node::text(prefix));
                }
                if !covered.is_empty() {
                    middle.push(Node::text(covered));
                }
                if !suffix.is_empty() {
                    after.push(Node::text(suffix));
                }
            }
            Node::Element(el) => {
                let (b, m, a) = split_inline_nodes(&el.children, cut_start, cut_end);
                for (part, out) in [(b, &mut before), (m, &mut middle), (a, &mut after)] {
                    if total_inline_text_len(&part) > 0 {
                        out.push(Node::Element(ElementNode {
                            kind: el.kind.clone(),
                            attrs: el.attrs.clone(),
                            children: part,
                        }));
                    }
                }
            }
        }
    }

    (before, middle, after)
}

struct RemoveEmptyMarkers;

impl NormalizePass for RemoveEmptyMarkers {
    fn id(&self) -> &'static str {
        "spoiler.remove_empty_markers"
    }

    fn run(&self, doc: &Document, _registry: &PluginRegistry) -> Vec<Op> {
        fn walk(children: &[Node], path: &mut Vec<usize>) -> Option<Op> {
            for (ix, node) in children.iter().enumerate() {
                let Node::Element(el) = node else {
                    continue;
                };
                path.push(ix);
                if is_spoiler(el) && total_inline_text_len(&el.children) == 0 {
                    let op = Op::RemoveNode { path: path.clone() };
                    path.pop();
                    return Some(op);
                }
                if let Some(op) = walk(&el.children, path) {
                    path.pop();
                    return Some(op);
                }
                path.pop();
            }
            None
        }

        walk(&doc.children, &mut Vec::new()).into_iter().collect()
    }
}

struct FlattenNestedMarkers;

impl NormalizePass for FlattenNestedMarkers {
    fn id(&self) -> &'static str {
        "spoiler.flatten_nested_markers"
    }

    fn run(&self, doc: &Document, _registry: &PluginRegistry) -> Vec<Op> {
        fn walk(children: &[Node], path: &mut Vec<usize>, inside_marker: bool) -> Option<Vec<Op>> {
            for (ix, node) in children.iter().enumerate() {
                let Node::Element(el) = node else {
                    continue;
                };
                path.push(ix);

                if inside_marker && is_spoiler(el) {
                    let mut ops = vec![Op::RemoveNode { path: path.clone() }];
                    for (i, child) in el.children.iter().cloned().enumerate() {
                        let mut insert_path = path[..path.len() - 1].to_vec();
                        insert_path.push(ix + i);
                        ops.push(Op::InsertNode {
                            path: insert_path,
                            node: child,
                        });
                    }
                    path.pop();
                    return Some(ops);
                }

                if let Some(ops) = walk(&el.children, path, inside_marker || is_spoiler(el)) {
                    path.pop();
                    return Some(ops);
                }
                path.pop();
            }
            None
        }

        walk(&doc.children, &mut Vec::new(), false).unwrap_or_default()
    }
}
