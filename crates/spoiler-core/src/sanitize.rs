use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::{Attrs, Document, ElementKind, ElementNode, Node};
use crate::plugin::{PluginRegistry, element_is_text_block};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttrRule {
    Any,
    Equals(String),
}

/// Allow-list entry for one inline tag. Attributes not listed are stripped;
/// an `Equals` attribute that is absent or mismatched fails the whole rule
/// and the element is unwrapped into its children.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SanitizeRule {
    pub kind: ElementKind,
    #[serde(default)]
    pub keep_attrs: BTreeMap<String, AttrRule>,
}

impl SanitizeRule {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            keep_attrs: BTreeMap::new(),
        }
    }

    pub fn keep_attr(mut self, name: impl Into<String>, rule: AttrRule) -> Self {
        self.keep_attrs.insert(name.into(), rule);
        self
    }
}

fn attr_value_matches(name: &str, value: &Value, required: &str) -> bool {
    let Some(value) = value.as_str() else {
        return false;
    };
    if name == "class" {
        value.split_whitespace().any(|class| class == required)
    } else {
        value == required
    }
}

fn rule_matches(rule: &SanitizeRule, el: &ElementNode) -> bool {
    if rule.kind != el.kind {
        return false;
    }
    rule.keep_attrs.iter().all(|(name, attr_rule)| match attr_rule {
        AttrRule::Any => true,
        AttrRule::Equals(required) => el
            .attrs
            .get(name)
            .is_some_and(|value| attr_value_matches(name, value, required)),
    })
}

fn filtered_attrs(el: &ElementNode, rule: &SanitizeRule) -> Attrs {
    let mut attrs = Attrs::new();
    for (name, value) in &el.attrs {
        match rule.keep_attrs.get(name) {
            Some(AttrRule::Any) => {
                attrs.insert(name.clone(), value.clone());
            }
            Some(AttrRule::Equals(required)) => {
                attrs.insert(name.clone(), Value::String(required.clone()));
            }
            None => {}
        }
    }
    attrs
}

pub fn sanitize_document(doc: &Document, registry: &PluginRegistry) -> Document {
    Document {
        children: sanitize_blocks(&doc.children, registry),
    }
}

fn sanitize_blocks(children: &[Node], registry: &PluginRegistry) -> Vec<Node> {
    children
        .iter()
        .map(|node| match node {
            Node::Text(_) => node.clone(),
            Node::Element(el) => {
                let children = if element_is_text_block(el, registry) {
                    sanitize_inline(&el.children, registry)
                } else {
                    sanitize_blocks(&el.children, registry)
                };
                Node::Element(ElementNode {
                    kind: el.kind.clone(),
                    attrs: el.attrs.clone(),
                    children,
                })
            }
        })
        .collect()
}

fn sanitize_inline(children: &[Node], registry: &PluginRegistry) -> Vec<Node> {
    let mut out = Vec::new();
    for node in children {
        match node {
            Node::Text(_) => out.push(node.clone()),
            Node::Element(el) => {
                let inner = sanitize_inline(&el.children, registry);
                let rule = registry
                    .sanitize_rules()
                    .iter()
                    .find(|rule| rule_matches(rule, el));
                match rule {
                    Some(rule) => out.push(Node::Element(ElementNode {
                        kind: el.kind.clone(),
                        attrs: filtered_attrs(el, rule),
                        children: inner,
                    })),
                    None => out.extend(inner),
                }
            }
        }
    }
    out
}
