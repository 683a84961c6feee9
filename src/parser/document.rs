use std::collections::HashMap;

use scraper::{Html, Node};

/// Navigable view over a parsed document.
///
/// The positional rules the report pages need (label node, one decorative
/// node, value node) are expressed once here, in the provided methods, so the
/// field readers never walk siblings by hand.
pub trait DocumentNode: Copy {
    /// Descendant text nodes (preorder) whose content equals `text` exactly.
    fn find_all_text(&self, text: &str) -> Vec<Self>;
    /// Descendant elements carrying every class in the whitespace-separated `classes`.
    fn find_all_class(&self, classes: &str) -> Vec<Self>;
    fn parent(&self) -> Option<Self>;
    fn next_sibling(&self) -> Option<Self>;
    fn children(&self) -> Vec<Self>;
    /// Text reached by descending through single-child nodes, if any.
    fn string(&self) -> Option<String>;
    fn attr(&self, name: &str) -> Option<String>;
    fn tag_name(&self) -> Option<String>;

    fn find_text(&self, text: &str) -> Option<Self> {
        self.find_all_text(text).into_iter().next()
    }

    fn find_class(&self, classes: &str) -> Option<Self> {
        self.find_all_class(classes).into_iter().next()
    }

    /// Sibling after the next one: skips exactly one intervening node.
    fn skip_one(&self) -> Option<Self> {
        self.next_sibling()?.next_sibling()
    }

    /// Value node for the first occurrence of `label`.
    fn value_after_label(&self, label: &str) -> Option<Self> {
        self.find_text(label)?.parent()?.skip_one()
    }

    /// Repeated values after the `occurrence`-th (0-based) match of `label`.
    ///
    /// The first value is always taken, as an empty entry when it has no
    /// text. Every following value is checked against `stop` and the walk ends
    /// at the first one it accepts. A broken sibling chain or a later value
    /// without text yields `None` for the whole list.
    fn values_after_label<P>(&self, label: &str, occurrence: usize, stop: P) -> Option<Vec<String>>
    where
        P: Fn(&str) -> bool,
    {
        let anchor = self.find_all_text(label).into_iter().nth(occurrence)?.parent()?;
        let mut current = anchor.skip_one()?;
        let mut values = vec![current.string().unwrap_or_default()];
        loop {
            current = current.skip_one()?;
            let text = current.string()?;
            if stop(&text) {
                break;
            }
            values.push(text);
        }
        Some(values)
    }
}

#[derive(Debug, Clone)]
enum NodeKind {
    Root,
    Element {
        name: String,
        attrs: Vec<(String, String)>,
    },
    Text(String),
    Comment(String),
    Other,
}

impl From<&Node> for NodeKind {
    fn from(node: &Node) -> Self {
        match node {
            Node::Document | Node::Fragment => NodeKind::Root,
            Node::Element(el) => NodeKind::Element {
                name: el.name().to_string(),
                attrs: el
                    .attrs()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            },
            Node::Text(t) => NodeKind::Text(t.text.to_string()),
            Node::Comment(c) => NodeKind::Comment(c.comment.to_string()),
            _ => NodeKind::Other,
        }
    }
}

#[derive(Debug, Clone)]
struct NodeData {
    kind: NodeKind,
    parent: Option<usize>,
    children: Vec<usize>,
    /// Index of this node within its parent's children.
    position: usize,
}

/// Owned arena copy of an html5ever tree.
///
/// Owning the strings makes a `Document` `Send`, so pages can be parsed on
/// the rayon pool and moved across tasks.
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<NodeData>,
}

impl Document {
    pub fn parse(markup: &str) -> Self {
        let html = Html::parse_document(markup);
        let mut nodes: Vec<NodeData> = Vec::new();
        let mut index = HashMap::new();

        for node in html.tree.root().descendants() {
            let id = nodes.len();
            index.insert(node.id(), id);
            let parent = node.parent().and_then(|p| index.get(&p.id()).copied());
            let position = match parent {
                Some(p) => {
                    nodes[p].children.push(id);
                    nodes[p].children.len() - 1
                }
                None => 0,
            };
            nodes.push(NodeData {
                kind: NodeKind::from(node.value()),
                parent,
                children: Vec::new(),
                position,
            });
        }

        Document { nodes }
    }

    pub fn root(&self) -> HtmlNode<'_> {
        HtmlNode { doc: self, id: 0 }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct HtmlNode<'a> {
    doc: &'a Document,
    id: usize,
}

impl<'a> HtmlNode<'a> {
    fn data(&self) -> &'a NodeData {
        &self.doc.nodes[self.id]
    }

    fn at(&self, id: usize) -> Self {
        HtmlNode { doc: self.doc, id }
    }

    fn descendants(&self) -> Vec<Self> {
        let mut out = Vec::new();
        let mut stack: Vec<usize> = self.data().children.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            out.push(self.at(id));
            stack.extend(self.doc.nodes[id].children.iter().rev().copied());
        }
        out
    }

    fn has_classes(&self, wanted: &[&str]) -> bool {
        match &self.data().kind {
            NodeKind::Element { attrs, .. } => {
                let Some((_, class)) = attrs.iter().find(|(k, _)| k == "class") else {
                    return false;
                };
                let have: Vec<&str> = class.split_whitespace().collect();
                wanted.iter().all(|w| have.contains(w))
            }
            _ => false,
        }
    }
}

impl DocumentNode for HtmlNode<'_> {
    fn find_all_text(&self, text: &str) -> Vec<Self> {
        self.descendants()
            .into_iter()
            .filter(|n| matches!(&n.data().kind, NodeKind::Text(t) if t == text))
            .collect()
    }

    fn find_all_class(&self, classes: &str) -> Vec<Self> {
        let wanted: Vec<&str> = classes.split_whitespace().collect();
        if wanted.is_empty() {
            return Vec::new();
        }
        self.descendants()
            .into_iter()
            .filter(|n| n.has_classes(&wanted))
            .collect()
    }

    fn parent(&self) -> Option<Self> {
        self.data().parent.map(|p| self.at(p))
    }

    fn next_sibling(&self) -> Option<Self> {
        let parent = self.data().parent?;
        let next = self.doc.nodes[parent]
            .children
            .get(self.data().position + 1)?;
        Some(self.at(*next))
    }

    fn children(&self) -> Vec<Self> {
        self.data().children.iter().map(|c| self.at(*c)).collect()
    }

    fn string(&self) -> Option<String> {
        match &self.data().kind {
            NodeKind::Text(t) | NodeKind::Comment(t) => Some(t.clone()),
            NodeKind::Element { .. } | NodeKind::Root => match self.data().children.as_slice() {
                [only] => self.at(*only).string(),
                _ => None,
            },
            NodeKind::Other => None,
        }
    }

    fn attr(&self, name: &str) -> Option<String> {
        match &self.data().kind {
            NodeKind::Element { attrs, .. } => attrs
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.clone()),
            _ => None,
        }
    }

    fn tag_name(&self) -> Option<String> {
        match &self.data().kind {
            NodeKind::Element { name, .. } => Some(name.clone()),
            _ => None,
        }
    }
}
