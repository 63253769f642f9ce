//! Accumulated input requirements and the requirement tree built from them.

use indexmap::IndexMap;
use morph_core::{AccessPath, AccessSegment, Node, NodeKind, ValueShape};

/// What synthesis learned about one input path.
#[derive(Debug, Clone, PartialEq)]
pub struct RequirementRecord {
    pub shape: ValueShape,
    /// Read on every path through the transform.
    pub required: bool,
    /// Named by a coalesce alternative; never required, whatever else says.
    pub forced_optional: bool,
}

/// Per-path requirement records, in discovery order.
#[derive(Debug, Clone, Default)]
pub struct Requirements {
    records: IndexMap<AccessPath, RequirementRecord>,
}

impl Requirements {
    /// Records an access of `path` with the locally inferred `shape`.
    ///
    /// Paths through a dynamic segment are never recorded.
    pub fn record(&mut self, path: &AccessPath, shape: &ValueShape, required: bool) {
        if path.has_dynamic() || path.is_empty() {
            return;
        }
        match self.records.get_mut(path) {
            Some(existing) => {
                existing.shape = existing.shape.constrain(shape);
                existing.required |= required;
            }
            None => {
                self.records.insert(
                    path.clone(),
                    RequirementRecord {
                        shape: shape.clone(),
                        required,
                        forced_optional: false,
                    },
                );
            }
        }
    }

    /// Narrows the recorded shape of `path` to `constraint` while it is still
    /// unconstrained. A path with a known shape keeps it.
    pub fn constrain(&mut self, path: &AccessPath, constraint: &ValueShape) {
        if path.has_dynamic() || path.is_empty() {
            return;
        }
        let record = self
            .records
            .entry(path.clone())
            .or_insert_with(|| RequirementRecord {
                shape: ValueShape::Unknown,
                required: false,
                forced_optional: false,
            });
        if record.shape.is_unknown() {
            record.shape = constraint.clone();
        }
    }

    /// Forces `path` and every prefix of it to be optional.
    pub fn force_optional(&mut self, path: &AccessPath) {
        for prefix in path.prefixes() {
            let record = self
                .records
                .entry(prefix)
                .or_insert_with(|| RequirementRecord {
                    shape: ValueShape::Unknown,
                    required: false,
                    forced_optional: true,
                });
            record.forced_optional = true;
        }
    }

    pub fn get(&self, path: &AccessPath) -> Option<&RequirementRecord> {
        self.records.get(path)
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Builds the input requirement tree.
    ///
    /// Intermediate paths without a record become open objects (or arrays
    /// under an index segment). A node is required if its own record or any
    /// descendant's says so, unless it is forced optional.
    pub fn build_tree(&self) -> Node {
        if self.records.is_empty() {
            return Node::any();
        }
        let mut trie = Trie::default();
        for (path, record) in &self.records {
            trie.insert(path.segments(), record);
        }
        let mut root = trie.to_node();
        root.required = true;
        if root.kind == NodeKind::Any {
            root = Node::object(true);
        }
        root
    }
}

#[derive(Default)]
struct Trie<'a> {
    record: Option<&'a RequirementRecord>,
    fields: IndexMap<String, Trie<'a>>,
    element: Option<Box<Trie<'a>>>,
}

impl<'a> Trie<'a> {
    fn insert(&mut self, segments: &[AccessSegment], record: &'a RequirementRecord) {
        let Some((first, rest)) = segments.split_first() else {
            self.record = Some(record);
            return;
        };
        let child = match first {
            AccessSegment::Field(name) => self.fields.entry(name.clone()).or_default(),
            AccessSegment::Index(_) | AccessSegment::Dynamic => {
                &mut **self.element.get_or_insert_with(Box::default)
            }
        };
        child.insert(rest, record);
    }

    fn any_required(&self) -> bool {
        self.record.is_some_and(|r| r.required)
            || self.fields.values().any(Trie::any_required)
            || self.element.as_ref().is_some_and(|e| e.any_required())
    }

    fn forced_optional(&self) -> bool {
        self.record.is_some_and(|r| r.forced_optional)
    }

    fn to_node(&self) -> Node {
        let shape = self
            .record
            .map(|r| r.shape.clone())
            .unwrap_or(ValueShape::Unknown);
        let mut node = Node::from_shape(&shape, true);

        if !self.fields.is_empty() {
            let children: IndexMap<String, Node> = self
                .fields
                .iter()
                .map(|(name, child)| {
                    let mut node = child.to_node();
                    node.required = child.any_required() && !child.forced_optional();
                    (name.clone(), node)
                })
                .collect();
            node = attach_children(node, children);
        }
        if let Some(element) = &self.element {
            node = attach_element(node, element.to_node());
        }
        node
    }
}

/// Puts `children` on the object part of `node`, adding one if needed.
///
/// An `Any` node that acquires children becomes an open object.
pub fn attach_children(node: Node, children: IndexMap<String, Node>) -> Node {
    let required = node.required;
    let merge_into = |mut object: Node| {
        for (name, child) in &children {
            object.children.insert(name.clone(), child.clone());
        }
        object
    };
    let mut result = match node.kind {
        NodeKind::Any | NodeKind::Never => merge_into(Node::object(true)),
        NodeKind::Object => merge_into(node),
        NodeKind::Union => {
            let mut node = node;
            match node.options.iter().position(|o| o.kind == NodeKind::Object) {
                Some(i) => {
                    let object = node.options.remove(i);
                    node.options.insert(i, merge_into(object));
                }
                None => node.options.push(merge_into(Node::object(true))),
            }
            node
        }
        _ => Node::union(vec![node, merge_into(Node::object(true))]),
    };
    result.required = required;
    result
}

/// Puts `element` on the array/set part of `node`, adding an array if needed.
pub fn attach_element(node: Node, element: Node) -> Node {
    let required = node.required;
    let set_element = |mut container: Node| {
        let keep_existing = container
            .element
            .as_ref()
            .is_some_and(|e| e.kind != NodeKind::Any && element.kind == NodeKind::Any);
        if !keep_existing {
            container.element = Some(Box::new(element.clone()));
        }
        container
    };
    let mut result = match node.kind {
        NodeKind::Any | NodeKind::Never => Node::array(element.clone()),
        NodeKind::Array | NodeKind::Set => set_element(node),
        NodeKind::Union => {
            let mut node = node;
            match node
                .options
                .iter()
                .position(|o| matches!(o.kind, NodeKind::Array | NodeKind::Set))
            {
                Some(i) => {
                    let container = node.options.remove(i);
                    node.options.insert(i, set_element(container));
                }
                None => node.options.push(Node::array(element.clone())),
            }
            node
        }
        _ => Node::union(vec![node, Node::array(element.clone())]),
    };
    result.required = required;
    result
}
