//! Editable tree of schema fields.
//!
//! The tree is an ordered list of [`FieldNode`]s; a node is either a text
//! leaf or a group holding further nodes. Every edit is addressed by node id
//! and applied by rebuilding the tree through [`rewrite_tree`], so branches
//! that do not contain the target come out equal to what went in and sibling
//! order never changes.
//!
//! Which groups are expanded is view state kept beside the tree in
//! [`EditorState::expanded`]; toggling it never touches the fields.
//!
//! The edited tree is a standalone configuration surface. Extraction always
//! uses the fixed record schema in [`crate::schema`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt::Write as _;

/// One node of the schema tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldNode {
    pub id: String,
    pub name: String,
    #[serde(flatten)]
    pub kind: FieldKind,
}

/// Node kind. Only groups carry children.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum FieldKind {
    Text,
    Group { children: Vec<FieldNode> },
}

/// Kind without payload, used for updates and rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Text,
    Group,
}

impl FieldNode {
    /// A text field.
    pub fn text(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind: FieldKind::Text,
        }
    }

    pub fn group(id: impl Into<String>, name: impl Into<String>, children: Vec<FieldNode>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind: FieldKind::Group { children },
        }
    }

    pub fn field_type(&self) -> FieldType {
        match self.kind {
            FieldKind::Text => FieldType::Text,
            FieldKind::Group { .. } => FieldType::Group,
        }
    }

    /// Children of a group; empty for a text field.
    pub fn children(&self) -> &[FieldNode] {
        match &self.kind {
            FieldKind::Text => &[],
            FieldKind::Group { children } => children,
        }
    }
}

/// Partial update for [`EditorState::update_field`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<FieldType>,
}

impl FieldUpdate {
    pub fn rename(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            kind: None,
        }
    }

    pub fn retype(kind: FieldType) -> Self {
        Self {
            name: None,
            kind: Some(kind),
        }
    }

    fn apply_to(&self, field: &FieldNode) -> FieldNode {
        let name = self.name.clone().unwrap_or_else(|| field.name.clone());
        let kind = match (self.kind, &field.kind) {
            // text → group starts empty; group → text drops every child.
            (Some(FieldType::Group), FieldKind::Text) => FieldKind::Group {
                children: Vec::new(),
            },
            (Some(FieldType::Text), FieldKind::Group { .. }) => FieldKind::Text,
            (_, kind) => kind.clone(),
        };
        FieldNode {
            id: field.id.clone(),
            name,
            kind,
        }
    }
}

/// Rebuild `fields`, replacing every node for which `matches` holds with the
/// output of `transform` (`None` deletes it). Non-matching groups are rebuilt
/// recursively; a replaced node's subtree is not searched again.
pub fn rewrite_tree<P, T>(fields: &[FieldNode], matches: &P, transform: &T) -> Vec<FieldNode>
where
    P: Fn(&FieldNode) -> bool,
    T: Fn(&FieldNode) -> Option<FieldNode>,
{
    fields
        .iter()
        .filter_map(|field| {
            if matches(field) {
                return transform(field);
            }
            Some(match &field.kind {
                FieldKind::Text => field.clone(),
                FieldKind::Group { children } => FieldNode {
                    id: field.id.clone(),
                    name: field.name.clone(),
                    kind: FieldKind::Group {
                        children: rewrite_tree(children, matches, transform),
                    },
                },
            })
        })
        .collect()
}

/// Find a node anywhere in the tree.
pub fn find_field<'a>(fields: &'a [FieldNode], id: &str) -> Option<&'a FieldNode> {
    fields.iter().find_map(|field| {
        if field.id == id {
            Some(field)
        } else {
            find_field(field.children(), id)
        }
    })
}

/// Generate an id that has not been handed out before.
pub fn new_field_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// The invoice record schema as an editable tree.
pub fn default_schema() -> Vec<FieldNode> {
    vec![
        FieldNode::text("1", "company"),
        FieldNode::text("2", "address"),
        FieldNode::text("3", "total_sum"),
        FieldNode::group(
            "4",
            "items",
            vec![
                FieldNode::text("4.1", "item"),
                FieldNode::text("4.2", "unit_price"),
                FieldNode::text("4.3", "quantity"),
                FieldNode::text("4.4", "sum"),
            ],
        ),
    ]
}

/// Edits accepted by [`EditorState::apply`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum EditorCommand {
    AddField { parent_id: Option<String> },
    RemoveField { id: String },
    UpdateField { id: String, update: FieldUpdate },
    ToggleGroup { id: String },
}

/// Schema tree plus the set of expanded group ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditorState {
    pub fields: Vec<FieldNode>,
    pub expanded: BTreeSet<String>,
}

impl Default for EditorState {
    /// The default invoice schema with the `items` group expanded.
    fn default() -> Self {
        Self {
            fields: default_schema(),
            expanded: BTreeSet::from(["4".to_string()]),
        }
    }
}

impl EditorState {
    pub fn new(fields: Vec<FieldNode>) -> Self {
        Self {
            fields,
            expanded: BTreeSet::new(),
        }
    }

    /// Apply one command and return the new state.
    pub fn apply(self, command: EditorCommand) -> Self {
        match command {
            EditorCommand::AddField { parent_id } => {
                self.add_field_with_id(parent_id.as_deref(), new_field_id())
            }
            EditorCommand::RemoveField { id } => self.remove_field(&id),
            EditorCommand::UpdateField { id, update } => self.update_field(&id, &update),
            EditorCommand::ToggleGroup { id } => self.toggle_group(&id),
        }
    }

    /// Apply commands in order.
    pub fn apply_all(self, commands: impl IntoIterator<Item = EditorCommand>) -> Self {
        commands.into_iter().fold(self, Self::apply)
    }

    /// Append an unnamed text field at the root or under group `parent_id`.
    pub fn add_field(self, parent_id: Option<&str>) -> Self {
        self.add_field_with_id(parent_id, new_field_id())
    }

    /// [`Self::add_field`] with a caller-chosen id. Naming a text field or an
    /// unknown id as parent leaves the tree unchanged.
    pub fn add_field_with_id(self, parent_id: Option<&str>, id: impl Into<String>) -> Self {
        let new_field = FieldNode::text(id, "");
        let fields = match parent_id {
            None => {
                let mut fields = self.fields;
                fields.push(new_field);
                fields
            }
            Some(parent_id) => rewrite_tree(
                &self.fields,
                &|field: &FieldNode| field.id == parent_id,
                &|field: &FieldNode| {
                    Some(match &field.kind {
                        FieldKind::Text => field.clone(),
                        FieldKind::Group { children } => {
                            let mut children = children.clone();
                            children.push(new_field.clone());
                            FieldNode::group(field.id.clone(), field.name.clone(), children)
                        }
                    })
                },
            ),
        };
        Self { fields, ..self }
    }

    /// Delete the node with `id` (and its subtree) wherever it is.
    pub fn remove_field(self, id: &str) -> Self {
        let fields = rewrite_tree(&self.fields, &|field: &FieldNode| field.id == id, &|_: &FieldNode| None);
        Self { fields, ..self }
    }

    /// Rename and/or retype the node with `id`.
    pub fn update_field(self, id: &str, update: &FieldUpdate) -> Self {
        let fields = rewrite_tree(
            &self.fields,
            &|field: &FieldNode| field.id == id,
            &|field: &FieldNode| Some(update.apply_to(field)),
        );
        Self { fields, ..self }
    }

    /// Flip whether group `id` shows its children.
    pub fn toggle_group(mut self, id: &str) -> Self {
        if !self.expanded.remove(id) {
            self.expanded.insert(id.to_string());
        }
        self
    }

    pub fn is_expanded(&self, id: &str) -> bool {
        self.expanded.contains(id)
    }

    pub fn find(&self, id: &str) -> Option<&FieldNode> {
        find_field(&self.fields, id)
    }
}

// ── Rendering ────────────────────────────────────────────────────────────

/// One visible row of the rendered tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutlineLine {
    pub depth: usize,
    pub id: String,
    pub name: String,
    pub kind: FieldType,
    /// `Some(expanded)` for groups, `None` for text fields.
    pub expanded: Option<bool>,
}

/// Walk the tree depth-first, emitting the rows a user would see.
/// Children of collapsed groups are skipped.
pub fn render_outline(state: &EditorState) -> Vec<OutlineLine> {
    let mut lines = Vec::new();
    push_lines(&state.fields, 0, state, &mut lines);
    lines
}

fn push_lines(fields: &[FieldNode], depth: usize, state: &EditorState, out: &mut Vec<OutlineLine>) {
    for field in fields {
        let expanded = match field.kind {
            FieldKind::Text => None,
            FieldKind::Group { .. } => Some(state.is_expanded(&field.id)),
        };
        out.push(OutlineLine {
            depth,
            id: field.id.clone(),
            name: field.name.clone(),
            kind: field.field_type(),
            expanded,
        });
        if expanded == Some(true) {
            push_lines(field.children(), depth + 1, state, out);
        }
    }
}

/// Plain-text rendering of [`render_outline`], two spaces per level.
pub fn render_text(state: &EditorState) -> String {
    let mut out = String::new();
    for line in render_outline(state) {
        let marker = match line.expanded {
            None => "-",
            Some(true) => "[-]",
            Some(false) => "[+]",
        };
        let name = if line.name.is_empty() {
            "(unnamed)"
        } else {
            line.name.as_str()
        };
        let kind = match line.kind {
            FieldType::Text => "text",
            FieldType::Group => "group",
        };
        let _ = writeln!(out, "{}{} {} ({})", "  ".repeat(line.depth), marker, name, kind);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items_children(state: &EditorState) -> Vec<String> {
        state
            .find("4")
            .unwrap()
            .children()
            .iter()
            .map(|f| f.id.clone())
            .collect()
    }

    #[test]
    fn add_without_parent_appends_at_root() {
        let state = EditorState::default().add_field_with_id(None, "new");
        assert_eq!(state.fields.len(), 5);
        let last = state.fields.last().unwrap();
        assert_eq!(last.id, "new");
        assert_eq!(last.name, "");
        assert_eq!(last.kind, FieldKind::Text);
    }

    #[test]
    fn add_under_group_leaves_siblings_alone() {
        let start = EditorState::new(vec![
            FieldNode::group("a", "first", vec![FieldNode::text("a1", "x")]),
            FieldNode::group("b", "second", vec![FieldNode::text("b1", "y")]),
        ]);
        let state = start.clone().add_field_with_id(Some("b"), "b2");
        assert_eq!(state.fields[0], start.fields[0]);
        let ids: Vec<_> = state.fields[1].children().iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, ["b1", "b2"]);
    }

    #[test]
    fn add_under_nested_group() {
        let state = EditorState::new(vec![FieldNode::group(
            "outer",
            "outer",
            vec![FieldNode::group("inner", "inner", vec![])],
        )])
        .add_field_with_id(Some("inner"), "leaf");
        let inner = state.find("inner").unwrap();
        assert_eq!(inner.children().len(), 1);
        assert_eq!(inner.children()[0].id, "leaf");
    }

    #[test]
    fn add_under_unknown_or_text_parent_is_noop() {
        let start = EditorState::default();
        assert_eq!(start.clone().add_field_with_id(Some("nope"), "x"), start);
        assert_eq!(start.clone().add_field_with_id(Some("1"), "x"), start);
    }

    #[test]
    fn generated_ids_are_unique() {
        let state = EditorState::default()
            .apply(EditorCommand::AddField { parent_id: None })
            .apply(EditorCommand::AddField { parent_id: None });
        assert_ne!(state.fields[4].id, state.fields[5].id);
    }

    #[test]
    fn remove_nested_field() {
        let state = EditorState::default().remove_field("4.2");
        assert_eq!(items_children(&state), ["4.1", "4.3", "4.4"]);
        assert_eq!(state.fields.len(), 4);
    }

    #[test]
    fn remove_group_takes_subtree() {
        let state = EditorState::default().remove_field("4");
        assert_eq!(state.fields.len(), 3);
        assert!(state.find("4.1").is_none());
    }

    #[test]
    fn remove_unknown_id_is_noop() {
        let start = EditorState::default();
        let after = start.clone().remove_field("missing");
        assert_eq!(after, start);
        assert_eq!(
            serde_json::to_string(&after).unwrap(),
            serde_json::to_string(&start).unwrap()
        );
    }

    #[test]
    fn rename_only_touches_target() {
        let start = EditorState::default();
        let state = start.clone().update_field("4.3", &FieldUpdate::rename("qty"));
        assert_eq!(state.find("4.3").unwrap().name, "qty");
        assert_eq!(state.fields[..3], start.fields[..3]);
        assert_eq!(state.find("4.4"), start.find("4.4"));
    }

    #[test]
    fn text_to_group_starts_empty() {
        let state = EditorState::default().update_field("2", &FieldUpdate::retype(FieldType::Group));
        let field = state.find("2").unwrap();
        assert_eq!(field.kind, FieldKind::Group { children: vec![] });
        assert_eq!(field.name, "address");
    }

    #[test]
    fn group_to_text_discards_children() {
        let state = EditorState::default().update_field("4", &FieldUpdate::retype(FieldType::Text));
        let field = state.find("4").unwrap();
        assert_eq!(field.kind, FieldKind::Text);
        assert!(state.find("4.1").is_none());
    }

    #[test]
    fn same_kind_update_keeps_children() {
        let state = EditorState::default().update_field(
            "4",
            &FieldUpdate {
                name: Some("lines".into()),
                kind: Some(FieldType::Group),
            },
        );
        assert_eq!(state.find("4").unwrap().name, "lines");
        assert_eq!(items_children(&state).len(), 4);
    }

    #[test]
    fn toggle_group_does_not_touch_tree() {
        let start = EditorState::default();
        let collapsed = start.clone().toggle_group("4");
        assert!(!collapsed.is_expanded("4"));
        assert_eq!(collapsed.fields, start.fields);
        let expanded = collapsed.toggle_group("4");
        assert!(expanded.is_expanded("4"));
    }

    #[test]
    fn outline_hides_collapsed_children() {
        let open = render_outline(&EditorState::default());
        assert_eq!(open.len(), 8);
        assert_eq!(open[4].depth, 1);
        assert_eq!(open[3].expanded, Some(true));

        let closed = render_outline(&EditorState::default().toggle_group("4"));
        assert_eq!(closed.len(), 4);
        assert_eq!(closed[3].expanded, Some(false));
    }

    #[test]
    fn text_rendering() {
        let state = EditorState::default().add_field_with_id(Some("4"), "4.5");
        let text = render_text(&state);
        assert!(text.starts_with("- company (text)\n"));
        assert!(text.contains("[-] items (group)\n"));
        assert!(text.contains("\n  - unit_price (text)\n"));
        assert!(text.ends_with("  - (unnamed) (text)\n"));
    }

    #[test]
    fn serde_shape() {
        let json = serde_json::to_value(&default_schema()[3]).unwrap();
        assert_eq!(json["kind"], "group");
        assert_eq!(json["children"][0]["name"], "item");
        assert!(serde_json::to_value(&default_schema()[0])
            .unwrap()
            .get("children")
            .is_none());

        let back: FieldNode = serde_json::from_value(json).unwrap();
        assert_eq!(back, default_schema()[3]);
    }

    #[test]
    fn command_json_round_trip_through_apply() {
        let cmd: EditorCommand =
            serde_json::from_str(r#"{"op":"update_field","id":"1","update":{"name":"vendor"}}"#)
                .unwrap();
        let state = EditorState::default().apply(cmd);
        assert_eq!(state.find("1").unwrap().name, "vendor");
    }

    #[test]
    fn command_list_from_json() {
        let commands: Vec<EditorCommand> = serde_json::from_str(
            r#"[
                {"op":"update_field","id":"2","update":{"kind":"group"}},
                {"op":"add_field","parent_id":"2"},
                {"op":"remove_field","id":"3"},
                {"op":"toggle_group","id":"4"},
                {"op":"add_field","parent_id":null}
            ]"#,
        )
        .unwrap();
        let start = EditorState::default();
        let root_len = start.fields.len();
        let state = start.apply_all(commands);

        assert_eq!(state.find("2").unwrap().children().len(), 1);
        assert!(state.find("3").is_none());
        assert!(!state.is_expanded("4"));
        assert_eq!(state.fields.len(), root_len);
        assert_eq!(state.fields.last().unwrap().name, "");
    }
}
