//! Typed local edits.
//!
//! The UI reports edits as loose payloads (`{ id, text?, pos?, new?, ... }`).
//! Those are parsed into a [`LocalEditPayload`] (unknown fields rejected) and
//! then converted into a [`LocalEdit`], which separates content changes
//! ([`ContentPatch`]) from structural ones ([`Placement`]).
//!
//! A payload that carries `pos` or `parent_id` without `new` is treated as a
//! move even when `posChange` is absent, so every position change goes
//! through a child-index rebuild.

use serde::{Deserialize, Deserializer, Serialize};

use super::node::{Node, NodeId};

// ---------------------------------------------------------------------------
// ContentPatch
// ---------------------------------------------------------------------------

/// Field updates that never affect tree structure.
///
/// `None` leaves a field untouched. For the optional references,
/// `Some(None)` clears the field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContentPatch {
    pub text: Option<String>,
    pub checked: Option<bool>,
    pub collapsed: Option<bool>,
    pub note_id: Option<Option<String>>,
    pub file_id: Option<Option<String>>,
    pub pinned_pos: Option<Option<f64>>,
}

impl ContentPatch {
    /// True when the patch changes nothing.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.text.is_none()
            && self.checked.is_none()
            && self.collapsed.is_none()
            && self.note_id.is_none()
            && self.file_id.is_none()
            && self.pinned_pos.is_none()
    }

    /// Write the patched fields onto `node`.
    pub fn apply(&self, node: &mut Node) {
        if let Some(text) = &self.text {
            node.text.clone_from(text);
        }
        if let Some(checked) = self.checked {
            node.checked = checked;
        }
        if let Some(collapsed) = self.collapsed {
            node.collapsed = collapsed;
        }
        if let Some(note_id) = &self.note_id {
            node.note_id.clone_from(note_id);
        }
        if let Some(file_id) = &self.file_id {
            node.file_id.clone_from(file_id);
        }
        if let Some(pinned_pos) = self.pinned_pos {
            node.pinned_pos = pinned_pos;
        }
    }
}

// ---------------------------------------------------------------------------
// Placement
// ---------------------------------------------------------------------------

/// Structural effect of an edit.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Placement {
    /// Content-only edit; parent and position stay as they are.
    #[default]
    Keep,
    /// A brand-new node under `parent_id` at `pos`.
    Create { parent_id: NodeId, pos: f64 },
    /// Reposition an existing node. `None` keeps the current value.
    Move {
        parent_id: Option<NodeId>,
        pos: Option<f64>,
    },
}

impl Placement {
    /// Whether the child index must be rebuilt after applying this placement.
    #[must_use]
    pub const fn touches_index(&self) -> bool {
        !matches!(self, Self::Keep)
    }

    /// Write the placement onto `node`.
    pub fn apply(&self, node: &mut Node) {
        match self {
            Self::Keep => {}
            Self::Create { parent_id, pos } => {
                node.parent_id = Some(parent_id.clone());
                node.pos = *pos;
            }
            Self::Move { parent_id, pos } => {
                if let Some(parent_id) = parent_id {
                    node.parent_id = Some(parent_id.clone());
                }
                if let Some(pos) = pos {
                    node.pos = *pos;
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// LocalEdit
// ---------------------------------------------------------------------------

/// A validated local edit, ready for the reconciler.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalEdit {
    pub id: NodeId,
    pub content: ContentPatch,
    pub placement: Placement,
}

impl LocalEdit {
    /// Create a new node under `parent_id`.
    pub fn create(id: impl Into<NodeId>, parent_id: impl Into<NodeId>, pos: f64) -> Self {
        Self {
            id: id.into(),
            content: ContentPatch::default(),
            placement: Placement::Create {
                parent_id: parent_id.into(),
                pos,
            },
        }
    }

    /// A content-only edit of an existing node.
    pub fn update(id: impl Into<NodeId>) -> Self {
        Self {
            id: id.into(),
            content: ContentPatch::default(),
            placement: Placement::Keep,
        }
    }

    /// Move a node under `parent_id` at `pos`.
    pub fn move_to(id: impl Into<NodeId>, parent_id: impl Into<NodeId>, pos: f64) -> Self {
        Self {
            id: id.into(),
            content: ContentPatch::default(),
            placement: Placement::Move {
                parent_id: Some(parent_id.into()),
                pos: Some(pos),
            },
        }
    }

    #[must_use]
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.content.text = Some(text.into());
        self
    }

    #[must_use]
    pub const fn checked(mut self, checked: bool) -> Self {
        self.content.checked = Some(checked);
        self
    }

    #[must_use]
    pub const fn collapsed(mut self, collapsed: bool) -> Self {
        self.content.collapsed = Some(collapsed);
        self
    }

    #[must_use]
    pub const fn pinned_pos(mut self, pinned_pos: Option<f64>) -> Self {
        self.content.pinned_pos = Some(pinned_pos);
        self
    }

    #[must_use]
    pub fn note_id(mut self, note_id: Option<String>) -> Self {
        self.content.note_id = Some(note_id);
        self
    }

    #[must_use]
    pub fn file_id(mut self, file_id: Option<String>) -> Self {
        self.content.file_id = Some(file_id);
        self
    }
}

// ---------------------------------------------------------------------------
// Wire payload
// ---------------------------------------------------------------------------

/// Local edit as emitted by UI components.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LocalEditPayload {
    pub id: NodeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<NodeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checked: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collapsed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pos: Option<f64>,
    #[serde(default, rename = "new")]
    pub is_new: bool,
    #[serde(default, rename = "posChange")]
    pub pos_change: bool,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub note_id: Option<Option<String>>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub file_id: Option<Option<String>>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub pinned_pos: Option<Option<f64>>,
}

/// Distinguish an absent field (`None`) from an explicit `null` (`Some(None)`).
fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Reasons a wire payload cannot become a [`LocalEdit`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatchError {
    #[error("new node '{0}' has no parent_id")]
    MissingParent(NodeId),
    #[error("new node '{0}' has no pos")]
    MissingPos(NodeId),
    #[error("node '{0}' cannot be its own parent")]
    SelfParent(NodeId),
}

impl TryFrom<LocalEditPayload> for LocalEdit {
    type Error = PatchError;

    fn try_from(payload: LocalEditPayload) -> Result<Self, Self::Error> {
        let LocalEditPayload {
            id,
            parent_id,
            text,
            checked,
            collapsed,
            pos,
            is_new,
            pos_change,
            note_id,
            file_id,
            pinned_pos,
        } = payload;

        if parent_id.as_ref() == Some(&id) {
            return Err(PatchError::SelfParent(id));
        }

        let placement = if is_new {
            let Some(parent_id) = parent_id else {
                return Err(PatchError::MissingParent(id));
            };
            let Some(pos) = pos else {
                return Err(PatchError::MissingPos(id));
            };
            Placement::Create { parent_id, pos }
        } else if pos_change || parent_id.is_some() || pos.is_some() {
            Placement::Move { parent_id, pos }
        } else {
            Placement::Keep
        };

        Ok(Self {
            id,
            content: ContentPatch {
                text,
                checked,
                collapsed,
                note_id,
                file_id,
                pinned_pos,
            },
            placement,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> LocalEditPayload {
        serde_json::from_str(json).expect("payload parses")
    }

    #[test]
    fn new_payload_becomes_create() {
        let edit = LocalEdit::try_from(parse(
            r#"{"id":"n1","parent_id":"home","pos":2,"new":true,"text":"Buy milk"}"#,
        ))
        .expect("valid");
        assert_eq!(
            edit.placement,
            Placement::Create {
                parent_id: NodeId::from("home"),
                pos: 2.0
            }
        );
        assert_eq!(edit.content.text.as_deref(), Some("Buy milk"));
    }

    #[test]
    fn new_without_pos_is_rejected() {
        let err = LocalEdit::try_from(parse(r#"{"id":"n1","parent_id":"home","new":true}"#))
            .expect_err("missing pos");
        assert_eq!(err, PatchError::MissingPos(NodeId::from("n1")));
    }

    #[test]
    fn new_without_parent_is_rejected() {
        let err = LocalEdit::try_from(parse(r#"{"id":"n1","pos":1,"new":true}"#))
            .expect_err("missing parent");
        assert_eq!(err, PatchError::MissingParent(NodeId::from("n1")));
    }

    #[test]
    fn self_parent_is_rejected() {
        let err = LocalEdit::try_from(parse(r#"{"id":"n1","parent_id":"n1","posChange":true}"#))
            .expect_err("self parent");
        assert_eq!(err, PatchError::SelfParent(NodeId::from("n1")));
    }

    #[test]
    fn pos_without_flag_is_promoted_to_move() {
        let edit = LocalEdit::try_from(parse(r#"{"id":"n1","pos":4.5}"#)).expect("valid");
        assert_eq!(
            edit.placement,
            Placement::Move {
                parent_id: None,
                pos: Some(4.5)
            }
        );
    }

    #[test]
    fn plain_update_keeps_placement() {
        let edit = LocalEdit::try_from(parse(r#"{"id":"n1","checked":true}"#)).expect("valid");
        assert_eq!(edit.placement, Placement::Keep);
        assert_eq!(edit.content.checked, Some(true));
    }

    #[test]
    fn explicit_null_clears_reference() {
        let edit = LocalEdit::try_from(parse(r#"{"id":"n1","note_id":null}"#)).expect("valid");
        assert_eq!(edit.content.note_id, Some(None));

        let mut node = Node::new("n1", None, 0.0);
        node.note_id = Some("note-7".to_string());
        edit.content.apply(&mut node);
        assert_eq!(node.note_id, None);
    }

    #[test]
    fn id_only_payload_fills_optional_fields() {
        let payload = parse(r#"{"id":"n1"}"#);
        assert_eq!(payload.id, NodeId::from("n1"));
        assert_eq!(payload.parent_id, None);
        assert_eq!(payload.pos, None);
        assert!(!payload.is_new && !payload.pos_change);
        assert_eq!(payload.note_id, None);
        assert_eq!(
            LocalEdit::try_from(payload).map(|edit| edit.placement),
            Ok(Placement::Keep)
        );
    }

    #[test]
    fn payload_without_id_is_rejected() {
        let result = serde_json::from_str::<LocalEditPayload>(r#"{"text":"orphan"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let result = serde_json::from_str::<LocalEditPayload>(r#"{"id":"n1","colour":"red"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn empty_patch_reports_empty() {
        assert!(ContentPatch::default().is_empty());
        assert!(!LocalEdit::update("n1").checked(true).content.is_empty());
    }
}
