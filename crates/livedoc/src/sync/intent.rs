//! IntentController is the view's transient create / edit / delete state.
//!
//! ```text
//!            begin_create / begin_edit            request_delete
//!   Composing <──────────────────────── Idle ──────────────────────> ConfirmingDelete
//!       │      ──────────────────────>   ^   <──────────────────────        │
//!       │        cancel / commit         │     cancel_delete / confirm      │
//! ```
//!
//! Intents are serialized: a trigger that does not start from the state it
//! expects is rejected and leaves the state untouched. In particular a record
//! card's edit trigger is refused while another record awaits delete
//! confirmation.

use serde_json::Value;

use crate::collection::CollectionDef;
use crate::error::IntentError;
use crate::schema::SchemaNode;
use crate::types::Fields;

/// What a draft will produce when committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DraftTarget {
    /// A new record; the store assigns its id.
    New,
    /// An existing record.
    Existing(String),
}

/// In-progress field values.
#[derive(Debug, Clone, PartialEq)]
pub struct Draft {
    pub target: DraftTarget,
    pub fields: Fields,
}

impl Draft {
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum IntentState {
    Idle,
    Composing(Draft),
    ConfirmingDelete(String),
}

impl IntentState {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn is_composing(&self) -> bool {
        matches!(self, Self::Composing(_))
    }

    pub fn is_confirming_delete(&self) -> bool {
        matches!(self, Self::ConfirmingDelete(_))
    }
}

pub struct IntentController {
    def: &'static CollectionDef,
    state: IntentState,
}

impl IntentController {
    pub fn new(def: &'static CollectionDef) -> Self {
        Self {
            def,
            state: IntentState::Idle,
        }
    }

    pub fn state(&self) -> &IntentState {
        &self.state
    }

    pub fn draft(&self) -> Option<&Draft> {
        match &self.state {
            IntentState::Composing(d) => Some(d),
            _ => None,
        }
    }

    // -----------------------------------------------------------------------
    // Compose
    // -----------------------------------------------------------------------

    /// `Idle → Composing(new)` with every field at its blank value.
    pub fn begin_create(&mut self) -> Result<(), IntentError> {
        self.require_idle()?;
        self.state = IntentState::Composing(Draft {
            target: DraftTarget::New,
            fields: blank_fields(self.def),
        });
        Ok(())
    }

    /// `Idle → Composing(id)` with the record's current user fields.
    pub fn begin_edit(&mut self, id: &str, current: Fields) -> Result<(), IntentError> {
        self.require_idle()?;
        let mut fields = blank_fields(self.def);
        for (name, value) in current {
            if self.def.is_user_field(&name) {
                fields.insert(name, value);
            }
        }
        self.state = IntentState::Composing(Draft {
            target: DraftTarget::Existing(id.to_string()),
            fields,
        });
        Ok(())
    }

    /// Edit one field of the open draft.
    pub fn set_field(&mut self, name: &str, value: Value) -> Result<(), IntentError> {
        if !self.def.is_user_field(name) {
            return Err(IntentError::UnknownField {
                collection: self.def.name.clone(),
                field: name.to_string(),
            });
        }
        match &mut self.state {
            IntentState::Composing(draft) => {
                draft.fields.insert(name.to_string(), value);
                Ok(())
            }
            _ => Err(IntentError::NotComposing),
        }
    }

    /// Whether `commit` would pass the blank-primary guard.
    pub fn can_commit(&self) -> bool {
        self.check_commit().is_ok()
    }

    /// The draft `take_commit` would hand out, without leaving `Composing`.
    pub fn check_commit(&self) -> Result<&Draft, IntentError> {
        let draft = self.draft().ok_or(IntentError::NotComposing)?;
        if primary_is_blank(self.def, draft) {
            return Err(IntentError::BlankPrimary {
                field: self.def.primary.clone(),
            });
        }
        Ok(draft)
    }

    /// Check the guard and hand out the draft, returning to `Idle`.
    ///
    /// A blank primary field leaves the controller in `Composing`.
    pub fn take_commit(&mut self) -> Result<Draft, IntentError> {
        self.check_commit()?;
        match std::mem::replace(&mut self.state, IntentState::Idle) {
            IntentState::Composing(draft) => Ok(draft),
            _ => unreachable!("state checked above"),
        }
    }

    /// `Composing → Idle` without committing.
    pub fn cancel(&mut self) -> Result<(), IntentError> {
        if !self.state.is_composing() {
            return Err(IntentError::NotComposing);
        }
        self.state = IntentState::Idle;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Delete
    // -----------------------------------------------------------------------

    /// `Idle → ConfirmingDelete(id)`.
    pub fn request_delete(&mut self, id: &str) -> Result<(), IntentError> {
        self.require_idle()?;
        self.state = IntentState::ConfirmingDelete(id.to_string());
        Ok(())
    }

    /// `ConfirmingDelete → Idle` without deleting.
    pub fn cancel_delete(&mut self) -> Result<(), IntentError> {
        if !self.state.is_confirming_delete() {
            return Err(IntentError::NotConfirming);
        }
        self.state = IntentState::Idle;
        Ok(())
    }

    /// `ConfirmingDelete(id) → Idle`, returning the id to delete.
    pub fn take_delete(&mut self) -> Result<String, IntentError> {
        match std::mem::replace(&mut self.state, IntentState::Idle) {
            IntentState::ConfirmingDelete(id) => Ok(id),
            other => {
                self.state = other;
                Err(IntentError::NotConfirming)
            }
        }
    }

    /// Drop any intent (view unmounted).
    pub fn reset(&mut self) {
        self.state = IntentState::Idle;
    }

    fn require_idle(&self) -> Result<(), IntentError> {
        if self.state.is_idle() {
            Ok(())
        } else {
            Err(IntentError::Busy)
        }
    }
}

/// Blank value for each declared field; optional and date fields stay unset.
fn blank_fields(def: &CollectionDef) -> Fields {
    let mut fields = Fields::new();
    for (name, node) in def.user_fields() {
        let blank = match node {
            SchemaNode::String | SchemaNode::RichText => Value::String(String::new()),
            SchemaNode::Boolean => Value::Bool(false),
            _ => continue,
        };
        fields.insert(name.clone(), blank);
    }
    fields
}

fn primary_is_blank(def: &CollectionDef, draft: &Draft) -> bool {
    draft
        .field(&def.primary)
        .and_then(Value::as_str)
        .map_or(true, |s| s.trim().is_empty())
}
