//! Zone editor state machine
//!
//! `Idle -> Dragging -> Reviewing -> Idle`. A drag on the main surface or an
//! "edit zone" action opens a draft; the review form can override every
//! coordinate before the draft is saved into the owning zone map.

use crate::domain::types::{parse_number, Corner, ZoneKind};
use crate::domain::zone::Zone;
use crate::services::reconstructor::ZoneSet;
use crate::services::transform::Millimeters;

/// Working copy of a zone inside an edit session
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Draft {
    pub kind: ZoneKind,
    pub zone: Zone,
}

/// Focusable inputs of the review form
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormField {
    Kind,
    Id,
    Coord(Corner),
}

impl FormField {
    pub const ORDER: [FormField; 6] = [
        FormField::Kind,
        FormField::Id,
        FormField::Coord(Corner::X1),
        FormField::Coord(Corner::Y1),
        FormField::Coord(Corner::X2),
        FormField::Coord(Corner::Y2),
    ];

    pub fn label(&self) -> &'static str {
        match self {
            FormField::Kind => "Type",
            FormField::Id => "Id",
            FormField::Coord(Corner::X1) => "X1 (mm)",
            FormField::Coord(Corner::Y1) => "Y1 (mm)",
            FormField::Coord(Corner::X2) => "X2 (mm)",
            FormField::Coord(Corner::Y2) => "Y2 (mm)",
        }
    }
}

/// Review form: the four coordinates as free text plus kind and id
#[derive(Debug, Clone, PartialEq)]
pub struct ZoneForm {
    pub kind: ZoneKind,
    pub id: String,
    coords: [String; 4],
    focus: usize,
}

impl ZoneForm {
    fn seeded(draft: &Draft) -> Self {
        let coords = Corner::ALL.map(|corner| format!("{}", draft.zone.get(corner).round() as i64));
        Self { kind: draft.kind, id: draft.zone.id.to_string(), coords, focus: 2 }
    }

    pub fn coord(&self, corner: Corner) -> &str {
        &self.coords[corner_index(corner)]
    }

    pub fn focused(&self) -> FormField {
        FormField::ORDER[self.focus]
    }

    pub fn focus_next(&mut self) {
        self.focus = (self.focus + 1) % FormField::ORDER.len();
    }

    pub fn focus_prev(&mut self) {
        self.focus = (self.focus + FormField::ORDER.len() - 1) % FormField::ORDER.len();
    }

    /// Text shown for a field
    pub fn value(&self, field: FormField) -> String {
        match field {
            FormField::Kind => self.kind.label().to_string(),
            FormField::Id => self.id.clone(),
            FormField::Coord(corner) => self.coord(corner).to_string(),
        }
    }

    /// Type a character into the focused field
    pub fn input(&mut self, c: char) {
        match self.focused() {
            FormField::Kind => {
                if c == ' ' {
                    self.kind = self.kind.toggle();
                }
            }
            FormField::Id => {
                if c.is_ascii_digit() && self.id.len() < 2 {
                    self.id.push(c);
                }
            }
            FormField::Coord(corner) => {
                if c.is_ascii_digit() || c == '-' || c == '.' {
                    let text = &mut self.coords[corner_index(corner)];
                    if text.len() < 8 {
                        text.push(c);
                    }
                }
            }
        }
    }

    pub fn backspace(&mut self) {
        match self.focused() {
            FormField::Kind => {}
            FormField::Id => {
                self.id.pop();
            }
            FormField::Coord(corner) => {
                self.coords[corner_index(corner)].pop();
            }
        }
    }

    /// Zone described by the current form contents
    ///
    /// Coordinates that do not parse read as 0. An id outside the kind's
    /// range falls back to `fallback_id`.
    pub fn to_draft(&self, fallback_id: u8) -> Draft {
        let id = self
            .id
            .trim()
            .parse::<u8>()
            .ok()
            .filter(|id| (1..=self.kind.max_id()).contains(id))
            .unwrap_or_else(|| fallback_id.clamp(1, self.kind.max_id()));
        let [x1, y1, x2, y2] = Corner::ALL.map(|corner| parse_number(self.coord(corner)).trunc());
        Draft { kind: self.kind, zone: Zone::new(id, x1, y1, x2, y2) }
    }
}

fn corner_index(corner: Corner) -> usize {
    match corner {
        Corner::X1 => 0,
        Corner::Y1 => 1,
        Corner::X2 => 2,
        Corner::Y2 => 3,
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum EditorState {
    #[default]
    Idle,
    Dragging(Draft),
    Reviewing { draft: Draft, form: ZoneForm },
}

/// What a finished edit session did to the zone maps
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EditOutcome {
    Saved(Draft),
    Discarded,
    Deleted { kind: ZoneKind, id: u8 },
}

#[derive(Debug, Default)]
pub struct ZoneEditor {
    enabled: bool,
    state: EditorState,
}

impl ZoneEditor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn state(&self) -> &EditorState {
        &self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state == EditorState::Idle
    }

    /// Switch drag editing on or off; switching off drops any open draft
    pub fn set_enabled(&mut self, enabled: bool) -> Option<EditOutcome> {
        self.enabled = enabled;
        if !enabled && !self.is_idle() {
            self.state = EditorState::Idle;
            return Some(EditOutcome::Discarded);
        }
        None
    }

    /// Draft to draw on the main surface
    pub fn draft(&self) -> Option<Draft> {
        match &self.state {
            EditorState::Idle => None,
            EditorState::Dragging(draft) => Some(*draft),
            EditorState::Reviewing { form, draft } => Some(form.to_draft(draft.zone.id)),
        }
    }

    pub fn form(&self) -> Option<&ZoneForm> {
        match &self.state {
            EditorState::Reviewing { form, .. } => Some(form),
            _ => None,
        }
    }

    pub fn form_mut(&mut self) -> Option<&mut ZoneForm> {
        match &mut self.state {
            EditorState::Reviewing { form, .. } => Some(form),
            _ => None,
        }
    }

    /// Start a drag at `start`; ignored unless edit mode is on and no draft is open
    pub fn pointer_down(&mut self, start: Millimeters, kind: ZoneKind, id: u8) -> bool {
        if !self.enabled || !self.is_idle() {
            return false;
        }
        let zone = Zone::new(id, start.x, start.y, start.x, start.y);
        self.state = EditorState::Dragging(Draft { kind, zone });
        true
    }

    /// Follow the pointer; only the second corner moves
    pub fn pointer_move(&mut self, at: Millimeters) {
        if let EditorState::Dragging(draft) = &mut self.state {
            draft.zone.x2 = at.x;
            draft.zone.y2 = at.y;
            draft.zone.refresh_active();
        }
    }

    /// Freeze the draft and open the review form
    pub fn pointer_up(&mut self) -> bool {
        match self.state {
            EditorState::Dragging(draft) => {
                self.state = EditorState::Reviewing { draft, form: ZoneForm::seeded(&draft) };
                true
            }
            _ => false,
        }
    }

    /// Review an existing zone, or an all-zero one if it is not stored
    pub fn edit_existing(&mut self, kind: ZoneKind, id: u8, zones: &ZoneSet) {
        let zone = zones.get(kind, id).copied().unwrap_or_else(|| Zone::empty(id));
        let draft = Draft { kind, zone };
        self.state = EditorState::Reviewing { draft, form: ZoneForm::seeded(&draft) };
    }

    /// Apply the form and store the draft in its owning map
    pub fn save(&mut self, zones: &mut ZoneSet) -> Option<EditOutcome> {
        let EditorState::Reviewing { draft, form } = &self.state else {
            return None;
        };
        let draft = form.to_draft(draft.zone.id);
        zones.of_mut(draft.kind).insert(draft.zone.id, draft.zone);
        self.state = EditorState::Idle;
        Some(EditOutcome::Saved(draft))
    }

    pub fn discard(&mut self) -> Option<EditOutcome> {
        if self.is_idle() {
            return None;
        }
        self.state = EditorState::Idle;
        Some(EditOutcome::Discarded)
    }

    /// Remove the zone under review from its owning map
    pub fn delete(&mut self, zones: &mut ZoneSet) -> Option<EditOutcome> {
        let EditorState::Reviewing { draft, .. } = &self.state else {
            return None;
        };
        let draft = *draft;
        zones.of_mut(draft.kind).remove(&draft.zone.id);
        self.state = EditorState::Idle;
        Some(EditOutcome::Deleted { kind: draft.kind, id: draft.zone.id })
    }
}
