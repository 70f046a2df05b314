//! Annotation editor.
//! Owns the draft climb, the active mark type and the read-only flag.
//! Every point mutation goes through here; viewer mode never yields a mutable draft.

use thiserror::Error;
use uuid::Uuid;

use crate::climb::{ClimbRecord, MarkEntry, MarkType, Point, default_image_path, normalize, now_millis};
use crate::config::Mode;

/// Why a draft could not be committed. Checked in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("This climb is read-only.")]
    ReadOnly,
    #[error("Please enter a name.")]
    MissingName,
    #[error("Please place at least one START hold.")]
    MissingStart,
    #[error("Please place at least one FINISH hold.")]
    MissingFinish,
}

/// Text fields of the editor form. Trimmed on commit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClimbDetails {
    pub name: String,
    pub grade: String,
    pub first_ascent: String,
    /// Preview image override; blank means the default path for the draft id.
    pub image: String,
}

/// Where the board photo sits in pointer coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoardRect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl BoardRect {
    /// Identity mapping for positions that are already normalized.
    pub const UNIT: BoardRect = BoardRect {
        left: 0.0,
        top: 0.0,
        width: 1.0,
        height: 1.0,
    };

    /// Rectangle covering an image of `width` x `height` pixels at the origin.
    pub fn from_size(width: u32, height: u32) -> Self {
        Self {
            left: 0.0,
            top: 0.0,
            width: f64::from(width),
            height: f64::from(height),
        }
    }

    /// Maps a pointer position to board coordinates clamped to `[0, 1]`.
    /// This is the only place points are ever clamped.
    pub fn to_normalized(&self, pointer_x: f64, pointer_y: f64) -> Point {
        Point::new(
            clamp01((pointer_x - self.left) / self.width),
            clamp01((pointer_y - self.top) / self.height),
        )
    }
}

fn clamp01(v: f64) -> f64 {
    if v.is_nan() { 0.0 } else { v.clamp(0.0, 1.0) }
}

#[derive(Debug, Clone)]
pub struct Editor {
    mode: Mode,
    draft: ClimbRecord,
    active: MarkType,
    read_only: bool,
}

impl Editor {
    /// Starts with a fresh draft.
    pub fn new(mode: Mode) -> Self {
        let mut editor = Self {
            mode,
            draft: ClimbRecord::blank("", 0),
            active: MarkType::Start,
            read_only: true,
        };
        editor.new_draft();
        editor
    }

    pub fn new_draft(&mut self) {
        self.draft = ClimbRecord::blank(Uuid::new_v4().to_string(), now_millis());
        self.read_only = !self.mode.is_setter();
        self.active = MarkType::Start;
        log::debug!("New draft {}", self.draft.id);
    }

    /// Deep-copies `record` into the draft. Viewer mode is always read-only.
    pub fn load_into_draft(&mut self, record: &ClimbRecord, read_only: bool) {
        self.draft = normalize(&record.to_value());
        self.read_only = read_only || !self.mode.is_setter();
    }

    pub fn draft(&self) -> &ClimbRecord {
        &self.draft
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only || !self.mode.is_setter()
    }

    pub fn active_mark_type(&self) -> MarkType {
        self.active
    }

    pub fn set_active_mark_type(&mut self, kind: MarkType) -> bool {
        if self.is_read_only() {
            return false;
        }
        self.active = kind;
        true
    }

    /// Appends to the active list, rounded to 4 decimals. False when read-only.
    pub fn add_point(&mut self, point: Point) -> bool {
        if self.is_read_only() {
            return false;
        }
        let kind = self.active;
        self.draft.marks_mut(kind).push(point.rounded().into());
        true
    }

    /// Pops the last point of the active list only.
    pub fn undo_last(&mut self) -> Option<MarkEntry> {
        if self.is_read_only() {
            return None;
        }
        let kind = self.active;
        self.draft.marks_mut(kind).pop()
    }

    pub fn clear_all(&mut self) -> bool {
        if self.is_read_only() {
            return false;
        }
        for kind in MarkType::ALL {
            self.draft.marks_mut(kind).clear();
        }
        true
    }

    /// Form values for the current draft.
    pub fn details(&self) -> ClimbDetails {
        let image = if self.draft.image.is_empty() {
            default_image_path(&self.draft.id)
        } else {
            self.draft.image.clone()
        };
        ClimbDetails {
            name: self.draft.name.clone(),
            grade: self.draft.grade.clone(),
            first_ascent: self.draft.first_ascent.clone(),
            image,
        }
    }

    /// Validates and finalizes the draft, then starts a new one.
    /// On error the draft is left as it was.
    pub fn commit(&mut self, details: ClimbDetails) -> Result<ClimbRecord, ValidationError> {
        if self.is_read_only() {
            return Err(ValidationError::ReadOnly);
        }
        let name = details.name.trim();
        if name.is_empty() {
            return Err(ValidationError::MissingName);
        }
        if self.draft.start.is_empty() {
            return Err(ValidationError::MissingStart);
        }
        if self.draft.finish.is_empty() {
            return Err(ValidationError::MissingFinish);
        }

        let image = match details.image.trim() {
            "" => default_image_path(&self.draft.id),
            path => path.to_string(),
        };
        let record = ClimbRecord {
            name: name.to_string(),
            grade: details.grade.trim().to_string(),
            first_ascent: details.first_ascent.trim().to_string(),
            image,
            ..self.draft.clone()
        };

        self.new_draft();
        Ok(normalize(&record.to_value()))
    }
}
