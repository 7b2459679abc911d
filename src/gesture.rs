//! Swipe gesture tracking for the triage card.
//!
//! One pointer interaction is tracked at a time. A drag that is released at
//! least [`COMMIT_THRESHOLD`] pixels from where it started commits a label;
//! anything shorter snaps back. Events from any other pointer are ignored.

use serde::{Deserialize, Serialize};

use crate::models::Label;

/// Minimum horizontal travel, in pixels, for a release to classify.
pub const COMMIT_THRESHOLD: f64 = 140.0;
/// Below this travel the direction indicator stays neutral.
pub const DIRECTION_THRESHOLD: f64 = 8.0;
/// Degrees of card tilt per pixel of offset.
pub const ROTATION_PER_PIXEL: f64 = 0.03;

pub type PointerId = i64;

/// What the pointer went down on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PointerTarget {
    #[default]
    Card,
    /// A button or other interactive child of the card.
    Control,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SwipeDirection {
    Left,
    Right,
}

impl SwipeDirection {
    pub fn label(self) -> Label {
        match self {
            Self::Right => Label::Good,
            Self::Left => Label::Bad,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GesturePhase {
    Idle,
    Dragging {
        pointer_id: PointerId,
        start_x: f64,
        offset: f64,
    },
}

/// How a pointer release or cancel ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "kind", content = "label")]
pub enum GestureEnd {
    Committed(Label),
    SnappedBack,
    /// The event did not belong to the captured pointer.
    Ignored,
}

impl GestureEnd {
    pub fn committed(self) -> Option<Label> {
        match self {
            Self::Committed(label) => Some(label),
            Self::SnappedBack | Self::Ignored => None,
        }
    }
}

/// Visual state of the card for the current frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CardFeedback {
    pub dragging: bool,
    pub offset: f64,
    pub rotation_deg: f64,
    pub direction: Option<SwipeDirection>,
    /// `|offset| / COMMIT_THRESHOLD`, capped at 1.
    pub progress: f64,
}

impl CardFeedback {
    pub fn shows_overlay(&self) -> bool {
        self.direction.is_some() && self.progress > 0.0
    }
}

#[derive(Debug, Clone)]
pub struct GestureInterpreter {
    phase: GesturePhase,
}

impl Default for GestureInterpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl GestureInterpreter {
    pub fn new() -> Self {
        Self {
            phase: GesturePhase::Idle,
        }
    }

    pub fn phase(&self) -> GesturePhase {
        self.phase
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.phase, GesturePhase::Idle)
    }

    /// Starts tracking `pointer_id`. Returns whether the pointer was captured.
    pub fn pointer_down(&mut self, pointer_id: PointerId, x: f64, target: PointerTarget) -> bool {
        if target == PointerTarget::Control || !self.is_idle() {
            return false;
        }

        self.phase = GesturePhase::Dragging {
            pointer_id,
            start_x: x,
            offset: 0.0,
        };
        true
    }

    pub fn pointer_move(&mut self, pointer_id: PointerId, x: f64) {
        if let GesturePhase::Dragging {
            pointer_id: captured,
            start_x,
            offset,
        } = &mut self.phase
        {
            if *captured == pointer_id {
                *offset = x - *start_x;
            }
        }
    }

    /// Ends the drag. The last observed offset decides the outcome.
    pub fn pointer_up(&mut self, pointer_id: PointerId) -> GestureEnd {
        let GesturePhase::Dragging {
            pointer_id: captured,
            offset,
            ..
        } = self.phase
        else {
            return GestureEnd::Ignored;
        };
        if captured != pointer_id {
            return GestureEnd::Ignored;
        }

        self.reset();
        if offset.abs() >= COMMIT_THRESHOLD {
            let direction = if offset > 0.0 {
                SwipeDirection::Right
            } else {
                SwipeDirection::Left
            };
            GestureEnd::Committed(direction.label())
        } else {
            GestureEnd::SnappedBack
        }
    }

    pub fn pointer_cancel(&mut self, pointer_id: PointerId) -> GestureEnd {
        match self.phase {
            GesturePhase::Dragging {
                pointer_id: captured,
                ..
            } if captured == pointer_id => {
                self.reset();
                GestureEnd::SnappedBack
            }
            _ => GestureEnd::Ignored,
        }
    }

    pub fn reset(&mut self) {
        self.phase = GesturePhase::Idle;
    }

    pub fn feedback(&self) -> CardFeedback {
        let (dragging, offset) = match self.phase {
            GesturePhase::Idle => (false, 0.0),
            GesturePhase::Dragging { offset, .. } => (true, offset),
        };

        let direction = if offset.abs() < DIRECTION_THRESHOLD {
            None
        } else if offset > 0.0 {
            Some(SwipeDirection::Right)
        } else {
            Some(SwipeDirection::Left)
        };

        CardFeedback {
            dragging,
            offset,
            rotation_deg: offset * ROTATION_PER_PIXEL,
            direction,
            progress: (offset.abs() / COMMIT_THRESHOLD).min(1.0),
        }
    }
}
