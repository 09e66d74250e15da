//! Turns raw drag input into reorder commands.
//!
//! Pointer and touch drags only count once they have travelled
//! [`ACTIVATION_DISTANCE`] logical pixels from the press point, so a tap on a
//! card never reorders anything. Keyboard drags (pick up, step or point at a
//! target, drop) start immediately.

use tracing::{debug, trace};

use crate::ordering::WorkingSet;

pub const ACTIVATION_DISTANCE: f64 = 8.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modality {
    Pointer,
    Touch,
    Keyboard,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GestureEvent {
    Press {
        id: String,
        modality: Modality,
        x: f64,
        y: f64,
    },
    Move {
        x: f64,
        y: f64,
    },
    /// The element under the drag changed; `None` when over empty space.
    Over {
        target: Option<String>,
    },
    Release,
    KeyPick {
        id: String,
    },
    /// Keyboard step relative to the current drop target.
    KeyStep {
        delta: isize,
    },
    KeyDrop,
    Cancel,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReorderCommand {
    pub source: String,
    pub target: String,
}

#[derive(Debug, Clone, PartialEq)]
enum DragState {
    Idle,
    Pressed {
        id: String,
        modality: Modality,
        origin: (f64, f64),
        over: Option<String>,
    },
    Dragging {
        id: String,
        modality: Modality,
        over: Option<String>,
    },
}

#[derive(Debug, Clone)]
pub struct DragSensor {
    activation_distance: f64,
    state: DragState,
}

impl Default for DragSensor {
    fn default() -> Self {
        Self::new()
    }
}

impl DragSensor {
    pub fn new() -> Self {
        Self::with_activation_distance(ACTIVATION_DISTANCE)
    }

    pub fn with_activation_distance(activation_distance: f64) -> Self {
        Self {
            activation_distance,
            state: DragState::Idle,
        }
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self.state, DragState::Dragging { .. })
    }

    pub fn active_source(&self) -> Option<&str> {
        match &self.state {
            DragState::Dragging { id, .. } => Some(id),
            _ => None,
        }
    }

    /// Feeds one input event. Returns a command when a drag completes over a
    /// target.
    pub fn handle(&mut self, event: GestureEvent, set: &WorkingSet) -> Option<ReorderCommand> {
        trace!(?event, "gesture event");
        let state = std::mem::replace(&mut self.state, DragState::Idle);

        let (next, command) = match (state, event) {
            (DragState::Idle, GestureEvent::Press { id, modality, x, y }) => {
                if modality == Modality::Keyboard || !set.can_drag(&id) {
                    (DragState::Idle, None)
                } else {
                    (
                        DragState::Pressed {
                            id,
                            modality,
                            origin: (x, y),
                            over: None,
                        },
                        None,
                    )
                }
            }
            (DragState::Idle, GestureEvent::KeyPick { id }) => {
                if set.can_drag(&id) {
                    debug!(%id, "keyboard drag started");
                    (
                        DragState::Dragging {
                            over: Some(id.clone()),
                            id,
                            modality: Modality::Keyboard,
                        },
                        None,
                    )
                } else {
                    (DragState::Idle, None)
                }
            }
            (
                DragState::Pressed {
                    id,
                    modality,
                    origin,
                    over,
                },
                GestureEvent::Move { x, y },
            ) => {
                let travelled = (x - origin.0).hypot(y - origin.1);
                if travelled >= self.activation_distance {
                    debug!(%id, ?modality, travelled, "drag activated");
                    (DragState::Dragging { id, modality, over }, None)
                } else {
                    (
                        DragState::Pressed {
                            id,
                            modality,
                            origin,
                            over,
                        },
                        None,
                    )
                }
            }
            (
                DragState::Pressed {
                    id,
                    modality,
                    origin,
                    ..
                },
                GestureEvent::Over { target },
            ) => (
                DragState::Pressed {
                    id,
                    modality,
                    origin,
                    over: target,
                },
                None,
            ),
            (DragState::Pressed { .. }, _) => (DragState::Idle, None),
            (DragState::Dragging { id, modality, .. }, GestureEvent::Over { target }) => {
                (DragState::Dragging { id, modality, over: target }, None)
            }
            (
                DragState::Dragging {
                    id,
                    modality: Modality::Keyboard,
                    over,
                },
                GestureEvent::KeyStep { delta },
            ) => {
                let anchor = over.as_deref().unwrap_or(id.as_str());
                let over = step_target(set, anchor, delta).or(over);
                (
                    DragState::Dragging {
                        id,
                        modality: Modality::Keyboard,
                        over,
                    },
                    None,
                )
            }
            (DragState::Dragging { id, modality, over }, GestureEvent::Release)
                if modality != Modality::Keyboard =>
            {
                (DragState::Idle, finish(id, over))
            }
            (
                DragState::Dragging {
                    id,
                    modality: Modality::Keyboard,
                    over,
                },
                GestureEvent::KeyDrop,
            ) => (DragState::Idle, finish(id, over)),
            (DragState::Dragging { .. }, GestureEvent::Cancel) => (DragState::Idle, None),
            (dragging @ DragState::Dragging { .. }, _) => (dragging, None),
            (DragState::Idle, _) => (DragState::Idle, None),
        };

        self.state = next;
        command
    }
}

fn finish(source: String, over: Option<String>) -> Option<ReorderCommand> {
    let target = over?;
    debug!(%source, %target, "drag dropped");
    Some(ReorderCommand { source, target })
}

fn step_target(set: &WorkingSet, anchor: &str, delta: isize) -> Option<String> {
    let position = set.position(anchor)?;
    let next = position.checked_add_signed(delta)?;
    set.tasks().get(next).map(|task| task.id.clone())
}
