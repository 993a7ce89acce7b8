//! Abstract weld program built from an assembled path.
//!
//! The commands carry no controller dialect; a post-processor translates
//! them into a specific robot language.

use serde::{Deserialize, Serialize};
use tracing::debug;
use weldpath_math::Point3;

use crate::assembler::{AssembledPath, ElementKind, PathElement, PathPoint};
use crate::motion::MotionKind;

/// One robot instruction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum WeldCommand {
    /// Strike the arc.
    ArcOn,
    /// Extinguish the arc.
    ArcOff,
    /// Straight move.
    Linear {
        /// Destination.
        target: Point3,
        /// Fraction of the weld speed.
        speed_factor: f64,
    },
    /// Circular move through `via` to `target`.
    Circular {
        /// Intermediate point on the arc.
        via: Point3,
        /// Destination.
        target: Point3,
        /// Fraction of the weld speed.
        speed_factor: f64,
    },
    /// Rapid move with the arc off.
    Travel {
        /// Destination.
        target: Point3,
    },
}

/// Tracks the arc and tool position while commands are emitted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgramState {
    /// Arc currently on.
    pub arc_on: bool,
    /// Last commanded position.
    pub position: Option<Point3>,
    commands: Vec<WeldCommand>,
}

impl ProgramState {
    /// Fresh state: arc off, position unknown.
    pub fn new() -> Self {
        Self::default()
    }

    fn arc(&mut self, on: bool) {
        if self.arc_on != on {
            self.commands.push(if on {
                WeldCommand::ArcOn
            } else {
                WeldCommand::ArcOff
            });
            self.arc_on = on;
        }
    }

    fn travel(&mut self, target: Point3) {
        if self.position != Some(target) {
            self.arc(false);
            self.commands.push(WeldCommand::Travel { target });
            self.position = Some(target);
        }
    }

    fn linear(&mut self, target: Point3, speed_factor: f64) {
        self.commands.push(WeldCommand::Linear {
            target,
            speed_factor,
        });
        self.position = Some(target);
    }

    fn circular(&mut self, via: Point3, target: Point3, speed_factor: f64) {
        self.commands.push(WeldCommand::Circular {
            via,
            target,
            speed_factor,
        });
        self.position = Some(target);
    }

    /// Commands emitted so far.
    pub fn commands(&self) -> &[WeldCommand] {
        &self.commands
    }

    /// Finish the program and return its commands.
    pub fn finish(mut self) -> Vec<WeldCommand> {
        self.arc(false);
        self.commands
    }
}

fn speed(point: &PathPoint, curve_speed_factor: f64) -> f64 {
    if point.is_curve_point {
        curve_speed_factor
    } else {
        1.0
    }
}

fn weld_element(state: &mut ProgramState, element: &PathElement, curve_speed_factor: f64) {
    let Some((first, rest)) = element.points.split_first() else {
        return;
    };
    if state.arc_on {
        // Joined to the previous bead without a lift.
        state.linear(first.position, speed(first, curve_speed_factor));
    } else {
        state.travel(first.position);
        state.arc(true);
    }

    match element.motion {
        MotionKind::Linear => {
            for p in rest {
                state.linear(p.position, speed(p, curve_speed_factor));
            }
        }
        MotionKind::Circular => {
            let mut i = 0;
            while i < rest.len() {
                let via = &rest[i];
                match rest.get(i + 1) {
                    Some(target) if !via.repeat_for_arc => {
                        let factor = speed(via, curve_speed_factor).min(speed(target, curve_speed_factor));
                        state.circular(via.position, target.position, factor);
                        i += 2;
                    }
                    _ => {
                        state.linear(via.position, speed(via, curve_speed_factor));
                        i += 1;
                    }
                }
            }
        }
    }
}

/// Translate `path` into weld commands.
///
/// Curve points are welded at `curve_speed_factor` of the nominal speed.
pub fn build_program(path: &AssembledPath, curve_speed_factor: f64) -> Vec<WeldCommand> {
    let mut state = ProgramState::new();
    for element in path.elements() {
        match element.kind {
            ElementKind::Transit => {
                for p in &element.points {
                    state.travel(p.position);
                }
            }
            ElementKind::Weld(_) => weld_element(&mut state, element, curve_speed_factor),
        }
    }
    let commands = state.finish();
    debug!(commands = commands.len(), "program built");
    commands
}
