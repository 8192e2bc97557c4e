//! Core types for vla-infer

use crate::error::{Error, Result};
use std::fmt;

/// Number of values in a 7-DoF end-effector action
pub const ACTION_DIM: usize = 7;

/// Predicted robot action returned by a model backend.
///
/// The vector is laid out as `[x, y, z, roll, pitch, yaw, gripper]`. Backends
/// may return longer vectors; only the first seven values are named in the
/// report, the rest show up in the raw dump.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionResult {
    action: Vec<f32>,

    /// Free-form line printed above the report
    description: Option<String>,
}

impl ActionResult {
    /// Wrap a raw action vector, rejecting vectors shorter than 7 values
    pub fn new(action: Vec<f32>) -> Result<Self> {
        if action.len() < ACTION_DIM {
            return Err(Error::inference(format!(
                "expected an action with at least {} values, got {}",
                ACTION_DIM,
                action.len()
            )));
        }

        Ok(Self {
            action,
            description: None,
        })
    }

    /// Attach a description line
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Translation deltas `(x, y, z)`
    pub fn position(&self) -> [f32; 3] {
        [self.action[0], self.action[1], self.action[2]]
    }

    /// Rotation deltas `(roll, pitch, yaw)`
    pub fn rotation(&self) -> [f32; 3] {
        [self.action[3], self.action[4], self.action[5]]
    }

    /// Gripper aperture
    pub fn gripper(&self) -> f32 {
        self.action[6]
    }

    /// The full action vector
    pub fn raw(&self) -> &[f32] {
        &self.action
    }

    /// Description line, if any
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Consume into the raw vector
    pub fn into_vec(self) -> Vec<f32> {
        self.action
    }
}

impl fmt::Display for ActionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(description) = &self.description {
            writeln!(f, "{}", description)?;
        }

        let [x, y, z] = self.position();
        let [r, p, yaw] = self.rotation();

        writeln!(f, "Predicted Action (7-DoF):")?;
        writeln!(f, "  Position (x, y, z): [{:.4}, {:.4}, {:.4}]", x, y, z)?;
        writeln!(f, "  Rotation (r, p, y): [{:.4}, {:.4}, {:.4}]", r, p, yaw)?;
        writeln!(f, "  Gripper: {:.4}", self.gripper())?;
        writeln!(f)?;
        write!(f, "Raw action: {:?}", self.action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_short_vectors() {
        let err = ActionResult::new(vec![0.0; 6]).unwrap_err();
        assert!(matches!(err, Error::Inference(_)));
    }

    #[test]
    fn test_accessors() {
        let result = ActionResult::new(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]).unwrap();
        assert_eq!(result.position(), [1.0, 2.0, 3.0]);
        assert_eq!(result.rotation(), [4.0, 5.0, 6.0]);
        assert_eq!(result.gripper(), 7.0);
        assert_eq!(result.raw().len(), 7);
    }

    #[test]
    fn test_report_layout() {
        let result =
            ActionResult::new(vec![0.0012, -0.5, 0.25, 0.1, -0.2, 0.3, 0.996]).unwrap();

        let expected = "Predicted Action (7-DoF):\n\
                        \x20 Position (x, y, z): [0.0012, -0.5000, 0.2500]\n\
                        \x20 Rotation (r, p, y): [0.1000, -0.2000, 0.3000]\n\
                        \x20 Gripper: 0.9960\n\
                        \n\
                        Raw action: [0.0012, -0.5, 0.25, 0.1, -0.2, 0.3, 0.996]";
        assert_eq!(result.to_string(), expected);
    }

    #[test]
    fn test_description_is_first_line() {
        let result = ActionResult::new(vec![0.0; 7])
            .unwrap()
            .with_description("Mock action: Pick up object");

        let report = result.to_string();
        assert_eq!(report.lines().next(), Some("Mock action: Pick up object"));
        assert!(report.contains("Gripper: 0.0000"));
    }
}
