//! Undo/redo history of applied steps
//!
//! Every executed [`ModelStep`] is kept with the undo stack; undoing applies
//! its reversed step. A single temporary step can be applied on top for live
//! previews and is either accepted into the history or reverted.

use uuid::Uuid;

use crate::kernel::DisplayContext;
use crate::model::{Model, ModelResult};
use crate::step::{ModelStep, StepState};

/// Undo and redo stacks plus the current preview step
#[derive(Debug, Default)]
pub struct StepHistory {
    /// Applied steps, most recent last
    undoable: Vec<ModelStep>,
    /// Applied undo steps, most recent last
    redoable: Vec<ModelStep>,
    /// Preview step currently applied on top of the history
    temporary: Option<ModelStep>,
}

impl StepHistory {
    /// Create an empty history
    pub fn new() -> Self {
        Self::default()
    }

    pub fn can_undo(&self) -> bool {
        !self.undoable.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redoable.is_empty()
    }

    /// Names of the undoable steps, oldest first
    pub fn undo_names(&self) -> impl Iterator<Item = &str> {
        self.undoable.iter().map(|s| s.name.as_str())
    }

    /// Id of the preview step, if one is applied
    pub fn temporary(&self) -> Option<Uuid> {
        self.temporary.as_ref().map(|s| s.id)
    }

    fn prepare(model: &Model, step: &mut ModelStep) -> ModelResult<()> {
        if step.state() == StepState::Building {
            step.consolidate(model)?;
        }
        Ok(())
    }

    /// Consolidate and apply `step`, then record it for undo.
    ///
    /// Any preview step is reverted first. Returns false if the step turned
    /// out to change nothing; such steps are not recorded.
    pub fn execute(
        &mut self,
        model: &mut Model,
        mut step: ModelStep,
        display: &mut dyn DisplayContext,
    ) -> ModelResult<bool> {
        self.cancel_temporary(model, display)?;
        Self::prepare(model, &mut step)?;
        if step.is_empty() {
            tracing::debug!("Step '{}' is empty, not recorded", step.name);
            return Ok(false);
        }
        step.apply(model, display)?;
        self.undoable.push(step);
        self.redoable.clear();
        Ok(true)
    }

    /// Revert the most recent step. Returns false if there is none.
    pub fn undo_once(&mut self, model: &mut Model, display: &mut dyn DisplayContext) -> ModelResult<bool> {
        self.cancel_temporary(model, display)?;
        let Some(step) = self.undoable.pop() else {
            return Ok(false);
        };
        let mut undo = step.reversed();
        if let Err(e) = undo.apply(model, display) {
            tracing::warn!("Cannot undo '{}': {}", step.name, e);
            self.undoable.push(step);
            return Err(e);
        }
        tracing::debug!("Undid '{}'", step.name);
        self.redoable.push(undo);
        Ok(true)
    }

    /// Re-apply the most recently undone step. Returns false if there is none.
    pub fn redo_once(&mut self, model: &mut Model, display: &mut dyn DisplayContext) -> ModelResult<bool> {
        self.cancel_temporary(model, display)?;
        let Some(undo) = self.redoable.pop() else {
            return Ok(false);
        };
        let mut redo = undo.reversed();
        if let Err(e) = redo.apply(model, display) {
            tracing::warn!("Cannot redo '{}': {}", undo.name, e);
            self.redoable.push(undo);
            return Err(e);
        }
        tracing::debug!("Redid '{}'", redo.name);
        self.undoable.push(redo);
        Ok(true)
    }

    /// Replace the preview step by `step`.
    ///
    /// `step` must be built against the model without the previous preview;
    /// call [`StepHistory::cancel_temporary`] before building it.
    pub fn execute_temporary(
        &mut self,
        model: &mut Model,
        mut step: ModelStep,
        display: &mut dyn DisplayContext,
    ) -> ModelResult<()> {
        self.cancel_temporary(model, display)?;
        Self::prepare(model, &mut step)?;
        if step.is_empty() {
            return Ok(());
        }
        step.apply(model, display)?;
        self.temporary = Some(step);
        Ok(())
    }

    /// Record the preview step as a regular step. Returns false if there is
    /// no preview.
    pub fn accept_temporary(&mut self) -> bool {
        match self.temporary.take() {
            Some(step) => {
                tracing::debug!("Accepted '{}'", step.name);
                self.undoable.push(step);
                self.redoable.clear();
                true
            }
            None => false,
        }
    }

    /// Revert the preview step, if any
    pub fn cancel_temporary(&mut self, model: &mut Model, display: &mut dyn DisplayContext) -> ModelResult<()> {
        let Some(step) = self.temporary.take() else {
            return Ok(());
        };
        let mut undo = step.reversed();
        if let Err(e) = undo.apply(model, display) {
            tracing::error!("Cannot revert preview '{}': {}", step.name, e);
            self.temporary = Some(step);
            return Err(e);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::{DisplayLog, NullDisplay};
    use crate::step::tests::{snapshot, unit_square_model, v};

    fn split_step(model: &Model) -> ModelStep {
        let mut step = ModelStep::new("Split");
        step.add_edge(model, model.root(), v(0.5, 0.0, 1.0), v(0.5, 1.0, 1.0), None);
        step
    }

    #[test]
    fn test_execute_undo_redo() {
        let (mut model, _, _) = unit_square_model();
        let mut history = StepHistory::new();
        let before = snapshot(&model);

        let step = split_step(&model);
        assert!(history.execute(&mut model, step, &mut NullDisplay).unwrap());
        let after = snapshot(&model);
        assert_eq!(model.face_count(), 2);
        assert!(history.can_undo());
        assert!(!history.can_redo());

        assert!(history.undo_once(&mut model, &mut NullDisplay).unwrap());
        assert_eq!(snapshot(&model), before);
        assert!(history.can_redo());
        assert!(!history.undo_once(&mut model, &mut NullDisplay).unwrap());

        assert!(history.redo_once(&mut model, &mut NullDisplay).unwrap());
        assert_eq!(snapshot(&model), after);
        assert!(!history.redo_once(&mut model, &mut NullDisplay).unwrap());
        assert_eq!(history.undo_names().collect::<Vec<_>>(), vec!["Split"]);
    }

    #[test]
    fn test_execute_clears_redo() {
        let (mut model, edges, _) = unit_square_model();
        let mut history = StepHistory::new();
        let step = split_step(&model);
        history.execute(&mut model, step, &mut NullDisplay).unwrap();
        history.undo_once(&mut model, &mut NullDisplay).unwrap();
        assert!(history.can_redo());

        let mut erase = ModelStep::new("Erase");
        erase.remove_edge_with_faces(&model, edges[0]).unwrap();
        history.execute(&mut model, erase, &mut NullDisplay).unwrap();
        assert!(!history.can_redo());
    }

    #[test]
    fn test_empty_step_is_not_recorded() {
        let (mut model, _, _) = unit_square_model();
        let mut history = StepHistory::new();
        let mut step = ModelStep::new("Nothing");
        // Re-adding an existing edge stages nothing
        step.add_edge(&model, model.root(), v(0.0, 0.0, 1.0), v(1.0, 0.0, 1.0), None);
        assert!(!history.execute(&mut model, step, &mut NullDisplay).unwrap());
        assert!(!history.can_undo());
    }

    #[test]
    fn test_temporary_steps() {
        let (mut model, _, _) = unit_square_model();
        let mut history = StepHistory::new();
        let mut display = DisplayLog::new();
        let before = snapshot(&model);

        let step = split_step(&model);
        history.execute_temporary(&mut model, step, &mut display).unwrap();
        assert!(history.temporary().is_some());
        assert_eq!(model.face_count(), 2);

        history.cancel_temporary(&mut model, &mut display).unwrap();
        assert!(history.temporary().is_none());
        assert_eq!(snapshot(&model), before);
        assert_eq!(display.destroyed.len(), display.displayed.len());

        let step = split_step(&model);
        history.execute_temporary(&mut model, step, &mut display).unwrap();
        assert!(history.accept_temporary());
        assert!(!history.accept_temporary());
        assert_eq!(model.face_count(), 2);

        history.undo_once(&mut model, &mut display).unwrap();
        assert_eq!(snapshot(&model), before);
    }

    #[test]
    fn test_undo_reverts_preview_first() {
        let (mut model, edges, _) = unit_square_model();
        let mut history = StepHistory::new();
        let mut erase = ModelStep::new("Erase");
        erase.remove_edge_with_faces(&model, edges[0]).unwrap();
        history.execute(&mut model, erase, &mut NullDisplay).unwrap();
        let erased = snapshot(&model);

        let mut preview = ModelStep::new("Preview");
        preview.add_edge(&model, model.root(), v(5.0, 0.0, 0.0), v(6.0, 0.0, 0.0), None);
        history.execute_temporary(&mut model, preview, &mut NullDisplay).unwrap();
        assert_ne!(snapshot(&model), erased);

        history.undo_once(&mut model, &mut NullDisplay).unwrap();
        assert!(history.temporary().is_none());
        assert_eq!(model.edge_count(), 4);
        assert_eq!(model.face_count(), 1);
    }
}
