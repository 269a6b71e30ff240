//! Observation hooks called after every evaluation.
//!
//! Observers only look. The driver logs their errors and carries on.

use std::path::PathBuf;

use crate::{
    Error,
    design::{
        DesignFields,
        DesignSpace,
    },
    grid::Grid,
    history::EvaluationRecord,
    render::save_field,
};

pub trait EvaluationObserver {
    fn observe(&mut self, record: &EvaluationRecord, fields: &DesignFields) -> Result<(), Error>;
}

impl<T> EvaluationObserver for &mut T
where
    T: EvaluationObserver + ?Sized,
{
    fn observe(&mut self, record: &EvaluationRecord, fields: &DesignFields) -> Result<(), Error> {
        T::observe(*self, record, fields)
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NoopObserver;

impl EvaluationObserver for NoopObserver {
    fn observe(&mut self, record: &EvaluationRecord, fields: &DesignFields) -> Result<(), Error> {
        let _ = (record, fields);
        Ok(())
    }
}

/// Writes every `every`-th physical design as PNG files into `directory`.
#[derive(Clone, Debug)]
pub struct SnapshotObserver {
    directory: PathBuf,
    every: usize,
    scale: u32,
    grids: Vec<(String, Grid)>,
    written: Vec<PathBuf>,
}

impl SnapshotObserver {
    pub fn new(directory: impl Into<PathBuf>, space: &DesignSpace, every: usize, scale: u32) -> Self {
        Self {
            directory: directory.into(),
            every: every.max(1),
            scale,
            grids: space
                .regions()
                .map(|region| (region.name.clone(), region.grid))
                .collect(),
            written: vec![],
        }
    }

    /// Paths of all snapshots written so far.
    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }
}

impl EvaluationObserver for SnapshotObserver {
    fn observe(&mut self, record: &EvaluationRecord, fields: &DesignFields) -> Result<(), Error> {
        if record.evaluation % self.every != 0 {
            return Ok(());
        }

        std::fs::create_dir_all(&self.directory)?;

        for (name, grid) in &self.grids {
            let Some(field) = fields.get(name)
            else {
                continue;
            };
            let path = self.directory.join(format!(
                "{name}_stage{:02}_eval{:04}.png",
                record.stage, record.evaluation
            ));
            save_field(&path, field, grid, self.scale)?;
            tracing::trace!(path = %path.display(), "wrote snapshot");
            self.written.push(path);
        }

        Ok(())
    }
}
