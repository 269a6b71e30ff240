#![warn(clippy::todo, unused_qualifications)]

//! Topology optimization of photonic design regions with an epigraph
//! (min-max) driver.
//!
//! A multi-frequency design problem "maximize the worst of several figures of
//! merit" is rewritten as
//!
//! ```text
//! minimize t  subject to  f_i(x) - t <= 0  for every frequency i
//! ```
//!
//! over the augmented vector `[t, x...]`. Each anneal stage hands this problem
//! to a [`ConstrainedOptimizer`][optimizer::ConstrainedOptimizer], with the raw
//! design mapped to a physical material field by a
//! [`DesignMapping`][mapping::DesignMapping] (filter, projection, symmetry).
//! The field solver itself is an [`AdjointSimulation`][simulation::AdjointSimulation]
//! collaborator.

pub mod design;
pub mod epigraph;
mod error;
pub mod grid;
pub mod history;
pub mod mapping;
pub mod material;
pub mod observer;
pub mod optimizer;
pub mod render;
pub mod schedule;
pub mod simulation;

pub use crate::{
    design::{
        DesignFields,
        DesignRegion,
        DesignSpace,
    },
    epigraph::{
        EpigraphDriver,
        EpigraphProblem,
        StageContext,
    },
    error::Error,
    grid::Grid,
    history::EvaluationHistory,
    mapping::{
        DesignMapping,
        ProjectionParameters,
    },
    optimizer::{
        ConstrainedOptimizer,
        OptimizerBackend,
        OptimizerFactory,
    },
    schedule::{
        AnnealOutcome,
        AnnealSchedule,
        StageParameters,
        StageReport,
    },
    simulation::{
        AdjointEvaluation,
        AdjointSimulation,
    },
};
