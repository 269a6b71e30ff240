//! The epigraph driver.
//!
//! The min-max problem `min_x max_i f_i(x)` becomes
//!
//! ```text
//! minimize t  subject to  f_i(x) - t <= tol  for all i
//! ```
//!
//! over the augmented vector `[t, x...]`. The epigraph variable `t` is not a
//! physical design value. Its derivatives are fixed: `1` in the objective and
//! `-1` in every constraint.

use nalgebra::{
    DMatrix,
    DVector,
};

use crate::{
    Error,
    design::DesignSpace,
    history::{
        EvaluationHistory,
        EvaluationRecord,
    },
    mapping::ProjectionParameters,
    observer::{
        EvaluationObserver,
        NoopObserver,
    },
    optimizer::{
        OptimizationProblem,
        OptimizerBackend,
        OptimizerFactory,
        OptimizerSettings,
    },
    schedule::{
        AnnealOutcome,
        AnnealSchedule,
        StageParameters,
        StageReport,
    },
    simulation::AdjointSimulation,
};

const DUAL_FTOL_REL: f64 = 1e-10;

/// The epigraph objective: the value of `t` and the unit vector on `t`.
pub fn scalar_objective(x: &DVector<f64>) -> (f64, DVector<f64>) {
    let mut gradient = DVector::zeros(x.len());
    if x.is_empty() {
        return (0.0, gradient);
    }
    gradient[0] = 1.0;
    (x[0], gradient)
}

/// The stage a constraint evaluation belongs to.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StageContext {
    pub stage: usize,
    pub eta: f64,
    pub beta: f64,
    /// Constraint evaluations so far in this stage.
    pub evaluations: usize,
}

impl StageContext {
    pub fn new(stage: &StageParameters) -> Self {
        Self {
            stage: stage.index,
            eta: stage.eta,
            beta: stage.beta,
            evaluations: 0,
        }
    }

    pub fn projection(&self) -> ProjectionParameters {
        ProjectionParameters::new(self.eta, self.beta)
    }
}

/// One anneal stage as seen by the optimizer.
#[derive(Debug)]
pub struct EpigraphProblem<'a, S, O> {
    space: &'a DesignSpace,
    simulation: &'a mut S,
    observer: &'a mut O,
    history: &'a mut EvaluationHistory,
    context: StageContext,
}

impl<'a, S, O> EpigraphProblem<'a, S, O>
where
    S: AdjointSimulation,
    O: EvaluationObserver,
{
    pub fn new(
        space: &'a DesignSpace,
        simulation: &'a mut S,
        observer: &'a mut O,
        history: &'a mut EvaluationHistory,
        context: StageContext,
    ) -> Self {
        Self {
            space,
            simulation,
            observer,
            history,
            context,
        }
    }

    pub fn context(&self) -> &StageContext {
        &self.context
    }

    /// Residuals `f_i - t` and their Jacobian `[objectives, 1 + cells]`.
    ///
    /// Runs the simulation exactly once, after the length of `x` has been
    /// checked.
    pub fn constraint_batch(
        &mut self,
        x: &DVector<f64>,
    ) -> Result<(DVector<f64>, DMatrix<f64>), Error> {
        let num_cells = self.space.num_cells();
        Error::check_size("augmented design", 1 + num_cells, x.len())?;

        let t = x[0];
        let raw = x.rows(1, num_cells).into_owned();
        let parameters = self.context.projection();
        let fields = self.space.map(&raw, &parameters)?;

        let evaluation = self
            .simulation
            .evaluate(&fields)
            .map_err(|error| Error::Simulation(Box::new(error)))?;
        let num_objectives = self.simulation.num_objectives();
        evaluation.check_shape(num_cells, num_objectives)?;

        let gradient = self
            .space
            .pull_back(&raw, &parameters, &evaluation.sensitivity)?;

        let residuals = evaluation.objective_values.add_scalar(-t);
        let jacobian = DMatrix::from_fn(num_objectives, 1 + num_cells, |i, j| {
            if j == 0 {
                -1.0
            }
            else {
                gradient[(j - 1, i)]
            }
        });

        let record = EvaluationRecord {
            stage: self.context.stage,
            evaluation: self.context.evaluations,
            eta: self.context.eta,
            beta: self.context.beta,
            objective_values: evaluation.objective_values.iter().copied().collect(),
        };
        self.context.evaluations += 1;

        tracing::debug!(
            stage = record.stage,
            evaluation = record.evaluation,
            t,
            worst = record.worst(),
            "evaluated constraints"
        );

        if let Err(error) = self.observer.observe(&record, &fields) {
            tracing::warn!(%error, "observer failed");
        }
        self.history.push(record);

        Ok((residuals, jacobian))
    }
}

impl<S, O> OptimizationProblem for EpigraphProblem<'_, S, O>
where
    S: AdjointSimulation,
    O: EvaluationObserver,
{
    fn dimension(&self) -> usize {
        1 + self.space.num_cells()
    }

    fn num_constraints(&self) -> usize {
        self.simulation.num_objectives()
    }

    fn objective(&mut self, x: &DVector<f64>) -> (f64, DVector<f64>) {
        scalar_objective(x)
    }

    fn constraints(&mut self, x: &DVector<f64>) -> Result<(DVector<f64>, DMatrix<f64>), Error> {
        self.constraint_batch(x)
    }
}

/// Owns the design space, the simulation and the evaluation history, and
/// runs anneal schedules.
#[derive(derive_more::Debug)]
pub struct EpigraphDriver<S, O = NoopObserver> {
    space: DesignSpace,
    #[debug(skip)]
    simulation: S,
    #[debug(skip)]
    observer: O,
    #[debug(skip)]
    optimizer: Box<dyn OptimizerFactory>,
    history: EvaluationHistory,
}

impl<S> EpigraphDriver<S, NoopObserver>
where
    S: AdjointSimulation,
{
    pub fn new(space: DesignSpace, simulation: S) -> Self {
        Self {
            space,
            simulation,
            observer: NoopObserver,
            optimizer: Box::new(OptimizerBackend::default()),
            history: EvaluationHistory::default(),
        }
    }
}

impl<S, O> EpigraphDriver<S, O>
where
    S: AdjointSimulation,
    O: EvaluationObserver,
{
    pub fn with_observer<P>(self, observer: P) -> EpigraphDriver<S, P>
    where
        P: EvaluationObserver,
    {
        EpigraphDriver {
            space: self.space,
            simulation: self.simulation,
            observer,
            optimizer: self.optimizer,
            history: self.history,
        }
    }

    pub fn with_optimizer(mut self, optimizer: impl OptimizerFactory + 'static) -> Self {
        self.optimizer = Box::new(optimizer);
        self
    }

    pub fn space(&self) -> &DesignSpace {
        &self.space
    }

    pub fn simulation(&self) -> &S {
        &self.simulation
    }

    pub fn observer(&self) -> &O {
        &self.observer
    }

    pub fn history(&self) -> &EvaluationHistory {
        &self.history
    }

    pub fn into_parts(self) -> (S, O, EvaluationHistory) {
        (self.simulation, self.observer, self.history)
    }

    /// Length of the augmented vector `[t, raw design...]`.
    pub fn dimension(&self) -> usize {
        1 + self.space.num_cells()
    }

    /// `t` in `(-inf, 0]`, design cells in `[0, 1]`.
    pub fn bounds(&self) -> (DVector<f64>, DVector<f64>) {
        let n = self.dimension();
        let lower = DVector::from_fn(n, |j, _| if j == 0 { f64::NEG_INFINITY } else { 0.0 });
        let upper = DVector::from_fn(n, |j, _| if j == 0 { 0.0 } else { 1.0 });
        (lower, upper)
    }

    /// Evaluates the epigraph constraints outside of a schedule run. The
    /// evaluation is recorded in the history like any other.
    pub fn constraint_batch(
        &mut self,
        x: &DVector<f64>,
        stage: &StageParameters,
    ) -> Result<(DVector<f64>, DMatrix<f64>), Error> {
        let evaluations = self.history.stage(stage.index).count();
        let context = StageContext {
            evaluations,
            ..StageContext::new(stage)
        };
        self.problem(context).constraint_batch(x)
    }

    fn problem(&mut self, context: StageContext) -> EpigraphProblem<'_, S, O> {
        EpigraphProblem::new(
            &self.space,
            &mut self.simulation,
            &mut self.observer,
            &mut self.history,
            context,
        )
    }

    /// Runs every stage of `schedule`, starting at the augmented vector `x0`.
    ///
    /// A stage that ends infeasible or out of budget is kept as it is and its
    /// result is carried into the next stage.
    pub fn run_anneal_schedule(
        &mut self,
        x0: &DVector<f64>,
        schedule: &AnnealSchedule,
    ) -> Result<AnnealOutcome, Error> {
        schedule.validate()?;
        Error::check_size("initial design", self.dimension(), x0.len())?;

        let num_objectives = self.simulation.num_objectives();
        if num_objectives == 0 {
            return Err(Error::InvalidSettings {
                reason: "simulation has no objectives".to_owned(),
            });
        }

        let (lower, upper) = self.bounds();
        let mut x = x0.zip_zip_map(&lower, &upper, |x, lower, upper| x.max(lower).min(upper));
        let mut stages = Vec::with_capacity(schedule.num_stages);
        self.history = EvaluationHistory::default();

        for stage in schedule.stages() {
            let _span =
                tracing::info_span!("stage", index = stage.index, beta = stage.beta).entered();

            let settings = OptimizerSettings {
                lower_bounds: lower.clone(),
                upper_bounds: upper.clone(),
                constraint_tolerances: DVector::from_element(
                    num_objectives,
                    schedule.constraint_tolerance,
                ),
                max_evaluations: schedule.evaluations_per_stage,
                ftol_rel: schedule.ftol_rel,
                xtol_rel: 0.0,
                dual_ftol_rel: DUAL_FTOL_REL,
            };
            let mut optimizer = self.optimizer.create(settings)?;
            let mut problem = self.problem(StageContext::new(&stage));
            let report = optimizer.minimize(&mut problem, &mut x)?;

            let bound = x[0];
            let worst_objective = report.constraints.max() + bound;

            if report.feasible {
                tracing::info!(
                    stop_reason = %report.stop_reason,
                    evaluations = report.evaluations,
                    bound,
                    worst_objective,
                    "stage finished"
                );
            }
            else {
                tracing::warn!(
                    stop_reason = %report.stop_reason,
                    evaluations = report.evaluations,
                    bound,
                    worst_objective,
                    "stage finished without a feasible point"
                );
            }

            stages.push(StageReport {
                parameters: stage,
                stop_reason: report.stop_reason,
                evaluations: report.evaluations,
                feasible: report.feasible,
                bound,
                worst_objective,
            });
        }

        Ok(AnnealOutcome {
            design: x,
            stages,
            history: self.history.clone(),
            eta: schedule.eta,
        })
    }
}
