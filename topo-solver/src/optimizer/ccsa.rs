//! Conservative convex separable approximations (CCSA).
//!
//! Every outer iteration builds a separable quadratic model of the objective
//! and the constraints around the current point, restricted to a trust box of
//! half-width `sigma`. The model is minimized through its dual, a concave
//! problem in one multiplier per constraint. If the model underestimates the
//! true functions at the candidate (it is not conservative), its penalty
//! weights are raised and the model is solved again.

use nalgebra::{
    DMatrix,
    DVector,
};

use crate::{
    Error,
    optimizer::{
        ConstrainedOptimizer,
        OptimizationProblem,
        OptimizationReport,
        OptimizerSettings,
        StopReason,
    },
};

const MIN_PENALTY: f64 = 1e-5;
const MAX_MULTIPLIER: f64 = 1e30;
const MAX_DUAL_SWEEPS: usize = 200;
const MAX_ROOT_ITERATIONS: usize = 200;
const ROOT_TOLERANCE: f64 = 1e-14;
const SIGMA_SHRINK: f64 = 0.7;
const SIGMA_GROW: f64 = 1.2;
const MIN_SIGMA_FRACTION: f64 = 1e-8;
const MAX_SIGMA_FRACTION: f64 = 10.0;

#[derive(Clone, Debug)]
pub struct Ccsa {
    settings: OptimizerSettings,
}

impl Ccsa {
    pub fn new(settings: OptimizerSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &OptimizerSettings {
        &self.settings
    }

    fn evaluate(
        &self,
        problem: &mut dyn OptimizationProblem,
        x: &DVector<f64>,
    ) -> Result<Evaluation, Error> {
        let (objective, gradient) = problem.objective(x);
        let (constraints, jacobian) = problem.constraints(x)?;

        let n = x.len();
        let m = self.settings.constraint_tolerances.len();
        Error::check_size("objective gradient", n, gradient.len())?;
        Error::check_size("constraint values", m, constraints.len())?;
        Error::check_size("constraint jacobian", m * n, jacobian.len())?;
        Error::check_size("constraint jacobian rows", m, jacobian.nrows())?;

        Ok(Evaluation {
            x: x.clone(),
            objective,
            gradient,
            constraints,
            jacobian,
        })
    }
}

impl ConstrainedOptimizer for Ccsa {
    fn minimize(
        &mut self,
        problem: &mut dyn OptimizationProblem,
        x: &mut DVector<f64>,
    ) -> Result<OptimizationReport, Error> {
        let n = problem.dimension();
        let m = problem.num_constraints();
        self.settings.validate(n, m)?;
        Error::check_size("initial point", n, x.len())?;

        let settings = &self.settings;
        let lower = &settings.lower_bounds;
        let upper = &settings.upper_bounds;

        let start = x.zip_zip_map(lower, upper, |x, lower, upper| x.max(lower).min(upper));
        let mut sigma = lower.zip_map(upper, |lower, upper| {
            let width = upper - lower;
            if width.is_finite() && width > 0.0 {
                0.5 * width
            }
            else {
                1.0
            }
        });
        let mut rho = 1.0;
        let mut rho_c = DVector::from_element(m, 1.0);

        let mut center = self.evaluate(problem, &start)?;
        let mut evaluations = 1;
        let mut feasible = settings.is_feasible(&center.constraints);
        let mut infeasibility = settings.violation(&center.constraints);
        let mut best = feasible.then(|| center.clone());
        let mut previous: Option<DVector<f64>> = None;
        let mut previous2: Option<DVector<f64>> = None;

        let stop_reason = loop {
            if evaluations >= settings.max_evaluations {
                break StopReason::MaxEvaluations;
            }

            let outer_objective = center.objective;
            let outer_x = center.x.clone();
            let mut last_objective;
            let mut last_x;

            loop {
                let trust_lower = DVector::from_fn(n, |j, _| lower[j].max(center.x[j] - sigma[j]));
                let trust_upper = DVector::from_fn(n, |j, _| upper[j].min(center.x[j] + sigma[j]));

                let model = Model {
                    center: &center,
                    sigma: &sigma,
                    rho,
                    rho_c: &rho_c,
                    lower: &trust_lower,
                    upper: &trust_upper,
                };
                let candidate = model.solve_dual(settings.dual_ftol_rel);

                let trial = self.evaluate(problem, &candidate.x)?;
                evaluations += 1;

                let trial_feasible = settings.is_feasible(&trial.constraints);
                let trial_infeasibility = settings.violation(&trial.constraints);
                let conservative = candidate.objective >= trial.objective
                    && candidate
                        .constraints
                        .iter()
                        .zip(trial.constraints.iter())
                        .all(|(model, actual)| model >= actual);

                if !conservative && candidate.w > 0.0 {
                    rho = raise_penalty(rho, trial.objective, candidate.objective, candidate.w);
                    for i in 0..m {
                        rho_c[i] = raise_penalty(
                            rho_c[i],
                            trial.constraints[i],
                            candidate.constraints[i],
                            candidate.w,
                        );
                    }
                }

                if trial_feasible
                    && best
                        .as_ref()
                        .is_none_or(|best| trial.objective < best.objective)
                {
                    best = Some(trial.clone());
                }

                last_objective = trial.objective;
                last_x = trial.x.clone();

                let improved = trial.objective < center.objective
                    && (conservative || trial_feasible || !feasible);
                if improved || (!feasible && trial_infeasibility < infeasibility) {
                    if !trial_feasible {
                        infeasibility = trial_infeasibility;
                    }
                    feasible = trial_feasible;
                    previous2 = previous.take();
                    previous = Some(center.x.clone());
                    center = trial;
                }

                if conservative || evaluations >= settings.max_evaluations {
                    break;
                }
            }

            tracing::debug!(
                evaluations,
                objective = center.objective,
                feasible,
                infeasibility,
                rho,
                "ccsa outer iteration"
            );

            if evaluations >= settings.max_evaluations {
                break StopReason::MaxEvaluations;
            }
            if settings.ftol_rel > 0.0
                && (last_objective - outer_objective).abs()
                    <= settings.ftol_rel * outer_objective.abs()
            {
                break StopReason::FtolReached;
            }
            if settings.xtol_rel > 0.0
                && last_x
                    .iter()
                    .zip(outer_x.iter())
                    .all(|(x, x0)| (x - x0).abs() <= settings.xtol_rel * x.abs())
            {
                break StopReason::XtolReached;
            }

            rho = (0.1 * rho).max(MIN_PENALTY);
            rho_c.apply(|rho| *rho = (0.1 * *rho).max(MIN_PENALTY));

            if let (Some(previous), Some(previous2)) = (&previous, &previous2) {
                for j in 0..n {
                    let turn = (center.x[j] - previous[j]) * (previous[j] - previous2[j]);
                    let factor = if turn < 0.0 {
                        SIGMA_SHRINK
                    }
                    else if turn > 0.0 {
                        SIGMA_GROW
                    }
                    else {
                        1.0
                    };
                    sigma[j] *= factor;

                    let width = upper[j] - lower[j];
                    if width.is_finite() && width > 0.0 {
                        sigma[j] = sigma[j]
                            .max(MIN_SIGMA_FRACTION * width)
                            .min(MAX_SIGMA_FRACTION * width);
                    }
                }
            }
        };

        let result = best.unwrap_or(center);
        x.copy_from(&result.x);

        Ok(OptimizationReport {
            stop_reason,
            evaluations,
            objective: result.objective,
            feasible: settings.is_feasible(&result.constraints),
            constraints: result.constraints,
        })
    }
}

fn raise_penalty(rho: f64, actual: f64, model: f64, w: f64) -> f64 {
    if actual > model {
        (10.0 * rho).min(1.1 * (rho + (actual - model) / w))
    }
    else {
        rho
    }
}

#[derive(Clone, Debug)]
struct Evaluation {
    x: DVector<f64>,
    objective: f64,
    gradient: DVector<f64>,
    constraints: DVector<f64>,
    jacobian: DMatrix<f64>,
}

/// Separable quadratic model around `center`.
struct Model<'a> {
    center: &'a Evaluation,
    sigma: &'a DVector<f64>,
    rho: f64,
    rho_c: &'a DVector<f64>,
    lower: &'a DVector<f64>,
    upper: &'a DVector<f64>,
}

#[derive(Clone, Debug)]
struct Candidate {
    x: DVector<f64>,
    w: f64,
    objective: f64,
    constraints: DVector<f64>,
    dual: f64,
}

impl Model<'_> {
    /// Minimizer of the Lagrangian for fixed multipliers `y`.
    fn primal(&self, y: &DVector<f64>) -> Candidate {
        let center = self.center;
        let v = self.rho + y.dot(self.rho_c);
        let u = &center.gradient + center.jacobian.tr_mul(y);

        let x = DVector::from_fn(center.x.len(), |j, _| {
            let step = -self.sigma[j] * self.sigma[j] * u[j] / v;
            (center.x[j] + step).max(self.lower[j]).min(self.upper[j])
        });
        let dx = &x - &center.x;
        let w = 0.5
            * dx
                .iter()
                .zip(self.sigma.iter())
                .map(|(dx, sigma)| (dx / sigma).powi(2))
                .sum::<f64>();

        let objective = center.objective + center.gradient.dot(&dx) + self.rho * w;
        let constraints =
            &center.constraints + &center.jacobian * &dx + self.rho_c * w;
        let dual = objective + y.dot(&constraints);

        Candidate {
            x,
            w,
            objective,
            constraints,
            dual,
        }
    }

    /// Maximizes the dual by cyclic coordinate ascent.
    fn solve_dual(&self, dual_ftol_rel: f64) -> Candidate {
        let m = self.center.constraints.len();
        let mut y = DVector::zeros(m);
        let mut candidate = self.primal(&y);

        if m == 0 {
            return candidate;
        }

        for _ in 0..MAX_DUAL_SWEEPS {
            let previous = candidate.dual;
            for i in 0..m {
                self.maximize_multiplier(&mut y, i);
            }
            candidate = self.primal(&y);
            if (candidate.dual - previous).abs() <= dual_ftol_rel * candidate.dual.abs() {
                break;
            }
        }

        candidate
    }

    /// Sets `y[i]` to the root of the model constraint `i`, the maximizer of
    /// the concave dual along that coordinate.
    fn maximize_multiplier(&self, y: &mut DVector<f64>, i: usize) {
        let initial = y[i];
        let constraint = |value: f64, y: &mut DVector<f64>| {
            y[i] = value;
            self.primal(y).constraints[i]
        };

        let mut a = 0.0;
        let mut ga = constraint(a, y);
        if ga <= 0.0 {
            y[i] = 0.0;
            return;
        }

        let mut b = (2.0 * initial).max(1.0);
        let mut gb = constraint(b, y);
        while gb > 0.0 && b < MAX_MULTIPLIER {
            a = b;
            ga = gb;
            b *= 4.0;
            gb = constraint(b, y);
        }
        if gb > 0.0 {
            y[i] = b;
            return;
        }

        // illinois
        let mut c = b;
        let mut side = 0;
        for _ in 0..MAX_ROOT_ITERATIONS {
            c = (a * gb - b * ga) / (gb - ga);
            let gc = constraint(c, y);
            if gc > 0.0 {
                a = c;
                ga = gc;
                if side == 1 {
                    gb *= 0.5;
                }
                side = 1;
            }
            else {
                b = c;
                gb = gc;
                if side == -1 {
                    ga *= 0.5;
                }
                side = -1;
            }
            if gc == 0.0 || (b - a).abs() <= ROOT_TOLERANCE * b.abs().max(1.0) {
                break;
            }
        }
        y[i] = c;
    }
}
