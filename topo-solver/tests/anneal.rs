use std::convert::Infallible;

use nalgebra::{
    DMatrix,
    DVector,
};
use topo_solver::{
    AdjointEvaluation,
    AdjointSimulation,
    AnnealSchedule,
    DesignFields,
    DesignMapping,
    DesignRegion,
    DesignSpace,
    EpigraphDriver,
    Grid,
    mapping::{
        Boundary,
        ConicFilter,
        MirrorAxis,
    },
    observer::SnapshotObserver,
    simulation::{
        PhaseScreenLens,
        PhaseScreenLensConfig,
    },
};

/// Objective `-mean(rho)`, maximizing the amount of solid material.
#[derive(Debug, Default)]
struct NegativeMean {
    calls: usize,
}

impl AdjointSimulation for NegativeMean {
    type Error = Infallible;

    fn num_objectives(&self) -> usize {
        1
    }

    fn evaluate(&mut self, fields: &DesignFields) -> Result<AdjointEvaluation, Infallible> {
        self.calls += 1;
        let rho = fields.concatenated();
        let n = rho.len() as f64;
        Ok(AdjointEvaluation {
            objective_values: DVector::from_element(1, -rho.mean()),
            sensitivity: DMatrix::from_element(rho.len(), 1, -1.0 / n),
        })
    }
}

#[test]
fn it_drives_the_bound_below_zero() {
    let grid = Grid::new(2, 1);
    let space = DesignSpace::single(DesignRegion::new("design", grid, 1.0), DesignMapping::new(grid))
        .unwrap();
    let mut driver = EpigraphDriver::new(space, NegativeMean::default());
    let schedule = AnnealSchedule {
        num_stages: 1,
        evaluations_per_stage: 20,
        constraint_tolerance: 1e-3,
        ..Default::default()
    };

    let x0 = DVector::from_vec(vec![0.0, 0.5, 0.5]);
    let outcome = driver.run_anneal_schedule(&x0, &schedule).unwrap();

    let t = outcome.bound();
    assert!(t < 0.0, "t = {t}");
    assert!(outcome.raw_design().iter().all(|x| (0.0..=1.0).contains(x)));

    let stage = &outcome.stages[0];
    assert!(stage.feasible);
    assert!(stage.evaluations <= 20);
    assert!(stage.worst_objective - t <= 1e-3);
    assert_eq!(driver.simulation().calls, outcome.history.len());
}

#[test]
fn it_anneals_a_lens() {
    let grid = Grid::new(12, 4);
    let region = DesignRegion::new("lens", grid, 4.0);
    let filter = ConicFilter::new(grid, 0.5, region.resolution, [Boundary::Clamp; 2]).unwrap();
    let mapping = DesignMapping::new(grid)
        .with_filter(filter)
        .unwrap()
        .with_symmetry(MirrorAxis::X);
    let lens = PhaseScreenLens::new(&region, &PhaseScreenLensConfig::default()).unwrap();
    let space = DesignSpace::single(region, mapping).unwrap();

    let directory = std::env::temp_dir().join(format!("topo-solver-anneal-{}", std::process::id()));
    let observer = SnapshotObserver::new(&directory, &space, 5, 2);
    let mut driver = EpigraphDriver::new(space, lens).with_observer(observer);

    let schedule = AnnealSchedule {
        initial_beta: 4.0,
        num_stages: 2,
        evaluations_per_stage: 15,
        ..Default::default()
    };
    let mut x0 = DVector::from_element(1 + grid.len(), 0.5);
    x0[0] = 0.0;

    let outcome = driver.run_anneal_schedule(&x0, &schedule).unwrap();

    assert_eq!(outcome.stages.len(), 2);
    assert!(outcome.stages[1].parameters.beta > outcome.stages[0].parameters.beta);
    assert!(outcome.bound() <= 0.0);
    assert!(outcome.raw_design().iter().all(|x| (0.0..=1.0).contains(x)));
    for record in &outcome.history {
        assert_eq!(record.objective_values.len(), 3);
        assert!(record.worst() <= 0.0 && record.best() >= -1.0);
    }

    let binary = outcome.binarized(driver.space()).unwrap();
    let field = binary.get("lens").unwrap();
    assert!(field.iter().all(|rho| *rho == 0.0 || *rho == 1.0));

    assert!(!driver.observer().written().is_empty());
    assert!(driver.observer().written().iter().all(|path| path.exists()));
    std::fs::remove_dir_all(&directory).unwrap();
}
