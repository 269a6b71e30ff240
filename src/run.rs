use std::{
    fs::File,
    io::BufWriter,
    path::Path,
};

use chrono::Local;
use color_eyre::eyre::{
    Context,
    Error,
};
use nalgebra::DVector;
use serde::Serialize;
use topo_solver::{
    DesignFields,
    DesignMapping,
    DesignRegion,
    DesignSpace,
    EpigraphDriver,
    Grid,
    mapping::{
        ConicFilter,
        conic_radius_from_eta_e,
    },
    material::PhysicalConstants,
    observer::{
        EvaluationObserver,
        NoopObserver,
        SnapshotObserver,
    },
    render::save_field,
    simulation::{
        PhaseScreenLens,
        PhaseScreenLensConfig,
    },
};

use crate::{
    args::Args,
    config::{
        FilterConfig,
        RegionConfig,
        RunConfig,
    },
};

pub fn run(args: Args) -> Result<(), Error> {
    let mut config = match &args.config {
        Some(path) => read_config(path)?,
        None => RunConfig::default(),
    };
    if let Some(output) = args.output {
        config.output.directory = output;
    }
    if let Some(optimizer) = args.optimizer {
        config.optimizer = optimizer;
    }
    if let Some(stages) = args.stages {
        config.schedule.num_stages = stages;
    }
    if let Some(evaluations) = args.evaluations {
        config.schedule.evaluations_per_stage = evaluations;
    }
    if args.no_snapshots {
        config.output.snapshot_every = None;
    }
    tracing::debug!(?config);

    let run_directory = config
        .output
        .directory
        .join(Local::now().format("%Y-%m-%d_%H:%M:%S").to_string());
    std::fs::create_dir_all(&run_directory).with_context(|| {
        format!(
            "Could not create run directory: {}",
            run_directory.display()
        )
    })?;
    std::fs::write(
        run_directory.join("config.toml"),
        toml::to_string_pretty(&config)?,
    )?;
    tracing::info!(path = %run_directory.display(), "Starting run");

    let region = build_region(&config.region);
    let mapping = build_mapping(&config.region)?;
    let physical_constants = PhysicalConstants::REDUCED;
    let lens = PhaseScreenLens::new(
        &region,
        &PhaseScreenLensConfig {
            frequencies: config
                .lens
                .wavelengths
                .iter()
                .map(|wavelength| physical_constants.wavelength_to_frequency(*wavelength))
                .collect(),
            focal_length: config.lens.focal_length,
            materials: config.lens.materials,
            physical_constants,
        },
    )?;
    let space = DesignSpace::single(region, mapping)?;

    let mut snapshots = config.output.snapshot_every.map(|every| {
        SnapshotObserver::new(
            run_directory.join("snapshots"),
            &space,
            every,
            config.output.scale,
        )
    });
    let mut noop = NoopObserver;
    let observer: &mut dyn EvaluationObserver = match &mut snapshots {
        Some(snapshots) => snapshots,
        None => &mut noop,
    };

    let mut x0 = DVector::from_element(1 + space.num_cells(), config.initial_density);
    x0[0] = 0.0;

    let mut driver = EpigraphDriver::new(space, lens)
        .with_observer(observer)
        .with_optimizer(config.optimizer);
    let outcome = driver.run_anneal_schedule(&x0, &config.schedule)?;

    for stage in &outcome.stages {
        tracing::info!(
            index = stage.parameters.index,
            beta = stage.parameters.beta,
            stop_reason = %stage.stop_reason,
            evaluations = stage.evaluations,
            feasible = stage.feasible,
            worst_objective = stage.worst_objective,
            "Stage"
        );
    }

    write_json(&run_directory.join("history.json"), &outcome.history)?;
    write_json(&run_directory.join("stages.json"), &outcome.stages)?;
    write_json(&run_directory.join("design.json"), &outcome.design)?;

    let space = driver.space();
    write_fields(
        &run_directory,
        "physical",
        space,
        &outcome.physical(space)?,
        config.output.scale,
    )?;
    write_fields(
        &run_directory,
        "binarized",
        space,
        &outcome.binarized(space)?,
        config.output.scale,
    )?;

    drop(driver);

    if let Some(snapshots) = &snapshots {
        tracing::info!(count = snapshots.written().len(), "Wrote snapshots");
    }
    tracing::info!(
        bound = outcome.bound(),
        evaluations = outcome.history.len(),
        path = %run_directory.display(),
        "Run finished"
    );

    Ok(())
}

fn read_config(path: &Path) -> Result<RunConfig, Error> {
    tracing::info!(path = %path.display(), "Reading config file");
    let toml = std::fs::read(path)
        .with_context(|| format!("Could not read config file: {}", path.display()))?;
    let config = toml::from_slice(&toml)
        .with_context(|| format!("Invalid config file: {}", path.display()))?;
    Ok(config)
}

fn build_region(config: &RegionConfig) -> DesignRegion {
    DesignRegion::new(
        config.name.clone(),
        Grid::new(config.size[0], config.size[1]),
        config.resolution,
    )
}

fn build_mapping(config: &RegionConfig) -> Result<DesignMapping, Error> {
    let grid = Grid::new(config.size[0], config.size[1]);
    let mut mapping = DesignMapping::new(grid);

    if let Some(filter) = &config.filter {
        let (radius, boundary) = match filter {
            FilterConfig::Radius { radius, boundary } => (*radius, *boundary),
            FilterConfig::MinimumLength {
                length,
                eta_e,
                boundary,
            } => (conic_radius_from_eta_e(*length, *eta_e)?, *boundary),
        };
        tracing::debug!(radius, "Filter radius");
        mapping = mapping.with_filter(ConicFilter::new(
            grid,
            radius,
            config.resolution,
            boundary,
        )?)?;
    }

    if let Some(axis) = config.symmetry {
        mapping = mapping.with_symmetry(axis);
    }

    Ok(mapping)
}

fn write_json<T>(path: &Path, value: &T) -> Result<(), Error>
where
    T: Serialize + ?Sized,
{
    let writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(writer, value)?;
    Ok(())
}

fn write_fields(
    directory: &Path,
    prefix: &str,
    space: &DesignSpace,
    fields: &DesignFields,
    scale: u32,
) -> Result<(), Error> {
    for region in space.regions() {
        if let Some(field) = fields.get(&region.name) {
            let path = directory.join(format!("{prefix}_{}.png", region.name));
            save_field(&path, field, &region.grid, scale)?;
        }
    }
    Ok(())
}
