//! Lifecycle manager: setup, the step loop, output, and teardown.
//!
//! All process-wide resources (communicator, RNG) are owned by [`Solver`];
//! there is no global state. `cleanup` consumes the solver, so stepping after
//! teardown or tearing down twice fails to compile rather than at runtime.

use std::path::PathBuf;
use std::thread;
use std::time::Instant;

use log::{debug, info};
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::comm::{ChannelComm, Communicator, HaloExchange, SingleRank};
use crate::compute::{
    FieldStats, RusanovOperator, SpatialOperator, StageIntegrator, StateField, clamp_dt,
    local_stable_dt,
};
use crate::error::{SolverError, SolverResult};
use crate::grid::{GlobalGrid, Subdomain, decompose};
use crate::output::{JsonSnapshotWriter, OutputScheduler, Snapshot, SnapshotWriter};
use crate::schema::SolverConfig;

/// Scalar time state of a run.
#[derive(Debug, Clone, Copy)]
pub struct TimeState {
    /// Simulation time, monotone non-decreasing.
    pub t: f64,
    /// Step size taken by the most recent step (or the initial bound).
    pub dt: f64,
    /// Stop time.
    pub t1: f64,
    /// Snapshot interval.
    pub dtout: f64,
    /// Snapshots emitted so far.
    pub nout: u64,
    /// Wall-clock start, recorded at setup.
    pub t_start: Instant,
}

/// Summary of a completed integration loop.
#[derive(Debug, Clone, Copy)]
pub struct RunReport {
    pub steps: u64,
    pub final_time: f64,
    pub nout: u64,
    pub wall_seconds: f64,
}

/// Summary returned by teardown.
#[derive(Debug, Clone, Copy)]
pub struct CleanupReport {
    pub wall_seconds: f64,
}

/// One rank's solver instance.
pub struct Solver {
    config: SolverConfig,
    grid: GlobalGrid,
    sub: Subdomain,
    halo: HaloExchange,
    op: Box<dyn SpatialOperator>,
    integrator: StageIntegrator,
    comm: Box<dyn Communicator>,
    writer: Box<dyn SnapshotWriter>,
    scheduler: OutputScheduler,
    q: StateField,
    q1: StateField,
    q2: StateField,
    rng: StdRng,
    time: TimeState,
    steps: u64,
}

impl std::fmt::Debug for Solver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Solver")
            .field("steps", &self.steps)
            .finish_non_exhaustive()
    }
}

impl Solver {
    /// Initialize one rank: seed the RNG, build the decomposition, allocate
    /// and fill the state buffer, and compute the initial stable `dt`.
    ///
    /// Fails before any state mutation if the configuration is invalid, the
    /// communicator does not match the configured rank count, or the grid
    /// cannot be partitioned.
    pub fn setup(
        config: SolverConfig,
        comm: Box<dyn Communicator>,
        writer: Box<dyn SnapshotWriter>,
    ) -> SolverResult<Self> {
        let t_start = Instant::now();
        config.validate()?;

        if comm.size() != config.rank_count() {
            return Err(SolverError::Comm(format!(
                "communicator has {} ranks but the configuration requires {}",
                comm.size(),
                config.rank_count()
            )));
        }

        let grid = GlobalGrid::new(
            config.grid.nx,
            config.grid.ny,
            config.grid.nz,
            config.grid.lx,
            config.grid.ly,
            config.grid.lz,
        );
        let decomp = decompose(&grid, config.ranks, &config.boundaries, config.grid.halo)?;
        let rank = comm.rank();
        let sub = *decomp.subdomain(rank);
        let halo = HaloExchange::new(
            sub,
            *decomp.neighbors(rank),
            &config.physics.ambient,
            config.physics.gamma,
        );

        // Decorrelate the per-rank random streams.
        let mut rng = StdRng::seed_from_u64(config.rng_seed.wrapping_add(rank as u64));

        let mut q = StateField::zeroed(&sub);
        config
            .initial
            .apply(&mut q, &sub, &grid, config.physics.gamma, &mut rng);

        let local = local_stable_dt(&q, &sub, &grid, config.physics.gamma, config.time.cfl, 0)?;
        let global = comm.reduce_min(local)?;
        let dt = clamp_dt(global, config.time.dt_max, 0.0, config.time.t1);

        info!(
            "rank {rank}: {}x{}x{} interior at ({}, {}, {}), initial dt = {dt:.3e}",
            sub.nx, sub.ny, sub.nz, sub.ix0, sub.iy0, sub.iz0
        );

        let time = TimeState {
            t: 0.0,
            dt,
            t1: config.time.t1,
            dtout: config.time.dtout,
            nout: 0,
            t_start,
        };
        let gamma = config.physics.gamma;
        let dtout = config.time.dtout;

        Ok(Self {
            grid,
            sub,
            halo,
            op: Box::new(RusanovOperator::new(gamma)),
            integrator: StageIntegrator::new(&sub),
            comm,
            writer,
            scheduler: OutputScheduler::new(dtout),
            q1: StateField::zeroed(&sub),
            q2: StateField::zeroed(&sub),
            q,
            rng,
            time,
            steps: 0,
            config,
        })
    }

    /// Advance the state by one step.
    ///
    /// Recomputes the stability bound, takes the globally reduced step, then
    /// verifies the new state. An unstable state is fatal; there is no
    /// rejection or retry.
    pub fn step(&mut self) -> SolverResult<()> {
        let gamma = self.config.physics.gamma;
        let local = local_stable_dt(
            &self.q,
            &self.sub,
            &self.grid,
            gamma,
            self.config.time.cfl,
            self.steps,
        )?;
        let global = self.comm.reduce_min(local)?;
        let dt = clamp_dt(global, self.config.time.dt_max, self.time.t, self.time.t1);

        self.integrator.step(
            &mut self.q,
            &mut self.q1,
            &mut self.q2,
            self.op.as_ref(),
            &self.halo,
            self.comm.as_ref(),
            &self.sub,
            &self.grid,
            dt,
        )?;

        self.time.t += dt;
        self.time.dt = dt;
        self.steps += 1;

        if let Some(detail) = self.q.validity_violation(&self.sub, gamma) {
            return Err(SolverError::UnstableState {
                step: self.steps,
                detail,
            });
        }
        Ok(())
    }

    /// Emit every snapshot due at the current time.
    ///
    /// The state buffer is only read. `nout` increments once per durable
    /// record; a failed write leaves it unchanged.
    pub fn generate_output(&mut self) -> SolverResult<()> {
        let due = self.scheduler.due(self.time.t);
        if due == 0 {
            return Ok(());
        }

        let fields = self.q.interior_copy(&self.sub);
        let stats = FieldStats::from_state(&self.q, &self.sub);
        for _ in 0..due {
            let snapshot = Snapshot {
                nout: self.time.nout,
                rank: self.comm.rank(),
                t: self.time.t,
                dt: self.time.dt,
                origin: (self.sub.ix0, self.sub.iy0, self.sub.iz0),
                extent: (self.sub.nx, self.sub.ny, self.sub.nz),
                stats: stats.clone(),
                fields: &fields,
            };
            self.writer.write(&snapshot)?;
            self.scheduler.mark_emitted();
            self.time.nout += 1;

            info!(
                "rank {}: snapshot {} at t = {:.6} (mass {:.6e}, density [{:.3e}, {:.3e}])",
                self.comm.rank(),
                self.time.nout - 1,
                self.time.t,
                stats.total_mass,
                stats.min_density,
                stats.max_density,
            );
        }
        Ok(())
    }

    /// The full integration loop: initial snapshot, step until `t1`, final
    /// snapshot. The caller still invokes [`Solver::cleanup`].
    pub fn run(&mut self) -> SolverResult<RunReport> {
        self.generate_output()?;

        // Stop once t reaches t1 up to round-off, so the clipped final step
        // is not followed by a spurious zero-length step.
        let t_end = self.time.t1 * (1.0 - 1e-12);
        while self.time.t < t_end {
            self.step()?;
            self.generate_output()?;

            if self.steps % 50 == 0 {
                debug!(
                    "rank {}: step {} t = {:.6} dt = {:.3e}",
                    self.comm.rank(),
                    self.steps,
                    self.time.t,
                    self.time.dt
                );
            }
        }

        Ok(RunReport {
            steps: self.steps,
            final_time: self.time.t,
            nout: self.time.nout,
            wall_seconds: self.time.t_start.elapsed().as_secs_f64(),
        })
    }

    /// Release process-wide resources: shut the communicator down and drop
    /// the RNG. Consumes the solver; no component can be invoked afterwards.
    pub fn cleanup(self) -> SolverResult<CleanupReport> {
        self.comm.shutdown();
        let wall_seconds = self.time.t_start.elapsed().as_secs_f64();
        info!(
            "rank {}: {} steps to t = {:.6}, {} snapshots, {:.3}s wall",
            self.comm.rank(),
            self.steps,
            self.time.t,
            self.time.nout,
            wall_seconds
        );
        Ok(CleanupReport { wall_seconds })
    }

    /// Current scalar time state.
    pub fn time(&self) -> &TimeState {
        &self.time
    }

    /// Steps taken so far.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// This rank's state buffer.
    pub fn state(&self) -> &StateField {
        &self.q
    }

    /// This rank's subdomain.
    pub fn subdomain(&self) -> &Subdomain {
        &self.sub
    }

    /// Draw from the run's random stream. Stochastic forcing terms use this
    /// rather than a global generator.
    pub fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }
}

/// Standalone single-rank run: setup, the full loop, cleanup. Snapshots go
/// to JSON files under `out_dir`.
pub fn run_standalone(config: SolverConfig, out_dir: impl Into<PathBuf>) -> SolverResult<RunReport> {
    let writer = JsonSnapshotWriter::new(out_dir, "snapshot")?;
    let mut solver = Solver::setup(config, Box::new(SingleRank::new()), Box::new(writer))?;
    let report = solver.run()?;
    solver.cleanup()?;
    Ok(report)
}

/// Run every rank of the configured decomposition on its own thread,
/// connected by an in-process channel group.
///
/// Any rank's failure fails the whole run; there is no partial-rank recovery.
pub fn run_rank_group<F>(config: &SolverConfig, make_writer: F) -> SolverResult<Vec<RunReport>>
where
    F: Fn(usize) -> SolverResult<Box<dyn SnapshotWriter>> + Sync,
{
    let comms = ChannelComm::group(config.rank_count());

    let results: Vec<SolverResult<RunReport>> = thread::scope(|scope| {
        let handles: Vec<_> = comms
            .into_iter()
            .map(|comm| {
                let config = config.clone();
                let make_writer = &make_writer;
                scope.spawn(move || {
                    let writer = make_writer(comm.rank())?;
                    let mut solver = Solver::setup(config, Box::new(comm), writer)?;
                    let report = solver.run()?;
                    solver.cleanup()?;
                    Ok(report)
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| {
                h.join()
                    .unwrap_or_else(|_| Err(SolverError::Comm("rank thread panicked".into())))
            })
            .collect()
    });

    results.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::NullSnapshotWriter;
    use crate::schema::{FlowState, InitialCondition};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Test double that counts durable records across the solver boundary.
    struct CountingWriter(Arc<AtomicU64>);

    impl SnapshotWriter for CountingWriter {
        fn write(&mut self, _snapshot: &Snapshot<'_>) -> SolverResult<()> {
            self.0.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }
    }

    struct FailingWriter;

    impl SnapshotWriter for FailingWriter {
        fn write(&mut self, _snapshot: &Snapshot<'_>) -> SolverResult<()> {
            Err(std::io::Error::other("storage unavailable").into())
        }
    }

    /// 8^3 quiet box where the CFL bound is far above dt_max, so every step
    /// takes exactly dt_max.
    fn fixed_dt_config() -> SolverConfig {
        let mut config = SolverConfig::default();
        config.grid.nx = 8;
        config.grid.ny = 8;
        config.grid.nz = 8;
        config.grid.lx = 100.0;
        config.grid.ly = 100.0;
        config.grid.lz = 100.0;
        config.time.t1 = 1.0;
        config.time.dtout = 0.25;
        config.time.dt_max = 0.1;
        config.initial = InitialCondition::Uniform {
            state: FlowState::default(),
        };
        config
    }

    #[test]
    fn fixed_dt_run_emits_five_snapshots() {
        let written = Arc::new(AtomicU64::new(0));
        let writer = CountingWriter(written.clone());
        let mut solver = Solver::setup(
            fixed_dt_config(),
            Box::new(SingleRank::new()),
            Box::new(writer),
        )
        .unwrap();

        let report = solver.run().unwrap();
        solver.cleanup().unwrap();

        // Snapshots at 0, 0.25, 0.5, 0.75, 1.0.
        assert_eq!(report.nout, 5);
        assert_eq!(report.steps, 10);
        assert!((report.final_time - 1.0).abs() < 1e-12);
        // Strict one-to-one correspondence with durable records.
        assert_eq!(written.load(Ordering::Relaxed), 5);
    }

    #[test]
    fn setup_rejects_a_mismatched_communicator() {
        let mut config = fixed_dt_config();
        config.ranks = (2, 1, 1);
        let err = Solver::setup(
            config,
            Box::new(SingleRank::new()),
            Box::new(NullSnapshotWriter::default()),
        )
        .unwrap_err();
        assert!(matches!(err, SolverError::Comm(_)));
    }

    #[test]
    fn setup_rejects_an_impossible_partition() {
        let mut config = fixed_dt_config();
        config.grid.nx = 2;
        // More x-ranks than x-cells. The communicator size matches, so the
        // partition check is what must fire.
        config.ranks = (3, 1, 1);
        let comms = ChannelComm::group(3);
        let err = Solver::setup(
            config,
            Box::new(comms.into_iter().next().unwrap()),
            Box::new(NullSnapshotWriter::default()),
        )
        .unwrap_err();
        assert!(matches!(err, SolverError::Partition { axis: 'x', .. }));
    }

    #[test]
    fn failed_write_reports_and_leaves_state_intact() {
        let mut solver = Solver::setup(
            fixed_dt_config(),
            Box::new(SingleRank::new()),
            Box::new(FailingWriter),
        )
        .unwrap();

        let before = solver.state().clone();
        let err = solver.generate_output().unwrap_err();
        assert!(matches!(err, SolverError::Snapshot(_)));
        assert_eq!(solver.time().nout, 0);
        assert_eq!(solver.state(), &before);
    }

    #[test]
    fn time_is_monotone_and_stops_at_t1() {
        let mut solver = Solver::setup(
            fixed_dt_config(),
            Box::new(SingleRank::new()),
            Box::new(NullSnapshotWriter::default()),
        )
        .unwrap();

        let mut last = solver.time().t;
        while solver.time().t < solver.time().t1 {
            solver.step().unwrap();
            assert!(solver.time().t >= last);
            last = solver.time().t;
        }
        assert!(solver.time().t <= solver.time().t1 + 1e-12);
        solver.cleanup().unwrap();
    }

    #[test]
    fn two_rank_run_matches_the_single_rank_run() {
        let mut config = fixed_dt_config();
        config.grid.nx = 16;
        config.time.t1 = 0.3;
        config.initial = InitialCondition::GaussianPulse {
            base: FlowState::default(),
            center: (0.5, 0.5, 0.5),
            radius: 0.1,
            amplitude: 0.2,
        };

        let single = {
            let mut c = config.clone();
            c.ranks = (1, 1, 1);
            let mut solver = Solver::setup(
                c,
                Box::new(SingleRank::new()),
                Box::new(NullSnapshotWriter::default()),
            )
            .unwrap();
            let report = solver.run().unwrap();
            let stats = FieldStats::from_state(solver.state(), solver.subdomain());
            solver.cleanup().unwrap();
            (report, stats)
        };

        config.ranks = (2, 1, 1);
        let reports = run_rank_group(&config, |_| {
            Ok(Box::new(NullSnapshotWriter::default()) as Box<dyn SnapshotWriter>)
        })
        .unwrap();

        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].steps, single.0.steps);
        assert_eq!(reports[0].nout, single.0.nout);
        assert_eq!(reports[1].nout, single.0.nout);
    }

    #[test]
    fn rank_group_conserves_global_mass() {
        let mut config = fixed_dt_config();
        config.grid.nx = 16;
        config.ranks = (2, 1, 1);
        config.time.t1 = 0.2;
        config.initial = InitialCondition::GaussianPulse {
            base: FlowState::default(),
            center: (0.4, 0.5, 0.5),
            radius: 0.1,
            amplitude: 0.3,
        };

        // Initial global mass, computed from a fresh single-rank setup of the
        // same initial condition on the undecomposed grid.
        let initial_mass = {
            let mut c = config.clone();
            c.ranks = (1, 1, 1);
            let solver = Solver::setup(
                c,
                Box::new(SingleRank::new()),
                Box::new(NullSnapshotWriter::default()),
            )
            .unwrap();
            FieldStats::from_state(solver.state(), solver.subdomain()).total_mass
        };

        let comms = ChannelComm::group(2);
        let final_masses: Vec<f64> = thread::scope(|scope| {
            let handles: Vec<_> = comms
                .into_iter()
                .map(|comm| {
                    let config = config.clone();
                    scope.spawn(move || {
                        let mut solver = Solver::setup(
                            config,
                            Box::new(comm),
                            Box::new(NullSnapshotWriter::default()),
                        )
                        .unwrap();
                        solver.run().unwrap();
                        let mass = FieldStats::from_state(solver.state(), solver.subdomain())
                            .total_mass;
                        solver.cleanup().unwrap();
                        mass
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let total: f64 = final_masses.iter().sum();
        let drift = (total - initial_mass).abs() / initial_mass;
        assert!(drift < 1e-12, "global mass drift: {drift}");
    }
}
