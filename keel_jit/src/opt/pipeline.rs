//! Mid-tier compilation pipeline.
//!
//! Takes a typed graph of simplified operators to a verified schedule.
//!
//! # Phases
//!
//! 1. **OSR**: deconstruct an on-stack-replacement entry, if present
//! 2. **Reduce**: trim, then dead code, common operators and value numbering
//!    to a fixpoint
//! 3. **Loops**: peel closed innermost loops
//! 4. **Lower**: representation selection down to machine operators
//! 5. **Cleanup**: trim and dead code again on the lowered graph
//! 6. **Schedule**: basic blocks, then schedule verification
//!
//! With `verify` set, the graph verifier runs after every phase that
//! rewrites the graph.

use std::time::{Duration, Instant};

use tracing::{debug, debug_span, info};

use crate::error::{CompileError, Result};
use crate::ir::{Graph, Verifier};
use crate::lowering::RepresentationSelector;
use crate::loops::{LoopPeeler, LoopTree, OsrDeconstructor};
use crate::schedule::{Schedule, ScheduleVerifier, Scheduler, SchedulerConfig};

use super::common_reducer::CommonOperatorReducer;
use super::control_reducer::ControlReducer;
use super::dead_code::DeadCodeElimination;
use super::reducer::{GraphReducer, ReducerStats};
use super::value_numbering::ValueNumberingReducer;

// =============================================================================
// Pass Phase
// =============================================================================

/// Phase of the pipeline, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PassPhase {
    Osr,
    Reduce,
    Loops,
    Lower,
    Cleanup,
    Schedule,
}

impl PassPhase {
    pub fn name(self) -> &'static str {
        match self {
            PassPhase::Osr => "osr",
            PassPhase::Reduce => "reduce",
            PassPhase::Loops => "loops",
            PassPhase::Lower => "lower",
            PassPhase::Cleanup => "cleanup",
            PassPhase::Schedule => "schedule",
        }
    }
}

// =============================================================================
// Pipeline Configuration
// =============================================================================

/// Configuration for the pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Deconstruct OSR entries before optimizing.
    pub enable_osr_deconstruction: bool,

    /// Enable value numbering.
    pub enable_value_numbering: bool,

    /// Enable dead code elimination.
    pub enable_dead_code_elimination: bool,

    /// Enable common operator reduction.
    pub enable_common_reduction: bool,

    /// Lower simplified operators to machine operators.
    pub enable_representation_selection: bool,

    /// Peel one iteration off each closed innermost loop.
    pub enable_loop_peeling: bool,

    /// Verify the graph after each phase and the final schedule.
    pub verify: bool,

    /// Report reducer counters at info level.
    pub trace_reductions: bool,

    /// Scheduler settings.
    pub scheduler: SchedulerConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            enable_osr_deconstruction: true,
            enable_value_numbering: true,
            enable_dead_code_elimination: true,
            enable_common_reduction: true,
            enable_representation_selection: true,
            enable_loop_peeling: false,
            verify: cfg!(debug_assertions),
            trace_reductions: false,
            scheduler: SchedulerConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Only what is needed to produce a schedule.
    pub fn minimal() -> Self {
        Self {
            enable_value_numbering: false,
            enable_common_reduction: false,
            enable_loop_peeling: false,
            scheduler: SchedulerConfig {
                hoist_loop_invariants: false,
                ..SchedulerConfig::default()
            },
            ..Default::default()
        }
    }

    /// Every pass, with verification.
    pub fn full() -> Self {
        Self {
            enable_loop_peeling: true,
            verify: true,
            ..Default::default()
        }
    }
}

// =============================================================================
// Pipeline
// =============================================================================

/// Runs the phases in order over one graph.
pub struct Pipeline {
    config: PipelineConfig,
    stats: PipelineStats,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::with_config(PipelineConfig::default())
    }

    pub fn with_config(config: PipelineConfig) -> Self {
        Self {
            config,
            stats: PipelineStats::default(),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Statistics of the last run.
    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }

    /// Compile `graph` to a schedule.
    pub fn run(&mut self, graph: &mut Graph) -> Result<Schedule> {
        let _span = debug_span!("pipeline").entered();
        let start = Instant::now();
        self.stats = PipelineStats {
            initial_size: graph.live_node_count(),
            ..PipelineStats::default()
        };

        if self.config.enable_osr_deconstruction {
            self.timed(PassPhase::Osr, |_| match OsrDeconstructor::deconstruct(graph) {
                Ok(_) => Ok(true),
                Err(CompileError::NoOsrEntry) => Ok(false),
                Err(e) => Err(e),
            })?;
            self.verify(graph)?;
        }

        self.timed(PassPhase::Reduce, |this| {
            ControlReducer::trim_graph(graph);
            let stats = this.reduce(graph, true);
            Ok(stats.reductions > 0)
        })?;
        self.verify(graph)?;

        if self.config.enable_loop_peeling {
            self.timed(PassPhase::Loops, |this| this.peel_loops(graph))?;
            self.verify(graph)?;
        }

        if self.config.enable_representation_selection {
            self.timed(PassPhase::Lower, |this| {
                let lowering = RepresentationSelector::new().run(graph)?;
                this.stats.lowered = lowering.lowered;
                this.stats.conversions = lowering.conversions;
                Ok(lowering.lowered > 0)
            })?;
            self.verify(graph)?;
        }

        self.timed(PassPhase::Cleanup, |this| {
            ControlReducer::trim_graph(graph);
            let stats = this.reduce(graph, false);
            Ok(stats.reductions > 0)
        })?;
        self.verify(graph)?;

        let schedule = {
            let _span = debug_span!("phase", name = PassPhase::Schedule.name()).entered();
            let started = Instant::now();
            let schedule = Scheduler::compute_schedule(graph, &self.config.scheduler)?;
            if self.config.verify {
                ScheduleVerifier::run(graph, &schedule)?;
            }
            self.stats.passes.push(PassStat {
                phase: PassPhase::Schedule,
                changed: true,
                time: started.elapsed(),
            });
            schedule
        };

        self.stats.total_time = start.elapsed();
        self.stats.final_size = graph.live_node_count();
        self.stats.blocks = schedule.rpo_order().len();
        debug!(
            blocks = self.stats.blocks,
            initial = self.stats.initial_size,
            final_size = self.stats.final_size,
            time_us = self.stats.total_time.as_micros() as u64,
            "pipeline finished"
        );
        Ok(schedule)
    }

    /// Run the configured reducers; value numbering only before lowering.
    fn reduce(&mut self, graph: &mut Graph, before_lowering: bool) -> ReducerStats {
        let mut reducer = GraphReducer::new();
        if self.config.enable_dead_code_elimination {
            reducer.add_reducer(DeadCodeElimination::new());
        }
        if self.config.enable_common_reduction {
            reducer.add_reducer(CommonOperatorReducer::new());
        }
        if before_lowering && self.config.enable_value_numbering {
            reducer.add_reducer(ValueNumberingReducer::new());
        }
        reducer.reduce_graph(graph);
        let stats = reducer.stats();
        if self.config.trace_reductions {
            info!(
                reductions = stats.reductions,
                in_place = stats.in_place,
                replacements = stats.replacements,
                "reducers finished"
            );
        }
        self.stats.reductions += stats.reductions;
        stats
    }

    fn peel_loops(&mut self, graph: &mut Graph) -> Result<bool> {
        let tree = LoopTree::build(graph);
        let innermost: Vec<_> = (0..tree.len())
            .filter(|&i| tree.loops().iter().all(|l| l.parent() != Some(i)))
            .map(|i| tree.loops()[i].header())
            .collect();

        let peeler = LoopPeeler::new();
        let mut peeled = 0;
        for header in innermost {
            // Earlier peels add nodes; membership is recomputed each time.
            let tree = LoopTree::build(graph);
            let Some(info) = tree.loop_of(header) else {
                continue;
            };
            if !info.is_closed() {
                debug!(header = %header, "skipping open loop");
                continue;
            }
            peeler.peel(graph, info)?;
            peeled += 1;
        }
        self.stats.peeled_loops = peeled;
        Ok(peeled > 0)
    }

    fn verify(&self, graph: &Graph) -> Result<()> {
        if self.config.verify {
            Verifier::run(graph)?;
        }
        Ok(())
    }

    fn timed<F>(&mut self, phase: PassPhase, f: F) -> Result<()>
    where
        F: FnOnce(&mut Self) -> Result<bool>,
    {
        let _span = debug_span!("phase", name = phase.name()).entered();
        let start = Instant::now();
        let changed = f(self)?;
        self.stats.passes.push(PassStat {
            phase,
            changed,
            time: start.elapsed(),
        });
        Ok(())
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Statistics
// =============================================================================

/// Statistics from a single phase.
#[derive(Debug, Clone)]
pub struct PassStat {
    pub phase: PassPhase,
    /// Whether the phase rewrote the graph.
    pub changed: bool,
    pub time: Duration,
}

/// Statistics from the entire pipeline.
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    pub passes: Vec<PassStat>,
    /// Reductions across all reducer runs.
    pub reductions: usize,
    /// Nodes whose operator representation selection changed.
    pub lowered: usize,
    /// Conversions inserted by representation selection.
    pub conversions: usize,
    pub peeled_loops: usize,
    /// Blocks in the final schedule.
    pub blocks: usize,
    pub total_time: Duration,
    /// Live nodes before the run.
    pub initial_size: usize,
    /// Live nodes after the run.
    pub final_size: usize,
}

impl PipelineStats {
    /// Get size reduction ratio.
    pub fn size_reduction(&self) -> f64 {
        if self.initial_size == 0 {
            1.0
        } else {
            self.final_size as f64 / self.initial_size as f64
        }
    }

    pub fn phase_time(&self, phase: PassPhase) -> Duration {
        self.passes
            .iter()
            .filter(|p| p.phase == phase)
            .map(|p| p.time)
            .sum()
    }
}

// =============================================================================
// Quick Compile Functions
// =============================================================================

/// Compile with the default configuration.
pub fn compile(graph: &mut Graph) -> Result<Schedule> {
    Pipeline::new().run(graph)
}

/// Compile with every pass enabled.
pub fn compile_full(graph: &mut Graph) -> Result<Schedule> {
    Pipeline::with_config(PipelineConfig::full()).run(graph)
}

// =============================================================================
// Tests
// =============================================================================
