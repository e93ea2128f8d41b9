//! Tick orchestration.
//!
//! One tick asks every eligible agent for a decision concurrently against a
//! frozen snapshot, waits for all of them, and only then mutates the world:
//! actions in eligibility order, predators, toxins, poison on food, decay,
//! reconciliation and respawn. [`scheduler::CycleRunner`] drives ticks on a
//! drift-compensated interval.

pub mod scheduler;
pub mod sink;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::Instant;

use crate::agent::harness::{Decision, DecisionContext, LlmClient, decide};
use crate::agent::memory::{AgentMemory, summarize_outcome};
use crate::config::{ConfigError, Settings};
use crate::llm::TokenCounter;
use crate::motion::{MotionDriver, MotionTicket};
use crate::world::{EntityId, OutcomeNotes, World};

pub use scheduler::{CycleRunner, RunnerState};
pub use sink::{AgentHud, CycleStats, DecisionLog, LogSink, NullSink, StatsSink, TracingSink};

/// Shared stop flag. Checked at the decision barrier and by the scheduler.
#[derive(Debug, Clone)]
pub struct StopSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl StopSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn stop(&self) {
        self.tx.send_replace(true);
    }

    pub fn resume(&self) {
        self.tx.send_replace(false);
    }

    pub fn is_stopped(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CycleReport {
    /// No living agents at tick start; nothing ran.
    Extinct { cycle: u64 },
    /// Stopped while decisions were outstanding; the world was left untouched.
    Discarded { cycle: u64 },
    Completed(CycleStats),
}

impl CycleReport {
    /// True when no agent is left alive, whether before or after the tick.
    pub fn is_terminal(&self) -> bool {
        match self {
            CycleReport::Extinct { .. } => true,
            CycleReport::Discarded { .. } => false,
            CycleReport::Completed(stats) => stats.population.amoebas == 0,
        }
    }

    pub fn cycle(&self) -> u64 {
        match self {
            CycleReport::Extinct { cycle } | CycleReport::Discarded { cycle } => *cycle,
            CycleReport::Completed(stats) => stats.cycle,
        }
    }
}

pub struct Orchestrator {
    settings: Settings,
    world: World,
    memories: BTreeMap<EntityId, AgentMemory>,
    log: DecisionLog,
    cycle: u64,
    tickets: Vec<MotionTicket>,
    llm: Arc<dyn LlmClient>,
    motion: Arc<dyn MotionDriver>,
    tokens: TokenCounter,
    stats_sink: Arc<dyn StatsSink>,
    log_sink: Arc<dyn LogSink>,
    stop: StopSignal,
    last_stats: Option<CycleStats>,
}

impl Orchestrator {
    /// Validates `settings` and generates a fresh world from them.
    pub fn new(
        settings: Settings,
        llm: Arc<dyn LlmClient>,
        motion: Arc<dyn MotionDriver>,
    ) -> Result<Self, ConfigError> {
        settings.sim.validate()?;
        let world = World::generate(&settings.sim);
        Self::from_world(settings, world, llm, motion)
    }

    pub fn from_world(
        settings: Settings,
        world: World,
        llm: Arc<dyn LlmClient>,
        motion: Arc<dyn MotionDriver>,
    ) -> Result<Self, ConfigError> {
        settings.sim.validate()?;
        Ok(Self {
            log: DecisionLog::new(settings.sim.log_capacity),
            settings,
            world,
            memories: BTreeMap::new(),
            cycle: 0,
            tickets: Vec::new(),
            llm,
            motion,
            tokens: TokenCounter::default(),
            stats_sink: Arc::new(TracingSink),
            log_sink: Arc::new(TracingSink),
            stop: StopSignal::new(),
            last_stats: None,
        })
    }

    pub fn with_stats_sink(mut self, sink: Arc<dyn StatsSink>) -> Self {
        self.stats_sink = sink;
        self
    }

    pub fn with_log_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.log_sink = sink;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    /// Direct world access between ticks.
    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    pub fn log(&self) -> &DecisionLog {
        &self.log
    }

    pub fn memory(&self, agent: EntityId) -> Option<&AgentMemory> {
        self.memories.get(&agent)
    }

    pub fn last_stats(&self) -> Option<&CycleStats> {
        self.last_stats.as_ref()
    }

    pub fn tokens(&self) -> &TokenCounter {
        &self.tokens
    }

    pub fn pending_motions(&self) -> usize {
        self.tickets.len()
    }

    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// Replaces the settings used from the next tick on. World dimensions only
    /// change on [`Orchestrator::reset`].
    pub fn set_config(&mut self, settings: Settings) -> Result<(), ConfigError> {
        settings.sim.validate()?;
        self.log.set_capacity(settings.sim.log_capacity);
        for memory in self.memories.values_mut() {
            memory.history_limit = settings.sim.history_pairs;
        }
        self.settings = settings;
        Ok(())
    }

    /// Regenerates the world and clears all per-run state. Returns the seed
    /// actually used; `0` picks a random one.
    pub fn reset(&mut self, seed: u32) -> u32 {
        self.settings.sim.random_seed = seed;
        self.world = World::generate(&self.settings.sim);
        self.memories.clear();
        self.log.clear();
        self.tickets.clear();
        self.cycle = 0;
        self.tokens.reset();
        self.last_stats = None;
        tracing::info!(seed = self.world.seed(), "cycle.reset");
        self.world.seed()
    }

    /// Runs one tick to completion.
    pub async fn run_cycle(&mut self) -> CycleReport {
        let started = Instant::now();
        self.settle_motions();

        if self.world.is_extinct() {
            tracing::info!(cycle = self.cycle, "cycle.extinct");
            return CycleReport::Extinct { cycle: self.cycle };
        }

        self.cycle += 1;
        let cycle = self.cycle;
        let cfg = self.settings.sim.clone();

        let eligible: Vec<EntityId> = self
            .world
            .living_amoebas()
            .filter(|a| a.is_ready())
            .map(|a| a.id)
            .collect();
        let energy_before: HashMap<EntityId, f64> = self
            .world
            .amoebas
            .iter()
            .map(|a| (a.id, a.energy()))
            .collect();

        let ctx = DecisionContext {
            cycle,
            sim: cfg.clone(),
            model: self.settings.llm.model.clone(),
            system_prompt: self.settings.llm.system_prompt.clone(),
            tokens: self.tokens.clone(),
        };
        let pending: Vec<(EntityId, AgentMemory)> = eligible
            .iter()
            .map(|id| {
                let memory = self
                    .memories
                    .get(id)
                    .cloned()
                    .unwrap_or_else(|| AgentMemory::with_limit(cfg.history_pairs));
                (*id, memory)
            })
            .collect();
        let mut decisions = decision_round(
            Arc::new(self.world.clone()),
            pending,
            Arc::clone(&self.llm),
            Arc::new(ctx),
        )
        .await;

        if self.stop.is_stopped() {
            tracing::info!(cycle, outstanding = decisions.len(), "cycle.discarded");
            return CycleReport::Discarded { cycle };
        }

        let mut notes = OutcomeNotes::default();
        let mut applied = 0;
        for id in &eligible {
            let Some(Decision {
                action,
                memory,
                records,
                ..
            }) = decisions.remove(id)
            else {
                continue;
            };
            for record in records {
                self.log_sink.append(&record);
                self.log.push(record);
            }
            self.memories.insert(*id, memory);
            if let Some(request) = self.world.apply_action(*id, action, &cfg, &mut notes) {
                self.tickets.push(self.motion.begin(request));
            }
            applied += 1;
        }

        for request in self.world.step_predator_phase(&cfg, &mut notes) {
            self.tickets.push(self.motion.begin(request));
        }
        self.world.step_toxin_phase(&cfg, &mut notes);
        self.world.step_poison_on_food_phase(&cfg);
        self.world.step_decay_phase(&cfg);

        let reconciled = self.world.reconcile(&cfg);
        for dead in &reconciled.dead_agents {
            self.memories.remove(dead);
            notes.forget(*dead);
        }
        self.tickets.retain(|t| {
            self.world
                .amoeba(t.entity())
                .or_else(|| self.world.enemy(t.entity()))
                .is_some()
        });

        let spawned = self.world.step_respawn_phase(&cfg);

        for agent in self.world.living_amoebas() {
            let before = energy_before
                .get(&agent.id)
                .copied()
                .unwrap_or(agent.energy());
            let summary = summarize_outcome(before, agent.energy(), &notes.take(agent.id));
            let memory = self
                .memories
                .entry(agent.id)
                .or_insert_with(|| AgentMemory::with_limit(cfg.history_pairs));
            // Agents skipped while in motion keep their unread summary.
            let combined = match memory.take_outcome() {
                Some(unread) => format!("{unread}\n{summary}"),
                None => summary,
            };
            memory.set_outcome(combined);
        }

        let stats = CycleStats {
            cycle,
            seed: self.world.seed(),
            population: self.world.counts(&cfg),
            agents: self
                .world
                .living_amoebas()
                .map(|a| AgentHud {
                    id: a.id,
                    energy: a.energy(),
                    in_motion: a.in_motion,
                })
                .collect(),
            decisions: applied,
            deaths: reconciled.dead_agents.len(),
            spawned,
            tokens: self.tokens.totals(),
            elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        };
        self.stats_sink.publish(&stats);
        self.last_stats = Some(stats.clone());
        CycleReport::Completed(stats)
    }

    fn settle_motions(&mut self) {
        let mut pending = Vec::with_capacity(self.tickets.len());
        for mut ticket in self.tickets.drain(..) {
            if !ticket.is_settled() {
                pending.push(ticket);
                continue;
            }
            if let Some(cell) = self.world.cell_mut(ticket.entity()) {
                cell.in_motion = false;
            }
        }
        self.tickets = pending;
    }
}

/// Fans out one pipeline per agent and waits for every one of them.
async fn decision_round(
    snapshot: Arc<World>,
    pending: Vec<(EntityId, AgentMemory)>,
    llm: Arc<dyn LlmClient>,
    ctx: Arc<DecisionContext>,
) -> HashMap<EntityId, Decision> {
    let mut decisions = HashMap::with_capacity(pending.len());
    let mut tasks = JoinSet::new();
    for (agent, memory) in pending {
        let world = Arc::clone(&snapshot);
        let llm = Arc::clone(&llm);
        let ctx = Arc::clone(&ctx);
        tasks.spawn(async move { decide(agent, &world, memory, llm.as_ref(), &ctx).await });
    }
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(decision) => {
                decisions.insert(decision.agent, decision);
            }
            Err(err) => tracing::warn!(cycle = ctx.cycle, error = %err, "pipeline.task_failed"),
        }
    }
    decisions
}
