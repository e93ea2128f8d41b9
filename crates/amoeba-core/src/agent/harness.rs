use std::future::Future;
use std::pin::Pin;

use serde::Serialize;

use super::legality;
use super::memory::AgentMemory;
use super::prompt;
use super::wire::{Action, MoveBounds, parse_action_with};
use crate::config::SimConfig;
use crate::llm::{ChatMessage, ChatRequest, Completion, TokenCounter};
use crate::vision::{VisionParams, surroundings_of};
use crate::world::{EntityId, World};

pub trait LlmClient: Send + Sync {
    fn complete<'a>(
        &'a self,
        request: ChatRequest,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Completion>> + Send + 'a>>;
}

/// Where one decision attempt is, or where it stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Sensing,
    Requesting,
    Parsing,
    Validating,
    Accepted,
    Retrying,
    GivingUp,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DecisionOutcome {
    Accepted { action: Action },
    Rejected { action: Action, reason: String },
    ParseFailed { diagnostic: String },
    Error { message: String },
    GaveUp { retries: u32 },
}

impl DecisionOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            DecisionOutcome::Accepted { action } => action.name(),
            DecisionOutcome::Rejected { .. } => "rejected",
            DecisionOutcome::ParseFailed { .. } => "parse_failed",
            DecisionOutcome::Error { .. } => "error",
            DecisionOutcome::GaveUp { .. } => "idle",
        }
    }
}

/// One decision-log entry. Every attempt produces one, plus a final entry
/// when the retry budget runs out.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecisionRecord {
    pub cycle: u64,
    pub agent: EntityId,
    /// Zero-based attempt index.
    pub attempt: u32,
    pub stage: PipelineStage,
    pub outcome: DecisionOutcome,
    /// Exact messages sent for this attempt.
    pub messages: Vec<ChatMessage>,
    pub raw_response: Option<String>,
}

impl DecisionRecord {
    /// Short human-readable summary for log views.
    pub fn details(&self) -> String {
        match &self.outcome {
            DecisionOutcome::Accepted { action } => {
                let base = match action {
                    Action::Move {
                        direction,
                        distance,
                    } => format!("dir {direction}, dist {distance}"),
                    _ => String::new(),
                };
                if self.attempt > 0 {
                    format!("{base} (retry {})", self.attempt).trim().to_string()
                } else {
                    base
                }
            }
            DecisionOutcome::Rejected { action, reason } => format!("{}: {reason}", action.name()),
            DecisionOutcome::ParseFailed { diagnostic } => diagnostic.clone(),
            DecisionOutcome::Error { message } => message.clone(),
            DecisionOutcome::GaveUp { retries } => format!("gave up after {retries} retries"),
        }
    }
}

/// Read-only inputs shared by every decision task of one tick.
#[derive(Debug, Clone)]
pub struct DecisionContext {
    pub cycle: u64,
    pub sim: SimConfig,
    pub model: String,
    pub system_prompt: String,
    pub tokens: TokenCounter,
}

/// Owned result of one agent's pipeline, applied after the barrier.
#[derive(Debug, Clone)]
pub struct Decision {
    pub agent: EntityId,
    pub action: Action,
    pub memory: AgentMemory,
    pub records: Vec<DecisionRecord>,
}

/// Runs the sense, request, parse, validate loop for one agent against a
/// frozen world. Never fails: transport errors and exhausted retries both
/// yield [`Action::Idle`].
pub async fn decide(
    agent: EntityId,
    world: &World,
    mut memory: AgentMemory,
    llm: &dyn LlmClient,
    ctx: &DecisionContext,
) -> Decision {
    let mut records = Vec::new();
    let mut record = |attempt: u32,
                      stage: PipelineStage,
                      outcome: DecisionOutcome,
                      messages: &[ChatMessage],
                      raw: Option<&str>| {
        records.push(DecisionRecord {
            cycle: ctx.cycle,
            agent,
            attempt,
            stage,
            outcome,
            messages: messages.to_vec(),
            raw_response: raw.map(str::to_string),
        });
    };

    let mut stage = PipelineStage::Sensing;
    let Some(cell) = world.amoeba(agent).filter(|c| c.alive()) else {
        record(
            0,
            stage,
            DecisionOutcome::Error {
                message: format!("{agent} is not a living agent"),
            },
            &[],
            None,
        );
        return Decision {
            agent,
            action: Action::Idle,
            memory,
            records,
        };
    };

    let sensed = surroundings_of(
        cell,
        &world.amoebas,
        &world.enemies,
        &world.food,
        &world.poison,
        &VisionParams::agent(&ctx.sim),
    );
    let (system, state_turn) = prompt::build(&ctx.system_prompt, &cell.state(), &sensed, &ctx.sim);
    let fresh_user = match memory.take_outcome() {
        Some(outcome) => format!("{outcome}\n\n{}", state_turn.content),
        None => state_turn.content,
    };

    let mut messages = Vec::with_capacity(2 + memory.history.len() * 2);
    messages.push(system);
    for entry in &memory.history {
        messages.push(ChatMessage::user(entry.user.clone()));
        messages.push(ChatMessage::assistant(entry.assistant.clone()));
    }
    messages.push(ChatMessage::user(fresh_user.clone()));

    let bounds = MoveBounds {
        min: ctx.sim.min_move_body_lengths,
        max: ctx.sim.max_move_body_lengths,
    };
    let budget = ctx.sim.retry_budget;

    for attempt in 0..=budget {
        stage = PipelineStage::Requesting;
        tracing::debug!(agent = %agent, attempt, cycle = ctx.cycle, "pipeline.request");
        let request = ChatRequest {
            model: ctx.model.clone(),
            messages: messages.clone(),
        };
        let completion = match llm.complete(request).await {
            Ok(completion) => completion,
            Err(err) => {
                let message = format!("{err:#}");
                tracing::warn!(agent = %agent, attempt, error = %message, "pipeline.transport_error");
                memory.last_error = Some(message.clone());
                record(
                    attempt,
                    stage,
                    DecisionOutcome::Error { message },
                    &messages,
                    None,
                );
                return Decision {
                    agent,
                    action: Action::Idle,
                    memory,
                    records,
                };
            }
        };
        if let Some(usage) = completion.usage {
            ctx.tokens.record(usage);
        }
        let raw = completion.text;

        stage = PipelineStage::Parsing;
        let diagnostic = match parse_action_with(&raw, bounds) {
            Err(failure) => {
                let diagnostic = failure.to_string();
                let next = next_stage(attempt, budget);
                record(
                    attempt,
                    next,
                    DecisionOutcome::ParseFailed {
                        diagnostic: diagnostic.clone(),
                    },
                    &messages,
                    Some(&raw),
                );
                diagnostic
            }
            Ok(action) => {
                stage = PipelineStage::Validating;
                match legality::check(cell, &action, world, &ctx.sim) {
                    None => {
                        stage = PipelineStage::Accepted;
                        tracing::debug!(agent = %agent, attempt, action = %action, "pipeline.accepted");
                        record(
                            attempt,
                            stage,
                            DecisionOutcome::Accepted { action },
                            &messages,
                            Some(&raw),
                        );
                        memory.last_error = None;
                        memory.record(fresh_user, raw);
                        return Decision {
                            agent,
                            action,
                            memory,
                            records,
                        };
                    }
                    Some(rejection) => {
                        let next = next_stage(attempt, budget);
                        record(
                            attempt,
                            next,
                            DecisionOutcome::Rejected {
                                action,
                                reason: rejection.reason.clone(),
                            },
                            &messages,
                            Some(&raw),
                        );
                        rejection.reason
                    }
                }
            }
        };

        tracing::debug!(agent = %agent, attempt, stage = ?stage, diagnostic = %diagnostic, "pipeline.retry");
        memory.last_error = Some(diagnostic.clone());
        if attempt < budget {
            messages.push(ChatMessage::assistant(raw));
            messages.push(ChatMessage::user(diagnostic));
        }
    }

    tracing::warn!(agent = %agent, retries = budget, cycle = ctx.cycle, "pipeline.gave_up");
    record(
        budget,
        PipelineStage::GivingUp,
        DecisionOutcome::GaveUp { retries: budget },
        &messages,
        None,
    );
    memory.reset();
    Decision {
        agent,
        action: Action::Idle,
        memory,
        records,
    }
}

fn next_stage(attempt: u32, budget: u32) -> PipelineStage {
    if attempt < budget {
        PipelineStage::Retrying
    } else {
        PipelineStage::GivingUp
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use super::*;
    use crate::agent::wire::Direction;
    use crate::llm::{Role, TokenUsage};
    use crate::world::{EnergyLimits, Vec2};

    #[derive(Default)]
    struct FakeLlm {
        responses: Mutex<VecDeque<anyhow::Result<Completion>>>,
        requests: Mutex<Vec<ChatRequest>>,
    }

    impl FakeLlm {
        fn push_response(&self, raw: impl Into<String>) {
            self.responses.lock().unwrap().push_back(Ok(Completion {
                text: raw.into(),
                usage: Some(TokenUsage {
                    prompt_tokens: 100,
                    generated_tokens: 7,
                }),
            }));
        }

        fn push_error(&self, message: &'static str) {
            self.responses
                .lock()
                .unwrap()
                .push_back(Err(anyhow::anyhow!(message)));
        }

        fn requests(&self) -> Vec<ChatRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    impl LlmClient for FakeLlm {
        fn complete<'a>(
            &'a self,
            request: ChatRequest,
        ) -> Pin<Box<dyn Future<Output = anyhow::Result<Completion>> + Send + 'a>> {
            Box::pin(async move {
                self.requests.lock().unwrap().push(request);
                self.responses
                    .lock()
                    .unwrap()
                    .pop_front()
                    .unwrap_or_else(|| anyhow::bail!("no llm response queued"))
            })
        }
    }

    fn setup(energy: f64) -> (World, DecisionContext, EntityId) {
        let sim = SimConfig::default();
        let mut world = World::empty(&sim, 17);
        let id = world.add_amoeba(Vec2::new(2.5, 2.5), energy, &sim);
        let ctx = DecisionContext {
            cycle: 4,
            sim,
            model: "test-model".to_string(),
            system_prompt: "system".to_string(),
            tokens: TokenCounter::default(),
        };
        (world, ctx, id)
    }

    const PROSE: &str = "I think I will wander around a bit and see what happens.";

    #[tokio::test]
    async fn accepted_on_first_try() -> anyhow::Result<()> {
        let (world, ctx, id) = setup(50.0);
        let llm = FakeLlm::default();
        llm.push_response(r#"{"action":"move","direction":"up-left","distance":9}"#);

        let decision = decide(id, &world, AgentMemory::default(), &llm, &ctx).await;

        assert_eq!(
            decision.action,
            Action::Move {
                direction: Direction::UpLeft,
                distance: 5.0
            }
        );
        assert_eq!(decision.records.len(), 1);
        assert_eq!(decision.records[0].stage, PipelineStage::Accepted);
        assert_eq!(decision.records[0].cycle, 4);
        assert_eq!(decision.records[0].details(), "dir up-left, dist 5");
        assert_eq!(decision.memory.history.len(), 1);
        assert_eq!(ctx.tokens.totals().prompt_tokens, 100);

        let sent = llm.requests();
        assert_eq!(sent[0].model, "test-model");
        assert_eq!(sent[0].messages.len(), 2);
        assert_eq!(sent[0].messages[0], ChatMessage::system("system"));
        Ok(())
    }

    #[tokio::test]
    async fn prose_exhausts_retries_and_clears_history() -> anyhow::Result<()> {
        let (world, ctx, id) = setup(50.0);
        let llm = FakeLlm::default();
        for _ in 0..10 {
            llm.push_response(PROSE);
        }
        let mut memory = AgentMemory::default();
        memory.record("old user", "{\"action\":\"idle\"}");

        let decision = decide(id, &world, memory, &llm, &ctx).await;

        assert_eq!(decision.action, Action::Idle);
        assert_eq!(llm.requests().len(), 4);
        assert!(decision.memory.history.is_empty());

        let stages: Vec<_> = decision.records.iter().map(|r| r.stage).collect();
        assert_eq!(
            stages,
            [
                PipelineStage::Retrying,
                PipelineStage::Retrying,
                PipelineStage::Retrying,
                PipelineStage::GivingUp,
                PipelineStage::GivingUp,
            ]
        );
        assert_eq!(
            decision.records.last().unwrap().outcome,
            DecisionOutcome::GaveUp { retries: 3 }
        );
        assert_eq!(
            decision.records.last().unwrap().details(),
            "gave up after 3 retries"
        );

        // system, one history pair, fresh user, then three corrective pairs.
        let sent = llm.requests();
        let last = &sent[3];
        assert_eq!(last.messages.len(), 1 + 2 + 1 + 6);
        assert_eq!(last.messages[4], ChatMessage::assistant(PROSE));
        assert_eq!(last.messages[5].role, Role::User);
        assert!(last.messages[5].content.contains("JSON object"));
        Ok(())
    }

    #[tokio::test]
    async fn rejection_feeds_back_and_history_stays_clean() -> anyhow::Result<()> {
        let (world, ctx, id) = setup(50.0);
        let llm = FakeLlm::default();
        llm.push_response(r#"{"action":"divide"}"#);
        llm.push_response(r#"Fine. {"action":"idle","direction":null,"distance":null}"#);

        let decision = decide(id, &world, AgentMemory::default(), &llm, &ctx).await;

        assert_eq!(decision.action, Action::Idle);
        assert_eq!(decision.records.len(), 2);
        assert!(matches!(
            decision.records[0].outcome,
            DecisionOutcome::Rejected {
                action: Action::Divide,
                ..
            }
        ));
        assert_eq!(decision.records[1].details(), "(retry 1)");

        let sent = llm.requests();
        let second = &sent[1];
        assert_eq!(second.messages[2], ChatMessage::assistant(r#"{"action":"divide"}"#));
        assert!(second.messages[3].content.contains("You cannot divide"));

        let entry = &decision.memory.history[0];
        assert_eq!(entry.user, sent[0].messages[1].content);
        assert!(entry.assistant.starts_with("Fine."));
        assert_eq!(decision.memory.history.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn transport_error_idles_and_keeps_history() -> anyhow::Result<()> {
        let (world, ctx, id) = setup(50.0);
        let llm = FakeLlm::default();
        llm.push_error("connection refused");
        let mut memory = AgentMemory::default();
        memory.record("u", "a");

        let decision = decide(id, &world, memory, &llm, &ctx).await;

        assert_eq!(decision.action, Action::Idle);
        assert_eq!(decision.memory.history.len(), 1);
        assert_eq!(decision.records.len(), 1);
        assert_eq!(decision.records[0].outcome.label(), "error");
        assert!(decision.records[0].details().contains("connection refused"));
        assert_eq!(llm.requests().len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn prior_outcome_is_prepended_once() -> anyhow::Result<()> {
        let (world, ctx, id) = setup(50.0);
        let llm = FakeLlm::default();
        llm.push_response(r#"{"action":"idle"}"#);
        let mut memory = AgentMemory::default();
        memory.set_outcome("Last cycle: your energy went from 50.0 to 49.0.");

        let decision = decide(id, &world, memory, &llm, &ctx).await;

        let sent = llm.requests();
        let fresh = &sent[0].messages[1].content;
        assert!(fresh.starts_with("Last cycle: your energy went from 50.0 to 49.0.\n\n"));
        assert!(fresh.contains("Energy: 50.0 / 100"));
        assert!(decision.memory.last_outcome.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn zero_budget_means_a_single_attempt() -> anyhow::Result<()> {
        let (world, mut ctx, id) = setup(50.0);
        ctx.sim.retry_budget = 0;
        let llm = FakeLlm::default();
        llm.push_response(PROSE);
        llm.push_response(r#"{"action":"idle"}"#);

        let decision = decide(id, &world, AgentMemory::default(), &llm, &ctx).await;

        assert_eq!(decision.action, Action::Idle);
        assert_eq!(llm.requests().len(), 1);
        assert_eq!(decision.records.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn dead_agent_is_not_asked() -> anyhow::Result<()> {
        let (mut world, ctx, id) = setup(50.0);
        world
            .amoeba_mut(id)
            .unwrap()
            .set_energy(0.0, EnergyLimits::amoeba(&ctx.sim));
        let llm = FakeLlm::default();

        let decision = decide(id, &world, AgentMemory::default(), &llm, &ctx).await;

        assert_eq!(decision.action, Action::Idle);
        assert!(llm.requests().is_empty());
        assert_eq!(decision.records[0].stage, PipelineStage::Sensing);
        Ok(())
    }
}
