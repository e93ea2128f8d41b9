//! Simulation core for LLM-driven amoebas: world model, vision, the per-agent
//! decision pipeline and the cycle orchestrator that ties them together.
//!
//! Binaries (the headless runner, experiments) drive a
//! [`cycle::Orchestrator`] and plug in their own [`agent::LlmClient`],
//! [`motion::MotionDriver`] and sinks.

pub mod agent;
pub mod config;
pub mod cycle;
pub mod llm;
pub mod motion;
pub mod rng;
pub mod vision;
pub mod world;
