//! Move transitions.
//!
//! A move updates the world immediately; the transition only gates the mover's
//! next decision through `in_motion`. Drivers hand back a [`MotionTicket`] that
//! the orchestrator polls at the start of each tick. Drivers never touch the
//! world.

use std::time::Duration;

use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;

use crate::config::SimConfig;
use crate::world::{EntityId, Vec2};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionRequest {
    pub entity: EntityId,
    pub from: Vec2,
    pub to: Vec2,
}

/// Completion handle for one transition.
#[derive(Debug)]
pub struct MotionTicket {
    entity: EntityId,
    done: oneshot::Receiver<()>,
}

impl MotionTicket {
    pub fn new(entity: EntityId) -> (Self, oneshot::Sender<()>) {
        let (tx, rx) = oneshot::channel();
        (Self { entity, done: rx }, tx)
    }

    pub fn entity(&self) -> EntityId {
        self.entity
    }

    /// True once the transition finished or its driver went away.
    pub fn is_settled(&mut self) -> bool {
        match self.done.try_recv() {
            Ok(()) | Err(TryRecvError::Closed) => true,
            Err(TryRecvError::Empty) => false,
        }
    }
}

pub trait MotionDriver: Send + Sync {
    fn begin(&self, request: MotionRequest) -> MotionTicket;
}

/// Settles each transition after a fixed wall-clock duration.
#[derive(Debug, Clone)]
pub struct TimedMotion {
    duration: Duration,
}

impl TimedMotion {
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }

    pub fn from_config(cfg: &SimConfig) -> Self {
        Self::new(Duration::from_millis(cfg.motion_duration_ms))
    }
}

impl MotionDriver for TimedMotion {
    fn begin(&self, request: MotionRequest) -> MotionTicket {
        let (ticket, tx) = MotionTicket::new(request.entity);
        let duration = self.duration;
        tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            let _ = tx.send(());
        });
        ticket
    }
}

/// Settles immediately; headless runs and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct InstantMotion;

impl MotionDriver for InstantMotion {
    fn begin(&self, request: MotionRequest) -> MotionTicket {
        let (ticket, tx) = MotionTicket::new(request.entity);
        let _ = tx.send(());
        ticket
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::EntityKind;

    fn request() -> MotionRequest {
        MotionRequest {
            entity: EntityId {
                kind: EntityKind::Amoeba,
                seq: 0,
            },
            from: Vec2::new(1.0, 1.0),
            to: Vec2::new(1.05, 1.0),
        }
    }

    #[test]
    fn instant_motion_is_settled_right_away() {
        let mut ticket = InstantMotion.begin(request());
        assert!(ticket.is_settled());
        assert_eq!(ticket.entity().seq, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn timed_motion_settles_after_its_duration() -> anyhow::Result<()> {
        let driver = TimedMotion::new(Duration::from_millis(600));
        let mut ticket = driver.begin(request());
        assert!(!ticket.is_settled());

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(!ticket.is_settled());

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(ticket.is_settled());
        Ok(())
    }

    #[test]
    fn dropped_driver_side_counts_as_settled() {
        let (mut ticket, tx) = MotionTicket::new(request().entity);
        assert!(!ticket.is_settled());
        drop(tx);
        assert!(ticket.is_settled());
    }
}
