//! Demand-driven flow control
//!
//! Pauses the swarm when nobody is waiting for data and resumes it as soon
//! as a consumer needs something that has not arrived yet.

use std::sync::Arc;

use tokio::sync::broadcast::{self, error::RecvError};

use crate::engine::{EngineEvent, SwarmEngine};

/// What the controller last asked the engine to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
    Running,
    Paused,
}

/// Pauses and resumes the swarm as consumer demand comes and goes
pub struct FlowController {
    engine: Arc<dyn SwarmEngine>,
    events: broadcast::Receiver<EngineEvent>,
    state: Option<FlowState>,
}

impl FlowController {
    /// Subscribe to `engine` events; anything raised after this call is
    /// seen by `run`
    pub fn new(engine: Arc<dyn SwarmEngine>) -> Self {
        let events = engine.subscribe();
        Self {
            engine,
            events,
            state: None,
        }
    }

    /// Last state applied to the engine, `None` before the first event
    pub fn state(&self) -> Option<FlowState> {
        self.state
    }

    /// Process events until the engine's channel closes
    pub async fn run(mut self) {
        loop {
            match self.events.recv().await {
                Ok(event) => self.handle(event).await,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Flow controller skipped {} engine events", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
        tracing::debug!("Flow controller stopped");
    }

    /// Apply a single event
    pub async fn handle(&mut self, event: EngineEvent) {
        let target = match event {
            EngineEvent::Interested => FlowState::Running,
            EngineEvent::Uninterested => FlowState::Paused,
            _ => return,
        };

        if self.state == Some(target) {
            return;
        }

        let result = match target {
            FlowState::Running => self.engine.resume().await,
            FlowState::Paused => self.engine.pause().await,
        };

        match result {
            Ok(()) => {
                tracing::info!("Swarm {:?}", target);
                self.state = Some(target);
            }
            Err(e) => tracing::error!("Failed to switch swarm to {:?}: {}", target, e),
        }
    }
}
