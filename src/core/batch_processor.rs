//! Batch replay with event-based partitioning
//!
//! The `BatchProcessor` partitions a batch of journal commands by event, so
//! different events replay concurrently while the commands of one event keep
//! their journal order. Events that touch the same global id (a participant,
//! sub-group or expense) are replayed together, which keeps the outcome equal
//! to a sequential replay.
//!
//! # Architecture
//!
//! ```text
//! BatchProcessor
//!     └── Arc<SettlementEngine<S>>  (shared engine, store behind its own locks)
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use crate::core::engine::SettlementEngine;
use crate::core::traits::SettlementStore;
use crate::types::{EventId, LedgerCommand, SettlementError, SharedId};
use tracing::{error, warn};

/// Outcome of replaying one command
#[derive(Debug, Clone)]
pub struct ProcessingResult {
    pub command: LedgerCommand,
    pub result: Result<(), SettlementError>,
}

/// Replays batches of commands, one tokio task per event
pub struct BatchProcessor<S> {
    engine: Arc<SettlementEngine<S>>,
}

impl<S> Clone for BatchProcessor<S> {
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
        }
    }
}

impl<S: SettlementStore + 'static> BatchProcessor<S> {
    pub fn new(engine: Arc<SettlementEngine<S>>) -> Self {
        Self { engine }
    }

    /// Split a batch into command lists that can replay concurrently
    ///
    /// Each list holds the commands of one event in journal order. Events
    /// whose commands name the same participant, sub-group or expense id share
    /// a list, since the first of them to reach the global registry wins. Lists
    /// are keyed by one of their events.
    pub fn partition_by_event(
        &self,
        batch: Vec<LedgerCommand>,
    ) -> HashMap<EventId, Vec<LedgerCommand>> {
        let mut parents: HashMap<EventId, EventId> = HashMap::new();
        let mut owners: HashMap<SharedId, EventId> = HashMap::new();

        for command in &batch {
            let event = command.event();
            parents.entry(event).or_insert(event);
            let Some(id) = command.shared_id() else {
                continue;
            };

            let owner = *owners.entry(id).or_insert(event);
            let (owner_root, event_root) = (root(&parents, owner), root(&parents, event));
            if owner_root != event_root {
                parents.insert(event_root, owner_root);
            }
        }

        let mut event_batches: HashMap<EventId, Vec<LedgerCommand>> = HashMap::new();
        for command in batch {
            event_batches
                .entry(root(&parents, command.event()))
                .or_default()
                .push(command);
        }

        event_batches
    }

    /// Replay one partition's commands sequentially
    ///
    /// A rejected command is logged and does not stop the ones after it.
    pub async fn process_event_commands(&self, commands: Vec<LedgerCommand>) -> Vec<ProcessingResult> {
        let mut results = Vec::with_capacity(commands.len());

        for command in commands {
            let result = self.engine.apply(command.clone());
            if let Err(e) = &result {
                warn!(event = command.event(), error = %e, "command rejected");
            }
            results.push(ProcessingResult { command, result });
        }

        results
    }

    /// Replay a batch, events in parallel
    ///
    /// Results are grouped by event; the order across events is unspecified.
    pub async fn process_batch(&self, batch: Vec<LedgerCommand>) -> Vec<ProcessingResult> {
        let event_batches = self.partition_by_event(batch);

        let mut tasks = Vec::with_capacity(event_batches.len());
        for (_event, commands) in event_batches {
            let processor = self.clone();
            tasks.push(tokio::spawn(async move {
                processor.process_event_commands(commands).await
            }));
        }

        let mut results = Vec::new();
        for task in tasks {
            match task.await {
                Ok(event_results) => results.extend(event_results),
                Err(e) => error!(error = %e, "replay task panicked"),
            }
        }

        results
    }
}

/// Representative event of the partition `event` was merged into
fn root(parents: &HashMap<EventId, EventId>, mut event: EventId) -> EventId {
    while let Some(&parent) = parents.get(&event) {
        if parent == event {
            break;
        }
        event = parent;
    }
    event
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::core::memory_store::MemoryStore;
    use crate::core::traits::Directory;
    use crate::types::{EventStatus, SuggestionKind};
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    fn processor() -> (Arc<MemoryStore>, BatchProcessor<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let engine = Arc::new(SettlementEngine::new(
            Arc::clone(&store),
            EngineConfig::default(),
        ));
        (store, BatchProcessor::new(engine))
    }

    fn open(event: EventId) -> LedgerCommand {
        LedgerCommand::OpenEvent {
            event,
            organizer: 100,
            date: NaiveDate::from_ymd_opt(2026, 5, 1).unwrap(),
        }
    }

    fn join(event: EventId, participant: i64) -> LedgerCommand {
        LedgerCommand::Join {
            event,
            participant,
            user: None,
            name: format!("P{}", participant),
        }
    }

    #[test]
    fn test_partition_keeps_per_event_order() {
        let (_, processor) = processor();
        let batch = vec![open(1), open(2), join(1, 1), join(2, 2), join(1, 3)];

        let partitioned = processor.partition_by_event(batch);

        assert_eq!(partitioned.len(), 2);
        assert_eq!(partitioned[&1], vec![open(1), join(1, 1), join(1, 3)]);
        assert_eq!(partitioned[&2], vec![open(2), join(2, 2)]);
    }

    #[test]
    fn test_partition_merges_events_sharing_a_participant() {
        let (_, processor) = processor();
        let batch = vec![open(1), open(2), open(3), join(1, 7), join(3, 8), join(2, 7)];

        let partitioned = processor.partition_by_event(batch);

        assert_eq!(partitioned.len(), 2);
        assert_eq!(
            partitioned[&1],
            vec![open(1), open(2), join(1, 7), join(2, 7)]
        );
        assert_eq!(partitioned[&3], vec![open(3), join(3, 8)]);
    }

    #[test]
    fn test_partition_merges_events_sharing_an_expense_id() {
        let (_, processor) = processor();
        let expense = |event| LedgerCommand::AddExpense {
            event,
            expense: 5,
            payer: None,
            total: Decimal::new(1000, 2),
            description: "Ice".to_string(),
        };
        let batch = vec![open(1), open(2), expense(2), expense(1)];

        let partitioned = processor.partition_by_event(batch);

        assert_eq!(partitioned.len(), 1);
        let merged = partitioned.into_values().next().unwrap();
        assert_eq!(merged, vec![open(1), open(2), expense(2), expense(1)]);
    }

    #[test]
    fn test_partition_empty_batch() {
        let (_, processor) = processor();
        assert!(processor.partition_by_event(vec![]).is_empty());
    }

    #[tokio::test]
    async fn test_rejected_command_does_not_stop_event() {
        let (store, processor) = processor();
        let batch = vec![
            open(1),
            // Unknown event: rejected
            join(9, 1),
            join(1, 1),
            LedgerCommand::Cancel { event: 1 },
        ];

        let results = processor.process_batch(batch).await;

        assert_eq!(results.len(), 4);
        assert_eq!(results.iter().filter(|r| r.result.is_err()).count(), 1);
        assert!(store.is_member(1, 1).unwrap());
        assert_eq!(store.event(1).unwrap().unwrap().status, EventStatus::Cancelled);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_events_replay_independently() {
        let (store, processor) = processor();
        let mut batch = Vec::new();
        for event in 1..=8 {
            batch.push(open(event));
            batch.push(join(event, event * 10 + 1));
            batch.push(join(event, event * 10 + 2));
            batch.push(LedgerCommand::AddExpense {
                event,
                expense: event,
                payer: Some(event * 10 + 1),
                total: Decimal::new(5000, 2),
                description: "Taxi".to_string(),
            });
            batch.push(LedgerCommand::ToggleParticipation {
                event,
                expense: event,
                participant: event * 10 + 1,
            });
            batch.push(LedgerCommand::ToggleParticipation {
                event,
                expense: event,
                participant: event * 10 + 2,
            });
        }

        let results = processor.process_batch(batch).await;
        assert!(results.iter().all(|r| r.result.is_ok()));

        let engine = SettlementEngine::new(Arc::clone(&store), EngineConfig::default());
        for event in 1..=8 {
            let suggestions = engine.suggestions(event, SuggestionKind::Individual).unwrap();
            assert_eq!(suggestions.len(), 1);
            assert_eq!(suggestions[0].amount, Decimal::new(2500, 2));
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_shared_participant_keeps_first_registration() {
        let (store, processor) = processor();
        let mut batch = vec![open(1), open(2)];
        batch.extend((1..=200).map(|participant| join(1, participant + 1000)));
        batch.push(LedgerCommand::Join {
            event: 1,
            participant: 7,
            user: Some(301),
            name: "FromEventOne".to_string(),
        });
        batch.push(LedgerCommand::Join {
            event: 2,
            participant: 7,
            user: Some(302),
            name: "FromEventTwo".to_string(),
        });

        let results = processor.process_batch(batch).await;
        assert!(results.iter().all(|r| r.result.is_ok()));

        let registered = store.participant(7).unwrap().unwrap();
        assert_eq!(registered.name, "FromEventOne");
        assert_eq!(registered.user, Some(301));
        assert!(store.is_member(1, 7).unwrap());
        assert!(store.is_member(2, 7).unwrap());
    }
}
