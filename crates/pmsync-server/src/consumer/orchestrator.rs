//! Per-topic consumer orchestration

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use super::source::SourceFactory;
use super::unit::ActiveConsumptionUnit;
use super::ConsumerError;
use crate::config::TopicSpec;
use crate::ingest::MessageDispatcher;

/// Result of [`ConsumerOrchestrator::start`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StartReport {
    pub started: Vec<String>,
    /// Topic name and failure reason
    pub failed: Vec<(String, String)>,
}

/// Owns the topic → unit registry
pub struct ConsumerOrchestrator {
    factory: Arc<dyn SourceFactory>,
    dispatcher: Arc<MessageDispatcher>,
    registry: DashMap<String, ActiveConsumptionUnit>,
    stop_grace: Duration,
}

impl ConsumerOrchestrator {
    pub fn new(
        factory: Arc<dyn SourceFactory>,
        dispatcher: Arc<MessageDispatcher>,
        stop_grace: Duration,
    ) -> Self {
        Self {
            factory,
            dispatcher,
            registry: DashMap::new(),
            stop_grace,
        }
    }

    /// Start one unit per spec.
    ///
    /// Duplicate names reject the whole list before anything starts. Past
    /// that, a unit that fails to start is reported and skipped.
    pub fn start(&self, specs: &[TopicSpec]) -> Result<StartReport, ConsumerError> {
        let mut seen = HashSet::new();
        if let Some(dup) = specs.iter().find(|s| !seen.insert(s.name.as_str())) {
            return Err(ConsumerError::DuplicateTopic(dup.name.clone()));
        }

        let mut report = StartReport::default();
        for spec in specs {
            let result = self.start_unit(spec);

            match result {
                Ok(()) => report.started.push(spec.name.clone()),
                Err(e) => {
                    error!(topic = %spec.name, error = %e, "Failed to start consumer unit");
                    report.failed.push((spec.name.clone(), e.to_string()));
                },
            }
        }

        info!(
            started = report.started.len(),
            failed = report.failed.len(),
            "Consumer startup complete"
        );
        Ok(report)
    }

    /// Build the unit outside the registry lock, then register it
    fn start_unit(&self, spec: &TopicSpec) -> Result<(), ConsumerError> {
        if self.registry.contains_key(&spec.name) {
            return Err(ConsumerError::AlreadyRunning(spec.name.clone()));
        }

        let unit = self.make_unit(spec)?;
        match self.registry.entry(spec.name.clone()) {
            Entry::Occupied(_) => {
                // Lost to a concurrent start of the same topic
                unit.abort();
                Err(ConsumerError::AlreadyRunning(spec.name.clone()))
            },
            Entry::Vacant(slot) => {
                info!(
                    topic = %spec.name,
                    group_id = unit.group_id(),
                    workers = unit.worker_count(),
                    "Consumer unit started"
                );
                slot.insert(unit);
                Ok(())
            },
        }
    }

    /// Build and spawn the unit for one topic
    pub fn make_unit(&self, spec: &TopicSpec) -> Result<ActiveConsumptionUnit, ConsumerError> {
        validate_broker_list(&spec.broker).map_err(|reason| ConsumerError::InvalidBroker {
            topic: spec.name.clone(),
            broker: spec.broker.clone(),
            reason,
        })?;

        let threads = spec.threads();
        if threads == 0 {
            return Err(ConsumerError::NoWorkers(spec.name.clone()));
        }

        // All sources first so a failure leaves nothing running
        let sources = (0..threads)
            .map(|worker| self.factory.create(spec, worker))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ActiveConsumptionUnit::spawn(spec, sources, self.dispatcher.clone()))
    }

    /// Stop every unit and clear the registry. Failures are logged only.
    pub async fn stop(&self) {
        let topics: Vec<String> = self.registry.iter().map(|e| e.key().clone()).collect();
        let units = topics
            .iter()
            .filter_map(|topic| self.registry.remove(topic))
            .map(|(_, unit)| unit);

        let grace = self.stop_grace;
        let results = join_all(units.map(|unit| async move {
            let topic = unit.topic().to_string();
            (topic, unit.stop(grace).await)
        }))
        .await;

        for (topic, result) in results {
            match result {
                Ok(()) => info!(topic = %topic, "Consumer unit stopped"),
                Err(e) => warn!(topic = %topic, error = %e, "Consumer unit stop failed"),
            }
        }
    }

    /// Topics with a running unit, sorted
    pub fn active_topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.registry.iter().map(|e| e.key().clone()).collect();
        topics.sort();
        topics
    }

    pub fn is_active(&self, topic: &str) -> bool {
        self.registry.contains_key(topic)
    }
}

/// Check a comma-separated `host:port` list
fn validate_broker_list(broker: &str) -> Result<(), String> {
    if broker.trim().is_empty() {
        return Err("no broker address given".to_string());
    }

    for address in broker.split(',').map(str::trim) {
        let (host, port) = address
            .rsplit_once(':')
            .ok_or_else(|| format!("'{address}' is missing a port"))?;
        if host.is_empty() || host.chars().any(char::is_whitespace) {
            return Err(format!("'{address}' has an invalid host"));
        }
        match port.parse::<u16>() {
            Ok(p) if p > 0 => {},
            _ => return Err(format!("'{address}' has an invalid port")),
        }
    }
    Ok(())
}
