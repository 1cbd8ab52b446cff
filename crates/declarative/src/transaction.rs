//! Transactions
//!
//! A [`Transaction`] walks a catalog in dependency order and converges each
//! resource once. Failures are recorded per resource and never abort the walk;
//! dependents of a failed or skipped resource are skipped. Only an unusable
//! graph (cycle, dangling reference) fails the transaction, and it does so
//! before any resource is touched.

use crate::catalog::Catalog;
use crate::context::ProgressCallback;
use crate::error::Result;
use crate::graph::RelationshipGraph;
use crate::reference::ResourceRef;
use crate::types::{ApplyOptions, ApplyResult, Event, ExecuteSummary, TransactionState};
use indexmap::{IndexMap, IndexSet};
use serde::Serialize;

/// Everything a transaction observed.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TransactionReport {
    /// Resources in the order they were visited.
    pub order: Vec<String>,
    /// Outcome per resource.
    pub outcomes: IndexMap<String, ApplyResult>,
    /// Events in the order they happened.
    pub events: Vec<Event>,
    pub summary: ExecuteSummary,
}

impl TransactionReport {
    /// Outcome of one resource.
    pub fn outcome(&self, reference: &str) -> Option<&ApplyResult> {
        self.outcomes.get(reference)
    }

    /// Check if no resource failed.
    pub fn is_success(&self) -> bool {
        self.summary.is_success()
    }

    /// Resources that were changed.
    pub fn changed(&self) -> impl Iterator<Item = &str> {
        self.outcomes
            .iter()
            .filter(|(_, result)| result.is_change())
            .map(|(id, _)| id.as_str())
    }
}

/// One ordered application pass over a catalog.
pub struct Transaction<'c> {
    catalog: &'c mut Catalog,
    options: ApplyOptions,
    state: TransactionState,
    report: TransactionReport,
    /// Resources that were converged, in completion order.
    completed: Vec<ResourceRef>,
}

impl<'c> Transaction<'c> {
    pub fn new(catalog: &'c mut Catalog, options: ApplyOptions) -> Self {
        Self {
            catalog,
            options,
            state: TransactionState::Pending,
            report: TransactionReport::default(),
            completed: Vec::new(),
        }
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn report(&self) -> &TransactionReport {
        &self.report
    }

    pub fn into_report(self) -> TransactionReport {
        self.report
    }

    /// Evaluate every resource once, in dependency order.
    pub fn evaluate(&mut self, progress: &mut dyn ProgressCallback) -> Result<()> {
        if self.state != TransactionState::Pending {
            log::warn!("Transaction already evaluated; ignoring");
            return Ok(());
        }
        self.state = TransactionState::Running;

        let prepared = self
            .catalog
            .relationship_graph()
            .and_then(|graph| graph.topological_order().map(|order| (graph, order)));
        let (graph, order) = match prepared {
            Ok(prepared) => prepared,
            Err(err) => {
                log::error!("Could not prepare catalog {}: {err}", self.catalog.name());
                self.state = TransactionState::Failed;
                return Err(err);
            }
        };

        log::info!(
            "Applying catalog {} ({} resources{})",
            self.catalog.name(),
            order.len(),
            if self.options.noop { ", noop" } else { "" }
        );
        progress.on_transaction_start(order.len());

        let mut pending_refresh: IndexSet<ResourceRef> = IndexSet::new();
        for reference in order {
            let id = reference.to_string();
            progress.on_resource_start(&id);
            let result = self.evaluate_one(&graph, &reference, &mut pending_refresh);
            self.report.summary.add_result(&result);
            progress.on_resource_complete(&id, &result);
            self.report.order.push(id.clone());
            self.report.outcomes.insert(id, result);
        }

        self.state = TransactionState::Completed;
        progress.on_transaction_complete(&self.report.summary);
        Ok(())
    }

    fn evaluate_one(
        &mut self,
        graph: &RelationshipGraph,
        reference: &ResourceRef,
        pending_refresh: &mut IndexSet<ResourceRef>,
    ) -> ApplyResult {
        let id = reference.to_string();

        let blocked = graph.dependencies(reference).into_iter().find_map(|(dep, _)| {
            match self.report.outcomes.get(&dep.to_string()) {
                Some(ApplyResult::Failed { .. }) => Some(format!("dependency {dep} failed")),
                Some(ApplyResult::Skipped { .. }) => Some(format!("dependency {dep} was skipped")),
                _ => None,
            }
        });
        if let Some(reason) = blocked {
            log::warn!("{id}: skipping because {reason}");
            pending_refresh.shift_remove(reference);
            self.report.events.push(Event::Skipped {
                resource: id,
                reason: reason.clone(),
            });
            return ApplyResult::Skipped { reason };
        }

        let noop = self.options.noop;
        let Some(resource) = self.catalog.resource_mut(reference) else {
            return ApplyResult::Skipped {
                reason: "not in catalog".to_string(),
            };
        };

        if !self.options.tags.is_empty() && !resource.tagged(&self.options.tags) {
            log::debug!("{id}: not tagged with {}", self.options.tags.join(", "));
            pending_refresh.shift_remove(reference);
            return ApplyResult::Filtered;
        }

        let convergence = resource.converge(noop);
        let mut failure = convergence.events.iter().find_map(|event| match event {
            Event::Failed { message, .. } => Some(message.clone()),
            _ => None,
        });
        self.report.events.extend(convergence.events);

        if pending_refresh.shift_remove(reference) {
            if noop || resource.noop() {
                log::info!("{id}: would have refreshed (noop)");
            } else {
                let event = resource.refresh();
                if let Event::Failed { message, .. } = &event {
                    failure.get_or_insert_with(|| message.clone());
                } else {
                    self.report.summary.refreshed += 1;
                }
                self.report.events.push(event);
            }
        }

        if convergence.changed {
            self.completed.push(reference.clone());
            for (dependent, refresh) in graph.dependents(reference) {
                if refresh {
                    pending_refresh.insert(dependent.clone());
                }
            }
        }

        match failure {
            Some(error) => ApplyResult::Failed { error },
            None if convergence.changed => ApplyResult::Changed,
            None if convergence.noop => ApplyResult::Noop,
            None => ApplyResult::NoChange,
        }
    }

    /// Revert every change made by this transaction, newest resource first.
    pub fn rollback(&mut self) -> Vec<Event> {
        let mut events = Vec::new();
        for reference in self.completed.drain(..).rev() {
            let Some(resource) = self.catalog.resource_mut(&reference) else {
                continue;
            };
            if !resource.has_changes() {
                continue;
            }
            log::info!("Rolling back {reference}");
            events.extend(resource.rollback());
        }
        self.report.events.extend(events.iter().cloned());
        events
    }
}
