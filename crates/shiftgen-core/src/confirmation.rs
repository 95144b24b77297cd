//! Driver assignment and confirmation writes.
//!
//! `unassigned -> pending -> accepted | declined`. Assignment moves an
//! instance to `pending` on a best-effort basis; confirmation overwrites the
//! status without checking the current state.

use crate::error::ShiftError;
use crate::identifiers::ItemId;
use crate::model::{ConfirmationStatus, DriverAssignment, Reference};
use crate::pool::{run_bounded, Concurrency};
use crate::repository::ShiftInstanceRepository;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchAssignment {
    pub updated_ids: Vec<ItemId>,
    /// Members whose driver was written but whose `pending` write failed.
    pub status_write_failures: usize,
}

impl BatchAssignment {
    pub fn summary(&self) -> DriverAssignment {
        DriverAssignment {
            assigned: true,
            status_write_ok: self.status_write_failures == 0,
        }
    }
}

#[derive(Clone)]
pub struct ConfirmationWorkflow {
    repository: ShiftInstanceRepository,
}

impl ConfirmationWorkflow {
    pub fn new(repository: ShiftInstanceRepository) -> Self {
        Self { repository }
    }

    /// Writes the driver, then tries to mark the instance `pending`. Only the
    /// driver write can fail the call.
    pub async fn assign_driver(
        &self,
        id: &ItemId,
        driver: &Reference,
    ) -> Result<DriverAssignment, ShiftError> {
        self.repository.assign_driver(id, driver).await?;

        let status_write_ok = match self
            .repository
            .set_confirmation_status(id, ConfirmationStatus::Pending)
            .await
        {
            Ok(()) => true,
            Err(error) => {
                warn!(
                    id = %id,
                    driver = %driver,
                    error = %error,
                    "driver assigned but pending status could not be written"
                );
                false
            }
        };

        Ok(DriverAssignment {
            assigned: true,
            status_write_ok,
        })
    }

    pub async fn set_confirmation_status(
        &self,
        id: &ItemId,
        status: ConfirmationStatus,
    ) -> Result<(), ShiftError> {
        self.repository.set_confirmation_status(id, status).await
    }

    /// Runs [`Self::assign_driver`] for every id on the bounded pool. Writes
    /// that completed before a failure stay committed.
    pub async fn assign_driver_to_all(
        &self,
        ids: &[ItemId],
        driver: &Reference,
        concurrency: Concurrency,
    ) -> Result<BatchAssignment, ShiftError> {
        let status_failures = AtomicUsize::new(0);
        let status_failures_ref = &status_failures;

        run_bounded(ids, concurrency, move |id: &ItemId| {
            let id = id.clone();
            async move {
                let outcome = self.assign_driver(&id, driver).await?;
                if !outcome.status_write_ok {
                    status_failures_ref.fetch_add(1, Ordering::SeqCst);
                }
                Ok::<(), ShiftError>(())
            }
        })
        .await
        .into_result()?;

        Ok(BatchAssignment {
            updated_ids: ids.to_vec(),
            status_write_failures: status_failures.into_inner(),
        })
    }

    pub async fn set_confirmation_status_for_all(
        &self,
        ids: &[ItemId],
        status: ConfirmationStatus,
        concurrency: Concurrency,
    ) -> Result<Vec<ItemId>, ShiftError> {
        run_bounded(ids, concurrency, move |id: &ItemId| {
            let id = id.clone();
            async move { self.set_confirmation_status(&id, status).await }
        })
        .await
        .into_result()?;

        Ok(ids.to_vec())
    }
}
