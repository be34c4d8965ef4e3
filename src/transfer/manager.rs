//! Transfer Manager
//!
//! Drives the volume status state machine for ownership transfers.
//!
//! ```text
//! available ──create──▶ awaiting-transfer ──accept──▶ available (new owner)
//!                              │
//!                              └──delete / volume destroy──▶ available (same owner)
//! ```
//!
//! Removing the transfer record is the gate between a racing `accept` and
//! `delete`: exactly one of them removes it, the other sees not-found. Accept
//! reserves quota in the new project first, then consumes the record, then
//! moves the volume with a status CAS. Losing that CAS reinstates the record
//! and rolls the reservation back. The old project's quota is released only
//! after the reassignment has landed.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use super::auth::AuthKeyHasher;
use super::db::TransferStore;
use super::error::TransferError;
use super::types::{AcceptedTransfer, CreatedTransfer, TransferInfo, TransferOp, TransferRecord};
use crate::context::RequestContext;
use crate::core_types::{TransferId, VolumeId};
use crate::notify::{NotificationSink, UsagePayload};
use crate::quota::{QuotaDeltas, QuotaLedger, Reservation};
use crate::volume::{LazyVolume, VolumeFieldLoader, VolumeRecord, VolumeStatus, VolumeStore, VolumeUpdate};

pub struct TransferManager {
    volumes: Arc<dyn VolumeStore>,
    transfers: Arc<dyn TransferStore>,
    fields: Arc<dyn VolumeFieldLoader>,
    quotas: Arc<dyn QuotaLedger>,
    notifier: Arc<dyn NotificationSink>,
    hasher: AuthKeyHasher,
}

impl TransferManager {
    pub fn new(
        volumes: Arc<dyn VolumeStore>,
        transfers: Arc<dyn TransferStore>,
        fields: Arc<dyn VolumeFieldLoader>,
        quotas: Arc<dyn QuotaLedger>,
        notifier: Arc<dyn NotificationSink>,
        hasher: AuthKeyHasher,
    ) -> Self {
        Self {
            volumes,
            transfers,
            fields,
            quotas,
            notifier,
            hasher,
        }
    }

    /// Offer a volume for transfer.
    ///
    /// The volume must be owned by the caller's project and be `available`.
    /// The returned `auth_key` is not stored and cannot be retrieved again.
    pub async fn create(
        &self,
        ctx: &RequestContext,
        volume_id: VolumeId,
        display_name: Option<&str>,
    ) -> Result<CreatedTransfer, TransferError> {
        let mut volume = self
            .volumes
            .get(volume_id)
            .await?
            .filter(|v| ctx.can_see_project(&v.project_id))
            .ok_or_else(|| TransferError::VolumeNotFound(volume_id.to_string()))?;

        if volume.status != VolumeStatus::Available {
            return Err(TransferError::InvalidVolume(format!(
                "status must be available, but current status is: {}",
                volume.status
            )));
        }

        let auth_key = self.hasher.generate_key();
        let record = TransferRecord::new(
            volume.id,
            display_name.map(str::to_string),
            self.hasher.hash(&auth_key)?,
        );

        if !self
            .volumes
            .conditional_update(
                volume.id,
                &VolumeStatus::Available,
                &VolumeUpdate::status(VolumeStatus::AwaitingTransfer),
            )
            .await?
        {
            debug!(volume_id = %volume.id, "Lost status race on create");
            return Err(TransferError::InvalidVolume(format!(
                "volume {} is no longer available",
                volume.id
            )));
        }

        volume.status = VolumeStatus::AwaitingTransfer;
        self.emit(ctx, &volume, None, TransferOp::Create.start_event());

        if let Err(e) = self.transfers.create(&record).await {
            error!(volume_id = %volume.id, error = %e, "Failed to persist transfer, restoring volume");
            self.restore_available(volume.id).await;
            return Err(e);
        }

        info!(
            transfer_id = %record.id,
            volume_id = %volume.id,
            project_id = %volume.project_id,
            "Transfer created"
        );
        self.emit(ctx, &volume, Some(record.id), TransferOp::Create.end_event());

        Ok(CreatedTransfer {
            id: record.id,
            volume_id: record.volume_id,
            display_name: record.display_name,
            auth_key,
            created_at: record.created_at,
        })
    }

    /// Accept a transfer into the caller's project.
    ///
    /// Lookup is deliberately NOT scoped to the owner: anyone holding the
    /// transfer id and key may accept, while `get`/`get_all` only show a
    /// transfer to the project that currently owns the volume. The key is the
    /// sole authorization for acceptance, so it must be handed over as
    /// carefully as a credential.
    pub async fn accept(
        &self,
        ctx: &RequestContext,
        transfer_id: TransferId,
        auth_key: &str,
    ) -> Result<AcceptedTransfer, TransferError> {
        let record = self
            .transfers
            .get(transfer_id)
            .await?
            .ok_or_else(|| TransferError::TransferNotFound(transfer_id.to_string()))?;

        if !self.hasher.verify(auth_key, &record.crypt_hash)? {
            warn!(transfer_id = %transfer_id, project_id = %ctx.project_id, "Invalid auth key on accept");
            return Err(TransferError::InvalidAuthKey);
        }

        let volume = self
            .volumes
            .get(record.volume_id)
            .await?
            .ok_or_else(|| TransferError::TransferNotFound(transfer_id.to_string()))?;

        // Fired before the status check: a start without an end marks an aborted accept
        self.emit(ctx, &volume, Some(record.id), TransferOp::Accept.start_event());

        if volume.status != VolumeStatus::AwaitingTransfer {
            return Err(TransferError::InvalidVolume(format!(
                "status must be awaiting-transfer, but current status is: {}",
                volume.status
            )));
        }

        let mut lazy = LazyVolume::new(ctx, volume, self.fields.clone());
        let type_name = lazy.volume_type().await?.map(|t| t.name.clone());
        let mut volume = lazy.into_record();
        if let (Some(type_id), None) = (&volume.volume_type_id, &type_name) {
            return Err(TransferError::InvalidVolume(format!(
                "volume type {} of volume {} could not be found",
                type_id, volume.id
            )));
        }

        let deltas = QuotaDeltas::for_volume(volume.size, type_name.as_deref());
        let donor_project = volume.project_id.clone();

        let reservation = self.quotas.reserve(&ctx.project_id, &deltas).await.map_err(|e| {
            warn!(
                transfer_id = %transfer_id,
                project_id = %ctx.project_id,
                error = %e,
                "Quota exceeded on accept"
            );
            e
        })?;

        // Whoever removes the record owns the transfer; a concurrent delete or
        // accept that got there first makes this one a not-found
        match self.transfers.delete(record.id).await {
            Ok(true) => {}
            Ok(false) => {
                self.rollback_quietly(&reservation).await;
                debug!(transfer_id = %record.id, "Transfer consumed concurrently");
                return Err(TransferError::TransferNotFound(transfer_id.to_string()));
            }
            Err(e) => {
                self.rollback_quietly(&reservation).await;
                return Err(e);
            }
        }

        let update = VolumeUpdate::reassign(
            VolumeStatus::Available,
            ctx.project_id.clone(),
            ctx.user_id.clone(),
        );
        let moved = self
            .volumes
            .conditional_update(volume.id, &VolumeStatus::AwaitingTransfer, &update)
            .await;
        if !matches!(moved, Ok(true)) {
            self.reinstate(&record).await;
            self.rollback_quietly(&reservation).await;
            return Err(match moved {
                Err(e) => e,
                _ => TransferError::InvalidVolume(format!(
                    "volume {} changed status during accept",
                    volume.id
                )),
            });
        }
        update.apply(&mut volume);

        // The volume has moved; from here on failures are logged, not returned
        if let Err(e) = self.quotas.commit(&reservation).await {
            error!(reservation_id = %reservation.id, error = %e, "Failed to commit acceptor quota");
        }
        if let Err(e) = self.quotas.commit_release(&donor_project, &deltas).await {
            error!(project_id = %donor_project, error = %e, "Failed to release donor quota");
        }

        info!(
            transfer_id = %record.id,
            volume_id = %volume.id,
            from_project = %donor_project,
            to_project = %ctx.project_id,
            "Transfer accepted"
        );
        self.emit(ctx, &volume, Some(record.id), TransferOp::Accept.end_event());

        Ok(AcceptedTransfer {
            id: record.id,
            volume_id: volume.id,
            display_name: record.display_name,
        })
    }

    /// Transfer visible to the caller's project
    pub async fn get(
        &self,
        ctx: &RequestContext,
        transfer_id: TransferId,
    ) -> Result<TransferInfo, TransferError> {
        let (record, _) = self.get_visible(ctx, transfer_id).await?;
        Ok(TransferInfo::from(&record))
    }

    /// All transfers visible to the caller's project, oldest first
    pub async fn get_all(&self, ctx: &RequestContext) -> Result<Vec<TransferInfo>, TransferError> {
        let scope = (!ctx.is_admin).then_some(ctx.project_id.as_str());
        let records = self.transfers.list(scope).await?;
        Ok(records.iter().map(TransferInfo::from).collect())
    }

    /// Cancel a pending transfer and make the volume available again
    pub async fn delete(
        &self,
        ctx: &RequestContext,
        transfer_id: TransferId,
    ) -> Result<(), TransferError> {
        let (record, mut volume) = self.get_visible(ctx, transfer_id).await?;

        self.emit(ctx, &volume, Some(record.id), TransferOp::Delete.start_event());

        if !self.transfers.delete(record.id).await? {
            return Err(TransferError::TransferNotFound(transfer_id.to_string()));
        }

        let restore = VolumeUpdate::status(VolumeStatus::Available);
        if self
            .volumes
            .conditional_update(volume.id, &VolumeStatus::AwaitingTransfer, &restore)
            .await?
        {
            restore.apply(&mut volume);
        } else {
            warn!(
                transfer_id = %record.id,
                volume_id = %volume.id,
                "Volume was not awaiting-transfer when its transfer was deleted"
            );
        }

        info!(transfer_id = %record.id, volume_id = %volume.id, "Transfer deleted");
        self.emit(ctx, &volume, Some(record.id), TransferOp::Delete.end_event());
        Ok(())
    }

    async fn get_visible(
        &self,
        ctx: &RequestContext,
        transfer_id: TransferId,
    ) -> Result<(TransferRecord, VolumeRecord), TransferError> {
        let not_found = || TransferError::TransferNotFound(transfer_id.to_string());

        let record = self.transfers.get(transfer_id).await?.ok_or_else(not_found)?;
        let volume = self
            .volumes
            .get(record.volume_id)
            .await?
            .filter(|v| ctx.can_see_project(&v.project_id))
            .ok_or_else(not_found)?;

        Ok((record, volume))
    }

    fn emit(
        &self,
        ctx: &RequestContext,
        volume: &VolumeRecord,
        transfer_id: Option<TransferId>,
        event_name: String,
    ) {
        self.notifier
            .emit(ctx, &UsagePayload::new(volume, transfer_id), &event_name);
    }

    async fn restore_available(&self, volume_id: VolumeId) {
        let restore = VolumeUpdate::status(VolumeStatus::Available);
        match self
            .volumes
            .conditional_update(volume_id, &VolumeStatus::AwaitingTransfer, &restore)
            .await
        {
            Ok(true) => {}
            Ok(false) => warn!(volume_id = %volume_id, "Volume changed before it could be restored"),
            Err(e) => error!(volume_id = %volume_id, error = %e, "Failed to restore volume status"),
        }
    }

    /// Put back a record consumed by an accept that could not move the volume
    async fn reinstate(&self, record: &TransferRecord) {
        if let Err(e) = self.transfers.create(record).await {
            error!(transfer_id = %record.id, error = %e, "Failed to reinstate transfer");
        }
    }

    async fn rollback_quietly(&self, reservation: &Reservation) {
        if let Err(e) = self.quotas.rollback(reservation).await {
            error!(
                reservation_id = %reservation.id,
                error = %e,
                "Quota rollback failed (reservation will expire)"
            );
        }
    }
}
