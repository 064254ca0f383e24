//! Sacrament registry
//!
//! Creates sacrament records while keeping the lineage one-to-one and the
//! terminal kinds mutually exclusive. The predecessor row is locked before
//! any successor check, so two creations against the same predecessor are
//! serialised by the store even when they target different tables.

use std::sync::Arc;
use thiserror::Error;
use validator::ValidationErrors;

use crate::models::{Lineage, NewSacrament, SacramentDetails, SacramentRecord, SacramentalHistory};
use crate::store::{SacramentRepo, Store, StoreError, StoreTx};

use super::kind::SacramentKind;

/// Lineage errors
#[derive(Error, Debug)]
pub enum LineageError {
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationErrors),

    #[error("{0}")]
    InvalidReference(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: SacramentKind, id: i64 },

    #[error("{kind} already exists for this {}", .predecessor.label().to_lowercase())]
    AlreadyRecorded {
        kind: SacramentKind,
        predecessor: SacramentKind,
        predecessor_id: i64,
    },

    #[error("Cannot receive {kind}: person has already received {existing}")]
    MutuallyExclusive {
        kind: SacramentKind,
        existing: SacramentKind,
        predecessor_id: i64,
    },

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),
}

/// Sacrament registry service
pub struct SacramentRegistry {
    store: Arc<dyn Store>,
}

impl SacramentRegistry {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Create a record of `details.kind()` against `predecessor_id`.
    ///
    /// Baptisms take no predecessor; every other kind requires one.
    pub async fn create(
        &self,
        predecessor_id: Option<i64>,
        details: SacramentDetails,
    ) -> Result<SacramentRecord, LineageError> {
        details.validate()?;

        let kind = details.kind();
        let rule = kind.rule();

        let mut tx = self.store.begin().await?;

        let lineage = match (rule.predecessor, predecessor_id) {
            (None, None) => Lineage::default(),
            (None, Some(_)) => {
                return Err(LineageError::InvalidReference(format!(
                    "{kind} does not take a predecessor"
                )))
            }
            (Some(predecessor), None) => {
                return Err(LineageError::InvalidReference(format!(
                    "{kind} requires a {predecessor} id"
                )))
            }
            (Some(predecessor), Some(predecessor_id)) => {
                let parent = tx
                    .lock_sacrament(predecessor, predecessor_id)
                    .await?
                    .ok_or(LineageError::NotFound {
                        kind: predecessor,
                        id: predecessor_id,
                    })?;

                ensure_vacant(&mut tx, kind, predecessor, predecessor_id).await?;
                Lineage::descend_from(&parent)
            }
        };

        let record = tx
            .insert_sacrament(NewSacrament { lineage, details })
            .await
            .map_err(|e| match (e, rule.predecessor, predecessor_id) {
                (StoreError::UniqueViolation(_), Some(predecessor), Some(predecessor_id)) => {
                    LineageError::AlreadyRecorded {
                        kind,
                        predecessor,
                        predecessor_id,
                    }
                }
                (other, _, _) => LineageError::Storage(other),
            })?;

        tx.commit().await?;

        tracing::info!(
            kind = ?kind,
            id = record.id,
            predecessor_id = ?predecessor_id,
            "Sacrament recorded"
        );
        Ok(record)
    }

    pub async fn get(&self, kind: SacramentKind, id: i64) -> Result<SacramentRecord, LineageError> {
        let mut tx = self.store.begin().await?;
        tx.find_sacrament(kind, id)
            .await?
            .ok_or(LineageError::NotFound { kind, id })
    }

    /// The baptism and every record descended from it
    pub async fn history(&self, baptism_id: i64) -> Result<SacramentalHistory, LineageError> {
        let mut tx = self.store.begin().await?;

        let baptism = tx
            .find_sacrament(SacramentKind::Baptism, baptism_id)
            .await?
            .ok_or(LineageError::NotFound {
                kind: SacramentKind::Baptism,
                id: baptism_id,
            })?;

        let first_holy_communion = tx
            .find_successor(SacramentKind::FirstHolyCommunion, baptism_id)
            .await?;

        let confirmation = match &first_holy_communion {
            Some(communion) => {
                tx.find_successor(SacramentKind::Confirmation, communion.id)
                    .await?
            }
            None => None,
        };

        let (marriage, holy_order) = match &confirmation {
            Some(confirmation) => (
                tx.find_successor(SacramentKind::Marriage, confirmation.id)
                    .await?,
                tx.find_successor(SacramentKind::HolyOrder, confirmation.id)
                    .await?,
            ),
            None => (None, None),
        };

        Ok(SacramentalHistory {
            baptism,
            first_holy_communion,
            confirmation,
            marriage,
            holy_order,
        })
    }
}

/// Reject a second record of `kind` or of its excluded kind against the
/// same predecessor
async fn ensure_vacant(
    tx: &mut Box<dyn StoreTx>,
    kind: SacramentKind,
    predecessor: SacramentKind,
    predecessor_id: i64,
) -> Result<(), LineageError> {
    if tx.find_successor(kind, predecessor_id).await?.is_some() {
        return Err(LineageError::AlreadyRecorded {
            kind,
            predecessor,
            predecessor_id,
        });
    }

    if let Some(existing) = kind.rule().excludes {
        if tx.find_successor(existing, predecessor_id).await?.is_some() {
            return Err(LineageError::MutuallyExclusive {
                kind,
                existing,
                predecessor_id,
            });
        }
    }

    Ok(())
}
