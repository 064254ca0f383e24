//! Sacrament record models
//!
//! Every record carries the ids of all of its ancestors (`Lineage`) so a
//! record can be rendered without walking the chain.

use serde::{Deserialize, Serialize};
use sqlx::types::chrono::{DateTime, NaiveDate, Utc};
use validator::{Validate, ValidationError};

use crate::lineage::SacramentKind;

/// Ancestor ids inherited from the predecessor at creation time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Lineage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub baptism_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub communion_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmation_id: Option<i64>,
}

impl Lineage {
    /// Id of the ancestor of the given kind, if this lineage has one
    pub fn id_of(&self, kind: SacramentKind) -> Option<i64> {
        match kind {
            SacramentKind::Baptism => self.baptism_id,
            SacramentKind::FirstHolyCommunion => self.communion_id,
            SacramentKind::Confirmation => self.confirmation_id,
            SacramentKind::Marriage | SacramentKind::HolyOrder => None,
        }
    }

    /// Lineage of a record whose predecessor is `predecessor`
    pub fn descend_from(predecessor: &SacramentRecord) -> Self {
        let mut lineage = predecessor.lineage;
        match predecessor.kind() {
            SacramentKind::Baptism => lineage.baptism_id = Some(predecessor.id),
            SacramentKind::FirstHolyCommunion => lineage.communion_id = Some(predecessor.id),
            SacramentKind::Confirmation => lineage.confirmation_id = Some(predecessor.id),
            // terminal kinds never act as predecessors
            SacramentKind::Marriage | SacramentKind::HolyOrder => {}
        }
        lineage
    }
}

fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("blank"));
    }
    Ok(())
}

/// Baptism fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct BaptismDetails {
    #[validate(custom = "not_blank", length(max = 255))]
    pub baptism_name: String,
    #[validate(custom = "not_blank", length(max = 255))]
    pub surname: String,
    #[validate(custom = "not_blank", length(max = 10))]
    pub gender: String,
    pub date_of_birth: NaiveDate,
    #[validate(custom = "not_blank", length(max = 255))]
    pub fathers_name: String,
    #[validate(custom = "not_blank", length(max = 255))]
    pub mothers_name: String,
    #[validate(custom = "not_blank", length(max = 255))]
    pub sponsor_names: String,
    #[serde(default)]
    pub parish_id: Option<i64>,
    #[serde(default)]
    #[validate(length(max = 500))]
    pub address: Option<String>,
    #[serde(default)]
    #[validate(length(max = 500))]
    pub parish_address: Option<String>,
    #[serde(default)]
    #[validate(length(max = 500))]
    pub parent_address: Option<String>,
}

/// First Holy Communion fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CommunionDetails {
    pub communion_date: NaiveDate,
    #[validate(custom = "not_blank", length(max = 255))]
    pub officiating_priest: String,
    #[validate(custom = "not_blank", length(max = 255))]
    pub parish: String,
}

/// Confirmation fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmationDetails {
    pub confirmation_date: NaiveDate,
    #[validate(custom = "not_blank", length(max = 255))]
    pub officiating_bishop: String,
    #[serde(default)]
    #[validate(length(max = 255))]
    pub parish: Option<String>,
}

/// Marriage fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct MarriageDetails {
    #[validate(custom = "not_blank", length(max = 255))]
    pub partners_name: String,
    pub marriage_date: NaiveDate,
    #[validate(custom = "not_blank", length(max = 255))]
    pub officiating_priest: String,
    #[validate(custom = "not_blank", length(max = 255))]
    pub parish: String,
}

/// Holy Order fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct HolyOrderDetails {
    pub ordination_date: NaiveDate,
    #[validate(custom = "not_blank", length(max = 20))]
    pub order_type: String,
    #[validate(custom = "not_blank", length(max = 255))]
    pub officiating_bishop: String,
    #[serde(default)]
    pub parish_id: Option<i64>,
}

/// Kind-specific fields of a sacrament record
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SacramentDetails {
    Baptism(BaptismDetails),
    FirstHolyCommunion(CommunionDetails),
    Confirmation(ConfirmationDetails),
    Marriage(MarriageDetails),
    HolyOrder(HolyOrderDetails),
}

impl SacramentDetails {
    pub fn kind(&self) -> SacramentKind {
        match self {
            SacramentDetails::Baptism(_) => SacramentKind::Baptism,
            SacramentDetails::FirstHolyCommunion(_) => SacramentKind::FirstHolyCommunion,
            SacramentDetails::Confirmation(_) => SacramentKind::Confirmation,
            SacramentDetails::Marriage(_) => SacramentKind::Marriage,
            SacramentDetails::HolyOrder(_) => SacramentKind::HolyOrder,
        }
    }

    pub fn validate(&self) -> Result<(), validator::ValidationErrors> {
        match self {
            SacramentDetails::Baptism(d) => d.validate(),
            SacramentDetails::FirstHolyCommunion(d) => d.validate(),
            SacramentDetails::Confirmation(d) => d.validate(),
            SacramentDetails::Marriage(d) => d.validate(),
            SacramentDetails::HolyOrder(d) => d.validate(),
        }
    }
}

/// A persisted sacrament record. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SacramentRecord {
    pub id: i64,
    #[serde(flatten)]
    pub lineage: Lineage,
    #[serde(flatten)]
    pub details: SacramentDetails,
    pub created_at: DateTime<Utc>,
}

impl SacramentRecord {
    pub fn kind(&self) -> SacramentKind {
        self.details.kind()
    }

    /// Id of the record this one was created against
    pub fn predecessor_id(&self) -> Option<i64> {
        self.kind()
            .rule()
            .predecessor
            .and_then(|kind| self.lineage.id_of(kind))
    }
}

/// Sacrament record to insert
#[derive(Debug, Clone)]
pub struct NewSacrament {
    pub lineage: Lineage,
    pub details: SacramentDetails,
}

/// A Baptism and whichever descendants have been recorded
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SacramentalHistory {
    pub baptism: SacramentRecord,
    pub first_holy_communion: Option<SacramentRecord>,
    pub confirmation: Option<SacramentRecord>,
    pub marriage: Option<SacramentRecord>,
    pub holy_order: Option<SacramentRecord>,
}

// ============================================================================
// Request DTOs
// ============================================================================

/// Creation request body for one sacrament kind
pub trait SacramentRequest {
    /// Split into the predecessor id (absent for Baptism) and the record fields
    fn into_parts(self) -> (Option<i64>, SacramentDetails);
}

impl SacramentRequest for BaptismDetails {
    fn into_parts(self) -> (Option<i64>, SacramentDetails) {
        (None, SacramentDetails::Baptism(self))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FirstHolyCommunionRequest {
    pub baptism_id: i64,
    #[serde(flatten)]
    pub details: CommunionDetails,
}

impl SacramentRequest for FirstHolyCommunionRequest {
    fn into_parts(self) -> (Option<i64>, SacramentDetails) {
        (
            Some(self.baptism_id),
            SacramentDetails::FirstHolyCommunion(self.details),
        )
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmationRequest {
    pub communion_id: i64,
    #[serde(flatten)]
    pub details: ConfirmationDetails,
}

impl SacramentRequest for ConfirmationRequest {
    fn into_parts(self) -> (Option<i64>, SacramentDetails) {
        (
            Some(self.communion_id),
            SacramentDetails::Confirmation(self.details),
        )
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarriageRequest {
    pub confirmation_id: i64,
    #[serde(flatten)]
    pub details: MarriageDetails,
}

impl SacramentRequest for MarriageRequest {
    fn into_parts(self) -> (Option<i64>, SacramentDetails) {
        (
            Some(self.confirmation_id),
            SacramentDetails::Marriage(self.details),
        )
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HolyOrderRequest {
    pub confirmation_id: i64,
    #[serde(flatten)]
    pub details: HolyOrderDetails,
}

impl SacramentRequest for HolyOrderRequest {
    fn into_parts(self) -> (Option<i64>, SacramentDetails) {
        (
            Some(self.confirmation_id),
            SacramentDetails::HolyOrder(self.details),
        )
    }
}
