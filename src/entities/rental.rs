//! Rental entity - tenant records kept locally.
//!
//! `supabase_id` correlates a local row with its copy in the remote store.
//! Archiving sets `is_archived`; rows are only removed by an explicit delete.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Rental database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "rentals")]
pub struct Model {
    /// Unique identifier
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Remote correlation id (uuid), if the record was synced
    #[sea_orm(unique)]
    pub supabase_id: Option<String>,
    /// Tenant's name
    pub tenant_name: String,
    /// Room the tenant rents
    pub room_number: String,
    /// Advance payment received
    pub advanced_paid: f64,
    /// Tenant photo path or URL
    pub photo_path: Option<String>,
    /// National ID front image path or URL
    pub nid_front_path: Option<String>,
    /// National ID back image path or URL
    pub nid_back_path: Option<String>,
    /// Police verification form path or URL
    pub police_form_path: Option<String>,
    /// When the record was created
    pub created_at: DateTimeUtc,
    /// When the record was last modified
    pub updated_at: DateTimeUtc,
    /// Soft delete flag
    pub is_archived: bool,
}

/// Rentals have no relationships with other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
