//! App config entity - encrypted key/value settings.
//! Values are AES-GCM ciphertext with the nonce prepended; see `core::settings`.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Settings database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "app_config")]
pub struct Model {
    /// Setting name (e.g. `"SUPABASE_URL"`)
    #[sea_orm(primary_key, auto_increment = false)]
    pub key: String,
    /// Sealed value
    pub value: Vec<u8>,
    /// When the value was last written
    pub updated_at: DateTimeUtc,
}

/// `AppConfig` has no relationships with other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
