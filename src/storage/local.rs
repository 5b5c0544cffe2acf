//! Local `SQLite` backend for calculations and tenant records.
//!
//! A save runs in one database transaction: the main row is upserted by
//! `(month, year)`, its rooms are deleted and the new rooms inserted in order.

use crate::{
    core::period::{BillingPeriod, Month},
    entities::{
        MainCalculation, Rental, RoomCalculation, main_calculation, rental, room_calculation,
    },
    errors::{Error, Result},
    models::{
        HistoryFilter, MainCalculationRecord, Page, PageRequest, RecordId, RentalDocuments,
        RentalDraft, RentalRecord, RoomRecord,
    },
    storage::{ArchiveFilter, Backend, CalculationStore, RentalStore},
};
use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    IntoActiveModel, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use std::collections::HashMap;
use tracing::{debug, info, instrument};

fn not_found(period: &BillingPeriod) -> Error {
    Error::not_found(format!("Calculation for {period}"))
}

/// Finds the main row for a period.
pub async fn find_main<C>(db: &C, period: &BillingPeriod) -> Result<Option<main_calculation::Model>>
where
    C: ConnectionTrait,
{
    MainCalculation::find()
        .filter(main_calculation::Column::Month.eq(period.month.name()))
        .filter(main_calculation::Column::Year.eq(period.year))
        .one(db)
        .await
        .map_err(Into::into)
}

fn room_rows(main_id: i64, rooms: &[RoomRecord]) -> Vec<room_calculation::ActiveModel> {
    rooms
        .iter()
        .enumerate()
        .map(|(position, room)| room_calculation::ActiveModel {
            main_calculation_id: Set(main_id),
            position: Set(i32::try_from(position).unwrap_or(i32::MAX)),
            room_name: Set(room.room_name.clone()),
            present_reading: Set(room.present_reading),
            previous_reading: Set(room.previous_reading),
            real_unit: Set(room.real_unit),
            unit_bill: Set(room.unit_bill),
            gas_bill: Set(room.gas_bill),
            water_bill: Set(room.water_bill),
            house_rent: Set(room.house_rent),
            grand_total: Set(room.grand_total),
            ..Default::default()
        })
        .collect()
}

/// Upserts a calculation and replaces its rooms inside one transaction.
pub async fn save_calculation(
    db: &DatabaseConnection,
    record: &MainCalculationRecord,
) -> Result<RecordId> {
    let meter_readings = serde_json::to_value(&record.meter_readings)?;
    let diff_readings = serde_json::to_value(&record.diff_readings)?;
    let now = Utc::now();

    let txn = db.begin().await?;

    let main = match find_main(&txn, &record.period).await? {
        Some(existing) => {
            let mut active = existing.into_active_model();
            active.meter_readings = Set(meter_readings);
            active.diff_readings = Set(diff_readings);
            active.additional_amount = Set(record.additional_amount);
            active.total_unit = Set(record.total_unit);
            active.total_diff = Set(record.total_diff);
            active.per_unit_cost = Set(record.per_unit_cost);
            active.grand_total = Set(record.grand_total);
            active.updated_at = Set(now);
            active.update(&txn).await?
        }
        None => {
            main_calculation::ActiveModel {
                month: Set(record.period.month.name().to_string()),
                year: Set(record.period.year),
                meter_readings: Set(meter_readings),
                diff_readings: Set(diff_readings),
                additional_amount: Set(record.additional_amount),
                total_unit: Set(record.total_unit),
                total_diff: Set(record.total_diff),
                per_unit_cost: Set(record.per_unit_cost),
                grand_total: Set(record.grand_total),
                created_at: Set(now),
                updated_at: Set(now),
                ..Default::default()
            }
            .insert(&txn)
            .await?
        }
    };

    let removed = RoomCalculation::delete_many()
        .filter(room_calculation::Column::MainCalculationId.eq(main.id))
        .exec(&txn)
        .await?
        .rows_affected;
    if !record.rooms.is_empty() {
        RoomCalculation::insert_many(room_rows(main.id, &record.rooms))
            .exec(&txn)
            .await?;
    }

    txn.commit().await?;
    debug!(
        "Saved {} with {} room(s), replaced {}",
        record.period,
        record.rooms.len(),
        removed
    );
    Ok(RecordId(main.id))
}

fn to_record(
    main: main_calculation::Model,
    rooms: Vec<room_calculation::Model>,
) -> Result<MainCalculationRecord> {
    let month: Month = main.month.parse()?;
    Ok(MainCalculationRecord {
        period: BillingPeriod::new(month, main.year)?,
        meter_readings: serde_json::from_value(main.meter_readings)?,
        diff_readings: serde_json::from_value(main.diff_readings)?,
        additional_amount: main.additional_amount,
        total_unit: main.total_unit,
        total_diff: main.total_diff,
        per_unit_cost: main.per_unit_cost,
        grand_total: main.grand_total,
        rooms: rooms
            .into_iter()
            .map(|room| RoomRecord {
                room_name: room.room_name,
                present_reading: room.present_reading,
                previous_reading: room.previous_reading,
                real_unit: room.real_unit,
                unit_bill: room.unit_bill,
                gas_bill: room.gas_bill,
                water_bill: room.water_bill,
                house_rent: room.house_rent,
                grand_total: room.grand_total,
            })
            .collect(),
    })
}

/// Loads rooms for several calculations in one query, grouped by parent id.
async fn rooms_by_parent(
    db: &DatabaseConnection,
    main_ids: Vec<i64>,
) -> Result<HashMap<i64, Vec<room_calculation::Model>>> {
    let rooms = RoomCalculation::find()
        .filter(room_calculation::Column::MainCalculationId.is_in(main_ids))
        .order_by_asc(room_calculation::Column::Position)
        .all(db)
        .await?;
    let mut grouped: HashMap<i64, Vec<room_calculation::Model>> = HashMap::new();
    for room in rooms {
        grouped.entry(room.main_calculation_id).or_default().push(room);
    }
    Ok(grouped)
}

/// Loads one calculation with its rooms.
pub async fn load_calculation(
    db: &DatabaseConnection,
    period: &BillingPeriod,
) -> Result<MainCalculationRecord> {
    let main = find_main(db, period)
        .await?
        .ok_or_else(|| not_found(period))?;
    let rooms = RoomCalculation::find()
        .filter(room_calculation::Column::MainCalculationId.eq(main.id))
        .order_by_asc(room_calculation::Column::Position)
        .all(db)
        .await?;
    to_record(main, rooms)
}

/// Deletes a calculation and its rooms.
pub async fn delete_calculation(db: &DatabaseConnection, period: &BillingPeriod) -> Result<()> {
    let txn = db.begin().await?;
    let main = find_main(&txn, period)
        .await?
        .ok_or_else(|| not_found(period))?;
    RoomCalculation::delete_many()
        .filter(room_calculation::Column::MainCalculationId.eq(main.id))
        .exec(&txn)
        .await?;
    MainCalculation::delete_by_id(main.id).exec(&txn).await?;
    txn.commit().await?;
    Ok(())
}

/// Lists calculations matching `filter`, most recently saved first.
///
/// One row beyond the page is fetched to tell whether another page exists.
pub async fn list_calculations(
    db: &DatabaseConnection,
    filter: &HistoryFilter,
    page: PageRequest,
) -> Result<Page<MainCalculationRecord>> {
    let mut query = MainCalculation::find();
    if let Some(month) = filter.month {
        query = query.filter(main_calculation::Column::Month.eq(month.name()));
    }
    if let Some(year) = filter.year {
        query = query.filter(main_calculation::Column::Year.eq(year));
    }
    let mut mains = query
        .order_by_desc(main_calculation::Column::UpdatedAt)
        .order_by_desc(main_calculation::Column::Id)
        .offset(page.offset)
        .limit(page.limit + 1)
        .all(db)
        .await?;

    let has_more = mains.len() as u64 > page.limit;
    mains.truncate(usize::try_from(page.limit).unwrap_or(usize::MAX));

    let mut rooms = rooms_by_parent(db, mains.iter().map(|m| m.id).collect()).await?;
    let items = mains
        .into_iter()
        .map(|main| {
            let children = rooms.remove(&main.id).unwrap_or_default();
            to_record(main, children)
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(Page {
        items,
        request: page,
        has_more,
    })
}

/// Calculation store over the local database.
#[derive(Debug, Clone)]
pub struct LocalStore {
    db: DatabaseConnection,
}

impl LocalStore {
    /// Wraps an open connection. Tables must already exist.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CalculationStore for LocalStore {
    fn backend(&self) -> Backend {
        Backend::Local
    }

    #[instrument(skip(self, record), fields(period = %record.period))]
    async fn save(&self, record: &MainCalculationRecord) -> Result<RecordId> {
        let id = save_calculation(&self.db, record).await?;
        info!("Saved calculation to local database as id {}", id.0);
        Ok(id)
    }

    async fn load(&self, period: &BillingPeriod) -> Result<MainCalculationRecord> {
        load_calculation(&self.db, period).await
    }

    #[instrument(skip(self))]
    async fn delete(&self, period: &BillingPeriod) -> Result<()> {
        delete_calculation(&self.db, period).await
    }

    async fn list(
        &self,
        filter: &HistoryFilter,
        page: PageRequest,
    ) -> Result<Page<MainCalculationRecord>> {
        list_calculations(&self.db, filter, page).await
    }
}

impl From<rental::Model> for RentalRecord {
    fn from(model: rental::Model) -> Self {
        Self {
            id: model.id,
            remote_id: model.supabase_id,
            tenant_name: model.tenant_name,
            room_number: model.room_number,
            advanced_paid: model.advanced_paid,
            documents: RentalDocuments {
                photo: model.photo_path,
                nid_front: model.nid_front_path,
                nid_back: model.nid_back_path,
                police_form: model.police_form_path,
            },
            created_at: model.created_at,
            updated_at: model.updated_at,
            is_archived: model.is_archived,
        }
    }
}

fn rental_not_found(id: i64) -> Error {
    Error::not_found(format!("Rental record {id}"))
}

/// Tenant records in the local `rentals` table.
#[derive(Debug, Clone)]
pub struct LocalRentalStore {
    db: DatabaseConnection,
}

impl LocalRentalStore {
    /// Wraps an open connection. Tables must already exist.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    async fn find(&self, id: i64) -> Result<rental::Model> {
        Rental::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or_else(|| rental_not_found(id))
    }

    /// Records the remote correlation id after a successful remote save.
    pub async fn link_remote(&self, id: i64, remote_id: &str) -> Result<RentalRecord> {
        let mut active = self.find(id).await?.into_active_model();
        active.supabase_id = Set(Some(remote_id.to_string()));
        Ok(active.update(&self.db).await?.into())
    }

    /// Finds a record by its remote correlation id.
    pub async fn find_by_remote_id(&self, remote_id: &str) -> Result<Option<RentalRecord>> {
        Ok(Rental::find()
            .filter(rental::Column::SupabaseId.eq(remote_id))
            .one(&self.db)
            .await?
            .map(Into::into))
    }
}

#[async_trait]
impl RentalStore for LocalRentalStore {
    fn backend(&self) -> Backend {
        Backend::Local
    }

    #[instrument(skip(self, draft))]
    async fn create(&self, draft: RentalDraft) -> Result<RentalRecord> {
        let draft = draft.validated()?;
        let now = Utc::now();
        let model = rental::ActiveModel {
            supabase_id: Set(None),
            tenant_name: Set(draft.tenant_name),
            room_number: Set(draft.room_number),
            advanced_paid: Set(draft.advanced_paid),
            photo_path: Set(draft.documents.photo),
            nid_front_path: Set(draft.documents.nid_front),
            nid_back_path: Set(draft.documents.nid_back),
            police_form_path: Set(draft.documents.police_form),
            created_at: Set(now),
            updated_at: Set(now),
            is_archived: Set(false),
            ..Default::default()
        }
        .insert(&self.db)
        .await?;
        info!("Created rental record {} for room {}", model.id, model.room_number);
        Ok(model.into())
    }

    #[instrument(skip(self, draft))]
    async fn update(&self, id: i64, draft: RentalDraft) -> Result<RentalRecord> {
        let draft = draft.validated()?;
        let mut active = self.find(id).await?.into_active_model();
        active.tenant_name = Set(draft.tenant_name);
        active.room_number = Set(draft.room_number);
        active.advanced_paid = Set(draft.advanced_paid);
        active.photo_path = Set(draft.documents.photo);
        active.nid_front_path = Set(draft.documents.nid_front);
        active.nid_back_path = Set(draft.documents.nid_back);
        active.police_form_path = Set(draft.documents.police_form);
        active.updated_at = Set(Utc::now());
        Ok(active.update(&self.db).await?.into())
    }

    #[instrument(skip(self))]
    async fn set_archived(&self, id: i64, archived: bool) -> Result<()> {
        let mut active = self.find(id).await?.into_active_model();
        active.is_archived = Set(archived);
        active.updated_at = Set(Utc::now());
        active.update(&self.db).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: i64) -> Result<()> {
        let result = Rental::delete_by_id(id).exec(&self.db).await?;
        if result.rows_affected == 0 {
            return Err(rental_not_found(id));
        }
        Ok(())
    }

    async fn get(&self, id: i64) -> Result<RentalRecord> {
        self.find(id).await.map(Into::into)
    }

    async fn list(&self, filter: ArchiveFilter, page: PageRequest) -> Result<Page<RentalRecord>> {
        let mut query = Rental::find();
        if let Some(archived) = filter.archived_flag() {
            query = query.filter(rental::Column::IsArchived.eq(archived));
        }
        let mut rows = query
            .order_by_desc(rental::Column::UpdatedAt)
            .order_by_desc(rental::Column::Id)
            .offset(page.offset)
            .limit(page.limit + 1)
            .all(&self.db)
            .await?;
        let has_more = rows.len() as u64 > page.limit;
        rows.truncate(usize::try_from(page.limit).unwrap_or(usize::MAX));
        Ok(Page {
            items: rows.into_iter().map(Into::into).collect(),
            request: page,
            has_more,
        })
    }
}
