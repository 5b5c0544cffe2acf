//! Remote table store backend.
//!
//! Talks to a PostgREST-style API (`/rest/v1/<table>`) and its object storage
//! (`/storage/v1/object/<bucket>/<path>`). Every request carries the API key as
//! both `apikey` and bearer token. A non-success status becomes
//! [`Error::RemoteApi`] with the response body as message.

use crate::{
    config::app::RemoteConfig,
    core::{
        period::{BillingPeriod, Month},
        settings::RemoteCredentials,
    },
    errors::{Error, Result},
    models::{
        HistoryFilter, MainCalculationRecord, Page, PageRequest, RecordId, RentalDocuments,
        RentalDraft, RentalRecord, RoomRecord,
    },
    storage::{ArchiveFilter, Backend, CalculationStore, RentalStore},
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::{Method, RequestBuilder, Response};
use serde::{Deserialize, Deserializer, Serialize, de::DeserializeOwned};
use std::{collections::HashMap, path::Path};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

const MAIN_TABLE: &str = "main_calculations";
const ROOM_TABLE: &str = "room_calculations";
const RENTAL_TABLE: &str = "rental_records";

type Query = Vec<(&'static str, String)>;

fn eq(value: impl std::fmt::Display) -> String {
    format!("eq.{value}")
}

fn in_list(ids: &[i64]) -> String {
    let ids: Vec<String> = ids.iter().map(ToString::to_string).collect();
    format!("in.({})", ids.join(","))
}

/// Thin REST client for the remote tables and bucket.
#[derive(Clone)]
pub struct RemoteClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    storage: RemoteConfig,
}

impl std::fmt::Debug for RemoteClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteClient")
            .field("base_url", &self.base_url)
            .field("storage", &self.storage)
            .finish_non_exhaustive()
    }
}

impl RemoteClient {
    /// Creates a client for the given project.
    #[must_use]
    pub fn new(credentials: &RemoteCredentials, storage: RemoteConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: credentials.url.trim_end_matches('/').to_string(),
            api_key: credentials.api_key.clone(),
            storage,
        }
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.http
            .request(method, url)
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{table}", self.base_url)
    }

    async fn check(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        warn!("Remote store answered {}: {}", status, message);
        Err(Error::RemoteApi {
            status: status.as_u16(),
            message,
        })
    }

    /// `GET /rest/v1/<table>?<query>`
    pub async fn select<T: DeserializeOwned>(&self, table: &str, query: &Query) -> Result<Vec<T>> {
        let response = self
            .request(Method::GET, &self.table_url(table))
            .query(query)
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    /// `POST /rest/v1/<table>` returning the inserted rows.
    pub async fn insert<B, T>(&self, table: &str, body: &B) -> Result<Vec<T>>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let response = self
            .request(Method::POST, &self.table_url(table))
            .header("Prefer", "return=representation")
            .json(body)
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    /// `PATCH /rest/v1/<table>?<filters>` returning the updated rows.
    pub async fn update<B, T>(&self, table: &str, filters: &Query, body: &B) -> Result<Vec<T>>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let response = self
            .request(Method::PATCH, &self.table_url(table))
            .header("Prefer", "return=representation")
            .query(filters)
            .json(body)
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    /// `DELETE /rest/v1/<table>?<filters>` returning the ids of deleted rows.
    pub async fn delete(&self, table: &str, filters: &Query) -> Result<Vec<i64>> {
        let mut query = filters.clone();
        query.push(("select", "id".to_string()));
        let response = self
            .request(Method::DELETE, &self.table_url(table))
            .header("Prefer", "return=representation")
            .query(&query)
            .send()
            .await?;
        let rows: Vec<IdRow> = Self::check(response).await?.json().await?;
        Ok(rows.into_iter().map(|r| r.id).collect())
    }

    /// Uploads a local image (overwriting any object at the same path) and returns its
    /// public URL.
    #[instrument(skip(self))]
    pub async fn upload_image(&self, local_path: &Path) -> Result<String> {
        let file_name = local_path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                Error::invalid_input(format!("Not an image file: {}", local_path.display()))
            })?;
        let bytes = tokio::fs::read(local_path).await?;
        let object = format!("{}/{}-{file_name}", self.storage.folder, Uuid::new_v4());
        let url = format!(
            "{}/storage/v1/object/{}/{object}",
            self.base_url, self.storage.bucket
        );

        let response = self
            .request(Method::POST, &url)
            .header("x-upsert", "true")
            .header("Content-Type", content_type(local_path))
            .body(bytes)
            .send()
            .await?;
        Self::check(response).await?;

        debug!("Uploaded {} as {}", local_path.display(), object);
        Ok(format!(
            "{}/storage/v1/object/public/{}/{object}",
            self.base_url, self.storage.bucket
        ))
    }

    /// Resolves each document slot to a URL, uploading local files.
    ///
    /// Values that already start with `http` are kept. A local path that does not
    /// exist fails the whole operation before anything is uploaded.
    pub async fn upload_documents(&self, documents: &RentalDocuments) -> Result<RentalDocuments> {
        for (slot, value) in documents.slots() {
            if let Some(path) = value.filter(|v| !is_url(v)) {
                let is_file = tokio::fs::metadata(path)
                    .await
                    .is_ok_and(|meta| meta.is_file());
                if !is_file {
                    return Err(Error::invalid_input(format!(
                        "Image for {slot} not found: {path}"
                    )));
                }
            }
        }

        let mut resolved = RentalDocuments::default();
        for (slot, value) in documents.slots() {
            let url = match value {
                None => None,
                Some(v) if is_url(v) => Some(v.to_string()),
                Some(path) => Some(self.upload_image(Path::new(path)).await?),
            };
            match slot {
                "photo" => resolved.photo = url,
                "nid_front" => resolved.nid_front = url,
                "nid_back" => resolved.nid_back = url,
                _ => resolved.police_form = url,
            }
        }
        Ok(resolved)
    }
}

fn is_url(value: &str) -> bool {
    value
        .get(..4)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("http"))
}

fn content_type(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("pdf") => "application/pdf",
        _ => "image/jpeg",
    }
}

/// Accepts RFC 3339 timestamps and naive ISO timestamps (read as UTC).
fn timestamp<'de, D>(deserializer: D) -> std::result::Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let text = String::deserialize(deserializer)?;
    DateTime::parse_from_rfc3339(&text)
        .map(|t| t.with_timezone(&Utc))
        .or_else(|_| {
            NaiveDateTime::parse_from_str(&text, "%Y-%m-%dT%H:%M:%S%.f").map(|n| n.and_utc())
        })
        .map_err(serde::de::Error::custom)
}

#[derive(Debug, Deserialize)]
struct IdRow {
    id: i64,
}

/// A reading stored either as an integer or as a whole-valued float (`120.0`).
#[derive(Deserialize)]
#[serde(untagged)]
enum WholeNumber {
    Int(i64),
    Float(f64),
}

impl WholeNumber {
    #[allow(clippy::cast_possible_truncation)]
    fn into_i64<E: serde::de::Error>(self) -> std::result::Result<i64, E> {
        match self {
            Self::Int(n) => Ok(n),
            Self::Float(f) if f.is_finite() && f.fract() == 0.0 && f.abs() < 9.0e15 => {
                Ok(f as i64)
            }
            Self::Float(f) => Err(E::custom(format!("expected a whole number, got {f}"))),
        }
    }
}

fn whole_number<'de, D>(deserializer: D) -> std::result::Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    WholeNumber::deserialize(deserializer)?.into_i64()
}

fn whole_numbers<'de, D>(deserializer: D) -> std::result::Result<Vec<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    Vec::<WholeNumber>::deserialize(deserializer)?
        .into_iter()
        .map(WholeNumber::into_i64)
        .collect()
}

/// JSON payload of the `main_data` column, keyed the way the desktop history view
/// reads it.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct MainData {
    #[serde(deserialize_with = "whole_numbers")]
    meter_readings: Vec<i64>,
    #[serde(deserialize_with = "whole_numbers")]
    diff_readings: Vec<i64>,
    #[serde(alias = "added_amount", default)]
    additional_amount: f64,
    #[serde(rename = "total_unit_cost", alias = "total_unit")]
    total_unit: f64,
    #[serde(rename = "total_diff_units", alias = "total_diff")]
    total_diff: f64,
    per_unit_cost: f64,
    grand_total: f64,
}

impl From<&MainCalculationRecord> for MainData {
    fn from(record: &MainCalculationRecord) -> Self {
        Self {
            meter_readings: record.meter_readings.clone(),
            diff_readings: record.diff_readings.clone(),
            additional_amount: record.additional_amount,
            total_unit: record.total_unit,
            total_diff: record.total_diff,
            per_unit_cost: record.per_unit_cost,
            grand_total: record.grand_total,
        }
    }
}

/// JSON payload of the `room_data` column.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RoomData {
    room_name: String,
    #[serde(alias = "present_reading", deserialize_with = "whole_number")]
    present_unit: i64,
    #[serde(alias = "previous_reading", deserialize_with = "whole_number")]
    previous_unit: i64,
    #[serde(deserialize_with = "whole_number")]
    real_unit: i64,
    unit_bill: f64,
    gas_bill: f64,
    water_bill: f64,
    house_rent: f64,
    grand_total: f64,
}

impl From<&RoomRecord> for RoomData {
    fn from(room: &RoomRecord) -> Self {
        Self {
            room_name: room.room_name.clone(),
            present_unit: room.present_reading,
            previous_unit: room.previous_reading,
            real_unit: room.real_unit,
            unit_bill: room.unit_bill,
            gas_bill: room.gas_bill,
            water_bill: room.water_bill,
            house_rent: room.house_rent,
            grand_total: room.grand_total,
        }
    }
}

impl From<RoomData> for RoomRecord {
    fn from(data: RoomData) -> Self {
        Self {
            room_name: data.room_name,
            present_reading: data.present_unit,
            previous_reading: data.previous_unit,
            real_unit: data.real_unit,
            unit_bill: data.unit_bill,
            gas_bill: data.gas_bill,
            water_bill: data.water_bill,
            house_rent: data.house_rent,
            grand_total: data.grand_total,
        }
    }
}

#[derive(Debug, Serialize)]
struct MainWrite<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    month: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    year: Option<i32>,
    main_data: MainData,
    #[serde(skip_serializing_if = "Option::is_none")]
    created_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct MainRow {
    id: i64,
    month: String,
    year: i32,
    main_data: MainData,
}

#[derive(Debug, Serialize)]
struct RoomWrite {
    main_calculation_id: i64,
    room_data: RoomData,
    photo_url: Option<String>,
    nid_front_url: Option<String>,
    nid_back_url: Option<String>,
    police_form_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RoomRow {
    main_calculation_id: i64,
    room_data: RoomData,
}

fn to_record(main: MainRow, rooms: Vec<RoomRecord>) -> Result<MainCalculationRecord> {
    let month: Month = main.month.parse()?;
    let data = main.main_data;
    Ok(MainCalculationRecord {
        period: BillingPeriod::new(month, main.year)?,
        meter_readings: data.meter_readings,
        diff_readings: data.diff_readings,
        additional_amount: data.additional_amount,
        total_unit: data.total_unit,
        total_diff: data.total_diff,
        per_unit_cost: data.per_unit_cost,
        grand_total: data.grand_total,
        rooms,
    })
}

fn period_query(period: &BillingPeriod) -> Query {
    vec![
        ("month", eq(period.month.name())),
        ("year", eq(period.year)),
    ]
}

fn not_found(period: &BillingPeriod) -> Error {
    Error::not_found(format!("Calculation for {period}"))
}

/// Calculation store over the remote tables.
#[derive(Debug, Clone)]
pub struct RemoteStore {
    client: RemoteClient,
}

impl RemoteStore {
    /// Wraps a configured client.
    #[must_use]
    pub const fn new(client: RemoteClient) -> Self {
        Self { client }
    }

    async fn find_id(&self, period: &BillingPeriod) -> Result<Option<i64>> {
        let mut query = period_query(period);
        query.push(("select", "id".to_string()));
        query.push(("limit", "1".to_string()));
        let rows: Vec<IdRow> = self.client.select(MAIN_TABLE, &query).await?;
        Ok(rows.first().map(|r| r.id))
    }

    async fn room_ids(&self, main_id: i64) -> Result<Vec<i64>> {
        let rows: Vec<IdRow> = self
            .client
            .select(
                ROOM_TABLE,
                &vec![
                    ("select", "id".to_string()),
                    ("main_calculation_id", eq(main_id)),
                ],
            )
            .await?;
        Ok(rows.into_iter().map(|r| r.id).collect())
    }

    async fn rooms_for(&self, main_ids: &[i64]) -> Result<HashMap<i64, Vec<RoomRecord>>> {
        if main_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows: Vec<RoomRow> = self
            .client
            .select(
                ROOM_TABLE,
                &vec![
                    ("select", "main_calculation_id,room_data".to_string()),
                    ("main_calculation_id", in_list(main_ids)),
                    ("order", "id.asc".to_string()),
                ],
            )
            .await?;
        let mut grouped: HashMap<i64, Vec<RoomRecord>> = HashMap::new();
        for row in rows {
            grouped
                .entry(row.main_calculation_id)
                .or_default()
                .push(row.room_data.into());
        }
        Ok(grouped)
    }

    /// Inserts the new rooms, then removes the previous ones. A failed removal leaves
    /// stale rooms behind but does not fail the save.
    async fn replace_rooms(&self, main_id: i64, rooms: &[RoomRecord]) -> Result<()> {
        let old_ids = self.room_ids(main_id).await?;

        if !rooms.is_empty() {
            let rows: Vec<RoomWrite> = rooms
                .iter()
                .map(|room| RoomWrite {
                    main_calculation_id: main_id,
                    room_data: room.into(),
                    photo_url: None,
                    nid_front_url: None,
                    nid_back_url: None,
                    police_form_url: None,
                })
                .collect();
            let _: Vec<IdRow> = self.client.insert(ROOM_TABLE, &rows).await?;
        }

        if !old_ids.is_empty() {
            if let Err(e) = self
                .client
                .delete(ROOM_TABLE, &vec![("id", in_list(&old_ids))])
                .await
            {
                warn!(
                    "Failed to remove {} old room(s) of calculation {}: {}",
                    old_ids.len(),
                    main_id,
                    e
                );
            }
        }
        Ok(())
    }
}

#[async_trait]
impl CalculationStore for RemoteStore {
    fn backend(&self) -> Backend {
        Backend::Remote
    }

    #[instrument(skip(self, record), fields(period = %record.period))]
    async fn save(&self, record: &MainCalculationRecord) -> Result<RecordId> {
        let now = Utc::now();
        let main_id = match self.find_id(&record.period).await? {
            Some(id) => {
                let body = MainWrite {
                    month: None,
                    year: None,
                    main_data: record.into(),
                    created_at: None,
                    updated_at: now,
                };
                let _: Vec<IdRow> = self
                    .client
                    .update(MAIN_TABLE, &vec![("id", eq(id))], &body)
                    .await?;
                id
            }
            None => {
                let body = MainWrite {
                    month: Some(record.period.month.name()),
                    year: Some(record.period.year),
                    main_data: record.into(),
                    created_at: Some(now),
                    updated_at: now,
                };
                let rows: Vec<IdRow> = self.client.insert(MAIN_TABLE, &body).await?;
                rows.first().map(|r| r.id).ok_or_else(|| Error::RemoteApi {
                    status: 200,
                    message: "Insert returned no row".to_string(),
                })?
            }
        };

        self.replace_rooms(main_id, &record.rooms).await?;
        info!("Saved calculation to remote store as id {}", main_id);
        Ok(RecordId(main_id))
    }

    async fn load(&self, period: &BillingPeriod) -> Result<MainCalculationRecord> {
        let mut query = period_query(period);
        query.push(("select", "id,month,year,main_data".to_string()));
        query.push(("limit", "1".to_string()));
        let main = self
            .client
            .select::<MainRow>(MAIN_TABLE, &query)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| not_found(period))?;
        let rooms = self.rooms_for(&[main.id]).await?.remove(&main.id);
        to_record(main, rooms.unwrap_or_default())
    }

    #[instrument(skip(self))]
    async fn delete(&self, period: &BillingPeriod) -> Result<()> {
        let id = self.find_id(period).await?.ok_or_else(|| not_found(period))?;
        self.client
            .delete(ROOM_TABLE, &vec![("main_calculation_id", eq(id))])
            .await?;
        self.client.delete(MAIN_TABLE, &vec![("id", eq(id))]).await?;
        Ok(())
    }

    async fn list(
        &self,
        filter: &HistoryFilter,
        page: PageRequest,
    ) -> Result<Page<MainCalculationRecord>> {
        let mut query: Query = vec![("select", "id,month,year,main_data".to_string())];
        if let Some(month) = filter.month {
            query.push(("month", eq(month.name())));
        }
        if let Some(year) = filter.year {
            query.push(("year", eq(year)));
        }
        query.push(("order", "updated_at.desc".to_string()));
        query.push(("limit", (page.limit + 1).to_string()));
        query.push(("offset", page.offset.to_string()));

        let mut mains: Vec<MainRow> = self.client.select(MAIN_TABLE, &query).await?;
        let has_more = mains.len() as u64 > page.limit;
        mains.truncate(usize::try_from(page.limit).unwrap_or(usize::MAX));

        let ids: Vec<i64> = mains.iter().map(|m| m.id).collect();
        let mut rooms = self.rooms_for(&ids).await?;
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
}

#[derive(Debug, Serialize)]
struct RentalWrite<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    supabase_id: Option<String>,
    tenant_name: &'a str,
    room_number: &'a str,
    advanced_paid: f64,
    photo_url: Option<String>,
    nid_front_url: Option<String>,
    nid_back_url: Option<String>,
    police_form_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    is_archived: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    created_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

impl<'a> RentalWrite<'a> {
    fn new(draft: &'a RentalDraft, documents: RentalDocuments, now: DateTime<Utc>) -> Self {
        Self {
            supabase_id: None,
            tenant_name: &draft.tenant_name,
            room_number: &draft.room_number,
            advanced_paid: draft.advanced_paid,
            photo_url: documents.photo,
            nid_front_url: documents.nid_front,
            nid_back_url: documents.nid_back,
            police_form_url: documents.police_form,
            is_archived: None,
            created_at: None,
            updated_at: now,
        }
    }
}

#[derive(Debug, Serialize)]
struct ArchiveWrite {
    is_archived: bool,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct RentalRow {
    id: i64,
    supabase_id: Option<String>,
    tenant_name: String,
    room_number: String,
    advanced_paid: f64,
    photo_url: Option<String>,
    nid_front_url: Option<String>,
    nid_back_url: Option<String>,
    police_form_url: Option<String>,
    #[serde(default)]
    is_archived: bool,
    #[serde(deserialize_with = "timestamp")]
    created_at: DateTime<Utc>,
    #[serde(deserialize_with = "timestamp")]
    updated_at: DateTime<Utc>,
}

impl From<RentalRow> for RentalRecord {
    fn from(row: RentalRow) -> Self {
        Self {
            id: row.id,
            remote_id: row.supabase_id,
            tenant_name: row.tenant_name,
            room_number: row.room_number,
            advanced_paid: row.advanced_paid,
            documents: RentalDocuments {
                photo: row.photo_url,
                nid_front: row.nid_front_url,
                nid_back: row.nid_back_url,
                police_form: row.police_form_url,
            },
            created_at: row.created_at,
            updated_at: row.updated_at,
            is_archived: row.is_archived,
        }
    }
}

fn rental_not_found(id: i64) -> Error {
    Error::not_found(format!("Rental record {id}"))
}

fn first_rental(rows: Vec<RentalRow>, id: i64) -> Result<RentalRecord> {
    rows.into_iter()
        .next()
        .map(Into::into)
        .ok_or_else(|| rental_not_found(id))
}

/// Tenant records in the remote `rental_records` table.
#[derive(Debug, Clone)]
pub struct RemoteRentalStore {
    client: RemoteClient,
}

impl RemoteRentalStore {
    /// Wraps a configured client.
    #[must_use]
    pub const fn new(client: RemoteClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RentalStore for RemoteRentalStore {
    fn backend(&self) -> Backend {
        Backend::Remote
    }

    #[instrument(skip(self, draft))]
    async fn create(&self, draft: RentalDraft) -> Result<RentalRecord> {
        let draft = draft.validated()?;
        let documents = self.client.upload_documents(&draft.documents).await?;
        let now = Utc::now();
        let body = RentalWrite {
            supabase_id: Some(Uuid::new_v4().to_string()),
            is_archived: Some(false),
            created_at: Some(now),
            ..RentalWrite::new(&draft, documents, now)
        };
        let rows: Vec<RentalRow> = self.client.insert(RENTAL_TABLE, &body).await?;
        let record = rows.into_iter().next().map(RentalRecord::from).ok_or_else(|| {
            Error::RemoteApi {
                status: 200,
                message: "Insert returned no row".to_string(),
            }
        })?;
        info!("Created remote rental record {}", record.id);
        Ok(record)
    }

    #[instrument(skip(self, draft))]
    async fn update(&self, id: i64, draft: RentalDraft) -> Result<RentalRecord> {
        let draft = draft.validated()?;
        let documents = self.client.upload_documents(&draft.documents).await?;
        let body = RentalWrite::new(&draft, documents, Utc::now());
        let rows = self
            .client
            .update(RENTAL_TABLE, &vec![("id", eq(id))], &body)
            .await?;
        first_rental(rows, id)
    }

    #[instrument(skip(self))]
    async fn set_archived(&self, id: i64, archived: bool) -> Result<()> {
        let body = ArchiveWrite {
            is_archived: archived,
            updated_at: Utc::now(),
        };
        let rows = self
            .client
            .update(RENTAL_TABLE, &vec![("id", eq(id))], &body)
            .await?;
        first_rental(rows, id).map(|_| ())
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: i64) -> Result<()> {
        let deleted = self
            .client
            .delete(RENTAL_TABLE, &vec![("id", eq(id))])
            .await?;
        if deleted.is_empty() {
            return Err(rental_not_found(id));
        }
        Ok(())
    }

    async fn get(&self, id: i64) -> Result<RentalRecord> {
        let rows = self
            .client
            .select(RENTAL_TABLE, &vec![("id", eq(id)), ("limit", "1".to_string())])
            .await?;
        first_rental(rows, id)
    }

    async fn list(&self, filter: ArchiveFilter, page: PageRequest) -> Result<Page<RentalRecord>> {
        let mut query: Query = Vec::new();
        if let Some(archived) = filter.archived_flag() {
            query.push(("is_archived", eq(archived)));
        }
        query.push(("order", "updated_at.desc".to_string()));
        query.push(("limit", (page.limit + 1).to_string()));
        query.push(("offset", page.offset.to_string()));

        let mut rows: Vec<RentalRow> = self.client.select(RENTAL_TABLE, &query).await?;
        let has_more = rows.len() as u64 > page.limit;
        rows.truncate(usize::try_from(page.limit).unwrap_or(usize::MAX));
        Ok(Page {
            items: rows.into_iter().map(Into::into).collect(),
            request: page,
            has_more,
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::float_cmp)]
    use super::*;
    use crate::test_utils::{init_test_tracing, sample_draft, sample_record};
    use serde_json::json;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{body_partial_json, header, method, path, path_regex, query_param},
    };

    fn client(server: &MockServer) -> RemoteClient {
        init_test_tracing();
        RemoteClient::new(
            &RemoteCredentials {
                url: server.uri(),
                api_key: "test-key".to_string(),
            },
            RemoteConfig::default(),
        )
    }

    fn main_row(id: i64, month: &str, year: i32) -> serde_json::Value {
        let record = sample_record(month.parse().unwrap(), year);
        json!({
            "id": id,
            "month": month,
            "year": year,
            "main_data": MainData::from(&record),
        })
    }

    fn room_rows(main_id: i64) -> serde_json::Value {
        let record = sample_record(Month::June, 2025);
        json!(
            record
                .rooms
                .iter()
                .map(|room| {
                    json!({"main_calculation_id": main_id, "room_data": RoomData::from(room)})
                })
                .collect::<Vec<_>>()
        )
    }

    fn rental_row(id: i64, name: &str) -> serde_json::Value {
        json!({
            "id": id,
            "supabase_id": "3f1c0e6a-0000-4000-8000-000000000001",
            "tenant_name": name,
            "room_number": "1A",
            "advanced_paid": 5000.0,
            "photo_url": null,
            "nid_front_url": null,
            "nid_back_url": null,
            "police_form_url": null,
            "is_archived": false,
            "created_at": "2025-06-01T10:00:00.123456+00:00",
            "updated_at": "2025-06-02T10:00:00"
        })
    }

    #[tokio::test]
    async fn test_save_inserts_new_rooms_before_deleting_old() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/main_calculations"))
            .and(query_param("month", "eq.June"))
            .and(query_param("year", "eq.2025"))
            .and(query_param("select", "id"))
            .and(header("apikey", "test-key"))
            .and(header("authorization", "Bearer test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 7}])))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/rest/v1/main_calculations"))
            .and(query_param("id", "eq.7"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 7}])))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/room_calculations"))
            .and(query_param("main_calculation_id", "eq.7"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 1}, {"id": 2}])))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/room_calculations"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!([{"id": 3}, {"id": 4}])))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/rest/v1/room_calculations"))
            .and(query_param("id", "in.(1,2)"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 1}, {"id": 2}])))
            .expect(1)
            .mount(&server)
            .await;

        let store = RemoteStore::new(client(&server));
        let id = store.save(&sample_record(Month::June, 2025)).await?;
        assert_eq!(id, RecordId(7));

        let requests = server.received_requests().await.unwrap();
        let position = |m: &str| {
            requests
                .iter()
                .position(|r| {
                    r.method.as_str() == m && r.url.path() == "/rest/v1/room_calculations"
                })
                .unwrap()
        };
        assert!(position("POST") < position("DELETE"));
        Ok(())
    }

    #[tokio::test]
    async fn test_save_new_period_inserts_main_row() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/main_calculations"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/main_calculations"))
            .and(header("prefer", "return=representation"))
            .and(body_partial_json(json!({"month": "July", "year": 2025})))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!([{"id": 11}])))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/room_calculations"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/room_calculations"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!([{"id": 1}, {"id": 2}])))
            .expect(1)
            .mount(&server)
            .await;

        let store = RemoteStore::new(client(&server));
        assert_eq!(store.save(&sample_record(Month::July, 2025)).await?, RecordId(11));
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_old_room_delete_is_not_fatal() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/main_calculations"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 7}])))
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/rest/v1/main_calculations"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 7}])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/room_calculations"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 1}])))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/room_calculations"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!([{"id": 2}])))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/rest/v1/room_calculations"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let store = RemoteStore::new(client(&server));
        assert!(store.save(&sample_record(Month::June, 2025)).await.is_ok());
        Ok(())
    }

    #[tokio::test]
    async fn test_http_error_status_is_remote_api_error() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/main_calculations"))
            .respond_with(ResponseTemplate::new(401).set_body_string("Invalid API key"))
            .mount(&server)
            .await;

        let store = RemoteStore::new(client(&server));
        let err = store.save(&sample_record(Month::June, 2025)).await.unwrap_err();
        assert!(matches!(err, Error::RemoteApi { status: 401, .. }));
        assert_eq!(err.kind(), crate::errors::ErrorKind::Persistence);
        Ok(())
    }

    #[tokio::test]
    async fn test_load_and_missing_period() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/main_calculations"))
            .and(query_param("month", "eq.June"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!([main_row(5, "June", 2025)])),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/main_calculations"))
            .and(query_param("month", "eq.May"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/room_calculations"))
            .and(query_param("main_calculation_id", "in.(5)"))
            .respond_with(ResponseTemplate::new(200).set_body_json(room_rows(5)))
            .mount(&server)
            .await;

        let store = RemoteStore::new(client(&server));
        let june = BillingPeriod::new(Month::June, 2025)?;
        let loaded = store.load(&june).await?;
        assert_eq!(loaded, sample_record(Month::June, 2025));

        let may = BillingPeriod::new(Month::May, 2025)?;
        assert!(matches!(store.load(&may).await, Err(Error::NotFound { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_load_row_written_by_desktop_app() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/main_calculations"))
            .and(query_param("month", "eq.June"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
                "id": 8,
                "month": "June",
                "year": 2025,
                "main_data": {
                    "month": "June",
                    "year": 2025,
                    "meter_readings": [100.0, 200.0, 300.0],
                    "diff_readings": [50.0, 60.0, 70.0],
                    "meter_1": 100.0,
                    "diff_1": 50.0,
                    "total_unit_cost": 600.0,
                    "total_diff_units": 180.0,
                    "per_unit_cost": 3.33,
                    "added_amount": 25.0,
                    "grand_total": 625.0
                }
            }])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/room_calculations"))
            .and(query_param("main_calculation_id", "in.(8)"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
                "main_calculation_id": 8,
                "room_data": {
                    "room_name": "Room 1",
                    "present_unit": 120.0,
                    "previous_unit": 70.0,
                    "real_unit": 50.0,
                    "unit_bill": 166.5,
                    "gas_bill": 500.0,
                    "water_bill": 200.0,
                    "house_rent": 4000.0,
                    "grand_total": 4866.5,
                    "photo_path": null
                }
            }])))
            .mount(&server)
            .await;

        let store = RemoteStore::new(client(&server));
        let loaded = store.load(&BillingPeriod::new(Month::June, 2025)?).await?;
        assert_eq!(loaded.meter_readings, vec![100, 200, 300]);
        assert_eq!(loaded.diff_readings, vec![50, 60, 70]);
        assert_eq!(loaded.total_unit, 600.0);
        assert_eq!(loaded.total_diff, 180.0);
        assert_eq!(loaded.additional_amount, 25.0);
        assert_eq!(loaded.rooms.len(), 1);
        assert_eq!(loaded.rooms[0].present_reading, 120);
        assert_eq!(loaded.rooms[0].previous_reading, 70);
        assert_eq!(loaded.rooms[0].real_unit, 50);
        Ok(())
    }

    #[test]
    fn test_payload_keys_and_fractional_readings() {
        let record = sample_record(Month::June, 2025);
        let main = serde_json::to_value(MainData::from(&record)).unwrap();
        assert_eq!(main["total_unit_cost"], json!(600.0));
        assert_eq!(main["total_diff_units"], json!(180.0));
        assert!(main.get("total_unit").is_none());

        let room = serde_json::to_value(RoomData::from(&record.rooms[0])).unwrap();
        assert_eq!(room["present_unit"], json!(120));
        assert_eq!(room["previous_unit"], json!(70));

        let mut fractional = room;
        fractional["real_unit"] = json!(50.5);
        assert!(serde_json::from_value::<RoomData>(fractional).is_err());
    }

    #[tokio::test]
    async fn test_list_filters_server_side_and_detects_more() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/main_calculations"))
            .and(query_param("year", "eq.2025"))
            .and(query_param("order", "updated_at.desc"))
            .and(query_param("limit", "3"))
            .and(query_param("offset", "0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                main_row(3, "July", 2025),
                main_row(2, "June", 2025),
                main_row(1, "May", 2025),
            ])))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/room_calculations"))
            .and(query_param("main_calculation_id", "in.(3,2)"))
            .respond_with(ResponseTemplate::new(200).set_body_json(room_rows(2)))
            .mount(&server)
            .await;

        let store = RemoteStore::new(client(&server));
        let filter = HistoryFilter {
            month: None,
            year: Some(2025),
        };
        let page = store.list(&filter, PageRequest::first(2)).await?;
        assert_eq!(page.items.len(), 2);
        assert!(page.has_more);
        assert_eq!(page.items[0].period.month, Month::July);
        assert!(page.items[0].rooms.is_empty());
        assert_eq!(page.items[1].rooms.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_create_rental_uploads_local_images() -> Result<()> {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir()?;
        let photo = dir.path().join("photo.png");
        std::fs::write(&photo, b"\x89PNG")?;

        Mock::given(method("POST"))
            .and(path_regex(r"^/storage/v1/object/rental-images/rentals/.+-photo\.png$"))
            .and(header("x-upsert", "true"))
            .and(header("content-type", "image/png"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"Key": "ok"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/rental_records"))
            .and(body_partial_json(json!({
                "tenant_name": "Rahim",
                "nid_front_url": "https://cdn.example.com/nid.jpg",
                "is_archived": false
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!([rental_row(1, "Rahim")])))
            .expect(1)
            .mount(&server)
            .await;

        let store = RemoteRentalStore::new(client(&server));
        let mut draft = sample_draft("Rahim", "1A");
        draft.documents.photo = Some(photo.display().to_string());
        draft.documents.nid_front = Some("https://cdn.example.com/nid.jpg".to_string());

        let record = store.create(draft).await?;
        assert_eq!(record.id, 1);
        assert_eq!(record.tenant_name, "Rahim");
        assert!(record.remote_id.is_some());
        assert_eq!(record.updated_at.to_rfc3339(), "2025-06-02T10:00:00+00:00");
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_local_image_fails_before_any_request() -> Result<()> {
        let server = MockServer::start().await;
        let store = RemoteRentalStore::new(client(&server));
        let mut draft = sample_draft("Rahim", "1A");
        draft.documents.police_form = Some("/definitely/missing/form.jpg".to_string());

        let err = store.create(draft).await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput { .. }));
        assert!(server.received_requests().await.unwrap().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_rental_archive_delete_and_list() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/rest/v1/rental_records"))
            .and(query_param("id", "eq.1"))
            .and(body_partial_json(json!({"is_archived": true})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([rental_row(1, "A")])))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/rest/v1/rental_records"))
            .and(query_param("id", "eq.9"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/rental_records"))
            .and(query_param("is_archived", "eq.true"))
            .and(query_param("limit", "21"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([rental_row(1, "A")])))
            .mount(&server)
            .await;

        let store = RemoteRentalStore::new(client(&server));
        store.set_archived(1, true).await?;
        assert!(matches!(store.delete(9).await, Err(Error::NotFound { .. })));

        let page = store
            .list(ArchiveFilter::Archived, PageRequest::first(20))
            .await?;
        assert_eq!(page.items.len(), 1);
        assert!(!page.has_more);
        Ok(())
    }
}
