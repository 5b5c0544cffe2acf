//! CSV history file backend.
//!
//! Each calculation is a block of rows: the first row carries the month label, the
//! main fields, the first room and the four room totals; every further room gets a
//! row with blank main and total cells. A calculation without rooms writes `N/A` in
//! the room and total cells.
//!
//! Columns are resolved by header name, so files written with an older header
//! (`Total Unit Cost`, `Total Diff Units`, a different number of meter columns) still
//! load, and appends follow whatever header the file already has.

use crate::{
    config::{CsvConfig, CsvWriteMode},
    core::{calculator, period::BillingPeriod, report::RoomTotals},
    errors::{Error, Result},
    models::{HistoryFilter, MainCalculationRecord, Page, PageRequest, RecordId, RoomRecord},
    storage::{Backend, CalculationStore},
};
use async_trait::async_trait;
use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use std::{
    fs::{File, OpenOptions},
    io::{BufWriter, ErrorKind as IoErrorKind},
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument, warn};

const NOT_AVAILABLE: &str = "N/A";

/// One column of the history file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Column {
    Month,
    Meter(usize),
    Diff(usize),
    TotalUnit,
    TotalDiff,
    PerUnitCost,
    AddedAmount,
    InTotal,
    RoomName,
    PresentUnit,
    PreviousUnit,
    RealUnit,
    UnitBill,
    GasBill,
    WaterBill,
    HouseRent,
    GrandTotal,
    TotalHouseRent,
    TotalWaterBill,
    TotalGasBill,
    TotalRoomUnitBill,
    Unknown,
}

const MAIN_TAIL: [Column; 5] = [
    Column::TotalUnit,
    Column::TotalDiff,
    Column::PerUnitCost,
    Column::AddedAmount,
    Column::InTotal,
];

const ROOM_COLUMNS: [Column; 9] = [
    Column::RoomName,
    Column::PresentUnit,
    Column::PreviousUnit,
    Column::RealUnit,
    Column::UnitBill,
    Column::GasBill,
    Column::WaterBill,
    Column::HouseRent,
    Column::GrandTotal,
];

const TOTAL_COLUMNS: [Column; 4] = [
    Column::TotalHouseRent,
    Column::TotalWaterBill,
    Column::TotalGasBill,
    Column::TotalRoomUnitBill,
];

impl Column {
    fn parse(name: &str) -> Self {
        let name = name.trim();
        if let Some(n) = name.strip_prefix("Meter-").and_then(|n| n.parse().ok()) {
            return Self::Meter(n);
        }
        if let Some(n) = name.strip_prefix("Diff-").and_then(|n| n.parse().ok()) {
            return Self::Diff(n);
        }
        match name {
            "Month" => Self::Month,
            "Total Unit" | "Total Unit Cost" => Self::TotalUnit,
            "Total Diff" | "Total Diff Units" => Self::TotalDiff,
            "Per Unit Cost" => Self::PerUnitCost,
            "Added Amount" => Self::AddedAmount,
            "In Total" => Self::InTotal,
            "Room Name" => Self::RoomName,
            "Present Unit" => Self::PresentUnit,
            "Previous Unit" => Self::PreviousUnit,
            "Real Unit" => Self::RealUnit,
            "Unit Bill" => Self::UnitBill,
            "Gas Bill" => Self::GasBill,
            "Water Bill" => Self::WaterBill,
            "House Rent" => Self::HouseRent,
            "Grand Total" => Self::GrandTotal,
            "Total House Rent" => Self::TotalHouseRent,
            "Total Water Bill" => Self::TotalWaterBill,
            "Total Gas Bill" => Self::TotalGasBill,
            "Total Room Unit Bill" => Self::TotalRoomUnitBill,
            _ => Self::Unknown,
        }
    }

    fn header(self) -> String {
        match self {
            Self::Month => "Month".to_string(),
            Self::Meter(n) => format!("Meter-{n}"),
            Self::Diff(n) => format!("Diff-{n}"),
            Self::TotalUnit => "Total Unit".to_string(),
            Self::TotalDiff => "Total Diff".to_string(),
            Self::PerUnitCost => "Per Unit Cost".to_string(),
            Self::AddedAmount => "Added Amount".to_string(),
            Self::InTotal => "In Total".to_string(),
            Self::RoomName => "Room Name".to_string(),
            Self::PresentUnit => "Present Unit".to_string(),
            Self::PreviousUnit => "Previous Unit".to_string(),
            Self::RealUnit => "Real Unit".to_string(),
            Self::UnitBill => "Unit Bill".to_string(),
            Self::GasBill => "Gas Bill".to_string(),
            Self::WaterBill => "Water Bill".to_string(),
            Self::HouseRent => "House Rent".to_string(),
            Self::GrandTotal => "Grand Total".to_string(),
            Self::TotalHouseRent => "Total House Rent".to_string(),
            Self::TotalWaterBill => "Total Water Bill".to_string(),
            Self::TotalGasBill => "Total Gas Bill".to_string(),
            Self::TotalRoomUnitBill => "Total Room Unit Bill".to_string(),
            Self::Unknown => String::new(),
        }
    }

    const fn is_room(self) -> bool {
        matches!(
            self,
            Self::RoomName
                | Self::PresentUnit
                | Self::PreviousUnit
                | Self::RealUnit
                | Self::UnitBill
                | Self::GasBill
                | Self::WaterBill
                | Self::HouseRent
                | Self::GrandTotal
        )
    }

    const fn is_total(self) -> bool {
        matches!(
            self,
            Self::TotalHouseRent
                | Self::TotalWaterBill
                | Self::TotalGasBill
                | Self::TotalRoomUnitBill
        )
    }
}

/// Column order of a history file.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Layout {
    columns: Vec<Column>,
    names: Vec<String>,
}

impl Layout {
    fn standard(meter_slots: usize) -> Self {
        let mut columns = vec![Column::Month];
        columns.extend((1..=meter_slots).map(Column::Meter));
        columns.extend((1..=meter_slots).map(Column::Diff));
        columns.extend(MAIN_TAIL);
        columns.extend(ROOM_COLUMNS);
        columns.extend(TOTAL_COLUMNS);
        let names = columns.iter().map(|c| c.header()).collect();
        Self { columns, names }
    }

    /// Keeps the file's own header names so a rewrite does not rename columns.
    fn from_headers(headers: &StringRecord) -> Self {
        Self {
            columns: headers.iter().map(Column::parse).collect(),
            names: headers.iter().map(str::to_string).collect(),
        }
    }

    fn header_row(&self) -> &[String] {
        &self.names
    }

    fn slots(&self, wanted: fn(Column) -> Option<usize>) -> usize {
        self.columns.iter().filter_map(|&c| wanted(c)).max().unwrap_or(0)
    }

    fn meter_slots(&self) -> usize {
        self.slots(|c| match c {
            Column::Meter(n) => Some(n),
            _ => None,
        })
    }

    fn diff_slots(&self) -> usize {
        self.slots(|c| match c {
            Column::Diff(n) => Some(n),
            _ => None,
        })
    }

    fn cell<'r>(&self, row: &'r StringRecord, column: Column) -> &'r str {
        self.columns
            .iter()
            .position(|&c| c == column)
            .and_then(|i| row.get(i))
            .map_or("", str::trim)
    }

    /// Renders one calculation as rows in this layout.
    fn render(&self, record: &MainCalculationRecord) -> Result<Vec<Vec<String>>> {
        if record.meter_readings.len() > self.meter_slots()
            || record.diff_readings.len() > self.diff_slots()
        {
            return Err(Error::invalid_input(format!(
                "History file has room for {} meter and {} diff readings, got {} and {}",
                self.meter_slots(),
                self.diff_slots(),
                record.meter_readings.len(),
                record.diff_readings.len()
            )));
        }

        let totals = RoomTotals::from_rooms(&record.rooms);
        let mut rows = Vec::with_capacity(record.rooms.len().max(1));

        if record.rooms.is_empty() {
            rows.push(
                self.columns
                    .iter()
                    .map(|&c| {
                        if c.is_room() || c.is_total() {
                            NOT_AVAILABLE.to_string()
                        } else {
                            main_cell(c, record)
                        }
                    })
                    .collect(),
            );
            return Ok(rows);
        }

        for (i, room) in record.rooms.iter().enumerate() {
            let first = i == 0;
            rows.push(
                self.columns
                    .iter()
                    .map(|&c| {
                        if c.is_room() {
                            room_cell(c, room)
                        } else if c.is_total() {
                            if first { total_cell(c, &totals) } else { String::new() }
                        } else if first {
                            main_cell(c, record)
                        } else {
                            String::new()
                        }
                    })
                    .collect(),
            );
        }
        Ok(rows)
    }
}

/// Unused slots are left blank so a stored zero reading stays distinguishable.
fn reading_cell(readings: &[i64], n: usize) -> String {
    readings
        .get(n.wrapping_sub(1))
        .map_or_else(String::new, ToString::to_string)
}

fn main_cell(column: Column, record: &MainCalculationRecord) -> String {
    match column {
        Column::Month => record.period.to_string(),
        Column::Meter(n) => reading_cell(&record.meter_readings, n),
        Column::Diff(n) => reading_cell(&record.diff_readings, n),
        Column::TotalUnit => record.total_unit.to_string(),
        Column::TotalDiff => record.total_diff.to_string(),
        Column::PerUnitCost => record.per_unit_cost.to_string(),
        Column::AddedAmount => record.additional_amount.to_string(),
        Column::InTotal => record.grand_total.to_string(),
        _ => String::new(),
    }
}

fn room_cell(column: Column, room: &RoomRecord) -> String {
    match column {
        Column::RoomName => room.room_name.clone(),
        Column::PresentUnit => room.present_reading.to_string(),
        Column::PreviousUnit => room.previous_reading.to_string(),
        Column::RealUnit => room.real_unit.to_string(),
        Column::UnitBill => room.unit_bill.to_string(),
        Column::GasBill => room.gas_bill.to_string(),
        Column::WaterBill => room.water_bill.to_string(),
        Column::HouseRent => room.house_rent.to_string(),
        Column::GrandTotal => room.grand_total.to_string(),
        _ => String::new(),
    }
}

fn total_cell(column: Column, totals: &RoomTotals) -> String {
    let value = match column {
        Column::TotalHouseRent => totals.total_house_rent,
        Column::TotalWaterBill => totals.total_water_bill,
        Column::TotalGasBill => totals.total_gas_bill,
        Column::TotalRoomUnitBill => totals.total_room_unit_bill,
        _ => return String::new(),
    };
    format!("{value:.2}")
}

fn number(text: &str, field: &str, line: u64) -> Result<f64> {
    let text = text.trim_end_matches("TK").trim();
    if text.is_empty() || text == NOT_AVAILABLE {
        return Ok(0.0);
    }
    text.parse().map_err(|_| {
        Error::invalid_input(format!(
            "History file line {line}: {field} is not a number: '{text}'"
        ))
    })
}

fn reading(text: &str, field: &str, line: u64) -> Result<i64> {
    if text == NOT_AVAILABLE {
        return Ok(0);
    }
    calculator::parse_reading(text, field)
        .map_err(|e| Error::invalid_input(format!("History file line {line}: {e}")))
}

/// Readings in column order up to the last non-blank cell.
///
/// Rows with no blank slot come from writers that padded with `0`; there trailing
/// zeros are the padding.
fn readings(
    layout: &Layout,
    row: &StringRecord,
    slots: usize,
    column: fn(usize) -> Column,
    line: u64,
) -> Result<Vec<i64>> {
    let cells: Vec<(Column, &str)> = (1..=slots)
        .map(|n| (column(n), layout.cell(row, column(n))))
        .collect();
    let used = cells
        .iter()
        .rposition(|(_, text)| !text.is_empty())
        .map_or(0, |i| i + 1);
    let zero_padded = used == cells.len();

    let mut values = cells[..used]
        .iter()
        .map(|(c, text)| reading(text, &c.header(), line))
        .collect::<Result<Vec<_>>>()?;
    if zero_padded {
        while values.last() == Some(&0) {
            values.pop();
        }
    }
    Ok(values)
}

fn parse_main(layout: &Layout, row: &StringRecord, line: u64) -> Result<MainCalculationRecord> {
    let label = layout.cell(row, Column::Month);
    let period = BillingPeriod::parse_label(label)
        .map_err(|e| Error::invalid_input(format!("History file line {line}: {e}")))?;
    let field = |c: Column| number(layout.cell(row, c), &c.header(), line);

    Ok(MainCalculationRecord {
        period,
        meter_readings: readings(layout, row, layout.meter_slots(), Column::Meter, line)?,
        diff_readings: readings(layout, row, layout.diff_slots(), Column::Diff, line)?,
        additional_amount: field(Column::AddedAmount)?,
        total_unit: field(Column::TotalUnit)?,
        total_diff: field(Column::TotalDiff)?,
        per_unit_cost: field(Column::PerUnitCost)?,
        grand_total: field(Column::InTotal)?,
        rooms: Vec::new(),
    })
}

fn parse_room(layout: &Layout, row: &StringRecord, line: u64) -> Result<Option<RoomRecord>> {
    let name = layout.cell(row, Column::RoomName);
    if name.is_empty() || name == NOT_AVAILABLE {
        return Ok(None);
    }
    let field = |c: Column| number(layout.cell(row, c), &c.header(), line);
    let whole = |c: Column| reading(layout.cell(row, c), &c.header(), line);

    Ok(Some(RoomRecord {
        room_name: name.to_string(),
        present_reading: whole(Column::PresentUnit)?,
        previous_reading: whole(Column::PreviousUnit)?,
        real_unit: whole(Column::RealUnit)?,
        unit_bill: field(Column::UnitBill)?,
        gas_bill: field(Column::GasBill)?,
        water_bill: field(Column::WaterBill)?,
        house_rent: field(Column::HouseRent)?,
        grand_total: field(Column::GrandTotal)?,
    }))
}

/// Maps a permission failure to [`Error::FileLocked`].
fn classify_io(error: std::io::Error, path: &Path) -> Error {
    if error.kind() == IoErrorKind::PermissionDenied {
        Error::FileLocked {
            path: path.to_path_buf(),
        }
    } else {
        Error::Io(error)
    }
}

/// File contents: the layout found in the header and every block in file order.
#[derive(Debug)]
struct HistoryFile {
    layout: Option<Layout>,
    records: Vec<MainCalculationRecord>,
}

fn read_file(path: &Path) -> Result<HistoryFile> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == IoErrorKind::NotFound => {
            return Ok(HistoryFile {
                layout: None,
                records: Vec::new(),
            });
        }
        Err(e) => return Err(classify_io(e, path)),
    };

    let mut reader = ReaderBuilder::new().flexible(true).from_reader(file);
    let headers = reader.headers()?.clone();
    if headers.is_empty() {
        return Ok(HistoryFile {
            layout: None,
            records: Vec::new(),
        });
    }
    let layout = Layout::from_headers(&headers);

    let mut records: Vec<MainCalculationRecord> = Vec::new();
    for result in reader.records() {
        let row = result?;
        let line = row.position().map_or(0, csv::Position::line);
        if row.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }

        if layout.cell(&row, Column::Month).is_empty() {
            match (records.last_mut(), parse_room(&layout, &row, line)?) {
                (Some(current), Some(room)) => current.rooms.push(room),
                (None, Some(_)) => warn!("History file line {} has a room without a month", line),
                (_, None) => {}
            }
            continue;
        }

        let mut record = parse_main(&layout, &row, line)?;
        if let Some(room) = parse_room(&layout, &row, line)? {
            record.rooms.push(room);
        }
        records.push(record);
    }

    Ok(HistoryFile {
        layout: Some(layout),
        records,
    })
}

fn write_rows<W: std::io::Write>(
    writer: &mut csv::Writer<W>,
    layout: &Layout,
    records: &[MainCalculationRecord],
) -> Result<()> {
    for record in records {
        for row in layout.render(record)? {
            writer.write_record(&row)?;
        }
    }
    Ok(())
}

fn write_full(
    target: &Path,
    path: &Path,
    layout: &Layout,
    records: &[MainCalculationRecord],
) -> Result<()> {
    let file = File::create(target).map_err(|e| classify_io(e, path))?;
    let mut writer = WriterBuilder::new().from_writer(BufWriter::new(file));
    writer.write_record(layout.header_row())?;
    write_rows(&mut writer, layout, records)?;
    writer.flush().map_err(|e| classify_io(e, path))
}

/// Rewrites the whole file through a temporary sibling and a rename.
fn rewrite_file(path: &Path, layout: &Layout, records: &[MainCalculationRecord]) -> Result<()> {
    let tmp = temp_path(path);
    let result = write_full(&tmp, path, layout, records)
        .and_then(|()| std::fs::rename(&tmp, path).map_err(|e| classify_io(e, path)));
    if result.is_err() {
        let _ = std::fs::remove_file(&tmp);
    }
    result
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn append_block(
    path: &Path,
    layout: &Layout,
    write_header: bool,
    record: &MainCalculationRecord,
) -> Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| classify_io(e, path))?;
    let mut writer = WriterBuilder::new().from_writer(BufWriter::new(file));
    if write_header {
        writer.write_record(layout.header_row())?;
    }
    write_rows(&mut writer, layout, std::slice::from_ref(record))?;
    writer.flush().map_err(|e| classify_io(e, path))?;
    Ok(())
}

/// Most recent block per period, newest first.
fn latest_blocks(records: Vec<MainCalculationRecord>) -> Vec<MainCalculationRecord> {
    let mut seen = std::collections::HashSet::new();
    records
        .into_iter()
        .rev()
        .filter(|record| seen.insert(record.period))
        .collect()
}

fn index_id(index: usize) -> RecordId {
    RecordId(i64::try_from(index).unwrap_or(i64::MAX))
}

fn save_blocking(config: &CsvConfig, record: &MainCalculationRecord) -> Result<RecordId> {
    let path = config.path.as_path();
    let existing = read_file(path)?;
    let layout = existing
        .layout
        .unwrap_or_else(|| Layout::standard(config.meter_slots));

    match config.mode {
        CsvWriteMode::Append => {
            let write_header = existing.records.is_empty() && is_empty_file(path);
            append_block(path, &layout, write_header, record)?;
            Ok(index_id(existing.records.len()))
        }
        CsvWriteMode::Rewrite => {
            let mut records = existing.records;
            let before = records.len();
            records.retain(|r| r.period != record.period);
            if records.len() < before {
                debug!(
                    "Replacing {} existing block(s) for {}",
                    before - records.len(),
                    record.period
                );
            }
            records.push(record.clone());
            rewrite_file(path, &layout, &records)?;
            Ok(index_id(records.len() - 1))
        }
    }
}

fn is_empty_file(path: &Path) -> bool {
    std::fs::metadata(path).map_or(true, |m| m.len() == 0)
}

fn delete_blocking(config: &CsvConfig, period: &BillingPeriod) -> Result<()> {
    let path = config.path.as_path();
    let existing = read_file(path)?;
    let before = existing.records.len();
    let records: Vec<_> = existing
        .records
        .into_iter()
        .filter(|r| r.period != *period)
        .collect();
    if records.len() == before {
        return Err(Error::not_found(format!("Calculation for {period}")));
    }
    let layout = existing
        .layout
        .unwrap_or_else(|| Layout::standard(config.meter_slots));
    rewrite_file(path, &layout, &records)
}

async fn run_blocking<T, F>(task: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|e| Error::Io(std::io::Error::other(e)))?
}

/// Calculation store backed by the CSV history file.
#[derive(Debug, Clone)]
pub struct CsvStore {
    config: CsvConfig,
}

impl CsvStore {
    /// Creates a store for the configured file. Nothing is touched until the first call.
    #[must_use]
    pub const fn new(config: CsvConfig) -> Self {
        Self { config }
    }

    /// Path of the history file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.config.path
    }

    /// Every block in file order, duplicates included.
    pub async fn read_all(&self) -> Result<Vec<MainCalculationRecord>> {
        let path = self.config.path.clone();
        run_blocking(move || read_file(&path).map(|file| file.records)).await
    }
}

#[async_trait]
impl CalculationStore for CsvStore {
    fn backend(&self) -> Backend {
        Backend::Csv
    }

    #[instrument(skip(self, record), fields(period = %record.period))]
    async fn save(&self, record: &MainCalculationRecord) -> Result<RecordId> {
        let config = self.config.clone();
        let record = record.clone();
        let id = run_blocking(move || save_blocking(&config, &record)).await?;
        info!("Saved calculation to {}", self.config.path.display());
        Ok(id)
    }

    async fn load(&self, period: &BillingPeriod) -> Result<MainCalculationRecord> {
        self.read_all()
            .await?
            .into_iter()
            .rev()
            .find(|r| r.period == *period)
            .ok_or_else(|| Error::not_found(format!("Calculation for {period}")))
    }

    #[instrument(skip(self))]
    async fn delete(&self, period: &BillingPeriod) -> Result<()> {
        let config = self.config.clone();
        let period = *period;
        run_blocking(move || delete_blocking(&config, &period)).await?;
        info!("Deleted calculation from {}", self.config.path.display());
        Ok(())
    }

    async fn list(
        &self,
        filter: &HistoryFilter,
        page: PageRequest,
    ) -> Result<Page<MainCalculationRecord>> {
        let matching: Vec<_> = latest_blocks(self.read_all().await?)
            .into_iter()
            .filter(|r| filter.matches(&r.period))
            .collect();
        Ok(page.slice(matching))
    }
}
