// src/import.rs
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, error, info, warn};

use crate::cell_normalizer::{normalize_timing, NormalizedDate};
use crate::error::{ImportError, StoreError};
use crate::identity::{IdentityResolver, ImportMode, ResolutionAction, RowIdentity};
use crate::model::{
    EntryStatus, NewSession, SessionId, SessionType, TeacherId, TeachingContext,
};
use crate::sheet::{preview, CellValue, SheetPreview, SheetReader, SheetRow};
use crate::store::HoursStore;

pub const CREATED_SAMPLE_LIMIT: usize = 50;
pub const UPDATED_SAMPLE_LIMIT: usize = 20;
pub const SKIPPED_SAMPLE_LIMIT: usize = 20;
pub const ERROR_SAMPLE_LIMIT: usize = 20;

static NON_NUMERIC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\d.\-]").expect("valid non-numeric pattern"));

// --- Column mapping ---

/// Target fields an import row can feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImportField {
    Teacher,
    Mention,
    Parcours,
    Niveau,
    Ue,
    Ec,
    PlannedHours,
    SessionType,
    Date,
    StartTime,
    EndTime,
    Duration,
    EntryStatus,
}

impl ImportField {
    /// Well-known headers tried, in order, when no mapping names a column.
    pub fn aliases(self) -> &'static [&'static str] {
        match self {
            ImportField::Teacher => &["Enseignants", "Enseignant"],
            ImportField::Mention => &["Mention"],
            ImportField::Parcours => &["Parcours"],
            ImportField::Niveau => &["Niveau"],
            ImportField::Ue => &["UE"],
            ImportField::Ec => &["EC"],
            ImportField::PlannedHours => &["Volume oraire", "Volume horaire", "Volume"],
            ImportField::SessionType => &["TYPE"],
            ImportField::Date => &["Date (jj/mm/aaaa)", "Date"],
            ImportField::StartTime => &["Heure début"],
            ImportField::EndTime => &["Heure fin"],
            ImportField::Duration => &["Durée"],
            ImportField::EntryStatus => &["Saisie"],
        }
    }
}

/// Header chosen by the user for each field, as sent by the mapping form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ColumnMapping {
    pub enseignant_col: Option<String>,
    pub mention_col: Option<String>,
    pub parcours_col: Option<String>,
    pub niveau_col: Option<String>,
    pub ue_col: Option<String>,
    pub ec_col: Option<String>,
    pub volume_col: Option<String>,
    pub type_col: Option<String>,
    pub date_col: Option<String>,
    pub start_col: Option<String>,
    pub end_col: Option<String>,
    pub duree_col: Option<String>,
    pub saisie_col: Option<String>,
}

impl ColumnMapping {
    /// Parses the mapping JSON. A blank body means "aliases only".
    pub fn from_json(json: &str) -> Result<Self, ImportError> {
        if json.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(json).map_err(ImportError::MalformedMapping)
    }

    pub fn column(&self, field: ImportField) -> Option<&str> {
        let column = match field {
            ImportField::Teacher => &self.enseignant_col,
            ImportField::Mention => &self.mention_col,
            ImportField::Parcours => &self.parcours_col,
            ImportField::Niveau => &self.niveau_col,
            ImportField::Ue => &self.ue_col,
            ImportField::Ec => &self.ec_col,
            ImportField::PlannedHours => &self.volume_col,
            ImportField::SessionType => &self.type_col,
            ImportField::Date => &self.date_col,
            ImportField::StartTime => &self.start_col,
            ImportField::EndTime => &self.end_col,
            ImportField::Duration => &self.duree_col,
            ImportField::EntryStatus => &self.saisie_col,
        };
        column.as_deref().filter(|c| !c.trim().is_empty())
    }

    /// The row's cell for `field`: the mapped column when it holds a value,
    /// otherwise the first alias that does.
    pub fn cell<'r>(&self, row: &'r SheetRow, field: ImportField) -> Option<&'r CellValue> {
        self.column(field)
            .and_then(|column| row.get(column))
            .or_else(|| field.aliases().iter().find_map(|alias| row.get(alias)))
    }

    pub fn text(&self, row: &SheetRow, field: ImportField) -> String {
        self.cell(row, field)
            .map(CellValue::as_trimmed_string)
            .unwrap_or_default()
    }

    fn context(&self, row: &SheetRow) -> TeachingContext {
        TeachingContext::new(
            &self.text(row, ImportField::Mention),
            &self.text(row, ImportField::Parcours),
            &self.text(row, ImportField::Niveau),
            &self.text(row, ImportField::Ue),
            &self.text(row, ImportField::Ec),
        )
    }
}

/// Reads a planned-hours cell. Absent, unparseable or negative values
/// yield `None`.
pub fn parse_planned_hours(cell: Option<&CellValue>) -> Option<Decimal> {
    let hours = match cell? {
        CellValue::Number(n) => Decimal::from_f64(*n).map(|d| d.round_dp(4).normalize()),
        CellValue::Text(text) => {
            let dotted = text.trim().replace(',', ".");
            let digits = NON_NUMERIC.replace_all(&dotted, "");
            Decimal::from_str(&digits).ok()
        }
        _ => None,
    }?;
    if hours < Decimal::ZERO {
        return None;
    }
    Some(hours)
}

// --- Report ---

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RowIssue {
    pub row: usize,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub teacher: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
}

impl RowIssue {
    fn new(row: usize, reason: impl Into<String>) -> Self {
        Self {
            row,
            reason: reason.into(),
            teacher: None,
            date: None,
        }
    }

    fn teacher(mut self, name: &str) -> Self {
        if !name.is_empty() {
            self.teacher = Some(name.to_string());
        }
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportedTeacher {
    pub row: usize,
    pub id: TeacherId,
    pub name: String,
    #[serde(flatten)]
    pub context: TeachingContext,
    pub planned_hours: Decimal,
    pub note: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatedTeacher {
    pub row: usize,
    pub id: TeacherId,
    pub name: String,
    #[serde(flatten)]
    pub context: TeachingContext,
    pub planned_hours: Decimal,
    pub changes: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportedSession {
    pub row: usize,
    pub id: SessionId,
    pub session_type: SessionType,
    pub date: String,
    pub start_time: String,
    pub end_time: String,
    pub teacher_id: TeacherId,
    pub teacher_name: String,
    #[serde(flatten)]
    pub context: TeachingContext,
    pub duration: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CreatedRecord {
    Teacher(ImportedTeacher),
    Session(ImportedSession),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    pub total_rows: usize,
    pub created_count: usize,
    pub updated_count: usize,
    pub skipped_count: usize,
    pub error_count: usize,
    pub created: Vec<CreatedRecord>,
    pub updated: Vec<UpdatedTeacher>,
    pub skipped: Vec<RowIssue>,
    pub errors: Vec<RowIssue>,
    pub summary: String,
}

/// Counts everything, keeps only the first few samples per bucket.
#[derive(Debug, Default)]
struct Tally {
    created_count: usize,
    updated_count: usize,
    skipped_count: usize,
    error_count: usize,
    created: Vec<CreatedRecord>,
    updated: Vec<UpdatedTeacher>,
    skipped: Vec<RowIssue>,
    errors: Vec<RowIssue>,
}

impl Tally {
    fn created(&mut self, record: CreatedRecord) {
        self.created_count += 1;
        if self.created.len() < CREATED_SAMPLE_LIMIT {
            self.created.push(record);
        }
    }

    fn updated(&mut self, record: UpdatedTeacher) {
        self.updated_count += 1;
        if self.updated.len() < UPDATED_SAMPLE_LIMIT {
            self.updated.push(record);
        }
    }

    fn skipped(&mut self, issue: RowIssue) {
        self.skipped_count += 1;
        if self.skipped.len() < SKIPPED_SAMPLE_LIMIT {
            self.skipped.push(issue);
        }
    }

    fn error(&mut self, issue: RowIssue) {
        warn!("Row {} rejected: {}", issue.row, issue.reason);
        self.error_count += 1;
        if self.errors.len() < ERROR_SAMPLE_LIMIT {
            self.errors.push(issue);
        }
    }

    fn finish(self, total_rows: usize) -> ImportReport {
        let summary = format!(
            "Import finished: {} created, {} updated, {} skipped, {} errors out of {} rows",
            self.created_count, self.updated_count, self.skipped_count, self.error_count, total_rows
        );
        ImportReport {
            total_rows,
            created_count: self.created_count,
            updated_count: self.updated_count,
            skipped_count: self.skipped_count,
            error_count: self.error_count,
            created: self.created,
            updated: self.updated,
            skipped: self.skipped,
            errors: self.errors,
            summary,
        }
    }
}

// --- Importer ---

#[derive(Debug, Clone, PartialEq)]
pub struct ImportOptions {
    pub mode: ImportMode,
    pub create_missing: bool,
    pub mapping: ColumnMapping,
}

impl ImportOptions {
    pub fn new(mode: ImportMode) -> Self {
        Self {
            mode,
            create_missing: false,
            mapping: ColumnMapping::default(),
        }
    }
}

/// Runs sheets through normalization and identity resolution, one row at
/// a time, in sheet order.
pub struct Importer<'a, S: HoursStore + ?Sized> {
    store: &'a S,
    default_planned_hours: Decimal,
}

impl<'a, S: HoursStore + ?Sized> Importer<'a, S> {
    pub fn new(store: &'a S, default_planned_hours: Decimal) -> Self {
        Self {
            store,
            default_planned_hours,
        }
    }

    /// Imports already-read rows. Row problems land in the report; nothing
    /// here aborts the batch.
    pub async fn import_sheet(
        &self,
        rows: &[SheetRow],
        mapping: &ColumnMapping,
        mode: ImportMode,
        create_missing: bool,
    ) -> ImportReport {
        info!("Importing {} rows ({:?})", rows.len(), mode);
        let mut tally = Tally::default();

        for row in rows {
            let outcome = match mode {
                ImportMode::TeacherImport => self.import_teacher_row(row, mapping, &mut tally).await,
                ImportMode::CourseImport => {
                    self.import_course_row(row, mapping, create_missing, &mut tally)
                        .await
                }
            };
            if let Err(e) = outcome {
                error!("Row {} failed: {}", row.number, e);
                let name = mapping.text(row, ImportField::Teacher);
                tally.error(RowIssue::new(row.number, e.to_string()).teacher(&name));
            }
        }

        let report = tally.finish(rows.len());
        info!("{}", report.summary);
        report
    }

    /// Reads the first sheet of `path` and imports it. The file is left
    /// in place.
    pub async fn import_file<R: SheetReader + ?Sized>(
        &self,
        reader: &R,
        path: &Path,
        options: &ImportOptions,
    ) -> Result<ImportReport, ImportError> {
        let sheet = reader.read_first_sheet(path)?;
        Ok(self
            .import_sheet(&sheet.rows, &options.mapping, options.mode, options.create_missing)
            .await)
    }

    /// Like `import_file`, for a temporary upload: the file is deleted
    /// afterwards whether or not the import succeeded.
    pub async fn import_upload<R: SheetReader + ?Sized>(
        &self,
        reader: &R,
        path: &Path,
        options: &ImportOptions,
    ) -> Result<ImportReport, ImportError> {
        let result = self.import_file(reader, path, options).await;
        remove_upload(path);
        result
    }

    fn planned_hours(&self, row: &SheetRow, mapping: &ColumnMapping) -> Decimal {
        parse_planned_hours(mapping.cell(row, ImportField::PlannedHours))
            .unwrap_or(self.default_planned_hours)
    }

    async fn import_teacher_row(
        &self,
        row: &SheetRow,
        mapping: &ColumnMapping,
        tally: &mut Tally,
    ) -> Result<(), StoreError> {
        let name = mapping.text(row, ImportField::Teacher);
        if name.is_empty() {
            tally.skipped(RowIssue::new(row.number, "empty name"));
            return Ok(());
        }

        let identity = RowIdentity {
            name: name.clone(),
            context: mapping.context(row),
            planned_hours: self.planned_hours(row, mapping),
        };
        let resolution = IdentityResolver::new(self.store)
            .resolve(&identity, ImportMode::TeacherImport, false)
            .await?;
        let Some(resolution) = resolution else {
            return Ok(());
        };
        let teacher = resolution.teacher;

        match resolution.action {
            ResolutionAction::Matched => {
                tally.skipped(RowIssue::new(row.number, "no change").teacher(&name));
            }
            ResolutionAction::Updated {
                previous_planned_hours,
            } => tally.updated(UpdatedTeacher {
                row: row.number,
                id: teacher.id,
                name: teacher.name,
                context: teacher.context,
                planned_hours: teacher.planned_hours,
                changes: format!(
                    "Planned hours: {} -> {}",
                    previous_planned_hours, teacher.planned_hours
                ),
            }),
            ResolutionAction::CreatedNewContext | ResolutionAction::CreatedNew => {
                let note = match resolution.action {
                    ResolutionAction::CreatedNew => "new teacher",
                    _ => "new context for existing teacher",
                };
                tally.created(CreatedRecord::Teacher(ImportedTeacher {
                    row: row.number,
                    id: teacher.id,
                    name: teacher.name,
                    context: teacher.context,
                    planned_hours: teacher.planned_hours,
                    note: note.to_string(),
                }));
            }
        }
        Ok(())
    }

    async fn import_course_row(
        &self,
        row: &SheetRow,
        mapping: &ColumnMapping,
        create_missing: bool,
        tally: &mut Tally,
    ) -> Result<(), StoreError> {
        let timing = normalize_timing(
            mapping.cell(row, ImportField::Date),
            mapping.cell(row, ImportField::StartTime),
            mapping.cell(row, ImportField::EndTime),
            mapping.cell(row, ImportField::Duration),
        );
        let name = mapping.text(row, ImportField::Teacher);

        let date = match (&timing.date, name.is_empty()) {
            (_, true) => {
                let mut issue = RowIssue::new(row.number, "missing teacher name");
                issue.date = timing.date.as_ref().map(NormalizedDate::to_string);
                tally.error(issue);
                return Ok(());
            }
            (None, false) => {
                tally.error(RowIssue::new(row.number, "missing date").teacher(&name));
                return Ok(());
            }
            (Some(NormalizedDate::Raw(raw)), false) => {
                let mut issue =
                    RowIssue::new(row.number, format!("unrecognized date '{}'", raw)).teacher(&name);
                issue.date = Some(raw.clone());
                tally.error(issue);
                return Ok(());
            }
            (Some(NormalizedDate::Iso(date)), false) => *date,
        };

        let context = mapping.context(row);
        let identity = RowIdentity {
            name: name.clone(),
            context: context.clone(),
            planned_hours: self.planned_hours(row, mapping),
        };
        let Some(resolution) = IdentityResolver::new(self.store)
            .resolve(&identity, ImportMode::CourseImport, create_missing)
            .await?
        else {
            tally.error(
                RowIssue::new(row.number, format!("no teacher named '{}'", name)).teacher(&name),
            );
            return Ok(());
        };

        let session_type = match mapping.text(row, ImportField::SessionType) {
            label if label.is_empty() => SessionType::Et,
            label => SessionType::parse(&label),
        };
        let entry_status = EntryStatus::parse(&mapping.text(row, ImportField::EntryStatus));

        let session = self
            .store
            .create_session(NewSession {
                session_type,
                date: Some(date),
                start_time: Some(timing.start_time.clone()).filter(|t| !t.is_empty()),
                end_time: Some(timing.end_time.clone()).filter(|t| !t.is_empty()),
                duration: timing.duration,
                context,
                teacher_id: resolution.teacher.id,
                teacher_name: name,
                entry_status,
            })
            .await?;
        debug!(
            "Row {}: session {} for teacher {}",
            row.number, session.id, session.teacher_id
        );

        let note = match resolution.action {
            ResolutionAction::CreatedNew => Some("teacher created".to_string()),
            ResolutionAction::CreatedNewContext => {
                Some("teacher created for a new context".to_string())
            }
            _ => None,
        };
        tally.created(CreatedRecord::Session(ImportedSession {
            row: row.number,
            id: session.id,
            session_type: session.session_type,
            date: date.format("%Y-%m-%d").to_string(),
            start_time: timing.start_time,
            end_time: timing.end_time,
            teacher_id: session.teacher_id,
            teacher_name: session.teacher_name,
            context: session.context,
            duration: session.duration,
            note,
        }));
        Ok(())
    }
}

// --- Uploads ---

fn remove_upload(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => debug!("Removed upload {}", path.display()),
        Err(e) => warn!("Could not remove upload {}: {}", path.display(), e),
    }
}

/// Headers and first rows of an uploaded sheet, for building a mapping.
/// The upload is deleted afterwards.
pub fn preview_upload<R: SheetReader + ?Sized>(
    reader: &R,
    path: &Path,
    max_rows: usize,
) -> Result<SheetPreview, ImportError> {
    let result = preview_file(reader, path, max_rows);
    remove_upload(path);
    result
}

pub fn preview_file<R: SheetReader + ?Sized>(
    reader: &R,
    path: &Path,
    max_rows: usize,
) -> Result<SheetPreview, ImportError> {
    let sheet = reader.read_first_sheet(path)?;
    Ok(preview(sheet.headers, &sheet.rows, max_rows))
}
