// src/export.rs
use rust_decimal::Decimal;
use serde::Serialize;
use std::io::Write;
use tracing::debug;

use crate::error::{import_io_context, ImportError};
use crate::hours::TeacherReport;
use crate::model::Session;

#[derive(Debug, Serialize)]
struct TeacherSummaryRecord<'a> {
    #[serde(rename = "Enseignant")]
    name: &'a str,
    #[serde(rename = "Mention")]
    mention: &'a str,
    #[serde(rename = "Parcours")]
    parcours: &'a str,
    #[serde(rename = "Niveau")]
    niveau: &'a str,
    #[serde(rename = "UE")]
    ue: &'a str,
    #[serde(rename = "EC")]
    ec: &'a str,
    #[serde(rename = "Volume horaire")]
    planned_hours: Decimal,
    #[serde(rename = "Heures normales")]
    normal_hours: Decimal,
    #[serde(rename = "Heures supplémentaires")]
    overtime_hours: Decimal,
    #[serde(rename = "Total")]
    total_hours: Decimal,
    #[serde(rename = "Cours")]
    session_count: usize,
    #[serde(rename = "Multi-contexte")]
    multi_context: &'static str,
}

#[derive(Debug, Serialize)]
struct SessionRecord<'a> {
    #[serde(rename = "TYPE")]
    session_type: &'a str,
    #[serde(rename = "Date")]
    date: String,
    #[serde(rename = "Heure début")]
    start_time: &'a str,
    #[serde(rename = "Heure fin")]
    end_time: &'a str,
    #[serde(rename = "Mention")]
    mention: &'a str,
    #[serde(rename = "Parcours")]
    parcours: &'a str,
    #[serde(rename = "Niveau")]
    niveau: &'a str,
    #[serde(rename = "UE")]
    ue: &'a str,
    #[serde(rename = "EC")]
    ec: &'a str,
    #[serde(rename = "Enseignant")]
    teacher_name: &'a str,
    #[serde(rename = "Durée")]
    duration: Decimal,
    #[serde(rename = "Saisie")]
    entry_status: &'a str,
}

fn text(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or_default()
}

/// One row per teacher with its derived hours. Headers follow the import
/// aliases so an export can be fed back in.
pub fn write_teacher_summaries<W: Write>(
    writer: W,
    reports: &[TeacherReport],
) -> Result<(), ImportError> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    for report in reports {
        let teacher = &report.teacher;
        let summary = &report.summary;
        csv_writer.serialize(TeacherSummaryRecord {
            name: &teacher.name,
            mention: text(&teacher.context.mention),
            parcours: text(&teacher.context.parcours),
            niveau: text(&teacher.context.niveau),
            ue: text(&teacher.context.ue),
            ec: text(&teacher.context.ec),
            planned_hours: summary.planned_hours,
            normal_hours: summary.normal_hours,
            overtime_hours: summary.overtime_hours,
            total_hours: summary.total_hours,
            session_count: report.sessions.len(),
            multi_context: if summary.is_multi_context() { "oui" } else { "non" },
        })?;
    }
    csv_writer
        .flush()
        .map_err(|e| import_io_context(e, "Failed to flush CSV"))?;
    debug!("Exported {} teacher rows", reports.len());
    Ok(())
}

pub fn write_sessions<W: Write>(writer: W, sessions: &[Session]) -> Result<(), ImportError> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    for session in sessions {
        csv_writer.serialize(SessionRecord {
            session_type: session.session_type.label(),
            date: session
                .date
                .map(|d| d.format("%d/%m/%Y").to_string())
                .unwrap_or_default(),
            start_time: text(&session.start_time),
            end_time: text(&session.end_time),
            mention: text(&session.context.mention),
            parcours: text(&session.context.parcours),
            niveau: text(&session.context.niveau),
            ue: text(&session.context.ue),
            ec: text(&session.context.ec),
            teacher_name: &session.teacher_name,
            duration: session.duration,
            entry_status: session.entry_status.label(),
        })?;
    }
    csv_writer
        .flush()
        .map_err(|e| import_io_context(e, "Failed to flush CSV"))?;
    debug!("Exported {} session rows", sessions.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EntryStatus, SessionType, Teacher, TeachingContext};
    use crate::sheet::{CellValue, CsvSheetReader};
    use chrono::{NaiveDate, Utc};
    use rust_decimal_macros::dec;

    fn teacher() -> Teacher {
        Teacher {
            id: 1,
            name: "Dupont".to_string(),
            context: TeachingContext::new("Info", "GL", "L3", "", ""),
            planned_hours: dec!(2),
            created_at: Utc::now(),
        }
    }

    fn session(mention: &str) -> Session {
        Session {
            id: 1,
            session_type: SessionType::Td,
            date: NaiveDate::from_ymd_opt(2024, 3, 15),
            start_time: Some("08:00".to_string()),
            end_time: Some("10:30".to_string()),
            duration: dec!(2.5),
            context: TeachingContext::new(mention, "GL", "L3", "", ""),
            teacher_id: 1,
            teacher_name: "Dupont".to_string(),
            entry_status: EntryStatus::Pending,
        }
    }

    #[test]
    fn teacher_summary_has_derived_hours() {
        let report = TeacherReport::build(teacher(), vec![session("Info"), session("Maths")]);
        let mut out = Vec::new();
        write_teacher_summaries(&mut out, &[report]).unwrap();
        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();

        assert_eq!(
            lines.next(),
            Some("Enseignant,Mention,Parcours,Niveau,UE,EC,Volume horaire,Heures normales,Heures supplémentaires,Total,Cours,Multi-contexte")
        );
        let fields: Vec<&str> = lines.next().unwrap().split(',').collect();
        assert_eq!(&fields[..6], &["Dupont", "Info", "GL", "L3", "", ""]);
        let hours: Vec<Decimal> = fields[6..10].iter().map(|f| f.parse().unwrap()).collect();
        assert_eq!(hours, vec![dec!(2), dec!(2), dec!(3), dec!(5)]);
        assert_eq!(&fields[10..], &["2", "oui"]);
    }

    #[test]
    fn exported_sessions_read_back_through_import_headers() {
        let mut out = Vec::new();
        write_sessions(&mut out, &[session("Info")]).unwrap();

        let sheet = CsvSheetReader::default().read_from(out.as_slice()).unwrap();
        let row = &sheet.rows[0];
        assert_eq!(row.get("TYPE"), Some(&CellValue::text("TD")));
        assert_eq!(row.get("Date"), Some(&CellValue::text("15/03/2024")));
        assert_eq!(row.get("Durée"), Some(&CellValue::Number(2.5)));
        assert_eq!(row.get("Saisie"), Some(&CellValue::text("Non saisie")));
    }
}
