// src/import_tests.rs

#[cfg(test)]
mod tests {
    use crate::identity::ImportMode;
    use crate::import::*;
    use crate::model::{SessionType, TeachingContext, NewTeacher};
    use crate::sheet::{CellValue, CsvSheetReader, SheetRow};
    use crate::store::{HoursStore, MemoryStore, SessionFilter, TeacherFilter};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::fs;

    fn teacher_row(number: usize, name: &str, mention: &str, volume: CellValue) -> SheetRow {
        SheetRow::new(number)
            .with("Enseignant", CellValue::text(name))
            .with("Mention", CellValue::text(mention))
            .with("Parcours", CellValue::text("GL"))
            .with("Niveau", CellValue::text("L3"))
            .with("Volume horaire", volume)
    }

    fn course_row(number: usize, name: &str, date: &str) -> SheetRow {
        SheetRow::new(number)
            .with("Enseignant", CellValue::text(name))
            .with("Date", CellValue::text(date))
            .with("Heure début", CellValue::text("08:00:00"))
            .with("Heure fin", CellValue::text("10:30:00"))
            .with("Mention", CellValue::text("Info"))
            .with("Parcours", CellValue::text("GL"))
            .with("Niveau", CellValue::text("L3"))
    }

    async fn seed_teacher(store: &MemoryStore, name: &str) {
        store
            .create_teacher(NewTeacher::new(
                name,
                TeachingContext::new("Info", "GL", "L3", "", ""),
                dec!(24),
            ))
            .await
            .unwrap();
    }

    // --- Teacher import ---

    #[tokio::test]
    async fn same_name_in_two_contexts_gives_two_records() {
        let store = MemoryStore::new();
        let importer = Importer::new(&store, dec!(24));
        let rows = vec![
            teacher_row(1, "Dupont", "Info", CellValue::Number(30.0)),
            teacher_row(2, "Dupont", "Maths", CellValue::Number(30.0)),
        ];

        let report = importer
            .import_sheet(&rows, &ColumnMapping::default(), ImportMode::TeacherImport, false)
            .await;

        assert_eq!(report.created_count, 2);
        let all = store.find_teachers(&TeacherFilter::by_name("Dupont")).await.unwrap();
        assert_eq!(all.len(), 2);
        assert!(all.iter().all(|t| t.name == "Dupont"));
        match &report.created[1] {
            CreatedRecord::Teacher(t) => assert_eq!(t.note, "new context for existing teacher"),
            other => panic!("unexpected record {:?}", other),
        }
    }

    #[tokio::test]
    async fn rerunning_the_same_sheet_is_a_no_op() {
        let store = MemoryStore::new();
        let importer = Importer::new(&store, dec!(24));
        let rows = vec![
            teacher_row(1, "Dupont", "Info", CellValue::Number(30.0)),
            teacher_row(2, "Martin", "Info", CellValue::text("24,5")),
        ];
        let mapping = ColumnMapping::default();

        importer
            .import_sheet(&rows, &mapping, ImportMode::TeacherImport, false)
            .await;
        let second = importer
            .import_sheet(&rows, &mapping, ImportMode::TeacherImport, false)
            .await;

        assert_eq!(second.created_count, 0);
        assert_eq!(second.updated_count, 0);
        assert_eq!(second.skipped_count, 2);
        assert!(second.skipped.iter().all(|s| s.reason == "no change"));
        let all = store.find_teachers(&TeacherFilter::default()).await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn changed_volume_is_an_update() {
        let store = MemoryStore::new();
        let importer = Importer::new(&store, dec!(24));
        let mapping = ColumnMapping::default();
        importer
            .import_sheet(
                &[teacher_row(1, "Dupont", "Info", CellValue::Number(30.0))],
                &mapping,
                ImportMode::TeacherImport,
                false,
            )
            .await;

        let report = importer
            .import_sheet(
                &[teacher_row(1, "Dupont", "Info", CellValue::text("32"))],
                &mapping,
                ImportMode::TeacherImport,
                false,
            )
            .await;
        assert_eq!(report.updated_count, 1);
        assert_eq!(report.updated[0].changes, "Planned hours: 30 -> 32");
        assert_eq!(report.updated[0].planned_hours, dec!(32));
    }

    #[tokio::test]
    async fn missing_volume_uses_default_and_blank_names_are_skipped() {
        let store = MemoryStore::new();
        let importer = Importer::new(&store, dec!(18));
        let rows = vec![
            teacher_row(1, "Dupont", "Info", CellValue::Empty),
            teacher_row(2, "  ", "Info", CellValue::Number(10.0)),
            teacher_row(3, "Martin", "Info", CellValue::text("beaucoup")),
        ];

        let report = importer
            .import_sheet(&rows, &ColumnMapping::default(), ImportMode::TeacherImport, false)
            .await;

        assert_eq!(report.created_count, 2);
        assert_eq!(report.skipped_count, 1);
        assert_eq!(report.skipped[0].row, 2);
        assert_eq!(report.skipped[0].reason, "empty name");
        let all = store.find_teachers(&TeacherFilter::default()).await.unwrap();
        assert!(all.iter().all(|t| t.planned_hours == dec!(18)));
    }

    #[tokio::test]
    async fn mapped_columns_win_over_aliases() {
        let store = MemoryStore::new();
        let importer = Importer::new(&store, dec!(24));
        let mapping = ColumnMapping::from_json(r#"{"enseignantCol": "Nom complet"}"#).unwrap();
        let row = SheetRow::new(1)
            .with("Nom complet", CellValue::text("Rasoa"))
            .with("Enseignant", CellValue::text("Ignored"));

        importer
            .import_sheet(&[row], &mapping, ImportMode::TeacherImport, false)
            .await;
        let all = store.find_teachers(&TeacherFilter::default()).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].name, "Rasoa");
    }

    #[test]
    fn malformed_mapping_is_fatal() {
        let err = ColumnMapping::from_json("{enseignantCol:").unwrap_err();
        assert!(matches!(err, crate::error::ImportError::MalformedMapping(_)));
        assert_eq!(ColumnMapping::from_json("  ").unwrap(), ColumnMapping::default());
    }

    #[test]
    fn planned_hours_parsing() {
        assert_eq!(parse_planned_hours(Some(&CellValue::text("24,5 h"))), Some(dec!(24.5)));
        assert_eq!(parse_planned_hours(Some(&CellValue::Number(0.0))), Some(Decimal::ZERO));
        assert_eq!(parse_planned_hours(Some(&CellValue::text("-3"))), None);
        assert_eq!(parse_planned_hours(None), None);
    }

    // --- Course import ---

    #[tokio::test]
    async fn one_bad_date_fails_only_its_row() {
        let store = MemoryStore::new();
        seed_teacher(&store, "Dupont").await;
        let importer = Importer::new(&store, dec!(24));
        let rows: Vec<SheetRow> = (1..=10)
            .map(|n| {
                let date = if n == 3 {
                    "pas une date".to_string()
                } else {
                    format!("{:02}/03/2024", n)
                };
                course_row(n, "Dupont", &date)
            })
            .collect();

        let report = importer
            .import_sheet(&rows, &ColumnMapping::default(), ImportMode::CourseImport, false)
            .await;

        assert_eq!(report.total_rows, 10);
        assert_eq!(report.error_count, 1);
        assert_eq!(report.errors[0].row, 3);
        assert_eq!(report.created_count, 9);
        let sessions = store.find_sessions(&SessionFilter::default()).await.unwrap();
        assert_eq!(sessions.len(), 9);
        assert!(sessions.iter().all(|s| s.duration == dec!(2.5)));
    }

    #[tokio::test]
    async fn course_row_needs_date_and_name() {
        let store = MemoryStore::new();
        seed_teacher(&store, "Dupont").await;
        let importer = Importer::new(&store, dec!(24));
        let rows = vec![
            course_row(1, "", "15/03/2024"),
            course_row(2, "Dupont", ""),
        ];

        let report = importer
            .import_sheet(&rows, &ColumnMapping::default(), ImportMode::CourseImport, true)
            .await;
        assert_eq!(report.error_count, 2);
        assert_eq!(report.errors[0].reason, "missing teacher name");
        assert_eq!(report.errors[1].reason, "missing date");
        assert!(store
            .find_sessions(&SessionFilter::default())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn unknown_teacher_is_an_error_without_create_missing() {
        let store = MemoryStore::new();
        let importer = Importer::new(&store, dec!(24));
        let report = importer
            .import_sheet(
                &[course_row(1, "Inconnu", "2024-03-15")],
                &ColumnMapping::default(),
                ImportMode::CourseImport,
                false,
            )
            .await;

        assert_eq!(report.error_count, 1);
        assert_eq!(report.created_count, 0);
        assert!(store
            .find_sessions(&SessionFilter::default())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn create_missing_builds_teacher_and_chains_rows() {
        let store = MemoryStore::new();
        let importer = Importer::new(&store, dec!(24));
        let rows = vec![
            course_row(1, "Nouveau", "2024-03-15"),
            course_row(2, "Nouveau", "2024-03-16"),
        ];

        let report = importer
            .import_sheet(&rows, &ColumnMapping::default(), ImportMode::CourseImport, true)
            .await;

        assert_eq!(report.created_count, 2);
        let teachers = store.find_teachers(&TeacherFilter::default()).await.unwrap();
        assert_eq!(teachers.len(), 1);
        assert_eq!(teachers[0].planned_hours, dec!(24));
        assert_eq!(teachers[0].context.mention.as_deref(), Some("Info"));

        let sessions = store.find_sessions(&SessionFilter::default()).await.unwrap();
        assert!(sessions.iter().all(|s| s.teacher_id == teachers[0].id));
        assert!(sessions.iter().all(|s| s.session_type == SessionType::Et));
        match &report.created[0] {
            CreatedRecord::Session(s) => {
                assert_eq!(s.note.as_deref(), Some("teacher created"));
                assert_eq!(s.date, "2024-03-15");
            }
            other => panic!("unexpected record {:?}", other),
        }
    }

    #[tokio::test]
    async fn corrupted_duration_falls_back_to_clock_span() {
        let store = MemoryStore::new();
        seed_teacher(&store, "Dupont").await;
        let importer = Importer::new(&store, dec!(24));
        let row = course_row(1, "Dupont", "2024-03-15")
            .with("Durée", CellValue::Number(3118990000000227.0))
            .with("TYPE", CellValue::text("TD"));

        let report = importer
            .import_sheet(&[row], &ColumnMapping::default(), ImportMode::CourseImport, false)
            .await;
        assert_eq!(report.created_count, 1);
        let sessions = store.find_sessions(&SessionFilter::default()).await.unwrap();
        assert_eq!(sessions[0].duration, dec!(2.5));
        assert_eq!(sessions[0].session_type, SessionType::Td);
    }

    #[tokio::test]
    async fn samples_are_capped_but_counts_are_not() {
        let store = MemoryStore::new();
        let importer = Importer::new(&store, dec!(24));
        let rows: Vec<SheetRow> = (1..=25).map(|n| course_row(n, "", "2024-03-15")).collect();

        let report = importer
            .import_sheet(&rows, &ColumnMapping::default(), ImportMode::CourseImport, true)
            .await;
        assert_eq!(report.error_count, 25);
        assert_eq!(report.errors.len(), ERROR_SAMPLE_LIMIT);
        assert_eq!(
            report.summary,
            "Import finished: 0 created, 0 updated, 0 skipped, 25 errors out of 25 rows"
        );
    }

    // --- Files ---

    #[tokio::test]
    async fn upload_is_removed_after_import() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("upload.csv");
        fs::write(
            &path,
            "Enseignant,Mention,Volume horaire\nDupont,Info,30\nMartin,Maths,\n",
        )
        .unwrap();

        let store = MemoryStore::new();
        let importer = Importer::new(&store, dec!(24));
        let report = importer
            .import_upload(
                &CsvSheetReader::default(),
                &path,
                &ImportOptions::new(ImportMode::TeacherImport),
            )
            .await
            .unwrap();

        assert_eq!(report.created_count, 2);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn upload_is_removed_even_when_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.csv");
        fs::write(&path, [0xffu8, 0xfe, 0x00, b'\n', 0xff]).unwrap();

        let store = MemoryStore::new();
        let importer = Importer::new(&store, dec!(24));
        let result = importer
            .import_upload(
                &CsvSheetReader::default(),
                &path,
                &ImportOptions::new(ImportMode::CourseImport),
            )
            .await;

        assert!(result.is_err());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn import_file_keeps_its_input() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keep.csv");
        fs::write(&path, "Enseignant\nDupont\n").unwrap();

        let store = MemoryStore::new();
        Importer::new(&store, dec!(24))
            .import_file(
                &CsvSheetReader::default(),
                &path,
                &ImportOptions::new(ImportMode::TeacherImport),
            )
            .await
            .unwrap();
        assert!(path.exists());
    }

    #[test]
    fn preview_upload_returns_headers_and_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("preview.csv");
        let mut body = String::from("Enseignant,Date\n");
        for n in 1..=8 {
            body.push_str(&format!("Prof {},0{}/03/2024\n", n, n));
        }
        fs::write(&path, body).unwrap();

        let preview = preview_upload(&CsvSheetReader::default(), &path, 5).unwrap();
        assert_eq!(preview.headers, vec!["Enseignant", "Date"]);
        assert_eq!(preview.rows.len(), 5);
        assert!(!path.exists());
    }
}
