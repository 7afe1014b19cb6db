// src/lib.rs
pub mod cell_normalizer;
pub mod config;
pub mod error;
pub mod export;
pub mod hours;
pub mod identity;
pub mod import;
pub mod model;
pub mod service;
pub mod sheet;
pub mod store;

mod import_tests;

pub use cell_normalizer::{normalize_cell, NormalizedCell, NormalizedDate, TargetKind};
pub use config::AppConfig;
pub use error::{ImportError, ServiceError, StoreError};
pub use hours::{compute_hour_summary, HourSummary, TeacherReport};
pub use identity::{IdentityResolver, ImportMode, Resolution, ResolutionAction};
pub use import::{ColumnMapping, ImportOptions, ImportReport, Importer};
pub use model::{Session, SessionType, Teacher, TeachingContext, DEFAULT_PLANNED_HOURS};
pub use service::HoursService;
pub use sheet::{CellValue, CsvSheetReader, SheetReader, SheetRow};
pub use store::{HoursStore, JsonFileStore, MemoryStore, SessionFilter, TeacherFilter};
