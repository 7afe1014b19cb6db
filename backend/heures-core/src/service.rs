// src/service.rs
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::cell_normalizer::resolve_duration;
use crate::error::ServiceError;
use crate::hours::{self, GlobalStats, SessionTypeStats, TeacherReport};
use crate::model::{
    clean_field, EntryStatus, NewSession, NewTeacher, Session, SessionId, SessionType,
    TeacherId, TeachingContext,
};
use crate::store::{HoursStore, SessionFilter, TeacherFilter};

// --- Inputs ---

/// Partial teacher update; `None` keeps the stored value.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherPatch {
    pub name: Option<String>,
    pub mention: Option<String>,
    pub parcours: Option<String>,
    pub niveau: Option<String>,
    pub ue: Option<String>,
    pub ec: Option<String>,
    pub planned_hours: Option<Decimal>,
}

/// Session as entered by hand. The owner comes from the call, not the body.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInput {
    #[serde(default)]
    pub session_type: SessionType,
    pub date: Option<NaiveDate>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub duration: Option<Decimal>,
    /// Falls back to the owner's context when empty.
    #[serde(default, flatten)]
    pub context: TeachingContext,
    #[serde(default)]
    pub entry_status: EntryStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionPatch {
    pub session_type: Option<SessionType>,
    pub date: Option<NaiveDate>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub duration: Option<Decimal>,
    pub mention: Option<String>,
    pub parcours: Option<String>,
    pub niveau: Option<String>,
    pub ue: Option<String>,
    pub ec: Option<String>,
    pub teacher_id: Option<TeacherId>,
    pub entry_status: Option<EntryStatus>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletionReport {
    pub teacher_id: TeacherId,
    pub deleted_sessions: usize,
}

fn apply_text(target: &mut Option<String>, value: &Option<String>) {
    if let Some(value) = value {
        *target = clean_field(value);
    }
}

fn duration_or_span(duration: Option<Decimal>, start: &Option<String>, end: &Option<String>) -> Decimal {
    resolve_duration(
        duration.unwrap_or(Decimal::ZERO),
        start.as_deref().unwrap_or_default(),
        end.as_deref().unwrap_or_default(),
    )
}

fn check_hours(label: &str, value: Decimal) -> Result<(), ServiceError> {
    if value < Decimal::ZERO {
        return Err(ServiceError::Invalid(format!(
            "{} must not be negative (got {})",
            label, value
        )));
    }
    Ok(())
}

// --- Service ---

/// Teacher and session operations with hours derived on every read.
pub struct HoursService<S: HoursStore> {
    store: Arc<S>,
}

impl<S: HoursStore> Clone for HoursService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: HoursStore> HoursService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    async fn report_for(&self, teacher_id: TeacherId) -> Result<TeacherReport, ServiceError> {
        let teacher = self.store.get_teacher(teacher_id).await?;
        let sessions = self
            .store
            .find_sessions(&SessionFilter::for_teacher(teacher_id))
            .await?;
        Ok(TeacherReport::build(teacher, sessions))
    }

    /// Every teacher with derived hours, newest record first.
    pub async fn list_teachers(&self) -> Result<Vec<TeacherReport>, ServiceError> {
        let mut teachers = self.store.find_teachers(&TeacherFilter::default()).await?;
        teachers.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        let mut reports = Vec::with_capacity(teachers.len());
        for teacher in teachers {
            let sessions = self
                .store
                .find_sessions(&SessionFilter::for_teacher(teacher.id))
                .await?;
            reports.push(TeacherReport::build(teacher, sessions));
        }
        Ok(reports)
    }

    pub async fn teacher_report(&self, teacher_id: TeacherId) -> Result<TeacherReport, ServiceError> {
        self.report_for(teacher_id).await
    }

    pub async fn create_teacher(&self, teacher: NewTeacher) -> Result<TeacherReport, ServiceError> {
        if teacher.name.trim().is_empty() {
            return Err(ServiceError::Invalid("teacher name is required".to_string()));
        }
        check_hours("planned hours", teacher.planned_hours)?;
        let created = self.store.create_teacher(teacher).await?;
        info!("Created teacher {} ({})", created.id, created.name);
        Ok(TeacherReport::build(created, Vec::new()))
    }

    pub async fn update_teacher(
        &self,
        teacher_id: TeacherId,
        patch: TeacherPatch,
    ) -> Result<TeacherReport, ServiceError> {
        let mut teacher = self.store.get_teacher(teacher_id).await?;
        if let Some(name) = &patch.name {
            if name.trim().is_empty() {
                return Err(ServiceError::Invalid("teacher name is required".to_string()));
            }
            teacher.name = name.trim().to_string();
        }
        apply_text(&mut teacher.context.mention, &patch.mention);
        apply_text(&mut teacher.context.parcours, &patch.parcours);
        apply_text(&mut teacher.context.niveau, &patch.niveau);
        apply_text(&mut teacher.context.ue, &patch.ue);
        apply_text(&mut teacher.context.ec, &patch.ec);
        if let Some(hours) = patch.planned_hours {
            check_hours("planned hours", hours)?;
            teacher.planned_hours = hours;
        }
        self.store.update_teacher(teacher).await?;
        self.report_for(teacher_id).await
    }

    /// Deletes the teacher after removing every session it owns.
    pub async fn delete_teacher(&self, teacher_id: TeacherId) -> Result<DeletionReport, ServiceError> {
        self.store.get_teacher(teacher_id).await?;
        let deleted_sessions = self
            .store
            .delete_sessions(&SessionFilter::for_teacher(teacher_id))
            .await?;
        self.store.delete_teacher(teacher_id).await?;
        info!(
            "Deleted teacher {} and {} sessions",
            teacher_id, deleted_sessions
        );
        Ok(DeletionReport {
            teacher_id,
            deleted_sessions,
        })
    }

    /// Records a session for an existing teacher and returns the owner's
    /// refreshed report.
    pub async fn add_session(
        &self,
        teacher_id: TeacherId,
        input: SessionInput,
    ) -> Result<(Session, TeacherReport), ServiceError> {
        let owner = self.store.get_teacher(teacher_id).await?;
        if let Some(duration) = input.duration {
            check_hours("duration", duration)?;
        }
        let context = if input.context.is_empty() {
            owner.context.clone()
        } else {
            input.context
        };
        let session = self
            .store
            .create_session(NewSession {
                session_type: input.session_type,
                date: input.date,
                duration: duration_or_span(input.duration, &input.start_time, &input.end_time),
                start_time: input.start_time.as_deref().and_then(clean_field),
                end_time: input.end_time.as_deref().and_then(clean_field),
                context,
                teacher_id,
                teacher_name: owner.name.clone(),
                entry_status: input.entry_status,
            })
            .await?;
        let report = self.report_for(teacher_id).await?;
        Ok((session, report))
    }

    pub async fn update_session(
        &self,
        session_id: SessionId,
        patch: SessionPatch,
    ) -> Result<(Session, TeacherReport), ServiceError> {
        let mut session = self.store.get_session(session_id).await?;
        let previous_owner = session.teacher_id;

        if let Some(teacher_id) = patch.teacher_id {
            if teacher_id != session.teacher_id {
                let owner = self.store.get_teacher(teacher_id).await?;
                session.teacher_id = owner.id;
                session.teacher_name = owner.name;
            }
        }
        if let Some(session_type) = patch.session_type {
            session.session_type = session_type;
        }
        if patch.date.is_some() {
            session.date = patch.date;
        }
        apply_text(&mut session.start_time, &patch.start_time);
        apply_text(&mut session.end_time, &patch.end_time);
        apply_text(&mut session.context.mention, &patch.mention);
        apply_text(&mut session.context.parcours, &patch.parcours);
        apply_text(&mut session.context.niveau, &patch.niveau);
        apply_text(&mut session.context.ue, &patch.ue);
        apply_text(&mut session.context.ec, &patch.ec);
        if let Some(status) = patch.entry_status {
            session.entry_status = status;
        }
        if let Some(duration) = patch.duration {
            check_hours("duration", duration)?;
            session.duration = duration;
        }
        let times_changed = patch.start_time.is_some() || patch.end_time.is_some();
        if patch.duration.is_none() && times_changed {
            session.duration = duration_or_span(None, &session.start_time, &session.end_time);
        }

        let updated = self.store.update_session(session).await?;
        if updated.teacher_id != previous_owner {
            info!(
                "Session {} moved from teacher {} to {}",
                updated.id, previous_owner, updated.teacher_id
            );
        }
        let report = self.report_for(updated.teacher_id).await?;
        Ok((updated, report))
    }

    /// Deletes one session; returns the former owner's refreshed report.
    pub async fn delete_session(&self, session_id: SessionId) -> Result<TeacherReport, ServiceError> {
        let removed = self.store.delete_session(session_id).await?;
        self.report_for(removed.teacher_id).await
    }

    pub async fn list_sessions(&self, filter: &SessionFilter) -> Result<Vec<Session>, ServiceError> {
        Ok(self.store.find_sessions(filter).await?)
    }

    /// Sessions of a teacher restricted to the teacher's own program
    /// context. Empty context parts do not filter.
    pub async fn sessions_in_teacher_context(
        &self,
        teacher_id: TeacherId,
    ) -> Result<Vec<Session>, ServiceError> {
        let teacher = self.store.get_teacher(teacher_id).await?;
        let filter = SessionFilter {
            teacher_id: Some(teacher_id),
            mention: teacher.context.mention.clone(),
            parcours: teacher.context.parcours.clone(),
            niveau: teacher.context.niveau.clone(),
            ..Default::default()
        };
        let sessions = self.store.find_sessions(&filter).await?;
        if sessions.is_empty() {
            warn!("Teacher {} has no sessions in its own context", teacher_id);
        }
        Ok(sessions)
    }

    pub async fn session_type_stats(&self) -> Result<Vec<SessionTypeStats>, ServiceError> {
        let sessions = self.store.find_sessions(&SessionFilter::default()).await?;
        Ok(hours::session_type_stats(&sessions))
    }

    pub async fn global_stats(&self) -> Result<GlobalStats, ServiceError> {
        let reports = self.list_teachers().await?;
        let sessions = self.store.find_sessions(&SessionFilter::default()).await?;
        Ok(hours::global_stats(&reports, &sessions))
    }
}
