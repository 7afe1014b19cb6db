// src/store.rs
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{io_context, Entity, StoreError};
use crate::model::{
    normalize_key_part, IdentityKey, NewSession, NewTeacher, Session, SessionId, SessionType,
    Teacher, TeacherId,
};

// --- Filters ---

fn field_matches(wanted: &Option<String>, actual: &Option<String>) -> bool {
    match wanted {
        None => true,
        Some(wanted) => actual
            .as_deref()
            .map(|actual| normalize_key_part(actual) == normalize_key_part(wanted))
            .unwrap_or(false),
    }
}

/// Partial teacher lookup. Unset fields match anything; set fields compare
/// on their normalized form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherFilter {
    pub name: Option<String>,
    pub mention: Option<String>,
    pub parcours: Option<String>,
    pub niveau: Option<String>,
}

impl TeacherFilter {
    pub fn by_name(name: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            ..Default::default()
        }
    }

    pub fn matches(&self, teacher: &Teacher) -> bool {
        let name_ok = self
            .name
            .as_deref()
            .map(|name| normalize_key_part(name) == teacher.name_key())
            .unwrap_or(true);
        name_ok
            && field_matches(&self.mention, &teacher.context.mention)
            && field_matches(&self.parcours, &teacher.context.parcours)
            && field_matches(&self.niveau, &teacher.context.niveau)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionFilter {
    pub teacher_id: Option<TeacherId>,
    /// Inclusive lower date bound. Undated sessions never pass a bound.
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub mention: Option<String>,
    pub parcours: Option<String>,
    pub niveau: Option<String>,
    pub session_type: Option<SessionType>,
}

impl SessionFilter {
    pub fn for_teacher(teacher_id: TeacherId) -> Self {
        Self {
            teacher_id: Some(teacher_id),
            ..Default::default()
        }
    }

    pub fn matches(&self, session: &Session) -> bool {
        if let Some(teacher_id) = self.teacher_id {
            if session.teacher_id != teacher_id {
                return false;
            }
        }
        if let Some(from) = self.from {
            if !session.date.map(|d| d >= from).unwrap_or(false) {
                return false;
            }
        }
        if let Some(to) = self.to {
            if !session.date.map(|d| d <= to).unwrap_or(false) {
                return false;
            }
        }
        if let Some(session_type) = &self.session_type {
            if &session.session_type != session_type {
                return false;
            }
        }
        field_matches(&self.mention, &session.context.mention)
            && field_matches(&self.parcours, &session.context.parcours)
            && field_matches(&self.niveau, &session.context.niveau)
    }
}

/// Most recent first, then by start time; undated sessions go last.
pub fn sort_sessions(sessions: &mut [Session]) {
    sessions.sort_by(|a, b| {
        let by_date = match (a.date, b.date) {
            (Some(a), Some(b)) => b.cmp(&a),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        by_date
            .then_with(|| a.start_time.cmp(&b.start_time))
            .then_with(|| a.id.cmp(&b.id))
    });
}

// --- Store trait ---

/// Persistence contract for teachers and their sessions.
///
/// Lookups by id fail with `StoreError::NotFound`; `find_*` methods return
/// empty results instead. Teachers come back in creation order.
#[async_trait]
pub trait HoursStore: Send + Sync {
    async fn get_teacher(&self, id: TeacherId) -> Result<Teacher, StoreError>;

    /// Exact match on the normalized identity key.
    async fn find_teacher(&self, key: &IdentityKey) -> Result<Option<Teacher>, StoreError>;

    async fn find_teachers(&self, filter: &TeacherFilter) -> Result<Vec<Teacher>, StoreError>;

    async fn create_teacher(&self, teacher: NewTeacher) -> Result<Teacher, StoreError>;

    async fn update_teacher(&self, teacher: Teacher) -> Result<Teacher, StoreError>;

    /// Removes the teacher record only. Owned sessions must be removed by
    /// the caller beforehand.
    async fn delete_teacher(&self, id: TeacherId) -> Result<Teacher, StoreError>;

    async fn get_session(&self, id: SessionId) -> Result<Session, StoreError>;

    async fn find_sessions(&self, filter: &SessionFilter) -> Result<Vec<Session>, StoreError>;

    async fn create_session(&self, session: NewSession) -> Result<Session, StoreError>;

    async fn update_session(&self, session: Session) -> Result<Session, StoreError>;

    async fn delete_session(&self, id: SessionId) -> Result<Session, StoreError>;

    /// Deletes every session matching `filter` and returns how many went.
    async fn delete_sessions(&self, filter: &SessionFilter) -> Result<usize, StoreError>;
}

// --- In-memory store ---

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Snapshot {
    next_teacher_id: u64,
    next_session_id: u64,
    teachers: Vec<Teacher>,
    sessions: Vec<Session>,
}

#[derive(Debug, Default)]
struct StoreState {
    next_teacher_id: u64,
    next_session_id: u64,
    teachers: BTreeMap<TeacherId, Teacher>,
    sessions: BTreeMap<SessionId, Session>,
    identity_index: HashMap<IdentityKey, TeacherId>,
}

impl StoreState {
    fn from_snapshot(snapshot: Snapshot) -> Self {
        let mut state = StoreState::default();
        for teacher in snapshot.teachers {
            let key = teacher.identity_key();
            if let Some(existing) = state.identity_index.get(&key) {
                warn!(
                    "Teacher {} duplicates identity of teacher {}; lookups keep the older one",
                    teacher.id, existing
                );
            } else {
                state.identity_index.insert(key, teacher.id);
            }
            state.teachers.insert(teacher.id, teacher);
        }
        for session in snapshot.sessions {
            state.sessions.insert(session.id, session);
        }
        let max_teacher = state.teachers.keys().next_back().copied().unwrap_or(0);
        let max_session = state.sessions.keys().next_back().copied().unwrap_or(0);
        state.next_teacher_id = snapshot.next_teacher_id.max(max_teacher + 1);
        state.next_session_id = snapshot.next_session_id.max(max_session + 1);
        state
    }

    fn to_snapshot(&self) -> Snapshot {
        Snapshot {
            next_teacher_id: self.next_teacher_id,
            next_session_id: self.next_session_id,
            teachers: self.teachers.values().cloned().collect(),
            sessions: self.sessions.values().cloned().collect(),
        }
    }

    fn allocate_teacher_id(&mut self) -> TeacherId {
        let id = self.next_teacher_id.max(1);
        self.next_teacher_id = id + 1;
        id
    }

    fn allocate_session_id(&mut self) -> SessionId {
        let id = self.next_session_id.max(1);
        self.next_session_id = id + 1;
        id
    }

    fn check_identity_free(&self, key: &IdentityKey, own_id: Option<TeacherId>) -> Result<(), StoreError> {
        match self.identity_index.get(key) {
            Some(existing) if Some(*existing) != own_id => Err(StoreError::Rejected(format!(
                "teacher {} already has this name and context",
                existing
            ))),
            _ => Ok(()),
        }
    }
}

fn check_duration(session_duration: &Decimal) -> Result<(), StoreError> {
    if *session_duration < Decimal::ZERO {
        return Err(StoreError::Rejected(format!(
            "session duration must not be negative (got {})",
            session_duration
        )));
    }
    Ok(())
}

/// Shared in-memory store. Clones are handles to the same data.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<StoreState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn from_snapshot(snapshot: Snapshot) -> Self {
        Self {
            state: Arc::new(Mutex::new(StoreState::from_snapshot(snapshot))),
        }
    }

    async fn snapshot(&self) -> Snapshot {
        self.state.lock().await.to_snapshot()
    }

    async fn restore(&self, snapshot: Snapshot) {
        *self.state.lock().await = StoreState::from_snapshot(snapshot);
    }
}

#[async_trait]
impl HoursStore for MemoryStore {
    async fn get_teacher(&self, id: TeacherId) -> Result<Teacher, StoreError> {
        let state = self.state.lock().await;
        state.teachers.get(&id).cloned().ok_or(StoreError::NotFound {
            entity: Entity::Teacher,
            id,
        })
    }

    async fn find_teacher(&self, key: &IdentityKey) -> Result<Option<Teacher>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .identity_index
            .get(key)
            .and_then(|id| state.teachers.get(id))
            .cloned())
    }

    async fn find_teachers(&self, filter: &TeacherFilter) -> Result<Vec<Teacher>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .teachers
            .values()
            .filter(|t| filter.matches(t))
            .cloned()
            .collect())
    }

    async fn create_teacher(&self, teacher: NewTeacher) -> Result<Teacher, StoreError> {
        if teacher.name.trim().is_empty() {
            return Err(StoreError::Rejected("teacher name is required".to_string()));
        }
        if teacher.planned_hours < Decimal::ZERO {
            return Err(StoreError::Rejected(format!(
                "planned hours must not be negative (got {})",
                teacher.planned_hours
            )));
        }

        let mut state = self.state.lock().await;
        let key = IdentityKey::new(&teacher.name, &teacher.context);
        state.check_identity_free(&key, None)?;

        let id = state.allocate_teacher_id();
        let created = Teacher {
            id,
            name: teacher.name,
            context: teacher.context,
            planned_hours: teacher.planned_hours,
            created_at: Utc::now(),
        };
        state.identity_index.insert(key, id);
        state.teachers.insert(id, created.clone());
        debug!("Created teacher {} ({})", id, created.name);
        Ok(created)
    }

    async fn update_teacher(&self, teacher: Teacher) -> Result<Teacher, StoreError> {
        let mut state = self.state.lock().await;
        let old_key = match state.teachers.get(&teacher.id) {
            Some(existing) => existing.identity_key(),
            None => {
                return Err(StoreError::NotFound {
                    entity: Entity::Teacher,
                    id: teacher.id,
                })
            }
        };
        let new_key = teacher.identity_key();
        state.check_identity_free(&new_key, Some(teacher.id))?;

        if old_key != new_key {
            state.identity_index.remove(&old_key);
            state.identity_index.insert(new_key, teacher.id);
        }
        state.teachers.insert(teacher.id, teacher.clone());
        debug!("Updated teacher {}", teacher.id);
        Ok(teacher)
    }

    async fn delete_teacher(&self, id: TeacherId) -> Result<Teacher, StoreError> {
        let mut state = self.state.lock().await;
        let removed = state.teachers.remove(&id).ok_or(StoreError::NotFound {
            entity: Entity::Teacher,
            id,
        })?;
        let key = removed.identity_key();
        if state.identity_index.get(&key) == Some(&id) {
            state.identity_index.remove(&key);
        }
        debug!("Deleted teacher {}", id);
        Ok(removed)
    }

    async fn get_session(&self, id: SessionId) -> Result<Session, StoreError> {
        let state = self.state.lock().await;
        state.sessions.get(&id).cloned().ok_or(StoreError::NotFound {
            entity: Entity::Session,
            id,
        })
    }

    async fn find_sessions(&self, filter: &SessionFilter) -> Result<Vec<Session>, StoreError> {
        let state = self.state.lock().await;
        let mut found: Vec<Session> = state
            .sessions
            .values()
            .filter(|s| filter.matches(s))
            .cloned()
            .collect();
        sort_sessions(&mut found);
        Ok(found)
    }

    async fn create_session(&self, session: NewSession) -> Result<Session, StoreError> {
        check_duration(&session.duration)?;
        let mut state = self.state.lock().await;
        if !state.teachers.contains_key(&session.teacher_id) {
            return Err(StoreError::NotFound {
                entity: Entity::Teacher,
                id: session.teacher_id,
            });
        }

        let id = state.allocate_session_id();
        let created = Session {
            id,
            session_type: session.session_type,
            date: session.date,
            start_time: session.start_time,
            end_time: session.end_time,
            duration: session.duration,
            context: session.context,
            teacher_id: session.teacher_id,
            teacher_name: session.teacher_name,
            entry_status: session.entry_status,
        };
        state.sessions.insert(id, created.clone());
        debug!("Created session {} for teacher {}", id, created.teacher_id);
        Ok(created)
    }

    async fn update_session(&self, session: Session) -> Result<Session, StoreError> {
        check_duration(&session.duration)?;
        let mut state = self.state.lock().await;
        if !state.sessions.contains_key(&session.id) {
            return Err(StoreError::NotFound {
                entity: Entity::Session,
                id: session.id,
            });
        }
        if !state.teachers.contains_key(&session.teacher_id) {
            return Err(StoreError::NotFound {
                entity: Entity::Teacher,
                id: session.teacher_id,
            });
        }
        state.sessions.insert(session.id, session.clone());
        debug!("Updated session {}", session.id);
        Ok(session)
    }

    async fn delete_session(&self, id: SessionId) -> Result<Session, StoreError> {
        let mut state = self.state.lock().await;
        let removed = state.sessions.remove(&id).ok_or(StoreError::NotFound {
            entity: Entity::Session,
            id,
        })?;
        debug!("Deleted session {}", id);
        Ok(removed)
    }

    async fn delete_sessions(&self, filter: &SessionFilter) -> Result<usize, StoreError> {
        let mut state = self.state.lock().await;
        let before = state.sessions.len();
        state.sessions.retain(|_, s| !filter.matches(s));
        let removed = before - state.sessions.len();
        debug!("Deleted {} sessions matching filter", removed);
        Ok(removed)
    }
}

// --- JSON file store ---

/// A `MemoryStore` written back to a JSON file after every mutation.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
    inner: MemoryStore,
    // Serializes mutate-then-write so snapshots land in order.
    write_lock: Arc<Mutex<()>>,
}

impl JsonFileStore {
    /// Opens the store at `path`. A missing file is an empty store.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let snapshot = if path.exists() {
            let json = fs::read_to_string(&path)
                .map_err(|e| io_context(e, format!("Failed to read {}", path.display())))?;
            if json.trim().is_empty() {
                Snapshot::default()
            } else {
                serde_json::from_str(&json)?
            }
        } else {
            info!("No data file at {}, starting empty", path.display());
            Snapshot::default()
        };
        info!(
            "Loaded {} teachers and {} sessions from {}",
            snapshot.teachers.len(),
            snapshot.sessions.len(),
            path.display()
        );
        Ok(Self {
            path,
            inner: MemoryStore::from_snapshot(snapshot),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self) -> Result<(), StoreError> {
        let snapshot = self.inner.snapshot().await;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| {
                    io_context(e, format!("Failed to create directory {}", parent.display()))
                })?;
            }
        }
        let json = serde_json::to_string_pretty(&snapshot)?;
        fs::write(&self.path, json)
            .map_err(|e| io_context(e, format!("Failed to write {}", self.path.display())))?;
        debug!("Wrote snapshot to {}", self.path.display());
        Ok(())
    }

    /// Writes the current state, or puts `before` back in memory when the
    /// write fails so memory and disk stay in step.
    async fn persist_or_restore(&self, before: Snapshot) -> Result<(), StoreError> {
        if let Err(e) = self.persist().await {
            warn!(
                "Write to {} failed, rolling back in-memory change: {}",
                self.path.display(),
                e
            );
            self.inner.restore(before).await;
            return Err(e);
        }
        Ok(())
    }
}

#[async_trait]
impl HoursStore for JsonFileStore {
    async fn get_teacher(&self, id: TeacherId) -> Result<Teacher, StoreError> {
        self.inner.get_teacher(id).await
    }

    async fn find_teacher(&self, key: &IdentityKey) -> Result<Option<Teacher>, StoreError> {
        self.inner.find_teacher(key).await
    }

    async fn find_teachers(&self, filter: &TeacherFilter) -> Result<Vec<Teacher>, StoreError> {
        self.inner.find_teachers(filter).await
    }

    async fn create_teacher(&self, teacher: NewTeacher) -> Result<Teacher, StoreError> {
        let _guard = self.write_lock.lock().await;
        let before = self.inner.snapshot().await;
        let created = self.inner.create_teacher(teacher).await?;
        self.persist_or_restore(before).await?;
        Ok(created)
    }

    async fn update_teacher(&self, teacher: Teacher) -> Result<Teacher, StoreError> {
        let _guard = self.write_lock.lock().await;
        let before = self.inner.snapshot().await;
        let updated = self.inner.update_teacher(teacher).await?;
        self.persist_or_restore(before).await?;
        Ok(updated)
    }

    async fn delete_teacher(&self, id: TeacherId) -> Result<Teacher, StoreError> {
        let _guard = self.write_lock.lock().await;
        let before = self.inner.snapshot().await;
        let removed = self.inner.delete_teacher(id).await?;
        self.persist_or_restore(before).await?;
        Ok(removed)
    }

    async fn get_session(&self, id: SessionId) -> Result<Session, StoreError> {
        self.inner.get_session(id).await
    }

    async fn find_sessions(&self, filter: &SessionFilter) -> Result<Vec<Session>, StoreError> {
        self.inner.find_sessions(filter).await
    }

    async fn create_session(&self, session: NewSession) -> Result<Session, StoreError> {
        let _guard = self.write_lock.lock().await;
        let before = self.inner.snapshot().await;
        let created = self.inner.create_session(session).await?;
        self.persist_or_restore(before).await?;
        Ok(created)
    }

    async fn update_session(&self, session: Session) -> Result<Session, StoreError> {
        let _guard = self.write_lock.lock().await;
        let before = self.inner.snapshot().await;
        let updated = self.inner.update_session(session).await?;
        self.persist_or_restore(before).await?;
        Ok(updated)
    }

    async fn delete_session(&self, id: SessionId) -> Result<Session, StoreError> {
        let _guard = self.write_lock.lock().await;
        let before = self.inner.snapshot().await;
        let removed = self.inner.delete_session(id).await?;
        self.persist_or_restore(before).await?;
        Ok(removed)
    }

    async fn delete_sessions(&self, filter: &SessionFilter) -> Result<usize, StoreError> {
        let _guard = self.write_lock.lock().await;
        let before = self.inner.snapshot().await;
        let removed = self.inner.delete_sessions(filter).await?;
        if removed > 0 {
            self.persist_or_restore(before).await?;
        }
        Ok(removed)
    }
}
