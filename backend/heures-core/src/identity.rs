// src/identity.rs
//
// Decides which teacher record an import row belongs to.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::StoreError;
use crate::model::{IdentityKey, NewTeacher, Teacher, TeachingContext};
use crate::store::{HoursStore, TeacherFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ImportMode {
    /// Rows describe teachers and their planned workload.
    TeacherImport,
    /// Rows describe sessions; the teacher is only looked up by name.
    CourseImport,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ResolutionAction {
    Matched,
    #[serde(rename_all = "camelCase")]
    Updated { previous_planned_hours: Decimal },
    CreatedNewContext,
    CreatedNew,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Resolution {
    pub teacher: Teacher,
    pub action: ResolutionAction,
}

/// Name, context and workload as read from one import row.
#[derive(Debug, Clone, PartialEq)]
pub struct RowIdentity {
    pub name: String,
    pub context: TeachingContext,
    pub planned_hours: Decimal,
}

impl RowIdentity {
    pub fn key(&self) -> IdentityKey {
        IdentityKey::new(&self.name, &self.context)
    }
}

pub struct IdentityResolver<'a, S: HoursStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: HoursStore + ?Sized> IdentityResolver<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Resolves `row` to a teacher, creating or updating records as the
    /// mode requires. `Ok(None)` means a course row found no owner and
    /// `create_missing` was off.
    pub async fn resolve(
        &self,
        row: &RowIdentity,
        mode: ImportMode,
        create_missing: bool,
    ) -> Result<Option<Resolution>, StoreError> {
        match mode {
            ImportMode::TeacherImport => self.resolve_teacher_row(row).await.map(Some),
            ImportMode::CourseImport => self.resolve_course_row(row, create_missing).await,
        }
    }

    async fn resolve_teacher_row(&self, row: &RowIdentity) -> Result<Resolution, StoreError> {
        if let Some(existing) = self.store.find_teacher(&row.key()).await? {
            if existing.planned_hours == row.planned_hours {
                debug!("Teacher {} unchanged", existing.id);
                return Ok(Resolution {
                    teacher: existing,
                    action: ResolutionAction::Matched,
                });
            }
            let previous = existing.planned_hours;
            let mut changed = existing;
            changed.planned_hours = row.planned_hours;
            let teacher = self.store.update_teacher(changed).await?;
            info!(
                "Teacher {} planned hours {} -> {}",
                teacher.id, previous, teacher.planned_hours
            );
            return Ok(Resolution {
                teacher,
                action: ResolutionAction::Updated {
                    previous_planned_hours: previous,
                },
            });
        }

        let same_name = self.same_name(row).await?;
        let context = row.context.clone();
        self.create(row, context, !same_name.is_empty()).await
    }

    async fn resolve_course_row(
        &self,
        row: &RowIdentity,
        create_missing: bool,
    ) -> Result<Option<Resolution>, StoreError> {
        if let Some(existing) = self.store.find_teacher(&row.key()).await? {
            return Ok(Some(Resolution {
                teacher: existing,
                action: ResolutionAction::Matched,
            }));
        }

        let same_name = self.same_name(row).await?;
        let triple = row.context.triple();
        if let Some(in_context) = same_name.iter().find(|t| t.context.triple().same_as(&triple)) {
            return Ok(Some(Resolution {
                teacher: in_context.clone(),
                action: ResolutionAction::Matched,
            }));
        }

        // A row without mention, parcours or niveau names no other context.
        if triple.is_empty() {
            if let Some(earliest) = same_name.first() {
                return Ok(Some(Resolution {
                    teacher: earliest.clone(),
                    action: ResolutionAction::Matched,
                }));
            }
        }

        let context = row.context.program_only();
        if create_missing {
            // An identical program-level record may exist under a UE/EC the
            // row did not carry; reuse it instead of colliding with it.
            if let Some(existing) = self
                .store
                .find_teacher(&IdentityKey::new(&row.name, &context))
                .await?
            {
                return Ok(Some(Resolution {
                    teacher: existing,
                    action: ResolutionAction::Matched,
                }));
            }
            return self.create(row, context, !same_name.is_empty()).await.map(Some);
        }

        Ok(same_name.into_iter().next().map(|teacher| Resolution {
            teacher,
            action: ResolutionAction::Matched,
        }))
    }

    /// Teachers sharing the row's normalized name, oldest first.
    async fn same_name(&self, row: &RowIdentity) -> Result<Vec<Teacher>, StoreError> {
        self.store
            .find_teachers(&TeacherFilter::by_name(&row.name))
            .await
    }

    async fn create(
        &self,
        row: &RowIdentity,
        context: TeachingContext,
        known_name: bool,
    ) -> Result<Resolution, StoreError> {
        let teacher = self
            .store
            .create_teacher(NewTeacher::new(&row.name, context, row.planned_hours))
            .await?;
        let action = if known_name {
            info!(
                "Teacher {} gets a new context record {} ({})",
                teacher.name,
                teacher.id,
                teacher.context.triple()
            );
            ResolutionAction::CreatedNewContext
        } else {
            info!("Created teacher {} ({})", teacher.id, teacher.name);
            ResolutionAction::CreatedNew
        };
        Ok(Resolution { teacher, action })
    }
}
