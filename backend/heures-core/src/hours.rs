// src/hours.rs
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::model::{ContextTriple, Session, SessionType, Teacher};

// --- Per-teacher summary ---

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextGroup {
    pub context: ContextTriple,
    /// `mention / parcours / niveau`, with `N/A` for missing parts.
    pub label: String,
    pub sessions: Vec<Session>,
    pub total_hours: Decimal,
}

/// Hours of one teacher, always derived from the sessions passed in.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HourSummary {
    pub planned_hours: Decimal,
    pub total_hours: Decimal,
    pub normal_hours: Decimal,
    pub overtime_hours: Decimal,
    pub contexts: Vec<ContextTriple>,
    pub grouped_by_context: Vec<ContextGroup>,
}

impl HourSummary {
    pub fn is_multi_context(&self) -> bool {
        self.contexts.len() > 1
    }

    pub fn session_count(&self) -> usize {
        self.grouped_by_context.iter().map(|g| g.sessions.len()).sum()
    }
}

/// Hour addition that saturates at `Decimal::MAX` instead of overflowing.
fn add_hours(acc: Decimal, hours: Decimal) -> Decimal {
    acc.checked_add(hours).unwrap_or(Decimal::MAX)
}

fn sum_hours(hours: impl IntoIterator<Item = Decimal>) -> Decimal {
    hours.into_iter().fold(Decimal::ZERO, add_hours)
}

/// Splits a total into (normal, overtime) against the planned volume.
pub fn split_hours(total: Decimal, planned: Decimal) -> (Decimal, Decimal) {
    let overtime = total
        .checked_sub(planned)
        .unwrap_or(Decimal::MAX)
        .max(Decimal::ZERO);
    (total - overtime, overtime)
}

pub fn compute_hour_summary(teacher: &Teacher, sessions: &[Session]) -> HourSummary {
    let total = sum_hours(sessions.iter().map(Session::counted_hours));
    let (normal, overtime) = split_hours(total, teacher.planned_hours);

    // Grouping compares normalized triples but labels with the first
    // spelling seen, so groups stay in first-appearance order.
    let mut order: Vec<(Option<String>, Option<String>, Option<String>)> = Vec::new();
    let mut groups: HashMap<(Option<String>, Option<String>, Option<String>), ContextGroup> =
        HashMap::new();
    for session in sessions {
        let triple = session.context.triple();
        let key = triple.match_key();
        let group = groups.entry(key.clone()).or_insert_with(|| {
            order.push(key);
            ContextGroup {
                label: triple.label(),
                context: triple,
                sessions: Vec::new(),
                total_hours: Decimal::ZERO,
            }
        });
        group.total_hours = add_hours(group.total_hours, session.counted_hours());
        group.sessions.push(session.clone());
    }

    let grouped_by_context: Vec<ContextGroup> = order
        .iter()
        .filter_map(|key| groups.remove(key))
        .collect();
    let contexts = grouped_by_context.iter().map(|g| g.context.clone()).collect();

    HourSummary {
        planned_hours: teacher.planned_hours,
        total_hours: total,
        normal_hours: normal,
        overtime_hours: overtime,
        contexts,
        grouped_by_context,
    }
}

/// Teacher record with freshly derived hours and its sessions.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherReport {
    pub teacher: Teacher,
    pub summary: HourSummary,
    pub sessions: Vec<Session>,
}

impl TeacherReport {
    pub fn build(teacher: Teacher, sessions: Vec<Session>) -> Self {
        let summary = compute_hour_summary(&teacher, &sessions);
        Self {
            teacher,
            summary,
            sessions,
        }
    }
}

// --- Statistics ---

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionTypeStats {
    pub session_type: SessionType,
    pub session_count: usize,
    pub total_hours: Decimal,
}

/// Per-type counts and hours, largest total first.
pub fn session_type_stats(sessions: &[Session]) -> Vec<SessionTypeStats> {
    let mut by_type: BTreeMap<SessionType, (usize, Decimal)> = BTreeMap::new();
    for session in sessions {
        let entry = by_type
            .entry(session.session_type.clone())
            .or_insert((0, Decimal::ZERO));
        entry.0 += 1;
        entry.1 = add_hours(entry.1, session.counted_hours());
    }
    let mut stats: Vec<SessionTypeStats> = by_type
        .into_iter()
        .map(|(session_type, (session_count, total_hours))| SessionTypeStats {
            session_type,
            session_count,
            total_hours,
        })
        .collect();
    stats.sort_by(|a, b| b.total_hours.cmp(&a.total_hours));
    stats
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalStats {
    pub teacher_count: usize,
    pub session_count: usize,
    pub total_hours: Decimal,
    pub overtime_teacher_count: usize,
    pub total_overtime_hours: Decimal,
    pub multi_context_names: usize,
    pub by_type: Vec<SessionTypeStats>,
}

pub fn global_stats(reports: &[TeacherReport], sessions: &[Session]) -> GlobalStats {
    let overtime: Vec<Decimal> = reports
        .iter()
        .map(|r| r.summary.overtime_hours)
        .filter(|h| *h > Decimal::ZERO)
        .collect();

    // Names that own more than one teacher record.
    let mut per_name: HashMap<String, BTreeSet<u64>> = HashMap::new();
    for report in reports {
        per_name
            .entry(report.teacher.name_key())
            .or_default()
            .insert(report.teacher.id);
    }

    GlobalStats {
        teacher_count: reports.len(),
        session_count: sessions.len(),
        total_hours: sum_hours(sessions.iter().map(Session::counted_hours)),
        overtime_teacher_count: overtime.len(),
        total_overtime_hours: sum_hours(overtime.iter().copied()),
        multi_context_names: per_name.values().filter(|ids| ids.len() > 1).count(),
        by_type: session_type_stats(sessions),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EntryStatus, TeachingContext};
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn teacher(planned: Decimal) -> Teacher {
        Teacher {
            id: 1,
            name: "Dupont".to_string(),
            context: TeachingContext::new("Info", "GL", "L3", "", ""),
            planned_hours: planned,
            created_at: Utc::now(),
        }
    }

    fn session(id: u64, hours: Decimal, mention: &str, kind: SessionType) -> Session {
        Session {
            id,
            session_type: kind,
            date: None,
            start_time: None,
            end_time: None,
            duration: hours,
            context: TeachingContext::new(mention, "GL", "L3", "", ""),
            teacher_id: 1,
            teacher_name: "Dupont".to_string(),
            entry_status: EntryStatus::Entered,
        }
    }

    #[test]
    fn normal_plus_overtime_is_total() {
        let t = teacher(dec!(24));
        let sessions: Vec<Session> = (1..=11)
            .map(|i| session(i, dec!(2.5), "Info", SessionType::Cours))
            .collect();
        let summary = compute_hour_summary(&t, &sessions);

        assert_eq!(summary.total_hours, dec!(27.5));
        assert_eq!(summary.overtime_hours, dec!(3.5));
        assert_eq!(summary.normal_hours, dec!(24));
        assert_eq!(
            summary.normal_hours + summary.overtime_hours,
            summary.total_hours
        );
    }

    #[test]
    fn under_plan_has_no_overtime() {
        let t = teacher(dec!(24));
        let sessions = vec![session(1, dec!(10), "Info", SessionType::Td)];
        let summary = compute_hour_summary(&t, &sessions);
        assert_eq!(summary.overtime_hours, Decimal::ZERO);
        assert_eq!(summary.normal_hours, dec!(10));
    }

    #[test]
    fn zero_plan_makes_everything_overtime() {
        let t = teacher(Decimal::ZERO);
        let sessions = vec![session(1, dec!(3), "Info", SessionType::Td)];
        let summary = compute_hour_summary(&t, &sessions);
        assert_eq!(summary.overtime_hours, dec!(3));
        assert_eq!(summary.normal_hours, Decimal::ZERO);
    }

    #[test]
    fn negative_durations_count_as_zero() {
        let t = teacher(dec!(24));
        let sessions = vec![
            session(1, dec!(-5), "Info", SessionType::Td),
            session(2, dec!(2), "Info", SessionType::Td),
        ];
        assert_eq!(compute_hour_summary(&t, &sessions).total_hours, dec!(2));
    }

    #[test]
    fn huge_stored_durations_saturate() {
        let t = teacher(dec!(24));
        let sessions = vec![
            session(1, Decimal::MAX, "Info", SessionType::Cours),
            session(2, Decimal::MAX, "Info", SessionType::Cours),
        ];
        let summary = compute_hour_summary(&t, &sessions);
        assert_eq!(summary.total_hours, Decimal::MAX);
        assert_eq!(summary.grouped_by_context[0].total_hours, Decimal::MAX);
        assert_eq!(
            summary.normal_hours + summary.overtime_hours,
            summary.total_hours
        );

        let report = TeacherReport::build(t, sessions.clone());
        let stats = global_stats(&[report], &sessions);
        assert_eq!(stats.total_hours, Decimal::MAX);
        assert_eq!(stats.by_type[0].total_hours, Decimal::MAX);
    }

    #[test]
    fn summary_is_idempotent() {
        let t = teacher(dec!(4));
        let sessions = vec![
            session(1, dec!(3), "Info", SessionType::Cours),
            session(2, dec!(2), "Maths", SessionType::Tp),
        ];
        assert_eq!(
            compute_hour_summary(&t, &sessions),
            compute_hour_summary(&t, &sessions)
        );
    }

    #[test]
    fn sessions_group_by_triple_with_placeholder() {
        let t = teacher(dec!(24));
        let sessions = vec![
            session(1, dec!(2), "Info", SessionType::Cours),
            session(2, dec!(3), "", SessionType::Cours),
            session(3, dec!(1), "info", SessionType::Td),
        ];
        let summary = compute_hour_summary(&t, &sessions);

        assert!(summary.is_multi_context());
        assert_eq!(summary.contexts.len(), 2);
        assert_eq!(summary.grouped_by_context[0].label, "Info / GL / L3");
        assert_eq!(summary.grouped_by_context[0].total_hours, dec!(3));
        assert_eq!(summary.grouped_by_context[0].sessions.len(), 2);
        assert_eq!(summary.grouped_by_context[1].label, "N/A / GL / L3");
        assert_eq!(summary.session_count(), 3);
    }

    #[test]
    fn type_stats_sort_by_hours() {
        let sessions = vec![
            session(1, dec!(1), "Info", SessionType::Td),
            session(2, dec!(4), "Info", SessionType::Cours),
            session(3, dec!(2), "Info", SessionType::Td),
        ];
        let stats = session_type_stats(&sessions);
        assert_eq!(stats[0].session_type, SessionType::Cours);
        assert_eq!(stats[1].session_count, 2);
        assert_eq!(stats[1].total_hours, dec!(3));
    }

    #[test]
    fn global_stats_count_overtime_teachers() {
        let busy = TeacherReport::build(
            teacher(dec!(2)),
            vec![session(1, dec!(5), "Info", SessionType::Cours)],
        );
        let mut calm_teacher = teacher(dec!(24));
        calm_teacher.id = 2;
        calm_teacher.context.mention = Some("Maths".to_string());
        let calm = TeacherReport::build(
            calm_teacher,
            vec![session(2, dec!(1), "Maths", SessionType::Td)],
        );
        let all_sessions: Vec<Session> = busy
            .sessions
            .iter()
            .chain(calm.sessions.iter())
            .cloned()
            .collect();

        let stats = global_stats(&[busy, calm], &all_sessions);
        assert_eq!(stats.teacher_count, 2);
        assert_eq!(stats.session_count, 2);
        assert_eq!(stats.total_hours, dec!(6));
        assert_eq!(stats.overtime_teacher_count, 1);
        assert_eq!(stats.total_overtime_hours, dec!(3));
        assert_eq!(stats.multi_context_names, 1);
        assert_eq!(stats.by_type.len(), 2);
    }
}
