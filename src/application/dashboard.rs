//! Admin dashboard views composed from the collection services.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;
use tracing::info;

use crate::application::collection::CollectionService;
use crate::application::error::AccessError;
use crate::application::pagination::{DEFAULT_LIMIT, ListParams};
use crate::application::registry::CollectionRegistry;
use crate::application::store::OrderDirection;
use crate::domain::record::{CREATED_AT_FIELD, Fields, Record, Stamp};
use crate::domain::stats::{STATUS_FIELD, TYPE_FIELD};

pub const INCIDENTS: &str = "incidents";
pub const USERS: &str = "users";
pub const LEADERBOARD: &str = "leaderboard";
pub const POINT_AWARDS: &str = "point_awards";
pub const SETTINGS: &str = "settings";

/// Identifier of the single settings document.
pub const SETTINGS_DOCUMENT_ID: &str = "default";

const RESOLVED_STATUS: &str = "resolved";
const POINTS_FIELD: &str = "points";
const LEADERBOARD_LIMIT: u32 = 100;
const MAX_AWARD: i64 = 1000;
const DEFAULT_PARTICIPANT_TYPE: &str = "Individual";
const ANY_VALUE: &str = "all";

#[derive(Debug, Error)]
pub enum AdminError {
    #[error("{0}")]
    Validation(String),
    #[error("user `{0}` not found")]
    UserNotFound(String),
    #[error(transparent)]
    Access(#[from] AccessError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_reports: u64,
    pub resolved_reports: u64,
    pub pending_reports: u64,
    pub new_incidents_this_week: u64,
    pub active_users: u64,
    pub categories_breakdown: BTreeMap<String, u64>,
    pub status_breakdown: BTreeMap<String, u64>,
    pub last_updated: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct IncidentQuery {
    pub status: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub limit: Option<u32>,
    pub cursor: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IncidentsPage {
    pub incidents: Vec<Record>,
    pub next_cursor: Option<String>,
    pub total: u64,
    pub total_pages: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GamificationSummary {
    pub total_points_awarded: i64,
    pub total_users: u64,
    pub leaderboard: Vec<Record>,
    pub average_points_per_user: f64,
    pub last_updated: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AwardPointsCommand {
    pub user_id: String,
    pub points: i64,
    pub reason: String,
    #[serde(default = "default_awarded_by")]
    pub awarded_by: String,
}

fn default_awarded_by() -> String {
    "admin".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PointsAward {
    pub user_id: String,
    pub points_awarded: i64,
    pub new_total_points: i64,
    pub reason: String,
    pub message: String,
}

#[derive(Clone)]
pub struct AdminDashboardService {
    registry: Arc<CollectionRegistry>,
}

impl AdminDashboardService {
    pub fn new(registry: Arc<CollectionRegistry>) -> Self {
        Self { registry }
    }

    fn collection(&self, name: &str) -> Result<Arc<CollectionService>, AdminError> {
        Ok(self.registry.collection(name)?)
    }

    pub async fn dashboard_stats(&self) -> Result<DashboardStats, AdminError> {
        let incidents = self.collection(INCIDENTS)?;
        let users = self.collection(USERS)?;
        let (incident_stats, user_stats) = tokio::try_join!(
            incidents.get_aggregated_stats(),
            users.get_aggregated_stats()
        )?;

        let resolved = incident_stats.status_count(RESOLVED_STATUS);
        Ok(DashboardStats {
            total_reports: incident_stats.total,
            resolved_reports: resolved,
            pending_reports: incident_stats.total.saturating_sub(resolved),
            new_incidents_this_week: incident_stats.recent_count,
            active_users: user_stats.total,
            categories_breakdown: incident_stats.by_type,
            status_breakdown: incident_stats.by_status,
            last_updated: Stamp::now().timestamp,
        })
    }

    /// Newest incidents first; `"all"` or an empty value disables a filter.
    pub async fn incidents(&self, query: IncidentQuery) -> Result<IncidentsPage, AdminError> {
        let incidents = self.collection(INCIDENTS)?;
        let limit = query.limit.unwrap_or(DEFAULT_LIMIT);

        let mut params = ListParams::new()
            .limit(limit)
            .order_by(CREATED_AT_FIELD, OrderDirection::Desc);
        if let Some(status) = active_filter(query.status) {
            params = params.filter(STATUS_FIELD, status);
        }
        if let Some(kind) = active_filter(query.kind) {
            params = params.filter(TYPE_FIELD, kind);
        }
        if let Some(cursor) = query.cursor {
            params = params.cursor(cursor);
        }

        let page = incidents.list(params).await?;
        let stats = incidents.get_aggregated_stats().await?;

        Ok(IncidentsPage {
            incidents: page.items,
            next_cursor: page.next_cursor,
            total: stats.total,
            total_pages: stats.total.div_ceil(u64::from(limit.max(1))),
        })
    }

    pub async fn update_incident_status(
        &self,
        id: &str,
        status: &str,
    ) -> Result<Record, AdminError> {
        let status = status.trim();
        if status.is_empty() {
            return Err(AdminError::Validation("status is required".to_string()));
        }
        let incidents = self.collection(INCIDENTS)?;
        let mut fields = Fields::new();
        fields.insert(STATUS_FIELD.to_string(), Value::String(status.to_string()));
        Ok(incidents.update(id, fields).await?)
    }

    pub async fn gamification(&self) -> Result<GamificationSummary, AdminError> {
        let leaderboard = self.collection(LEADERBOARD)?;
        let users = self.collection(USERS)?;

        let params = ListParams::new()
            .limit(LEADERBOARD_LIMIT)
            .order_by(POINTS_FIELD, OrderDirection::Desc);
        let (page, user_stats) =
            tokio::try_join!(leaderboard.list(params), users.get_aggregated_stats())?;

        let total_points_awarded = page
            .items
            .iter()
            .map(points_of)
            .fold(0_i64, i64::saturating_add);
        let average_points_per_user = if page.items.is_empty() {
            0.0
        } else {
            total_points_awarded as f64 / page.items.len() as f64
        };

        Ok(GamificationSummary {
            total_points_awarded,
            total_users: user_stats.total,
            leaderboard: page.items,
            average_points_per_user,
            last_updated: Stamp::now().timestamp,
        })
    }

    /// Add points to a user, mirror the total on the leaderboard and log the award.
    pub async fn award_points(&self, command: AwardPointsCommand) -> Result<PointsAward, AdminError> {
        let user_id = command.user_id.trim().to_string();
        let reason = command.reason.trim().to_string();
        if user_id.is_empty() || reason.is_empty() {
            return Err(AdminError::Validation(
                "userId, points, and reason are required".to_string(),
            ));
        }
        if !(1..=MAX_AWARD).contains(&command.points) {
            return Err(AdminError::Validation(format!(
                "Points must be between 1 and {MAX_AWARD}"
            )));
        }

        let users = self.collection(USERS)?;
        let leaderboard = self.collection(LEADERBOARD)?;
        let awards = self.collection(POINT_AWARDS)?;

        let user = users
            .get_by_id(&user_id)
            .await?
            .ok_or_else(|| AdminError::UserNotFound(user_id.clone()))?;
        let previous_points = points_of(&user);
        let new_points = previous_points.saturating_add(command.points);

        users
            .update(&user_id, object(json!({ POINTS_FIELD: new_points })))
            .await?;

        let display_name = display_name(&user);
        let awarded_at = Stamp::now().timestamp;
        let mut entry = object(json!({
            "userId": user_id,
            POINTS_FIELD: new_points,
            TYPE_FIELD: user
                .field(TYPE_FIELD)
                .cloned()
                .unwrap_or_else(|| Value::String(DEFAULT_PARTICIPANT_TYPE.to_string())),
            "lastAwarded": awarded_at,
            "awardReason": reason,
            "awardedBy": command.awarded_by,
        }));
        if let Some(name) = &display_name {
            entry.insert("name".to_string(), Value::String(name.clone()));
        }
        leaderboard.update(&user_id, entry).await?;

        awards
            .create(object(json!({
                "userId": user_id,
                POINTS_FIELD: command.points,
                "reason": reason,
                "awardedBy": command.awarded_by,
                "awardedAt": awarded_at,
                "previousPoints": previous_points,
                "newPoints": new_points,
            })))
            .await?;

        info!(
            user_id = %user_id,
            points = command.points,
            new_points,
            "awarded points"
        );

        let recipient = display_name.unwrap_or_else(|| user_id.clone());
        Ok(PointsAward {
            message: format!(
                "Successfully awarded {} points to {recipient}",
                command.points
            ),
            user_id,
            points_awarded: command.points,
            new_total_points: new_points,
            reason,
        })
    }

    pub async fn settings(&self) -> Result<Option<Record>, AdminError> {
        let settings = self.collection(SETTINGS)?;
        Ok(settings.get_by_id(SETTINGS_DOCUMENT_ID).await?)
    }

    pub async fn update_settings(&self, data: Fields) -> Result<Record, AdminError> {
        let settings = self.collection(SETTINGS)?;
        Ok(settings.update(SETTINGS_DOCUMENT_ID, data).await?)
    }
}

fn active_filter(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty() && value != ANY_VALUE)
}

fn points_of(record: &Record) -> i64 {
    match record.field(POINTS_FIELD) {
        Some(Value::Number(number)) => number
            .as_i64()
            .or_else(|| number.as_f64().map(|points| points as i64))
            .unwrap_or(0),
        _ => 0,
    }
}

fn display_name(user: &Record) -> Option<String> {
    let text = |field: &str| {
        user.field(field)
            .and_then(Value::as_str)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    };
    text("name").or_else(|| text("displayName")).or_else(|| {
        text("email").and_then(|email| {
            email
                .split('@')
                .next()
                .filter(|local| !local.is_empty())
                .map(str::to_string)
        })
    })
}

fn object(value: Value) -> Fields {
    match value {
        Value::Object(map) => map,
        _ => Fields::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(value: Value) -> Record {
        Record::from_document(crate::domain::record::Document::new("u1", object(value)))
    }

    #[test]
    fn display_name_prefers_name_then_display_name_then_email() {
        assert_eq!(
            display_name(&record(json!({ "name": "Ada", "email": "x@y.z" }))).as_deref(),
            Some("Ada")
        );
        assert_eq!(
            display_name(&record(json!({ "displayName": "Grace" }))).as_deref(),
            Some("Grace")
        );
        assert_eq!(
            display_name(&record(json!({ "email": "linus@example.com" }))).as_deref(),
            Some("linus")
        );
        assert_eq!(display_name(&record(json!({}))), None);
    }

    #[test]
    fn points_of_reads_numbers_only() {
        assert_eq!(points_of(&record(json!({ "points": 12 }))), 12);
        assert_eq!(points_of(&record(json!({ "points": 7.9 }))), 7);
        assert_eq!(points_of(&record(json!({ "points": "12" }))), 0);
        assert_eq!(points_of(&record(json!({}))), 0);
    }

    #[test]
    fn all_disables_a_filter() {
        assert_eq!(active_filter(Some("all".to_string())), None);
        assert_eq!(active_filter(Some(" ".to_string())), None);
        assert_eq!(active_filter(Some("new".to_string())).as_deref(), Some("new"));
        assert_eq!(active_filter(None), None);
    }
}
