use crate::notify::Priority;
use crate::schedule::TimeOfDay;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Outcome recorded for an access attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Granted,
    Denied,
    Pending,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Granted => "granted",
            Decision::Denied => "denied",
            Decision::Pending => "pending",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a stored enum column holds an unknown value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} value: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl FromStr for Decision {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "granted" => Ok(Decision::Granted),
            "denied" => Ok(Decision::Denied),
            "pending" => Ok(Decision::Pending),
            other => Err(UnknownVariant {
                kind: "decision",
                value: other.to_string(),
            }),
        }
    }
}

/// Security alert categories. Discriminants match the seeded `alert_types` ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    Unauthorized = 1,
    LivenessFailure = 2,
    UnknownUser = 3,
    MultipleFailedAttempts = 4,
    OutsideSchedule = 5,
    RestrictedZone = 6,
}

impl AlertKind {
    pub const ALL: [AlertKind; 6] = [
        AlertKind::Unauthorized,
        AlertKind::LivenessFailure,
        AlertKind::UnknownUser,
        AlertKind::MultipleFailedAttempts,
        AlertKind::OutsideSchedule,
        AlertKind::RestrictedZone,
    ];

    pub fn id(self) -> i64 {
        self as i64
    }

    pub fn from_id(id: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.id() == id)
    }

    /// Catalog name seeded into `alert_types`.
    pub fn label(self) -> &'static str {
        match self {
            AlertKind::Unauthorized => "Acceso no autorizado",
            AlertKind::LivenessFailure => "Falla en prueba de vida",
            AlertKind::UnknownUser => "Usuario desconocido",
            AlertKind::MultipleFailedAttempts => "Múltiples intentos fallidos",
            AlertKind::OutsideSchedule => "Acceso fuera de horario",
            AlertKind::RestrictedZone => "Zona restringida",
        }
    }
}

/// Kind of stored evidence file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceKind {
    AccessPhoto,
    AccessVideo,
    AlertPhoto,
    FacePhoto,
}

impl EvidenceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvidenceKind::AccessPhoto => "access_photo",
            EvidenceKind::AccessVideo => "access_video",
            EvidenceKind::AlertPhoto => "alert_photo",
            EvidenceKind::FacePhoto => "face_photo",
        }
    }
}

impl FromStr for EvidenceKind {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "access_photo" => Ok(EvidenceKind::AccessPhoto),
            "access_video" => Ok(EvidenceKind::AccessVideo),
            "alert_photo" => Ok(EvidenceKind::AlertPhoto),
            "face_photo" => Ok(EvidenceKind::FacePhoto),
            other => Err(UnknownVariant {
                kind: "evidence kind",
                value: other.to_string(),
            }),
        }
    }
}

/// Delivery state of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationStatus {
    Pending,
    Sent,
    Failed,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationStatus::Pending => "pending",
            NotificationStatus::Sent => "sent",
            NotificationStatus::Failed => "failed",
        }
    }
}

impl FromStr for NotificationStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(NotificationStatus::Pending),
            "sent" => Ok(NotificationStatus::Sent),
            "failed" => Ok(NotificationStatus::Failed),
            other => Err(UnknownVariant {
                kind: "notification status",
                value: other.to_string(),
            }),
        }
    }
}

/// Audit trail action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuditAction {
    Insert,
    Update,
    Delete,
    Login,
    Logout,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Insert => "INSERT",
            AuditAction::Update => "UPDATE",
            AuditAction::Delete => "DELETE",
            AuditAction::Login => "LOGIN",
            AuditAction::Logout => "LOGOUT",
        }
    }
}

impl FromStr for AuditAction {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INSERT" => Ok(AuditAction::Insert),
            "UPDATE" => Ok(AuditAction::Update),
            "DELETE" => Ok(AuditAction::Delete),
            "LOGIN" => Ok(AuditAction::Login),
            "LOGOUT" => Ok(AuditAction::Logout),
            other => Err(UnknownVariant {
                kind: "audit action",
                value: other.to_string(),
            }),
        }
    }
}

/// `{ id, name }` reference to a related row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedRef {
    pub id: i64,
    pub name: String,
}

/// Short person reference embedded in rules and events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonRef {
    pub id: i64,
    pub first_name: String,
    pub last_name: Option<String>,
    pub document: Option<String>,
}

/// Control point reference with its zone name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointRef {
    pub id: i64,
    pub name: String,
    pub zone_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleSummary {
    pub id: i64,
    pub name: String,
    pub users: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaceModel {
    pub id: i64,
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub first_name: String,
    pub last_name: Option<String>,
    pub document: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub role: NamedRef,
    pub active: bool,
    pub failed_attempts: i64,
    pub last_access_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn display_name(&self) -> String {
        match &self.last_name {
            Some(last) if !last.is_empty() => format!("{} {}", self.first_name, last),
            _ => self.first_name.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserCounts {
    pub faces: i64,
    pub access_events: i64,
    pub access_rules: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSummary {
    #[serde(flatten)]
    pub user: User,
    pub counts: UserCounts,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserDetail {
    #[serde(flatten)]
    pub user: User,
    pub faces: Vec<Face>,
    pub access_rules: Vec<AccessRuleView>,
    pub counts: UserCounts,
}

/// A user row together with its stored password hash, for login.
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user: User,
    pub password_hash: Option<String>,
}

/// An enrolled face. The embedding itself lives in the face service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Face {
    pub id: i64,
    pub user_id: i64,
    pub model: Option<FaceModel>,
    pub quality: Option<f64>,
    pub external_ref: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Zone {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ZoneCounts {
    pub control_points: i64,
    pub access_rules: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneSummary {
    #[serde(flatten)]
    pub zone: Zone,
    pub counts: ZoneCounts,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub control_points: Option<Vec<ControlPointSummary>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ZoneStats {
    pub accesses_today: i64,
    pub accesses_this_week: i64,
    pub unique_users_this_week: i64,
    pub alerts_last_7_days: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ZoneTotals {
    pub control_points: i64,
    pub access_rules: i64,
    pub access_events: i64,
    pub alerts: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneDetail {
    #[serde(flatten)]
    pub zone: Zone,
    pub control_points: Vec<ControlPointSummary>,
    pub stats: ZoneStats,
    pub recent_events: Vec<AccessEvent>,
    pub totals: ZoneTotals,
}

/// Camera settings as exposed to clients. The password is never returned.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CameraInfo {
    pub url: Option<String>,
    pub user: Option<String>,
    pub has_password: bool,
    pub stream_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlPoint {
    pub id: i64,
    pub name: String,
    pub zone: NamedRef,
    pub point_type: NamedRef,
    pub location: Option<String>,
    pub active: bool,
    pub camera: CameraInfo,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PointCounts {
    pub access_events: i64,
    pub alerts: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlPointSummary {
    #[serde(flatten)]
    pub point: ControlPoint,
    pub counts: PointCounts,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlPointDetail {
    #[serde(flatten)]
    pub point: ControlPoint,
    pub counts: PointCounts,
    pub recent_events: Vec<AccessEvent>,
}

/// A time-window access rule: `user` may enter `zone` between `start` and
/// `end` on `weekday` (0 = Sunday), or on every day when `weekday` is None.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessRule {
    pub id: i64,
    pub user_id: i64,
    pub zone_id: i64,
    pub start: TimeOfDay,
    pub end: TimeOfDay,
    pub weekday: Option<u8>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessRuleView {
    #[serde(flatten)]
    pub rule: AccessRule,
    pub user: PersonRef,
    pub zone: NamedRef,
    pub day_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceRef {
    pub id: i64,
    pub path: String,
    pub mime_type: Option<String>,
    pub size_bytes: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evidence {
    pub id: i64,
    pub kind: EvidenceKind,
    pub path: String,
    pub mime_type: Option<String>,
    pub size_bytes: i64,
    pub sha256: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessEvent {
    pub id: i64,
    pub uuid: String,
    pub user: PersonRef,
    pub point: PointRef,
    pub decision: Decision,
    pub score: Option<f64>,
    pub liveness_ok: Option<bool>,
    pub evidence: Option<EvidenceRef>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRef {
    pub id: i64,
    pub channel: String,
    pub status: NotificationStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: i64,
    pub uuid: String,
    pub alert_type: NamedRef,
    pub detail: Option<String>,
    pub point: Option<PointRef>,
    pub evidence: Option<EvidenceRef>,
    pub read: bool,
    pub notifications: Vec<NotificationRef>,
    pub created_at: DateTime<Utc>,
}

/// A pending delivery picked up by the dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: i64,
    pub alert_id: i64,
    pub channel: NamedRef,
    pub destination: String,
    pub status: NotificationStatus,
    pub attempts: i64,
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// One entry of the operator notification feed (an alert seen from the UI).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedItem {
    pub id: i64,
    pub alert_type: String,
    pub detail: String,
    pub created_at: DateTime<Utc>,
    pub point_name: Option<String>,
    pub read: bool,
    pub priority: Priority,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: i64,
    pub user_id: Option<i64>,
    pub action: AuditAction,
    pub table_name: String,
    pub record_id: Option<i64>,
    pub field: Option<String>,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DashboardSummary {
    pub accesses_today: i64,
    pub alerts_today: i64,
    pub active_users: i64,
    pub active_points: i64,
    pub total_users: i64,
    pub total_accesses: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourBucket {
    pub hour: String,
    pub accesses: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedCount {
    pub name: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardStats {
    pub summary: DashboardSummary,
    pub accesses_by_hour: Vec<HourBucket>,
    pub alerts_by_type: Vec<NamedCount>,
    pub top_users: Vec<NamedCount>,
    pub decisions_today: Vec<NamedCount>,
}

/// Requested page, 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
}

impl PageRequest {
    pub const MAX_LIMIT: u32 = 100;

    /// Clamp to page >= 1 and 1 <= limit <= 100.
    pub fn new(page: Option<u32>, limit: Option<u32>, default_limit: u32) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            limit: limit.unwrap_or(default_limit).clamp(1, Self::MAX_LIMIT),
        }
    }

    pub fn offset(&self) -> i64 {
        (self.page as i64 - 1) * self.limit as i64
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: i64,
    pub total_pages: i64,
}

impl Pagination {
    pub fn new(req: PageRequest, total: i64) -> Self {
        let limit = req.limit as i64;
        Self {
            page: req.page,
            limit: req.limit,
            total,
            total_pages: (total + limit - 1) / limit,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub pagination: Pagination,
}
