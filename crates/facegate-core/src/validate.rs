//! Input validation for operator forms.
//!
//! Each form deserializes from a request body and is checked with
//! `validate()`, which collects every field error instead of stopping at
//! the first one.

use crate::schedule::TimeOfDay;
use crate::types::Decision;
use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid input: {}", summarize(.0))]
pub struct ValidationError(pub Vec<FieldError>);

fn summarize(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| format!("{}: {}", e.field, e.message))
        .collect::<Vec<_>>()
        .join("; ")
}

impl ValidationError {
    pub fn single(field: &str, message: impl Into<String>) -> Self {
        Self(vec![FieldError {
            field: field.to_string(),
            message: message.into(),
        }])
    }

    pub fn fields(&self) -> &[FieldError] {
        &self.0
    }
}

#[derive(Debug, Default)]
pub(crate) struct Checker {
    errors: Vec<FieldError>,
}

impl Checker {
    pub(crate) fn check(&mut self, ok: bool, field: &str, message: &str) {
        if !ok {
            self.errors.push(FieldError {
                field: field.to_string(),
                message: message.to_string(),
            });
        }
    }

    pub(crate) fn min_chars(&mut self, field: &str, value: &str, min: usize) {
        let ok = value.trim().chars().count() >= min;
        self.check(ok, field, &format!("must be at least {min} characters"));
    }

    pub(crate) fn required(&mut self, field: &str, value: &str) {
        self.check(!value.trim().is_empty(), field, "is required");
    }

    pub(crate) fn positive(&mut self, field: &str, id: i64) {
        self.check(id > 0, field, "must be a positive id");
    }

    pub(crate) fn email(&mut self, field: &str, value: Option<&str>) {
        if let Some(v) = value {
            self.check(is_valid_email(v), field, "must be a valid e-mail address");
        }
    }

    pub(crate) fn time(&mut self, field: &str, value: &str) -> Option<TimeOfDay> {
        let parsed = value.parse::<TimeOfDay>().ok();
        self.check(parsed.is_some(), field, "must be a time in HH:MM format");
        parsed
    }

    pub(crate) fn weekday(&mut self, field: &str, value: Option<i64>) -> Option<u8> {
        let v = value?;
        self.check((0..=6).contains(&v), field, "must be between 0 (Sunday) and 6 (Saturday)");
        u8::try_from(v).ok().filter(|d| *d <= 6)
    }

    pub(crate) fn finish(self) -> Result<(), ValidationError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError(self.errors))
        }
    }
}

/// Minimal `local@domain.tld` shape check.
pub fn is_valid_email(value: &str) -> bool {
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && !value.chars().any(char::is_whitespace)
        && domain
            .split_once('.')
            .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty() && !tld.ends_with('.'))
}

/// Trim and turn empty strings into `None`.
fn blank_to_none(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Distinguishes an absent field from an explicit `null`.
fn double_option<'de, D, T>(de: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(de).map(Some)
}

fn yes() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub first_name: String,
    pub last_name: String,
    pub document: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    pub role_id: i64,
    #[serde(default)]
    pub password: Option<String>,
}

impl NewUser {
    /// Trim fields, lower-case the e-mail and drop empty optionals.
    pub fn normalize(mut self) -> Self {
        self.first_name = self.first_name.trim().to_string();
        self.last_name = self.last_name.trim().to_string();
        self.document = self.document.trim().to_string();
        self.email = blank_to_none(self.email).map(|e| e.to_lowercase());
        self.phone = blank_to_none(self.phone);
        self.password = self.password.filter(|p| !p.is_empty());
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut c = Checker::default();
        c.min_chars("first_name", &self.first_name, 2);
        c.required("last_name", &self.last_name);
        c.required("document", &self.document);
        c.email("email", self.email.as_deref());
        if let Some(p) = &self.password {
            c.check(p.chars().count() >= 8, "password", "must be at least 8 characters");
        }
        c.positive("role_id", self.role_id);
        c.finish()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserPatch {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub document: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub role_id: Option<i64>,
    pub active: Option<bool>,
    pub password: Option<String>,
}

impl UserPatch {
    pub fn normalize(mut self) -> Self {
        self.first_name = self.first_name.map(|v| v.trim().to_string());
        self.last_name = self.last_name.map(|v| v.trim().to_string());
        self.document = self.document.map(|v| v.trim().to_string());
        self.email = blank_to_none(self.email).map(|e| e.to_lowercase());
        self.phone = blank_to_none(self.phone);
        self.password = self.password.filter(|p| !p.is_empty());
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut c = Checker::default();
        if let Some(v) = &self.first_name {
            c.min_chars("first_name", v, 2);
        }
        if let Some(v) = &self.last_name {
            c.required("last_name", v);
        }
        if let Some(v) = &self.document {
            c.required("document", v);
        }
        c.email("email", self.email.as_deref());
        if let Some(p) = &self.password {
            c.check(p.chars().count() >= 8, "password", "must be at least 8 characters");
        }
        if let Some(id) = self.role_id {
            c.positive("role_id", id);
        }
        c.finish()
    }

    pub fn is_empty(&self) -> bool {
        self.first_name.is_none()
            && self.last_name.is_none()
            && self.document.is_none()
            && self.email.is_none()
            && self.phone.is_none()
            && self.role_id.is_none()
            && self.active.is_none()
            && self.password.is_none()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewZone {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "yes")]
    pub active: bool,
}

/// Zone updates replace every field, like creation.
pub type ZoneUpdate = NewZone;

impl NewZone {
    pub fn normalize(mut self) -> Self {
        self.name = self.name.trim().to_string();
        self.description = blank_to_none(self.description);
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut c = Checker::default();
        c.min_chars("name", &self.name, 2);
        c.finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewControlPoint {
    pub zone_id: i64,
    pub name: String,
    pub type_id: i64,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default = "yes")]
    pub active: bool,
}

impl NewControlPoint {
    pub fn normalize(mut self) -> Self {
        self.name = self.name.trim().to_string();
        self.location = blank_to_none(self.location);
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut c = Checker::default();
        c.positive("zone_id", self.zone_id);
        c.min_chars("name", &self.name, 2);
        c.positive("type_id", self.type_id);
        c.finish()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ControlPointPatch {
    pub zone_id: Option<i64>,
    pub name: Option<String>,
    pub type_id: Option<i64>,
    #[serde(default, deserialize_with = "double_option")]
    pub location: Option<Option<String>>,
    pub active: Option<bool>,
}

impl ControlPointPatch {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut c = Checker::default();
        if let Some(id) = self.zone_id {
            c.positive("zone_id", id);
        }
        if let Some(name) = &self.name {
            c.min_chars("name", name, 2);
        }
        if let Some(id) = self.type_id {
            c.positive("type_id", id);
        }
        c.finish()
    }
}

const CAMERA_SCHEMES: [&str; 3] = ["http://", "https://", "rtsp://"];

/// Camera settings for a control point. Empty strings clear a field.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CameraConfig {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub stream_type: Option<String>,
}

impl CameraConfig {
    pub fn normalize(self) -> Self {
        Self {
            url: blank_to_none(self.url),
            user: blank_to_none(self.user),
            password: self.password.filter(|p| !p.is_empty()),
            stream_type: blank_to_none(self.stream_type).map(|s| s.to_lowercase()),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut c = Checker::default();
        if let Some(url) = &self.url {
            let ok = CAMERA_SCHEMES
                .iter()
                .any(|s| url.len() > s.len() && url.to_lowercase().starts_with(s));
            c.check(ok, "url", "must be an http, https or rtsp URL");
        }
        if let Some(kind) = &self.stream_type {
            c.check(kind.len() <= 32, "stream_type", "must be at most 32 characters");
        }
        c.finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewAccessRule {
    pub user_id: i64,
    pub zone_id: i64,
    pub start: String,
    pub end: String,
    #[serde(default)]
    pub weekday: Option<i64>,
    #[serde(default = "yes")]
    pub active: bool,
}

/// A checked access rule ready to be stored.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleSpec {
    pub user_id: i64,
    pub zone_id: i64,
    pub start: TimeOfDay,
    pub end: TimeOfDay,
    pub weekday: Option<u8>,
    pub active: bool,
}

impl NewAccessRule {
    pub fn validate(&self) -> Result<RuleSpec, ValidationError> {
        let mut c = Checker::default();
        c.positive("user_id", self.user_id);
        c.positive("zone_id", self.zone_id);
        let start = c.time("start", &self.start);
        let end = c.time("end", &self.end);
        let weekday = c.weekday("weekday", self.weekday);
        if let (Some(s), Some(e)) = (start, end) {
            c.check(s < e, "end", "must be later than start");
        }
        c.finish()?;
        match (start, end) {
            (Some(start), Some(end)) => Ok(RuleSpec {
                user_id: self.user_id,
                zone_id: self.zone_id,
                start,
                end,
                weekday,
                active: self.active,
            }),
            _ => Err(ValidationError::single("start", "must be a time in HH:MM format")),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AccessRulePatch {
    pub start: Option<String>,
    pub end: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub weekday: Option<Option<i64>>,
    pub active: Option<bool>,
}

/// Checked partial rule update. `weekday: Some(None)` means every day.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RulePatchSpec {
    pub start: Option<TimeOfDay>,
    pub end: Option<TimeOfDay>,
    pub weekday: Option<Option<u8>>,
    pub active: Option<bool>,
}

impl AccessRulePatch {
    pub fn validate(&self) -> Result<RulePatchSpec, ValidationError> {
        let mut c = Checker::default();
        let start = self.start.as_deref().and_then(|s| c.time("start", s));
        let end = self.end.as_deref().and_then(|s| c.time("end", s));
        let weekday = self.weekday.map(|d| c.weekday("weekday", d));
        c.finish()?;
        Ok(RulePatchSpec {
            start,
            end,
            weekday,
            active: self.active,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewAlert {
    pub type_id: i64,
    #[serde(default)]
    pub detail: Option<String>,
    #[serde(default)]
    pub point_id: Option<i64>,
    #[serde(default)]
    pub evidence_id: Option<i64>,
}

impl NewAlert {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut c = Checker::default();
        c.positive("type_id", self.type_id);
        if let Some(id) = self.point_id {
            c.positive("point_id", id);
        }
        if let Some(id) = self.evidence_id {
            c.positive("evidence_id", id);
        }
        c.finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewAccessEvent {
    pub user_id: i64,
    pub point_id: i64,
    pub decision: Decision,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub liveness_ok: Option<bool>,
    #[serde(default)]
    pub evidence_id: Option<i64>,
}

impl NewAccessEvent {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut c = Checker::default();
        c.positive("user_id", self.user_id);
        c.positive("point_id", self.point_id);
        if let Some(score) = self.score {
            c.check((0.0..=1.0).contains(&score), "score", "must be between 0 and 1");
        }
        if let Some(id) = self.evidence_id {
            c.positive("evidence_id", id);
        }
        c.finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

impl LoginRequest {
    pub fn normalize(mut self) -> Self {
        self.email = self.email.trim().to_lowercase();
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut c = Checker::default();
        c.required("email", &self.email);
        c.required("password", &self.password);
        c.finish()
    }
}
