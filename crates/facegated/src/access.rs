//! Access pipeline: probe image in, decision out.
//!
//! The face service names a candidate; the console applies zone policy and
//! the candidate's rules, records the event, raises alerts and queues their
//! notifications.

use crate::api::AppState;
use crate::error::ApiError;
use crate::evidence::Photo;
use chrono::{DateTime, NaiveDateTime, Utc};
use facegate_core::decision::failed_attempts_alert;
use facegate_core::types::AlertKind;
use facegate_core::validate::NewAlert;
use facegate_core::{decide, AccessContext, Candidate, Decision, EvidenceKind, Verdict};
use facegate_store::events::NewEvent;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
pub struct VerifyRequest {
    pub point_id: i64,
    /// Base64 image, optionally as a `data:` URL.
    pub image: String,
    #[serde(default)]
    pub check_liveness: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerifyOutcome {
    pub decision: Decision,
    /// Set only when access is granted.
    pub user_id: Option<i64>,
    pub confidence: f32,
    pub liveness_ok: bool,
    pub message: String,
    pub event_id: Option<i64>,
    pub alert_id: Option<i64>,
    pub evidence_id: Option<i64>,
}

/// Run one access attempt. `local` is the wall-clock time rules are checked
/// against; `at` is the same instant in UTC.
pub async fn verify_access(
    state: &AppState,
    req: VerifyRequest,
    at: DateTime<Utc>,
    local: NaiveDateTime,
) -> Result<VerifyOutcome, ApiError> {
    if req.point_id <= 0 {
        return Err(ApiError::BadRequest("point_id must be positive".into()));
    }
    let photo = Photo::from_base64(&req.image).await?;

    let point = state.store.get_point(req.point_id).await?;
    let zone = state.store.get_zone(point.zone.id).await?;
    let settings = state.store.zone_settings(zone.id).await?;
    let liveness_required = settings.liveness_required || req.check_liveness;

    let rec = state
        .face
        .recognize(&photo.to_base64(), point.id, liveness_required)
        .await?;

    let user = match rec.user_id {
        Some(id) => state.store.find_user(id).await?,
        None => None,
    };
    if rec.user_id.is_some() && user.is_none() {
        tracing::warn!(user_id = ?rec.user_id, "face service matched an unknown user id");
    }
    let rules = match &user {
        Some(u) => state.store.rules_for(u.id, zone.id).await?,
        None => Vec::new(),
    };

    let verdict: Verdict = decide(&AccessContext {
        candidate: user.as_ref().map(|u| Candidate {
            user_id: u.id,
            active: u.active,
        }),
        confidence: rec.confidence,
        liveness_ok: rec.liveness_ok,
        liveness_required,
        point_active: point.active,
        zone_id: zone.id,
        zone_name: &zone.name,
        zone_active: zone.active,
        settings: &settings,
        rules: &rules,
        thresholds: state.config.thresholds(),
        now: local,
    });

    // Below the unknown floor the face service's candidate is only the
    // nearest enrolled face, not an identification.
    let identified = match verdict.alert {
        Some(AlertKind::UnknownUser) => None,
        _ => user.as_ref(),
    };

    let evidence_id = if settings.store_access_photos {
        let new = state
            .evidence
            .save(EvidenceKind::AccessPhoto, &photo)
            .await
            .map_err(ApiError::internal)?;
        let path = new.path.clone();
        match state.store.insert_evidence(new).await {
            Ok(evidence) => Some(evidence.id),
            Err(e) => {
                tracing::warn!(path = %path, error = %e, "evidence file left without a metadata row");
                return Err(e.into());
            }
        }
    } else {
        None
    };

    let granted = verdict.is_granted();
    let mut event_id = None;
    let mut raised = Vec::new();

    if let Some(u) = identified {
        let event = state
            .store
            .record_event(NewEvent {
                user_id: u.id,
                point_id: point.id,
                decision: verdict.decision,
                score: Some(f64::from(rec.confidence)),
                liveness_ok: Some(rec.liveness_ok),
                evidence_id,
            })
            .await?;
        event_id = Some(event.id);

        let previous = state.store.record_access_result(u.id, granted, at).await?;
        if !granted && failed_attempts_alert(previous, settings.max_failed_attempts) {
            raised.push((
                AlertKind::MultipleFailedAttempts,
                format!(
                    "{} reached {} failed attempts at {}",
                    u.display_name(),
                    previous + 1,
                    point.name
                ),
            ));
        }
    }

    if let Some(kind) = verdict.alert {
        raised.insert(0, (kind, verdict.message.clone()));
    }

    let dest = state.config.destinations();
    let mut alert_id = None;
    for (kind, detail) in raised {
        let alert = state
            .store
            .create_alert(&NewAlert {
                type_id: kind.id(),
                detail: Some(detail),
                point_id: Some(point.id),
                evidence_id,
            })
            .await?;
        state.store.fan_out(alert.id, &dest, !settings.notify_admin).await?;
        state.dispatcher.wake(alert.id);
        alert_id.get_or_insert(alert.id);
    }

    if granted {
        tracing::info!(
            point_id = point.id,
            zone_id = zone.id,
            user_id = ?rec.user_id,
            confidence = rec.confidence,
            "access granted"
        );
    } else {
        tracing::warn!(
            point_id = point.id,
            zone_id = zone.id,
            user_id = ?rec.user_id,
            confidence = rec.confidence,
            reason = %verdict.message,
            "access denied"
        );
    }

    Ok(VerifyOutcome {
        decision: verdict.decision,
        user_id: if granted { identified.map(|u| u.id) } else { None },
        confidence: rec.confidence,
        liveness_ok: rec.liveness_ok,
        message: verdict.message,
        event_id,
        alert_id,
        evidence_id,
    })
}
