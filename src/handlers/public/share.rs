// handlers/public/share.rs - what a prospect can do with a share link

use axum::{extract::rejection::JsonRejection, Json};
use serde::Serialize;
use uuid::Uuid;

use crate::database::models::{Feedback, Lead};
use crate::handlers::ApiPath;
use crate::middleware::{ApiResponse, ApiResult};
use crate::services::feedback_service::SharedFeedbackInput;
use crate::services::lead_service::ProspectInput;
use crate::services::share_link_service::SharedDemo;
use crate::services::{FeedbackService, LeadService, ShareLinkService};

/// What the prospect gets back: enough to leave feedback, none of the sales-side fields
#[derive(Debug, Serialize)]
pub struct ProspectLead {
    pub id: Uuid,
    pub name: String,
    /// False when this email was already registered for the demo
    pub created: bool,
}

impl ProspectLead {
    fn new(lead: Lead, created: bool) -> Self {
        Self {
            id: lead.id,
            name: lead.name,
            created,
        }
    }
}

/// GET /share/:token - Open a shared demo
///
/// Unknown, revoked and expired links, and links to inactive demos, all answer 404.
/// Credentials are only included when the link was created with them.
pub async fn share_get(ApiPath(token): ApiPath<String>) -> ApiResult<SharedDemo> {
    let links = ShareLinkService::connect().await?;
    Ok(ApiResponse::success(links.open(&token).await?))
}

/// POST /share/:token/leads - Prospect leaves contact details
pub async fn share_leads_post(
    ApiPath(token): ApiPath<String>,
    payload: Result<Json<ProspectInput>, JsonRejection>,
) -> ApiResult<ProspectLead> {
    let Json(input) = payload?;
    let links = ShareLinkService::connect().await?;
    let (link, demo) = links.resolve(&token).await?;

    let leads = LeadService::connect().await?;
    let (lead, created) = leads.create_from_share(&link, &demo, input).await?;

    let body = ProspectLead::new(lead, created);
    Ok(if created {
        ApiResponse::created(body)
    } else {
        ApiResponse::success(body)
    })
}

/// POST /share/:token/feedback - Prospect rates the demo
///
/// The lead must have registered through the same demo.
pub async fn share_feedback_post(
    ApiPath(token): ApiPath<String>,
    payload: Result<Json<SharedFeedbackInput>, JsonRejection>,
) -> ApiResult<Feedback> {
    let Json(input) = payload?;
    let links = ShareLinkService::connect().await?;
    let (_, demo) = links.resolve(&token).await?;

    let feedback = FeedbackService::connect().await?;
    Ok(ApiResponse::created(feedback.create_from_share(&demo, input).await?))
}
