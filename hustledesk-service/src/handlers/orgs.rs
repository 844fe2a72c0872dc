//! Organizations, outlets and members.

use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
};
use tracing::instrument;
use uuid::Uuid;

use crate::dtos::orgs::{AddMemberRequest, CreateOrgRequest, CreateOutletRequest};
use crate::dtos::{ApiResponse, ValidateRequest};
use crate::middleware::{require_manager, require_member, require_role, AuthUser};
use crate::models::{
    CreateOrganization, Member, OrgMembership, Organization, Outlet, PlanLimits, Role,
};
use crate::AppState;
use service_core::error::AppError;

/// GET /api/orgs
#[instrument(skip(state, user), fields(user_id = %user.user_id()))]
pub async fn list_orgs(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<ApiResponse<Vec<OrgMembership>>>, AppError> {
    let memberships = state.db.list_memberships(user.user_id()).await?;
    Ok(Json(ApiResponse::new(memberships)))
}

/// POST /api/orgs
#[instrument(skip(state, user, req), fields(user_id = %user.user_id()))]
pub async fn create_org(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<CreateOrgRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Organization>>), AppError> {
    req.validated()?;

    let input = CreateOrganization {
        name: req.name.trim().to_string(),
        slug: req
            .slug
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty()),
        country: req
            .country
            .map(|c| c.to_uppercase())
            .unwrap_or_else(|| "KE".to_string()),
        currency: req
            .currency
            .map(|c| c.to_uppercase())
            .unwrap_or_else(|| "KES".to_string()),
        owner_user_id: user.user_id().to_string(),
    };

    let org = state.db.create_organization(&input).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::new(org))))
}

/// GET /api/orgs/:org_id
pub async fn get_org(
    State(state): State<AppState>,
    user: AuthUser,
    Path(org_id): Path<Uuid>,
) -> Result<Json<ApiResponse<Organization>>, AppError> {
    require_member(&state.db, org_id, &user).await?;

    let org = state
        .db
        .get_organization(org_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Organization not found")))?;

    Ok(Json(ApiResponse::new(org)))
}

/// GET /api/orgs/:org_id/outlets
///
/// Staff only see the outlets they are allowed to use.
pub async fn list_outlets(
    State(state): State<AppState>,
    user: AuthUser,
    Path(org_id): Path<Uuid>,
) -> Result<Json<ApiResponse<Vec<Outlet>>>, AppError> {
    let member = require_member(&state.db, org_id, &user).await?;

    let restrict_to = (!member.is_manager_or_owner()).then_some(member.allowed_outlet_ids.as_slice());
    let outlets = state.db.list_outlets(org_id, restrict_to).await?;

    Ok(Json(ApiResponse::new(outlets)))
}

/// POST /api/orgs/:org_id/outlets
#[instrument(skip(state, user, req))]
pub async fn create_outlet(
    State(state): State<AppState>,
    user: AuthUser,
    Path(org_id): Path<Uuid>,
    Json(req): Json<CreateOutletRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Outlet>>), AppError> {
    let member = require_member(&state.db, org_id, &user).await?;
    require_manager(&member)?;
    req.validated()?;

    let plan = state.db.current_plan(org_id).await?;
    let outlets = state.db.count_outlets(org_id).await?;
    if !PlanLimits::allows(plan.limits().max_outlets, outlets) {
        return Err(AppError::Forbidden(anyhow::anyhow!(
            "Outlet limit reached for the {} plan",
            plan.as_str()
        )));
    }

    let outlet = state
        .db
        .create_outlet(org_id, req.name.trim(), req.address.as_deref())
        .await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::new(outlet))))
}

/// GET /api/orgs/:org_id/members
pub async fn list_members(
    State(state): State<AppState>,
    user: AuthUser,
    Path(org_id): Path<Uuid>,
) -> Result<Json<ApiResponse<Vec<Member>>>, AppError> {
    require_member(&state.db, org_id, &user).await?;
    let members = state.db.list_members(org_id).await?;
    Ok(Json(ApiResponse::new(members)))
}

/// POST /api/orgs/:org_id/members
#[instrument(skip(state, user, req), fields(new_user_id = %req.user_id))]
pub async fn add_member(
    State(state): State<AppState>,
    user: AuthUser,
    Path(org_id): Path<Uuid>,
    Json(req): Json<AddMemberRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Member>>), AppError> {
    let member = require_member(&state.db, org_id, &user).await?;
    require_role(&member, &[Role::Owner])?;
    req.validated()?;

    if req.role == Role::Owner {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "An organization can only have one owner"
        )));
    }

    let mut outlet_ids = req.allowed_outlet_ids.clone();
    outlet_ids.sort();
    outlet_ids.dedup();
    if !outlet_ids.is_empty() {
        let known = state.db.count_org_outlets(org_id, &outlet_ids).await?;
        if known != outlet_ids.len() as i64 {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Outlets must belong to this organization"
            )));
        }
    }

    let plan = state.db.current_plan(org_id).await?;
    let staff = state.db.count_members(org_id).await?;
    if !PlanLimits::allows(plan.limits().max_staff, staff) {
        return Err(AppError::Forbidden(anyhow::anyhow!(
            "Staff limit reached for the {} plan",
            plan.as_str()
        )));
    }

    let added = state
        .db
        .add_member(org_id, req.user_id.trim(), req.role, &outlet_ids, user.user_id())
        .await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::new(added))))
}
