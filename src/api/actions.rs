use async_trait::async_trait;
use http::Response;
use validator::Validate;

use super::{ApiContext, ApiRequest, Handler};
use crate::{
    core::{ApiError, ApiResult, Operation, Resource, StorageContext},
    model::ActionPayload,
    utils::response::ResponseBuilder,
};

fn action_payload(req: &ApiRequest) -> ApiResult<ActionPayload> {
    let payload: ActionPayload = req.payload();
    payload
        .validate()
        .map_err(|_| ApiError::action_fields_missing())?;
    Ok(payload)
}

pub struct ListActions;

#[async_trait]
impl Handler for ListActions {
    async fn handle(&self, ctx: &ApiContext, _req: ApiRequest) -> ApiResult<Response<Vec<u8>>> {
        let actions = ctx
            .actions
            .actions()
            .await
            .or_storage(Resource::Actions, Operation::Retrieve)?;
        Ok(ResponseBuilder::success_json(&actions))
    }
}

pub struct GetAction;

#[async_trait]
impl Handler for GetAction {
    async fn handle(&self, ctx: &ApiContext, req: ApiRequest) -> ApiResult<Response<Vec<u8>>> {
        let id = req.id().ok_or_else(ApiError::no_action)?;
        let action = ctx
            .actions
            .action(id)
            .await
            .or_storage(Resource::Actions, Operation::Retrieve)?
            .ok_or_else(ApiError::no_action)?;
        Ok(ResponseBuilder::success_json(&action))
    }
}

/// `POST /api/projects/{id}/actions`
pub struct CreateAction;

#[async_trait]
impl Handler for CreateAction {
    async fn handle(&self, ctx: &ApiContext, req: ApiRequest) -> ApiResult<Response<Vec<u8>>> {
        let payload = action_payload(&req)?;
        let project_id = req.id().ok_or_else(ApiError::no_project)?;
        let action = ctx
            .actions
            .insert_action(payload.into_new_action(project_id))
            .await
            .or_storage(Resource::Actions, Operation::Save)?;
        log::info!("Created action {} in project {project_id}", action.id);
        Ok(ResponseBuilder::success_json(&action))
    }
}

/// Answers with the actions left after the removal.
pub struct DeleteAction;

#[async_trait]
impl Handler for DeleteAction {
    async fn handle(&self, ctx: &ApiContext, req: ApiRequest) -> ApiResult<Response<Vec<u8>>> {
        let id = req.id().ok_or_else(ApiError::action_not_deleted)?;
        let removed = ctx
            .actions
            .remove_action(id)
            .await
            .or_storage(Resource::Actions, Operation::Remove)?;
        if !removed {
            return Err(ApiError::action_not_deleted());
        }
        log::info!("Removed action {id}");

        let remaining = ctx
            .actions
            .actions()
            .await
            .or_storage(Resource::Actions, Operation::Retrieve)?;
        Ok(ResponseBuilder::success_json(&remaining))
    }
}

pub struct UpdateAction;

#[async_trait]
impl Handler for UpdateAction {
    async fn handle(&self, ctx: &ApiContext, req: ApiRequest) -> ApiResult<Response<Vec<u8>>> {
        let payload = action_payload(&req)?;
        let id = req.id().ok_or_else(ApiError::no_action)?;
        let action = ctx
            .actions
            .update_action(id, payload.into_changes())
            .await
            .or_storage(Resource::Actions, Operation::Update)?
            .ok_or_else(ApiError::no_action)?;
        Ok(ResponseBuilder::success_json(&action))
    }
}
