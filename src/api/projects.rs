use async_trait::async_trait;
use http::Response;
use serde_json::json;
use validator::Validate;

use super::{ApiContext, ApiRequest, Handler};
use crate::{
    core::{ApiError, ApiResult, Operation, Resource, StorageContext},
    model::{Action, ProjectFields, ProjectPayload},
    utils::response::ResponseBuilder,
};

/// Reads and validates a project body before any store call.
fn project_fields(req: &ApiRequest) -> ApiResult<ProjectFields> {
    let payload: ProjectPayload = req.payload();
    payload
        .validate()
        .map_err(|_| ApiError::project_fields_missing())?;
    Ok(payload.into_fields())
}

pub struct ListProjects;

#[async_trait]
impl Handler for ListProjects {
    async fn handle(&self, ctx: &ApiContext, _req: ApiRequest) -> ApiResult<Response<Vec<u8>>> {
        let projects = ctx
            .projects
            .projects()
            .await
            .or_storage(Resource::Projects, Operation::Retrieve)?;
        Ok(ResponseBuilder::success_json(&projects))
    }
}

pub struct CreateProject;

#[async_trait]
impl Handler for CreateProject {
    async fn handle(&self, ctx: &ApiContext, req: ApiRequest) -> ApiResult<Response<Vec<u8>>> {
        let fields = project_fields(&req)?;
        let project = ctx
            .projects
            .insert_project(fields)
            .await
            .or_storage(Resource::Projects, Operation::Save)?;
        log::info!("Created project {}", project.id);
        Ok(ResponseBuilder::success_json(&project))
    }
}

pub struct GetProject;

#[async_trait]
impl Handler for GetProject {
    async fn handle(&self, ctx: &ApiContext, req: ApiRequest) -> ApiResult<Response<Vec<u8>>> {
        let id = req.id().ok_or_else(ApiError::no_project)?;
        let project = ctx
            .projects
            .project(id)
            .await
            .or_storage(Resource::Projects, Operation::Retrieve)?
            .ok_or_else(ApiError::no_project)?;
        Ok(ResponseBuilder::success_json(&project))
    }
}

pub struct ListProjectActions;

#[async_trait]
impl Handler for ListProjectActions {
    async fn handle(&self, ctx: &ApiContext, req: ApiRequest) -> ApiResult<Response<Vec<u8>>> {
        let actions = match req.id() {
            Some(id) => ctx
                .projects
                .project_actions(id)
                .await
                .or_storage(Resource::Projects, Operation::Retrieve)?,
            None => Vec::<Action>::new(),
        };
        Ok(ResponseBuilder::success_json(&actions))
    }
}

pub struct DeleteProject;

#[async_trait]
impl Handler for DeleteProject {
    async fn handle(&self, ctx: &ApiContext, req: ApiRequest) -> ApiResult<Response<Vec<u8>>> {
        let id = req.id().ok_or_else(ApiError::no_project)?;
        let removed = ctx
            .projects
            .remove_project(id)
            .await
            .or_storage(Resource::Projects, Operation::Remove)?;
        if !removed {
            return Err(ApiError::no_project());
        }
        log::info!("Removed project {id}");
        Ok(ResponseBuilder::success_json(&json!({ "success": "Project Removed" })))
    }
}

pub struct UpdateProject;

#[async_trait]
impl Handler for UpdateProject {
    async fn handle(&self, ctx: &ApiContext, req: ApiRequest) -> ApiResult<Response<Vec<u8>>> {
        let fields = project_fields(&req)?;
        let id = req.id().ok_or_else(ApiError::no_project)?;
        let project = ctx
            .projects
            .update_project(id, fields)
            .await
            .or_storage(Resource::Projects, Operation::Update)?
            .ok_or_else(ApiError::no_project)?;
        Ok(ResponseBuilder::success_json(&project))
    }
}
