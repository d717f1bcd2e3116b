// task_management.rs

use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Utc;
use log::{info, warn};
use serde::Deserialize;

use crate::app_state::AppState;
use crate::auth::current_user;
use crate::error::ServiceError;
use crate::models::{new_id, Comment, Priority, Task, TaskChanges};
use crate::notify::{dispatch, Notification};
use crate::overdue::due::{evaluate, DueState};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaskRequest {
    pub title: String,
    #[serde(default)]
    pub desc: String,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub due_date: Option<String>,
    #[serde(default)]
    pub due_time: Option<String>,
    #[serde(default)]
    pub attachment: Option<String>,
}

/// Optional `GET /tasks` filters. Unset fields match everything.
#[derive(Debug, Default, Deserialize)]
pub struct TaskQuery {
    pub important: Option<bool>,
    pub complete: Option<bool>,
    pub priority: Option<Priority>,
}

impl TaskQuery {
    fn matches(&self, task: &Task) -> bool {
        self.important.map_or(true, |v| task.important == v)
            && self.complete.map_or(true, |v| task.complete == v)
            && self.priority.map_or(true, |p| task.priority == p)
    }
}

#[derive(Debug, Deserialize)]
pub struct CommentRequest {
    pub text: String,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl CreateTaskRequest {
    fn into_task(self, assigned_users: Vec<String>) -> Result<Task, ServiceError> {
        if self.title.trim().is_empty() {
            return Err(ServiceError::BadRequest("Title is required".to_string()));
        }
        let mut task = Task::new(self.title.trim().to_string(), self.desc, assigned_users);
        task.priority = self.priority.unwrap_or_default();
        task.due_date = non_blank(self.due_date);
        task.due_time = non_blank(self.due_time);
        task.attachment = non_blank(self.attachment);
        Ok(task)
    }
}

/// Trims the edit and rejects blank titles or edits that change nothing.
fn checked_changes(mut changes: TaskChanges) -> Result<TaskChanges, ServiceError> {
    if let Some(title) = changes.title.take() {
        let title = title.trim();
        if title.is_empty() {
            return Err(ServiceError::BadRequest("Title cannot be empty".to_string()));
        }
        changes.title = Some(title.to_string());
    }
    changes.due_date = changes.due_date.map(|d| d.trim().to_string());
    changes.due_time = changes.due_time.map(|t| t.trim().to_string());
    if changes.is_empty() {
        return Err(ServiceError::BadRequest("Nothing to update".to_string()));
    }
    Ok(changes)
}

async fn apply_changes(data: &AppState, mut task: Task, changes: &TaskChanges) -> Result<Task, ServiceError> {
    if !data.repos.tasks.update_task(&task.id, changes).await? {
        return Err(ServiceError::NotFound("Task not found".to_string()));
    }
    changes.apply(&mut task);
    task.updated_at = Utc::now();
    Ok(task)
}

async fn load_task(data: &AppState, task_id: &str) -> Result<Task, ServiceError> {
    data.repos
        .tasks
        .find_task(task_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound("Task not found".to_string()))
}

/// Loads a task the caller is assigned to.
async fn load_assigned(data: &AppState, task_id: &str, caller: &str) -> Result<Task, ServiceError> {
    let task = load_task(data, task_id).await?;
    if !task.is_assigned_to(caller) {
        return Err(ServiceError::Forbidden(
            "You are not assigned to this task".to_string(),
        ));
    }
    Ok(task)
}

// POST /tasks
pub async fn create_task(
    req: HttpRequest,
    data: web::Data<AppState>,
    payload: web::Json<CreateTaskRequest>,
) -> Result<HttpResponse, ServiceError> {
    let caller = current_user(&req)?;
    let task = payload.into_inner().into_task(vec![caller.clone()])?;
    data.repos.tasks.insert_task(&task).await?;
    data.repos.users.push_task(&caller, &task.id).await?;
    info!("Task {} created by {}", task.id, caller);
    Ok(HttpResponse::Created().json(task))
}

// POST /teams/{team_id}/tasks
pub async fn create_team_task(
    req: HttpRequest,
    data: web::Data<AppState>,
    team_id: web::Path<String>,
    payload: web::Json<CreateTaskRequest>,
) -> Result<HttpResponse, ServiceError> {
    let caller = current_user(&req)?;
    let team = data.membership.get_team(&team_id, &caller).await?;
    let payload = payload.into_inner();
    if non_blank(payload.due_date.clone()).is_none() || non_blank(payload.due_time.clone()).is_none() {
        return Err(ServiceError::BadRequest(
            "Team tasks need a due date and a due time".to_string(),
        ));
    }

    let mut task = payload.into_task(team.members.clone())?;
    task.team_id = Some(team.id.clone());
    data.repos.tasks.insert_task(&task).await?;
    for member in &team.members {
        data.repos.users.push_task(member, &task.id).await?;
    }
    info!("Team task {} created in {} by {}", task.id, team.id, caller);

    let members = data.repos.users.find_users_by_ids(&team.members).await?;
    dispatch(
        data.mailer.as_ref(),
        Notification::new(
            members.into_iter().map(|u| u.email).collect(),
            format!("New Task Assigned: {}", task.title),
            format!(
                "Hello,\n\nA new task \"{}\" has been assigned to the team \"{}\".",
                task.title, team.name
            ),
        ),
    )
    .await;

    Ok(HttpResponse::Created().json(task))
}

// GET /tasks?important=&complete=&priority=
pub async fn list_tasks(
    req: HttpRequest,
    data: web::Data<AppState>,
    query: web::Query<TaskQuery>,
) -> Result<HttpResponse, ServiceError> {
    let caller = current_user(&req)?;
    let mut tasks: Vec<Task> = data
        .repos
        .tasks
        .find_tasks_assigned_to(&caller)
        .await?
        .into_iter()
        .filter(|t| query.matches(t))
        .collect();
    tasks.sort_by(|a, b| {
        b.priority
            .rank()
            .cmp(&a.priority.rank())
            .then(b.created_at.cmp(&a.created_at))
    });
    Ok(HttpResponse::Ok().json(tasks))
}

// GET /teams/{team_id}/tasks
pub async fn list_team_tasks(
    req: HttpRequest,
    data: web::Data<AppState>,
    team_id: web::Path<String>,
) -> Result<HttpResponse, ServiceError> {
    let caller = current_user(&req)?;
    let team = data.membership.get_team(&team_id, &caller).await?;
    let tasks = data.repos.tasks.find_team_tasks(&team.id).await?;
    Ok(HttpResponse::Ok().json(tasks))
}

// GET /tasks/overdue
pub async fn list_overdue(req: HttpRequest, data: web::Data<AppState>) -> Result<HttpResponse, ServiceError> {
    let caller = current_user(&req)?;
    let now = Utc::now();
    let zone = data.config.reference_zone;
    let overdue: Vec<Task> = data
        .repos
        .tasks
        .find_tasks_assigned_to(&caller)
        .await?
        .into_iter()
        .filter(|t| !t.complete && matches!(evaluate(t, zone, now), DueState::Overdue(_)))
        .collect();
    Ok(HttpResponse::Ok().json(overdue))
}

// PUT /tasks/{task_id}/complete
pub async fn toggle_complete(
    req: HttpRequest,
    data: web::Data<AppState>,
    task_id: web::Path<String>,
) -> Result<HttpResponse, ServiceError> {
    let caller = current_user(&req)?;
    let mut task = load_assigned(&data, &task_id, &caller).await?;
    let complete = !task.complete;
    let completed_by = complete.then_some(caller.as_str());
    if !data.repos.tasks.set_complete(&task.id, complete, completed_by).await? {
        return Err(ServiceError::NotFound("Task not found".to_string()));
    }
    task.complete = complete;
    task.completed_by = completed_by.map(str::to_string);
    Ok(HttpResponse::Ok().json(task))
}

// PUT /tasks/{task_id}/important
pub async fn toggle_important(
    req: HttpRequest,
    data: web::Data<AppState>,
    task_id: web::Path<String>,
) -> Result<HttpResponse, ServiceError> {
    let caller = current_user(&req)?;
    let mut task = load_assigned(&data, &task_id, &caller).await?;
    if !data.repos.tasks.set_important(&task.id, !task.important).await? {
        return Err(ServiceError::NotFound("Task not found".to_string()));
    }
    task.important = !task.important;
    Ok(HttpResponse::Ok().json(task))
}

// PUT /tasks/{task_id}
pub async fn update_task(
    req: HttpRequest,
    data: web::Data<AppState>,
    task_id: web::Path<String>,
    payload: web::Json<TaskChanges>,
) -> Result<HttpResponse, ServiceError> {
    let caller = current_user(&req)?;
    let changes = checked_changes(payload.into_inner())?;
    let task = load_assigned(&data, &task_id, &caller).await?;
    let task = apply_changes(&data, task, &changes).await?;
    info!("Task {} updated by {}", task.id, caller);
    Ok(HttpResponse::Ok().json(task))
}

// PUT /teams/{team_id}/tasks/{task_id}
pub async fn update_team_task(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<(String, String)>,
    payload: web::Json<TaskChanges>,
) -> Result<HttpResponse, ServiceError> {
    let caller = current_user(&req)?;
    let (team_id, task_id) = path.into_inner();
    let changes = checked_changes(payload.into_inner())?;
    let team = data.membership.get_team(&team_id, &caller).await?;
    let task = load_task(&data, &task_id).await?;
    if task.team_id.as_deref() != Some(team.id.as_str()) {
        return Err(ServiceError::NotFound("Task not found in this team".to_string()));
    }
    let task = apply_changes(&data, task, &changes).await?;
    info!("Team task {} in {} updated by {}", task.id, team.id, caller);

    let members = data.repos.users.find_users_by_ids(&team.members).await?;
    dispatch(
        data.mailer.as_ref(),
        Notification::new(
            members.into_iter().map(|u| u.email).collect(),
            "Task Updated",
            format!(
                "Hello,\n\nThe task \"{}\" in your team \"{}\" has been updated. Please review the changes.",
                task.title, team.name
            ),
        ),
    )
    .await;

    Ok(HttpResponse::Ok().json(task))
}

// DELETE /tasks/{task_id}
pub async fn delete_task(
    req: HttpRequest,
    data: web::Data<AppState>,
    task_id: web::Path<String>,
) -> Result<HttpResponse, ServiceError> {
    let caller = current_user(&req)?;
    let task = load_assigned(&data, &task_id, &caller).await?;

    if !data.repos.tasks.delete_task(&task.id).await? {
        return Err(ServiceError::NotFound("Task not found".to_string()));
    }
    for user_id in &task.assigned_users {
        if let Err(e) = data.repos.users.pull_task(user_id, &task.id).await {
            warn!("Could not detach task {} from user {}: {}", task.id, user_id, e);
        }
    }
    info!("Task {} deleted by {}", task.id, caller);

    if task.team_id.is_some() {
        let members = data.repos.users.find_users_by_ids(&task.assigned_users).await?;
        dispatch(
            data.mailer.as_ref(),
            Notification::new(
                members.into_iter().map(|u| u.email).collect(),
                "Task Deleted",
                format!("Hello,\n\nThe task \"{}\" has been deleted.", task.title),
            ),
        )
        .await;
    }

    Ok(HttpResponse::Ok().json(serde_json::json!({ "message": "Task deleted successfully" })))
}

// POST /tasks/{task_id}/comments
pub async fn add_comment(
    req: HttpRequest,
    data: web::Data<AppState>,
    task_id: web::Path<String>,
    payload: web::Json<CommentRequest>,
) -> Result<HttpResponse, ServiceError> {
    let caller = current_user(&req)?;
    let text = payload.text.trim();
    if text.is_empty() {
        return Err(ServiceError::BadRequest("Comment text is required".to_string()));
    }
    let task = load_assigned(&data, &task_id, &caller).await?;

    let comment = Comment {
        id: new_id(),
        user_id: caller,
        text: text.to_string(),
        created_at: Utc::now(),
    };
    if !data.repos.tasks.push_comment(&task.id, &comment).await? {
        return Err(ServiceError::NotFound("Task not found".to_string()));
    }
    Ok(HttpResponse::Created().json(comment))
}

// DELETE /tasks/{task_id}/comments/{comment_id}
pub async fn delete_comment(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<(String, String)>,
) -> Result<HttpResponse, ServiceError> {
    let caller = current_user(&req)?;
    let (task_id, comment_id) = path.into_inner();
    let task = load_task(&data, &task_id).await?;
    let comment = task
        .comments
        .iter()
        .find(|c| c.id == comment_id)
        .ok_or_else(|| ServiceError::NotFound("Comment not found".to_string()))?;
    if comment.user_id != caller {
        return Err(ServiceError::Forbidden(
            "You can only delete your own comments".to_string(),
        ));
    }
    if !data.repos.tasks.pull_comment(&task.id, &comment_id).await? {
        return Err(ServiceError::NotFound("Comment not found".to_string()));
    }
    Ok(HttpResponse::Ok().json(serde_json::json!({ "message": "Comment deleted successfully" })))
}
