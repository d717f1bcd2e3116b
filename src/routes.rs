use actix_web::web;

use crate::analytics::{team_activity, team_growth, team_participation};
use crate::auth::{login, me, signup, update_profile};
use crate::task_management::{
    add_comment, create_task, create_team_task, delete_comment, delete_task, list_overdue,
    list_tasks, list_team_tasks, toggle_complete, toggle_important, update_task, update_team_task,
};
use crate::team_management::{
    count_pending_invitations, create_team, delete_team, get_pending_invitations, get_team,
    get_user_teams, invite_members, leave_team, respond_to_invitation,
};

/// The whole HTTP surface. Shared by `main` and the handler tests.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg
        // AUTH
        .service(
            web::scope("/auth")
                .route("/signup", web::post().to(signup))
                .route("/login", web::post().to(login))
                .route("/me", web::get().to(me))
                .route("/me", web::put().to(update_profile)),
        )
        // TEAMS
        .service(
            web::scope("/teams")
                .route("", web::post().to(create_team))
                .service(
                    web::scope("/{team_id}")
                        .route("", web::get().to(get_team))
                        .route("", web::delete().to(delete_team))
                        .route("/invite", web::post().to(invite_members))
                        .route("/leave", web::delete().to(leave_team))
                        .route("/tasks", web::get().to(list_team_tasks))
                        .route("/tasks", web::post().to(create_team_task))
                        .route("/tasks/{task_id}", web::put().to(update_team_task))
                        .route("/activity", web::get().to(team_activity))
                        .route("/participation", web::get().to(team_participation))
                        .route("/growth", web::get().to(team_growth)),
                ),
        )
        // INVITATIONS
        .service(
            web::scope("/invitations")
                .route("/{invitation_id}/respond", web::post().to(respond_to_invitation)),
        )
        // USERS
        .service(
            web::scope("/users/{user_id}")
                .route("/invitations", web::get().to(get_pending_invitations))
                .route("/invitations/count", web::get().to(count_pending_invitations))
                .route("/teams", web::get().to(get_user_teams)),
        )
        // TASKS
        .service(
            web::scope("/tasks")
                .route("", web::post().to(create_task))
                .route("", web::get().to(list_tasks))
                .route("/overdue", web::get().to(list_overdue))
                .service(
                    web::scope("/{task_id}")
                        .route("", web::put().to(update_task))
                        .route("", web::delete().to(delete_task))
                        .route("/complete", web::put().to(toggle_complete))
                        .route("/important", web::put().to(toggle_important))
                        .route("/comments", web::post().to(add_comment))
                        .route("/comments/{comment_id}", web::delete().to(delete_comment)),
                ),
        );
}
