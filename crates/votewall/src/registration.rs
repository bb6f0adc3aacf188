use db::{
    error::StoreError,
    tally::TallyRecord,
    team::{Team, TeamDraft},
    DbConn,
};
use maud::Markup;
use rocket::{
    form::Form,
    response::{Flash, Redirect},
};
use serde::Serialize;
use tracing::Instrument;

use crate::util::{gen_uuid, is_valid_contact};
use trace_request::TracingSpan;
use ui::page_of_body;

pub const MAX_MEMBERS: usize = 5;

#[get("/register")]
pub async fn register_page() -> Markup {
    register_form(None, None)
}

fn register_form(
    form: Option<&RegisterTeamForm>,
    error: Option<&str>,
) -> Markup {
    let markup = maud::html! {
        h1 { "Register your team" }
        @if let Some(err) = error {
            div class="alert alert-danger" role="alert" {
                (err)
            }
        }
        form method="post" {
            div class="mb-3" {
                label for="name" class="form-label" { "Team name" }
                input type="text" class="form-control" id="name" name="name" value=(form.map(|f| f.name.clone()).unwrap_or_default());
            }
            div class="mb-3" {
                label for="description" class="form-label" { "Description" }
                textarea class="form-control" id="description" name="description" {
                    (form.map(|f| f.description.clone()).unwrap_or_default())
                }
            }
            div class="mb-3" {
                label for="captain_name" class="form-label" { "Captain" }
                input type="text" class="form-control" id="captain_name" name="captain_name" value=(form.map(|f| f.captain_name.clone()).unwrap_or_default());
            }
            div class="mb-3" {
                label class="form-label" { "Members (up to five)" }
                @for i in 0..MAX_MEMBERS {
                    input type="text" class="form-control mb-1" name="members" value=(form.and_then(|f| f.members.get(i).cloned()).unwrap_or_default());
                }
            }
            div class="mb-3" {
                label for="contact_info" class="form-label" { "Contact (email or phone)" }
                input type="text" class="form-control" id="contact_info" name="contact_info" value=(form.map(|f| f.contact_info.clone()).unwrap_or_default());
            }
            div class="mb-3" {
                label for="project_description" class="form-label" { "Project description (optional)" }
                textarea class="form-control" id="project_description" name="project_description" {
                    (form.map(|f| f.project_description.clone()).unwrap_or_default())
                }
            }
            button type="submit" class="btn btn-primary" { "Register" }
        }
    };
    page_of_body(markup)
}

#[derive(FromForm, Serialize)]
pub struct RegisterTeamForm {
    pub name: String,
    pub description: String,
    pub captain_name: String,
    pub members: Vec<String>,
    pub contact_info: String,
    pub project_description: String,
}

#[post("/register", data = "<form>")]
pub async fn do_register(
    form: Form<RegisterTeamForm>,
    db: DbConn,
    span: TracingSpan,
) -> Result<Flash<Redirect>, Markup> {
    let form = form.into_inner();

    if !Team::validate_name(&form.name) {
        return Err(register_form(
            Some(&form),
            Some("Error: team names need at least 2 characters."),
        ));
    }
    if !Team::validate_description(&form.description) {
        return Err(register_form(
            Some(&form),
            Some("Error: descriptions need at least 10 characters."),
        ));
    }
    if form.captain_name.trim().is_empty() {
        return Err(register_form(
            Some(&form),
            Some("Error: every team needs a captain."),
        ));
    }
    if !is_valid_contact(form.contact_info.trim()) {
        return Err(register_form(
            Some(&form),
            Some("Error: enter a contact email address or phone number."),
        ));
    }

    let draft = TeamDraft {
        name: form.name.trim().to_string(),
        description: form.description.trim().to_string(),
        captain_name: form.captain_name.trim().to_string(),
        members: form
            .members
            .iter()
            .map(|member| member.trim().to_string())
            .filter(|member| !member.is_empty())
            .take(MAX_MEMBERS)
            .collect(),
        contact_info: form.contact_info.trim().to_string(),
        project_description: match form.project_description.trim() {
            "" => None,
            other => Some(other.to_string()),
        },
    };
    let public_id = gen_uuid().to_string();

    let created = db
        .run(move |conn| {
            let team = Team::insert(conn, &public_id, &draft)?;

            // Deliberately not transactional with the team insert: a tally
            // failure leaves the team registered, it just never shows up on
            // the leaderboard until the row exists.
            if let Err(e) = TallyRecord::init_for_team(conn, team.id) {
                tracing::warn!(
                    "could not initialise the tally for team {}: {e}",
                    team.public_id
                );
            }

            Ok::<_, StoreError>(team)
        })
        .instrument(span.0)
        .await;

    match created {
        Ok(team) => Ok(Flash::success(
            Redirect::to("/"),
            format!("{} is registered. Good luck!", team.name),
        )),
        Err(StoreError::DuplicateTeamName) => Err(register_form(
            Some(&form),
            Some("Error: a team with that name already exists."),
        )),
        Err(e) => {
            tracing::warn!("team registration failed: {e}");
            Err(register_form(
                Some(&form),
                Some("Error: registration failed. Please try again."),
            ))
        }
    }
}
