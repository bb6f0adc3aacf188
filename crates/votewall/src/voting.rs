//! The voting flow.
//!
//! The page load resolves the device identity, loads teams and checks the
//! store for a prior vote; the vote submission is guarded by session-local
//! state first and by the store's unique index second. Session state is only
//! ever added to, never rolled back: a failure after a successful insert
//! cannot un-vote anyone.

use db::{error::StoreError, team::Team, vote::Vote, DbConn};
use diesel::{connection::LoadConnection, sqlite::Sqlite, Connection};
use itertools::Itertools;
use maud::{Markup, PreEscaped};
use rocket::{
    form::Form,
    http::{Cookie, CookieJar},
    request::FlashMessage,
    response::{Flash, Redirect},
    State,
};
use serde::Serialize;
use tracing::Instrument;

use crate::{
    fingerprint::{DeviceFingerprint, VOTED_COOKIE},
    results::TallyFeed,
    util::{gen_uuid, UserAgent},
};
use trace_request::TracingSpan;
use ui::page_of_body_and_flash_msg;

/// Outcome of a vote attempt, after store errors have been translated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoteOutcome {
    Accepted {
        team_public_id: String,
        team_name: String,
    },
    /// The store's unique index rejected the insert: this device voted in an
    /// earlier session. The named team is the one this request attempted,
    /// not necessarily the one the earlier vote was for; the actual vote is
    /// not re-queried.
    AlreadyVoted {
        team_public_id: String,
        team_name: String,
    },
    UnknownTeam,
}

/// Attempts to record a vote for the given team.
///
/// The store remains the authority on both invariants: this function makes
/// no pre-check of its own, it inserts and translates whatever the
/// constraints say.
pub fn cast_vote(
    conn: &mut (impl Connection<Backend = Sqlite> + LoadConnection),
    public_id: &str,
    fingerprint: &str,
    user_agent: &str,
    team_public_id: &str,
) -> Result<VoteOutcome, StoreError> {
    let team = match Team::by_public_id(conn, team_public_id)? {
        Some(team) => team,
        None => return Ok(VoteOutcome::UnknownTeam),
    };

    match Vote::insert(conn, public_id, team.id, fingerprint, user_agent) {
        Ok(_) => Ok(VoteOutcome::Accepted {
            team_public_id: team.public_id,
            team_name: team.name,
        }),
        Err(StoreError::DuplicateVote) => Ok(VoteOutcome::AlreadyVoted {
            team_public_id: team.public_id,
            team_name: team.name,
        }),
        Err(StoreError::UnknownTeam) => Ok(VoteOutcome::UnknownTeam),
        Err(other) => Err(other),
    }
}

#[get("/")]
pub async fn voting_page(
    db: DbConn,
    fp: DeviceFingerprint,
    cookies: &CookieJar<'_>,
    msg: Option<FlashMessage<'_>>,
    span: TracingSpan,
) -> Markup {
    let msg = msg.map(|msg| (msg.kind().to_string(), msg.message().to_string()));
    let fingerprint = fp.0.clone();

    let loaded = db
        .run(move |conn| {
            conn.transaction(|conn| -> Result<_, StoreError> {
                let teams = Team::all_ordered(conn)?;
                let prior_vote = Vote::find_by_fingerprint(conn, &fingerprint)?;
                Ok((teams, prior_vote))
            })
        })
        .instrument(span.0)
        .await;

    let (teams, prior_vote) = match loaded {
        Ok(loaded) => loaded,
        Err(e) => {
            tracing::warn!("could not load the voting page: {e}");
            return page_of_body_and_flash_msg(
                maud::html! {
                    div class="alert alert-danger" role="alert" {
                        "Could not load the teams. "
                        a href="/" { "Retry" }
                    }
                },
                msg,
            );
        }
    };

    // Rediscover "already voted" state from the store: the store knows which
    // team this was, so the session cookie is set to the true value here.
    let voted_team = prior_vote
        .as_ref()
        .and_then(|vote| teams.iter().find(|team| team.id == vote.team_id));
    if let Some(team) = voted_team {
        cookies.add(voted_cookie(team.public_id.clone()));
    }
    let has_voted = prior_vote.is_some() || cookies.get(VOTED_COOKIE).is_some();

    page_of_body_and_flash_msg(
        maud::html! {
            h1 { "Cast your vote" }
            p class="text-muted" { "One vote per device. Choose carefully!" }

            @if let Some(team) = voted_team {
                div class="alert alert-success" role="alert" {
                    "You voted for " b { (team.name) } ". Watch the "
                    a href="/results" { "live results" } "."
                }
            }

            @if teams.is_empty() {
                div class="alert alert-info" role="alert" {
                    "No teams have registered yet. Check back soon, or "
                    a href="/register" { "register yours" } "."
                }
            }

            div class="row" {
                @for team in &teams {
                    div class="col-md-4 mb-3" {
                        div class="card h-100" {
                            div class="card-body" {
                                h5 class="card-title" { (team.name) }
                                p class="card-text" { (team.description) }
                                @if let Some(captain) = &team.captain_name {
                                    p class="text-muted small mb-1" { "Captain: " (captain) }
                                }
                                @if !team.member_names().is_empty() {
                                    p class="text-muted small" { (team.member_names().iter().join(", ")) }
                                }
                                @if has_voted {
                                    button class="btn btn-secondary" disabled { "Vote" }
                                } @else {
                                    form method="post" action="/vote" {
                                        input type="hidden" name="team_id" value=(team.public_id);
                                        button type="submit" class="btn btn-primary" { "Vote" }
                                    }
                                }
                            }
                        }
                    }
                }
            }

            (fingerprint_script())
        },
        msg,
    )
}

#[derive(FromForm, Serialize)]
pub struct VoteForm {
    pub team_id: String,
}

#[post("/vote", data = "<form>")]
pub async fn do_vote(
    form: Form<VoteForm>,
    db: DbConn,
    fp: DeviceFingerprint,
    ua: UserAgent,
    cookies: &CookieJar<'_>,
    feed: &State<TallyFeed>,
    span: TracingSpan,
) -> Flash<Redirect> {
    if cookies.get(VOTED_COOKIE).is_some() {
        // Session state already records a vote: reject without touching the
        // store at all.
        return Flash::error(Redirect::to("/"), "You have already voted!");
    }

    let fingerprint = fp.0.clone();
    let team_public_id = form.team_id.clone();
    let public_id = gen_uuid().to_string();

    let outcome = db
        .run(move |conn| {
            conn.transaction(|conn| {
                cast_vote(
                    conn,
                    &public_id,
                    &fingerprint,
                    &ua.0,
                    &team_public_id,
                )
            })
        })
        .instrument(span.0)
        .await;

    match outcome {
        Ok(VoteOutcome::Accepted {
            team_public_id,
            team_name,
        }) => {
            cookies.add(voted_cookie(team_public_id));
            feed.notify();
            Flash::success(
                Redirect::to("/results"),
                format!("Vote recorded for {team_name}. Thanks for taking part!"),
            )
        }
        Ok(VoteOutcome::AlreadyVoted { team_public_id, .. }) => {
            cookies.add(voted_cookie(team_public_id));
            Flash::error(Redirect::to("/results"), "You have already voted!")
        }
        Ok(VoteOutcome::UnknownTeam) => Flash::error(
            Redirect::to("/"),
            "That team no longer exists. Refresh the page and pick again.",
        ),
        Err(e) => {
            tracing::warn!("vote insert failed: {e}");
            Flash::error(
                Redirect::to("/"),
                "Something went wrong recording your vote. Please try again.",
            )
        }
    }
}

fn voted_cookie(team_public_id: String) -> Cookie<'static> {
    // Session cookie: the voted state is rediscovered from the store on the
    // next visit, so it does not need to outlive the browser session.
    Cookie::build((VOTED_COOKIE, team_public_id))
        .path("/")
        .build()
}

/// Establishes the `device_fp` session cookie in the browser: FingerprintJS
/// when it loads, otherwise the same composite-and-hash fallback the server
/// implements in [`crate::fingerprint`].
fn fingerprint_script() -> Markup {
    maud::html! {
        script type="module" {
            (PreEscaped(r#"
            if (!document.cookie.split('; ').some((c) => c.startsWith('device_fp='))) {
                const fallback = () => {
                    const canvas = document.createElement('canvas');
                    const ctx = canvas.getContext('2d');
                    if (ctx) {
                        ctx.textBaseline = 'top';
                        ctx.font = '14px Arial';
                        ctx.fillText('device fingerprint fallback', 2, 2);
                    }
                    const composite = [
                        navigator.userAgent,
                        navigator.language,
                        screen.width + 'x' + screen.height,
                        new Date().getTimezoneOffset(),
                        canvas.toDataURL().slice(-50),
                        Math.random().toString(36).substring(2)
                    ].join('|');
                    let hash = 0;
                    for (let i = 0; i < composite.length; i++) {
                        hash = ((hash << 5) - hash) + composite.charCodeAt(i);
                        hash = hash & hash;
                    }
                    return Math.abs(hash).toString(36);
                };
                let id;
                try {
                    const FingerprintJS = await import('https://openfpcdn.io/fingerprintjs/v4');
                    id = (await (await FingerprintJS.load()).get()).visitorId;
                } catch (e) {
                    id = fallback();
                }
                document.cookie = 'device_fp=' + id + '; path=/; samesite=lax';
            }
            "#))
        }
    }
}
