//! Live results.
//!
//! Every successful vote pushes one unit onto a broadcast channel; each open
//! results page holds an SSE subscription and refetches the tally table when
//! a notification arrives. The notification does not say which team changed,
//! and missed notifications are not replayed — a page that was disconnected
//! catches up on its next refetch.

use db::{tally::TallyRow, DbConn};
use maud::Markup;
use rocket::{
    request::FlashMessage,
    response::stream::{Event, EventStream},
    tokio::select,
    tokio::sync::broadcast::{self, error::RecvError},
    Shutdown, State,
};
use tracing::Instrument;

use trace_request::TracingSpan;
use ui::{flash_banner, page_of_body_with_extra_head, tally_table};

/// Change notifications for the tally table, carried in managed state.
pub struct TallyFeed {
    tx: broadcast::Sender<()>,
}

impl TallyFeed {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(16);
        TallyFeed { tx }
    }

    /// Signal that some team's tally changed. Subscribers do not learn
    /// which.
    pub fn notify(&self) {
        // send only fails when nobody is subscribed
        let _ = self.tx.send(());
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }
}

#[get("/results")]
pub async fn results_page(
    db: DbConn,
    msg: Option<FlashMessage<'_>>,
    span: TracingSpan,
) -> Markup {
    let msg = msg.map(|msg| (msg.kind().to_string(), msg.message().to_string()));

    let rows = db
        .run(|conn| TallyRow::leaderboard(conn))
        .instrument(span.0)
        .await;

    let rows = match rows {
        Ok(rows) => rows,
        Err(e) => {
            tracing::warn!("could not load the leaderboard: {e}");
            return page_of_body_with_extra_head(
                maud::html! {
                    div class="alert alert-danger" role="alert" {
                        "Could not load the results. "
                        a href="/results" { "Retry" }
                    }
                },
                None,
            );
        }
    };

    page_of_body_with_extra_head(
        maud::html! {
            (flash_banner(msg))
            h1 { "Live results" }
            p class="text-muted" { "Counts update as votes land. No refresh needed." }

            div hx-ext="sse" sse-connect="/results/feed" {
                div id="tally"
                    hx-get="/results/table"
                    hx-trigger="sse:tally_changed"
                    hx-swap="innerHTML" {
                    (tally_table(&rows))
                }
            }

            a class="btn btn-outline-primary" href="/" { "Back to voting" }
        },
        Some(maud::html! {
            script src="https://unpkg.com/htmx-ext-sse@2.2.2" crossorigin="anonymous" {}
        }),
    )
}

/// The tally partial the results page refetches on every notification. Vote
/// status and the team list are untouched by these refreshes.
#[get("/results/table")]
pub async fn tally_table_partial(
    db: DbConn,
    span: TracingSpan,
) -> Option<Markup> {
    let rows = db
        .run(|conn| TallyRow::leaderboard(conn))
        .instrument(span.0)
        .await;

    match rows {
        Ok(rows) => Some(tally_table(&rows)),
        Err(e) => {
            tracing::warn!("could not refresh the leaderboard: {e}");
            None
        }
    }
}

/// One subscription per open results page. Dropping out of this generator —
/// client gone, server shutting down, channel closed — drops the receiver,
/// which is the deregistration.
#[get("/results/feed")]
pub fn tally_feed(feed: &State<TallyFeed>, mut end: Shutdown) -> EventStream![] {
    let mut rx = feed.subscribe();
    EventStream! {
        loop {
            select! {
                msg = rx.recv() => match msg {
                    Ok(()) => yield Event::empty().event("tally_changed"),
                    // a lagged subscriber resyncs on its next refetch;
                    // missed notifications are not replayed
                    Err(RecvError::Lagged(_)) => {
                        yield Event::empty().event("tally_changed")
                    }
                    Err(RecvError::Closed) => break,
                },
                _ = &mut end => break,
            }
        }
    }
}
