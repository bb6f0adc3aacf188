use db::tally::TallyRow;
use maud::{html, Markup, DOCTYPE};

/// Renders an HTML page with the provided body markup.
pub fn page_of_body(body: Markup) -> Markup {
    page_of_body_with_extra_head(body, None)
}

pub fn page_of_body_and_flash_msg(
    body: Markup,
    flash: Option<(String, String)>,
) -> Markup {
    page_of_body(html! {
        (flash_banner(flash))
        (body)
    })
}

pub fn page_of_body_with_extra_head(
    body: Markup,
    extra_head: Option<Markup>,
) -> Markup {
    html! {
        (DOCTYPE)
        html {
            head {
                title { "Votewall" }
                script src="https://unpkg.com/htmx.org@2.0.2" integrity="sha384-Y7hw+L/jvKeWIRRkqWYfPcvVxHzVzn5REgzbawhxAuQGwX1XWe70vji+VSeHOThJ" crossorigin="anonymous" {}
                link href="https://cdn.jsdelivr.net/npm/bootstrap@5.3.3/dist/css/bootstrap.min.css" rel="stylesheet" integrity="sha384-QWTKZyjpPEjISv5WaRU9OFeRpok6YctnYmDr5pNlyT2bRjXh0JMhjY6hW+ALEwIH" crossorigin="anonymous" {}
                meta name="viewport" content="width=device-width, initial-scale=1" {}
                @if let Some(head) = extra_head {
                    (head)
                }
            }
            body {
                nav class="navbar navbar-expand" style="background-color: #14407B" data-bs-theme="dark" {
                    div class="container-fluid" {
                        ul class="nav nav-justify-start" data-bs-theme="dark" {
                            li class="nav-item" {
                                a class="nav-link text-white" href="/" { "Vote" }
                            }
                            li class="nav-item" {
                                a class="nav-link text-white" href="/results" { "Results" }
                            }
                        }
                        ul class="nav nav-justify-end" data-bs-theme="dark" {
                            li class="nav-item" {
                                a class="nav-link text-white" href="/register" { "Register a team" }
                            }
                        }
                    }
                }
                div class="container" {
                    div class="mt-4" {
                        (body)
                    }
                }
            }
        }
    }
}

/// An alert for a one-shot flash message; `flash` is the (kind, message)
/// pair rocket's `FlashMessage` carries.
pub fn flash_banner(flash: Option<(String, String)>) -> Markup {
    html! {
        @if let Some((kind, msg)) = flash {
            @let class = if kind == "success" { "alert alert-success" } else { "alert alert-danger" };
            div class="container mt-3" {
                div class=(class) role="alert" {
                    (msg)
                }
            }
        }
    }
}

/// The leaderboard, highest count first. Used for the initial render of the
/// results page and for every live refresh of its table.
pub fn tally_table(rows: &[TallyRow]) -> Markup {
    html! {
        @if rows.is_empty() {
            p class="text-muted" { "No votes yet." }
        } @else {
            table class="table" {
                thead {
                    tr {
                        th scope="col" { "#" }
                        th scope="col" { "Team" }
                        th scope="col" { "Votes" }
                        th scope="col" { "Last vote" }
                    }
                }
                tbody {
                    @for (i, row) in rows.iter().enumerate() {
                        tr {
                            th scope="row" { (i + 1) }
                            td { (row.team_name) }
                            td { (row.vote_count) }
                            td class="text-muted" {
                                @if row.vote_count > 0 {
                                    (row.last_updated.format("%H:%M:%S"))
                                } @else {
                                    "-"
                                }
                            }
                        }
                    }
                }
            }
        }
    }
}

pub fn error_404() -> Markup {
    page_of_body(html! {
        div class="text-center" {
            h1 class="display-1 text-danger" { "404" }
            h2 class="mb-4" { "Not found" }
            p class="lead" { "That page does not exist." }
            a class="btn btn-danger" href="/" { "Return Home" }
        }
    })
}
