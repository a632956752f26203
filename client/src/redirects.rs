use crate::{
    conn::{self, Conn},
    plan::RequestPlan,
    pool::Origin,
    Client, Response, StreamedResponse,
};
use courier_http::{Error, KnownHeaderName, Method, Result, Status};
use std::time::Instant;
use url::Url;

/// Drive `plan` through the single-hop pipeline until a terminal
/// response, following redirects and rewriting the plan between hops.
/// The returned exchange's body has not been read.
async fn drive(client: &Client, plan: &mut RequestPlan) -> Result<Conn> {
    let mut hops = 0u32;

    loop {
        let mut conn = conn::exchange(client, plan).await?;

        if !conn.status.is_redirect() || !plan.allow_redirects {
            return Ok(conn);
        }

        // a redirect status without a location is terminal
        let Some(location) = conn
            .response_headers
            .get_str(KnownHeaderName::Location)
            .map(str::to_string)
        else {
            return Ok(conn);
        };

        if hops == plan.max_redirects {
            return Err(Error::TooManyRedirects);
        }

        let next_url = resolve_location(&plan.url, &location)?;

        // the hop response joins history with headers and body intact
        let body = conn.read_body(client.max_body_length).await?;

        // connections are never reused across a scheme change; otherwise
        // the exchange decides based on keep-alive
        if next_url.scheme() == plan.url.scheme() {
            conn.release(&client.pool);
        }

        log::debug!("following {} redirect to {next_url}", conn.status);

        plan.history.push(Response {
            status: conn.status,
            reason: std::mem::take(&mut conn.reason),
            version: conn.version,
            headers: std::mem::take(&mut conn.response_headers),
            body,
            url: plan.url.clone(),
            elapsed: conn.hop_elapsed,
            history: Vec::new(),
        });

        rewrite_method(plan, conn.status);
        scrub_cross_origin_auth(plan, &next_url);

        plan.url = next_url;
        hops += 1;
    }
}

/// Run a plan to completion with a fully buffered body.
pub(crate) async fn follow(client: &Client, mut plan: RequestPlan) -> Result<Response> {
    let started = Instant::now();
    let mut conn = drive(client, &mut plan).await?;
    let body = conn.read_body(client.max_body_length).await?;
    conn.release(&client.pool);

    Ok(Response {
        status: conn.status,
        reason: conn.reason,
        version: conn.version,
        headers: conn.response_headers,
        body,
        url: plan.url,
        elapsed: started.elapsed(),
        history: plan.history,
    })
}

/// Run a plan to completion, handing the terminal hop's body back as a
/// lazy stream that owns its connection. `deadline` extends the request
/// deadline over the drain of that stream.
pub(crate) async fn follow_streamed(
    client: &Client,
    mut plan: RequestPlan,
    deadline: Option<Instant>,
) -> Result<StreamedResponse> {
    let started = Instant::now();
    let conn = drive(client, &mut plan).await?;
    conn.into_streamed(
        &client.pool,
        plan.url,
        plan.history,
        started.elapsed(),
        deadline,
    )
}

/// rfc 3986 §5.3 reference resolution: absolute locations stand alone,
/// relative ones inherit scheme and authority from the current url.
fn resolve_location(base: &Url, location: &str) -> Result<Url> {
    match Url::parse(location) {
        Ok(url) => Ok(url),
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            base.join(location).map_err(|error| {
                log::debug!("unresolvable location {location:?}: {error}");
                Error::InvalidResponse
            })
        }
        Err(error) => {
            log::debug!("unparsable location {location:?}: {error}");
            Err(Error::InvalidResponse)
        }
    }
}

/// 303 always demotes to a bodiless GET; 301 and 302 do so only for POST
/// (the browser-compatible reading); 307 and 308 preserve the method and
/// body.
fn rewrite_method(plan: &mut RequestPlan, status: Status) {
    let demote = if status == Status::SEE_OTHER {
        true
    } else if status == Status::MOVED_PERMANENTLY || status == Status::FOUND {
        plan.method == Method::Post
    } else {
        false
    };

    if demote {
        plan.method = Method::Get;
        plan.body.drop_content();
        plan.headers.remove(KnownHeaderName::ContentType);
    }
}

/// Leaving the origin drops credentials, both the caller's explicit
/// `Authorization` header and the plan's auth scheme, unless cross-origin
/// auth was opted into. Cookies need no scrubbing here because the
/// `Cookie` header is recomputed from the jar on every hop.
fn scrub_cross_origin_auth(plan: &mut RequestPlan, next_url: &Url) {
    if plan.cross_origin_auth {
        return;
    }

    let same_origin = match (Origin::from_url(&plan.url), Origin::from_url(next_url)) {
        (Ok(current), Ok(next)) => current == next,
        _ => false,
    };

    if !same_origin {
        plan.headers.remove(KnownHeaderName::Authorization);
        plan.auth = None;
    }
}
