use courier_client::{
    testing::{ScriptedResponse, ServerConnector},
    Client, Error, RequestOptions,
};
use futures_lite::{future::block_on, StreamExt};
use std::time::Duration;

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn streamed_bodies_equal_buffered_bodies() {
    init();
    block_on(async {
        let wire = "HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n\
                    5\r\nhello\r\n6\r\n world\r\n0\r\n\r\n";
        let connector = ServerConnector::new([
            ScriptedResponse::new(wire),
            ScriptedResponse::new(wire),
        ]);
        let client = Client::new(connector);

        let buffered = client.get("http://h/", RequestOptions::new()).await.unwrap();

        let streamed = client
            .get_streamed("http://h/", RequestOptions::new())
            .await
            .unwrap();
        assert_eq!(streamed.status(), 200u16);
        let body = streamed.into_body().read_bytes().await.unwrap();

        assert_eq!(body, buffered.body());
        assert_eq!(body, b"hello world");
    });
}

#[test]
fn streamed_bodies_yield_chunks() {
    init();
    block_on(async {
        let connector = ServerConnector::new([ScriptedResponse::ok("chunky")]);
        let client = Client::new(connector);

        let streamed = client
            .get_streamed("http://h/", RequestOptions::new())
            .await
            .unwrap();

        let mut body = streamed.into_body();
        let mut collected = Vec::new();
        while let Some(chunk) = body.next().await {
            collected.extend_from_slice(&chunk.unwrap());
        }
        assert_eq!(collected, b"chunky");
    });
}

#[test]
fn draining_a_streamed_body_returns_the_connection() {
    init();
    block_on(async {
        let connector = ServerConnector::new([
            ScriptedResponse::ok("stream me"),
            ScriptedResponse::ok("after"),
        ]);
        let client = Client::new(connector.clone());

        let streamed = client
            .get_streamed("http://h/1", RequestOptions::new())
            .await
            .unwrap();
        streamed.into_body().drain().await.unwrap();

        let response = client.get("http://h/2", RequestOptions::new()).await.unwrap();
        assert_eq!(response.text(), "after");
        assert_eq!(connector.dials(), 1);
    });
}

#[test]
fn dropping_a_streamed_body_closes_the_connection() {
    init();
    block_on(async {
        let connector = ServerConnector::new([
            ScriptedResponse::ok("abandoned"),
            ScriptedResponse::ok("after"),
        ]);
        let client = Client::new(connector.clone());

        let streamed = client
            .get_streamed("http://h/1", RequestOptions::new())
            .await
            .unwrap();
        drop(streamed);

        // the undrained connection cannot be reused
        let response = client.get("http://h/2", RequestOptions::new()).await.unwrap();
        assert_eq!(response.text(), "after");
        assert_eq!(connector.dials(), 2);
    });
}

#[test]
fn timeouts_surface_and_poison_the_connection() {
    init();
    block_on(async {
        let connector = ServerConnector::new([
            ScriptedResponse::ok("slow").delayed(Duration::from_secs(2)),
            ScriptedResponse::ok("fresh"),
        ]);
        let client = Client::new(connector.clone());

        let error = client
            .get(
                "http://h/slow",
                RequestOptions::new().with_timeout(Duration::from_millis(40)),
            )
            .await
            .unwrap_err();
        assert!(matches!(error, Error::TimedOut));

        // the timed-out connection was dropped, not pooled
        let response = client.get("http://h/next", RequestOptions::new()).await.unwrap();
        assert_eq!(response.text(), "fresh");
        assert_eq!(connector.dials(), 2);
    });
}

#[test]
fn streamed_drains_respect_the_request_deadline() {
    init();
    block_on(async {
        // the head arrives promptly but the body bytes never do: the
        // response claims more content than the script provides
        let connector = ServerConnector::new([ScriptedResponse::new(
            "HTTP/1.1 200 OK\r\nContent-Length: 1000\r\n\r\npartial",
        )]);
        let client = Client::new(connector);

        let streamed = client
            .get_streamed(
                "http://h/",
                RequestOptions::new().with_timeout(Duration::from_millis(60)),
            )
            .await
            .unwrap();

        let error = streamed.into_body().read_bytes().await.unwrap_err();
        assert!(matches!(error, Error::TimedOut));
    });
}
