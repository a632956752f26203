use courier_client::{
    testing::{ScriptedResponse, ServerConnector},
    Client, Error, Method, RequestOptions,
};
use futures_lite::future::block_on;

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn get_round_trip() {
    init();
    block_on(async {
        let connector = ServerConnector::new([ScriptedResponse::ok("hello")]);
        let client = Client::new(connector.clone());

        let response = client
            .get("http://h/greeting", RequestOptions::new())
            .await
            .unwrap();

        assert_eq!(response.status(), 200u16);
        assert_eq!(response.reason(), "OK");
        assert_eq!(response.text(), "hello");
        assert_eq!(response.url().as_str(), "http://h/greeting");
        assert!(response.history().is_empty());

        let request = connector.request(0);
        assert!(request.starts_with("GET /greeting HTTP/1.1\r\n"));
        assert!(request.contains("Host: h\r\n"));
        assert!(request.contains("User-Agent: courier/"));
    });
}

#[test]
fn form_data_sets_content_type_and_body() {
    init();
    block_on(async {
        let connector = ServerConnector::new([ScriptedResponse::ok("")]);
        let client = Client::new(connector.clone());

        client
            .post("http://h/f", RequestOptions::new().with_data("k=v"))
            .await
            .unwrap();

        let request = connector.request(0);
        assert!(request.starts_with("POST /f HTTP/1.1\r\n"));
        assert!(request.contains("Content-Type: application/x-www-form-urlencoded\r\n"));
        assert!(request.contains("Content-Length: 3\r\n"));
        assert!(request.ends_with("\r\n\r\nk=v"));
    });
}

#[test]
fn json_sets_content_type_unless_explicit() {
    init();
    block_on(async {
        let connector = ServerConnector::new([ScriptedResponse::ok(""), ScriptedResponse::ok("")]);
        let client = Client::new(connector.clone());

        client
            .post("http://h/a", RequestOptions::new().with_json("{}"))
            .await
            .unwrap();
        assert!(connector
            .request(0)
            .contains("Content-Type: application/json\r\n"));

        client
            .post(
                "http://h/a",
                RequestOptions::new()
                    .with_json("{}")
                    .with_header("content-type", "application/json+feed"),
            )
            .await
            .unwrap();
        assert!(connector
            .request(1)
            .contains("Content-Type: application/json+feed\r\n"));
    });
}

#[test]
fn request_headers_override_session_defaults() {
    init();
    block_on(async {
        let connector = ServerConnector::new([ScriptedResponse::ok("")]);
        let client = Client::new(connector.clone()).with_default_header("x-tier", "default");

        client
            .get(
                "http://h/",
                RequestOptions::new().with_header("x-tier", "override"),
            )
            .await
            .unwrap();

        let request = connector.request(0);
        assert!(request.contains("x-tier: override\r\n"));
        assert!(!request.contains("x-tier: default\r\n"));
    });
}

#[test]
fn head_response_body_is_discarded() {
    init();
    block_on(async {
        // a head response advertising a body it will not send
        let connector = ServerConnector::new([
            ScriptedResponse::new("HTTP/1.1 200 OK\r\nContent-Length: 11\r\n\r\n"),
            ScriptedResponse::ok("after"),
        ]);
        let client = Client::new(connector.clone());

        let response = client
            .head("http://h/resource", RequestOptions::new())
            .await
            .unwrap();
        assert!(response.body().is_empty());

        // the connection stays usable for the next exchange
        let response = client.get("http://h/next", RequestOptions::new()).await.unwrap();
        assert_eq!(response.text(), "after");
        assert_eq!(connector.dials(), 1);
    });
}

#[test]
fn chunked_response_bodies_decode() {
    init();
    block_on(async {
        let connector = ServerConnector::new([ScriptedResponse::new(
            "HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n\
             5\r\nhello\r\n6\r\n world\r\n0\r\n\r\n",
        )]);
        let client = Client::new(connector);

        let response = client.get("http://h/", RequestOptions::new()).await.unwrap();
        assert_eq!(response.text(), "hello world");
    });
}

#[test]
fn content_length_alongside_chunked_is_rejected() {
    init();
    block_on(async {
        let connector = ServerConnector::new([ScriptedResponse::new(
            "HTTP/1.1 200 OK\r\nContent-Length: 5\r\nTransfer-Encoding: chunked\r\n\r\n",
        )]);
        let client = Client::new(connector);

        let error = client
            .get("http://h/", RequestOptions::new())
            .await
            .unwrap_err();
        assert!(matches!(error, Error::UnexpectedHeader(_)));
    });
}

#[test]
fn error_statuses_are_responses_until_raised() {
    init();
    block_on(async {
        let connector = ServerConnector::new([ScriptedResponse::new(
            "HTTP/1.1 404 Not Found\r\nContent-Length: 7\r\n\r\nmissing",
        )]);
        let client = Client::new(connector);

        let response = client
            .get("http://h/gone", RequestOptions::new())
            .await
            .unwrap();

        // protocol data survives the error status
        assert_eq!(response.status(), 404u16);
        assert_eq!(response.text(), "missing");

        let error = response.error_for_status().unwrap_err();
        assert_eq!(error.status(), 404u16);
        assert_eq!(error.reason(), "Not Found");
        assert_eq!(error.url().as_str(), "http://h/gone");
        assert_eq!(error.to_string(), "404 Not Found: http://h/gone");
    });
}

#[test]
fn buffered_body_limit() {
    init();
    block_on(async {
        let connector = ServerConnector::new([ScriptedResponse::ok("0123456789")]);
        let client = Client::new(connector).with_max_body_length(4);

        let error = client
            .get("http://h/", RequestOptions::new())
            .await
            .unwrap_err();
        assert!(matches!(error, Error::BodyTooLarge(4)));
    });
}

#[test]
fn invalid_urls_are_rejected() {
    init();
    block_on(async {
        let client = Client::new(ServerConnector::new([]));

        assert!(matches!(
            client.get("not a url", RequestOptions::new()).await,
            Err(Error::InvalidUrl)
        ));
        assert!(matches!(
            client.get("ftp://h/file", RequestOptions::new()).await,
            Err(Error::InvalidScheme)
        ));
    });
}

#[test]
fn closed_sessions_refuse_requests() {
    init();
    block_on(async {
        let connector = ServerConnector::new([ScriptedResponse::ok("ok")]);
        let client = Client::new(connector);

        client.get("http://h/", RequestOptions::new()).await.unwrap();
        client.close();

        assert!(matches!(
            client.get("http://h/", RequestOptions::new()).await,
            Err(Error::Closed)
        ));
        assert!(matches!(
            client
                .request(Method::Post, "http://h/", RequestOptions::new())
                .await,
            Err(Error::Closed)
        ));
    });
}
