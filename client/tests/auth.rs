use courier_client::{
    testing::{ScriptedResponse, ServerConnector},
    Auth, Client, RequestOptions,
};
use futures_lite::future::block_on;
use md5::{Digest, Md5};

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn md5_hex(input: &str) -> String {
    Md5::digest(input.as_bytes())
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect()
}

fn header_param(header: &str, prefix: &str) -> String {
    let start = header.find(prefix).unwrap() + prefix.len();
    header[start..].chars().take_while(|c| *c != '"').collect()
}

#[test]
fn basic_auth_is_sent_up_front() {
    init();
    block_on(async {
        let connector = ServerConnector::new([ScriptedResponse::ok("")]);
        let client = Client::new(connector.clone()).with_auth(Auth::basic("user", "pass"));

        client.get("http://h/", RequestOptions::new()).await.unwrap();
        assert!(connector
            .request(0)
            .contains("Authorization: Basic dXNlcjpwYXNz\r\n"));
    });
}

#[test]
fn request_auth_overrides_session_auth() {
    init();
    block_on(async {
        let connector = ServerConnector::new([ScriptedResponse::ok("")]);
        let client = Client::new(connector.clone()).with_auth(Auth::basic("user", "pass"));

        client
            .get(
                "http://h/",
                RequestOptions::new().with_auth(Auth::bearer("tok")),
            )
            .await
            .unwrap();
        assert!(connector.request(0).contains("Authorization: Bearer tok\r\n"));
    });
}

#[test]
fn digest_retries_once_and_collapses_history() {
    init();
    block_on(async {
        let connector = ServerConnector::new([
            ScriptedResponse::new(
                "HTTP/1.1 401 Unauthorized\r\n\
                 WWW-Authenticate: Digest realm=\"r\", nonce=\"n\", qop=\"auth\"\r\n\
                 Content-Length: 0\r\n\r\n",
            ),
            ScriptedResponse::ok("secret data"),
        ]);
        let client = Client::new(connector.clone()).with_auth(Auth::digest("u", "p"));

        let response = client.get("http://h/a", RequestOptions::new()).await.unwrap();

        // the retry is invisible: one 200 response, no history
        assert_eq!(response.status(), 200u16);
        assert_eq!(response.text(), "secret data");
        assert!(response.history().is_empty());

        // first request went out with no authorization at all
        assert!(!connector.request(0).contains("Authorization:"));

        let second = connector.request(1);
        let auth_line = second
            .lines()
            .find(|line| line.starts_with("Authorization: "))
            .unwrap()
            .to_string();

        assert!(auth_line.contains("Digest username=\"u\""));
        assert!(auth_line.contains("realm=\"r\""));
        assert!(auth_line.contains("nonce=\"n\""));
        assert!(auth_line.contains("uri=\"/a\""));
        assert!(auth_line.contains("qop=auth"));
        assert!(auth_line.contains("nc=00000001"));

        let cnonce = header_param(&auth_line, "cnonce=\"");
        assert_eq!(cnonce.len(), 16);

        let ha1 = md5_hex("u:r:p");
        let ha2 = md5_hex("GET:/a");
        let expected = md5_hex(&format!("{ha1}:n:00000001:{cnonce}:auth:{ha2}"));
        assert_eq!(header_param(&auth_line, "response=\""), expected);

        // both hops rode one connection
        assert_eq!(connector.dials(), 1);
    });
}

#[test]
fn a_second_401_surfaces_to_the_caller() {
    init();
    block_on(async {
        let challenge = "HTTP/1.1 401 Unauthorized\r\n\
                         WWW-Authenticate: Digest realm=\"r\", nonce=\"n\"\r\n\
                         Content-Length: 0\r\n\r\n";
        let connector = ServerConnector::new([
            ScriptedResponse::new(challenge),
            ScriptedResponse::new(challenge),
        ]);
        let client = Client::new(connector.clone()).with_auth(Auth::digest("u", "p"));

        let response = client.get("http://h/a", RequestOptions::new()).await.unwrap();
        assert_eq!(response.status(), 401u16);
        assert_eq!(connector.requests().len(), 2);
    });
}

#[test]
fn basic_auth_does_not_retry_on_401() {
    init();
    block_on(async {
        let connector = ServerConnector::new([ScriptedResponse::new(
            "HTTP/1.1 401 Unauthorized\r\n\
             WWW-Authenticate: Basic realm=\"r\"\r\n\
             Content-Length: 0\r\n\r\n",
        )]);
        let client = Client::new(connector.clone()).with_auth(Auth::basic("u", "p"));

        let response = client.get("http://h/", RequestOptions::new()).await.unwrap();
        assert_eq!(response.status(), 401u16);
        assert_eq!(connector.requests().len(), 1);
    });
}

#[test]
fn authorization_is_scrubbed_on_cross_origin_redirects() {
    init();
    block_on(async {
        let connector = ServerConnector::new([
            ScriptedResponse::new(
                "HTTP/1.1 302 Found\r\n\
                 Location: http://other/landing\r\n\
                 Content-Length: 0\r\n\r\n",
            ),
            ScriptedResponse::ok("done"),
        ]);
        let client = Client::new(connector.clone()).with_auth(Auth::basic("u", "p"));

        client.get("http://h/start", RequestOptions::new()).await.unwrap();

        assert!(connector.request(0).contains("Authorization: "));
        assert!(!connector.request(1).contains("Authorization: "));
    });
}

#[test]
fn same_origin_redirects_keep_authorization() {
    init();
    block_on(async {
        let connector = ServerConnector::new([
            ScriptedResponse::new(
                "HTTP/1.1 302 Found\r\nLocation: /landing\r\nContent-Length: 0\r\n\r\n",
            ),
            ScriptedResponse::ok("done"),
        ]);
        let client = Client::new(connector.clone()).with_auth(Auth::basic("u", "p"));

        client.get("http://h/start", RequestOptions::new()).await.unwrap();
        assert!(connector.request(1).contains("Authorization: "));
    });
}

#[test]
fn cross_origin_auth_can_be_opted_into() {
    init();
    block_on(async {
        let connector = ServerConnector::new([
            ScriptedResponse::new(
                "HTTP/1.1 302 Found\r\n\
                 Location: http://other/landing\r\n\
                 Content-Length: 0\r\n\r\n",
            ),
            ScriptedResponse::ok("done"),
        ]);
        let client = Client::new(connector.clone())
            .with_auth(Auth::basic("u", "p"))
            .with_cross_origin_auth(true);

        client.get("http://h/start", RequestOptions::new()).await.unwrap();
        assert!(connector.request(1).contains("Authorization: "));
    });
}

#[test]
fn explicit_authorization_headers_are_scrubbed_too() {
    init();
    block_on(async {
        let connector = ServerConnector::new([
            ScriptedResponse::new(
                "HTTP/1.1 302 Found\r\n\
                 Location: http://other/landing\r\n\
                 Content-Length: 0\r\n\r\n",
            ),
            ScriptedResponse::ok("done"),
        ]);
        let client = Client::new(connector.clone());

        client
            .get(
                "http://h/start",
                RequestOptions::new().with_header("authorization", "Bearer tok"),
            )
            .await
            .unwrap();

        assert!(connector.request(0).contains("Authorization: Bearer tok\r\n"));
        assert!(!connector.request(1).contains("Authorization:"));
    });
}
