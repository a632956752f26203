use courier_client::{
    testing::{ScriptedResponse, ServerConnector},
    Client, Cookie, RequestOptions,
};
use futures_lite::future::block_on;

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn seeded_jar_cookies_are_sent() {
    init();
    block_on(async {
        let connector = ServerConnector::new([ScriptedResponse::ok("ok")]);
        let client = Client::new(connector.clone());

        client
            .cookie_jar()
            .write()
            .await
            .set(Cookie::new("s", "1", "h", "/"));

        client.get("http://h/a", RequestOptions::new()).await.unwrap();
        assert!(connector.request(0).contains("Cookie: s=1\r\n"));
    });
}

#[test]
fn set_cookie_responses_update_the_jar() {
    init();
    block_on(async {
        let connector = ServerConnector::new([
            ScriptedResponse::new(
                "HTTP/1.1 200 OK\r\n\
                 Set-Cookie: sid=abc; Path=/\r\n\
                 Set-Cookie: theme=dark; Path=/settings\r\n\
                 Content-Length: 0\r\n\r\n",
            ),
            ScriptedResponse::ok(""),
            ScriptedResponse::ok(""),
        ]);
        let client = Client::new(connector.clone());

        client.get("http://h/", RequestOptions::new()).await.unwrap();
        assert_eq!(client.cookie_jar().read().await.len(), 2);

        // longest path first on a matching request
        client
            .get("http://h/settings/profile", RequestOptions::new())
            .await
            .unwrap();
        assert!(connector.request(1).contains("Cookie: theme=dark; sid=abc\r\n"));

        // non-matching path only sees the root cookie
        client.get("http://h/other", RequestOptions::new()).await.unwrap();
        assert!(connector.request(2).contains("Cookie: sid=abc\r\n"));
    });
}

#[test]
fn cookies_set_during_redirects_reach_the_next_hop() {
    init();
    block_on(async {
        let connector = ServerConnector::new([
            ScriptedResponse::new(
                "HTTP/1.1 302 Found\r\n\
                 Location: /landing\r\n\
                 Set-Cookie: hop=1\r\n\
                 Content-Length: 0\r\n\r\n",
            ),
            ScriptedResponse::ok("done"),
        ]);
        let client = Client::new(connector.clone());

        client.get("http://h/start", RequestOptions::new()).await.unwrap();
        assert!(connector.request(1).contains("Cookie: hop=1\r\n"));
    });
}

#[test]
fn explicit_cookie_header_suppresses_the_jar() {
    init();
    block_on(async {
        let connector = ServerConnector::new([ScriptedResponse::ok("")]);
        let client = Client::new(connector.clone());

        client
            .cookie_jar()
            .write()
            .await
            .set(Cookie::new("jar", "1", "h", "/"));

        client
            .get(
                "http://h/",
                RequestOptions::new().with_header("cookie", "mine=2"),
            )
            .await
            .unwrap();

        let request = connector.request(0);
        assert!(request.contains("Cookie: mine=2\r\n"));
        assert!(!request.contains("jar=1"));
    });
}

#[test]
fn expired_cookies_are_not_sent() {
    init();
    block_on(async {
        let connector = ServerConnector::new([
            ScriptedResponse::new(
                "HTTP/1.1 200 OK\r\n\
                 Set-Cookie: gone=1; Max-Age=0\r\n\
                 Set-Cookie: kept=2\r\n\
                 Content-Length: 0\r\n\r\n",
            ),
            ScriptedResponse::ok(""),
        ]);
        let client = Client::new(connector.clone());

        client.get("http://h/", RequestOptions::new()).await.unwrap();
        client.get("http://h/", RequestOptions::new()).await.unwrap();

        let request = connector.request(1);
        assert!(request.contains("Cookie: kept=2\r\n"));
        assert!(!request.contains("gone=1"));
    });
}

#[test]
fn secure_cookies_stay_off_plaintext_requests() {
    init();
    block_on(async {
        let connector = ServerConnector::new([ScriptedResponse::ok("")]);
        let client = Client::new(connector.clone());

        client
            .cookie_jar()
            .write()
            .await
            .set(Cookie::new("token", "s3cret", "h", "/").with_secure(true));

        client.get("http://h/", RequestOptions::new()).await.unwrap();
        assert!(!connector.request(0).contains("token"));
    });
}
