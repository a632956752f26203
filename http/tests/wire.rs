use courier_http::{
    Body, Buffer, Error, Headers, KnownHeaderName, Method, ReceivedBody, ReceivedBodyState,
    Status,
};
use futures_lite::{future::block_on, io::Cursor, AsyncReadExt};

#[test]
fn request_bodies_serialize_for_the_wire() {
    block_on(async {
        // fixed bodies advertise a length and pass through verbatim
        let mut body = Body::from("k=v");
        assert_eq!(body.len(), Some(3));
        let mut wire = Vec::new();
        body.read_to_end(&mut wire).await.unwrap();
        assert_eq!(wire, b"k=v");

        // unknown-length bodies come out chunked, terminal chunk included
        let mut body = Body::new_streaming(Cursor::new("payload"), None);
        assert_eq!(body.len(), None);
        let mut wire = Vec::new();
        body.read_to_end(&mut wire).await.unwrap();
        assert_eq!(wire, b"7\r\npayload\r\n0\r\n\r\n");
    });
}

#[test]
fn received_bodies_split_head_overread_from_content() {
    block_on(async {
        // bytes past the head land in the buffer and are served before
        // the transport is read again
        let mut buffer = Buffer::default();
        buffer.extend_from_slice(b"hel");

        let body = ReceivedBody::new(
            Some(11),
            buffer,
            Cursor::new("lo, world"),
            ReceivedBodyState::Start,
            None,
            encoding_for(""),
            None,
        );

        assert_eq!(body.read_string().await.unwrap(), "hello, world");
    });
}

#[test]
fn truncated_fixed_length_bodies_error() {
    block_on(async {
        let body = ReceivedBody::new(
            Some(50),
            Buffer::default(),
            Cursor::new("short"),
            ReceivedBodyState::Start,
            None,
            encoding_for(""),
            None,
        );

        assert!(body.read_bytes().await.is_err());
    });
}

#[test]
fn charset_flows_from_content_type_to_text() {
    block_on(async {
        let body = ReceivedBody::new(
            Some(4),
            Buffer::default(),
            // "caf\xe9" is "café" in latin-1
            Cursor::new(&b"caf\xe9"[..]),
            ReceivedBodyState::Start,
            None,
            encoding_for("text/plain; charset=iso-8859-1"),
            None,
        );

        assert_eq!(body.read_string().await.unwrap(), "caf\u{e9}");
    });
}

#[test]
fn statuses_and_methods_classify() {
    assert!(Status::try_from(307).unwrap().is_redirect());
    assert!(!Status::try_from(300).unwrap().is_redirect());
    assert!(Status::try_from(404).unwrap().is_error());
    assert!(Method::Get.is_safe());
    assert!(!Method::Patch.is_safe());
    assert!(matches!(Status::try_from(1000), Err(Error::InvalidResponse)));
}

fn encoding_for(content_type: &str) -> &'static encoding_rs::Encoding {
    let mut headers = Headers::new();
    if !content_type.is_empty() {
        headers.insert(KnownHeaderName::ContentType, content_type);
    }
    courier_http::content_encoding(&headers)
}
