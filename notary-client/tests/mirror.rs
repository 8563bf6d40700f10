// Copyright 2019 The Notary Project Authors. All Rights Reserved.
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wire-level tests for the HTTP mirror store: URL shapes, the status-to-error table, and the
//! multipart publish.

use httptest::{matchers::*, responders::*, Expectation, Server};
use maplit::hashmap;
use notary_client::error::Error;
use notary_client::schema::RoleName;
use notary_client::storage::{ClientSettings, HttpMirrorStore, MetadataStore};

fn quick_settings() -> ClientSettings {
    ClientSettings {
        tries: 1,
        ..ClientSettings::default()
    }
}

fn store(server: &Server) -> HttpMirrorStore {
    HttpMirrorStore::new(&server.url_str("/"), "example/repo", quick_settings()).unwrap()
}

#[test]
fn get_fetches_role_metadata() {
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path(
            "GET",
            "/v2/example/repo/_trust/tuf/timestamp.json",
        ))
        .respond_with(status_code(200).body("{\"signed\":{}}")),
    );
    let data = store(&server).get_sized("timestamp", -1).unwrap();
    assert_eq!(data, b"{\"signed\":{}}");
}

#[test]
fn oversized_responses_are_rejected() {
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path(
            "GET",
            "/v2/example/repo/_trust/tuf/timestamp.json",
        ))
        .respond_with(status_code(200).body(vec![b'x'; 64])),
    );
    assert!(matches!(
        store(&server).get_sized("timestamp", 63),
        Err(Error::MaxSizeExceeded { .. })
    ));
}

#[test]
fn status_401_maps_to_not_authorized() {
    let server = Server::run();
    server.expect(
        Expectation::matching(any()).respond_with(status_code(401)),
    );
    let err = store(&server).get_sized("root", -1).unwrap_err();
    match err {
        Error::ServerUnavailable { code } => {
            assert_eq!(code, 401);
            assert_eq!(err.to_string(), "not authorized");
        }
        other => panic!("expected ServerUnavailable, got {:?}", other),
    }
}

#[test]
fn status_404_maps_to_meta_not_found() {
    let server = Server::run();
    server.expect(
        Expectation::matching(any()).respond_with(status_code(404)),
    );
    assert!(matches!(
        store(&server).get_sized("targets", -1),
        Err(Error::MetaNotFound { .. })
    ));
}

#[test]
fn status_400_parses_the_error_body() {
    let server = Server::run();
    server.expect(
        Expectation::matching(any()).respond_with(
            status_code(400)
                .append_header("Content-Type", "application/json")
                .body(r#"{"errors":[{"code":"METADATA_NOT_FOUND","message":"no such thing"}]}"#),
        ),
    );
    assert!(matches!(
        store(&server).get_sized("snapshot", -1),
        Err(Error::MetaNotFound { .. })
    ));
}

#[test]
fn other_4xx_maps_to_invalid_operation() {
    let server = Server::run();
    server.expect(
        Expectation::matching(any()).respond_with(status_code(418)),
    );
    assert!(matches!(
        store(&server).get_sized("root", -1),
        Err(Error::InvalidOperation { .. })
    ));
}

#[test]
fn status_5xx_maps_to_server_unavailable() {
    let server = Server::run();
    server.expect(
        Expectation::matching(any()).times(1..).respond_with(status_code(503)),
    );
    let err = store(&server).get_sized("root", -1).unwrap_err();
    match err {
        Error::ServerUnavailable { code } => {
            assert_eq!(code, 503);
            assert_eq!(err.to_string(), "unable to reach trust server (503)");
        }
        other => panic!("expected ServerUnavailable, got {:?}", other),
    }
}

#[test]
fn set_multi_posts_one_multipart_request() {
    let server = Server::run();
    server.expect(
        Expectation::matching(all_of![
            request::method_path("POST", "/v2/example/repo/_trust/tuf/"),
            request::headers(contains(key("content-type"))),
        ])
        .respond_with(status_code(200)),
    );
    let metas = hashmap! {
        "targets".to_owned() => b"targets bytes".to_vec(),
        "snapshot".to_owned() => b"snapshot bytes".to_vec(),
    };
    store(&server).set_multi(&metas).unwrap();
}

#[test]
fn remove_all_issues_a_delete() {
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path(
            "DELETE",
            "/v2/example/repo/_trust/tuf/",
        ))
        .respond_with(status_code(200)),
    );
    store(&server).remove_all().unwrap();
}

#[test]
fn rotate_key_posts_and_parses_the_public_key() {
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path(
            "POST",
            "/v2/example/repo/_trust/tuf/key/timestamp",
        ))
        .respond_with(
            status_code(200)
                .append_header("Content-Type", "application/json")
                .body(format!(
                    r#"{{"keytype":"ed25519","keyval":{{"public":"{}","private":null}}}}"#,
                    base64::encode([7u8; 32])
                )),
        ),
    );
    let key = store(&server).rotate_key(&RoleName::Timestamp).unwrap();
    assert_eq!(key.public(), &[7u8; 32][..]);
}
