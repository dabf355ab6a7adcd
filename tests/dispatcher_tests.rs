#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use common::{dispatcher, Gate};
use serde_json::json;
use std::sync::Arc;
use switchyard::prelude::*;

fn setup() -> Dispatcher {
    dispatcher(&RuntimeConfig::default(), &Arc::new(Gate::default()))
}

#[test]
fn test_typed_path_parameter_is_bound() {
    let dispatcher = setup();
    let response = dispatcher.dispatch(&Request::new(Method::GET, "/widgets/42"));
    assert_eq!(response.status, 200);
    assert_eq!(response.get_header("content-type"), Some("application/json"));
    assert_eq!(response.json_body().unwrap(), json!({"id": 42, "name": "gear"}));
}

#[test]
fn test_non_numeric_segment_is_not_found() {
    let dispatcher = setup();
    let response = dispatcher.dispatch(&Request::new(Method::GET, "/widgets/abc"));
    assert_eq!(response.status, 404);
    assert_eq!(response.json_body().unwrap()["error"], "Not Found");
}

#[test]
fn test_out_of_range_segment_is_bad_request() {
    let dispatcher = setup();
    let response =
        dispatcher.dispatch(&Request::new(Method::GET, "/widgets/99999999999999999999"));
    assert_eq!(response.status, 400);
    let body = response.json_body().unwrap();
    assert_eq!(body["violations"][0]["location"], "id");
}

#[test]
fn test_unregistered_method_lists_allowed_methods() {
    let dispatcher = setup();
    let response = dispatcher.dispatch(&Request::new(Method::PUT, "/widgets/42"));
    assert_eq!(response.status, 405);
    assert_eq!(response.get_header("allow"), Some("GET"));
}

#[test]
fn test_query_string_is_ignored_by_matching() {
    let dispatcher = setup();
    let response = dispatcher.dispatch(&Request::new(Method::GET, "/widgets/42?verbose=1"));
    assert_eq!(response.status, 200);
}

#[test]
fn test_domain_failure_keeps_its_status() {
    let dispatcher = setup();
    let response = dispatcher.dispatch(&Request::new(Method::GET, "/widgets/7"));
    assert_eq!(response.status, 404);
    assert_eq!(response.json_body().unwrap()["message"], "widget 7 not found");
}

#[test]
fn test_body_is_parsed_and_validated() {
    let dispatcher = setup();

    let created = dispatcher.dispatch(
        &Request::new(Method::POST, "/widgets").with_json(&json!({"name": "sprocket"})),
    );
    assert_eq!(created.status, 200);
    let id = created.json_body().unwrap()["id"].as_i64().unwrap();

    let fetched = dispatcher.dispatch(&Request::new(Method::GET, format!("/widgets/{id}")));
    assert_eq!(fetched.json_body().unwrap()["name"], "sprocket");

    let invalid = dispatcher
        .dispatch(&Request::new(Method::POST, "/widgets").with_json(&json!({"name": 5})));
    assert_eq!(invalid.status, 400);
    let body = invalid.json_body().unwrap();
    assert_eq!(body["violations"][0]["location"], "widget");
    assert_eq!(body["violations"][0]["kind"], "schema");
}

#[test]
fn test_malformed_and_missing_bodies() {
    let dispatcher = setup();

    let malformed = dispatcher.dispatch(
        &Request::new(Method::POST, "/widgets")
            .with_header("content-type", "application/json")
            .with_body("{not json"),
    );
    assert_eq!(malformed.status, 400);

    let missing = dispatcher.dispatch(&Request::new(Method::POST, "/widgets"));
    assert_eq!(missing.status, 400);

    let xml = dispatcher.dispatch(
        &Request::new(Method::POST, "/widgets")
            .with_header("content-type", "application/xml")
            .with_body("<widget/>"),
    );
    assert_eq!(xml.status, 415);
}

#[test]
fn test_unacceptable_accept_header() {
    let dispatcher = setup();
    let response = dispatcher
        .dispatch(&Request::new(Method::GET, "/widgets/42").with_header("accept", "text/html"));
    assert_eq!(response.status, 406);

    let wildcard = dispatcher.dispatch(
        &Request::new(Method::GET, "/widgets/42").with_header("accept", "text/html, */*;q=0.1"),
    );
    assert_eq!(wildcard.status, 200);
}

#[test]
fn test_unexpected_errors_hide_their_cause() {
    let dispatcher = setup();
    let response = dispatcher.dispatch(&Request::new(Method::GET, "/faults/internal"));
    assert_eq!(response.status, 500);
    let body = response.json_body().unwrap();
    assert_eq!(body["message"], "Internal Server Error");
    assert!(!String::from_utf8_lossy(&response.body).contains("database"));
}

#[test]
fn test_panicking_handler_is_contained() {
    let dispatcher = setup();
    let response = dispatcher.dispatch(&Request::new(Method::GET, "/faults/panic"));
    assert_eq!(response.status, 500);

    let after = dispatcher.dispatch(&Request::new(Method::GET, "/widgets/42"));
    assert_eq!(after.status, 200);
}

#[test]
fn test_reply_contract_violation_is_server_error() {
    let dispatcher = setup();
    let response = dispatcher.dispatch(&Request::new(Method::GET, "/faults/contract"));
    assert_eq!(response.status, 500);
    assert!(response.json_body().unwrap()["violations"].is_array());
}

#[test]
fn test_redirect_reply() {
    let dispatcher = setup();
    let response = dispatcher.dispatch(&Request::new(Method::GET, "/faults/moved"));
    assert_eq!(response.status, 302);
    assert_eq!(response.get_header("location"), Some("/widgets/42"));
}

#[test]
fn test_identity_is_available_as_a_service() {
    let dispatcher = setup();
    let response = dispatcher
        .dispatch(&Request::new(Method::GET, "/faults/whoami").with_identity("alice"));
    assert_eq!(response.status, 200);
    assert_eq!(response.body, b"alice");

    // Anonymous callers have no identity to inject
    let anonymous = dispatcher.dispatch(&Request::new(Method::GET, "/faults/whoami"));
    assert_eq!(anonymous.status, 500);
}

#[test]
fn test_concurrent_dispatch() {
    let dispatcher = Arc::new(setup());
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let dispatcher = Arc::clone(&dispatcher);
            std::thread::spawn(move || {
                (0..50)
                    .map(|_| {
                        dispatcher
                            .dispatch(&Request::new(Method::GET, "/widgets/42"))
                            .status
                    })
                    .all(|status| status == 200)
            })
        })
        .collect();
    for handle in handles {
        assert!(handle.join().unwrap());
    }
}

#[test]
fn test_same_operation_name_validates_against_its_own_schema() {
    #[derive(Clone)]
    struct Apples;
    #[derive(Clone)]
    struct Pears;

    fn requiring(field: &str) -> serde_json::Value {
        json!({"type": "object", "required": [field]})
    }

    let router = Arc::new(Router::default());
    router.register(vec![
        ResourceDef::new("Apples").prefix("/apples").unit(Apples).operation(OperationDef::new(
            "post",
            "",
            vec![ParamType::Body(BodyType::new("apple").with_schema(requiring("x")))],
            |_: &Apples, _| Ok(Reply::Empty),
        )),
        ResourceDef::new("Pears").prefix("/pears").unit(Pears).operation(OperationDef::new(
            "post",
            "",
            vec![ParamType::Body(BodyType::new("pear").with_schema(requiring("y")))],
            |_: &Pears, _| Ok(Reply::Empty),
        )),
    ]);
    let dispatcher = Dispatcher::from_config(
        &RuntimeConfig::default(),
        router,
        Arc::new(SchemaValidator::new()),
        Arc::new(ServiceMap::new()),
    );

    let apple = dispatcher
        .dispatch(&Request::new(Method::POST, "/apples").with_json(&json!({"x": 1})));
    assert_eq!(apple.status, 204);
    let pear = dispatcher
        .dispatch(&Request::new(Method::POST, "/pears").with_json(&json!({"y": 1})));
    assert_eq!(pear.status, 204);
    let wrong = dispatcher
        .dispatch(&Request::new(Method::POST, "/pears").with_json(&json!({"x": 1})));
    assert_eq!(wrong.status, 400);
}
