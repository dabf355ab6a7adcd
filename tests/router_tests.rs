#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use switchyard::content::JsonContent;
use switchyard::error::RegistrationError;
use switchyard::prelude::*;
use switchyard::{RegistrationOutcome, RouteMatch};

#[derive(Clone)]
struct Catalog;

fn catalog() -> ResourceDef {
    ResourceDef::new("Catalog")
        .prefix("/catalog")
        .unit(Catalog)
        .operation(OperationDef::new("get_items", "/items", vec![], |_: &Catalog, _| {
            Ok(Reply::Json(json!([])))
        }))
        .operation(OperationDef::new(
            "get_item",
            "/items/{id}",
            vec![ParamType::Int(IntWidth::U32)],
            |_: &Catalog, args| Ok(Reply::Json(json!({"id": args.uint(0)?}))),
        ))
        .operation(OperationDef::new(
            "delete_item",
            "/items/{id}",
            vec![ParamType::Int(IntWidth::U32)],
            |_: &Catalog, _| Ok(Reply::Empty),
        ))
        .operation(OperationDef::new(
            "get_by_slug",
            "/items/{slug}/{active}",
            vec![ParamType::Text, ParamType::Bool],
            |_: &Catalog, args| {
                Ok(Reply::Json(json!({"slug": args.text(0)?, "active": args.boolean(1)?})))
            },
        ))
        .operation(OperationDef::new("helper", "/helper", vec![], |_: &Catalog, _| {
            Ok(Reply::Empty)
        }))
}

fn match_get(router: &Router, path: &str) -> RouteMatch {
    router.match_request(
        &Request::new(Method::GET, path),
        &ServiceMap::new(),
        &JsonContent,
    )
}

#[test]
fn test_registration_outcomes() {
    let router = Router::default();
    let outcomes = router.register(vec![catalog()]);

    // The helper operation answers no HTTP verb and is not routed
    assert_eq!(outcomes.len(), 4);
    assert!(outcomes.iter().all(RegistrationOutcome::is_added));
    assert_eq!(router.routes().len(), 4);
}

#[test]
fn test_registering_twice_reports_duplicates() {
    let router = Router::default();
    router.register(vec![catalog()]);
    let outcomes = router.register(vec![catalog()]);

    assert_eq!(outcomes.len(), 4);
    for outcome in outcomes {
        match outcome {
            RegistrationOutcome::DuplicateIgnored {
                operation,
                original,
                ..
            } => assert_eq!(operation, original),
            other => panic!("expected a duplicate, got {other:?}"),
        }
    }
    assert_eq!(router.routes().len(), 4);
}

#[test]
fn test_same_shape_under_another_name_is_a_duplicate() {
    #[derive(Clone)]
    struct Shadow;

    let router = Router::default();
    router.register(vec![catalog()]);
    let outcomes = router.register(vec![ResourceDef::new("Shadow").unit(Shadow).operation(
        OperationDef::new(
            "get_thing",
            "/catalog/items/{key}",
            vec![ParamType::Int(IntWidth::U32)],
            |_: &Shadow, _| Ok(Reply::Empty),
        ),
    )]);

    match &outcomes[0] {
        RegistrationOutcome::DuplicateIgnored {
            operation,
            original,
            ..
        } => {
            assert_eq!(operation, "Shadow::get_thing");
            assert_eq!(original, "Catalog::get_item");
        }
        other => panic!("expected a duplicate, got {other:?}"),
    }
}

#[test]
fn test_bad_candidates_do_not_abort_the_batch() {
    #[derive(Clone)]
    struct Broken;

    let no_constructor = ResourceDef::new("Orphan").operation(OperationDef::new(
        "get_orphan",
        "/orphan",
        vec![],
        |_: &Broken, _| Ok(Reply::Empty),
    ));
    let two_constructors = ResourceDef::new("Twins")
        .unit(Broken)
        .unit(Broken)
        .operation(OperationDef::new("get_twins", "/twins", vec![], |_: &Broken, _| {
            Ok(Reply::Empty)
        }));
    let bad_template = ResourceDef::new("Typo").unit(Broken).operation(OperationDef::new(
        "get_typo",
        "/typo/{id",
        vec![ParamType::Text],
        |_: &Broken, _| Ok(Reply::Empty),
    ));
    let hidden = ResourceDef::new("Hidden").unit(Broken).non_routable().operation(
        OperationDef::new("get_hidden", "/hidden", vec![], |_: &Broken, _| Ok(Reply::Empty)),
    );

    let router = Router::default();
    let outcomes = router.register(vec![no_constructor, two_constructors, bad_template, hidden, catalog()]);

    assert!(matches!(
        outcomes[0],
        RegistrationOutcome::Error(RegistrationError::ConstructorCount { found: 0, .. })
    ));
    assert!(matches!(
        outcomes[1],
        RegistrationOutcome::Error(RegistrationError::ConstructorCount { found: 2, .. })
    ));
    assert!(matches!(
        outcomes[2],
        RegistrationOutcome::Error(RegistrationError::Compile { .. })
    ));
    assert_eq!(outcomes.iter().filter(|o| o.is_added()).count(), 4);
    assert!(!match_get(&router, "/hidden").is_found());
    assert!(match_get(&router, "/catalog/items").is_found());
}

#[test]
fn test_matching_rules() {
    let router = Router::default();
    router.register(vec![catalog()]);

    match match_get(&router, "/catalog/items/7") {
        RouteMatch::Found(matched) => {
            assert_eq!(matched.entry.id(), "Catalog::get_item");
            assert_eq!(matched.get_path_param("id"), Some("7"));
            assert!(matched.failure.is_none());
        }
        other => panic!("expected a match, got {other:?}"),
    }

    // Non-numeric ids fall through to the text/bool route only when shaped like it
    assert!(matches!(match_get(&router, "/catalog/items/x"), RouteMatch::NotFound));
    match match_get(&router, "/catalog/items/x/true") {
        RouteMatch::Found(matched) => assert_eq!(matched.entry.id(), "Catalog::get_by_slug"),
        other => panic!("expected a match, got {other:?}"),
    }
    assert!(matches!(
        match_get(&router, "/catalog/items/x/yes"),
        RouteMatch::NotFound
    ));
    assert!(matches!(match_get(&router, "/nowhere"), RouteMatch::NotFound));
}

#[test]
fn test_method_not_allowed_collects_methods() {
    let router = Router::default();
    router.register(vec![catalog()]);

    let matched = router.match_request(
        &Request::new(Method::PATCH, "/catalog/items/7"),
        &ServiceMap::new(),
        &JsonContent,
    );
    match matched {
        RouteMatch::MethodNotAllowed { allowed } => {
            assert!(allowed.contains(&Method::GET));
            assert!(allowed.contains(&Method::DELETE));
            assert_eq!(allowed.len(), 2);
        }
        other => panic!("expected 405, got {other:?}"),
    }
}

#[test]
fn test_reverse_lookup_round_trips() {
    let router = Router::default();
    router.register(vec![catalog()]);

    let path = router
        .find_path_to("Catalog", "get_by_slug", &[ArgValue::text("blue shoes"), ArgValue::Bool(false)])
        .unwrap();
    assert_eq!(path, "/catalog/items/blue%20shoes/false");

    match match_get(&router, &path) {
        RouteMatch::Found(matched) => {
            assert_eq!(matched.entry.id(), "Catalog::get_by_slug");
            assert_eq!(matched.operation_args.text(0).unwrap(), "blue shoes");
            assert!(!matched.operation_args.boolean(1).unwrap());
        }
        other => panic!("expected a match, got {other:?}"),
    }

    // Wrong arity or type finds nothing
    assert!(router.find_path_to("Catalog", "get_item", &[]).is_none());
    assert!(router
        .find_path_to("Catalog", "get_item", &[ArgValue::text("seven")])
        .is_none());
    assert!(router.find_path_to("Catalog", "missing", &[]).is_none());
}

#[test]
fn test_areas_prefix_routes() {
    #[derive(Clone)]
    struct Users;

    let router = Router::default();
    router.register(vec![ResourceDef::new("Users")
        .area("admin")
        .prefix("/users")
        .unit(Users)
        .operation(OperationDef::new("get_users", "", vec![], |_: &Users, _| {
            Ok(Reply::Empty)
        }))]);

    assert!(match_get(&router, "/admin/users").is_found());
    assert!(!match_get(&router, "/users").is_found());
    assert_eq!(
        router.find_path_to("Users", "get_users", &[]).as_deref(),
        Some("/admin/users")
    );
}

#[test]
fn test_matching_while_registering() {
    let router = Arc::new(Router::default());
    router.register(vec![catalog()]);

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let router = Arc::clone(&router);
            std::thread::spawn(move || {
                (0..200).all(|_| match_get(&router, "/catalog/items/1").is_found())
            })
        })
        .collect();

    for i in 0..20 {
        #[derive(Clone)]
        struct Extra;
        router.register(vec![ResourceDef::new(format!("Extra{i}"))
            .prefix(format!("/extra{i}"))
            .unit(Extra)
            .operation(OperationDef::new("get_extra", "", vec![], |_: &Extra, _| {
                Ok(Reply::Empty)
            }))]);
    }

    for reader in readers {
        assert!(reader.join().unwrap());
    }
    assert_eq!(router.routes().len(), 24);
}
