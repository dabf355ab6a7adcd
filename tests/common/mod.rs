#![allow(dead_code)]

use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use switchyard::prelude::*;
use switchyard::executor;
use switchyard::RegistrationOutcome;

/// In-memory widget store shared by the `Widgets` handlers.
pub struct WidgetStore {
    widgets: Mutex<HashMap<i64, String>>,
    next_id: AtomicI64,
}

impl WidgetStore {
    pub fn seeded() -> Self {
        let mut widgets = HashMap::new();
        widgets.insert(42, "gear".to_string());
        Self {
            widgets: Mutex::new(widgets),
            next_id: AtomicI64::new(100),
        }
    }
}

pub struct Widgets {
    store: Arc<WidgetStore>,
}

impl Widgets {
    fn get(&self, id: i64) -> anyhow::Result<Reply> {
        let widgets = self.store.widgets.lock().unwrap();
        match widgets.get(&id) {
            Some(name) => Ok(Reply::Json(json!({"id": id, "name": name}))),
            None => Err(anyhow::Error::new(HttpFailure::status_with(
                404,
                format!("widget {id} not found"),
            ))),
        }
    }

    fn create(&self, body: &Value) -> anyhow::Result<Reply> {
        let name = body["name"].as_str().unwrap_or_default().to_string();
        let id = self.store.next_id.fetch_add(1, Ordering::SeqCst);
        self.store.widgets.lock().unwrap().insert(id, name.clone());
        Ok(Reply::Json(json!({"id": id, "name": name})))
    }
}

pub fn widget_schema() -> Value {
    json!({
        "type": "object",
        "required": ["name"],
        "properties": {"name": {"type": "string", "minLength": 1}}
    })
}

pub fn widgets_resource() -> ResourceDef {
    ResourceDef::new("Widgets")
        .prefix("/widgets")
        .constructor(vec![ParamType::service::<WidgetStore>()], |args| {
            Ok(Widgets {
                store: args.service::<WidgetStore>(0)?,
            })
        })
        .operation(OperationDef::new(
            "get_widget",
            "/{id}",
            vec![ParamType::Int(IntWidth::I64)],
            |w: &Widgets, args| w.get(args.int(0)?),
        ))
        .operation(
            OperationDef::new(
                "post_widget",
                "",
                vec![ParamType::Body(BodyType::new("widget").with_schema(widget_schema()))],
                |w: &Widgets, args| w.create(args.body_value(0)?),
            )
            .response_schema(json!({"type": "object", "required": ["id"]})),
        )
}

#[derive(Clone)]
pub struct Faults;

pub fn faults_resource() -> ResourceDef {
    ResourceDef::new("Faults")
        .prefix("/faults")
        .unit(Faults)
        .operation(OperationDef::new("get_internal", "/internal", vec![], |_: &Faults, _| {
            Err(anyhow::anyhow!("database unreachable"))
        }))
        .operation(OperationDef::new("get_panic", "/panic", vec![], |_: &Faults, _| {
            panic!("handler exploded")
        }))
        .operation(
            OperationDef::new("get_contract", "/contract", vec![], |_: &Faults, _| {
                Ok(Reply::Json(json!({"name": "no id"})))
            })
            .response_schema(json!({"type": "object", "required": ["id"]})),
        )
        .operation(OperationDef::new("get_moved", "/moved", vec![], |_: &Faults, _| {
            Ok(Reply::Redirect("/widgets/42".to_string()))
        }))
        .operation(OperationDef::new(
            "get_whoami",
            "/whoami",
            vec![ParamType::service::<Identity>()],
            |_: &Faults, args| Ok(Reply::Text(args.service::<Identity>(0)?.0.clone())),
        ))
}

/// Holds background jobs until the test opens it.
#[derive(Default)]
pub struct Gate {
    open: AtomicBool,
}

impl Gate {
    pub fn open(&self) {
        self.open.store(true, Ordering::SeqCst);
    }

    /// Wait for the gate, giving up after ten seconds. Fails when interrupted.
    pub fn pass(&self) -> anyhow::Result<()> {
        let deadline = Instant::now() + Duration::from_secs(10);
        while !self.open.load(Ordering::SeqCst) {
            if Instant::now() > deadline {
                anyhow::bail!("gate never opened");
            }
            executor::sleep(Duration::from_millis(5))?;
        }
        Ok(())
    }
}

pub struct Jobs {
    gate: Arc<Gate>,
}

pub fn jobs_resource() -> ResourceDef {
    ResourceDef::new("Jobs")
        .constructor(vec![ParamType::service::<Gate>()], |args| {
            Ok(Jobs {
                gate: args.service::<Gate>(0)?,
            })
        })
        .operation(
            OperationDef::new("post_job", "/jobs/{name}", vec![ParamType::Text], |j: &Jobs, args| {
                j.gate.pass()?;
                Ok(Reply::Json(json!({"job": args.text(0)?})))
            })
            .asynchronous(RejectRule::SamePath),
        )
        .operation(
            OperationDef::new(
                "post_batch",
                "/batches/{name}",
                vec![ParamType::Text],
                |j: &Jobs, args| {
                    j.gate.pass()?;
                    Ok(Reply::Json(json!({"batch": args.text(0)?})))
                },
            )
            .asynchronous(RejectRule::SameIdentity)
            .key_prefix("batch"),
        )
        .operation(
            OperationDef::new("post_report", "/reports", vec![], |j: &Jobs, _| {
                let gate = Arc::clone(&j.gate);
                Ok(Reply::deferred(move || {
                    gate.pass()?;
                    Ok(Reply::Redirect("/reports/1".to_string()))
                }))
            })
            .key_prefix("report"),
        )
        .operation(
            OperationDef::new("post_broken", "/broken", vec![], |_: &Jobs, _| {
                Err(anyhow::Error::new(HttpFailure::status_with(422, "cannot process")))
            })
            .asynchronous(RejectRule::None),
        )
}

pub fn services(gate: &Arc<Gate>) -> ServiceMap {
    let mut services = ServiceMap::new().with(WidgetStore::seeded());
    services.insert_arc(Arc::clone(gate));
    services
}

/// Dispatcher over the fixture resources with the given configuration.
pub fn dispatcher(config: &RuntimeConfig, gate: &Arc<Gate>) -> Dispatcher {
    let router = Arc::new(Router::default());
    let outcomes = router.register(vec![widgets_resource(), faults_resource(), jobs_resource()]);
    assert!(
        outcomes.iter().all(RegistrationOutcome::is_added),
        "{outcomes:?}"
    );
    Dispatcher::from_config(
        config,
        router,
        Arc::new(SchemaValidator::new()),
        Arc::new(services(gate)),
    )
}

/// Poll `condition` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}
