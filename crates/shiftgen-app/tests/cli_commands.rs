use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use integration_graph::{GraphMethod, GraphRequest, GraphTransport};
use serde_json::{json, Value};
use shiftgen_app::{build_service, run, AppError, Command};
use shiftgen_config::ShiftgenConfig;
use shiftgen_core::test_support::{pattern, InMemoryListStore, StaticPatternCatalog, StaticResolver};
use shiftgen_core::{
    ConfirmationStatus, InstanceFieldNames, ListId, ListRecord, ServiceSettings, ShiftError,
    ShiftInstanceRepository, ShiftListCache, ShiftService, Trip,
};
use tokio::sync::Mutex;

const INSTANCES: &str = "instances";

#[derive(Default)]
struct StubTransport {
    requests: Mutex<Vec<GraphRequest>>,
    responses: Mutex<VecDeque<Result<Value, ShiftError>>>,
}

impl StubTransport {
    async fn push_response(&self, value: Value) {
        self.responses.lock().await.push_back(Ok(value));
    }

    async fn requests(&self) -> Vec<GraphRequest> {
        self.requests.lock().await.clone()
    }
}

#[async_trait]
impl GraphTransport for StubTransport {
    async fn send(&self, request: GraphRequest) -> Result<Value, ShiftError> {
        self.requests.lock().await.push(request);
        self.responses.lock().await.pop_front().unwrap_or_else(|| {
            Err(ShiftError::DependencyUnavailable(
                "stub transport has no more queued responses".to_owned(),
            ))
        })
    }
}

fn configured() -> ShiftgenConfig {
    let mut config = ShiftgenConfig::default();
    config.graph.api_url = "https://graph.test/v1.0".to_owned();
    config.graph.site_id = "site-1".to_owned();
    config.graph.access_token = "token".to_owned();
    config.lists.shift_instances = INSTANCES.to_owned();
    config.lists.shift_patterns = "patterns".to_owned();
    config
}

fn in_memory_service() -> (Arc<InMemoryListStore>, ShiftService) {
    let store = Arc::new(InMemoryListStore::default());
    for (id, date) in [("10", "2026-02-09"), ("11", "2026-02-11"), ("12", "2026-02-18")] {
        let fields = json!({
            "workspaceId": "south",
            "date": format!("{date}T00:00:00Z"),
            "patternIdLookupId": "5",
            "templateIdLookupId": "30",
        })
        .as_object()
        .cloned()
        .expect("object");
        store.insert(INSTANCES, ListRecord::new(id, fields));
    }

    let mut weekdays = pattern("5", "morning", &[1, 2, 3, 4, 5]);
    weekdays.week_part = Some("weekdays".to_owned());

    let mut settings = ServiceSettings::default();
    settings.generation.default_bus = Some(shiftgen_core::Reference::new("4"));

    let service = ShiftService::new(
        ShiftInstanceRepository::new(
            store.clone(),
            ListId::new(INSTANCES),
            InstanceFieldNames::default(),
        ),
        Arc::new(StaticPatternCatalog::new(vec![weekdays])),
        Arc::new(StaticResolver::default().with_trips(
            "30",
            vec![Trip {
                name: "School run".to_owned(),
                time: "07:00–08:15".to_owned(),
                trip_item_id: Some("301".to_owned()),
                bus_override: None,
                events: Vec::new(),
            }],
        )),
        Arc::new(ShiftListCache::new()),
        settings,
    );
    (store, service)
}

#[tokio::test]
async fn subject_uses_route_time_and_week_range() {
    let (_, service) = in_memory_service();

    let output = run(
        Command::Subject {
            id: "10".to_owned(),
        },
        &service,
    )
    .await
    .expect("subject");

    assert_eq!(
        output["subject"],
        "Please confirm: R5 (06:00–14:00) Work days — week Feb 9 – Feb 15"
    );
}

#[tokio::test]
async fn week_command_groups_members_of_the_anchor_week() {
    let (_, service) = in_memory_service();

    let output = run(
        Command::Week {
            anchor_id: "10".to_owned(),
        },
        &service,
    )
    .await
    .expect("week");

    assert_eq!(output["token"], "week:10");
    let members = output["shifts"].as_array().expect("members");
    let ids = members
        .iter()
        .map(|member| member["id"].as_str().unwrap_or_default().to_owned())
        .collect::<Vec<_>>();
    assert_eq!(ids, vec!["10", "11"]);
}

#[tokio::test]
async fn confirm_week_token_updates_every_member() {
    let (store, service) = in_memory_service();

    let output = run(
        Command::Confirm {
            id: "week:10".to_owned(),
            status: ConfirmationStatus::Accepted,
        },
        &service,
    )
    .await
    .expect("confirm");

    assert_eq!(output["status"], "accepted");
    assert_eq!(output["updatedIds"].as_array().map(Vec::len), Some(2));
    assert_eq!(output["shift"]["kind"], "week");
    assert_eq!(output["shift"]["confirmationStatus"], "accepted");
    assert_eq!(output["shift"]["shifts"].as_array().map(Vec::len), Some(2));
    assert_eq!(store.patches().len(), 2);
}

#[tokio::test]
async fn show_includes_trips_unless_opted_out() {
    let (_, service) = in_memory_service();

    let output = run(
        Command::Show {
            id: "10".to_owned(),
            no_trips: false,
        },
        &service,
    )
    .await
    .expect("show");
    assert_eq!(output["trips"][0]["name"], "School run");

    let output = run(
        Command::Show {
            id: "10".to_owned(),
            no_trips: true,
        },
        &service,
    )
    .await
    .expect("show without trips");
    assert_eq!(output["trips"].as_array().map_or(0, Vec::len), 0);
}

#[tokio::test]
async fn show_reports_unknown_shift_as_not_found() {
    let (_, service) = in_memory_service();

    let error = run(
        Command::Show {
            id: "404".to_owned(),
            no_trips: true,
        },
        &service,
    )
    .await
    .expect_err("missing shift");

    assert!(matches!(error, AppError::NotFound(_)));
}

#[tokio::test]
async fn generate_fills_the_month_and_skips_existing_instances() {
    let (store, service) = in_memory_service();

    let output = run(
        Command::Generate {
            workspace: "south".to_owned(),
            month: "2026-02".to_owned(),
        },
        &service,
    )
    .await
    .expect("generate");

    // February 2026 has 20 weekdays, three of which already exist.
    assert_eq!(output, json!({ "created": 17, "skipped": 3 }));
    assert_eq!(store.created().len(), 17);
}

#[tokio::test]
async fn confirm_single_item_patches_through_graph() {
    let transport = Arc::new(StubTransport::default());
    transport
        .push_response(json!({
            "id": "55",
            "fields": {
                "workspaceId": "south",
                "date": "2026-02-09T00:00:00Z",
                "patternIdLookupId": "5",
            },
        }))
        .await;
    transport
        .push_response(json!({
            "value": [{
                "id": "5",
                "fields": {
                    "route": "R5",
                    "shiftType": "morning",
                    "dayOfWeek": "Mon",
                    "startTime": "06:00",
                    "endTime": "14:00",
                },
            }],
        }))
        .await;
    transport.push_response(Value::Null).await;
    let service = build_service(&configured(), transport.clone()).expect("service");

    let output = run(
        Command::Confirm {
            id: "55".to_owned(),
            status: ConfirmationStatus::Declined,
        },
        &service,
    )
    .await
    .expect("confirm");

    assert_eq!(output["updatedIds"], json!(["55"]));
    let requests = transport.requests().await;
    assert_eq!(requests.len(), 3);
    assert_eq!(
        requests[0].url,
        "https://graph.test/v1.0/sites/site-1/lists/instances/items/55?$expand=fields"
    );
    assert!(requests[1].url.starts_with("https://graph.test/v1.0/sites/site-1/lists/patterns/items"));
    assert_eq!(requests[2].method, GraphMethod::Patch);
    assert_eq!(
        requests[2].url,
        "https://graph.test/v1.0/sites/site-1/lists/instances/items/55/fields"
    );
    assert_eq!(
        requests[2].body,
        Some(json!({
            "confirmationStatus@odata.type": "Collection(Edm.String)",
            "confirmationStatus": ["declined"],
        }))
    );
}

#[test]
fn build_service_requires_store_settings() {
    let mut config = configured();
    config.lists.shift_patterns.clear();

    let error = build_service(&config, Arc::new(StubTransport::default()))
        .err()
        .expect("missing pattern list");
    assert!(error.to_string().contains("MS_SHIFT_PATTERNS_LIST_ID"));
}
